//! Binary wire protocol.
//!
//! Every frame starts with a one-byte opcode; multi-byte fields are
//! big-endian. The layouts here are the bit-exact contract with the remote
//! service and must not drift.

use crate::{
    coords,
    domain::{CanvasId, ChunkId, Color},
    error::WireError,
};

pub const OP_SUBSCRIBE_CANVAS: u8 = 0xA0;
pub const OP_SUBSCRIBE_CHUNK: u8 = 0xA1;
pub const OP_SUBSCRIBE_CHUNKS: u8 = 0xA3;
pub const OP_REQUEST_CHAT_HISTORY: u8 = 0xA5;
pub const OP_PIXEL: u8 = 0xC1;
pub const OP_COOLDOWN: u8 = 0xC2;

/// The 0xA3 frame spends one byte on the chunk count.
pub const MAX_CHUNKS_PER_SUBSCRIBE: usize = 255;

const PIXEL_FRAME_LEN: usize = 7;
const COOLDOWN_FRAME_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    SetPixel { x: i32, y: i32, color: Color },
    SubscribeCanvas { canvas: CanvasId },
    SubscribeChunk { chunk: ChunkId },
    SubscribeChunks { chunks: Vec<ChunkId> },
    RequestChatHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    PixelUpdate { x: i32, y: i32, color: Color },
    CooldownNotice { wait_seconds: u16 },
    /// An opcode this client does not understand. Not an error; consumers
    /// should ignore it rather than alarm.
    Unknown { opcode: u8 },
}

impl ClientCommand {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        match self {
            ClientCommand::SetPixel { x, y, color } => {
                let chunk = coords::to_chunk(*x, *y);
                // One byte per chunk index on the wire, so writes are bounded
                // to the 65536x65536 world the protocol can address.
                if !(0..=0xff).contains(&chunk.i) || !(0..=0xff).contains(&chunk.j) {
                    return Err(WireError::ChunkOutOfRange {
                        i: chunk.i,
                        j: chunk.j,
                    });
                }
                let offset = u32::from(coords::to_offset(*x, *y));
                let mut frame = Vec::with_capacity(PIXEL_FRAME_LEN);
                frame.push(OP_PIXEL);
                frame.push(chunk.i as u8);
                frame.push(chunk.j as u8);
                frame.push((offset >> 16) as u8);
                frame.extend_from_slice(&((offset & 0xffff) as u16).to_be_bytes());
                frame.push(color.0);
                Ok(frame)
            }
            ClientCommand::SubscribeCanvas { canvas } => {
                Ok(vec![OP_SUBSCRIBE_CANVAS, canvas.0])
            }
            ClientCommand::SubscribeChunk { chunk } => {
                let mut frame = Vec::with_capacity(3);
                frame.push(OP_SUBSCRIBE_CHUNK);
                frame.extend_from_slice(&chunk.0.to_be_bytes());
                Ok(frame)
            }
            ClientCommand::SubscribeChunks { chunks } => {
                if chunks.len() > MAX_CHUNKS_PER_SUBSCRIBE {
                    return Err(WireError::BatchTooLarge {
                        count: chunks.len(),
                    });
                }
                let mut frame = Vec::with_capacity(2 + chunks.len() * 2);
                frame.push(OP_SUBSCRIBE_CHUNKS);
                frame.push(chunks.len() as u8);
                for chunk in chunks {
                    frame.extend_from_slice(&chunk.0.to_be_bytes());
                }
                Ok(frame)
            }
            ClientCommand::RequestChatHistory => Ok(vec![OP_REQUEST_CHAT_HISTORY]),
        }
    }
}

impl ServerEvent {
    /// Decodes one frame from a fully-resolved byte buffer. Anything that
    /// still needs asynchronous reading is the transport's problem; this
    /// never sees partial deliveries, only short frames.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let (&opcode, payload) = frame
            .split_first()
            .ok_or(WireError::Truncated { needed: 1, got: 0 })?;
        match opcode {
            OP_PIXEL => {
                if frame.len() < PIXEL_FRAME_LEN {
                    return Err(WireError::Truncated {
                        needed: PIXEL_FRAME_LEN,
                        got: frame.len(),
                    });
                }
                let i = i32::from(payload[0]);
                let j = i32::from(payload[1]);
                let offset = (u32::from(payload[2]) << 16)
                    | u32::from(u16::from_be_bytes([payload[3], payload[4]]));
                let point = coords::from_chunk_offset(i, j, offset);
                Ok(ServerEvent::PixelUpdate {
                    x: point.x,
                    y: point.y,
                    color: Color(payload[5]),
                })
            }
            OP_COOLDOWN => {
                if frame.len() < COOLDOWN_FRAME_LEN {
                    return Err(WireError::Truncated {
                        needed: COOLDOWN_FRAME_LEN,
                        got: frame.len(),
                    });
                }
                Ok(ServerEvent::CooldownNotice {
                    wait_seconds: u16::from_be_bytes([payload[0], payload[1]]),
                })
            }
            opcode => Ok(ServerEvent::Unknown { opcode }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frames_match_the_wire_layout() {
        let frame = ClientCommand::SubscribeCanvas { canvas: CanvasId(7) }
            .encode()
            .unwrap();
        assert_eq!(frame, vec![0xA0, 7]);

        let frame = ClientCommand::SubscribeChunk {
            chunk: ChunkId(0x0102),
        }
        .encode()
        .unwrap();
        assert_eq!(frame, vec![0xA1, 0x01, 0x02]);

        let frame = ClientCommand::SubscribeChunks {
            chunks: vec![ChunkId(1), ChunkId(0xABCD)],
        }
        .encode()
        .unwrap();
        assert_eq!(frame, vec![0xA3, 2, 0x00, 0x01, 0xAB, 0xCD]);

        let frame = ClientCommand::RequestChatHistory.encode().unwrap();
        assert_eq!(frame, vec![0xA5]);
    }

    #[test]
    fn set_pixel_packs_chunk_and_offset() {
        // (257, 258) -> chunk (1, 1), local (1, 2), offset 1 + 2*256 = 513.
        let frame = ClientCommand::SetPixel {
            x: 257,
            y: 258,
            color: Color(9),
        }
        .encode()
        .unwrap();
        assert_eq!(frame, vec![0xC1, 1, 1, 0x00, 0x02, 0x01, 9]);
    }

    #[test]
    fn set_pixel_round_trips_through_decode() {
        for (x, y, color) in [(0, 0, 0), (255, 255, 31), (65535, 65535, 255), (300, 9000, 5)] {
            let frame = ClientCommand::SetPixel {
                x,
                y,
                color: Color(color),
            }
            .encode()
            .unwrap();
            assert_eq!(
                ServerEvent::decode(&frame).unwrap(),
                ServerEvent::PixelUpdate {
                    x,
                    y,
                    color: Color(color)
                }
            );
        }
    }

    #[test]
    fn set_pixel_rejects_coordinates_outside_the_addressable_world() {
        for (x, y) in [(-1, 0), (0, -1), (65536, 0), (0, 65536)] {
            let err = ClientCommand::SetPixel {
                x,
                y,
                color: Color(0),
            }
            .encode()
            .unwrap_err();
            assert!(matches!(err, WireError::ChunkOutOfRange { .. }), "({x}, {y})");
        }
    }

    #[test]
    fn oversized_subscribe_batch_is_rejected() {
        let chunks: Vec<ChunkId> = (0..256).map(ChunkId).collect();
        assert_eq!(
            ClientCommand::SubscribeChunks { chunks }.encode(),
            Err(WireError::BatchTooLarge { count: 256 })
        );
    }

    #[test]
    fn cooldown_notice_decodes_big_endian_seconds() {
        assert_eq!(
            ServerEvent::decode(&[0xC2, 0x01, 0x2C]).unwrap(),
            ServerEvent::CooldownNotice { wait_seconds: 300 }
        );
    }

    #[test]
    fn truncated_frames_are_reported_not_panicked() {
        assert_eq!(
            ServerEvent::decode(&[]),
            Err(WireError::Truncated { needed: 1, got: 0 })
        );
        assert_eq!(
            ServerEvent::decode(&[0xC1]),
            Err(WireError::Truncated { needed: 7, got: 1 })
        );
        assert_eq!(
            ServerEvent::decode(&[0xC1, 1, 1, 0, 0, 1]),
            Err(WireError::Truncated { needed: 7, got: 6 })
        );
        assert_eq!(
            ServerEvent::decode(&[0xC2, 0]),
            Err(WireError::Truncated { needed: 3, got: 2 })
        );
    }

    #[test]
    fn unknown_opcodes_pass_through_as_events() {
        assert_eq!(
            ServerEvent::decode(&[0x77, 1, 2, 3]).unwrap(),
            ServerEvent::Unknown { opcode: 0x77 }
        );
        // Command opcodes are not in the inbound set either.
        assert_eq!(
            ServerEvent::decode(&[0xA0, 0]).unwrap(),
            ServerEvent::Unknown { opcode: 0xA0 }
        );
    }
}
