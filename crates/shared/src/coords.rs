//! World <-> chunk coordinate math.
//!
//! The canvas is tiled into 256x256 chunks. World coordinates are signed and
//! unbounded; everything here uses floored division/modulo so negative
//! coordinates land in the right chunk.

use crate::domain::{ChunkCoord, ChunkId, WorldPoint};

pub const CHUNK_SIZE: i32 = 256;

pub fn to_chunk(x: i32, y: i32) -> ChunkCoord {
    ChunkCoord::new(x.div_euclid(CHUNK_SIZE), y.div_euclid(CHUNK_SIZE))
}

/// Position within a chunk, row-major: `local_x + local_y * 256`.
pub fn to_offset(x: i32, y: i32) -> u16 {
    let local_x = x.rem_euclid(CHUNK_SIZE);
    let local_y = y.rem_euclid(CHUNK_SIZE);
    (local_x + local_y * CHUNK_SIZE) as u16
}

/// Inverse of [`to_chunk`]/[`to_offset`]. Accepts the full 24-bit offset the
/// wire can carry; offsets above 65535 never occur for 256x256 chunks but the
/// math stays well-defined if a frame carries one.
pub fn from_chunk_offset(i: i32, j: i32, offset: u32) -> WorldPoint {
    let local_x = (offset % CHUNK_SIZE as u32) as i32;
    let local_y = (offset / CHUNK_SIZE as u32) as i32;
    WorldPoint::new(i * CHUNK_SIZE + local_x, j * CHUNK_SIZE + local_y)
}

/// Packs a chunk address as `i + j * 256`, truncated to 16 bits.
///
/// This is the id the subscription frames carry. It only round-trips for
/// `i, j` in `[0, 255]`; anything outside aliases onto another chunk. That
/// bound comes from the wire protocol itself (pixel frames spend one byte per
/// chunk index) and is enforced where frames are encoded, not here.
pub fn chunk_id(i: i32, j: i32) -> ChunkId {
    ChunkId((i + j * CHUNK_SIZE) as u16)
}

pub fn chunk_from_id(id: ChunkId) -> ChunkCoord {
    ChunkCoord::new(i32::from(id.0 % 256), i32::from(id.0 / 256))
}

/// Every chunk whose bounds intersect the rectangle, row-major by `i` then
/// `j`, each id exactly once. Corner order does not matter.
pub fn chunks_covering(x1: i32, y1: i32, x2: i32, y2: i32) -> Vec<ChunkId> {
    let lo = to_chunk(x1.min(x2), y1.min(y2));
    let hi = to_chunk(x1.max(x2), y1.max(y2));
    let mut ids = Vec::with_capacity(((hi.i - lo.i + 1) * (hi.j - lo.j + 1)) as usize);
    for i in lo.i..=hi.i {
        for j in lo.j..=hi.j {
            ids.push(chunk_id(i, j));
        }
    }
    ids
}

/// World rectangle covered by a chunk, as inclusive min/max corners.
pub fn chunk_bounds(i: i32, j: i32) -> (WorldPoint, WorldPoint) {
    (
        WorldPoint::new(i * CHUNK_SIZE, j * CHUNK_SIZE),
        WorldPoint::new(i * CHUNK_SIZE + CHUNK_SIZE - 1, j * CHUNK_SIZE + CHUNK_SIZE - 1),
    )
}
