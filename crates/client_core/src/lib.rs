//! Client core for a tile-based collaborative pixel canvas service.
//!
//! [`CanvasClient`] owns one outbound frame sink and fans decoded server
//! events out to the stateful components: the cooldown tracker, the region
//! protection engine, and the traffic monitor. Inbound frames come from
//! whatever transport the caller wired up; see [`transport`].

use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use shared::{
    coords,
    domain::{CanvasId, ChunkId, Color},
    protocol::{ClientCommand, ServerEvent, MAX_CHUNKS_PER_SUBSCRIBE},
};

pub mod cooldown;
pub mod monitor;
pub mod painter;
pub mod protection;
pub mod transport;

pub use cooldown::CooldownTracker;
pub use monitor::{AreaFilter, TrafficMonitor, TrafficStats};
pub use painter::Painter;
pub use protection::{
    ProtectError, ProtectedRegion, ProtectionEngine, ProtectionStatus, DEFAULT_FIX_DELAY,
};
pub use transport::{FrameSink, FrameStream, WsTransport};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    PixelChanged {
        x: i32,
        y: i32,
        color: Color,
    },
    CooldownUpdated {
        wait_seconds: u16,
    },
    CooldownTick {
        remaining: Duration,
    },
    CooldownReady,
    Violation {
        x: i32,
        y: i32,
        actual: Color,
        expected: Color,
    },
    CorrectionSent {
        x: i32,
        y: i32,
        color: Color,
    },
    PaintProgress {
        placed: usize,
        total: usize,
    },
    Disconnected,
    Error(String),
}

pub struct CanvasClient {
    sink: Arc<dyn FrameSink>,
    events: broadcast::Sender<ClientEvent>,
    cooldown: Arc<CooldownTracker>,
    protection: Arc<ProtectionEngine>,
    monitor: TrafficMonitor,
    painter: Painter,
    subscriptions: Mutex<SubscriptionState>,
}

struct SubscriptionState {
    current_canvas: Option<CanvasId>,
    registered: HashSet<ChunkId>,
}

impl CanvasClient {
    pub fn new(sink: Arc<dyn FrameSink>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            cooldown: CooldownTracker::new(events.clone()),
            protection: ProtectionEngine::new(Arc::clone(&sink), events.clone()),
            monitor: TrafficMonitor::new(),
            painter: Painter::new(Arc::clone(&sink), events.clone()),
            subscriptions: Mutex::new(SubscriptionState {
                current_canvas: None,
                registered: HashSet::new(),
            }),
            sink,
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn cooldown(&self) -> &Arc<CooldownTracker> {
        &self.cooldown
    }

    pub fn protection(&self) -> &Arc<ProtectionEngine> {
        &self.protection
    }

    pub fn monitor(&self) -> &TrafficMonitor {
        &self.monitor
    }

    pub fn painter(&self) -> &Painter {
        &self.painter
    }

    async fn send_command(&self, command: ClientCommand) -> Result<()> {
        let frame = command.encode()?;
        self.sink.send(frame).await
    }

    pub async fn subscribe_canvas(&self, canvas: CanvasId) -> Result<()> {
        self.send_command(ClientCommand::SubscribeCanvas { canvas })
            .await?;
        self.subscriptions.lock().await.current_canvas = Some(canvas);
        info!(canvas = canvas.0, "subscribed canvas");
        Ok(())
    }

    pub async fn subscribe_chunk(&self, chunk: ChunkId) -> Result<()> {
        self.send_command(ClientCommand::SubscribeChunk { chunk })
            .await?;
        self.subscriptions.lock().await.registered.insert(chunk);
        Ok(())
    }

    pub async fn subscribe_chunk_at(&self, i: i32, j: i32) -> Result<()> {
        self.subscribe_chunk(coords::chunk_id(i, j)).await
    }

    /// Subscribes a list of chunks, splitting into frames of at most 255 ids
    /// so the one-byte count field never overflows.
    pub async fn subscribe_chunks(&self, chunks: &[ChunkId]) -> Result<()> {
        for batch in chunks.chunks(MAX_CHUNKS_PER_SUBSCRIBE) {
            self.send_command(ClientCommand::SubscribeChunks {
                chunks: batch.to_vec(),
            })
            .await?;
        }
        let mut subscriptions = self.subscriptions.lock().await;
        subscriptions.registered.extend(chunks.iter().copied());
        info!(count = chunks.len(), "subscribed chunks");
        Ok(())
    }

    /// Subscribes every chunk intersecting the rectangle; returns the ids.
    pub async fn subscribe_area(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Vec<ChunkId>> {
        let chunks = coords::chunks_covering(x1, y1, x2, y2);
        self.subscribe_chunks(&chunks).await?;
        Ok(chunks)
    }

    pub async fn request_chat_history(&self) -> Result<()> {
        self.send_command(ClientCommand::RequestChatHistory).await
    }

    pub async fn current_canvas(&self) -> Option<CanvasId> {
        self.subscriptions.lock().await.current_canvas
    }

    pub async fn registered_chunks(&self) -> Vec<ChunkId> {
        let subscriptions = self.subscriptions.lock().await;
        let mut chunks: Vec<ChunkId> = subscriptions.registered.iter().copied().collect();
        chunks.sort();
        chunks
    }

    pub async fn place_pixel(&self, x: i32, y: i32, color: Color) -> Result<()> {
        self.send_command(ClientCommand::SetPixel { x, y, color })
            .await
    }

    /// Decodes one inbound frame and routes the event. Malformed frames are
    /// dropped with a warning; unknown opcodes are ignored.
    pub async fn handle_frame(&self, frame: &[u8]) {
        match ServerEvent::decode(frame) {
            Ok(ServerEvent::PixelUpdate { x, y, color }) => {
                self.monitor.observe(x, y, color).await;
                self.protection.on_pixel_update(x, y, color).await;
                let _ = self.events.send(ClientEvent::PixelChanged { x, y, color });
            }
            Ok(ServerEvent::CooldownNotice { wait_seconds }) => {
                self.cooldown.on_notice(wait_seconds).await;
                let _ = self.events.send(ClientEvent::CooldownUpdated { wait_seconds });
            }
            Ok(ServerEvent::Unknown { opcode }) => {
                debug!(opcode, "ignoring unknown frame");
            }
            Err(err) => {
                warn!(%err, len = frame.len(), "dropping malformed frame");
            }
        }
    }

    pub(crate) fn emit_error(&self, message: String) {
        let _ = self.events.send(ClientEvent::Error(message));
    }

    pub(crate) fn emit_disconnected(&self) {
        let _ = self.events.send(ClientEvent::Disconnected);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
