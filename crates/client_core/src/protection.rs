//! Region protection.
//!
//! Holds the desired state of one claimed rectangle as a materialized
//! point -> color map, watches decoded pixel updates for divergence, and
//! schedules corrective writes through the injected sink. Corrections are
//! coalesced per pixel: re-griefing a pixel before its fix fires replaces the
//! scheduled write instead of stacking another timer, and `stop`/`pause`
//! disarm everything so no write lands after the operator walked away.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use shared::{
    domain::{Color, WorldPoint},
    protocol::ClientCommand,
};

use crate::{transport::FrameSink, ClientEvent};

pub const DEFAULT_FIX_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtectError {
    #[error("no protected region is active")]
    NoActiveRegion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedRegion {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub default_color: Color,
}

impl ProtectedRegion {
    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1 + 1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1 + 1) as u32
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionStatus {
    pub region: ProtectedRegion,
    pub active: bool,
    pub pixel_count: u64,
    pub distinct_colors: usize,
    pub auto_fix: bool,
    pub fix_delay: Duration,
    pub pending_corrections: usize,
}

pub struct ProtectionEngine {
    sink: Arc<dyn FrameSink>,
    events: broadcast::Sender<ClientEvent>,
    inner: Mutex<EngineState>,
}

struct EngineState {
    region: Option<ProtectedRegion>,
    overrides: HashMap<WorldPoint, Color>,
    monitoring: bool,
    auto_fix: bool,
    fix_delay: Duration,
    pending: HashMap<WorldPoint, JoinHandle<()>>,
}

impl ProtectionEngine {
    pub(crate) fn new(
        sink: Arc<dyn FrameSink>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sink,
            events,
            inner: Mutex::new(EngineState {
                region: None,
                overrides: HashMap::new(),
                monitoring: false,
                auto_fix: true,
                fix_delay: DEFAULT_FIX_DELAY,
                pending: HashMap::new(),
            }),
        })
    }

    /// Claims a rectangle and starts monitoring. The expected color of every
    /// point is materialized up front; a later `protect` call replaces the
    /// region and the whole map.
    pub async fn protect(&self, x1: i32, y1: i32, x2: i32, y2: i32, default_color: Color) {
        let region = ProtectedRegion {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            default_color,
        };
        let mut inner = self.inner.lock().await;
        abort_pending(&mut inner.pending);
        inner.overrides.clear();
        for x in region.x1..=region.x2 {
            for y in region.y1..=region.y2 {
                inner.overrides.insert(WorldPoint::new(x, y), default_color);
            }
        }
        inner.region = Some(region);
        inner.monitoring = true;
        info!(
            x1 = region.x1,
            y1 = region.y1,
            x2 = region.x2,
            y2 = region.y2,
            pixels = region.pixel_count(),
            color = default_color.0,
            "protecting region"
        );
    }

    /// Drops the region, the override map, and every pending correction.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        abort_pending(&mut inner.pending);
        inner.region = None;
        inner.overrides.clear();
        inner.monitoring = false;
        info!("protection stopped");
    }

    /// Keeps the region and map but ignores updates and disarms pending
    /// corrections until `resume`.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        abort_pending(&mut inner.pending);
        inner.monitoring = false;
        info!("protection paused");
    }

    pub async fn resume(&self) -> Result<(), ProtectError> {
        let mut inner = self.inner.lock().await;
        if inner.region.is_none() {
            return Err(ProtectError::NoActiveRegion);
        }
        inner.monitoring = true;
        info!("protection resumed");
        Ok(())
    }

    pub(crate) async fn on_pixel_update(self: &Arc<Self>, x: i32, y: i32, actual: Color) {
        let mut inner = self.inner.lock().await;
        if !inner.monitoring {
            return;
        }
        let Some(region) = inner.region else {
            return;
        };
        if !region.contains(x, y) {
            return;
        }
        let point = WorldPoint::new(x, y);
        let expected = inner
            .overrides
            .get(&point)
            .copied()
            .unwrap_or(region.default_color);
        if actual == expected {
            return;
        }
        warn!(
            x,
            y,
            actual = actual.0,
            expected = expected.0,
            "protected pixel overwritten"
        );
        let _ = self.events.send(ClientEvent::Violation {
            x,
            y,
            actual,
            expected,
        });
        if !inner.auto_fix {
            return;
        }
        let frame = match (ClientCommand::SetPixel {
            x,
            y,
            color: expected,
        })
        .encode()
        {
            Ok(frame) => frame,
            Err(err) => {
                warn!(x, y, %err, "cannot encode corrective write");
                return;
            }
        };
        let delay = inner.fix_delay;
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.fire_correction(point, expected, frame).await;
        });
        // One pending correction per point: a newer violation replaces the
        // scheduled write rather than stacking a second timer.
        if let Some(previous) = inner.pending.insert(point, task) {
            previous.abort();
        }
    }

    async fn fire_correction(&self, point: WorldPoint, color: Color, frame: Vec<u8>) {
        if let Err(err) = self.sink.send(frame).await {
            warn!(x = point.x, y = point.y, %err, "corrective write failed");
            let _ = self
                .events
                .send(ClientEvent::Error(format!("corrective write failed: {err}")));
        } else {
            info!(x = point.x, y = point.y, color = color.0, "corrective write sent");
            let _ = self.events.send(ClientEvent::CorrectionSent {
                x: point.x,
                y: point.y,
                color,
            });
        }
        self.inner.lock().await.pending.remove(&point);
    }

    pub async fn set_pixel(&self, x: i32, y: i32, color: Color) -> Result<(), ProtectError> {
        let mut inner = self.inner.lock().await;
        if inner.region.is_none() {
            return Err(ProtectError::NoActiveRegion);
        }
        inner.overrides.insert(WorldPoint::new(x, y), color);
        Ok(())
    }

    pub async fn set_area(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: Color,
    ) -> Result<(), ProtectError> {
        let mut inner = self.inner.lock().await;
        if inner.region.is_none() {
            return Err(ProtectError::NoActiveRegion);
        }
        for x in x1.min(x2)..=x1.max(x2) {
            for y in y1.min(y2)..=y1.max(y2) {
                inner.overrides.insert(WorldPoint::new(x, y), color);
            }
        }
        Ok(())
    }

    /// Applies a grid of expected colors anchored at `(origin_x, origin_y)`;
    /// `None` cells leave the map untouched. Returns how many points were
    /// written.
    pub async fn load_template(
        &self,
        origin_x: i32,
        origin_y: i32,
        rows: &[Vec<Option<Color>>],
    ) -> Result<usize, ProtectError> {
        let mut inner = self.inner.lock().await;
        if inner.region.is_none() {
            return Err(ProtectError::NoActiveRegion);
        }
        let mut written = 0;
        for (dy, row) in rows.iter().enumerate() {
            for (dx, cell) in row.iter().enumerate() {
                if let Some(color) = cell {
                    inner.overrides.insert(
                        WorldPoint::new(origin_x + dx as i32, origin_y + dy as i32),
                        *color,
                    );
                    written += 1;
                }
            }
        }
        info!(written, "template loaded");
        Ok(written)
    }

    /// Verbatim snapshot of the override map.
    pub async fn export_state(&self) -> HashMap<WorldPoint, Color> {
        self.inner.lock().await.overrides.clone()
    }

    /// Replaces the override map wholesale; no validation beyond typing.
    pub async fn import_state(&self, overrides: HashMap<WorldPoint, Color>) {
        let mut inner = self.inner.lock().await;
        info!(pixels = overrides.len(), "override map imported");
        inner.overrides = overrides;
    }

    pub async fn set_auto_fix(&self, enabled: bool) {
        self.inner.lock().await.auto_fix = enabled;
    }

    pub async fn set_fix_delay(&self, delay: Duration) {
        self.inner.lock().await.fix_delay = delay;
    }

    pub async fn status(&self) -> Option<ProtectionStatus> {
        let inner = self.inner.lock().await;
        let region = inner.region?;
        let distinct: HashSet<Color> = inner.overrides.values().copied().collect();
        Some(ProtectionStatus {
            region,
            active: inner.monitoring,
            pixel_count: region.pixel_count(),
            distinct_colors: distinct.len(),
            auto_fix: inner.auto_fix,
            fix_delay: inner.fix_delay,
            pending_corrections: inner.pending.len(),
        })
    }
}

fn abort_pending(pending: &mut HashMap<WorldPoint, JoinHandle<()>>) {
    for (_, task) in pending.drain() {
        task.abort();
    }
}
