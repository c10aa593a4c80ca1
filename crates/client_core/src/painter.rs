//! Paced pixel placement.
//!
//! Sends a prepared sequence of pixels one frame at a time with a fixed delay
//! between sends, staying inside the service's cooldown budget. Where the
//! pixels come from (an image, a template, hand-picked points) is the
//! caller's business; the painter only paces and sends.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use shared::{
    domain::{Color, WorldPoint},
    error::WireError,
    protocol::ClientCommand,
};

use crate::{transport::FrameSink, ClientEvent};

pub const DEFAULT_PAINT_DELAY: Duration = Duration::from_millis(1000);

pub struct Painter {
    sink: Arc<dyn FrameSink>,
    events: broadcast::Sender<ClientEvent>,
    job: Mutex<Option<JoinHandle<()>>>,
}

impl Painter {
    pub(crate) fn new(sink: Arc<dyn FrameSink>, events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            sink,
            events,
            job: Mutex::new(None),
        }
    }

    /// Starts a paint job. Every pixel is encoded up front so an
    /// out-of-range point rejects the whole job before the first send. A job
    /// already running is cancelled and replaced.
    pub async fn paint(
        &self,
        pixels: Vec<(WorldPoint, Color)>,
        delay: Duration,
    ) -> Result<(), WireError> {
        let mut frames = Vec::with_capacity(pixels.len());
        for (point, color) in &pixels {
            frames.push(
                ClientCommand::SetPixel {
                    x: point.x,
                    y: point.y,
                    color: *color,
                }
                .encode()?,
            );
        }
        let total = frames.len();
        info!(total, delay_ms = delay.as_millis() as u64, "paint job started");
        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            for (index, frame) in frames.into_iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(delay).await;
                }
                if let Err(err) = sink.send(frame).await {
                    warn!(%err, placed = index, total, "paint job aborted");
                    let _ = events.send(ClientEvent::Error(format!("paint send failed: {err}")));
                    return;
                }
                let _ = events.send(ClientEvent::PaintProgress {
                    placed: index + 1,
                    total,
                });
            }
            info!(total, "paint job complete");
        });
        let mut job = self.job.lock().await;
        if let Some(previous) = job.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    pub async fn paint_template(
        &self,
        origin_x: i32,
        origin_y: i32,
        rows: &[Vec<Option<Color>>],
        delay: Duration,
    ) -> Result<(), WireError> {
        self.paint(flatten_template(origin_x, origin_y, rows), delay)
            .await
    }

    pub async fn cancel(&self) {
        if let Some(task) = self.job.lock().await.take() {
            task.abort();
            info!("paint job cancelled");
        }
    }

    pub async fn is_painting(&self) -> bool {
        self.job
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// Row-major flattening of a nullable color grid; `None` cells are skipped.
pub fn flatten_template(
    origin_x: i32,
    origin_y: i32,
    rows: &[Vec<Option<Color>>],
) -> Vec<(WorldPoint, Color)> {
    let mut pixels = Vec::new();
    for (dy, row) in rows.iter().enumerate() {
        for (dx, cell) in row.iter().enumerate() {
            if let Some(color) = cell {
                pixels.push((
                    WorldPoint::new(origin_x + dx as i32, origin_y + dy as i32),
                    *color,
                ));
            }
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_flattening_skips_empty_cells() {
        let rows = vec![
            vec![None, Some(Color(3)), None],
            vec![Some(Color(5)), None, Some(Color(7))],
        ];
        assert_eq!(
            flatten_template(10, 20, &rows),
            vec![
                (WorldPoint::new(11, 20), Color(3)),
                (WorldPoint::new(10, 21), Color(5)),
                (WorldPoint::new(12, 21), Color(7)),
            ]
        );
    }
}
