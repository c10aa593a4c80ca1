//! Placement cooldown tracking.
//!
//! The server is authoritative: every cooldown notice overwrites whatever we
//! thought the deadline was. An optional ticker task periodically reports the
//! remaining time through the client event stream and fires a single ready
//! event when the cooldown elapses.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::info;

use crate::ClientEvent;

pub struct CooldownTracker {
    events: broadcast::Sender<ClientEvent>,
    inner: Mutex<CooldownState>,
}

struct CooldownState {
    ready_at: Option<Instant>,
    tick_interval: Option<Duration>,
    ticker: Option<JoinHandle<()>>,
}

impl CooldownTracker {
    pub(crate) fn new(events: broadcast::Sender<ClientEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            inner: Mutex::new(CooldownState {
                ready_at: None,
                tick_interval: None,
                ticker: None,
            }),
        })
    }

    pub async fn on_notice(self: &Arc<Self>, wait_seconds: u16) {
        let mut inner = self.inner.lock().await;
        inner.ready_at = Some(Instant::now() + Duration::from_secs(u64::from(wait_seconds)));
        info!(wait_seconds, "cooldown notice");
        if let Some(interval) = inner.tick_interval {
            self.arm_ticker(&mut inner, interval);
        }
    }

    /// Time until the next placement is allowed; zero when unknown or
    /// already elapsed.
    pub async fn remaining(&self) -> Duration {
        remaining_from(self.inner.lock().await.ready_at)
    }

    pub async fn ready_at(&self) -> Option<Instant> {
        self.inner.lock().await.ready_at
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.ready_at = None;
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
    }

    /// Starts periodic `CooldownTick` events while a cooldown is running,
    /// ending with exactly one `CooldownReady` per armed cooldown.
    pub async fn enable_ticker(self: &Arc<Self>, interval: Duration) {
        let mut inner = self.inner.lock().await;
        inner.tick_interval = Some(interval);
        if !remaining_from(inner.ready_at).is_zero() {
            self.arm_ticker(&mut inner, interval);
        }
    }

    pub async fn disable_ticker(&self) {
        let mut inner = self.inner.lock().await;
        inner.tick_interval = None;
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
    }

    fn arm_ticker(self: &Arc<Self>, inner: &mut CooldownState, interval: Duration) {
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
        let tracker = Arc::clone(self);
        inner.ticker = Some(tokio::spawn(async move {
            loop {
                let remaining = tracker.remaining().await;
                if remaining.is_zero() {
                    let _ = tracker.events.send(ClientEvent::CooldownReady);
                    break;
                }
                tokio::time::sleep(remaining.min(interval)).await;
                let remaining = tracker.remaining().await;
                if !remaining.is_zero() {
                    let _ = tracker.events.send(ClientEvent::CooldownTick { remaining });
                }
            }
        }));
    }
}

fn remaining_from(ready_at: Option<Instant>) -> Duration {
    ready_at
        .map(|at| at.saturating_duration_since(Instant::now()))
        .unwrap_or(Duration::ZERO)
}

/// `"1h 2m 3s"`-style rendering for log lines.
pub fn format_remaining(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_by_largest_unit() {
        assert_eq!(format_remaining(Duration::from_secs(0)), "0s");
        assert_eq!(format_remaining(Duration::from_secs(59)), "59s");
        assert_eq!(format_remaining(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_remaining(Duration::from_secs(3723)), "1h 2m 3s");
    }
}
