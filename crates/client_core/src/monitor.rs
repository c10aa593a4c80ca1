//! Live traffic observation.
//!
//! Counts every pixel update flowing through the client, optionally narrowed
//! to a rectangle and/or a set of colors. Purely observational; nothing here
//! writes to the canvas.

use std::collections::{HashMap, HashSet};

use tokio::{sync::Mutex, time::Instant};
use tracing::info;

use shared::{
    coords,
    domain::{ChunkCoord, Color},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaFilter {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl AreaFilter {
    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficStats {
    pub total: u64,
    pub by_color: HashMap<Color, u64>,
    pub by_chunk: HashMap<ChunkCoord, u64>,
    pub last: Option<(i32, i32, Color)>,
    pub updates_per_minute: f64,
}

pub struct TrafficMonitor {
    inner: Mutex<MonitorState>,
}

struct MonitorState {
    observing: bool,
    verbose: bool,
    area: Option<AreaFilter>,
    colors: Option<HashSet<Color>>,
    total: u64,
    by_color: HashMap<Color, u64>,
    by_chunk: HashMap<ChunkCoord, u64>,
    last: Option<(i32, i32, Color)>,
    started_at: Instant,
}

impl TrafficMonitor {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(MonitorState {
                observing: false,
                verbose: false,
                area: None,
                colors: None,
                total: 0,
                by_color: HashMap::new(),
                by_chunk: HashMap::new(),
                last: None,
                started_at: Instant::now(),
            }),
        }
    }

    pub async fn start(&self, verbose: bool) {
        let mut inner = self.inner.lock().await;
        inner.observing = true;
        inner.verbose = verbose;
        inner.started_at = Instant::now();
        info!(verbose, "traffic monitor started");
    }

    pub async fn stop(&self) {
        self.inner.lock().await.observing = false;
    }

    pub async fn set_area_filter(&self, area: Option<AreaFilter>) {
        self.inner.lock().await.area = area;
    }

    pub async fn set_color_filter(&self, colors: Option<Vec<Color>>) {
        self.inner.lock().await.colors = colors.map(|colors| colors.into_iter().collect());
    }

    pub async fn reset_stats(&self) {
        let mut inner = self.inner.lock().await;
        inner.total = 0;
        inner.by_color.clear();
        inner.by_chunk.clear();
        inner.last = None;
        inner.started_at = Instant::now();
    }

    pub(crate) async fn observe(&self, x: i32, y: i32, color: Color) {
        let mut inner = self.inner.lock().await;
        if !inner.observing {
            return;
        }
        if let Some(area) = inner.area {
            if !area.contains(x, y) {
                return;
            }
        }
        if let Some(colors) = &inner.colors {
            if !colors.contains(&color) {
                return;
            }
        }
        inner.total += 1;
        *inner.by_color.entry(color).or_insert(0) += 1;
        let chunk = coords::to_chunk(x, y);
        *inner.by_chunk.entry(chunk).or_insert(0) += 1;
        inner.last = Some((x, y, color));
        if inner.verbose {
            info!(
                x,
                y,
                color = color.0,
                chunk_i = chunk.i,
                chunk_j = chunk.j,
                total = inner.total,
                "pixel update"
            );
        }
    }

    pub async fn snapshot(&self) -> TrafficStats {
        let inner = self.inner.lock().await;
        let elapsed_minutes = inner.started_at.elapsed().as_secs_f64() / 60.0;
        let updates_per_minute = if elapsed_minutes > 0.0 {
            inner.total as f64 / elapsed_minutes
        } else {
            0.0
        };
        TrafficStats {
            total: inner.total,
            by_color: inner.by_color.clone(),
            by_chunk: inner.by_chunk.clone(),
            last: inner.last,
            updates_per_minute,
        }
    }
}
