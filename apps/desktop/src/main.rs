use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{cooldown, AreaFilter, CanvasClient, ClientEvent, WsTransport};
use serde::{Deserialize, Serialize};
use shared::domain::{CanvasId, Color, WorldPoint};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

mod config;

#[derive(Parser, Debug)]
#[command(about = "Pixel canvas client tools: protect a region, paint a template, watch traffic")]
struct Args {
    /// Overrides the server url from canvas.toml / environment.
    #[arg(long)]
    server_url: Option<String>,
    /// Overrides the canvas id to subscribe.
    #[arg(long)]
    canvas: Option<u8>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Guard a region: report overwrites and repair them after a delay.
    Protect {
        #[arg(allow_negative_numbers = true)]
        x1: i32,
        #[arg(allow_negative_numbers = true)]
        y1: i32,
        #[arg(allow_negative_numbers = true)]
        x2: i32,
        #[arg(allow_negative_numbers = true)]
        y2: i32,
        /// Expected color for every pixel not covered by the state file.
        #[arg(long)]
        color: u8,
        #[arg(long)]
        fix_delay_ms: Option<u64>,
        #[arg(long)]
        no_auto_fix: bool,
        /// JSON file of expected pixels, imported on start and saved on exit.
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
    /// Send a prepared template one pixel at a time.
    Paint {
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
        /// JSON grid of nullable palette indices, row-major.
        #[arg(long)]
        template: PathBuf,
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,
    },
    /// Log pixel traffic, optionally narrowed to an area and colors.
    Watch {
        #[arg(long, num_args = 4, value_names = ["X1", "Y1", "X2", "Y2"], allow_negative_numbers = true)]
        area: Option<Vec<i32>>,
        #[arg(long)]
        colors: Vec<u8>,
        #[arg(long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(url) = args.server_url {
        settings.server_url = url;
    }
    if let Some(canvas) = args.canvas {
        settings.canvas_id = canvas;
    }

    let (transport, frames) = WsTransport::connect(&settings.server_url).await?;
    let client = CanvasClient::new(transport);
    let read_task = frames.forward_to(Arc::clone(&client));

    client.subscribe_canvas(CanvasId(settings.canvas_id)).await?;
    client
        .cooldown()
        .enable_ticker(Duration::from_secs(settings.cooldown_log_secs))
        .await;

    match args.command {
        Command::Protect {
            x1,
            y1,
            x2,
            y2,
            color,
            fix_delay_ms,
            no_auto_fix,
            state_file,
        } => {
            run_protect(
                &client,
                &settings,
                (x1, y1, x2, y2),
                Color(color),
                fix_delay_ms,
                no_auto_fix,
                state_file.as_deref(),
            )
            .await?;
        }
        Command::Paint {
            x,
            y,
            template,
            delay_ms,
        } => {
            run_paint(&client, x, y, &template, Duration::from_millis(delay_ms)).await?;
        }
        Command::Watch {
            area,
            colors,
            verbose,
        } => {
            run_watch(&client, area, colors, verbose).await?;
        }
    }

    read_task.abort();
    Ok(())
}

async fn run_protect(
    client: &Arc<CanvasClient>,
    settings: &config::Settings,
    rect: (i32, i32, i32, i32),
    color: Color,
    fix_delay_ms: Option<u64>,
    no_auto_fix: bool,
    state_file: Option<&Path>,
) -> Result<()> {
    let (x1, y1, x2, y2) = rect;
    client.subscribe_area(x1, y1, x2, y2).await?;

    let engine = client.protection();
    engine
        .set_fix_delay(Duration::from_millis(
            fix_delay_ms.unwrap_or(settings.fix_delay_ms),
        ))
        .await;
    engine.set_auto_fix(!no_auto_fix && settings.auto_fix).await;
    engine.protect(x1, y1, x2, y2, color).await;

    if let Some(path) = state_file {
        if path.exists() {
            let state = read_state_file(path)?;
            info!(pixels = state.len(), path = %path.display(), "restoring expected state");
            engine.import_state(state).await;
        }
    }

    drive_events(client, |event| matches!(event, ClientEvent::Disconnected)).await;

    if let Some(path) = state_file {
        write_state_file(path, &engine.export_state().await)?;
        info!(path = %path.display(), "expected state saved");
    }
    engine.stop().await;
    Ok(())
}

async fn run_paint(
    client: &Arc<CanvasClient>,
    x: i32,
    y: i32,
    template_path: &Path,
    delay: Duration,
) -> Result<()> {
    let rows = read_template(template_path)?;
    let height = rows.len() as i32;
    let width = rows.iter().map(Vec::len).max().unwrap_or(0) as i32;
    if width > 0 && height > 0 {
        client.subscribe_area(x, y, x + width - 1, y + height - 1).await?;
    }
    client.painter().paint_template(x, y, &rows, delay).await?;

    drive_events(client, |event| match event {
        ClientEvent::Disconnected => true,
        ClientEvent::PaintProgress { placed, total } => placed == total,
        _ => false,
    })
    .await;
    client.painter().cancel().await;
    Ok(())
}

async fn run_watch(
    client: &Arc<CanvasClient>,
    area: Option<Vec<i32>>,
    colors: Vec<u8>,
    verbose: bool,
) -> Result<()> {
    let monitor = client.monitor();
    if let Some(area) = &area {
        let filter = AreaFilter {
            x1: area[0].min(area[2]),
            y1: area[1].min(area[3]),
            x2: area[0].max(area[2]),
            y2: area[1].max(area[3]),
        };
        client
            .subscribe_area(filter.x1, filter.y1, filter.x2, filter.y2)
            .await?;
        monitor.set_area_filter(Some(filter)).await;
    } else {
        warn!("no --area given; only traffic the server pushes unsolicited will show up");
    }
    if !colors.is_empty() {
        monitor
            .set_color_filter(Some(colors.into_iter().map(Color).collect()))
            .await;
    }
    monitor.start(verbose).await;

    drive_events(client, |event| matches!(event, ClientEvent::Disconnected)).await;

    let stats = monitor.snapshot().await;
    info!(
        total = stats.total,
        per_minute = %format!("{:.1}", stats.updates_per_minute),
        colors = stats.by_color.len(),
        chunks = stats.by_chunk.len(),
        "session stats"
    );
    Ok(())
}

/// Pumps client events into the log until Ctrl-C or `done` says stop.
async fn drive_events<F>(client: &Arc<CanvasClient>, mut done: F)
where
    F: FnMut(&ClientEvent) -> bool,
{
    let mut events = client.subscribe_events();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    log_event(&event);
                    if done(&event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::PixelChanged { x, y, color } => {
            debug!(x, y, color = color.0, "pixel changed");
        }
        ClientEvent::CooldownUpdated { wait_seconds } => {
            info!(wait_seconds, "cooldown notice");
        }
        ClientEvent::CooldownTick { remaining } => {
            info!(remaining = %cooldown::format_remaining(*remaining), "cooldown running");
        }
        ClientEvent::CooldownReady => info!("ready to place a pixel"),
        ClientEvent::Violation {
            x,
            y,
            actual,
            expected,
        } => {
            warn!(
                x,
                y,
                actual = actual.0,
                expected = expected.0,
                "protected pixel overwritten"
            );
        }
        ClientEvent::CorrectionSent { x, y, color } => {
            info!(x, y, color = color.0, "corrective write sent");
        }
        ClientEvent::PaintProgress { placed, total } => {
            info!(placed, total, "paint progress");
        }
        ClientEvent::Disconnected => warn!("server closed the connection"),
        ClientEvent::Error(message) => warn!(%message, "client error"),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedPixel {
    x: i32,
    y: i32,
    color: u8,
}

fn read_state_file(path: &Path) -> Result<HashMap<WorldPoint, Color>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file '{}'", path.display()))?;
    let pixels: Vec<SavedPixel> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid state file '{}'", path.display()))?;
    Ok(pixels
        .into_iter()
        .map(|pixel| (WorldPoint::new(pixel.x, pixel.y), Color(pixel.color)))
        .collect())
}

fn write_state_file(path: &Path, state: &HashMap<WorldPoint, Color>) -> Result<()> {
    let mut pixels: Vec<SavedPixel> = state
        .iter()
        .map(|(point, color)| SavedPixel {
            x: point.x,
            y: point.y,
            color: color.0,
        })
        .collect();
    pixels.sort_by_key(|pixel| (pixel.y, pixel.x));
    let raw = serde_json::to_string_pretty(&pixels)?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write state file '{}'", path.display()))
}

fn read_template(path: &Path) -> Result<Vec<Vec<Option<Color>>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read template '{}'", path.display()))?;
    let rows: Vec<Vec<Option<u8>>> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid template '{}'", path.display()))?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(|cell| cell.map(Color)).collect())
        .collect())
}
