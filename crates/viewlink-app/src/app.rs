use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use viewlink_core::{Modifiers, PresenterConfig};
use viewlink_engine::Engine;
use viewlink_renderer::{SoftwareRenderer, StaticTracking};
use viewlink_transport::{LoopbackTransport, ViewerProfile};

use crate::demo::{DemoSchedule, DemoViewer};

/// Presenter main loop.
///
/// # Environment
/// - `VIEWLINK_CONFIG` — path to a JSON `PresenterConfig` (camelCase or snake_case keys)
/// - `VIEWLINK_TICK_HZ` — override the tick rate
/// - `VIEWLINK_MAX_TICKS` — stop after this many ticks (default: run until Ctrl-C)
///
/// # Flow
/// 1. Load and validate the configuration
/// 2. Register with the loopback transport and start listening
/// 3. Every tick: let the scripted viewer act, then tick the engine
/// 4. Key commands typed on stdin (`m`, `ctrl+a`, `shift+r`, ...) go to the dispatcher
pub async fn run() -> Result<()> {
    let config = load_config()?;
    let max_ticks: Option<u64> = std::env::var("VIEWLINK_MAX_TICKS").ok().and_then(|s| s.parse().ok());

    info!(
        "Node '{}' | window {} at ({}, {}) | {} Hz",
        config.node_name,
        config.window.resolution(),
        config.window.x,
        config.window.y,
        config.tick_hz
    );

    let tracking = StaticTracking { clip_planes: config.clip_planes, ..Default::default() };
    let mut engine = Engine::new(
        config.clone(),
        LoopbackTransport::new(ViewerProfile::default()),
        SoftwareRenderer::new(),
        tracking,
    )
    .context("Failed to start presenter engine")?;

    let mut demo = DemoViewer::new(DemoSchedule::for_tick_rate(config.tick_hz));
    let mut ticker = tokio::time::interval(config.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut tick: u64 = 0;
    let mut consecutive_errors: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                demo.step(&mut engine, tick);
                match engine.tick() {
                    Ok(report) => {
                        consecutive_errors = 0;
                        if report.failures > 0 {
                            debug!("Tick {}: {} session failure(s)", tick, report.failures);
                        }
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        warn!("Tick {} failed ({}/{}): {}", tick, consecutive_errors, config.max_session_failures, e);
                        if consecutive_errors >= config.max_session_failures {
                            return Err(e).context("Engine failed on consecutive ticks");
                        }
                    }
                }
                tick += 1;
                if max_ticks.is_some_and(|max| tick >= max) {
                    info!("Reached {} ticks, stopping", tick);
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => handle_input_line(&mut engine, &line),
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    let stats = &engine.state().stats;
    info!(
        "Session summary: {} frames sent, {} skipped, {} webcam frames fed",
        stats.sent(),
        stats.skipped(),
        demo.frames_pushed()
    );
    Ok(())
}

fn load_config() -> Result<PresenterConfig> {
    let mut config = match std::env::var("VIEWLINK_CONFIG") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("Reading config {path}"))?;
            PresenterConfig::from_json(&json).with_context(|| format!("Parsing config {path}"))?
        }
        Err(_) => PresenterConfig::default(),
    };
    apply_tick_override(&mut config, std::env::var("VIEWLINK_TICK_HZ").ok().as_deref());
    config.validate().context("Invalid presenter configuration")?;
    Ok(config)
}

fn apply_tick_override(config: &mut PresenterConfig, value: Option<&str>) {
    if let Some(hz) = value.and_then(|s| s.parse::<u32>().ok()) {
        config.tick_hz = hz;
    }
}

fn handle_input_line<R, K>(engine: &mut Engine<LoopbackTransport, R, K>, line: &str)
where
    R: viewlink_renderer::RenderBackend,
    K: viewlink_renderer::TrackingSource,
{
    let Some((key, modifiers)) = parse_key(line) else {
        if !line.trim().is_empty() {
            warn!("Unrecognised input '{}'", line.trim());
        }
        return;
    };
    match engine.handle_key(key, modifiers) {
        Ok(Some(outcome)) => info!("Key '{}' → {:?}", line.trim(), outcome),
        Ok(None) => warn!("No binding for '{}'", line.trim()),
        Err(e) => warn!("Key '{}' failed: {}", line.trim(), e),
    }
}

/// Parse `x`, `ctrl+x` or `shift+x` into a key and its modifiers.
fn parse_key(line: &str) -> Option<(char, Modifiers)> {
    let line = line.trim().to_ascii_lowercase();
    let (modifiers, key) = if let Some(key) = line.strip_prefix("ctrl+") {
        (Modifiers::CTRL, key)
    } else if let Some(key) = line.strip_prefix("shift+") {
        (Modifiers::SHIFT, key)
    } else {
        (Modifiers::NONE, line.as_str())
    };
    let mut chars = key.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some((c, modifiers))
}
