//! Per-tick frame production for the active session.
//!
//! Standard mode renders the local viewpoint and tags each frame with a
//! session-local counter. Augmented reality mode renders from the webcam pose
//! of the viewer's latest input frame and echoes that frame's tag, so the
//! viewer can pair the rendered overlay with the webcam image it came from.
//!
//! A missing slot is never an error: the tick is skipped and the counter is
//! left alone.

use std::time::Instant;

use tracing::{debug, info};
use viewlink_core::{
    Mode, OutgoingFrame, PresenterError, RenderError, SessionId, SettingKey, SettingValue, Viewport,
};
use viewlink_geometry::ArFrameGeometry;
use viewlink_renderer::{ArPasses, RenderBackend, StandardView, TargetId, TrackingSource};
use viewlink_transport::{write_batch, SessionTransport};

use crate::state::EngineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    Sent { tag: u64 },
    /// The viewer had no free slot; nothing was rendered or counted.
    NoSlot,
    /// Augmented reality mode with no input frame waiting.
    NoInput,
    /// No mode or no render target to pump.
    Idle,
}

// ── Stats ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct FpsCounter {
    count:        u32,
    window_start: Instant,
    last_fps:     f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self { count: 0, window_start: Instant::now(), last_fps: 0.0 }
    }

    fn tick(&mut self) {
        self.count += 1;
    }

    /// Rate over the window since the last sample; reuses the previous value
    /// if the window is shorter than half a second.
    fn fps(&mut self) -> f32 {
        let elapsed = self.window_start.elapsed().as_secs_f32();
        if elapsed >= 0.5 {
            self.last_fps = self.count as f32 / elapsed;
            self.count = 0;
            self.window_start = Instant::now();
        }
        self.last_fps
    }
}

/// Sent/skipped counters for the active session, logged every `interval`
/// frames.
#[derive(Debug)]
pub struct FrameStats {
    interval: u64,
    sent:     u64,
    skipped:  u64,
    fps:      FpsCounter,
}

impl FrameStats {
    pub fn new(interval: u64) -> Self {
        Self { interval, sent: 0, skipped: 0, fps: FpsCounter::new() }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn record_sent(&mut self, id: SessionId, mode: Mode, tag: u64) {
        self.sent += 1;
        self.fps.tick();
        if self.sent == 1 {
            info!("Session[{}] First {} frame sent (tag {})", id, mode, tag);
        }
        if self.interval > 0 && self.sent % self.interval == 0 {
            let fps = self.fps.fps();
            info!(
                "Session[{}] {}: {} frames sent, {} skipped, {:.1} fps",
                id, mode, self.sent, self.skipped, fps
            );
        }
    }

    fn record_skipped(&mut self) {
        self.skipped += 1;
    }
}

// ── Pump ──────────────────────────────────────────────────────────────────────

/// Produce at most one frame for `id`, according to its current mode.
pub fn pump(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    renderer: &mut dyn RenderBackend,
    tracking: &dyn TrackingSource,
    id: SessionId,
) -> Result<PumpOutcome, PresenterError> {
    match transport.session_mode(id)? {
        Some(Mode::Standard) => {
            let outcome = pump_standard(state, transport, renderer, tracking, id)?;
            handle_resolution_change(state, transport, id)?;
            Ok(outcome)
        }
        Some(Mode::AugmentedReality) => pump_augmented(state, transport, renderer, tracking, id),
        None => Ok(PumpOutcome::Idle),
    }
}

fn pump_standard(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    renderer: &mut dyn RenderBackend,
    tracking: &dyn TrackingSource,
    id: SessionId,
) -> Result<PumpOutcome, PresenterError> {
    let Some(target) = state.standard.target else {
        return Ok(PumpOutcome::Idle);
    };
    let Some(mut frame) = transport.acquire_frame(id)? else {
        state.stats.record_skipped();
        return Ok(PumpOutcome::NoSlot);
    };

    let tag = state.standard.frame_number;
    frame.set_frame_number(tag);
    if let Err(e) = render_standard(state.viewport, renderer, tracking, target, &mut frame) {
        transport.discard_frame(id, frame)?;
        return Err(e.into());
    }
    transport.send_frame(id, frame)?;

    state.standard.frame_number += 1;
    state.stats.record_sent(id, Mode::Standard, tag);
    Ok(PumpOutcome::Sent { tag })
}

fn render_standard(
    viewport: Viewport,
    renderer: &mut dyn RenderBackend,
    tracking: &dyn TrackingSource,
    target: TargetId,
    frame: &mut OutgoingFrame,
) -> Result<(), RenderError> {
    let image = renderer.target_resolution(target)?;
    let view = StandardView {
        view:       tracking.center_eye_view() * tracking.camera_transform(),
        projection: tracking.center_eye_projection(&viewport),
        viewport:   Viewport::new(viewport.x, viewport.y, image.width, image.height),
    };
    renderer.draw_standard(target, &view)?;
    renderer.read_pixels(target, frame.color_buffer_mut())
}

/// Ask the viewer for a new image size when the local viewport was resized.
/// Width and height go out as one batch; the viewer answers by sending the
/// session back through setup completion.
fn handle_resolution_change(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    id: SessionId,
) -> Result<(), PresenterError> {
    let wanted = state.viewport.resolution();
    if wanted == state.standard.image {
        return Ok(());
    }
    write_batch(
        transport,
        id,
        &[
            (SettingKey::ImageWidth, SettingValue::U16(wanted.width)),
            (SettingKey::ImageHeight, SettingValue::U16(wanted.height)),
        ],
    )?;
    info!("Session[{}] Standard image resized {} → {}", id, state.standard.image, wanted);
    state.standard.image = wanted;
    Ok(())
}

fn pump_augmented(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    renderer: &mut dyn RenderBackend,
    tracking: &dyn TrackingSource,
    id: SessionId,
) -> Result<PumpOutcome, PresenterError> {
    let Some(target) = state.augmented.target else {
        return Ok(PumpOutcome::Idle);
    };
    let Some(input) = transport.receive_frame(id)? else {
        return Ok(PumpOutcome::NoInput);
    };

    let tag = input.tag;
    let geometry = ArFrameGeometry::compute(
        &input,
        state.augmented.image,
        state.config.clip_planes,
        &state.viewport,
        &tracking.snapshot(&state.viewport),
    );
    transport.release_received_frame(id, input)?;

    let Some(mut frame) = transport.acquire_frame(id)? else {
        debug!("Session[{}] No slot for input frame {}", id, tag);
        state.stats.record_skipped();
        return Ok(PumpOutcome::NoSlot);
    };
    frame.set_frame_number(tag);

    let passes = ArPasses {
        geometry:        &geometry,
        draw_mask:       state.toggles.draw_mask,
        draw_background: state.toggles.draw_background,
    };
    let rendered = renderer
        .draw_augmented(target, &passes)
        .and_then(|()| renderer.read_pixels(target, frame.color_buffer_mut()));
    if let Err(e) = rendered {
        transport.discard_frame(id, frame)?;
        return Err(e.into());
    }
    transport.send_frame(id, frame)?;

    state.augmented.last_tag = Some(tag);
    state.stats.record_sent(id, Mode::AugmentedReality, tag);
    Ok(PumpOutcome::Sent { tag })
}
