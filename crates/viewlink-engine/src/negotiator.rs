//! Two-phase mode setup.
//!
//! While a session sits in `ModeSetup`, each tick either waits for the viewer
//! (this side already completed the current phase) or does the phase work and
//! signals completion:
//!
//! | Phase          | Standard                              | AugmentedReality                    |
//! |----------------|---------------------------------------|-------------------------------------|
//! | Initialization | write image width/height as one batch | nothing, the viewer sizes the image |
//! | Completion     | (re)create the render target          | read image size, (re)create target  |
//!
//! Setup work always tears down before allocating, so re-entering setup for
//! the same mode never leaks or double-allocates.

use tracing::{debug, info, warn};
use viewlink_core::{Mode, PresenterError, SessionId, SettingKey, SettingValue, SetupPhase};
use viewlink_renderer::{RenderBackend, TargetKind};
use viewlink_transport::{write_batch, SessionTransport};

use crate::state::EngineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupProgress {
    /// This side is done with the phase; the viewer is not.
    Awaiting,
    Completed(SetupPhase),
    /// The session reports no mode yet.
    NoMode,
}

pub fn set_up_mode(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    renderer: &mut dyn RenderBackend,
    id: SessionId,
) -> Result<SetupProgress, PresenterError> {
    let mode = transport.session_mode(id)?;
    if mode != state.latest_mode {
        tear_down_mode(state, renderer)?;
        state.latest_mode = mode;
        if let Some(mode) = mode {
            info!("Session[{}] Mode change detected → {}", id, mode);
        }
    }

    let (phase, awaiting) = transport.setup_phase(id)?;
    if awaiting {
        let limit = state.config.setup_wait_timeout_ticks;
        let record = state.record_mut(id);
        record.setup_wait_ticks += 1;
        if record.setup_wait_ticks > limit {
            return Err(PresenterError::SetupTimeout { session: id, ticks: record.setup_wait_ticks });
        }
        return Ok(SetupProgress::Awaiting);
    }
    state.record_mut(id).setup_wait_ticks = 0;

    let Some(mode) = mode else {
        return Ok(SetupProgress::NoMode);
    };

    match (phase, mode) {
        (SetupPhase::Initialization, Mode::Standard) => {
            let image = state.viewport.resolution();
            write_batch(
                transport,
                id,
                &[
                    (SettingKey::ImageWidth, SettingValue::U16(image.width)),
                    (SettingKey::ImageHeight, SettingValue::U16(image.height)),
                ],
            )?;
            state.standard.image = image;
            debug!("Session[{}] Standard image size set to {}", id, image);
        }
        (SetupPhase::Initialization, Mode::AugmentedReality) => {}
        (SetupPhase::Completion, Mode::Standard) => set_up_standard(state, renderer)?,
        (SetupPhase::Completion, Mode::AugmentedReality) => set_up_augmented(state, transport, renderer, id)?,
    }

    transport.complete_setup_phase(id, phase)?;
    info!("Session[{}] {} mode {:?} phase complete", id, mode, phase);
    Ok(SetupProgress::Completed(phase))
}

/// Release everything any mode allocated. Safe to call repeatedly.
pub fn tear_down_mode(state: &mut EngineState, renderer: &mut dyn RenderBackend) -> Result<(), PresenterError> {
    tear_down_standard(state, renderer)?;
    tear_down_augmented(state, renderer)?;
    if let Some(mode) = state.latest_mode.take() {
        debug!("{} mode torn down", mode);
    }
    Ok(())
}

fn set_up_standard(state: &mut EngineState, renderer: &mut dyn RenderBackend) -> Result<(), PresenterError> {
    tear_down_standard(state, renderer)?;
    let image = state.standard.image;
    state.standard.target = Some(renderer.create_target(TargetKind::Standard, image)?);
    state.standard.frame_number = 0;
    debug!("Standard mode target ready at {}", image);
    Ok(())
}

fn tear_down_standard(state: &mut EngineState, renderer: &mut dyn RenderBackend) -> Result<(), PresenterError> {
    if let Some(target) = state.standard.target.take() {
        renderer.destroy_target(target)?;
    }
    Ok(())
}

fn set_up_augmented(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    renderer: &mut dyn RenderBackend,
    id: SessionId,
) -> Result<(), PresenterError> {
    tear_down_augmented(state, renderer)?;
    let width = transport.setting_u16(id, SettingKey::ImageWidth)?;
    let height = transport.setting_u16(id, SettingKey::ImageHeight)?;
    let image = viewlink_core::Resolution::new(width, height);
    if image.total_pixels() == 0 {
        warn!("Session[{}] Viewer requested an empty augmented reality image", id);
    }
    state.augmented.image = image;
    state.augmented.target = Some(renderer.create_target(TargetKind::AugmentedReality, image)?);
    debug!("Session[{}] Augmented reality target ready at {}", id, image);
    Ok(())
}

fn tear_down_augmented(state: &mut EngineState, renderer: &mut dyn RenderBackend) -> Result<(), PresenterError> {
    if let Some(target) = state.augmented.target.take() {
        renderer.destroy_target(target)?;
    }
    state.augmented.last_tag = None;
    Ok(())
}
