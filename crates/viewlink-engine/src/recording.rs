//! Viewer-side video recording: state monitoring and user commands.

use tracing::{info, warn};
use viewlink_core::{
    Capability, PresenterError, RecordingCommand, SessionId, SettingKey, SettingValue,
    VideoRecordingQuality, VideoRecordingState,
};
use viewlink_transport::SessionTransport;

use crate::state::EngineState;

/// Log recording state edges for `id` and clear reported errors.
///
/// Returns the state observed before any error was cleared.
pub fn monitor(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    id: SessionId,
) -> Result<VideoRecordingState, PresenterError> {
    let current = transport.video_recording_state(id)?;
    let record = state.record_mut(id);
    if current != record.last_recording_state {
        info!(
            "Session[{}] Video recording state transition: {} => {}",
            id, record.last_recording_state, current
        );
        record.last_recording_state = current;
    }

    if current == VideoRecordingState::Error {
        let code = transport.video_recording_error(id)?;
        warn!("Session[{}] Video recording error code = {}", id, code);
        transport.clear_video_recording_error(id)?;
    }
    Ok(current)
}

/// Apply a recording command to the active session.
///
/// Commands that do not fit the current recording state are ignored; the
/// return value tells whether anything was sent to the viewer.
pub fn execute(
    state: &EngineState,
    transport: &mut dyn SessionTransport,
    id: SessionId,
    command: RecordingCommand,
) -> Result<bool, PresenterError> {
    use VideoRecordingState as S;

    let current = transport.video_recording_state(id)?;
    if current == S::NotAvailable {
        return Ok(false);
    }

    match (command, current) {
        (RecordingCommand::CycleQuality, S::NotRecording) => cycle_quality(transport, id),
        (RecordingCommand::Start, S::NotRecording) => {
            transport.start_video_recording(id)?;
            info!("Session[{}] Video recording started", id);
            Ok(true)
        }
        (RecordingCommand::PauseResume, S::Recording) => {
            transport.pause_video_recording(id)?;
            info!("Session[{}] Video recording paused", id);
            Ok(true)
        }
        (RecordingCommand::PauseResume, S::Paused) => {
            transport.resume_video_recording(id)?;
            info!("Session[{}] Video recording resumed", id);
            Ok(true)
        }
        (RecordingCommand::Finish, S::Recording | S::Paused) => {
            transport.finish_video_recording(id)?;
            info!("Session[{}] Video recording finished", id);
            Ok(true)
        }
        (RecordingCommand::Save, S::Finished) => {
            transport.save_video_recording(id, &state.recording_save_path)?;
            info!("Session[{}] Video recording saved to {}", id, state.recording_save_path.display());
            Ok(true)
        }
        (RecordingCommand::Discard, S::Finished) => {
            transport.discard_video_recording(id)?;
            info!("Session[{}] Video recording discarded", id);
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn cycle_quality(transport: &mut dyn SessionTransport, id: SessionId) -> Result<bool, PresenterError> {
    if !transport.supports_capability(id, Capability::VideoRecording)? {
        return Ok(false);
    }
    let raw = transport.setting_u32(id, SettingKey::VideoRecordingQuality)?;
    let Some(quality) = VideoRecordingQuality::from_u32(raw) else {
        warn!("Session[{}] Unknown video recording quality {}; leaving it unchanged", id, raw);
        return Ok(false);
    };
    let next = quality.next();
    transport.set_setting(id, SettingKey::VideoRecordingQuality, SettingValue::U32(next.as_u32()))?;
    info!("Session[{}] Video recording quality {} → {}", id, quality, next);
    Ok(true)
}
