//! viewlink-transport — session transport seam for the presenter engine.
//!
//! The engine never talks to a network stack directly. Everything it needs
//! from a viewer connection goes through [`SessionTransport`]: session
//! enumeration and lifecycle, mode negotiation, typed settings with atomic
//! batches, frame slots in both directions, and video-recording control.
//!
//! # Implementations
//! - [`LoopbackTransport`] — in-process simulated viewer used by the demo
//!   binary and the engine tests.

use std::path::Path;

use tracing::warn;

use viewlink_core::{
    Capability, CloseAction, CloseReason, IncomingFrame, Mode, OutgoingFrame, SessionId,
    SessionState, SettingKey, SettingType, SettingValue, SetupPhase, SupportedMode,
    TransportError, VideoRecordingState,
};

pub mod loopback;
pub mod settings;

pub use loopback::{
    CloseRecord, LoopbackSession, LoopbackTransport, SentFrame, ViewerProfile, SENT_FRAME_HISTORY,
    STATUS_HISTORY,
};
pub use settings::{RemoteView, SettingsStore};

// MARK: - SessionTransport trait

/// Operations the presenter engine consumes from the session layer.
///
/// All calls are non-blocking. "Nothing available right now" is reported as
/// `Ok(None)`, never as an error.
pub trait SessionTransport {
    // ── Node ────────────────────────────────────────────────────────────────

    fn set_node_name(&mut self, name: &str) -> Result<(), TransportError>;

    fn set_node_status(&mut self, status: &str) -> Result<(), TransportError>;

    /// Check that the transport can carry `mode`'s descriptor.
    fn resolve_mode(&mut self, mode: Mode) -> Result<(), TransportError>;

    fn set_supported_modes(&mut self, modes: &[SupportedMode]) -> Result<(), TransportError>;

    fn set_supported_capabilities(&mut self, capabilities: &[Capability]) -> Result<(), TransportError>;

    fn start_listening(&mut self) -> Result<(), TransportError>;

    /// Initiate a session with the default viewer.
    fn connect_to_default_viewer(&mut self) -> Result<(), TransportError>;

    // ── Sessions ────────────────────────────────────────────────────────────

    /// Refresh every session snapshot and return the current session list.
    fn refresh_sessions(&mut self) -> Result<Vec<SessionId>, TransportError>;

    fn session_state(&self, id: SessionId) -> Result<SessionState, TransportError>;

    fn accept(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn close(
        &mut self,
        id: SessionId,
        action: CloseAction,
        reason: CloseReason,
        message: &str,
    ) -> Result<(), TransportError>;

    /// Release all transport resources of a closed session.
    fn destroy(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn supports_capability(&self, id: SessionId, capability: Capability) -> Result<bool, TransportError>;

    // ── Modes ───────────────────────────────────────────────────────────────

    fn session_mode(&self, id: SessionId) -> Result<Option<Mode>, TransportError>;

    /// Modes supported by both ends, in negotiation order.
    fn session_supported_modes(&self, id: SessionId) -> Result<Vec<SupportedMode>, TransportError>;

    fn set_session_mode(&mut self, id: SessionId, mode: Mode) -> Result<(), TransportError>;

    /// Current setup phase and whether this side already completed it and is
    /// waiting for the remote side.
    fn setup_phase(&self, id: SessionId) -> Result<(SetupPhase, bool), TransportError>;

    fn complete_setup_phase(&mut self, id: SessionId, phase: SetupPhase) -> Result<(), TransportError>;

    fn pause_mode(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn resume_mode(&mut self, id: SessionId) -> Result<(), TransportError>;

    // ── Settings ────────────────────────────────────────────────────────────

    fn begin_settings_batch(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn end_settings_batch(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn abort_settings_batch(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn setting(&self, id: SessionId, key: SettingKey) -> Result<SettingValue, TransportError>;

    fn set_setting(&mut self, id: SessionId, key: SettingKey, value: SettingValue) -> Result<(), TransportError>;

    fn setting_u16(&self, id: SessionId, key: SettingKey) -> Result<u16, TransportError> {
        let value = self.setting(id, key)?;
        value.as_u16().ok_or(TransportError::SettingTypeMismatch {
            key,
            expected: SettingType::U16,
            actual: value.value_type(),
        })
    }

    fn setting_u32(&self, id: SessionId, key: SettingKey) -> Result<u32, TransportError> {
        let value = self.setting(id, key)?;
        value.as_u32().ok_or(TransportError::SettingTypeMismatch {
            key,
            expected: SettingType::U32,
            actual: value.value_type(),
        })
    }

    fn setting_f32(&self, id: SessionId, key: SettingKey) -> Result<f32, TransportError> {
        let value = self.setting(id, key)?;
        value.as_f32().ok_or(TransportError::SettingTypeMismatch {
            key,
            expected: SettingType::F32,
            actual: value.value_type(),
        })
    }

    // ── Frames ──────────────────────────────────────────────────────────────

    /// Next free outgoing slot, or `None` when the viewer is behind.
    fn acquire_frame(&mut self, id: SessionId) -> Result<Option<OutgoingFrame>, TransportError>;

    fn send_frame(&mut self, id: SessionId, frame: OutgoingFrame) -> Result<(), TransportError>;

    /// Return an acquired slot without sending it.
    fn discard_frame(&mut self, id: SessionId, frame: OutgoingFrame) -> Result<(), TransportError>;

    /// Next frame from the viewer, or `None` when nothing has arrived.
    fn receive_frame(&mut self, id: SessionId) -> Result<Option<IncomingFrame>, TransportError>;

    fn release_received_frame(&mut self, id: SessionId, frame: IncomingFrame) -> Result<(), TransportError>;

    // ── Video recording ─────────────────────────────────────────────────────

    fn video_recording_state(&self, id: SessionId) -> Result<VideoRecordingState, TransportError>;

    fn video_recording_error(&self, id: SessionId) -> Result<u32, TransportError>;

    fn clear_video_recording_error(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn start_video_recording(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn pause_video_recording(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn resume_video_recording(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn finish_video_recording(&mut self, id: SessionId) -> Result<(), TransportError>;

    fn save_video_recording(&mut self, id: SessionId, path: &Path) -> Result<(), TransportError>;

    fn discard_video_recording(&mut self, id: SessionId) -> Result<(), TransportError>;
}

// MARK: - Batch helper

/// Write `values` as one atomic batch.
///
/// If any write fails the batch is aborted, so the remote side never sees a
/// subset of `values`.
pub fn write_batch<T: SessionTransport + ?Sized>(
    transport: &mut T,
    id: SessionId,
    values: &[(SettingKey, SettingValue)],
) -> Result<(), TransportError> {
    transport.begin_settings_batch(id)?;
    for (key, value) in values {
        if let Err(e) = transport.set_setting(id, *key, *value) {
            if let Err(abort) = transport.abort_settings_batch(id) {
                warn!("Session[{}] Failed to abort settings batch: {}", id, abort);
            }
            return Err(e);
        }
    }
    transport.end_settings_batch(id)
}
