use thiserror::Error;

use crate::types::{Mode, SessionId, SessionState, SettingKey, SettingType};

#[derive(Error, Debug)]
pub enum PresenterError {
    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("No supported modes could be resolved by the transport")]
    NoSupportedModes,

    #[error("Session {session} waited {ticks} ticks for the viewer to finish mode setup")]
    SetupTimeout { session: SessionId, ticks: u32 },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

impl PresenterError {
    /// Failures that concern a single session. Anything else stops the engine.
    pub fn is_session_scoped(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_session_scoped(),
            Self::Render(_) | Self::SetupTimeout { .. } => true,
            Self::ConfigurationInvalid { .. } | Self::NoSupportedModes => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Unknown session {session}")]
    UnknownSession { session: SessionId },

    #[error("Operation '{op}' is not valid while the session is {state}")]
    InvalidState { op: &'static str, state: SessionState },

    #[error("Mode {mode} is not supported by this transport")]
    UnsupportedMode { mode: Mode },

    #[error("A settings batch is already open")]
    BatchAlreadyOpen,

    #[error("No settings batch is open")]
    NoOpenBatch,

    #[error("Setting {key:?} expects {expected:?}, got {actual:?}")]
    SettingTypeMismatch { key: SettingKey, expected: SettingType, actual: SettingType },

    #[error("Setting {key:?} has no value")]
    SettingUnset { key: SettingKey },

    #[error("Frame slot {slot} does not belong to this session")]
    FrameNotOwned { slot: u32 },

    #[error("Previously received frame has not been released")]
    FrameNotReleased,

    #[error("Session is closed")]
    ConnectionClosed,

    #[error("Operation failed: {reason}")]
    OperationFailed { reason: String },

    #[error("Listener failed: {reason}")]
    ListenerFailed { reason: String },
}

impl TransportError {
    /// Whether the failure only concerns one session and the engine may keep
    /// serving the others.
    pub fn is_session_scoped(&self) -> bool {
        !matches!(self, Self::ListenerFailed { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Unknown render target {id}")]
    UnknownTarget { id: u32 },

    #[error("Render target is {actual}, expected {expected}")]
    SizeMismatch { expected: String, actual: String },

    #[error("Destination buffer holds {actual} bytes, need {needed}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Render target allocation failed: {0}")]
    AllocationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_listener_and_startup_failures_are_engine_wide() {
        assert!(PresenterError::from(TransportError::ConnectionClosed).is_session_scoped());
        assert!(PresenterError::SetupTimeout { session: SessionId::new_v4(), ticks: 3 }.is_session_scoped());
        assert!(!PresenterError::from(TransportError::ListenerFailed { reason: "down".into() }).is_session_scoped());
        assert!(!PresenterError::NoSupportedModes.is_session_scoped());
    }
}
