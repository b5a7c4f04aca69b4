pub mod config;
pub mod errors;
pub mod input;
pub mod types;

pub use config::{ClipPlanes, OverlayConfig, PresenterConfig};
pub use errors::{PresenterError, RenderError, TransportError};
pub use input::{InputCommand, Modifiers, OverlayCommand, RecordingCommand};
pub use types::*;

/// Node status shown to viewers while no session is active.
pub const STATUS_NOT_CONNECTED: &str = "Awaiting connection";
/// Node status shown to viewers while a session is active.
pub const STATUS_CONNECTED: &str = "Connected";
