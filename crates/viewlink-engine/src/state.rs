use std::collections::HashMap;
use std::path::{Path, PathBuf};

use viewlink_core::{
    Mode, PresenterConfig, Resolution, SessionId, TransportError, VideoRecordingState, Viewport,
};
use viewlink_renderer::TargetId;
use viewlink_transport::SessionTransport;

use crate::catalog::ModeCatalog;
use crate::frame_pump::FrameStats;

// MARK: - Mode resources

/// Resources owned by standard mode while it is set up.
#[derive(Debug, Clone, Default)]
pub struct StandardModeState {
    /// Image size last written to the viewer.
    pub image:        Resolution,
    pub target:       Option<TargetId>,
    /// Tag of the next frame sent.
    pub frame_number: u64,
}

/// Resources owned by augmented reality mode while it is set up.
#[derive(Debug, Clone, Default)]
pub struct ArModeState {
    /// Image size requested by the viewer.
    pub image:    Resolution,
    pub target:   Option<TargetId>,
    /// Tag of the input frame echoed by the last sent frame.
    pub last_tag: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArToggles {
    pub draw_mask:       bool,
    pub draw_background: bool,
}

// MARK: - Per-session bookkeeping

#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Recording state observed on the previous tick.
    pub last_recording_state: VideoRecordingState,
    /// Consecutive ticks that failed for this session.
    pub failures:             u32,
    /// Consecutive ticks spent waiting for the viewer to finish a setup phase.
    pub setup_wait_ticks:     u32,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            last_recording_state: VideoRecordingState::NotAvailable,
            failures:             0,
            setup_wait_ticks:     0,
        }
    }
}

// MARK: - EngineState

/// Everything the engine remembers between ticks.
///
/// Owned by [`crate::Engine`] and lent to each component for the duration of
/// one call.
#[derive(Debug)]
pub struct EngineState {
    pub config:              PresenterConfig,
    /// Local render viewport, virtual-desktop pixels.
    pub viewport:            Viewport,
    pub node_status:         String,
    /// The single accepted session, if any.
    pub active_session:      Option<SessionId>,
    pub catalog:             ModeCatalog,
    /// Position in the active session's supported-mode list used by the last
    /// mode switch.
    pub mode_index:          usize,
    /// Mode the current resources were set up for.
    pub latest_mode:         Option<Mode>,
    pub standard:            StandardModeState,
    pub augmented:           ArModeState,
    pub toggles:             ArToggles,
    pub sessions:            HashMap<SessionId, SessionRecord>,
    pub stats:               FrameStats,
    pub recording_save_path: PathBuf,
}

impl EngineState {
    pub fn new(config: PresenterConfig, catalog: ModeCatalog) -> Self {
        let recording_save_path = resolve_recording_path(&config.recording_save_name);
        Self {
            viewport: config.window,
            node_status: String::new(),
            active_session: None,
            catalog,
            mode_index: 0,
            latest_mode: None,
            standard: StandardModeState::default(),
            augmented: ArModeState::default(),
            toggles: ArToggles {
                draw_mask:       config.draw_mask,
                draw_background: config.draw_background,
            },
            sessions: HashMap::new(),
            stats: FrameStats::new(config.stats_interval_frames),
            recording_save_path,
            config,
        }
    }

    pub fn is_active(&self, id: SessionId) -> bool {
        self.active_session == Some(id)
    }

    pub fn record_mut(&mut self, id: SessionId) -> &mut SessionRecord {
        self.sessions.entry(id).or_default()
    }

    /// Publish a node status string and remember it.
    pub fn set_node_status(
        &mut self,
        transport: &mut dyn SessionTransport,
        status: &str,
    ) -> Result<(), TransportError> {
        transport.set_node_status(status)?;
        self.node_status = status.to_owned();
        Ok(())
    }

    /// Forget bookkeeping for sessions the transport no longer reports.
    pub fn retain_sessions(&mut self, live: &[SessionId]) {
        self.sessions.retain(|id, _| live.contains(id));
    }
}

/// Recordings are saved next to the executable.
fn resolve_recording_path(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join(name)
}
