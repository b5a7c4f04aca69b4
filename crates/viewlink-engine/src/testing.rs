//! Shared fixtures for the engine unit tests.

use glam::{Mat4, Vec3};
use viewlink_core::{
    CameraIntrinsics, IncomingFrame, Mode, PresenterConfig, SessionId, SessionState, Viewport,
};
use viewlink_renderer::{SoftwareRenderer, StaticTracking};
use viewlink_transport::{LoopbackTransport, SessionTransport, ViewerProfile};

use crate::catalog::ModeCatalog;
use crate::frame_pump::{self, PumpOutcome};
use crate::negotiator;
use crate::state::EngineState;

pub(crate) struct Rig {
    pub state:     EngineState,
    pub transport: LoopbackTransport,
    pub renderer:  SoftwareRenderer,
    pub tracking:  StaticTracking,
    pub id:        SessionId,
}

pub(crate) fn small_config() -> PresenterConfig {
    PresenterConfig { window: Viewport::new(0, 0, 160, 120), ..Default::default() }
}

/// One viewer session, accepted, active and sitting in `NoMode`.
pub(crate) fn rig(config: PresenterConfig, profile: ViewerProfile) -> Rig {
    let mut transport = LoopbackTransport::new(profile);
    let catalog = ModeCatalog::resolve(&mut transport).unwrap();
    transport.set_supported_modes(&catalog.supported_modes()).unwrap();
    let mut state = EngineState::new(config, catalog);
    let id = transport.open_viewer_session();
    transport.refresh_sessions().unwrap();
    transport.accept(id).unwrap();
    transport.refresh_sessions().unwrap();
    state.active_session = Some(id);
    Rig { state, transport, renderer: SoftwareRenderer::new(), tracking: StaticTracking::default(), id }
}

impl Rig {
    /// Request `mode` and run setup until the session is active.
    pub fn activate(&mut self, mode: Mode) {
        self.transport.set_session_mode(self.id, mode).unwrap();
        self.finish_setup();
    }

    pub fn finish_setup(&mut self) {
        for _ in 0..4 {
            if self.transport.session_state(self.id).unwrap() == SessionState::ModeActive {
                return;
            }
            negotiator::set_up_mode(&mut self.state, &mut self.transport, &mut self.renderer, self.id).unwrap();
            self.transport.refresh_sessions().unwrap();
        }
        assert_eq!(self.transport.session_state(self.id).unwrap(), SessionState::ModeActive);
    }

    /// Pump once, then let the viewer drain.
    pub fn pump(&mut self) -> PumpOutcome {
        let outcome = frame_pump::pump(
            &mut self.state,
            &mut self.transport,
            &mut self.renderer,
            &self.tracking,
            self.id,
        )
        .unwrap();
        self.transport.refresh_sessions().unwrap();
        outcome
    }

    pub fn sent_tags(&self) -> Vec<Option<u64>> {
        self.transport.session(self.id).unwrap().sent_frames().iter().map(|f| f.tag).collect()
    }
}

/// Webcam 1.5 m in front of the display, looking at it.
pub(crate) fn webcam_frame(tag: u64) -> IncomingFrame {
    IncomingFrame {
        tag,
        camera_pose: Mat4::from_translation(Vec3::new(0.0, 0.0, 1.5)),
        intrinsics:  CameraIntrinsics {
            focal_length: 500.0,
            principal_point_offset_x: 320.0,
            principal_point_offset_y: 240.0,
            ..Default::default()
        },
    }
}
