//! Scripted viewer for the loopback transport.
//!
//! Plays a short session against the engine: connect, run standard mode,
//! resize the window, switch to augmented reality and feed it webcam frames
//! from a camera drifting in front of the display.

use glam::{Mat4, Vec3};
use tracing::{info, warn};
use viewlink_core::{
    CameraIntrinsics, IncomingFrame, InputCommand, Mode, SessionState, Viewport,
};
use viewlink_engine::{CommandOutcome, Engine};
use viewlink_renderer::{RenderBackend, TrackingSource};
use viewlink_transport::{LoopbackTransport, SessionTransport};

/// Times, in ticks, at which the script acts.
#[derive(Debug, Clone, Copy)]
pub struct DemoSchedule {
    pub resize_at: u64,
    pub switch_at: u64,
}

impl DemoSchedule {
    /// Resize after two seconds, switch modes after four.
    pub fn for_tick_rate(tick_hz: u32) -> Self {
        let hz = u64::from(tick_hz.max(1));
        Self { resize_at: 2 * hz, switch_at: 4 * hz }
    }
}

#[derive(Debug)]
pub struct DemoViewer {
    schedule:       DemoSchedule,
    connected:      bool,
    mode_requested: bool,
    next_tag:       u64,
}

impl DemoViewer {
    pub fn new(schedule: DemoSchedule) -> Self {
        Self { schedule, connected: false, mode_requested: false, next_tag: 0 }
    }

    /// Frames pushed so far in augmented reality mode.
    pub fn frames_pushed(&self) -> u64 {
        self.next_tag
    }

    /// Act on the engine before tick number `tick`.
    pub fn step<R, K>(&mut self, engine: &mut Engine<LoopbackTransport, R, K>, tick: u64)
    where
        R: RenderBackend,
        K: TrackingSource,
    {
        if !self.connected {
            self.connected = self.command(engine, InputCommand::Connect);
            return;
        }
        let Some(id) = engine.state().active_session else {
            return;
        };
        let Ok(state) = engine.transport().session_state(id) else {
            return;
        };

        if state == SessionState::NoMode && !self.mode_requested {
            info!("Demo: viewer requests {} mode", Mode::Standard);
            engine.transport_mut().viewer_request_mode(id, Mode::Standard);
            self.mode_requested = true;
        }
        if tick == self.schedule.resize_at {
            let vp = engine.state().viewport;
            let resized = Viewport::new(vp.x, vp.y, vp.width.saturating_add(160), vp.height.saturating_add(90));
            info!("Demo: window resized to {}", resized.resolution());
            engine.set_viewport(resized);
        }
        if tick == self.schedule.switch_at {
            self.command(engine, InputCommand::SwitchMode);
        }

        // Commands above may have moved the session on.
        let state = engine.transport().session_state(id).ok();
        let mode = engine.transport().session_mode(id).ok().flatten();
        if state == Some(SessionState::ModeActive) && mode == Some(Mode::AugmentedReality) {
            let frame = webcam_frame(self.next_tag, tick);
            engine.transport_mut().push_incoming_frame(id, frame);
            self.next_tag += 1;
        }
    }

    fn command<R, K>(&self, engine: &mut Engine<LoopbackTransport, R, K>, command: InputCommand) -> bool
    where
        R: RenderBackend,
        K: TrackingSource,
    {
        match engine.handle_command(command) {
            Ok(CommandOutcome::Executed) => true,
            Ok(CommandOutcome::Ignored) => false,
            Err(e) => {
                warn!("Demo: {:?} failed: {}", command, e);
                false
            }
        }
    }
}

/// Webcam 1.5 m in front of the display, swaying sideways.
fn webcam_frame(tag: u64, tick: u64) -> IncomingFrame {
    let sway = (tick as f32 * 0.05).sin() * 0.1;
    IncomingFrame {
        tag,
        camera_pose: Mat4::from_translation(Vec3::new(sway, 0.0, 1.5)),
        intrinsics:  CameraIntrinsics {
            focal_length: 500.0,
            principal_point_offset_x: 320.0,
            principal_point_offset_y: 240.0,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewlink_core::PresenterConfig;
    use viewlink_renderer::{SoftwareRenderer, StaticTracking};
    use viewlink_transport::ViewerProfile;

    #[test]
    fn script_reaches_augmented_reality() {
        let config = PresenterConfig { window: Viewport::new(0, 0, 160, 120), ..Default::default() };
        let mut engine = Engine::new(
            config,
            LoopbackTransport::new(ViewerProfile::default()),
            SoftwareRenderer::new(),
            StaticTracking::default(),
        )
        .unwrap();
        let mut demo = DemoViewer::new(DemoSchedule { resize_at: 10, switch_at: 20 });

        let resized = viewlink_core::Resolution::new(320, 210);
        let mut saw_resized = false;
        for tick in 0..40 {
            demo.step(&mut engine, tick);
            engine.tick().unwrap();
            if let Some(id) = engine.state().active_session {
                let last = engine.transport().session(id).and_then(|s| s.last_sent_frame());
                saw_resized |= last.is_some_and(|f| f.resolution == resized);
            }
        }
        assert!(saw_resized);

        let id = engine.state().active_session.expect("active session");
        assert_eq!(engine.transport().session_mode(id).unwrap(), Some(Mode::AugmentedReality));
        assert!(demo.frames_pushed() > 0);

        let last = engine.transport().session(id).unwrap().last_sent_frame().unwrap();
        assert_eq!(last.tag, Some(demo.frames_pushed() - 1));
    }
}
