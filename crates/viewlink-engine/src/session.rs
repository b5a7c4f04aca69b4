//! Session lifecycle handling and failure isolation.
//!
//! At most one session is active. New sessions are accepted only while no
//! session is active; any others are closed with `ConnectionRejected`.
//! Failures that concern a single session are counted per session and, once
//! the retry budget is spent, close that session only.

use tracing::{debug, info, warn};
use viewlink_core::{
    CloseAction, CloseReason, PresenterError, SessionId, SessionState, STATUS_CONNECTED,
    STATUS_NOT_CONNECTED,
};
use viewlink_renderer::RenderBackend;
use viewlink_transport::SessionTransport;

use crate::negotiator::{self, SetupProgress};
use crate::state::EngineState;

pub const REJECT_MESSAGE: &str = "Maximum number of active connections exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Idle,
    Accepted,
    Rejected,
    TornDown,
    SetUp(SetupProgress),
    Destroyed,
}

/// React to the current lifecycle state of one session.
pub fn update_session(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    renderer: &mut dyn RenderBackend,
    id: SessionId,
) -> Result<SessionOutcome, PresenterError> {
    match transport.session_state(id)? {
        SessionState::AwaitingAcceptance => process_new_session(state, transport, id),
        SessionState::NoMode if state.is_active(id) => {
            negotiator::tear_down_mode(state, renderer)?;
            Ok(SessionOutcome::TornDown)
        }
        SessionState::ModeSetup if state.is_active(id) => {
            let progress = negotiator::set_up_mode(state, transport, renderer, id)?;
            Ok(SessionOutcome::SetUp(progress))
        }
        SessionState::Closed | SessionState::Error => {
            release_active(state, transport, renderer, id)?;
            transport.destroy(id)?;
            state.sessions.remove(&id);
            info!("Session[{}] Destroyed", id);
            Ok(SessionOutcome::Destroyed)
        }
        _ => Ok(SessionOutcome::Idle),
    }
}

fn process_new_session(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    id: SessionId,
) -> Result<SessionOutcome, PresenterError> {
    match state.active_session {
        Some(active) if active == id => Ok(SessionOutcome::Idle),
        Some(active) => {
            transport.close(id, CloseAction::None, CloseReason::ConnectionRejected, REJECT_MESSAGE)?;
            info!("Session[{}] Rejected; session {} is already active", id, active);
            Ok(SessionOutcome::Rejected)
        }
        None => {
            transport.accept(id)?;
            state.active_session = Some(id);
            state.set_node_status(transport, STATUS_CONNECTED)?;
            info!("Session[{}] Accepted", id);
            Ok(SessionOutcome::Accepted)
        }
    }
}

/// If `id` is the active session, forget it and free its mode resources.
pub fn release_active(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    renderer: &mut dyn RenderBackend,
    id: SessionId,
) -> Result<(), PresenterError> {
    if !state.is_active(id) {
        return Ok(());
    }
    state.active_session = None;
    state.mode_index = 0;
    negotiator::tear_down_mode(state, renderer)?;
    state.stats = crate::frame_pump::FrameStats::new(state.config.stats_interval_frames);
    state.set_node_status(transport, STATUS_NOT_CONNECTED)?;
    info!("Session[{}] Released", id);
    Ok(())
}

/// Absorb a failure raised while serving `id`.
///
/// Errors that do not concern a single session are handed back to the caller.
pub fn handle_failure(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    renderer: &mut dyn RenderBackend,
    id: SessionId,
    err: PresenterError,
) -> Result<(), PresenterError> {
    if !err.is_session_scoped() {
        return Err(err);
    }

    let budget = state.config.max_session_failures;
    let record = state.record_mut(id);
    record.failures += 1;
    let failures = record.failures;
    let timed_out = matches!(err, PresenterError::SetupTimeout { .. });

    if !timed_out && failures < budget {
        warn!("Session[{}] Tick failed ({}/{}): {}; retrying", id, failures, budget, err);
        return Ok(());
    }

    warn!("Session[{}] Closing after failure: {}", id, err);
    if let Err(e) = transport.close(id, CloseAction::None, CloseReason::SessionError, &err.to_string()) {
        warn!("Session[{}] Close failed: {}", id, e);
    }
    if let Err(e) = release_active(state, transport, renderer, id) {
        warn!("Session[{}] Release failed: {}", id, e);
    }
    let record = state.record_mut(id);
    record.failures = 0;
    record.setup_wait_ticks = 0;
    Ok(())
}

/// A tick for `id` went through without error.
pub fn note_success(state: &mut EngineState, id: SessionId) {
    if let Some(record) = state.sessions.get_mut(&id) {
        if record.failures > 0 {
            debug!("Session[{}] Recovered after {} failure(s)", id, record.failures);
            record.failures = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModeCatalog;
    use crate::testing::{rig, small_config};
    use viewlink_core::{Mode, PresenterConfig, TransportError};
    use viewlink_renderer::SoftwareRenderer;
    use viewlink_transport::{LoopbackTransport, ViewerProfile};

    fn fresh() -> (EngineState, LoopbackTransport, SoftwareRenderer) {
        let mut transport = LoopbackTransport::new(ViewerProfile::default());
        let catalog = ModeCatalog::resolve(&mut transport).unwrap();
        transport.set_supported_modes(&catalog.supported_modes()).unwrap();
        (EngineState::new(small_config(), catalog), transport, SoftwareRenderer::new())
    }

    #[test]
    fn first_session_is_accepted_second_rejected() {
        let (mut state, mut t, mut r) = fresh();
        let a = t.open_viewer_session();
        let b = t.open_viewer_session();
        t.refresh_sessions().unwrap();

        assert_eq!(update_session(&mut state, &mut t, &mut r, a).unwrap(), SessionOutcome::Accepted);
        assert_eq!(update_session(&mut state, &mut t, &mut r, b).unwrap(), SessionOutcome::Rejected);
        assert_eq!(state.active_session, Some(a));
        assert_eq!(t.node_status(), Some(STATUS_CONNECTED));

        let record = t.session(b).unwrap().close_record().unwrap().clone();
        assert_eq!(record.reason, CloseReason::ConnectionRejected);
        assert_eq!(record.action, CloseAction::None);
        assert_eq!(record.message, REJECT_MESSAGE);

        // Accepted but not yet past AwaitingAcceptance: nothing to do.
        assert_eq!(update_session(&mut state, &mut t, &mut r, a).unwrap(), SessionOutcome::Idle);
    }

    #[test]
    fn closed_active_session_is_released_and_destroyed() {
        let mut rig = rig(small_config(), ViewerProfile::default());
        rig.activate(Mode::Standard);
        rig.state.mode_index = 1;
        rig.transport.viewer_close(rig.id);

        let outcome = update_session(&mut rig.state, &mut rig.transport, &mut rig.renderer, rig.id).unwrap();
        assert_eq!(outcome, SessionOutcome::Destroyed);
        assert!(rig.state.active_session.is_none());
        assert_eq!(rig.state.mode_index, 0);
        assert_eq!(rig.renderer.live_targets(), 0);
        assert_eq!(rig.transport.destroyed_sessions(), &[rig.id]);
        assert_eq!(rig.transport.node_status(), Some(STATUS_NOT_CONNECTED));
        assert!(!rig.state.sessions.contains_key(&rig.id));
    }

    #[test]
    fn errored_inactive_session_leaves_active_one_alone() {
        let (mut state, mut t, mut r) = fresh();
        let a = t.open_viewer_session();
        let b = t.open_viewer_session();
        t.refresh_sessions().unwrap();
        update_session(&mut state, &mut t, &mut r, a).unwrap();
        t.viewer_fail(b);

        assert_eq!(update_session(&mut state, &mut t, &mut r, b).unwrap(), SessionOutcome::Destroyed);
        assert_eq!(state.active_session, Some(a));
        assert_eq!(t.node_status(), Some(STATUS_CONNECTED));
    }

    #[test]
    fn no_mode_tears_down_active_resources() {
        let mut rig = rig(small_config(), ViewerProfile::default());
        rig.activate(Mode::Standard);
        rig.transport.force_state(rig.id, SessionState::NoMode);

        let outcome = update_session(&mut rig.state, &mut rig.transport, &mut rig.renderer, rig.id).unwrap();
        assert_eq!(outcome, SessionOutcome::TornDown);
        assert_eq!(rig.renderer.live_targets(), 0);
        assert!(rig.state.latest_mode.is_none());
    }

    #[test]
    fn failures_within_budget_are_retried() {
        let mut rig = rig(small_config(), ViewerProfile::default());
        let err = || PresenterError::Transport(TransportError::OperationFailed { reason: "flaky".into() });

        handle_failure(&mut rig.state, &mut rig.transport, &mut rig.renderer, rig.id, err()).unwrap();
        handle_failure(&mut rig.state, &mut rig.transport, &mut rig.renderer, rig.id, err()).unwrap();
        assert_eq!(rig.state.active_session, Some(rig.id));
        assert_eq!(rig.state.record_mut(rig.id).failures, 2);

        note_success(&mut rig.state, rig.id);
        assert_eq!(rig.state.record_mut(rig.id).failures, 0);
    }

    #[test]
    fn exhausted_budget_closes_the_session() {
        let config = PresenterConfig { max_session_failures: 2, ..small_config() };
        let mut rig = rig(config, ViewerProfile::default());
        rig.activate(Mode::Standard);
        let err = || PresenterError::Transport(TransportError::OperationFailed { reason: "flaky".into() });

        handle_failure(&mut rig.state, &mut rig.transport, &mut rig.renderer, rig.id, err()).unwrap();
        handle_failure(&mut rig.state, &mut rig.transport, &mut rig.renderer, rig.id, err()).unwrap();

        assert!(rig.state.active_session.is_none());
        assert_eq!(rig.renderer.live_targets(), 0);
        assert_eq!(rig.transport.session_state(rig.id).unwrap(), SessionState::Closed);
        let record = rig.transport.session(rig.id).unwrap().close_record().unwrap().clone();
        assert_eq!(record.reason, CloseReason::SessionError);
        assert!(record.message.contains("flaky"));
    }

    #[test]
    fn setup_timeout_closes_immediately() {
        let mut rig = rig(small_config(), ViewerProfile::default());
        let err = PresenterError::SetupTimeout { session: rig.id, ticks: 601 };
        handle_failure(&mut rig.state, &mut rig.transport, &mut rig.renderer, rig.id, err).unwrap();
        assert_eq!(rig.transport.session_state(rig.id).unwrap(), SessionState::Closed);
    }

    #[test]
    fn engine_wide_errors_are_not_absorbed() {
        let mut rig = rig(small_config(), ViewerProfile::default());
        let err = PresenterError::Transport(TransportError::ListenerFailed { reason: "gone".into() });
        let back = handle_failure(&mut rig.state, &mut rig.transport, &mut rig.renderer, rig.id, err);
        assert!(matches!(back, Err(PresenterError::Transport(TransportError::ListenerFailed { .. }))));
        assert_eq!(rig.state.active_session, Some(rig.id));
    }
}
