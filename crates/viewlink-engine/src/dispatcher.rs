//! Table-driven input dispatch.
//!
//! Every [`InputCommand`] maps to one route. A route pairs a gate, checked
//! against the active session and its lifecycle state, with a handler. A
//! command whose gate is closed is ignored, never an error.

use tracing::{debug, info};
use viewlink_core::{
    CloseAction, CloseReason, InputCommand, PresenterError, SessionId, SessionState,
};
use viewlink_transport::SessionTransport;

use crate::state::EngineState;
use crate::{overlay, recording};

pub const CLOSE_MESSAGE: &str = "User requested connection to close and viewer to exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Executed,
    Ignored,
}

// ── Routes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Connect,
    CloseAndExit,
    SwitchMode,
    PauseResume,
    ToggleMask,
    ToggleBackground,
    Overlay,
    Recording,
}

impl Route {
    fn of(command: InputCommand) -> Self {
        match command {
            InputCommand::Connect => Self::Connect,
            InputCommand::CloseAndExit => Self::CloseAndExit,
            InputCommand::SwitchMode => Self::SwitchMode,
            InputCommand::PauseResume => Self::PauseResume,
            InputCommand::ToggleMask => Self::ToggleMask,
            InputCommand::ToggleBackground => Self::ToggleBackground,
            InputCommand::Overlay(_) => Self::Overlay,
            InputCommand::Recording(_) => Self::Recording,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Always,
    NoActiveSession,
    ActiveSession,
    /// Active session in one of these lifecycle states.
    ActiveIn(&'static [SessionState]),
}

impl Gate {
    fn admits(&self, active: Option<SessionId>, transport: &dyn SessionTransport) -> Result<bool, PresenterError> {
        Ok(match (*self, active) {
            (Gate::Always, _) => true,
            (Gate::NoActiveSession, active) => active.is_none(),
            (Gate::ActiveSession, active) => active.is_some(),
            (Gate::ActiveIn(states), Some(id)) => states.contains(&transport.session_state(id)?),
            (Gate::ActiveIn(_), None) => false,
        })
    }
}

type Handler = fn(
    &mut EngineState,
    &mut dyn SessionTransport,
    Option<SessionId>,
    InputCommand,
) -> Result<bool, PresenterError>;

const ROUTES: &[(Route, Gate, Handler)] = &[
    (Route::Connect, Gate::NoActiveSession, connect),
    (Route::CloseAndExit, Gate::ActiveSession, close_and_exit),
    (Route::SwitchMode, Gate::ActiveIn(&[SessionState::NoMode, SessionState::ModeActive]), switch_mode),
    (Route::PauseResume, Gate::ActiveIn(&[SessionState::ModeActive, SessionState::ModePaused]), pause_resume),
    (Route::ToggleMask, Gate::Always, toggle_mask),
    (Route::ToggleBackground, Gate::Always, toggle_background),
    (Route::Overlay, Gate::ActiveIn(&[SessionState::ModeActive]), adjust_overlay),
    (Route::Recording, Gate::ActiveSession, control_recording),
];

/// Run `command` against the engine if its gate admits it.
pub fn dispatch(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    command: InputCommand,
) -> Result<CommandOutcome, PresenterError> {
    let route = Route::of(command);
    let Some((_, gate, handler)) = ROUTES.iter().find(|(r, _, _)| *r == route) else {
        return Ok(CommandOutcome::Ignored);
    };

    let active = state.active_session;
    if !gate.admits(active, transport)? {
        debug!("Input: {:?} ignored", command);
        return Ok(CommandOutcome::Ignored);
    }
    if handler(state, transport, active, command)? {
        Ok(CommandOutcome::Executed)
    } else {
        debug!("Input: {:?} had no effect", command);
        Ok(CommandOutcome::Ignored)
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

fn connect(
    _state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    _active: Option<SessionId>,
    _command: InputCommand,
) -> Result<bool, PresenterError> {
    transport.connect_to_default_viewer()?;
    info!("Input: connecting to default viewer");
    Ok(true)
}

fn close_and_exit(
    _state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    active: Option<SessionId>,
    _command: InputCommand,
) -> Result<bool, PresenterError> {
    let Some(id) = active else { return Ok(false) };
    transport.close(id, CloseAction::ExitApplication, CloseReason::UserRequested, CLOSE_MESSAGE)?;
    info!("Session[{}] Close requested by user", id);
    Ok(true)
}

/// Advance to the next available mode both ends support, wrapping around.
fn switch_mode(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    active: Option<SessionId>,
    _command: InputCommand,
) -> Result<bool, PresenterError> {
    let Some(id) = active else { return Ok(false) };
    let supported = transport.session_supported_modes(id)?;
    let n = supported.len();
    for _ in 0..n {
        state.mode_index = (state.mode_index + 1) % n;
        let candidate = supported[state.mode_index];
        if candidate.is_available() && state.catalog.contains(candidate.mode) {
            transport.set_session_mode(id, candidate.mode)?;
            info!("Session[{}] Switching to {} mode (index {})", id, candidate.mode, state.mode_index);
            return Ok(true);
        }
    }
    Ok(false)
}

fn pause_resume(
    _state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    active: Option<SessionId>,
    _command: InputCommand,
) -> Result<bool, PresenterError> {
    let Some(id) = active else { return Ok(false) };
    match transport.session_state(id)? {
        SessionState::ModeActive => {
            transport.pause_mode(id)?;
            info!("Session[{}] Mode paused", id);
        }
        SessionState::ModePaused => {
            transport.resume_mode(id)?;
            info!("Session[{}] Mode resuming", id);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn toggle_mask(
    state: &mut EngineState,
    _transport: &mut dyn SessionTransport,
    _active: Option<SessionId>,
    _command: InputCommand,
) -> Result<bool, PresenterError> {
    state.toggles.draw_mask = !state.toggles.draw_mask;
    info!("Input: mask drawing {}", if state.toggles.draw_mask { "on" } else { "off" });
    Ok(true)
}

fn toggle_background(
    state: &mut EngineState,
    _transport: &mut dyn SessionTransport,
    _active: Option<SessionId>,
    _command: InputCommand,
) -> Result<bool, PresenterError> {
    state.toggles.draw_background = !state.toggles.draw_background;
    info!("Input: background drawing {}", if state.toggles.draw_background { "on" } else { "off" });
    Ok(true)
}

fn adjust_overlay(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    active: Option<SessionId>,
    command: InputCommand,
) -> Result<bool, PresenterError> {
    match (active, command) {
        (Some(id), InputCommand::Overlay(cmd)) => overlay::execute(state, transport, id, cmd),
        _ => Ok(false),
    }
}

fn control_recording(
    state: &mut EngineState,
    transport: &mut dyn SessionTransport,
    active: Option<SessionId>,
    command: InputCommand,
) -> Result<bool, PresenterError> {
    match (active, command) {
        (Some(id), InputCommand::Recording(cmd)) => recording::execute(state, transport, id, cmd),
        _ => Ok(false),
    }
}
