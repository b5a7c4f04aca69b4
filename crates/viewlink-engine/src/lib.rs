//! viewlink-engine — presenter-side session engine.
//!
//! [`Engine`] is driven by one call to [`Engine::tick`] per frame. Each tick:
//!
//! ```text
//! refresh sessions ─► per session: lifecycle dispatch ─► recording monitor
//!                                   └─ active + ModeActive ─► frame pump
//! ```
//!
//! All state lives in [`EngineState`], owned here and lent to each component
//! for one call. Failures concerning one session are counted against that
//! session's retry budget; everything else is returned to the caller.

pub mod catalog;
pub mod dispatcher;
pub mod frame_pump;
pub mod negotiator;
pub mod overlay;
pub mod recording;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

use tracing::{debug, info};
use viewlink_core::{
    InputCommand, Modifiers, PresenterConfig, PresenterError, SessionId, SessionState, Viewport,
    STATUS_NOT_CONNECTED,
};
use viewlink_renderer::{RenderBackend, TrackingSource};
use viewlink_transport::SessionTransport;

pub use catalog::ModeCatalog;
pub use dispatcher::CommandOutcome;
pub use frame_pump::{FrameStats, PumpOutcome};
pub use negotiator::SetupProgress;
pub use session::SessionOutcome;
pub use state::EngineState;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sessions: Vec<(SessionId, SessionOutcome)>,
    /// Frame pump result for the active session, if it was pumped.
    pub pumped:   Option<PumpOutcome>,
    /// Sessions whose work failed this tick.
    pub failures: u32,
}

// MARK: - Engine

pub struct Engine<T, R, K>
where
    T: SessionTransport,
    R: RenderBackend,
    K: TrackingSource,
{
    state:     EngineState,
    transport: T,
    renderer:  R,
    tracking:  K,
}

impl<T, R, K> Engine<T, R, K>
where
    T: SessionTransport,
    R: RenderBackend,
    K: TrackingSource,
{
    /// Register the presenter with the transport and start listening.
    ///
    /// Fails if the configuration is invalid, no built-in mode can be
    /// resolved, or the transport refuses to listen.
    pub fn new(config: PresenterConfig, mut transport: T, renderer: R, tracking: K) -> Result<Self, PresenterError> {
        config.validate()?;
        transport.set_node_name(&config.node_name)?;
        let catalog = ModeCatalog::resolve(&mut transport)?;
        transport.set_supported_modes(&catalog.supported_modes())?;
        transport.set_supported_capabilities(&[])?;

        let mut state = EngineState::new(config, catalog);
        state.set_node_status(&mut transport, STATUS_NOT_CONNECTED)?;
        transport.start_listening()?;
        info!(
            "Presenter '{}' ready: modes {:?}, viewport {}",
            state.config.node_name,
            state.catalog.modes(),
            state.viewport.resolution()
        );
        Ok(Self { state, transport, renderer, tracking })
    }

    /// Advance every session by one step and pump the active one.
    pub fn tick(&mut self) -> Result<TickReport, PresenterError> {
        let sessions = self.transport.refresh_sessions()?;
        self.state.retain_sessions(&sessions);

        let mut report = TickReport::default();
        for id in sessions {
            match self.serve_session(id) {
                Ok((outcome, pumped)) => {
                    session::note_success(&mut self.state, id);
                    report.sessions.push((id, outcome));
                    if pumped.is_some() {
                        report.pumped = pumped;
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    session::handle_failure(&mut self.state, &mut self.transport, &mut self.renderer, id, e)?;
                }
            }
        }
        Ok(report)
    }

    fn serve_session(&mut self, id: SessionId) -> Result<(SessionOutcome, Option<PumpOutcome>), PresenterError> {
        let outcome = session::update_session(&mut self.state, &mut self.transport, &mut self.renderer, id)?;
        if outcome == SessionOutcome::Destroyed {
            return Ok((outcome, None));
        }
        recording::monitor(&mut self.state, &mut self.transport, id)?;

        if !self.state.is_active(id) || self.transport.session_state(id)? != SessionState::ModeActive {
            return Ok((outcome, None));
        }
        let pumped = frame_pump::pump(&mut self.state, &mut self.transport, &mut self.renderer, &self.tracking, id)?;
        Ok((outcome, Some(pumped)))
    }

    /// Run one user command.
    ///
    /// A session-scoped failure counts against the active session's budget
    /// and the command reports `Ignored`.
    pub fn handle_command(&mut self, command: InputCommand) -> Result<CommandOutcome, PresenterError> {
        match dispatcher::dispatch(&mut self.state, &mut self.transport, command) {
            Ok(outcome) => Ok(outcome),
            Err(e) => match self.state.active_session {
                Some(id) if e.is_session_scoped() => {
                    session::handle_failure(&mut self.state, &mut self.transport, &mut self.renderer, id, e)?;
                    Ok(CommandOutcome::Ignored)
                }
                _ => Err(e),
            },
        }
    }

    /// Look up a key binding and run it. Unbound keys return `None`.
    pub fn handle_key(&mut self, key: char, modifiers: Modifiers) -> Result<Option<CommandOutcome>, PresenterError> {
        match InputCommand::from_key(key, modifiers) {
            Some(command) => self.handle_command(command).map(Some),
            None => Ok(None),
        }
    }

    /// The local window moved or was resized. Standard mode picks up a new
    /// size on its next pump.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport != self.state.viewport {
            debug!("Viewport {:?} → {:?}", self.state.viewport, viewport);
            self.state.viewport = viewport;
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn tracking(&self) -> &K {
        &self.tracking
    }
}
