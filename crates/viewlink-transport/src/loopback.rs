//! In-process simulated viewer.
//!
//! `LoopbackTransport` plays the remote side of every session: it walks each
//! connection through its lifecycle on [`SessionTransport::refresh_sessions`],
//! completes its half of mode setup, supplies the augmented reality image size,
//! consumes sent frames, and keeps a video-recording state machine.
//!
//! The `viewer_*`, `push_*`, `block_*`, `inject_*` and `fail_*` methods drive
//! the simulated viewer from the outside; they never consume injected failures.
//!
//! ```text
//! open_viewer_session ─► Initializing ─► AwaitingAcceptance ─(accept)─► NoMode
//! set_session_mode    ─► ModeSetup[Initialization] ─► ModeSetup[Completion] ─► ModeActive
//! pause_mode / resume_mode ─► ModePaused ─► ModeResuming ─► ModeActive
//! close / viewer_close ─► Closed      viewer_fail ─► Error      destroy ─► (gone)
//! ```

use std::cell::Cell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, trace};
use viewlink_core::{
    Capability, CloseAction, CloseReason, IncomingFrame, Mode, ModeAvailability, OutgoingFrame,
    Resolution, SessionId, SessionState, SettingKey, SettingValue, SetupPhase, SupportedMode,
    TransportError, VideoRecordingState,
};

use crate::settings::{RemoteView, SettingsStore};
use crate::SessionTransport;

/// Sent frames a session keeps for inspection; older ones are dropped.
pub const SENT_FRAME_HISTORY: usize = 8;
/// Node status changes kept by the transport.
pub const STATUS_HISTORY: usize = 16;

// ── Viewer profile ────────────────────────────────────────────────────────────

/// Behaviour of the simulated viewer for new sessions.
#[derive(Debug, Clone)]
pub struct ViewerProfile {
    pub name:                String,
    /// Modes the viewer supports, with its own availability verdict.
    pub supported:           Vec<SupportedMode>,
    /// Image size the viewer requests for augmented reality mode.
    pub ar_image:            Resolution,
    pub recording_available: bool,
    /// Complete the viewer half of every setup phase without being asked.
    pub auto_complete_setup: bool,
    pub frame_slots:         u32,
}

impl Default for ViewerProfile {
    fn default() -> Self {
        Self {
            name:                "Loopback Viewer".to_owned(),
            supported:           vec![
                SupportedMode::available(Mode::Standard),
                SupportedMode::available(Mode::AugmentedReality),
            ],
            ar_image:            Resolution::VGA,
            recording_available: true,
            auto_complete_setup: true,
            frame_slots:         2,
        }
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// Frame as delivered to the viewer.
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub tag:        Option<u64>,
    pub resolution: Resolution,
    pub pixels:     Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseRecord {
    pub action:  CloseAction,
    pub reason:  CloseReason,
    pub message: String,
}

// ── LoopbackSession ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LoopbackSession {
    id:               SessionId,
    state:            SessionState,
    accepted:         bool,
    mode:             Option<Mode>,
    supported:        Vec<SupportedMode>,
    capabilities:     Vec<Capability>,
    phase:            SetupPhase,
    local_done:       bool,
    remote_done:      bool,
    auto_complete:    bool,
    resetup_pending:  bool,
    settings:         SettingsStore,
    slot_capacity:    u32,
    in_flight:        u32,
    next_slot:        u32,
    outstanding:      Vec<u32>,
    blocked_acquires: u32,
    stalled:          bool,
    sent:             VecDeque<SentFrame>,
    frames_sent:      u64,
    incoming:         VecDeque<IncomingFrame>,
    holding_incoming: bool,
    recording:        VideoRecordingState,
    recording_error:  u32,
    saved_recording:  Option<PathBuf>,
    close:            Option<CloseRecord>,
    fail_next:        Cell<u32>,
}

impl LoopbackSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn setup_phase(&self) -> SetupPhase {
        self.phase
    }

    /// The most recent sent frames, oldest first, at most
    /// [`SENT_FRAME_HISTORY`] of them.
    pub fn sent_frames(&self) -> &VecDeque<SentFrame> {
        &self.sent
    }

    pub fn last_sent_frame(&self) -> Option<&SentFrame> {
        self.sent.back()
    }

    /// Frames sent over the session's lifetime.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn remote_settings(&self) -> RemoteView {
        self.settings.remote_view()
    }

    pub fn close_record(&self) -> Option<&CloseRecord> {
        self.close.as_ref()
    }

    pub fn recording_state(&self) -> VideoRecordingState {
        self.recording
    }

    pub fn saved_recording(&self) -> Option<&Path> {
        self.saved_recording.as_deref()
    }

    pub fn pending_incoming(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_holding_incoming(&self) -> bool {
        self.holding_incoming
    }

    fn enter_setup(&mut self, mode: Mode, ar_image: Resolution) {
        self.mode = Some(mode);
        self.state = SessionState::ModeSetup;
        self.phase = SetupPhase::Initialization;
        self.local_done = false;
        self.remote_done = self.auto_complete;
        self.resetup_pending = false;
        if mode == Mode::AugmentedReality {
            // The viewer owns image sizing in this mode.
            self.settings.commit_remote(SettingKey::ImageWidth, SettingValue::U16(ar_image.width));
            self.settings.commit_remote(SettingKey::ImageHeight, SettingValue::U16(ar_image.height));
        }
    }

    /// Advance one step of the simulated protocol.
    fn step(&mut self) {
        let before = self.state;
        match self.state {
            SessionState::Initializing => self.state = SessionState::AwaitingAcceptance,
            SessionState::AwaitingAcceptance if self.accepted => self.state = SessionState::NoMode,
            SessionState::ModeSetup if self.local_done && self.remote_done => match self.phase {
                SetupPhase::Initialization => {
                    self.phase = SetupPhase::Completion;
                    self.local_done = false;
                    self.remote_done = self.auto_complete;
                }
                SetupPhase::Completion => {
                    self.state = SessionState::ModeActive;
                    self.local_done = false;
                }
            },
            SessionState::ModeResuming => self.state = SessionState::ModeActive,
            SessionState::ModeActive if self.resetup_pending => {
                self.state = SessionState::ModeSetup;
                self.phase = SetupPhase::Completion;
                self.local_done = false;
                self.remote_done = self.auto_complete;
                self.resetup_pending = false;
            }
            _ => {}
        }
        if !self.stalled {
            self.in_flight = 0;
        }
        if before != self.state {
            trace!("Loopback[{}] {} → {}", self.id, before, self.state);
        }
    }

    fn note_resolution_write(&mut self, keys: &[SettingKey]) {
        let touches_size = keys
            .iter()
            .any(|k| matches!(k, SettingKey::ImageWidth | SettingKey::ImageHeight));
        if touches_size && self.state == SessionState::ModeActive && self.mode == Some(Mode::Standard) {
            self.resetup_pending = true;
        }
    }

    fn require_state(&self, op: &'static str, allowed: &[SessionState]) -> Result<(), TransportError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else if self.state.is_terminal() {
            Err(TransportError::ConnectionClosed)
        } else {
            Err(TransportError::InvalidState { op, state: self.state })
        }
    }

    fn require_recording(&self, op: &str, allowed: &[VideoRecordingState]) -> Result<(), TransportError> {
        if allowed.contains(&self.recording) {
            Ok(())
        } else {
            Err(TransportError::OperationFailed {
                reason: format!("{op} not valid while recording is {}", self.recording),
            })
        }
    }
}

// ── LoopbackTransport ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LoopbackTransport {
    profile:          ViewerProfile,
    node_name:        String,
    status_history:   VecDeque<String>,
    unsupported:      Vec<Mode>,
    registered:       Vec<SupportedMode>,
    capabilities:     Vec<Capability>,
    listening:        bool,
    listener_failure: bool,
    sessions:         Vec<LoopbackSession>,
    destroyed:        Vec<SessionId>,
}

impl LoopbackTransport {
    pub fn new(profile: ViewerProfile) -> Self {
        Self { profile, ..Default::default() }
    }

    /// Pretend this transport cannot carry the given modes.
    pub fn with_unsupported_modes(mut self, modes: &[Mode]) -> Self {
        self.unsupported = modes.to_vec();
        self
    }

    /// Make `start_listening` fail.
    pub fn with_listener_failure(mut self) -> Self {
        self.listener_failure = true;
        self
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn node_status(&self) -> Option<&str> {
        self.status_history.back().map(String::as_str)
    }

    pub fn status_history(&self) -> &VecDeque<String> {
        &self.status_history
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn registered_modes(&self) -> &[SupportedMode] {
        &self.registered
    }

    pub fn session(&self, id: SessionId) -> Option<&LoopbackSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn sessions(&self) -> &[LoopbackSession] {
        &self.sessions
    }

    pub fn destroyed_sessions(&self) -> &[SessionId] {
        &self.destroyed
    }

    // ── Viewer-side controls ──────────────────────────────────────────────

    /// A viewer opens a new incoming connection.
    pub fn open_viewer_session(&mut self) -> SessionId {
        let id = SessionId::new_v4();
        let supported = self
            .registered
            .iter()
            .filter_map(|ours| {
                let theirs = self.profile.supported.iter().find(|m| m.mode == ours.mode)?;
                let availability = if ours.is_available() && theirs.is_available() {
                    ModeAvailability::Available
                } else {
                    ModeAvailability::NotAvailable
                };
                Some(SupportedMode { mode: ours.mode, availability })
            })
            .collect();
        let recording_available = self.profile.recording_available;
        self.sessions.push(LoopbackSession {
            id,
            state:            SessionState::Initializing,
            accepted:         false,
            mode:             None,
            supported,
            capabilities:     if recording_available { vec![Capability::VideoRecording] } else { Vec::new() },
            phase:            SetupPhase::Initialization,
            local_done:       false,
            remote_done:      false,
            auto_complete:    self.profile.auto_complete_setup,
            resetup_pending:  false,
            settings:         SettingsStore::with_defaults(),
            slot_capacity:    self.profile.frame_slots,
            in_flight:        0,
            next_slot:        0,
            outstanding:      Vec::new(),
            blocked_acquires: 0,
            stalled:          false,
            sent:             VecDeque::with_capacity(SENT_FRAME_HISTORY),
            frames_sent:      0,
            incoming:         VecDeque::new(),
            holding_incoming: false,
            recording:        if recording_available {
                VideoRecordingState::NotRecording
            } else {
                VideoRecordingState::NotAvailable
            },
            recording_error:  0,
            saved_recording:  None,
            close:            None,
            fail_next:        Cell::new(0),
        });
        debug!("Loopback[{}] {} opened a session", id, self.profile.name);
        id
    }

    pub fn push_incoming_frame(&mut self, id: SessionId, frame: IncomingFrame) {
        if let Some(s) = self.find_mut(id) {
            s.incoming.push_back(frame);
        }
    }

    /// The next `count` acquire calls report no free slot.
    pub fn block_next_acquires(&mut self, id: SessionId, count: u32) {
        if let Some(s) = self.find_mut(id) {
            s.blocked_acquires = count;
        }
    }

    /// A stalled viewer stops draining sent frames.
    pub fn set_stalled(&mut self, id: SessionId, stalled: bool) {
        if let Some(s) = self.find_mut(id) {
            s.stalled = stalled;
        }
    }

    pub fn complete_remote_phase(&mut self, id: SessionId) {
        if let Some(s) = self.find_mut(id) {
            s.remote_done = true;
        }
    }

    pub fn set_session_supported_modes(&mut self, id: SessionId, modes: Vec<SupportedMode>) {
        if let Some(s) = self.find_mut(id) {
            s.supported = modes;
        }
    }

    pub fn set_recording_state(&mut self, id: SessionId, state: VideoRecordingState) {
        if let Some(s) = self.find_mut(id) {
            s.recording = state;
        }
    }

    pub fn inject_recording_error(&mut self, id: SessionId, code: u32) {
        if let Some(s) = self.find_mut(id) {
            s.recording = VideoRecordingState::Error;
            s.recording_error = code;
        }
    }

    /// The next `count` session operations on `id` fail.
    pub fn fail_next_operations(&mut self, id: SessionId, count: u32) {
        if let Some(s) = self.find_mut(id) {
            s.fail_next.set(count);
        }
    }

    pub fn viewer_request_mode(&mut self, id: SessionId, mode: Mode) {
        let ar_image = self.profile.ar_image;
        if let Some(s) = self.find_mut(id) {
            s.enter_setup(mode, ar_image);
        }
    }

    pub fn viewer_close(&mut self, id: SessionId) {
        if let Some(s) = self.find_mut(id) {
            s.state = SessionState::Closed;
        }
    }

    pub fn viewer_fail(&mut self, id: SessionId) {
        if let Some(s) = self.find_mut(id) {
            s.state = SessionState::Error;
        }
    }

    /// Force a lifecycle state directly.
    pub fn force_state(&mut self, id: SessionId, state: SessionState) {
        if let Some(s) = self.find_mut(id) {
            s.state = state;
        }
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    fn find_mut(&mut self, id: SessionId) -> Option<&mut LoopbackSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    fn take_injected_failure(session: &LoopbackSession) -> Result<(), TransportError> {
        let remaining = session.fail_next.get();
        if remaining > 0 {
            session.fail_next.set(remaining - 1);
            return Err(TransportError::OperationFailed { reason: "injected failure".to_owned() });
        }
        Ok(())
    }

    fn get(&self, id: SessionId) -> Result<&LoopbackSession, TransportError> {
        let session = self
            .sessions
            .iter()
            .find(|s| s.id == id)
            .ok_or(TransportError::UnknownSession { session: id })?;
        Self::take_injected_failure(session)?;
        Ok(session)
    }

    fn get_mut(&mut self, id: SessionId) -> Result<&mut LoopbackSession, TransportError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(TransportError::UnknownSession { session: id })?;
        Self::take_injected_failure(session)?;
        Ok(session)
    }
}

// ── SessionTransport impl ─────────────────────────────────────────────────────

impl SessionTransport for LoopbackTransport {
    fn set_node_name(&mut self, name: &str) -> Result<(), TransportError> {
        self.node_name = name.to_owned();
        Ok(())
    }

    fn set_node_status(&mut self, status: &str) -> Result<(), TransportError> {
        if self.status_history.len() == STATUS_HISTORY {
            self.status_history.pop_front();
        }
        self.status_history.push_back(status.to_owned());
        Ok(())
    }

    fn resolve_mode(&mut self, mode: Mode) -> Result<(), TransportError> {
        if self.unsupported.contains(&mode) {
            return Err(TransportError::UnsupportedMode { mode });
        }
        Ok(())
    }

    fn set_supported_modes(&mut self, modes: &[SupportedMode]) -> Result<(), TransportError> {
        self.registered = modes.to_vec();
        Ok(())
    }

    fn set_supported_capabilities(&mut self, capabilities: &[Capability]) -> Result<(), TransportError> {
        self.capabilities = capabilities.to_vec();
        Ok(())
    }

    fn start_listening(&mut self) -> Result<(), TransportError> {
        if self.listener_failure {
            return Err(TransportError::ListenerFailed { reason: "loopback listener disabled".to_owned() });
        }
        self.listening = true;
        info!("Loopback listening as '{}'", self.node_name);
        Ok(())
    }

    fn connect_to_default_viewer(&mut self) -> Result<(), TransportError> {
        let id = self.open_viewer_session();
        info!("Loopback[{}] connecting to default viewer '{}'", id, self.profile.name);
        Ok(())
    }

    fn refresh_sessions(&mut self) -> Result<Vec<SessionId>, TransportError> {
        for session in &mut self.sessions {
            session.step();
        }
        Ok(self.sessions.iter().map(|s| s.id).collect())
    }

    fn session_state(&self, id: SessionId) -> Result<SessionState, TransportError> {
        Ok(self.get(id)?.state)
    }

    fn accept(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_state("accept", &[SessionState::AwaitingAcceptance])?;
        s.accepted = true;
        Ok(())
    }

    fn close(
        &mut self,
        id: SessionId,
        action: CloseAction,
        reason: CloseReason,
        message: &str,
    ) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        if s.state.is_terminal() {
            return Ok(());
        }
        s.state = SessionState::Closed;
        s.close = Some(CloseRecord { action, reason, message: message.to_owned() });
        Ok(())
    }

    fn destroy(&mut self, id: SessionId) -> Result<(), TransportError> {
        let state = self.get(id)?.state;
        if !state.is_terminal() {
            return Err(TransportError::InvalidState { op: "destroy", state });
        }
        self.sessions.retain(|s| s.id != id);
        self.destroyed.push(id);
        Ok(())
    }

    fn supports_capability(&self, id: SessionId, capability: Capability) -> Result<bool, TransportError> {
        Ok(self.get(id)?.capabilities.contains(&capability))
    }

    fn session_mode(&self, id: SessionId) -> Result<Option<Mode>, TransportError> {
        Ok(self.get(id)?.mode)
    }

    fn session_supported_modes(&self, id: SessionId) -> Result<Vec<SupportedMode>, TransportError> {
        Ok(self.get(id)?.supported.clone())
    }

    fn set_session_mode(&mut self, id: SessionId, mode: Mode) -> Result<(), TransportError> {
        let ar_image = self.profile.ar_image;
        let s = self.get_mut(id)?;
        s.require_state(
            "set_session_mode",
            &[SessionState::NoMode, SessionState::ModeActive, SessionState::ModePaused],
        )?;
        if !s.supported.iter().any(|m| m.mode == mode && m.is_available()) {
            return Err(TransportError::UnsupportedMode { mode });
        }
        s.enter_setup(mode, ar_image);
        Ok(())
    }

    fn setup_phase(&self, id: SessionId) -> Result<(SetupPhase, bool), TransportError> {
        let s = self.get(id)?;
        s.require_state("setup_phase", &[SessionState::ModeSetup])?;
        Ok((s.phase, s.local_done))
    }

    fn complete_setup_phase(&mut self, id: SessionId, phase: SetupPhase) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_state("complete_setup_phase", &[SessionState::ModeSetup])?;
        if s.phase != phase {
            return Err(TransportError::OperationFailed {
                reason: format!("phase {:?} is not current ({:?})", phase, s.phase),
            });
        }
        s.local_done = true;
        Ok(())
    }

    fn pause_mode(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_state("pause_mode", &[SessionState::ModeActive])?;
        s.state = SessionState::ModePaused;
        Ok(())
    }

    fn resume_mode(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_state("resume_mode", &[SessionState::ModePaused])?;
        s.state = SessionState::ModeResuming;
        Ok(())
    }

    fn begin_settings_batch(&mut self, id: SessionId) -> Result<(), TransportError> {
        self.get_mut(id)?.settings.begin_batch()
    }

    fn end_settings_batch(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        let keys = s.settings.end_batch()?;
        s.note_resolution_write(&keys);
        Ok(())
    }

    fn abort_settings_batch(&mut self, id: SessionId) -> Result<(), TransportError> {
        self.get_mut(id)?.settings.abort_batch();
        Ok(())
    }

    fn setting(&self, id: SessionId, key: SettingKey) -> Result<SettingValue, TransportError> {
        self.get(id)?.settings.get(key)
    }

    fn set_setting(&mut self, id: SessionId, key: SettingKey, value: SettingValue) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.settings.set(key, value)?;
        if !s.settings.is_batch_open() {
            s.note_resolution_write(&[key]);
        }
        Ok(())
    }

    fn acquire_frame(&mut self, id: SessionId) -> Result<Option<OutgoingFrame>, TransportError> {
        let s = self.get_mut(id)?;
        s.require_state("acquire_frame", &[SessionState::ModeActive])?;
        if s.blocked_acquires > 0 {
            s.blocked_acquires -= 1;
            return Ok(None);
        }
        if s.in_flight + s.outstanding.len() as u32 >= s.slot_capacity {
            return Ok(None);
        }
        let width = s.settings.get(SettingKey::ImageWidth)?.as_u16().unwrap_or(0);
        let height = s.settings.get(SettingKey::ImageHeight)?.as_u16().unwrap_or(0);
        let slot = s.next_slot;
        s.next_slot = s.next_slot.wrapping_add(1);
        s.outstanding.push(slot);
        Ok(Some(OutgoingFrame::new(slot, Resolution::new(width, height))))
    }

    fn send_frame(&mut self, id: SessionId, frame: OutgoingFrame) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        let slot = frame.slot();
        let pos = s
            .outstanding
            .iter()
            .position(|&o| o == slot)
            .ok_or(TransportError::FrameNotOwned { slot })?;
        s.outstanding.swap_remove(pos);
        s.in_flight += 1;
        let (_, tag, resolution, pixels) = frame.into_parts();
        if s.sent.len() == SENT_FRAME_HISTORY {
            s.sent.pop_front();
        }
        s.sent.push_back(SentFrame { tag, resolution, pixels });
        s.frames_sent += 1;
        Ok(())
    }

    fn discard_frame(&mut self, id: SessionId, frame: OutgoingFrame) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        let slot = frame.slot();
        let pos = s
            .outstanding
            .iter()
            .position(|&o| o == slot)
            .ok_or(TransportError::FrameNotOwned { slot })?;
        s.outstanding.swap_remove(pos);
        Ok(())
    }

    fn receive_frame(&mut self, id: SessionId) -> Result<Option<IncomingFrame>, TransportError> {
        let s = self.get_mut(id)?;
        s.require_state("receive_frame", &[SessionState::ModeActive])?;
        if s.holding_incoming {
            return Err(TransportError::FrameNotReleased);
        }
        let frame = s.incoming.pop_front();
        s.holding_incoming = frame.is_some();
        Ok(frame)
    }

    fn release_received_frame(&mut self, id: SessionId, _frame: IncomingFrame) -> Result<(), TransportError> {
        self.get_mut(id)?.holding_incoming = false;
        Ok(())
    }

    fn video_recording_state(&self, id: SessionId) -> Result<VideoRecordingState, TransportError> {
        Ok(self.get(id)?.recording)
    }

    fn video_recording_error(&self, id: SessionId) -> Result<u32, TransportError> {
        Ok(self.get(id)?.recording_error)
    }

    fn clear_video_recording_error(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_recording("clear_video_recording_error", &[VideoRecordingState::Error])?;
        s.recording = VideoRecordingState::NotRecording;
        s.recording_error = 0;
        Ok(())
    }

    fn start_video_recording(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_recording("start", &[VideoRecordingState::NotRecording])?;
        s.recording = VideoRecordingState::Recording;
        Ok(())
    }

    fn pause_video_recording(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_recording("pause", &[VideoRecordingState::Recording])?;
        s.recording = VideoRecordingState::Paused;
        Ok(())
    }

    fn resume_video_recording(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_recording("resume", &[VideoRecordingState::Paused])?;
        s.recording = VideoRecordingState::Recording;
        Ok(())
    }

    fn finish_video_recording(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_recording("finish", &[VideoRecordingState::Recording, VideoRecordingState::Paused])?;
        s.recording = VideoRecordingState::Finished;
        Ok(())
    }

    fn save_video_recording(&mut self, id: SessionId, path: &Path) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_recording("save", &[VideoRecordingState::Finished])?;
        s.saved_recording = Some(path.to_path_buf());
        s.recording = VideoRecordingState::NotRecording;
        Ok(())
    }

    fn discard_video_recording(&mut self, id: SessionId) -> Result<(), TransportError> {
        let s = self.get_mut(id)?;
        s.require_recording("discard", &[VideoRecordingState::Finished])?;
        s.recording = VideoRecordingState::NotRecording;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use viewlink_core::CameraIntrinsics;

    fn registered() -> LoopbackTransport {
        let mut t = LoopbackTransport::new(ViewerProfile::default());
        t.set_supported_modes(&[
            SupportedMode::available(Mode::Standard),
            SupportedMode::available(Mode::AugmentedReality),
        ])
        .unwrap();
        t
    }

    fn active_standard(t: &mut LoopbackTransport) -> SessionId {
        let id = t.open_viewer_session();
        t.refresh_sessions().unwrap();
        t.accept(id).unwrap();
        t.refresh_sessions().unwrap();
        t.set_setting(id, SettingKey::ImageWidth, SettingValue::U16(64)).unwrap();
        t.set_setting(id, SettingKey::ImageHeight, SettingValue::U16(32)).unwrap();
        t.set_session_mode(id, Mode::Standard).unwrap();
        t.complete_setup_phase(id, SetupPhase::Initialization).unwrap();
        t.refresh_sessions().unwrap();
        t.complete_setup_phase(id, SetupPhase::Completion).unwrap();
        t.refresh_sessions().unwrap();
        assert_eq!(t.session_state(id).unwrap(), SessionState::ModeActive);
        id
    }

    #[test]
    fn lifecycle_reaches_mode_active() {
        let mut t = registered();
        let id = active_standard(&mut t);
        assert_eq!(t.session_mode(id).unwrap(), Some(Mode::Standard));
    }

    #[test]
    fn slots_run_out_until_viewer_drains() {
        let mut t = registered();
        let id = active_standard(&mut t);
        t.set_stalled(id, true);
        for _ in 0..2 {
            let f = t.acquire_frame(id).unwrap().expect("slot");
            assert_eq!(f.resolution(), Resolution::new(64, 32));
            t.send_frame(id, f).unwrap();
        }
        assert!(t.acquire_frame(id).unwrap().is_none());
        t.set_stalled(id, false);
        t.refresh_sessions().unwrap();
        assert!(t.acquire_frame(id).unwrap().is_some());
    }

    #[test]
    fn received_frame_must_be_released() {
        let mut t = registered();
        let id = active_standard(&mut t);
        let frame = IncomingFrame { tag: 5, camera_pose: Mat4::IDENTITY, intrinsics: CameraIntrinsics::default() };
        t.push_incoming_frame(id, frame.clone());
        t.push_incoming_frame(id, frame);
        let got = t.receive_frame(id).unwrap().expect("frame");
        assert_eq!(t.receive_frame(id), Err(TransportError::FrameNotReleased));
        t.release_received_frame(id, got).unwrap();
        assert!(t.receive_frame(id).unwrap().is_some());
    }

    #[test]
    fn resolution_write_while_active_restarts_completion() {
        let mut t = registered();
        let id = active_standard(&mut t);
        crate::write_batch(
            &mut t,
            id,
            &[
                (SettingKey::ImageWidth, SettingValue::U16(128)),
                (SettingKey::ImageHeight, SettingValue::U16(64)),
            ],
        )
        .unwrap();
        t.refresh_sessions().unwrap();
        assert_eq!(t.session_state(id).unwrap(), SessionState::ModeSetup);
        assert_eq!(t.setup_phase(id).unwrap(), (SetupPhase::Completion, false));
    }

    #[test]
    fn injected_failures_are_consumed_in_order() {
        let mut t = registered();
        let id = t.open_viewer_session();
        t.fail_next_operations(id, 2);
        assert!(t.session_state(id).is_err());
        assert!(t.session_state(id).is_err());
        assert!(t.session_state(id).is_ok());
    }

    #[test]
    fn sent_frame_history_is_bounded() {
        let mut t = registered();
        let id = active_standard(&mut t);
        for _ in 0..(SENT_FRAME_HISTORY * 4) {
            let mut f = t.acquire_frame(id).unwrap().expect("slot");
            f.set_frame_number(t.session(id).unwrap().frames_sent());
            t.send_frame(id, f).unwrap();
            t.refresh_sessions().unwrap();
        }
        let session = t.session(id).unwrap();
        assert_eq!(session.frames_sent(), (SENT_FRAME_HISTORY * 4) as u64);
        assert_eq!(session.sent_frames().len(), SENT_FRAME_HISTORY);
        let newest = (SENT_FRAME_HISTORY * 4 - 1) as u64;
        assert_eq!(session.last_sent_frame().unwrap().tag, Some(newest));
        assert_eq!(session.sent_frames()[0].tag, Some(newest + 1 - SENT_FRAME_HISTORY as u64));
    }

    #[test]
    fn status_history_is_bounded() {
        let mut t = registered();
        for i in 0..(STATUS_HISTORY + 5) {
            t.set_node_status(&format!("status {i}")).unwrap();
        }
        assert_eq!(t.status_history().len(), STATUS_HISTORY);
        assert_eq!(t.node_status(), Some(format!("status {}", STATUS_HISTORY + 4).as_str()));
    }

    #[test]
    fn operations_on_closed_session_report_connection_closed() {
        let mut t = registered();
        let id = active_standard(&mut t);
        t.viewer_close(id);
        assert_eq!(t.acquire_frame(id).unwrap_err(), TransportError::ConnectionClosed);
        assert_eq!(t.pause_mode(id), Err(TransportError::ConnectionClosed));
    }

    #[test]
    fn destroy_requires_terminal_state() {
        let mut t = registered();
        let id = t.open_viewer_session();
        assert!(t.destroy(id).is_err());
        t.close(id, CloseAction::None, CloseReason::ConnectionRejected, "full").unwrap();
        t.destroy(id).unwrap();
        assert!(t.session(id).is_none());
        assert_eq!(t.destroyed_sessions(), &[id]);
    }

    #[test]
    fn batch_failure_leaves_remote_view_untouched() {
        let mut t = registered();
        let id = active_standard(&mut t);
        let before = t.session(id).unwrap().remote_settings();
        let err = crate::write_batch(
            &mut t,
            id,
            &[
                (SettingKey::ImageWidth, SettingValue::U16(100)),
                (SettingKey::ImageHeight, SettingValue::F32(1.0)),
            ],
        );
        assert!(err.is_err());
        assert_eq!(t.session(id).unwrap().remote_settings(), before);
    }
}
