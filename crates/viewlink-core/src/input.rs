use serde::{Deserialize, Serialize};

// MARK: - InputCommand

/// Discrete user command delivered by the host input layer.
///
/// Each press maps to exactly one command; nothing here is continuous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "command", rename_all = "snake_case")]
pub enum InputCommand {
    /// Connect to the default viewer when no session is active.
    Connect,
    /// Close the active session and ask the viewer to exit.
    CloseAndExit,
    /// Cycle to the next available supported mode.
    SwitchMode,
    PauseResume,
    ToggleMask,
    ToggleBackground,
    Overlay(OverlayCommand),
    Recording(RecordingCommand),
}

// MARK: - OverlayCommand

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayCommand {
    OffsetLeft,
    OffsetRight,
    OffsetDown,
    OffsetUp,
    ResetOffsetX,
    ResetOffsetY,
    ShrinkX,
    GrowX,
    ShrinkY,
    GrowY,
    ResetScaleX,
    ResetScaleY,
}

// MARK: - RecordingCommand

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingCommand {
    CycleQuality,
    Start,
    PauseResume,
    Finish,
    Save,
    Discard,
}

// MARK: - Modifiers

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
}

impl Modifiers {
    pub const NONE: Self = Self { shift: false, ctrl: false };
    pub const SHIFT: Self = Self { shift: true, ctrl: false };
    pub const CTRL: Self = Self { shift: false, ctrl: true };
}

// MARK: - Key bindings

/// Host key bindings: (modifiers, key, command).
pub const KEY_BINDINGS: &[(Modifiers, char, InputCommand)] = &[
    (Modifiers::NONE, 'C', InputCommand::Connect),
    (Modifiers::NONE, 'E', InputCommand::CloseAndExit),
    (Modifiers::NONE, 'M', InputCommand::SwitchMode),
    (Modifiers::NONE, 'P', InputCommand::PauseResume),
    (Modifiers::NONE, 'V', InputCommand::ToggleMask),
    (Modifiers::NONE, 'B', InputCommand::ToggleBackground),
    (Modifiers::CTRL, 'A', InputCommand::Overlay(OverlayCommand::OffsetLeft)),
    (Modifiers::CTRL, 'D', InputCommand::Overlay(OverlayCommand::OffsetRight)),
    (Modifiers::CTRL, 'S', InputCommand::Overlay(OverlayCommand::OffsetDown)),
    (Modifiers::CTRL, 'W', InputCommand::Overlay(OverlayCommand::OffsetUp)),
    (Modifiers::CTRL, 'Q', InputCommand::Overlay(OverlayCommand::ResetOffsetX)),
    (Modifiers::CTRL, 'E', InputCommand::Overlay(OverlayCommand::ResetOffsetY)),
    (Modifiers::CTRL, 'F', InputCommand::Overlay(OverlayCommand::ShrinkX)),
    (Modifiers::CTRL, 'H', InputCommand::Overlay(OverlayCommand::GrowX)),
    (Modifiers::CTRL, 'G', InputCommand::Overlay(OverlayCommand::ShrinkY)),
    (Modifiers::CTRL, 'T', InputCommand::Overlay(OverlayCommand::GrowY)),
    (Modifiers::CTRL, 'R', InputCommand::Overlay(OverlayCommand::ResetScaleX)),
    (Modifiers::CTRL, 'Y', InputCommand::Overlay(OverlayCommand::ResetScaleY)),
    (Modifiers::SHIFT, 'Q', InputCommand::Recording(RecordingCommand::CycleQuality)),
    (Modifiers::SHIFT, 'R', InputCommand::Recording(RecordingCommand::Start)),
    (Modifiers::SHIFT, 'P', InputCommand::Recording(RecordingCommand::PauseResume)),
    (Modifiers::SHIFT, 'F', InputCommand::Recording(RecordingCommand::Finish)),
    (Modifiers::SHIFT, 'S', InputCommand::Recording(RecordingCommand::Save)),
    (Modifiers::SHIFT, 'D', InputCommand::Recording(RecordingCommand::Discard)),
];

impl InputCommand {
    /// Look up the command bound to a key press. Letters are case-insensitive.
    pub fn from_key(key: char, modifiers: Modifiers) -> Option<Self> {
        let key = key.to_ascii_uppercase();
        KEY_BINDINGS
            .iter()
            .find(|(m, k, _)| *m == modifiers && *k == key)
            .map(|(_, _, cmd)| *cmd)
    }
}
