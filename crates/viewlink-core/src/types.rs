use bytes::BytesMut;
use glam::Mat4;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// MARK: - Resolution

/// Image or viewport resolution in pixels.
///
/// Widths and heights travel as `u16` settings, so the type is sized to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub const VGA: Self = Self { width: 640, height: 480 };
    pub const XGA: Self = Self { width: 1024, height: 768 };
    pub const FHD: Self = Self { width: 1920, height: 1080 };

    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Size in bytes of one RGBA8 image at this resolution.
    pub fn rgba_len(&self) -> usize {
        self.total_pixels() as usize * 4
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - Viewport

/// Placement of the local render viewport in virtual-desktop pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0, 0, Resolution::XGA.width, Resolution::XGA.height)
    }
}

// MARK: - SessionId

/// Opaque handle for one viewer session, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    /// Short form: first eight hex digits, enough to tell sessions apart in logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

// MARK: - SessionState

/// Lifecycle state reported by the transport for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    AwaitingAcceptance,
    SwitchingModeInternal,
    NoMode,
    ModeSetup,
    ModeActive,
    ModePaused,
    ModeResuming,
    ProcessingSettingsChange,
    Closed,
    Error,
}

impl SessionState {
    /// `Closed` and `Error` end the session; cleanup follows.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::AwaitingAcceptance => "awaiting acceptance",
            Self::SwitchingModeInternal => "switching mode",
            Self::NoMode => "no mode",
            Self::ModeSetup => "mode setup",
            Self::ModeActive => "mode active",
            Self::ModePaused => "mode paused",
            Self::ModeResuming => "mode resuming",
            Self::ProcessingSettingsChange => "processing settings change",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// MARK: - Mode

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compositing {
    None,
    AugmentedRealityCamera,
}

/// Which side moves the presenter camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraControl {
    LocalTracked,
    RemoteMovable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    BottomToTop,
    TopToBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8 => 4,
        }
    }
}

/// Declarative attribute set that a transport resolves into a usable mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModeDescriptor {
    pub version: u32,
    pub compositing: Compositing,
    pub camera: CameraControl,
    pub row_order: RowOrder,
    pub pixel_format: PixelFormat,
}

/// The rendering modes this presenter knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Standard,
    AugmentedReality,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Standard, Mode::AugmentedReality];

    pub fn descriptor(&self) -> ModeDescriptor {
        match self {
            Self::Standard => ModeDescriptor {
                version: 0,
                compositing: Compositing::None,
                camera: CameraControl::LocalTracked,
                row_order: RowOrder::BottomToTop,
                pixel_format: PixelFormat::Rgba8,
            },
            Self::AugmentedReality => ModeDescriptor {
                version: 0,
                compositing: Compositing::AugmentedRealityCamera,
                camera: CameraControl::RemoteMovable,
                row_order: RowOrder::BottomToTop,
                pixel_format: PixelFormat::Rgba8,
            },
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "Standard"),
            Self::AugmentedReality => write!(f, "AugmentedReality"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeAvailability {
    Available,
    NotAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedMode {
    pub mode: Mode,
    pub availability: ModeAvailability,
}

impl SupportedMode {
    pub fn available(mode: Mode) -> Self {
        Self { mode, availability: ModeAvailability::Available }
    }

    pub fn is_available(&self) -> bool {
        self.availability == ModeAvailability::Available
    }
}

/// Handshake stage both sides complete before a mode becomes active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupPhase {
    Initialization,
    Completion,
}

// MARK: - Settings

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    ImageWidth,
    ImageHeight,
    OverlayOffsetX,
    OverlayOffsetY,
    OverlayScaleX,
    OverlayScaleY,
    VideoRecordingQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    U16,
    U32,
    F32,
}

impl SettingKey {
    pub fn value_type(&self) -> SettingType {
        match self {
            Self::ImageWidth | Self::ImageHeight => SettingType::U16,
            Self::VideoRecordingQuality => SettingType::U32,
            Self::OverlayOffsetX
            | Self::OverlayOffsetY
            | Self::OverlayScaleX
            | Self::OverlayScaleY => SettingType::F32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SettingValue {
    U16(u16),
    U32(u32),
    F32(f32),
}

impl SettingValue {
    pub fn value_type(&self) -> SettingType {
        match self {
            Self::U16(_) => SettingType::U16,
            Self::U32(_) => SettingType::U32,
            Self::F32(_) => SettingType::F32,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match *self {
            Self::U16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }
}

// MARK: - Video recording

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoRecordingState {
    NotAvailable,
    NotRecording,
    Recording,
    Paused,
    Finished,
    Error,
}

impl std::fmt::Display for VideoRecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotAvailable => "NotAvailable",
            Self::NotRecording => "NotRecording",
            Self::Recording => "Recording",
            Self::Paused => "Paused",
            Self::Finished => "Finished",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Recording quality, carried on the wire as a `u32` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoRecordingQuality {
    P480,
    P720,
    P1080,
}

impl VideoRecordingQuality {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::P480 => 0,
            Self::P720 => 1,
            Self::P1080 => 2,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::P480),
            1 => Some(Self::P720),
            2 => Some(Self::P1080),
            _ => None,
        }
    }

    /// Next higher quality, wrapping from the highest back to the lowest.
    pub fn next(&self) -> Self {
        match self {
            Self::P480 => Self::P720,
            Self::P720 => Self::P1080,
            Self::P1080 => Self::P480,
        }
    }
}

impl std::fmt::Display for VideoRecordingQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P480 => write!(f, "480p"),
            Self::P720 => write!(f, "720p"),
            Self::P1080 => write!(f, "1080p"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    VideoRecording,
}

// MARK: - Close

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseAction {
    None,
    /// Ask the viewer application to exit after the session closes.
    ExitApplication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Unknown,
    UserRequested,
    ConnectionRejected,
    SessionError,
}

// MARK: - Frames

/// Webcam intrinsics delivered with every augmented reality input frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub focal_length: f32,
    pub principal_point_offset_x: f32,
    pub principal_point_offset_y: f32,
    pub pixel_aspect_ratio: f32,
    pub axis_skew: f32,
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self {
            focal_length: 1.0,
            principal_point_offset_x: 0.0,
            principal_point_offset_y: 0.0,
            pixel_aspect_ratio: 1.0,
            axis_skew: 0.0,
        }
    }
}

/// Frame received from the viewer in augmented reality mode.
///
/// Valid for a single tick; hand it back with `release_received_frame`
/// before asking for another.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingFrame {
    pub tag: u64,
    /// Webcam pose in display space.
    pub camera_pose: Mat4,
    pub intrinsics: CameraIntrinsics,
}

/// Outgoing frame slot borrowed from the transport for one tick.
#[derive(Debug)]
pub struct OutgoingFrame {
    slot: u32,
    frame_number: Option<u64>,
    resolution: Resolution,
    color: BytesMut,
}

impl OutgoingFrame {
    /// Allocate a zeroed RGBA8 colour buffer sized to `resolution`.
    pub fn new(slot: u32, resolution: Resolution) -> Self {
        Self {
            slot,
            frame_number: None,
            resolution,
            color: BytesMut::zeroed(resolution.rgba_len()),
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn set_frame_number(&mut self, frame_number: u64) {
        self.frame_number = Some(frame_number);
    }

    pub fn frame_number(&self) -> Option<u64> {
        self.frame_number
    }

    pub fn color_buffer(&self) -> &[u8] {
        &self.color
    }

    pub fn color_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.color
    }

    /// Consume the slot, yielding its tag and frozen pixel data.
    pub fn into_parts(self) -> (u32, Option<u64>, Resolution, bytes::Bytes) {
        (self.slot, self.frame_number, self.resolution, self.color.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_cycles_through_all_levels() {
        let mut q = VideoRecordingQuality::P480;
        let mut seen = Vec::new();
        for _ in 0..3 {
            q = q.next();
            seen.push(q);
        }
        assert_eq!(
            seen,
            vec![VideoRecordingQuality::P720, VideoRecordingQuality::P1080, VideoRecordingQuality::P480]
        );
        assert_eq!(VideoRecordingQuality::from_u32(9), None);
    }

    #[test]
    fn setting_value_types_match_keys() {
        assert_eq!(SettingKey::ImageWidth.value_type(), SettingValue::U16(1).value_type());
        assert_eq!(SettingKey::OverlayScaleX.value_type(), SettingValue::F32(1.0).value_type());
        assert_eq!(SettingKey::VideoRecordingQuality.value_type(), SettingType::U32);
    }

    #[test]
    fn outgoing_frame_buffer_is_rgba_sized() {
        let mut frame = OutgoingFrame::new(0, Resolution::VGA);
        assert_eq!(frame.color_buffer().len(), 640 * 480 * 4);
        frame.set_frame_number(42);
        let (_, tag, res, pixels) = frame.into_parts();
        assert_eq!(tag, Some(42));
        assert_eq!(res, Resolution::VGA);
        assert_eq!(pixels.len(), Resolution::VGA.rgba_len());
    }

    #[test]
    fn modes_compare_by_value() {
        assert_ne!(Mode::Standard.descriptor(), Mode::AugmentedReality.descriptor());
        assert_eq!(Mode::AugmentedReality.descriptor().camera, CameraControl::RemoteMovable);
    }

    #[test]
    fn session_id_display_is_short() {
        let id = SessionId::new_v4();
        assert_eq!(id.to_string().len(), 8);
    }
}
