//! viewlink-renderer — the drawing and tracking seams of the presenter.
//!
//! The engine renders through [`RenderBackend`] and samples head, display and
//! camera state through [`TrackingSource`]. Both are external collaborators;
//! this crate ships CPU stand-ins so the engine runs and tests without a GPU
//! or a tracker.

pub mod software;
pub mod tracking;

use glam::Mat4;
use viewlink_core::{RenderError, Resolution, Viewport};
use viewlink_geometry::ArFrameGeometry;

pub use software::SoftwareRenderer;
pub use tracking::{StaticTracking, TrackingSource};

// MARK: - Targets

/// Handle of an off-screen render target.
pub type TargetId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Colour and depth.
    Standard,
    /// Colour plus a depth/stencil buffer shared by the mask and scene passes.
    AugmentedReality,
}

/// Clear colour for standard mode images.
pub const STANDARD_CLEAR_COLOR: [f32; 4] = [0.0, 1.0, 0.0, 0.5];
/// Augmented reality images start fully transparent so the viewer can
/// composite them over the webcam stream.
pub const AUGMENTED_REALITY_CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
pub const AUGMENTED_REALITY_BACKGROUND_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

// MARK: - Draw requests

/// Inputs for one standard mode render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardView {
    /// World to eye, from the tracked center eye and the camera transform.
    pub view:       Mat4,
    pub projection: Mat4,
    /// Local viewport the image mirrors.
    pub viewport:   Viewport,
}

/// Inputs for one two-pass augmented reality render.
///
/// 1. Mask into depth/stencil only.
/// 2. Background where stencil == 0, if enabled.
/// 3. Scene with the pass 1 depth buffer, plus the visible mask if enabled.
#[derive(Debug, Clone, Copy)]
pub struct ArPasses<'a> {
    pub geometry:        &'a ArFrameGeometry,
    pub draw_mask:       bool,
    pub draw_background: bool,
}

// MARK: - RenderBackend trait

pub trait RenderBackend {
    fn create_target(&mut self, kind: TargetKind, resolution: Resolution) -> Result<TargetId, RenderError>;

    fn destroy_target(&mut self, id: TargetId) -> Result<(), RenderError>;

    fn target_resolution(&self, id: TargetId) -> Result<Resolution, RenderError>;

    fn draw_standard(&mut self, id: TargetId, view: &StandardView) -> Result<(), RenderError>;

    fn draw_augmented(&mut self, id: TargetId, passes: &ArPasses<'_>) -> Result<(), RenderError>;

    /// Copy the colour buffer into `dst` as RGBA8, bottom row first.
    fn read_pixels(&self, id: TargetId, dst: &mut [u8]) -> Result<(), RenderError>;
}

/// Convert a normalized colour to RGBA8.
pub fn color_to_rgba8(c: [f32; 4]) -> [u8; 4] {
    c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}
