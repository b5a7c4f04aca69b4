//! viewlink-geometry — pure geometry for augmented reality frames.
//!
//! Everything here is a function of one tick's inputs: the camera pose and
//! intrinsics received from the viewer, the local viewport placement, and the
//! tracking transforms. Nothing is cached between ticks.

pub mod mask;
pub mod projection;

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use viewlink_core::{ClipPlanes, IncomingFrame, Resolution, Viewport};

pub use mask::{
    mask_vertices, viewport_placement, ViewportPlacement, BACKGROUND_QUAD,
    MASK_CUBE_SIDE_LENGTH_METERS, NUM_MASK_QUADS, NUM_MASK_VERTS,
};
pub use projection::{augmented_reality_projection, camera_world_view, mask_transform};

// MARK: - Display and tracking inputs

/// Physical display hosting the presenter viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    /// Top-left corner in virtual-desktop pixels.
    pub position_px: Vec2,
    pub native_resolution_px: Vec2,
    /// Physical size of the visible area in meters.
    pub size_m: Vec2,
}

impl DisplayGeometry {
    pub fn meters_per_pixel(&self) -> Vec2 {
        self.size_m / self.native_resolution_px
    }

    pub fn center_px(&self) -> Vec2 {
        self.position_px + self.native_resolution_px * 0.5
    }
}

impl Default for DisplayGeometry {
    /// A 1920×1080 panel of roughly 52 cm × 29 cm at the desktop origin.
    fn default() -> Self {
        Self {
            position_px:          Vec2::ZERO,
            native_resolution_px: Vec2::new(1920.0, 1080.0),
            size_m:               Vec2::new(0.5216, 0.2934),
        }
    }
}

/// Tracking state sampled once per augmented reality tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSnapshot {
    pub display:           DisplayGeometry,
    /// Display space to tracked camera space.
    pub display_to_camera: Mat4,
    /// World to tracked camera space.
    pub camera_transform:  Mat4,
}

// MARK: - Per-frame bundle

/// All geometry one augmented reality render needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ArFrameGeometry {
    pub projection:        Mat4,
    pub camera_world_view: Mat4,
    pub mask_transform:    Mat4,
    pub viewport:          ViewportPlacement,
    pub mask:              [Vec3; NUM_MASK_VERTS],
}

impl ArFrameGeometry {
    pub fn compute(
        frame: &IncomingFrame,
        image: Resolution,
        clip: ClipPlanes,
        viewport: &Viewport,
        tracking: &TrackingSnapshot,
    ) -> Self {
        let projection = augmented_reality_projection(&frame.intrinsics, image, clip);
        let inv_camera = tracking.camera_transform.inverse();
        let camera_world_view =
            camera_world_view(frame.camera_pose, tracking.display_to_camera, inv_camera);
        let placement = viewport_placement(viewport, &tracking.display);
        let mask_transform = mask_transform(
            projection,
            camera_world_view,
            inv_camera,
            tracking.display_to_camera,
            placement.center_m,
        );
        Self {
            projection,
            camera_world_view,
            mask_transform,
            mask: mask_vertices(placement.size_m),
            viewport: placement,
        }
    }

    /// Mask vertices as a tightly packed `xyz` float array.
    pub fn mask_flat(&self) -> Vec<f32> {
        self.mask.iter().flat_map(|v| v.to_array()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewlink_core::CameraIntrinsics;

    #[test]
    fn bundle_is_recomputed_from_frame_inputs() {
        let tracking = TrackingSnapshot {
            display:           DisplayGeometry::default(),
            display_to_camera: Mat4::IDENTITY,
            camera_transform:  Mat4::IDENTITY,
        };
        let viewport = Viewport::new(640, 270, 640, 540);
        let mut frame = IncomingFrame {
            tag:         1,
            camera_pose: Mat4::from_translation(Vec3::new(0.0, 0.0, 0.6)),
            intrinsics:  CameraIntrinsics {
                focal_length: 500.0,
                principal_point_offset_x: 320.0,
                principal_point_offset_y: 240.0,
                ..Default::default()
            },
        };
        let a = ArFrameGeometry::compute(&frame, Resolution::VGA, ClipPlanes::default(), &viewport, &tracking);
        frame.camera_pose = Mat4::from_translation(Vec3::new(0.1, 0.0, 0.6));
        let b = ArFrameGeometry::compute(&frame, Resolution::VGA, ClipPlanes::default(), &viewport, &tracking);

        assert_eq!(a.projection, b.projection);
        assert_ne!(a.camera_world_view, b.camera_world_view);
        assert_ne!(a.mask_transform, b.mask_transform);
        assert_eq!(a.mask_flat().len(), NUM_MASK_VERTS * 3);
        // Viewport is centered on the display.
        assert!(a.viewport.center_m.length() < 1e-6);
    }
}
