use glam::{Mat4, Vec2, Vec3};
use viewlink_core::{ClipPlanes, Viewport};
use viewlink_geometry::{DisplayGeometry, TrackingSnapshot};

// MARK: - TrackingSource trait

/// Head, display, and coordinate-space state from the tracking subsystem.
pub trait TrackingSource {
    /// The display containing the center of `viewport`.
    fn display_for(&self, viewport: &Viewport) -> DisplayGeometry;

    /// Display space to tracked camera space.
    fn display_to_camera(&self) -> Mat4;

    /// World space to tracked camera space.
    fn camera_transform(&self) -> Mat4;

    /// Tracked center-eye view, camera space to eye space.
    fn center_eye_view(&self) -> Mat4;

    fn center_eye_projection(&self, viewport: &Viewport) -> Mat4;

    fn snapshot(&self, viewport: &Viewport) -> TrackingSnapshot {
        TrackingSnapshot {
            display:           self.display_for(viewport),
            display_to_camera: self.display_to_camera(),
            camera_transform:  self.camera_transform(),
        }
    }
}

// MARK: - StaticTracking

/// Fixed tracking state: a head parked in front of the display.
#[derive(Debug, Clone)]
pub struct StaticTracking {
    pub displays:          Vec<DisplayGeometry>,
    pub display_to_camera: Mat4,
    pub camera_transform:  Mat4,
    /// Eye position in camera space.
    pub eye:               Vec3,
    pub clip_planes:       ClipPlanes,
}

impl Default for StaticTracking {
    fn default() -> Self {
        Self {
            displays:          vec![DisplayGeometry::default()],
            display_to_camera: Mat4::IDENTITY,
            camera_transform:  Mat4::IDENTITY,
            eye:               Vec3::new(0.0, 0.0, 0.5),
            clip_planes:       ClipPlanes::default(),
        }
    }
}

impl TrackingSource for StaticTracking {
    fn display_for(&self, viewport: &Viewport) -> DisplayGeometry {
        let center = Vec2::new(
            viewport.x as f32 + viewport.width as f32 * 0.5,
            viewport.y as f32 + viewport.height as f32 * 0.5,
        );
        self.displays
            .iter()
            .find(|d| {
                let max = d.position_px + d.native_resolution_px;
                center.cmpge(d.position_px).all() && center.cmplt(max).all()
            })
            .or_else(|| self.displays.first())
            .copied()
            .unwrap_or_default()
    }

    fn display_to_camera(&self) -> Mat4 {
        self.display_to_camera
    }

    fn camera_transform(&self) -> Mat4 {
        self.camera_transform
    }

    fn center_eye_view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, Vec3::ZERO, Vec3::Y)
    }

    fn center_eye_projection(&self, viewport: &Viewport) -> Mat4 {
        let aspect = viewport.width.max(1) as f32 / viewport.height.max(1) as f32;
        Mat4::perspective_rh_gl(
            60f32.to_radians(),
            aspect,
            self.clip_planes.near,
            self.clip_planes.far,
        )
    }
}
