//! Webcam projection and the transforms chained onto it.

use glam::{Mat4, Vec3, Vec4};
use viewlink_core::{CameraIntrinsics, ClipPlanes, Resolution};

/// Projection for rendering from the viewer's webcam.
///
/// A perspective matrix built from the intrinsics maps camera space to image
/// pixels, then an orthographic matrix maps image pixels to normalized device
/// coordinates. Intrinsics assume image Y down and the camera looking down +Z;
/// the negated columns convert to Y up and -Z forward.
pub fn augmented_reality_projection(
    intrinsics: &CameraIntrinsics,
    image: Resolution,
    clip: ClipPlanes,
) -> Mat4 {
    let fx = intrinsics.focal_length;
    let fy = intrinsics.focal_length * intrinsics.pixel_aspect_ratio;
    let cx = intrinsics.principal_point_offset_x;
    let cy = intrinsics.principal_point_offset_y;
    let s = intrinsics.axis_skew;

    let a = clip.near + clip.far;
    let b = clip.near * clip.far;

    let perspective = Mat4::from_cols(
        Vec4::new(fx, 0.0, 0.0, 0.0),
        Vec4::new(-s, -fy, 0.0, 0.0),
        Vec4::new(-cx, -cy, a, -1.0),
        Vec4::new(0.0, 0.0, b, 0.0),
    );

    let ndc = Mat4::orthographic_rh_gl(
        0.0,
        image.width as f32,
        image.height as f32,
        0.0,
        clip.near,
        clip.far,
    );

    ndc * perspective
}

/// World to webcam view transform.
///
/// `camera_pose` is the webcam pose in display space as delivered with the
/// incoming frame.
pub fn camera_world_view(camera_pose: Mat4, display_to_camera: Mat4, inv_camera_transform: Mat4) -> Mat4 {
    (inv_camera_transform * display_to_camera * camera_pose).inverse()
}

/// Mask space (viewport-centered, meters) to webcam clip space.
pub fn mask_transform(
    projection: Mat4,
    camera_world_view: Mat4,
    inv_camera_transform: Mat4,
    display_to_camera: Mat4,
    viewport_center_m: Vec3,
) -> Mat4 {
    projection
        * camera_world_view
        * inv_camera_transform
        * display_to_camera
        * Mat4::from_translation(viewport_center_m)
}
