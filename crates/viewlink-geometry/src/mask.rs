//! Clip-mask geometry for the augmented reality composite.
//!
//! The mask is a cube with one face lying in the display's screen plane and
//! pierced by a hole the size of the presenter viewport; the face opposite it
//! is omitted. Rendered into depth/stencil first, it hides scene content that
//! sits behind the screen plane and outside the viewport, while content in
//! front of the screen still draws.
//!
//! ```text
//!  ┌──────────────────────────┐
//!  │\           (t)          /│     (v)   viewport hole
//!  │ \                      / │     (tl) (tr) (bl) (br)
//!  │  ┌────┬─────────────┐ /  │           screen-plane ring
//!  │  │    │    (tr)     │    │     (t) (b) (l) (r)
//!  │(l)(tl)├──────┬──────┤(r) │           cube sides
//!  │  │    │ (v)  │ (br) │    │
//!  │  ├────┴──────┘      │    │
//!  │  │    (bl)   │      │    │
//!  │  └───────────┴──────┘    │
//!  │ /          (b)         \ │
//!  │/                        \│
//!  └──────────────────────────┘
//! ```
//!
//! Vertices are expressed in viewport space: meters, origin at the viewport
//! center, +Z pointing out of the screen toward the omitted face.

use glam::{Vec2, Vec3};
use viewlink_core::Viewport;

use crate::DisplayGeometry;

pub const NUM_MASK_QUADS: usize = 8;
pub const NUM_MASK_VERTS: usize = NUM_MASK_QUADS * 4;
pub const MASK_CUBE_SIDE_LENGTH_METERS: f32 = 10.0;

/// Full-frame quad in normalized device coordinates, used for the background.
pub const BACKGROUND_QUAD: [Vec3; 4] = [
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(-1.0, 1.0, 0.0),
];

// MARK: - Viewport placement

/// The presenter viewport measured on the physical display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportPlacement {
    /// Viewport center in display space (meters, +Y up, z = 0).
    pub center_m: Vec3,
    pub size_m:   Vec2,
}

pub fn viewport_placement(viewport: &Viewport, display: &DisplayGeometry) -> ViewportPlacement {
    let size_px = Vec2::new(viewport.width as f32, viewport.height as f32);
    let center_px = Vec2::new(viewport.x as f32, viewport.y as f32) + size_px * 0.5;
    let display_center_px = display.center_px();
    let mpp = display.meters_per_pixel();

    // Desktop Y grows downward, display space Y grows upward.
    let center_m = Vec3::new(
        (center_px.x - display_center_px.x) * mpp.x,
        (display_center_px.y - center_px.y) * mpp.y,
        0.0,
    );

    ViewportPlacement { center_m, size_m: size_px * mpp }
}

// MARK: - Mask vertices

/// Eight quads: the four screen-plane pieces around the hole (tl, tr, bl, br)
/// followed by the four cube sides (top, bottom, left, right).
pub fn mask_vertices(viewport_size_m: Vec2) -> [Vec3; NUM_MASK_VERTS] {
    let v = viewport_size_m * 0.5;
    let h = MASK_CUBE_SIDE_LENGTH_METERS * 0.5;
    let depth = MASK_CUBE_SIDE_LENGTH_METERS;

    let vp_tl = Vec3::new(-v.x, v.y, 0.0);
    let vp_tr = Vec3::new(v.x, v.y, 0.0);
    let vp_bl = Vec3::new(-v.x, -v.y, 0.0);
    let vp_br = Vec3::new(v.x, -v.y, 0.0);

    // Points where the hole's edges, extended, meet the face border.
    let split_t = Vec3::new(-v.x, h, 0.0);
    let split_b = Vec3::new(v.x, -h, 0.0);
    let split_l = Vec3::new(-h, -v.y, 0.0);
    let split_r = Vec3::new(h, v.y, 0.0);

    let face_tl = Vec3::new(-h, h, 0.0);
    let face_tr = Vec3::new(h, h, 0.0);
    let face_bl = Vec3::new(-h, -h, 0.0);
    let face_br = Vec3::new(h, -h, 0.0);

    let back_tl = Vec3::new(-h, h, depth);
    let back_tr = Vec3::new(h, h, depth);
    let back_bl = Vec3::new(-h, -h, depth);
    let back_br = Vec3::new(h, -h, depth);

    [
        // tl
        face_tl, split_l, vp_bl, split_t,
        // tr
        split_t, vp_tl, split_r, face_tr,
        // bl
        split_l, face_bl, split_b, vp_br,
        // br
        vp_tr, split_b, face_br, split_r,
        // top
        back_tl, face_tl, face_tr, back_tr,
        // bottom
        back_br, face_br, face_bl, back_bl,
        // left
        back_bl, face_bl, face_tl, back_tl,
        // right
        back_tr, face_tr, face_br, back_br,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_area_xy(q: &[Vec3]) -> f32 {
        let mut twice = 0.0;
        for i in 0..4 {
            let a = q[i];
            let b = q[(i + 1) % 4];
            twice += a.x * b.y - b.x * a.y;
        }
        (twice * 0.5).abs()
    }

    #[test]
    fn screen_ring_covers_face_minus_hole() {
        let size = Vec2::new(0.3, 0.2);
        let verts = mask_vertices(size);
        let ring = &verts[..16];
        assert!(ring.iter().all(|p| p.z == 0.0));

        let area: f32 = ring.chunks(4).map(quad_area_xy).sum();
        let side = MASK_CUBE_SIDE_LENGTH_METERS;
        let expected = side * side - size.x * size.y;
        assert!((area - expected).abs() < 1e-3, "ring area {area}, expected {expected}");
    }

    #[test]
    fn cube_sides_reach_back_plane() {
        let verts = mask_vertices(Vec2::new(0.3, 0.2));
        for quad in verts[16..].chunks(4) {
            let back = quad.iter().filter(|p| p.z == MASK_CUBE_SIDE_LENGTH_METERS).count();
            assert_eq!(back, 2);
        }
    }

    #[test]
    fn no_ring_vertex_lies_inside_hole() {
        let size = Vec2::new(0.4, 0.3);
        let half = size * 0.5;
        for p in &mask_vertices(size)[..16] {
            let inside = p.x.abs() < half.x - 1e-6 && p.y.abs() < half.y - 1e-6;
            assert!(!inside, "{p:?} inside the hole");
        }
    }

    #[test]
    fn centered_viewport_sits_at_display_origin() {
        let display = DisplayGeometry::default();
        let vp = Viewport::new(480, 270, 960, 540);
        let placed = viewport_placement(&vp, &display);
        assert!(placed.center_m.length() < 1e-6);
        assert!((placed.size_m.x - display.size_m.x * 0.5).abs() < 1e-6);
    }

    #[test]
    fn top_left_viewport_is_left_and_up() {
        let display = DisplayGeometry::default();
        let vp = Viewport::new(0, 0, 400, 300);
        let placed = viewport_placement(&vp, &display);
        assert!(placed.center_m.x < 0.0);
        assert!(placed.center_m.y > 0.0);
    }

    #[test]
    fn viewport_on_second_display_is_relative_to_that_display() {
        let display = DisplayGeometry { position_px: Vec2::new(1920.0, 0.0), ..Default::default() };
        let vp = Viewport::new(1920 + 480, 270, 960, 540);
        assert!(viewport_placement(&vp, &display).center_m.length() < 1e-6);
    }
}
