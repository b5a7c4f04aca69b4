//! CPU renderer.
//!
//! Draws flat stand-ins for the scene so that frame contents are
//! deterministic and inspectable: standard mode clears to the standard colour
//! and stamps a marker where the world origin projects; augmented reality mode
//! reproduces the mask/stencil/background pass structure, treating the mask
//! as covering everything outside the projected viewport hole.

use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3};
use tracing::{debug, trace};
use viewlink_core::{RenderError, Resolution};

use crate::{
    color_to_rgba8, ArPasses, RenderBackend, StandardView, TargetId, TargetKind,
    AUGMENTED_REALITY_BACKGROUND_COLOR, AUGMENTED_REALITY_CLEAR_COLOR, STANDARD_CLEAR_COLOR,
};

const SCENE_MARKER_COLOR: [u8; 4] = [255, 255, 255, 255];
const MASK_DEBUG_COLOR: [u8; 4] = [128, 128, 128, 255];
const SCENE_MARKER_HALF_SIZE: i64 = 4;

// ── Surface ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Surface {
    kind:       TargetKind,
    resolution: Resolution,
    /// RGBA8, top row first.
    color:      Vec<u8>,
    /// 1 where the mask covered the pixel in pass 1.
    stencil:    Vec<u8>,
    draws:      u64,
}

impl Surface {
    fn new(kind: TargetKind, resolution: Resolution) -> Self {
        let pixels = resolution.total_pixels() as usize;
        Self {
            kind,
            resolution,
            color: vec![0; pixels * 4],
            stencil: vec![0; pixels],
            draws: 0,
        }
    }

    fn clear(&mut self, rgba: [u8; 4]) {
        for px in self.color.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    fn put(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        let i = (y * self.resolution.width as usize + x) * 4;
        self.color[i..i + 4].copy_from_slice(&rgba);
    }

    /// Stamp a small square centered on an NDC position, optionally only where
    /// the stencil is clear.
    fn stamp(&mut self, ndc: Vec2, rgba: [u8; 4], stencil_clear_only: bool) {
        let (w, h) = (self.resolution.width as i64, self.resolution.height as i64);
        let cx = ((ndc.x + 1.0) * 0.5 * w as f32) as i64;
        let cy = ((1.0 - ndc.y) * 0.5 * h as f32) as i64;
        for y in (cy - SCENE_MARKER_HALF_SIZE).max(0)..(cy + SCENE_MARKER_HALF_SIZE).min(h) {
            for x in (cx - SCENE_MARKER_HALF_SIZE).max(0)..(cx + SCENE_MARKER_HALF_SIZE).min(w) {
                let (x, y) = (x as usize, y as usize);
                if stencil_clear_only && self.stencil[y * w as usize + x] != 0 {
                    continue;
                }
                self.put(x, y, rgba);
            }
        }
    }
}

/// Project a point to NDC; `None` when it is behind the camera.
fn project(m: Mat4, p: Vec3) -> Option<Vec3> {
    let clip = m * p.extend(1.0);
    (clip.w > f32::EPSILON).then(|| clip.truncate() / clip.w)
}

// ── SoftwareRenderer ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SoftwareRenderer {
    targets: HashMap<TargetId, Surface>,
    next_id: TargetId,
    created: u64,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    /// Total targets ever created, including destroyed ones.
    pub fn created_targets(&self) -> u64 {
        self.created
    }

    pub fn target_kind(&self, id: TargetId) -> Option<TargetKind> {
        self.targets.get(&id).map(|s| s.kind)
    }

    pub fn draw_count(&self, id: TargetId) -> u64 {
        self.targets.get(&id).map_or(0, |s| s.draws)
    }

    /// Pixel at (x, y), top-left origin.
    pub fn pixel(&self, id: TargetId, x: u16, y: u16) -> Option<[u8; 4]> {
        let s = self.targets.get(&id)?;
        if x >= s.resolution.width || y >= s.resolution.height {
            return None;
        }
        let i = (y as usize * s.resolution.width as usize + x as usize) * 4;
        let mut px = [0; 4];
        px.copy_from_slice(&s.color[i..i + 4]);
        Some(px)
    }

    fn surface_mut(&mut self, id: TargetId) -> Result<&mut Surface, RenderError> {
        self.targets.get_mut(&id).ok_or(RenderError::UnknownTarget { id })
    }
}

impl RenderBackend for SoftwareRenderer {
    fn create_target(&mut self, kind: TargetKind, resolution: Resolution) -> Result<TargetId, RenderError> {
        if resolution.total_pixels() == 0 {
            return Err(RenderError::AllocationFailed(format!("empty {resolution} target")));
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.created += 1;
        self.targets.insert(id, Surface::new(kind, resolution));
        debug!("Renderer: created {:?} target #{} at {}", kind, id, resolution);
        Ok(id)
    }

    fn destroy_target(&mut self, id: TargetId) -> Result<(), RenderError> {
        self.targets.remove(&id).ok_or(RenderError::UnknownTarget { id })?;
        debug!("Renderer: destroyed target #{}", id);
        Ok(())
    }

    fn target_resolution(&self, id: TargetId) -> Result<Resolution, RenderError> {
        self.targets
            .get(&id)
            .map(|s| s.resolution)
            .ok_or(RenderError::UnknownTarget { id })
    }

    fn draw_standard(&mut self, id: TargetId, view: &StandardView) -> Result<(), RenderError> {
        let surface = self.surface_mut(id)?;
        if surface.resolution != view.viewport.resolution() {
            return Err(RenderError::SizeMismatch {
                expected: view.viewport.resolution().to_string(),
                actual:   surface.resolution.to_string(),
            });
        }
        surface.clear(color_to_rgba8(STANDARD_CLEAR_COLOR));
        if let Some(ndc) = project(view.projection * view.view, Vec3::ZERO) {
            surface.stamp(ndc.truncate(), SCENE_MARKER_COLOR, false);
        }
        surface.draws += 1;
        trace!("Renderer: standard draw #{} into target #{}", surface.draws, id);
        Ok(())
    }

    fn draw_augmented(&mut self, id: TargetId, passes: &ArPasses<'_>) -> Result<(), RenderError> {
        let geometry = passes.geometry;
        let surface = self.surface_mut(id)?;
        let (w, h) = (surface.resolution.width as usize, surface.resolution.height as usize);

        // Pass 1: mask into stencil. Everything is masked except the hole.
        surface.stencil.fill(1);
        let half = geometry.viewport.size_m * 0.5;
        let corners = [
            Vec3::new(-half.x, half.y, 0.0),
            Vec3::new(half.x, half.y, 0.0),
            Vec3::new(-half.x, -half.y, 0.0),
            Vec3::new(half.x, -half.y, 0.0),
        ];
        let projected: Option<Vec<Vec3>> =
            corners.iter().map(|c| project(geometry.mask_transform, *c)).collect();
        if let Some(hole) = projected {
            let to_px = |p: &Vec3| Vec2::new((p.x + 1.0) * 0.5 * w as f32, (1.0 - p.y) * 0.5 * h as f32);
            let (min, max) = hole.iter().map(to_px).fold(
                (Vec2::splat(f32::MAX), Vec2::splat(f32::MIN)),
                |(lo, hi), p| (lo.min(p), hi.max(p)),
            );
            let x0 = (min.x.max(0.0) as usize).min(w);
            let y0 = (min.y.max(0.0) as usize).min(h);
            let x1 = (max.x.max(0.0) as usize).min(w);
            let y1 = (max.y.max(0.0) as usize).min(h);
            for y in y0..y1 {
                surface.stencil[y * w + x0..y * w + x1.max(x0)].fill(0);
            }
        }

        // Pass 2: colour.
        surface.clear(color_to_rgba8(AUGMENTED_REALITY_CLEAR_COLOR));
        if passes.draw_background {
            let black = color_to_rgba8(AUGMENTED_REALITY_BACKGROUND_COLOR);
            for i in 0..w * h {
                if surface.stencil[i] == 0 {
                    surface.color[i * 4..i * 4 + 4].copy_from_slice(&black);
                }
            }
        }
        if passes.draw_mask {
            for i in 0..w * h {
                if surface.stencil[i] != 0 {
                    surface.color[i * 4..i * 4 + 4].copy_from_slice(&MASK_DEBUG_COLOR);
                }
            }
        }
        if let Some(ndc) = project(geometry.projection * geometry.camera_world_view, Vec3::ZERO) {
            surface.stamp(ndc.truncate(), SCENE_MARKER_COLOR, true);
        }

        surface.draws += 1;
        trace!("Renderer: augmented draw #{} into target #{}", surface.draws, id);
        Ok(())
    }

    fn read_pixels(&self, id: TargetId, dst: &mut [u8]) -> Result<(), RenderError> {
        let surface = self.targets.get(&id).ok_or(RenderError::UnknownTarget { id })?;
        let needed = surface.color.len();
        if dst.len() < needed {
            return Err(RenderError::BufferTooSmall { needed, actual: dst.len() });
        }
        let row = surface.resolution.width as usize * 4;
        for (dst_row, src_row) in dst[..needed].chunks_exact_mut(row).zip(surface.color.chunks_exact(row).rev()) {
            dst_row.copy_from_slice(src_row);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewlink_core::{CameraIntrinsics, ClipPlanes, IncomingFrame, Viewport};
    use viewlink_geometry::{ArFrameGeometry, DisplayGeometry, TrackingSnapshot};

    fn ar_geometry(viewport: &Viewport) -> ArFrameGeometry {
        let tracking = TrackingSnapshot {
            display:           DisplayGeometry::default(),
            display_to_camera: Mat4::IDENTITY,
            camera_transform:  Mat4::IDENTITY,
        };
        // Webcam 1.5 m in front of the screen, looking at it.
        let frame = IncomingFrame {
            tag:         9,
            camera_pose: Mat4::from_translation(Vec3::new(0.0, 0.0, 1.5)),
            intrinsics:  CameraIntrinsics {
                focal_length: 500.0,
                principal_point_offset_x: 320.0,
                principal_point_offset_y: 240.0,
                ..Default::default()
            },
        };
        ArFrameGeometry::compute(&frame, Resolution::VGA, ClipPlanes::default(), viewport, &tracking)
    }

    #[test]
    fn standard_draw_uses_clear_colour_and_checks_size() {
        let mut r = SoftwareRenderer::new();
        let id = r.create_target(TargetKind::Standard, Resolution::new(64, 48)).unwrap();
        let view = StandardView {
            view:       Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            viewport:   Viewport::new(0, 0, 64, 48),
        };
        r.draw_standard(id, &view).unwrap();
        assert_eq!(r.pixel(id, 0, 0), Some([0, 255, 0, 128]));
        // World origin lands in the middle under identity transforms.
        assert_eq!(r.pixel(id, 32, 24), Some(SCENE_MARKER_COLOR));

        let wrong = StandardView { viewport: Viewport::new(0, 0, 32, 32), ..view };
        assert!(matches!(r.draw_standard(id, &wrong), Err(RenderError::SizeMismatch { .. })));
    }

    #[test]
    fn augmented_background_fills_only_the_hole() {
        let mut r = SoftwareRenderer::new();
        let id = r.create_target(TargetKind::AugmentedReality, Resolution::VGA).unwrap();
        let viewport = Viewport::new(480, 270, 960, 540);
        let geometry = ar_geometry(&viewport);

        r.draw_augmented(id, &ArPasses { geometry: &geometry, draw_mask: false, draw_background: true })
            .unwrap();
        assert_eq!(r.pixel(id, 0, 0), Some([0, 0, 0, 0]));
        // The hole projects to roughly x 277..363, y 216..264; the scene marker sits at 320,240.
        assert_eq!(r.pixel(id, 300, 230), Some([0, 0, 0, 255]));

        r.draw_augmented(id, &ArPasses { geometry: &geometry, draw_mask: false, draw_background: false })
            .unwrap();
        assert_eq!(r.pixel(id, 300, 230), Some([0, 0, 0, 0]));

        r.draw_augmented(id, &ArPasses { geometry: &geometry, draw_mask: true, draw_background: false })
            .unwrap();
        assert_eq!(r.pixel(id, 0, 0), Some(MASK_DEBUG_COLOR));
        assert_eq!(r.draw_count(id), 3);
    }

    #[test]
    fn read_pixels_is_bottom_row_first() {
        let mut r = SoftwareRenderer::new();
        let id = r.create_target(TargetKind::Standard, Resolution::new(2, 2)).unwrap();
        r.surface_mut(id).unwrap().put(0, 0, [1, 2, 3, 4]);

        let mut small = [0u8; 4];
        assert!(matches!(r.read_pixels(id, &mut small), Err(RenderError::BufferTooSmall { needed: 16, .. })));

        let mut buf = [0u8; 16];
        r.read_pixels(id, &mut buf).unwrap();
        assert_eq!(&buf[8..12], &[1, 2, 3, 4]);
    }

    #[test]
    fn destroy_releases_target() {
        let mut r = SoftwareRenderer::new();
        let id = r.create_target(TargetKind::Standard, Resolution::VGA).unwrap();
        r.destroy_target(id).unwrap();
        assert_eq!(r.live_targets(), 0);
        assert!(r.destroy_target(id).is_err());
        assert!(r.create_target(TargetKind::Standard, Resolution::new(0, 0)).is_err());
    }
}
