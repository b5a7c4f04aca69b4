use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::PresenterError;
use crate::types::Viewport;

/// Near and far clip planes for augmented reality projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipPlanes {
    pub near: f32,
    pub far: f32,
}

impl Default for ClipPlanes {
    fn default() -> Self {
        Self { near: 0.1, far: 100.0 }
    }
}

/// Step sizes and bounds for overlay adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    #[serde(alias = "offsetStep")]
    pub offset_step: f32,
    #[serde(alias = "scaleStep")]
    pub scale_step: f32,
    #[serde(alias = "scaleMin")]
    pub scale_min: f32,
    #[serde(alias = "scaleMax")]
    pub scale_max: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            offset_step: 1.0,
            scale_step: 0.01,
            scale_min: 0.01,
            scale_max: 10.0,
        }
    }
}

/// Presenter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    #[serde(alias = "nodeName")]
    pub node_name: String,
    pub window: Viewport,
    #[serde(alias = "tickHz")]
    pub tick_hz: u32,
    #[serde(alias = "maxSessionFailures")]
    pub max_session_failures: u32,
    #[serde(alias = "setupWaitTimeoutTicks")]
    pub setup_wait_timeout_ticks: u32,
    #[serde(alias = "clipPlanes")]
    pub clip_planes: ClipPlanes,
    pub overlay: OverlayConfig,
    #[serde(alias = "recordingSaveName")]
    pub recording_save_name: String,
    #[serde(alias = "drawMask")]
    pub draw_mask: bool,
    #[serde(alias = "drawBackground")]
    pub draw_background: bool,
    #[serde(alias = "statsIntervalFrames")]
    pub stats_interval_frames: u64,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            node_name: "ViewLink Presenter".to_owned(),
            window: Viewport::default(),
            tick_hz: 60,
            max_session_failures: 3,
            setup_wait_timeout_ticks: 600,
            clip_planes: ClipPlanes::default(),
            overlay: OverlayConfig::default(),
            recording_save_name: "ViewLinkPresenterRecording.mp4".to_owned(),
            draw_mask: false,
            draw_background: true,
            stats_interval_frames: 300,
        }
    }
}

impl PresenterConfig {
    /// Parse a JSON document, then validate it.
    pub fn from_json(json: &str) -> Result<Self, PresenterError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| PresenterError::ConfigurationInvalid {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PresenterError> {
        let invalid = |reason: &str| {
            Err(PresenterError::ConfigurationInvalid { reason: reason.to_owned() })
        };
        if self.tick_hz == 0 {
            return invalid("tick_hz must be positive");
        }
        if self.window.width == 0 || self.window.height == 0 {
            return invalid("window must have a non-zero size");
        }
        if !(self.clip_planes.near > 0.0 && self.clip_planes.far > self.clip_planes.near) {
            return invalid("clip planes must satisfy 0 < near < far");
        }
        if self.overlay.scale_min > self.overlay.scale_max {
            return invalid("overlay scale_min exceeds scale_max");
        }
        if self.max_session_failures == 0 {
            return invalid("max_session_failures must be at least 1");
        }
        Ok(())
    }

    /// Period of the driving loop.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_hz.max(1) as u64)
    }
}
