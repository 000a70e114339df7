use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::culler::DEFAULT_CULL_MARGIN;
use crate::error::Result;
use crate::grid::GridConfig;
use crate::selection::SelectionConfig;

/// Pipeline feature switches and tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enable_culling: bool,
    pub enable_caching: bool,
    pub enable_batching: bool,
    pub enable_lod: bool,
    pub max_render_objects: usize,
    pub target_fps: u32,
    /// Per-phase timing logs and the bounds overlay.
    pub debug_mode: bool,
    /// World units added around the viewport before culling.
    pub cull_margin: f64,
    pub batch_size: usize,
    /// Complex objects switch to LOD below this zoom.
    pub lod_zoom_threshold: f64,
    /// Objects smaller than this on screen (pixels) switch to LOD.
    pub lod_min_screen_size: f64,
    /// Number of frames kept for the phase breakdown.
    pub metrics_window: usize,
    pub cache: CacheConfig,
    pub grid: GridConfig,
    pub selection: SelectionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_culling: true,
            enable_caching: true,
            enable_batching: true,
            enable_lod: true,
            max_render_objects: 10_000,
            target_fps: 60,
            debug_mode: false,
            cull_margin: DEFAULT_CULL_MARGIN,
            batch_size: 50,
            lod_zoom_threshold: 0.5,
            lod_min_screen_size: 10.0,
            metrics_window: 120,
            cache: CacheConfig::default(),
            grid: GridConfig::default(),
            selection: SelectionConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Time available for one frame at the target rate.
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{ "enable_lod": false, "target_fps": 30 }"#).unwrap();
        assert!(!config.enable_lod);
        assert!(config.enable_culling);
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.grid.size, 20.0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = PipelineConfig::default();
        config.debug_mode = true;
        config.cache.max_items = 2;
        let back = PipelineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_frame_budget() {
        let config = PipelineConfig::default();
        assert!((config.frame_budget().as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);

        let zero = PipelineConfig {
            target_fps: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(zero.frame_budget(), Duration::from_secs(1));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = PipelineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::RenderError::Config(_)));
    }
}
