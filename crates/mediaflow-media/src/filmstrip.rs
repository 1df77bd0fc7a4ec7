//! Filmstrip sprite geometry.

use serde::{Deserialize, Serialize};

use mediaflow_models::FilmstripConfig;

/// Deterministic sprite layout for a clip of known duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmstripLayout {
    /// Sprite width in pixels (`columns * tile_width`).
    pub width: u32,
    /// Sprite height in pixels (`rows * tile_height`).
    pub height: u32,
    pub columns: u32,
    pub rows: u32,
    pub total_frames: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub interval_seconds: f64,
}

impl FilmstripLayout {
    /// `None` when the duration is unknown or not positive.
    pub fn compute(duration_seconds: f64, config: &FilmstripConfig) -> Option<Self> {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 || config.columns == 0 {
            return None;
        }

        let total_frames = (duration_seconds * config.capture_fps).ceil() as u32;
        let rows = total_frames.div_ceil(config.columns);

        Some(Self {
            width: config.columns * config.tile_width,
            height: rows * config.tile_height,
            columns: config.columns,
            rows,
            total_frames,
            tile_width: config.tile_width,
            tile_height: config.tile_height,
            interval_seconds: 1.0 / config.capture_fps,
        })
    }
}
