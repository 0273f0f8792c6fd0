//! The immutable configuration record injected once at construction.
//!
//! There is no live reconfiguration: changing any parameter means building
//! a new pipeline. Validation happens up front so nothing downstream has to
//! defend against out-of-range values.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheParams;
use crate::erosion::ErosionParams;
use crate::layers::{LayerParams, MAX_POINTS_PER_TILE};
use crate::streaming::StreamingParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} out of range: {reason}")]
    OutOfRange { name: &'static str, reason: String },

    #[error("failed to create cache root {path:?}")]
    CacheRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn out_of_range(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        reason: reason.into(),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldConfig {
    pub world_seed: u32,
    /// Tile edge length in pixels (`S`).
    pub tile_size: usize,
    /// Erosion padding in pixels (`P`).
    pub padding: usize,
    pub layers: LayerParams,
    pub erosion: ErosionParams,
    pub streaming: StreamingParams,
    pub cache: CacheParams,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            world_seed: 0,
            tile_size: 256,
            padding: 128,
            layers: LayerParams::default(),
            erosion: ErosionParams::default(),
            streaming: StreamingParams::default(),
            cache: CacheParams::default(),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(out_of_range("tile_size", "must be positive"));
        }

        let l = &self.layers;
        if l.n_points == 0 || l.n_points > MAX_POINTS_PER_TILE {
            return Err(out_of_range(
                "layers.n_points",
                format!("must be in 1..={MAX_POINTS_PER_TILE}, got {}", l.n_points),
            ));
        }
        if l.noise_octaves == 0 {
            return Err(out_of_range("layers.noise_octaves", "must be positive"));
        }
        if l.min_h > l.max_h {
            return Err(out_of_range(
                "layers.min_h",
                format!("min_h {} exceeds max_h {}", l.min_h, l.max_h),
            ));
        }
        for (name, value) in [
            ("layers.voronoi_intensity", l.voronoi_intensity),
            ("layers.noise_intensity", l.noise_intensity),
            ("layers.falloff", l.falloff),
            ("layers.ridge_multiplier", l.ridge_multiplier),
            ("layers.amplitude", l.amplitude),
            ("layers.min_h", l.min_h),
            ("layers.max_h", l.max_h),
            ("layers.noise_freq", l.noise_freq),
            ("layers.noise_lacunarity", l.noise_lacunarity),
            ("layers.noise_persistence", l.noise_persistence),
        ] {
            if !value.is_finite() {
                return Err(out_of_range(name, "must be finite"));
            }
        }

        let e = &self.erosion;
        if e.enabled {
            if e.brush_radius == 0 {
                return Err(out_of_range("erosion.brush_radius", "must be at least 1"));
            }
            if e.brush_radius as usize >= self.tile_size / 2 + self.padding {
                return Err(out_of_range(
                    "erosion.brush_radius",
                    "brush does not fit inside the padded canvas",
                ));
            }
            if !(0.0..=1.0).contains(&e.intensity) {
                return Err(out_of_range(
                    "erosion.intensity",
                    format!("must be in [0, 1], got {}", e.intensity),
                ));
            }
            for (name, value) in [
                ("erosion.sediment_capacity_factor", e.sediment_capacity_factor),
                ("erosion.min_sediment_capacity", e.min_sediment_capacity),
                ("erosion.deposit_speed", e.deposit_speed),
                ("erosion.erode_speed", e.erode_speed),
                ("erosion.evaporate_speed", e.evaporate_speed),
                ("erosion.gravity", e.gravity),
                ("erosion.start_speed", e.start_speed),
                ("erosion.start_water", e.start_water),
                ("erosion.inertia", e.inertia),
            ] {
                if !value.is_finite() {
                    return Err(out_of_range(name, "must be finite"));
                }
            }
            if !(0.0..=1.0).contains(&e.inertia) {
                return Err(out_of_range(
                    "erosion.inertia",
                    format!("must be in [0, 1], got {}", e.inertia),
                ));
            }
            if !(0.0..=1.0).contains(&e.evaporate_speed) {
                return Err(out_of_range(
                    "erosion.evaporate_speed",
                    format!("must be in [0, 1], got {}", e.evaporate_speed),
                ));
            }
        }

        let s = &self.streaming;
        if s.batch_size == 0 {
            return Err(out_of_range("streaming.batch_size", "must be positive"));
        }
        if s.max_cached_batches == 0 {
            return Err(out_of_range(
                "streaming.max_cached_batches",
                "must be positive",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(WorldConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        let config = WorldConfig {
            tile_size: 0,
            ..WorldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "tile_size", .. })
        ));
    }

    #[test]
    fn voronoi_point_cap_is_enforced() {
        let mut config = WorldConfig::default();
        config.layers.n_points = 11;
        assert!(config.validate().is_err());
        config.layers.n_points = 0;
        assert!(config.validate().is_err());
        config.layers.n_points = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_height_range_is_rejected() {
        let mut config = WorldConfig::default();
        config.layers.min_h = 2.0;
        config.layers.max_h = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        let mut config = WorldConfig::default();
        config.layers.falloff = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = WorldConfig::default();
        config.erosion.gravity = f32::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn erosion_ranges_are_checked_only_when_enabled() {
        let mut config = WorldConfig::default();
        config.erosion.intensity = 1.5;
        assert!(config.validate().is_err());
        config.erosion.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oversized_brush_is_rejected() {
        let mut config = WorldConfig::default();
        config.tile_size = 16;
        config.padding = 4;
        config.erosion.brush_radius = 12;
        assert!(config.validate().is_err());
        config.erosion.brush_radius = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn streaming_sizes_must_be_positive() {
        let mut config = WorldConfig::default();
        config.streaming.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = WorldConfig::default();
        config.streaming.max_cached_batches = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn error_messages_name_the_offending_parameter() {
        let mut config = WorldConfig::default();
        config.layers.n_points = 99;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("n_points"));
    }
}
