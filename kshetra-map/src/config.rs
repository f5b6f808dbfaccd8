//! Map construction configuration.
//!
//! Every value is immutable after construction. The crate does not parse
//! configuration files; embedders build a [`MapConfig`] however they load
//! settings (the serde derives are there for exactly that).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MapError, Result};

/// Configuration of a [`SlidingWindowMap`](crate::SlidingWindowMap).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapConfig {
    /// Minimum Euclidean distance (meters) between a new scan point and its
    /// nearest map point for the scan point to be inserted.
    pub min_dist_new_point: f32,

    /// Maximum sensor range (meters). Drives the window radius and bounds
    /// the dynamic-probability update.
    pub sensor_max_range: f32,

    /// Prior probability that a freshly inserted point is dynamic.
    pub prior_dynamic: f32,

    /// Probability above which a point is considered confirmed dynamic and
    /// latched near 1.
    pub threshold_dynamic: f32,

    /// Angular tolerance (radians) for associating map and scan points in
    /// spherical coordinates.
    pub beam_half_angle: f32,

    /// Fraction of the measured range tolerated as range noise.
    pub epsilon_a: f32,

    /// Absolute range tolerance (meters).
    pub epsilon_d: f32,

    /// Static-to-static transition rate of the dynamic-probability model.
    pub alpha: f32,

    /// Dynamic-to-dynamic transition rate of the dynamic-probability model.
    pub beta: f32,

    /// True for a 3D map, false for a planar (2D) map.
    pub is_3d: bool,

    /// True to stream cells on a background worker; false applies every
    /// region update synchronously on the caller's thread.
    pub is_online: bool,

    /// True to maintain the per-point dynamic probability on scan insertion.
    pub compute_prob_dynamic: bool,

    /// True to page cells to disk, false to keep them in RAM.
    pub save_cells_on_hard_drive: bool,

    /// Directory for the disk back-end. Only used when
    /// `save_cells_on_hard_drive` is set.
    pub cell_directory: PathBuf,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            min_dist_new_point: 0.03,
            sensor_max_range: 80.0,
            prior_dynamic: 0.6,
            threshold_dynamic: 0.9,
            beam_half_angle: 0.01,
            epsilon_a: 0.01,
            epsilon_d: 0.01,
            alpha: 0.8,
            beta: 0.99,
            is_3d: true,
            is_online: true,
            compute_prob_dynamic: false,
            save_cells_on_hard_drive: false,
            cell_directory: std::env::temp_dir().join("kshetra-cells"),
        }
    }
}

impl MapConfig {
    /// Check value ranges. Called by the map constructor.
    pub fn validate(&self) -> Result<()> {
        fn probability(name: &str, value: f32) -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(MapError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
            Ok(())
        }
        fn positive(name: &str, value: f32) -> Result<()> {
            if !value.is_finite() || value <= 0.0 {
                return Err(MapError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
            Ok(())
        }

        positive("sensor_max_range", self.sensor_max_range)?;
        positive("beam_half_angle", self.beam_half_angle)?;
        if self.min_dist_new_point < 0.0 {
            return Err(MapError::Config(format!(
                "min_dist_new_point must be non-negative, got {}",
                self.min_dist_new_point
            )));
        }
        probability("prior_dynamic", self.prior_dynamic)?;
        probability("threshold_dynamic", self.threshold_dynamic)?;
        probability("alpha", self.alpha)?;
        probability("beta", self.beta)?;
        if self.epsilon_a < 0.0 || self.epsilon_d < 0.0 {
            return Err(MapError::Config(
                "epsilon_a and epsilon_d must be non-negative".into(),
            ));
        }
        if self.save_cells_on_hard_drive && self.cell_directory.as_os_str().is_empty() {
            return Err(MapError::Config(
                "cell_directory must be set when save_cells_on_hard_drive is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Map dimensionality: 3 when `is_3d`, 2 otherwise.
    #[inline]
    pub fn dim(&self) -> usize {
        if self.is_3d {
            3
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MapConfig::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_probability_is_rejected() {
        let config = MapConfig {
            prior_dynamic: 1.5,
            ..MapConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_range_is_rejected() {
        let config = MapConfig {
            sensor_max_range: 0.0,
            ..MapConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
