//! Tuning parameters for the path merger.

use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;

use crate::error::{MergeError, Result};

/// Configuration for [`PathMerger`](crate::merger::PathMerger).
///
/// Every field has a default, so a JSON file only needs to list what it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    /// System delay τ₁ from path handler to controller (default: 0.2 s)
    pub system_delay_s: f64,

    /// Length of the blend region on the new path (default: 3.0 m)
    pub blend_length_m: f64,

    /// Smoothing λ₁ in [0, 1]: 0 = pure fidelity, 1 = pure curvature penalty
    pub smoothing: f64,

    /// Heading constraint weight λ₂ in [0, 1] (default: 0.5)
    pub heading_weight: f64,

    /// Exponent of the blend weight ramp; larger hands off to the new path later
    pub weight_exponent: f64,

    /// B-spline degree (default: 3)
    pub spline_degree: usize,

    /// Number of samples taken from the fitted curve (default: 101)
    pub output_samples: usize,

    /// Candidates with fewer than `spline_degree + 2` distinct points are
    /// re-sampled at this spacing; denser ones and `None` use them as given
    /// (default: 0.1 m)
    pub input_spacing_m: Option<f64>,

    /// Speed used by `merge` when the caller does not supply one (default: 10 km/h)
    pub default_speed_mps: f64,

    /// Largest gap that still counts as overlap between old and new path (default: 5 m)
    pub max_overlap_distance_m: f64,

    /// Trailing `(0, 0)` runs at least this long are treated as padding (default: 5)
    pub zero_padding_run: usize,

    /// Number of merge records kept for diagnostics (default: 256)
    pub history_capacity: usize,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            system_delay_s: 0.2,
            blend_length_m: 3.0,
            smoothing: 0.5,
            heading_weight: 0.5,
            weight_exponent: 3.0,
            spline_degree: 3,
            output_samples: 101,
            input_spacing_m: Some(0.1),
            default_speed_mps: 10.0 / 3.6,
            max_overlap_distance_m: 5.0,
            zero_padding_run: 5,
            history_capacity: 256,
        }
    }
}

impl MergerConfig {
    /// Check that every field is inside its admissible range.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(MergeError::config(format!("{} = {} must lie in [0, 1]", name, v)))
            }
        };
        unit("smoothing", self.smoothing)?;
        unit("heading_weight", self.heading_weight)?;

        if !(self.system_delay_s.is_finite() && self.system_delay_s >= 0.0) {
            return Err(MergeError::config("system_delay_s must be finite and non-negative"));
        }
        if !(self.blend_length_m.is_finite() && self.blend_length_m >= 0.0) {
            return Err(MergeError::config("blend_length_m must be finite and non-negative"));
        }
        if !(self.weight_exponent.is_finite() && self.weight_exponent > 0.0) {
            return Err(MergeError::config("weight_exponent must be positive"));
        }
        if self.spline_degree == 0 {
            return Err(MergeError::config("spline_degree must be at least 1"));
        }
        if self.output_samples < 2 {
            return Err(MergeError::config("output_samples must be at least 2"));
        }
        if let Some(ds) = self.input_spacing_m {
            if !(ds.is_finite() && ds > 0.0) {
                return Err(MergeError::config("input_spacing_m must be positive"));
            }
        }
        if !(self.default_speed_mps.is_finite() && self.default_speed_mps >= 0.0) {
            return Err(MergeError::config("default_speed_mps must be finite and non-negative"));
        }
        if !(self.max_overlap_distance_m >= 0.0) {
            return Err(MergeError::config("max_overlap_distance_m must be non-negative"));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(MergeError::config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn from_file(path: impl AsRef<FsPath>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MergeError::config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&text)
    }
}
