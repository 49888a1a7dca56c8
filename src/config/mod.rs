//! Configuration types for local resolution estimation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::raster::MAX_SIDE;

/// Errors that can occur while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What the batch wrapper does when one (cell, channel) pair fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole batch on the first failure.
    #[default]
    Abort,
    /// Record the failure for that pair and keep going.
    Isolate,
}

/// Parameters of the density estimator and its batch wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityConfig {
    /// Maximum number of points per k-d leaf
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,

    /// Edge length of one raster cell, in coordinate units (nm)
    #[serde(default = "default_pixel_size")]
    pub pixel_size: f64,

    /// Exclusive upper bound of shifted coordinates on both axes (nm)
    #[serde(default = "default_image_max_extent")]
    pub image_max_extent: f64,

    /// Batch behavior when a pair fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Process (cell, channel) pairs on the rayon pool
    #[serde(default)]
    pub parallel: bool,
}

fn default_leaf_capacity() -> usize {
    16
}

fn default_pixel_size() -> f64 {
    10.0
}

fn default_image_max_extent() -> f64 {
    40_000.0
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: default_leaf_capacity(),
            pixel_size: default_pixel_size(),
            image_max_extent: default_image_max_extent(),
            failure_policy: FailurePolicy::default(),
            parallel: false,
        }
    }
}

impl DensityConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DensityConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject parameter combinations the estimator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.leaf_capacity == 0 {
            return Err(ConfigError::Invalid("leaf_capacity must be at least 1".into()));
        }
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pixel_size must be positive, got {}",
                self.pixel_size
            )));
        }
        if !(self.image_max_extent.is_finite() && self.image_max_extent > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "image_max_extent must be positive, got {}",
                self.image_max_extent
            )));
        }
        let side = (self.image_max_extent / self.pixel_size).ceil();
        if side > MAX_SIDE as f64 {
            return Err(ConfigError::Invalid(format!(
                "image_max_extent / pixel_size gives a raster side of {}, above {}",
                side, MAX_SIDE
            )));
        }
        Ok(())
    }

    /// Signal-to-noise ratio callers associate with this leaf capacity.
    ///
    /// This is a naming convention, `sqrt(leaf_capacity) / 2`; the estimator
    /// itself never uses it.
    pub fn signal_to_noise(&self) -> f64 {
        signal_to_noise(self.leaf_capacity)
    }
}

/// `sqrt(leaf_capacity) / 2`, as used in output file names.
///
/// A capacity of 16 gives 2.0, the `oct_2.00` suffix of the default
/// configuration.
pub fn signal_to_noise(leaf_capacity: usize) -> f64 {
    (leaf_capacity as f64).sqrt() / 2.0
}
