//! Local effective resolution maps for single-molecule localization
//! microscopy.
//!
//! This crate provides tools for:
//! - Partitioning 2D localization projections into bounded k-d leaves
//! - Rasterizing per-leaf densities into a fixed-resolution grid
//! - Exporting normalized density images per (cell, channel) pair
//! - Preprocessing localization tables (Z masking, ROI slicing, outliers)
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::path::Path;
//!
//! use smlm_density::{compute_local_resolution, DensityConfig, Localizations, LogDiagnostics};
//!
//! let locs = Localizations::from_points(vec![[120.0, 80.0, 0.0], [130.0, 95.0, 12.0]]);
//! let mut dataset = BTreeMap::new();
//! dataset.insert("1".to_string(), BTreeMap::from([("cy3b".to_string(), locs)]));
//!
//! let report = compute_local_resolution(
//!     Some(&dataset),
//!     &DensityConfig::default(),
//!     Path::new("out"),
//!     &LogDiagnostics,
//! )
//! .unwrap();
//! println!("{} images written", report.results.len());
//! ```

pub mod config;
pub mod core;
pub mod diagnostics;
pub mod processors;

pub use crate::config::{DensityConfig, FailurePolicy};
pub use crate::core::localizations::{Localizations, PointSource};
pub use diagnostics::{Diagnostics, LogDiagnostics, MemoryDiagnostics};
pub use processors::batch::compute_local_resolution;
pub use processors::density::estimate;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
