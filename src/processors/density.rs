//! Local density estimation over k-d leaves.
//!
//! The estimator partitions the 2D projection of a localization set into
//! leaves of bounded size, assigns each leaf a density (points per pixel of
//! its bounding box) and deposits that density into a square raster at the
//! pixel of every point the leaf owns.
//!
//! # Example
//!
//! ```
//! use smlm_density::diagnostics::LogDiagnostics;
//! use smlm_density::processors::density::{estimate, DensityParams};
//!
//! let points = vec![[1.0, 1.0], [1.0, 2.0], [2.0, 1.0], [2.0, 2.0]];
//! let params = DensityParams { leaf_capacity: 16, pixel_size: 1.0, image_max_extent: 10.0 };
//! let result = estimate(&points, "example", &params, &LogDiagnostics).unwrap();
//! assert_eq!(result.leaf_stats.len(), 1);
//! assert_eq!(result.leaf_stats[0].density, 1.0);
//! ```

use thiserror::Error;

use crate::config::DensityConfig;
use crate::core::raster::{Raster, MAX_SIDE};
use crate::diagnostics::Diagnostics;
use super::kdtree::Partition;

/// Errors that abort a density estimate.
///
/// None of these are transient; they point at a data scale or configuration
/// mismatch.
#[derive(Debug, Error)]
pub enum DensityError {
    #[error("invalid estimator parameter: {0}")]
    InvalidParameter(String),

    #[error("{label}: point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { label: String, index: usize },

    #[error("{label}: axis {axis} coordinate {value} is not below the image extent {limit}")]
    ExtentExceeded {
        label: String,
        axis: usize,
        value: f64,
        limit: f64,
    },

    #[error("{label}: pixel ({px}, {py}) lies outside the {side}x{side} raster")]
    PixelOutOfBounds {
        label: String,
        px: usize,
        py: usize,
        side: usize,
    },

    #[error(
        "{label}: raster overflow at pixel ({px}, {py}) adding density {density} (area {area})"
    )]
    RasterOverflow {
        label: String,
        px: usize,
        py: usize,
        density: f64,
        area: f64,
    },
}

/// Result type for density estimation.
pub type Result<T> = std::result::Result<T, DensityError>;

/// Numeric parameters of one estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityParams {
    /// Maximum number of points per leaf
    pub leaf_capacity: usize,
    /// Raster cell edge length, coordinate units
    pub pixel_size: f64,
    /// Exclusive bound of shifted coordinates on both axes
    pub image_max_extent: f64,
}

impl Default for DensityParams {
    fn default() -> Self {
        DensityParams::from(&DensityConfig::default())
    }
}

impl From<&DensityConfig> for DensityParams {
    fn from(config: &DensityConfig) -> Self {
        Self {
            leaf_capacity: config.leaf_capacity,
            pixel_size: config.pixel_size,
            image_max_extent: config.image_max_extent,
        }
    }
}

impl DensityParams {
    fn validate(&self) -> Result<()> {
        if self.leaf_capacity == 0 {
            return Err(DensityError::InvalidParameter(
                "leaf_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(DensityError::InvalidParameter(format!(
                "pixel_size must be positive, got {}",
                self.pixel_size
            )));
        }
        if !(self.image_max_extent.is_finite() && self.image_max_extent > 0.0) {
            return Err(DensityError::InvalidParameter(format!(
                "image_max_extent must be positive, got {}",
                self.image_max_extent
            )));
        }
        let side = (self.image_max_extent / self.pixel_size).ceil();
        if side > MAX_SIDE as f64 {
            return Err(DensityError::InvalidParameter(format!(
                "image_max_extent / pixel_size gives a raster side of {}, above {}",
                side, MAX_SIDE
            )));
        }
        Ok(())
    }

    /// Raster side in pixels, `ceil(image_max_extent / pixel_size)`.
    pub fn raster_side(&self) -> usize {
        (self.image_max_extent / self.pixel_size).ceil() as usize
    }
}

/// Superpixel statistics of one leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafStat {
    /// Bounding box area in pixels, each side widened by one
    pub area: f64,
    /// Points per pixel of `area`
    pub density: f64,
    /// Number of points in the leaf
    pub points: usize,
}

/// Output of [`estimate`].
#[derive(Debug, Clone)]
pub struct DensityEstimate {
    /// Partition built over the shifted points
    pub partition: Partition,
    /// Accumulated leaf densities
    pub raster: Raster,
    /// One record per leaf, in leaf enumeration order
    pub leaf_stats: Vec<LeafStat>,
    /// Offset added to each axis to remove negative coordinates
    pub shift: [f64; 2],
}

#[inline]
fn to_pixel(value: f64, pixel_size: f64) -> usize {
    // Coordinates are non-negative here, so the cast only truncates.
    (value / pixel_size).round() as usize
}

/// Add one point's leaf density to its raster cell.
///
/// The raster is `f32`, so a finite `f64` density can still push a cell to
/// infinity. That is reported and returned as [`DensityError::RasterOverflow`].
fn deposit(
    raster: &mut Raster,
    label: &str,
    (px, py): (usize, usize),
    density: f64,
    area: f64,
    diagnostics: &dyn Diagnostics,
) -> Result<()> {
    match raster.accumulate(px, py, density as f32) {
        Some(v) if v.is_finite() => Ok(()),
        _ => {
            diagnostics.error(&format!(
                "{}: overflow at ({}, {}) <- density {} area {}",
                label, px, py, density, area
            ));
            Err(DensityError::RasterOverflow {
                label: label.to_string(),
                px,
                py,
                density,
                area,
            })
        }
    }
}

/// Estimate local densities for a set of 2D points.
///
/// `points` is only read; the estimate works on a shifted copy. `label`
/// identifies the point set in diagnostics and errors.
///
/// Each point adds its leaf's density (not 1) to the raster cell it falls
/// in, so several points of one dense leaf landing in the same cell compound
/// that leaf's density.
///
/// # Errors
///
/// Fails without partial output if the parameters are invalid, a coordinate
/// is not finite, a shifted coordinate reaches `image_max_extent`, a pixel
/// falls outside the raster, or a raster cell overflows.
pub fn estimate(
    points: &[[f64; 2]],
    label: &str,
    params: &DensityParams,
    diagnostics: &dyn Diagnostics,
) -> Result<DensityEstimate> {
    params.validate()?;

    if let Some(index) = points
        .iter()
        .position(|p| !(p[0].is_finite() && p[1].is_finite()))
    {
        return Err(DensityError::NonFiniteCoordinate {
            label: label.to_string(),
            index,
        });
    }

    let mut shifted = points.to_vec();
    let mut shift = [0.0f64; 2];

    for axis in 0..2 {
        let min = shifted.iter().map(|p| p[axis]).fold(f64::INFINITY, f64::min);
        if min < 0.0 {
            shift[axis] = min.abs();
            diagnostics.warn(&format!(
                "Negative positions for {} on axis {}, shifting by {}",
                label, axis, shift[axis]
            ));
            for p in shifted.iter_mut() {
                p[axis] += shift[axis];
            }
        }
    }

    for axis in 0..2 {
        let max = shifted
            .iter()
            .map(|p| p[axis])
            .fold(f64::NEG_INFINITY, f64::max);
        if max >= params.image_max_extent {
            return Err(DensityError::ExtentExceeded {
                label: label.to_string(),
                axis,
                value: max,
                limit: params.image_max_extent,
            });
        }
    }

    let partition = Partition::build(&shifted, params.leaf_capacity);
    let leaves = partition.leaves();
    diagnostics.debug(&format!(
        "{}: {} points in {} leaves",
        label,
        shifted.len(),
        leaves.len()
    ));

    let side = params.raster_side();
    let checked_pixel = |x: f64, y: f64| -> Result<(usize, usize)> {
        let (px, py) = (to_pixel(x, params.pixel_size), to_pixel(y, params.pixel_size));
        if px >= side || py >= side {
            return Err(DensityError::PixelOutOfBounds {
                label: label.to_string(),
                px,
                py,
                side,
            });
        }
        Ok((px, py))
    };

    let mut raster = Raster::zeros(side);
    let mut leaf_stats = Vec::with_capacity(leaves.len());

    for leaf in &leaves {
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for &i in leaf.iter() {
            for axis in 0..2 {
                min[axis] = min[axis].min(shifted[i][axis]);
                max[axis] = max[axis].max(shifted[i][axis]);
            }
        }

        let (x0, y0) = checked_pixel(min[0], min[1])?; // lower left
        let (x1, y1) = checked_pixel(max[0], max[1])?; // upper right
        let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
        let density = leaf.len() as f64 / area;

        for &i in leaf.iter() {
            let pixel = checked_pixel(shifted[i][0], shifted[i][1])?;
            deposit(&mut raster, label, pixel, density, area, diagnostics)?;
        }

        leaf_stats.push(LeafStat {
            area,
            density,
            points: leaf.len(),
        });
    }

    Ok(DensityEstimate {
        partition,
        raster,
        leaf_stats,
        shift,
    })
}

/// [`estimate`] with the estimator parameters taken from a configuration.
pub fn estimate_with(
    points: &[[f64; 2]],
    label: &str,
    config: &DensityConfig,
    diagnostics: &dyn Diagnostics,
) -> Result<DensityEstimate> {
    estimate(points, label, &DensityParams::from(config), diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::normalize_to_u8;
    use crate::diagnostics::MemoryDiagnostics;
    use log::Level;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn params(leaf_capacity: usize, pixel_size: f64, image_max_extent: f64) -> DensityParams {
        DensityParams {
            leaf_capacity,
            pixel_size,
            image_max_extent,
        }
    }

    /// Seeded random points in `[0, extent)`.
    fn scattered_points(n: usize, extent: f64) -> Vec<[f64; 2]> {
        let mut rng = StdRng::seed_from_u64(42);
        (0..n)
            .map(|_| [rng.gen_range(0.0..extent), rng.gen_range(0.0..extent)])
            .collect()
    }

    #[test]
    fn test_four_point_scenario() {
        let points = vec![[1.0, 1.0], [1.0, 2.0], [2.0, 1.0], [2.0, 2.0]];
        let diag = MemoryDiagnostics::new();

        let result = estimate(&points, "scenario", &params(16, 1.0, 10.0), &diag).unwrap();

        assert_eq!(result.leaf_stats.len(), 1);
        assert_eq!(result.leaf_stats[0].area, 4.0);
        assert_eq!(result.leaf_stats[0].density, 1.0);
        assert_eq!(result.raster.side(), 10);
        assert_eq!(
            result.raster.nonzero(),
            vec![((1, 1), 1.0), ((1, 2), 1.0), ((2, 1), 1.0), ((2, 2), 1.0)]
        );

        let image = normalize_to_u8(&result.raster);
        for (px, py) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
            assert_eq!(image[px * 10 + py], 255);
        }
        assert_eq!(image.iter().filter(|&&v| v != 0).count(), 4);
        assert!(diag.messages_at(Level::Warn).is_empty());
    }

    #[test]
    fn test_every_index_in_one_leaf_and_counts_sum() {
        let points = scattered_points(5_000, 39_000.0);
        let result =
            estimate(&points, "scatter", &DensityParams::default(), &MemoryDiagnostics::new())
                .unwrap();

        let leaves = result.partition.leaves();
        let mut seen = vec![false; points.len()];
        for leaf in &leaves {
            assert!(leaf.len() <= 16);
            for &i in leaf.iter() {
                assert!(!seen[i], "point {} in two leaves", i);
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));

        let total: usize = result.leaf_stats.iter().map(|s| s.points).sum();
        assert_eq!(total, points.len());
        assert_eq!(result.leaf_stats.len(), leaves.len());
    }

    #[test]
    fn test_identical_points_form_unit_area_leaf() {
        let points = vec![[123.0, 456.0]; 40];
        let diag = MemoryDiagnostics::new();
        let result = estimate(&points, "same", &params(16, 10.0, 1_000.0), &diag).unwrap();

        assert_eq!(result.leaf_stats.len(), 1);
        assert_eq!(result.leaf_stats[0].area, 1.0);
        assert_eq!(result.leaf_stats[0].density, 40.0);
    }

    #[test]
    fn test_negative_axis_is_shifted_and_reported() {
        let points = vec![[-5.0, 1.0], [0.0, 2.0], [3.0, 3.0]];
        let diag = MemoryDiagnostics::new();

        let result = estimate(&points, "neg", &params(16, 1.0, 10.0), &diag).unwrap();

        assert_eq!(result.shift, [5.0, 0.0]);
        let warnings = diag.messages_at(Level::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("neg"));

        // shifted x = 0, 5, 8 -> pixel columns of the single leaf
        let rows: Vec<usize> = result.raster.nonzero().iter().map(|((px, _), _)| *px).collect();
        assert_eq!(rows, vec![0, 5, 8]);
    }

    #[test]
    fn test_negative_y_is_shifted_and_reported() {
        let points = vec![[1.0, -3.0], [2.0, 0.0]];
        let diag = MemoryDiagnostics::new();

        let result = estimate(&points, "neg_y", &params(16, 1.0, 10.0), &diag).unwrap();

        assert_eq!(result.shift, [0.0, 3.0]);
        let warnings = diag.messages_at(Level::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("axis 1"));

        // shifted y = 0, 3
        assert_eq!(
            result.raster.nonzero().iter().map(|(cell, _)| *cell).collect::<Vec<_>>(),
            vec![(1, 0), (2, 3)]
        );
    }

    #[test]
    fn test_both_axes_negative_are_shifted_independently() {
        let points = vec![[-2.0, -4.0], [1.0, 1.0]];
        let diag = MemoryDiagnostics::new();

        let result = estimate(&points, "neg_xy", &params(16, 1.0, 10.0), &diag).unwrap();

        assert_eq!(result.shift, [2.0, 4.0]);
        let warnings = diag.messages_at(Level::Warn);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("axis 0"));
        assert!(warnings[1].contains("axis 1"));
        assert_eq!(
            result.raster.nonzero().iter().map(|(cell, _)| *cell).collect::<Vec<_>>(),
            vec![(0, 0), (3, 5)]
        );
    }

    #[test]
    fn test_shifted_maximum_is_still_checked() {
        // -5 shifts the axis by 5, pushing 6 up to the extent of 11
        let points = vec![[-5.0, 0.0], [6.0, 0.0]];
        let diag = MemoryDiagnostics::new();
        let err = estimate(&points, "wide", &params(16, 1.0, 11.0), &diag).unwrap_err();

        assert!(matches!(
            err,
            DensityError::ExtentExceeded { axis: 0, value, limit, .. }
                if value == 11.0 && limit == 11.0
        ));
    }

    #[test]
    fn test_extent_bound_is_strict() {
        let diag = MemoryDiagnostics::new();
        let at_limit = vec![[1.0, 10.0]];
        let err = estimate(&at_limit, "edge", &params(16, 1.0, 10.0), &diag).unwrap_err();
        assert!(matches!(err, DensityError::ExtentExceeded { axis: 1, .. }));
        assert!(err.to_string().contains("edge"));

        let below = vec![[1.0, 9.4]];
        assert!(estimate(&below, "edge", &params(16, 1.0, 10.0), &diag).is_ok());
    }

    #[test]
    fn test_pixel_rounding_past_the_raster_fails() {
        // 9.6 is below the extent but rounds to pixel 10 of a 10 pixel raster
        let points = vec![[9.6, 0.0]];
        let diag = MemoryDiagnostics::new();
        let err = estimate(&points, "round", &params(16, 1.0, 10.0), &diag).unwrap_err();
        assert!(matches!(
            err,
            DensityError::PixelOutOfBounds { px: 10, py: 0, side: 10, .. }
        ));
    }

    #[test]
    fn test_empty_input_gives_zero_raster() {
        let diag = MemoryDiagnostics::new();
        let result = estimate(&[], "empty", &params(16, 1.0, 4.0), &diag).unwrap();
        assert!(result.leaf_stats.is_empty());
        assert!(result.partition.leaves().is_empty());
        assert_eq!(result.raster.side(), 4);
        assert_eq!(result.raster.max(), 0.0);
        assert!(normalize_to_u8(&result.raster).iter().all(|&v| v == 0));
    }

    #[test]
    fn test_accumulation_is_weighted_by_leaf_density() {
        // Three coincident points and one neighbour in a single leaf:
        // box is 2x1 pixels, area (1+1)*(0+1) = 2, density 4/2 = 2.
        // A plain histogram would give 3 at (0, 0); the estimator adds the
        // leaf density once per point instead.
        let points = vec![[0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [1.0, 0.0]];
        let diag = MemoryDiagnostics::new();
        let result = estimate(&points, "weighted", &params(16, 1.0, 4.0), &diag).unwrap();

        assert_eq!(result.leaf_stats[0].area, 2.0);
        assert_eq!(result.leaf_stats[0].density, 2.0);
        assert_eq!(result.raster.get(0, 0), Some(6.0));
        assert_eq!(result.raster.get(1, 0), Some(2.0));
    }

    #[test]
    fn test_caller_points_are_not_modified() {
        let points = vec![[-3.0, -4.0], [1.0, 1.0]];
        let before = points.clone();
        estimate(&points, "owned", &params(16, 1.0, 10.0), &MemoryDiagnostics::new()).unwrap();
        assert_eq!(points, before);
    }

    #[test]
    fn test_non_finite_coordinate_rejected() {
        let points = vec![[1.0, 1.0], [f64::NAN, 2.0]];
        let diag = MemoryDiagnostics::new();
        let err = estimate(&points, "nan", &params(16, 1.0, 10.0), &diag).unwrap_err();
        assert!(matches!(err, DensityError::NonFiniteCoordinate { index: 1, .. }));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let points = vec![[1.0, 1.0]];
        let diag = MemoryDiagnostics::new();
        for bad in [params(0, 1.0, 10.0), params(16, 0.0, 10.0), params(16, 1.0, -1.0)] {
            assert!(matches!(
                estimate(&points, "bad", &bad, &diag),
                Err(DensityError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_oversized_raster_rejected_before_allocation() {
        // 1e5 / 1e-6 would be a 1e11 pixel side
        let points = vec![[1.0, 1.0]];
        let err = estimate(&points, "huge", &params(16, 1e-6, 1e5), &MemoryDiagnostics::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DensityError::InvalidParameter(ref msg) if msg.contains("raster side")
        ));

        let largest = params(16, 1.0, MAX_SIDE as f64);
        assert_eq!(largest.raster_side(), MAX_SIDE);
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_overflowing_cell_is_reported() {
        let mut raster = Raster::zeros(2);
        let diag = MemoryDiagnostics::new();
        let density = f64::from(f32::MAX);

        deposit(&mut raster, "hot", (1, 0), density, 1.0, &diag).unwrap();
        let err = deposit(&mut raster, "hot", (1, 0), density, 1.0, &diag).unwrap_err();

        match err {
            DensityError::RasterOverflow {
                label,
                px,
                py,
                density: d,
                area,
            } => {
                assert_eq!(label, "hot");
                assert_eq!((px, py), (1, 0));
                assert_eq!(d, density);
                assert_eq!(area, 1.0);
            }
            other => panic!("expected RasterOverflow, got {:?}", other),
        }
        let errors = diag.messages_at(Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("hot: overflow at (1, 0)"));
    }

    #[test]
    fn test_estimate_with_uses_config_parameters() {
        let config = DensityConfig {
            leaf_capacity: 2,
            pixel_size: 1.0,
            image_max_extent: 10.0,
            ..Default::default()
        };
        let points = vec![[1.0, 1.0], [1.0, 2.0], [6.0, 1.0], [6.0, 2.0]];

        let result = estimate_with(&points, "cfg", &config, &MemoryDiagnostics::new()).unwrap();

        assert_eq!(result.raster.side(), 10);
        assert_eq!(result.leaf_stats.len(), 2);
        assert!(result.leaf_stats.iter().all(|s| s.points == 2));

        let bad = DensityConfig {
            leaf_capacity: 0,
            ..config
        };
        assert!(matches!(
            estimate_with(&points, "cfg", &bad, &MemoryDiagnostics::new()),
            Err(DensityError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_default_params_match_config() {
        let p = DensityParams::default();
        assert_eq!(p.leaf_capacity, 16);
        assert_eq!(p.pixel_size, 10.0);
        assert_eq!(p.image_max_extent, 40_000.0);
        assert_eq!(p.raster_side(), 4_000);
    }
}
