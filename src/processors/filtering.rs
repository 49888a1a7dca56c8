//! Localization preprocessing filters.
//!
//! All filters return a filtered copy and leave their input untouched.

use log::info;
use thiserror::Error;

use crate::core::localizations::{Localizations, PointSource};

/// Errors that can occur during filtering operations.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Unknown value column: {0}")]
    UnknownColumn(String),

    #[error("ROI bounds must have 1 to 3 axes and equal lengths, got {min} and {max}")]
    DimensionMismatch { min: usize, max: usize },
}

/// Drop localizations whose `|z|` is not below `threshold`.
///
/// Some acquisition software writes corrupt Z values (around ±1e36); a
/// threshold of `1e15` removes them while keeping every physical position.
///
/// # Returns
///
/// The filtered table and the percentage of rows removed.
pub fn mask_z(locs: &Localizations, threshold: f64) -> (Localizations, f64) {
    let kept = locs.retain_rows(|p, _| p[2].abs() < threshold);
    let removed = locs.len() - kept.len();
    let pct = if locs.is_empty() {
        0.0
    } else {
        removed as f64 / locs.len() as f64 * 100.0
    };
    (kept, pct)
}

/// Keep localizations with `z_min < z <= z_max`.
pub fn filter_z_plane(locs: &Localizations, z_min: f64, z_max: f64) -> Localizations {
    info!("Z plane filter, min {} max {}", z_min, z_max);
    locs.retain_rows(|p, _| p[2] > z_min && p[2] <= z_max)
}

/// Keep localizations strictly inside the open box `(min, max)`.
///
/// `min` and `max` cover the first one to three axes; axes beyond their
/// length are not constrained.
///
/// # Errors
///
/// Returns an error if the bounds differ in length or have no axes or more
/// than three.
pub fn slice_roi(
    locs: &Localizations,
    min: &[f64],
    max: &[f64],
) -> Result<Localizations, FilterError> {
    if min.len() != max.len() || min.is_empty() || min.len() > 3 {
        return Err(FilterError::DimensionMismatch {
            min: min.len(),
            max: max.len(),
        });
    }

    let kept = locs.retain_rows(|p, _| {
        min.iter()
            .zip(max)
            .enumerate()
            .all(|(axis, (&lo, &hi))| p[axis] > lo && p[axis] < hi)
    });
    info!("Removed {} out of {} points", locs.len() - kept.len(), locs.len());
    Ok(kept)
}

/// Drop localizations whose `column` value exceeds `mean + k_sd * sd`.
///
/// Used on photon counts to remove overly bright events. The standard
/// deviation is the population one.
///
/// # Errors
///
/// Returns an error if `column` is not one of the table's value names.
pub fn filter_value_outliers(
    locs: &Localizations,
    column: &str,
    k_sd: f64,
) -> Result<Localizations, FilterError> {
    let col = locs
        .column_index(column)
        .ok_or_else(|| FilterError::UnknownColumn(column.to_string()))?;

    if locs.is_empty() {
        return Ok(locs.clone());
    }

    let n = locs.len() as f64;
    let mean = locs.values().iter().map(|row| row[col]).sum::<f64>() / n;
    let var = locs
        .values()
        .iter()
        .map(|row| (row[col] - mean).powi(2))
        .sum::<f64>()
        / n;
    let threshold = mean + k_sd * var.sqrt();
    info!("Threshold {} on {}", threshold, column);

    let kept = locs.retain_rows(|_, row| row[col] <= threshold);
    info!(
        "Removed {:.2} % points",
        100.0 - kept.len() as f64 / n * 100.0
    );
    Ok(kept)
}
