//! Raster export.
//!
//! Density rasters are written as single-channel 8-bit TIFF images after
//! being rescaled so the densest cell maps to 255.

use std::fs;
use std::path::Path;

use image::{GrayImage, ImageFormat};
use thiserror::Error;

use super::raster::{normalize_to_u8, Raster};
use crate::config::signal_to_noise;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Image encoding or file write failed.
    #[error("failed to write image '{path}': {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// Raster side does not fit in an image dimension.
    #[error("raster side {side} exceeds the maximum image dimension")]
    RasterTooLarge { side: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// File name for the density image of one (cell, channel) pair.
///
/// The pattern is `{cell}_{channel}_oct_{snr:.2}.tiff` with
/// `snr = sqrt(leaf_capacity) / 2`.
pub fn density_image_name(cell: &str, channel: &str, leaf_capacity: usize) -> String {
    format!(
        "{}_{}_oct_{:.2}.tiff",
        cell,
        channel,
        signal_to_noise(leaf_capacity)
    )
}

/// Normalize a raster to 8 bits and write it as a grayscale TIFF.
///
/// Row `px` of the raster becomes image row `px`. Parent directories are
/// created if needed.
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - The raster is too large for an image
/// - Encoding or writing the file fails
pub fn write_density_tiff(path: &Path, raster: &Raster) -> Result<()> {
    ensure_parent_dirs(path)?;

    let side = u32::try_from(raster.side())
        .map_err(|_| WriteError::RasterTooLarge { side: raster.side() })?;
    let pixels = normalize_to_u8(raster);
    let image = GrayImage::from_raw(side, side, pixels)
        .ok_or(WriteError::RasterTooLarge { side: raster.side() })?;

    image
        .save_with_format(path, ImageFormat::Tiff)
        .map_err(|e| WriteError::Image {
            path: path.display().to_string(),
            source: e,
        })?;

    Ok(())
}
