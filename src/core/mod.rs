//! Core data types and I/O operations.

pub mod localizations;
pub mod raster;
pub mod writers;

pub use localizations::{LocalizationError, Localizations, PointSource};
pub use raster::{normalize_to_u8, Raster, MAX_SIDE};
pub use writers::{density_image_name, write_density_tiff, WriteError};
