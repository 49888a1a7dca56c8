//! Data processing modules.

pub mod batch;
pub mod density;
pub mod filtering;
pub mod kdtree;

// Re-export key types for convenience
pub use batch::{
    compute_local_resolution, BatchError, Dataset, LocalResolution, LocalResolutionReport,
};
pub use density::{
    estimate, estimate_with, DensityError, DensityEstimate, DensityParams, LeafStat,
};
pub use filtering::{filter_value_outliers, filter_z_plane, mask_z, slice_roi, FilterError};
pub use kdtree::{NodeId, Partition, PartitionNode};
