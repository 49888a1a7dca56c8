//! Batch local resolution estimation over (cell, channel) datasets.
//!
//! Every pair is estimated independently and written to its own
//! `{cell}_{channel}_oct_{snr:.2}.tiff`. With `parallel` enabled the pairs
//! are processed on the rayon pool; diagnostics stay attributable because
//! every message carries the pair label.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

use crate::config::{DensityConfig, FailurePolicy};
use crate::core::localizations::PointSource;
use crate::core::raster::Raster;
use crate::core::writers::{density_image_name, write_density_tiff, WriteError};
use crate::diagnostics::Diagnostics;
use super::density::{estimate, DensityError, DensityParams, LeafStat};

/// Cell identifier → channel identifier → localizations.
pub type Dataset<S> = BTreeMap<String, BTreeMap<String, S>>;

/// Errors for a single (cell, channel) pair.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("density estimate failed for {key}: {source}")]
    Density {
        key: String,
        #[source]
        source: DensityError,
    },

    #[error("writing density image failed for {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: WriteError,
    },
}

impl BatchError {
    /// The `cell_channel` key of the failing pair.
    pub fn key(&self) -> &str {
        match self {
            BatchError::Density { key, .. } | BatchError::Write { key, .. } => key,
        }
    }
}

/// Result of one (cell, channel) pair.
#[derive(Debug, Clone)]
pub struct LocalResolution {
    /// Leaf statistics in leaf enumeration order
    pub leaf_stats: Vec<LeafStat>,
    /// Raw (not normalized) density raster
    pub raster: Raster,
    /// Where the normalized image was written
    pub image_path: PathBuf,
}

/// Results of a batch, keyed by `cell_channel`.
#[derive(Debug, Default)]
pub struct LocalResolutionReport {
    pub results: BTreeMap<String, LocalResolution>,
    /// Only populated under [`FailurePolicy::Isolate`]
    pub failures: BTreeMap<String, BatchError>,
}

impl LocalResolutionReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.failures.is_empty()
    }
}

fn pair_key(cell: &str, channel: &str) -> String {
    format!("{}_{}", cell, channel)
}

fn process_pair<S: PointSource>(
    cell: &str,
    channel: &str,
    source: &S,
    params: &DensityParams,
    output_dir: &Path,
    diagnostics: &dyn Diagnostics,
) -> Result<LocalResolution, BatchError> {
    let key = pair_key(cell, channel);
    let points = source.xy();

    let estimate = estimate(&points, &key, params, diagnostics).map_err(|e| BatchError::Density {
        key: key.clone(),
        source: e,
    })?;

    let image_path = output_dir.join(density_image_name(cell, channel, params.leaf_capacity));
    write_density_tiff(&image_path, &estimate.raster).map_err(|e| BatchError::Write {
        key: key.clone(),
        source: e,
    })?;

    diagnostics.info(&format!(
        "{}: {} points, {} leaves -> {}",
        key,
        points.len(),
        estimate.leaf_stats.len(),
        image_path.display()
    ));

    Ok(LocalResolution {
        leaf_stats: estimate.leaf_stats,
        raster: estimate.raster,
        image_path,
    })
}

/// Estimate and export local resolution for every (cell, channel) pair.
///
/// A missing dataset is a no-op. Under [`FailurePolicy::Abort`] the first
/// failing pair (in key order when sequential) ends the batch with its error;
/// under [`FailurePolicy::Isolate`] failures are reported, collected in the
/// returned report, and the remaining pairs still run.
///
/// # Arguments
///
/// * `dataset` - Nested cell → channel → localizations mapping
/// * `config` - Estimator parameters, failure policy and parallelism
/// * `output_dir` - Directory receiving the TIFF images (created if needed)
/// * `diagnostics` - Sink for progress and failure messages
///
/// # Errors
///
/// Returns the failing pair's [`BatchError`] under the abort policy.
pub fn compute_local_resolution<S>(
    dataset: Option<&Dataset<S>>,
    config: &DensityConfig,
    output_dir: &Path,
    diagnostics: &dyn Diagnostics,
) -> Result<LocalResolutionReport, BatchError>
where
    S: PointSource + Sync,
{
    let mut report = LocalResolutionReport::default();
    let Some(dataset) = dataset else {
        diagnostics.debug("No dataset supplied, nothing to do");
        return Ok(report);
    };

    let params = DensityParams::from(config);
    let pairs: Vec<(&str, &str, &S)> = dataset
        .iter()
        .flat_map(|(cell, channels)| {
            channels
                .iter()
                .map(move |(channel, source)| (cell.as_str(), channel.as_str(), source))
        })
        .collect();

    diagnostics.info(&format!(
        "Estimating local resolution for {} pairs (SNR {:.2})",
        pairs.len(),
        config.signal_to_noise()
    ));

    let run = |&(cell, channel, source): &(&str, &str, &S)| {
        (
            pair_key(cell, channel),
            process_pair(cell, channel, source, &params, output_dir, diagnostics),
        )
    };

    match (config.failure_policy, config.parallel) {
        (FailurePolicy::Abort, false) => {
            for pair in &pairs {
                let (key, outcome) = run(pair);
                report.results.insert(key, outcome?);
            }
        }
        (FailurePolicy::Abort, true) => {
            let outcomes: Result<Vec<(String, LocalResolution)>, BatchError> = pairs
                .par_iter()
                .map(run)
                .map(|(key, outcome)| outcome.map(|r| (key, r)))
                .collect();
            report.results.extend(outcomes?);
        }
        (FailurePolicy::Isolate, parallel) => {
            let outcomes: Vec<(String, Result<LocalResolution, BatchError>)> = if parallel {
                pairs.par_iter().map(run).collect()
            } else {
                pairs.iter().map(run).collect()
            };
            for (key, outcome) in outcomes {
                match outcome {
                    Ok(result) => {
                        report.results.insert(key, result);
                    }
                    Err(e) => {
                        diagnostics.error(&e.to_string());
                        report.failures.insert(key, e);
                    }
                }
            }
        }
    }

    Ok(report)
}
