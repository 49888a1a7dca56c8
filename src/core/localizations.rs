//! Localization tables and the point-source boundary.
//!
//! Readers for vendor formats live outside this crate. Anything that can hand
//! over an N×3 coordinate array together with an N×K table of auxiliary
//! measurements implements [`PointSource`] and can be fed to the batch
//! wrapper. [`Localizations`] is the in-memory implementation.

use thiserror::Error;

/// Errors raised when assembling a localization table.
#[derive(Error, Debug)]
pub enum LocalizationError {
    /// Points and values do not describe the same number of localizations.
    #[error("row count mismatch: {points_len} points, {values_len} value rows")]
    LengthMismatch { points_len: usize, values_len: usize },

    /// A value row does not have one entry per column name.
    #[error("value row {row} has {found} entries, expected {expected}")]
    RowWidthMismatch {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// Result type for localization operations.
pub type Result<T> = std::result::Result<T, LocalizationError>;

/// Producer of localization data consumed by the density estimator.
pub trait PointSource {
    /// X, Y, Z coordinates, one row per localization.
    fn points(&self) -> &[[f64; 3]];

    /// Auxiliary measurements, parallel to [`points`](PointSource::points).
    fn values(&self) -> &[Vec<f64>];

    /// Column names of [`values`](PointSource::values).
    fn value_names(&self) -> &[String];

    /// Number of localizations.
    fn len(&self) -> usize {
        self.points().len()
    }

    fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    /// Projection onto the first two coordinates.
    fn xy(&self) -> Vec<[f64; 2]> {
        self.points().iter().map(|p| [p[0], p[1]]).collect()
    }
}

/// In-memory localization table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Localizations {
    points: Vec<[f64; 3]>,
    values: Vec<Vec<f64>>,
    value_names: Vec<String>,
}

impl Localizations {
    /// Creates an empty table with the given value columns.
    pub fn new(value_names: Vec<String>) -> Self {
        Self {
            points: Vec::new(),
            values: Vec::new(),
            value_names,
        }
    }

    /// Builds a table from parallel point and value arrays.
    ///
    /// # Errors
    ///
    /// Returns an error if the row counts differ or a value row does not
    /// match the number of column names.
    pub fn from_parts(
        points: Vec<[f64; 3]>,
        values: Vec<Vec<f64>>,
        value_names: Vec<String>,
    ) -> Result<Self> {
        if points.len() != values.len() {
            return Err(LocalizationError::LengthMismatch {
                points_len: points.len(),
                values_len: values.len(),
            });
        }
        if let Some((row, found)) = values
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|&(_, len)| len != value_names.len())
        {
            return Err(LocalizationError::RowWidthMismatch {
                row,
                found,
                expected: value_names.len(),
            });
        }
        Ok(Self {
            points,
            values,
            value_names,
        })
    }

    /// Builds a table of bare coordinates with no value columns.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        let values = vec![Vec::new(); points.len()];
        Self {
            points,
            values,
            value_names: Vec::new(),
        }
    }

    /// Appends one localization.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` does not have one entry per column.
    pub fn push(&mut self, point: [f64; 3], values: Vec<f64>) -> Result<()> {
        if values.len() != self.value_names.len() {
            return Err(LocalizationError::RowWidthMismatch {
                row: self.points.len(),
                found: values.len(),
                expected: self.value_names.len(),
            });
        }
        self.points.push(point);
        self.values.push(values);
        Ok(())
    }

    /// Index of a value column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.value_names.iter().position(|n| n == name)
    }

    /// Lazily yields `(point, values)` pairs in row order.
    pub fn rows(&self) -> impl Iterator<Item = (&[f64; 3], &[f64])> + '_ {
        self.points
            .iter()
            .zip(self.values.iter().map(Vec::as_slice))
    }

    /// Keeps only the rows for which `keep` returns true.
    pub(crate) fn retain_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&[f64; 3], &[f64]) -> bool,
    {
        let mut points = Vec::with_capacity(self.points.len());
        let mut values = Vec::with_capacity(self.values.len());
        for (point, row) in self.rows() {
            if keep(point, row) {
                points.push(*point);
                values.push(row.to_vec());
            }
        }
        Self {
            points,
            values,
            value_names: self.value_names.clone(),
        }
    }
}

impl PointSource for Localizations {
    fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    fn value_names(&self) -> &[String] {
        &self.value_names
    }
}
