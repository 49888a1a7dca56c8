//! Square accumulation grid for leaf densities.

use rayon::prelude::*;

/// Largest raster side the estimator will allocate.
///
/// A `MAX_SIDE × MAX_SIDE` grid of `f32` is 1 GiB, and the side still fits
/// a TIFF dimension.
pub const MAX_SIDE: usize = 16_384;

/// Square `side × side` grid of accumulated densities.
///
/// Cell `(px, py)` is stored row-major with `px` selecting the row, so an
/// exported image shows the x pixel coordinate along its vertical axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    side: usize,
    data: Vec<f32>,
}

impl Raster {
    /// Zero-filled raster.
    pub fn zeros(side: usize) -> Self {
        Self {
            side,
            data: vec![0.0; side * side],
        }
    }

    /// Side length in pixels.
    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Raw cell values, row-major.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, px: usize, py: usize) -> Option<f32> {
        self.index(px, py).map(|i| self.data[i])
    }

    /// Adds `value` to cell `(px, py)` and returns the new cell value, or
    /// `None` if the cell lies outside the grid.
    #[inline]
    pub fn accumulate(&mut self, px: usize, py: usize, value: f32) -> Option<f32> {
        let i = self.index(px, py)?;
        self.data[i] += value;
        Some(self.data[i])
    }

    /// Largest cell value, `0.0` for an empty raster.
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0f32, f32::max)
    }

    /// Coordinates and values of all nonzero cells, in storage order.
    pub fn nonzero(&self) -> Vec<((usize, usize), f32)> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, &v)| ((i / self.side, i % self.side), v))
            .collect()
    }

    #[inline]
    fn index(&self, px: usize, py: usize) -> Option<usize> {
        if px < self.side && py < self.side {
            Some(px * self.side + py)
        } else {
            None
        }
    }
}

/// Linearly rescale a raster so its maximum maps to 255.
///
/// Each output value is `round(v / max * 255)`. A raster whose maximum is
/// zero produces an all-zero buffer.
pub fn normalize_to_u8(raster: &Raster) -> Vec<u8> {
    let max = raster.max();
    if max <= 0.0 || !max.is_finite() {
        return vec![0; raster.as_slice().len()];
    }

    let scale = 255.0 / f64::from(max);
    raster
        .as_slice()
        .par_iter()
        .map(|&v| (f64::from(v) * scale).round().clamp(0.0, 255.0) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_is_additive() {
        let mut raster = Raster::zeros(4);
        assert_eq!(raster.accumulate(1, 2, 0.5), Some(0.5));
        assert_eq!(raster.accumulate(1, 2, 0.25), Some(0.75));
        assert_eq!(raster.get(1, 2), Some(0.75));
        assert_eq!(raster.get(2, 1), Some(0.0));
        assert_eq!(raster.nonzero(), vec![((1, 2), 0.75)]);
    }

    #[test]
    fn test_out_of_grid_cells_are_rejected() {
        let mut raster = Raster::zeros(3);
        assert_eq!(raster.accumulate(3, 0, 1.0), None);
        assert_eq!(raster.get(0, 3), None);
        assert_eq!(raster.max(), 0.0);
    }

    #[test]
    fn test_normalize_rounds_against_maximum() {
        let mut raster = Raster::zeros(2);
        raster.accumulate(0, 0, 4.0);
        raster.accumulate(0, 1, 1.0);
        raster.accumulate(1, 1, 2.0);

        let pixels = normalize_to_u8(&raster);

        // 1/4 * 255 = 63.75, 2/4 * 255 = 127.5
        assert_eq!(pixels, vec![255, 64, 0, 128]);
    }

    #[test]
    fn test_normalize_all_zero_raster() {
        let raster = Raster::zeros(5);
        let pixels = normalize_to_u8(&raster);
        assert_eq!(pixels.len(), 25);
        assert!(pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_normalize_empty_raster() {
        assert!(normalize_to_u8(&Raster::zeros(0)).is_empty());
    }
}
