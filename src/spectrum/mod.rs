//! Subband grids and per-subband values

pub mod evaluator;

use std::sync::Arc;

pub use evaluator::SpectrumGainEvaluator;

use crate::error::{MmWaveError, MmWaveResult};

/// Ordered subband centre frequencies (Hz)
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumGrid {
    centers: Vec<f64>,
}

impl SpectrumGrid {
    pub fn new(centers: Vec<f64>) -> MmWaveResult<Self> {
        if centers.is_empty() {
            return Err(MmWaveError::EmptySpectrum);
        }
        Ok(Self { centers })
    }

    /// `num_bands` equal subbands spanning `bandwidth_hz` around `center_hz`
    pub fn uniform(center_hz: f64, bandwidth_hz: f64, num_bands: usize) -> MmWaveResult<Self> {
        let width = bandwidth_hz / num_bands as f64;
        let start = center_hz - bandwidth_hz / 2.0;
        Self::new(
            (0..num_bands)
                .map(|i| start + (i as f64 + 0.5) * width)
                .collect(),
        )
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}

/// Power spectral density (or gain) sampled on a grid
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumValue {
    grid: Arc<SpectrumGrid>,
    values: Vec<f64>,
}

impl SpectrumValue {
    /// Flat spectrum of `value` in every band
    pub fn constant(grid: Arc<SpectrumGrid>, value: f64) -> Self {
        let values = vec![value; grid.len()];
        Self { grid, values }
    }

    pub fn grid(&self) -> &Arc<SpectrumGrid> {
        &self.grid
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Band-wise product with a gain of the same length
    pub fn scaled_by(&self, gain: &[f64]) -> Self {
        Self {
            grid: self.grid.clone(),
            values: self.values.iter().zip(gain).map(|(v, g)| v * g).collect(),
        }
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        self.sum() / self.values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_grid_centres() {
        let grid = SpectrumGrid::uniform(28e9, 100e6, 4).unwrap();
        assert_eq!(grid.len(), 4);
        assert!((grid.centers()[0] - (28e9 - 37.5e6)).abs() < 1e-3);
        assert!((grid.centers()[3] - (28e9 + 37.5e6)).abs() < 1e-3);
    }

    #[test]
    fn test_empty_grid_is_error() {
        assert_eq!(SpectrumGrid::uniform(28e9, 100e6, 0), Err(MmWaveError::EmptySpectrum));
    }

    #[test]
    fn test_scaled_by() {
        let grid = Arc::new(SpectrumGrid::uniform(28e9, 100e6, 3).unwrap());
        let psd = SpectrumValue::constant(grid, 2.0);
        let out = psd.scaled_by(&[1.0, 0.5, 0.0]);
        assert_eq!(out.values(), &[2.0, 1.0, 0.0]);
        assert!((out.mean() - 1.0).abs() < 1e-12);
    }
}
