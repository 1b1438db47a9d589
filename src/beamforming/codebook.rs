//! FFT codebook search
//!
//! Codebook beam `t` of a `d1 x d2` panel is the normalized 2D inverse-DFT
//! vector with frequency index `(t % d1, t / d1)`. Projecting the element
//! channel onto every (rx beam, tx beam) pair is then a separable inverse
//! FFT along the four array axes.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use super::cholesky::ComplexMatrix;
use crate::error::{MmWaveError, MmWaveResult};

/// Equivalent channel `G[r][t] = sqrt(Nr Nt) * b_r^T H a_t` for the element
/// channel `h[rx element][tx element]`.
pub fn channel_4d_fft(
    h: &[Vec<Complex64>],
    rx_dims: [usize; 2],
    tx_dims: [usize; 2],
) -> MmWaveResult<ComplexMatrix> {
    let nr = rx_dims[0] * rx_dims[1];
    let nt = tx_dims[0] * tx_dims[1];
    let actual_tx = h.first().map_or(0, |row| row.len());
    if h.len() != nr || actual_tx != nt {
        return Err(MmWaveError::AntennaDimensionMismatch {
            expected_rx: nr,
            expected_tx: nt,
            actual_rx: h.len(),
            actual_tx,
        });
    }

    // Flattened as data[u * nt + s]
    let mut data: Vec<Complex64> = h.iter().flatten().copied().collect();
    let mut planner = FftPlanner::new();
    inverse_fft_along(&mut data, &mut planner, tx_dims[0], 1);
    inverse_fft_along(&mut data, &mut planner, tx_dims[1], tx_dims[0]);
    inverse_fft_along(&mut data, &mut planner, rx_dims[0], nt);
    inverse_fft_along(&mut data, &mut planner, rx_dims[1], nt * rx_dims[0]);

    Ok(data.chunks(nt).map(|row| row.to_vec()).collect())
}

/// In-place unnormalized inverse FFT of every line of length `len` whose
/// consecutive samples sit `stride` apart.
fn inverse_fft_along(
    data: &mut [Complex64],
    planner: &mut FftPlanner<f64>,
    len: usize,
    stride: usize,
) {
    if len <= 1 {
        return;
    }
    let fft = planner.plan_fft_inverse(len);
    let mut line = vec![Complex64::new(0.0, 0.0); len];

    for start in 0..data.len() {
        if (start / stride) % len != 0 {
            continue;
        }
        for (k, sample) in line.iter_mut().enumerate() {
            *sample = data[start + k * stride];
        }
        fft.process(&mut line);
        for (k, sample) in line.iter().enumerate() {
            data[start + k * stride] = *sample;
        }
    }
}

/// Strongest `(tx, rx)` pair of the equivalent channel, skipping blocked tx
/// indices. `None` when every tx index is blocked.
pub fn bf_gain_lookup(
    equivalent: &[Vec<Complex64>],
    blocked_tx: &BTreeSet<usize>,
) -> Option<(usize, usize)> {
    let mut best: Option<((usize, usize), f64)> = None;
    for (rx, row) in equivalent.iter().enumerate() {
        for (tx, g) in row.iter().enumerate() {
            if blocked_tx.contains(&tx) {
                continue;
            }
            let power = g.norm_sqr();
            if best.map_or(true, |(_, p)| power > p) {
                best = Some(((tx, rx), power));
            }
        }
    }
    best.map(|(pair, _)| pair)
}

/// Unit-norm codebook vector for beam `index` of a `dims[0] x dims[1]` panel
pub fn bf_vector_2d_fft(index: usize, dims: [usize; 2]) -> Vec<Complex64> {
    let [d1, d2] = dims;
    let (k1, k2) = (index % d1, index / d1);
    let scale = 1.0 / ((d1 * d2) as f64).sqrt();

    (0..d1 * d2)
        .map(|i| {
            let (i1, i2) = (i % d1, i / d1);
            let phase =
                2.0 * PI * ((k1 * i1) as f64 / d1 as f64 + (k2 * i2) as f64 / d2 as f64);
            Complex64::from_polar(scale, phase)
        })
        .collect()
}
