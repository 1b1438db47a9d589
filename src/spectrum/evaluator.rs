//! Beamformed channel gain per subband
//!
//! The channel tensor is first projected onto the tx and rx weight vectors,
//! giving one "long-term" coefficient per cluster. That projection only
//! changes when the realization or a weight vector does, so it is cached
//! under (a beam, link, b beam). Per call, each cluster is rotated by its
//! Doppler and delay phase and the clusters are summed per subband.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use tracing::debug;

use super::{SpectrumGrid, SpectrumValue};
use crate::antenna::{BeamId, BeamformingVector, CombiningMatrix};
use crate::channel::{ChannelGenerator, ChannelLink, ChannelMatrix};
use crate::clock::SharedClock;
use crate::device::Device;
use crate::error::{MmWaveError, MmWaveResult};
use crate::geometry::{Vector3, SPEED_OF_LIGHT};
use crate::pairing;
use crate::propagation::ChannelConditionModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LongTermKey {
    a_beam: BeamId,
    link: u128,
    b_beam: BeamId,
}

struct LongTermEntry {
    coefficients: Vec<Complex64>,
    matrix: Arc<ChannelMatrix>,
    a_weights: Vec<Complex64>,
    b_weights: Vec<Complex64>,
}

pub struct SpectrumGainEvaluator {
    generator: ChannelGenerator,
    condition_model: Box<dyn ChannelConditionModel>,
    clock: SharedClock,
    long_term: HashMap<LongTermKey, LongTermEntry>,
}

impl SpectrumGainEvaluator {
    pub fn new(
        generator: ChannelGenerator,
        condition_model: Box<dyn ChannelConditionModel>,
        clock: SharedClock,
    ) -> Self {
        Self {
            generator,
            condition_model,
            clock,
            long_term: HashMap::new(),
        }
    }

    pub fn generator(&self) -> &ChannelGenerator {
        &self.generator
    }

    pub fn set_condition_model(&mut self, model: Box<dyn ChannelConditionModel>) {
        self.condition_model = model;
    }

    /// Number of cached long-term projections
    pub fn long_term_entries(&self) -> usize {
        self.long_term.len()
    }

    /// Channel from `a` to `b` under the current propagation condition
    pub fn channel(&mut self, a: &Device, b: &Device) -> MmWaveResult<ChannelLink> {
        if a.position() == b.position() {
            return Err(MmWaveError::CoincidentEndpoints { a: a.id(), b: b.id() });
        }
        let condition = self.condition_model.condition(&a.endpoint, &b.endpoint);
        self.generator
            .get_channel(&a.endpoint, &b.endpoint, &a.antenna, &b.antenna, condition)
    }

    /// Received PSD for `a` transmitting on `tx_layer` to `b` receiving on
    /// `rx_layer`. Omni arrays pass the input through untouched.
    pub fn compute_received_spectrum(
        &mut self,
        tx_psd: &SpectrumValue,
        a: &Device,
        b: &Device,
        tx_layer: u8,
        rx_layer: u8,
    ) -> MmWaveResult<SpectrumValue> {
        if a.antenna.is_omni() || b.antenna.is_omni() {
            debug!("omni transmission, spectrum passed through");
            return Ok(tx_psd.clone());
        }

        let link = self.channel(a, b)?;
        let grid = tx_psd.grid().clone();

        let gain = match (a.antenna.digital_combining(), b.antenna.digital_combining()) {
            (Some(_), Some(_)) => return Err(MmWaveError::DigitalCombiningAtBothEnds),
            (Some(combining), None) => {
                let rx_w = b.antenna.current_beamforming_vector(rx_layer)?;
                self.combined_gain(&link, a, b, combining, tx_layer, &grid, |layer| {
                    Ok((a.antenna.current_beamforming_vector(layer)?, rx_w))
                })?
            }
            (None, Some(combining)) => {
                let tx_w = a.antenna.current_beamforming_vector(tx_layer)?;
                self.combined_gain(&link, a, b, combining, rx_layer, &grid, |layer| {
                    Ok((tx_w, b.antenna.current_beamforming_vector(layer)?))
                })?
            }
            (None, None) => {
                let tx_w = a.antenna.current_beamforming_vector(tx_layer)?;
                let rx_w = b.antenna.current_beamforming_vector(rx_layer)?;
                self.complex_coefficients(&link, a, b, tx_w, rx_w, &grid)?
                    .iter()
                    .map(|c| c.norm_sqr())
                    .collect()
            }
        };

        Ok(tx_psd.scaled_by(&gain))
    }

    /// Power gain of output `layer` of a digital combiner.
    ///
    /// `vectors(input)` yields the (tx, rx) weights seen by input layer
    /// `input`. Inputs with zero weight in every band are skipped and an
    /// output beyond the combiner's size radiates nothing.
    fn combined_gain<'d, F>(
        &mut self,
        link: &ChannelLink,
        a: &Device,
        b: &Device,
        combining: &CombiningMatrix,
        layer: u8,
        grid: &SpectrumGrid,
        vectors: F,
    ) -> MmWaveResult<Vec<f64>>
    where
        F: Fn(u8) -> MmWaveResult<(&'d BeamformingVector, &'d BeamformingVector)>,
    {
        let out = usize::from(layer);
        let size = combining.first().map_or(0, |m| m.len());
        if out >= size {
            return Ok(vec![0.0; grid.len()]);
        }

        let zero = Complex64::new(0.0, 0.0);
        let mut spectrum = vec![zero; grid.len()];
        for input in 0..size {
            if combining.iter().all(|band| band[out][input] == zero) {
                continue;
            }
            let (tx_w, rx_w) = vectors(input as u8)?;
            let coef = self.complex_coefficients(link, a, b, tx_w, rx_w, grid)?;
            for ((value, band), c) in spectrum.iter_mut().zip(combining).zip(&coef) {
                *value += band[out][input] * c;
            }
        }
        Ok(spectrum.iter().map(|c| c.norm_sqr()).collect())
    }

    /// Complex gain per subband for explicit weight vectors
    pub fn compute_rx_complex_spectrum(
        &mut self,
        grid: &SpectrumGrid,
        a: &Device,
        b: &Device,
        tx_w: &BeamformingVector,
        rx_w: &BeamformingVector,
    ) -> MmWaveResult<Vec<Complex64>> {
        if a.antenna.is_omni() || b.antenna.is_omni() {
            return Err(MmWaveError::OmniArray);
        }
        let link = self.channel(a, b)?;
        self.complex_coefficients(&link, a, b, tx_w, rx_w, grid)
    }

    /// Element-space channel `H[rx][tx]` of `b` receiving from `a`, summed
    /// over clusters at `fc + delta_hz`.
    pub fn frequency_flat_channel_matrix(
        &mut self,
        a: &Device,
        b: &Device,
        delta_hz: f64,
    ) -> MmWaveResult<Vec<Vec<Complex64>>> {
        let link = self.channel(a, b)?;
        let num_rx = b.antenna.element_count();
        let num_tx = a.antenna.element_count();
        link.check_dimensions(num_rx, num_tx)?;

        let frequency = self.generator.frequency() + delta_hz;
        let rotation: Vec<Complex64> = self
            .doppler(&link, a, b)
            .into_iter()
            .zip(&link.matrix.delays)
            .map(|(doppler, tau)| doppler * Complex64::from_polar(1.0, -2.0 * PI * frequency * tau))
            .collect();

        Ok((0..num_rx)
            .map(|r| {
                (0..num_tx)
                    .map(|t| {
                        rotation
                            .iter()
                            .enumerate()
                            .map(|(c, rot)| link.coefficient(r, t, c) * rot)
                            .sum::<Complex64>()
                    })
                    .collect()
            })
            .collect())
    }

    fn complex_coefficients(
        &mut self,
        link: &ChannelLink,
        a: &Device,
        b: &Device,
        a_w: &BeamformingVector,
        b_w: &BeamformingVector,
        grid: &SpectrumGrid,
    ) -> MmWaveResult<Vec<Complex64>> {
        let long_term = self.long_term(link, a, b, a_w, b_w)?;
        let doppler = self.doppler(link, a, b);
        let delays = &link.matrix.delays;

        Ok(grid
            .centers()
            .iter()
            .map(|fsb| {
                long_term
                    .iter()
                    .zip(&doppler)
                    .zip(delays)
                    .map(|((lt, dop), tau)| {
                        lt * dop * Complex64::from_polar(1.0, -2.0 * PI * fsb * tau)
                    })
                    .sum::<Complex64>()
            })
            .collect())
    }

    /// Per-cluster Doppler rotation at the current time, using only the
    /// cluster centre angles.
    fn doppler(&self, link: &ChannelLink, a: &Device, b: &Device) -> Vec<Complex64> {
        let matrix = &link.matrix;
        // Arrival angles belong to the realization's receiver
        let (rx_velocity, tx_velocity) = if link.reverse {
            (a.velocity(), b.velocity())
        } else {
            (b.velocity(), a.velocity())
        };
        let t = self.clock.now().as_secs_f64();
        let fc = self.generator.frequency();

        (0..matrix.num_clusters())
            .map(|c| {
                let arrival = Vector3::direction(
                    matrix.angles.zoa[c].to_radians(),
                    matrix.angles.aoa[c].to_radians(),
                );
                let departure = Vector3::direction(
                    matrix.angles.zod[c].to_radians(),
                    matrix.angles.aod[c].to_radians(),
                );
                let phase = 2.0
                    * PI
                    * (arrival.dot(&rx_velocity) + departure.dot(&tx_velocity))
                    * t
                    * fc
                    / SPEED_OF_LIGHT;
                Complex64::from_polar(1.0, phase)
            })
            .collect()
    }

    fn long_term(
        &mut self,
        link: &ChannelLink,
        a: &Device,
        b: &Device,
        a_w: &BeamformingVector,
        b_w: &BeamformingVector,
    ) -> MmWaveResult<Vec<Complex64>> {
        let key = LongTermKey {
            a_beam: a_w.id,
            link: pairing::unordered_key(a.id().as_key(), b.id().as_key()),
            b_beam: b_w.id,
        };

        if let Some(entry) = self.long_term.get(&key) {
            let fresh = Arc::ptr_eq(&entry.matrix, &link.matrix)
                && entry.a_weights == a_w.weights
                && entry.b_weights == b_w.weights;
            if fresh {
                return Ok(entry.coefficients.clone());
            }
            debug!(link = key.link, "long term stale, recomputing");
        } else {
            debug!(link = key.link, "long term not found");
        }

        let coefficients = project(link, &a_w.weights, &b_w.weights)?;
        self.long_term.insert(
            key,
            LongTermEntry {
                coefficients: coefficients.clone(),
                matrix: link.matrix.clone(),
                a_weights: a_w.weights.clone(),
                b_weights: b_w.weights.clone(),
            },
        );
        Ok(coefficients)
    }
}

/// `sum_t txW[t] * sum_r rxW[r] * H[r][t][c]` per cluster, weights swapped
/// on a reverse link so the tensor is never transposed.
fn project(
    link: &ChannelLink,
    a_weights: &[Complex64],
    b_weights: &[Complex64],
) -> MmWaveResult<Vec<Complex64>> {
    let (tx_w, rx_w) = if link.reverse {
        (b_weights, a_weights)
    } else {
        (a_weights, b_weights)
    };
    let matrix = &link.matrix;
    matrix.check_dimensions(rx_w.len(), tx_w.len())?;

    Ok((0..matrix.num_clusters())
        .map(|c| {
            tx_w.iter()
                .enumerate()
                .map(|(t, wt)| {
                    let rx_sum: Complex64 = rx_w
                        .iter()
                        .enumerate()
                        .map(|(r, wr)| wr * matrix.coefficients[r][t][c])
                        .sum();
                    wt * rx_sum
                })
                .sum::<Complex64>()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::AntennaArray;
    use crate::clock::ManualClock;
    use crate::config::ChannelConfig;
    use crate::device::{Endpoint, NodeId};
    use crate::propagation::{ChannelCondition, FixedCondition};

    fn make_evaluator() -> (SpectrumGainEvaluator, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        let generator = ChannelGenerator::new(&ChannelConfig::default(), clock.clone()).unwrap();
        let evaluator = SpectrumGainEvaluator::new(
            generator,
            Box::new(FixedCondition(ChannelCondition::LOS)),
            clock.clone(),
        );
        (evaluator, clock)
    }

    fn make_device(id: u32, position: Vector3) -> Device {
        Device::new(Endpoint::new(NodeId(id), position), AntennaArray::new(2, 2))
    }

    fn make_vector(n: usize, id: u128, phase_step: f64) -> BeamformingVector {
        let scale = 1.0 / (n as f64).sqrt();
        BeamformingVector::new(
            (0..n)
                .map(|i| Complex64::from_polar(scale, phase_step * i as f64))
                .collect(),
            BeamId(id),
        )
    }

    fn make_pair() -> (Device, Device) {
        let mut a = make_device(1, Vector3::new(0.0, 0.0, 10.0));
        let mut b = make_device(2, Vector3::new(40.0, 10.0, 1.5));
        a.antenna
            .set_beamforming_vector(b.id(), 0, make_vector(4, 11, 0.3), Default::default());
        b.antenna
            .set_beamforming_vector(a.id(), 0, make_vector(4, 22, -0.7), Default::default());
        (a, b)
    }

    fn make_psd() -> SpectrumValue {
        let grid = Arc::new(SpectrumGrid::uniform(28e9, 100e6, 8).unwrap());
        SpectrumValue::constant(grid, 1.0)
    }

    // ========================================================================
    // RECEIVED SPECTRUM
    // ========================================================================

    #[test]
    fn test_omni_passthrough() {
        let (mut evaluator, _) = make_evaluator();
        let (mut a, b) = make_pair();
        a.antenna.change_to_omni();
        let psd = make_psd();
        let out = evaluator.compute_received_spectrum(&psd, &a, &b, 0, 0).unwrap();
        assert_eq!(out, psd);
        assert_eq!(evaluator.generator().cached_links(), 0);
    }

    #[test]
    fn test_power_gain_matches_complex_spectrum() {
        let (mut evaluator, _) = make_evaluator();
        let (a, b) = make_pair();
        let psd = make_psd();

        let power = evaluator.compute_received_spectrum(&psd, &a, &b, 0, 0).unwrap();
        let tx_w = a.antenna.current_beamforming_vector(0).unwrap().clone();
        let rx_w = b.antenna.current_beamforming_vector(0).unwrap().clone();
        let complex = evaluator
            .compute_rx_complex_spectrum(psd.grid(), &a, &b, &tx_w, &rx_w)
            .unwrap();

        for (p, c) in power.values().iter().zip(&complex) {
            assert!((p - c.norm_sqr()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_doppler_rotates_with_time() {
        let (mut evaluator, clock) = make_evaluator();
        let (a, b) = make_pair();
        let moving = Device::new(
            b.endpoint.with_velocity(Vector3::new(10.0, -5.0, 0.0)),
            b.antenna.clone(),
        );
        let grid = make_psd().grid().clone();
        let tx_w = a.antenna.current_beamforming_vector(0).unwrap().clone();
        let rx_w = b.antenna.current_beamforming_vector(0).unwrap().clone();

        // No rotation at t = 0
        let still = evaluator
            .compute_rx_complex_spectrum(&grid, &a, &b, &tx_w, &rx_w)
            .unwrap();
        let fast = evaluator
            .compute_rx_complex_spectrum(&grid, &a, &moving, &tx_w, &rx_w)
            .unwrap();
        assert_eq!(still, fast);

        clock.set(std::time::Duration::from_micros(500));
        let still = evaluator
            .compute_rx_complex_spectrum(&grid, &a, &b, &tx_w, &rx_w)
            .unwrap();
        let fast = evaluator
            .compute_rx_complex_spectrum(&grid, &a, &moving, &tx_w, &rx_w)
            .unwrap();
        assert!((still[0] - fast[0]).norm() > 1e-12);
    }

    #[test]
    fn test_coincident_positions_rejected() {
        let (mut evaluator, _) = make_evaluator();
        let (a, mut b) = make_pair();
        b.endpoint.position = a.position();
        let result = evaluator.compute_received_spectrum(&make_psd(), &a, &b, 0, 0);
        assert!(matches!(result, Err(MmWaveError::CoincidentEndpoints { .. })));
    }

    #[test]
    fn test_complex_spectrum_requires_directional() {
        let (mut evaluator, _) = make_evaluator();
        let (a, mut b) = make_pair();
        b.antenna.change_to_omni();
        let w = make_vector(4, 1, 0.0);
        let result = evaluator.compute_rx_complex_spectrum(make_psd().grid(), &a, &b, &w, &w);
        assert_eq!(result.unwrap_err(), MmWaveError::OmniArray);
    }

    #[test]
    fn test_missing_layer_is_error() {
        let (mut evaluator, _) = make_evaluator();
        let (a, b) = make_pair();
        let result = evaluator.compute_received_spectrum(&make_psd(), &a, &b, 3, 0);
        assert_eq!(
            result.unwrap_err(),
            MmWaveError::MissingBeamformingVector { layer: 3 }
        );
    }

    // ========================================================================
    // DIGITAL COMBINING
    // ========================================================================

    #[test]
    fn test_combining_at_both_ends_is_error() {
        let (mut evaluator, _) = make_evaluator();
        let (mut a, mut b) = make_pair();
        let identity = vec![vec![vec![Complex64::new(1.0, 0.0)]]; 8];
        a.antenna.set_digital_combining(identity.clone());
        b.antenna.set_digital_combining(identity);
        let result = evaluator.compute_received_spectrum(&make_psd(), &a, &b, 0, 0);
        assert_eq!(result.unwrap_err(), MmWaveError::DigitalCombiningAtBothEnds);
    }

    #[test]
    fn test_identity_combining_matches_plain_gain() {
        let (mut evaluator, _) = make_evaluator();
        let (mut a, b) = make_pair();
        let psd = make_psd();
        let plain = evaluator.compute_received_spectrum(&psd, &a, &b, 0, 0).unwrap();

        a.antenna
            .set_digital_combining(vec![vec![vec![Complex64::new(1.0, 0.0)]]; 8]);
        let combined = evaluator.compute_received_spectrum(&psd, &a, &b, 0, 0).unwrap();
        for (p, c) in plain.values().iter().zip(combined.values()) {
            assert!((p - c).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_weight_inputs_skipped() {
        let (mut evaluator, _) = make_evaluator();
        let (mut a, b) = make_pair();
        let psd = make_psd();
        let plain = evaluator.compute_received_spectrum(&psd, &a, &b, 0, 0).unwrap();

        // Output layer 1 routes input layer 0 only; layer 1 has no vector
        let zero = Complex64::new(0.0, 0.0);
        let one = Complex64::new(1.0, 0.0);
        a.antenna
            .set_digital_combining(vec![vec![vec![zero, zero], vec![one, zero]]; 8]);
        let routed = evaluator.compute_received_spectrum(&psd, &a, &b, 1, 0).unwrap();
        for (p, r) in plain.values().iter().zip(routed.values()) {
            assert!((p - r).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unallocated_layer_gives_zero() {
        let (mut evaluator, _) = make_evaluator();
        let (a, mut b) = make_pair();
        b.antenna
            .set_digital_combining(vec![vec![vec![Complex64::new(1.0, 0.0)]]; 8]);
        let out = evaluator
            .compute_received_spectrum(&make_psd(), &a, &b, 0, 2)
            .unwrap();
        assert!(out.values().iter().all(|v| *v == 0.0));
    }

    // ========================================================================
    // LONG-TERM CACHE
    // ========================================================================

    #[test]
    fn test_long_term_cached_per_beam_pair() {
        let (mut evaluator, _) = make_evaluator();
        let (a, mut b) = make_pair();
        let psd = make_psd();

        evaluator.compute_received_spectrum(&psd, &a, &b, 0, 0).unwrap();
        evaluator.compute_received_spectrum(&psd, &a, &b, 0, 0).unwrap();
        assert_eq!(evaluator.long_term_entries(), 1);

        b.antenna
            .set_beamforming_vector(a.id(), 1, make_vector(4, 33, 1.1), Default::default());
        evaluator.compute_received_spectrum(&psd, &a, &b, 0, 1).unwrap();
        assert_eq!(evaluator.long_term_entries(), 2);
    }

    #[test]
    fn test_reverse_direction_reuses_channel() {
        let (mut evaluator, _) = make_evaluator();
        let (a, b) = make_pair();
        let psd = make_psd();

        let forward = evaluator.compute_received_spectrum(&psd, &a, &b, 0, 0).unwrap();
        let backward = evaluator.compute_received_spectrum(&psd, &b, &a, 0, 0).unwrap();
        assert_eq!(evaluator.generator().cached_links(), 1);
        // static endpoints: w_b^T H w_a is the same scalar either way
        for (f, r) in forward.values().iter().zip(backward.values()) {
            assert!((f - r).abs() < 1e-9 * f.max(1e-30));
        }
    }

    // ========================================================================
    // FREQUENCY-FLAT MATRIX
    // ========================================================================

    #[test]
    fn test_flat_matrix_shape_and_reverse_transpose() {
        let (mut evaluator, _) = make_evaluator();
        let (a, mut b) = make_pair();
        b.antenna = AntennaArray::new(4, 2);

        let forward = evaluator.frequency_flat_channel_matrix(&a, &b, 0.0).unwrap();
        assert_eq!(forward.len(), 8);
        assert_eq!(forward[0].len(), 4);

        let backward = evaluator.frequency_flat_channel_matrix(&b, &a, 0.0).unwrap();
        assert_eq!(backward.len(), 4);
        assert_eq!(backward[0].len(), 8);
        for r in 0..8 {
            for t in 0..4 {
                assert!((forward[r][t] - backward[t][r]).norm() < 1e-12);
            }
        }
    }
}
