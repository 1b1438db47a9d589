//! Hybrid MMSE beamforming across a slot bundle
//!
//! Each peer keeps its codebook analog beam. Peers that picked the same
//! transmit beam are separated first, then a digital stage suppresses the
//! cross terms between the remaining beams.

use std::collections::BTreeSet;

use rustfft::num_complex::Complex64;
use tracing::{debug, warn};

use super::cholesky::{mmse_solve_matrix, ComplexMatrix};
use super::codebook::{bf_gain_lookup, bf_vector_2d_fft};
use super::BeamformingEngine;
use crate::antenna::{BeamId, BeamformingVector};
use crate::device::Device;
use crate::error::{MmWaveError, MmWaveResult};
use crate::propagation::PathlossModel;
use crate::spectrum::SpectrumGainEvaluator;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Greedy pass over `(tx, rx)` selections in bundle order. A peer whose tx
/// beam is already claimed takes its strongest pair among the unclaimed tx
/// beams of its own equivalent channel.
pub fn resolve_beam_conflicts(
    selections: &mut [(usize, usize)],
    equivalents: &[ComplexMatrix],
) -> MmWaveResult<()> {
    let mut claimed = BTreeSet::new();
    for (peer, (selection, equivalent)) in selections.iter_mut().zip(equivalents).enumerate() {
        if claimed.contains(&selection.0) {
            let fallback =
                bf_gain_lookup(equivalent, &claimed).ok_or(MmWaveError::NoAvailableBeam)?;
            warn!(
                peer,
                from = selection.0,
                to = fallback.0,
                "transmit beam conflict, reassigning"
            );
            *selection = fallback;
        }
        claimed.insert(selection.0);
    }
    Ok(())
}

/// Analog beams and link amplitudes shared by both MMSE variants
struct AnalogStage {
    selections: Vec<(usize, usize)>,
    equivalents: Vec<ComplexMatrix>,
    /// Codebook tx vector per peer
    tx: Vec<BeamformingVector>,
    amplitudes: Vec<f64>,
}

impl BeamformingEngine {
    fn analog_stage(
        &mut self,
        own: &Device,
        peers: &[&Device],
        evaluator: &mut SpectrumGainEvaluator,
        pathloss: &dyn PathlossModel,
    ) -> MmWaveResult<AnalogStage> {
        let mut selections = Vec::with_capacity(peers.len());
        let mut equivalents = Vec::with_capacity(peers.len());
        for peer in peers {
            let entry = self.codebook_entry(own, peer, evaluator)?;
            selections.push(entry.beam_pair()?);
            equivalents.push(entry.equivalent()?.clone());
        }
        resolve_beam_conflicts(&mut selections, &equivalents)?;

        let tx_dims = own.antenna.dims();
        let tx = selections
            .iter()
            .map(|&(t, r)| {
                BeamformingVector::new(bf_vector_2d_fft(t, tx_dims), BeamId::codebook(t, r))
            })
            .collect();
        let amplitudes = peers
            .iter()
            .map(|peer| {
                pathloss.amplitude(self.reference_power_dbm, &own.endpoint, &peer.endpoint)
            })
            .collect();

        Ok(AnalogStage {
            selections,
            equivalents,
            tx,
            amplitudes,
        })
    }

    /// One hybrid vector per peer; digital combining is switched off
    pub(super) fn mmse_flat(
        &mut self,
        own: &mut Device,
        peers: &[&Device],
        layers: &[u8],
        evaluator: &mut SpectrumGainEvaluator,
        pathloss: &dyn PathlossModel,
    ) -> MmWaveResult<()> {
        if peers.is_empty() {
            return Ok(());
        }
        let stage = self.analog_stage(own, peers, evaluator, pathloss)?;
        let nt = own.antenna.element_count() as f64;

        // Heq[i][j] = amp_i * b_i^T H_i a_j, read off peer i's equivalent channel
        let heq: ComplexMatrix = peers
            .iter()
            .enumerate()
            .map(|(i, peer)| {
                let rx = stage.selections[i].1;
                let nr = peer.antenna.element_count() as f64;
                let scale = stage.amplitudes[i] / (nr * nt).sqrt();
                stage
                    .selections
                    .iter()
                    .map(|&(tx, _)| stage.equivalents[i][rx][tx] * scale)
                    .collect()
            })
            .collect();
        let precoder = mmse_solve_matrix(&heq, self.noise_power)?;

        let now = self.clock.now();
        for (k, peer) in peers.iter().enumerate() {
            let weights = hybrid_weights(&stage.tx, &precoder, k);
            let id = BeamId::hybrid(stage.selections[k].0, layers[k]);
            let vector = BeamformingVector::new(weights, id);
            own.antenna
                .set_beamforming_vector(peer.id(), layers[k], vector, now);
        }
        own.antenna.clear_digital_combining();
        debug!(peers = peers.len(), "flat MMSE bundle configured");
        Ok(())
    }

    /// Analog beams on the bundle layers plus a per-subband combining matrix
    pub(super) fn mmse_spectrum(
        &mut self,
        own: &mut Device,
        peers: &[&Device],
        layers: &[u8],
        evaluator: &mut SpectrumGainEvaluator,
        pathloss: &dyn PathlossModel,
    ) -> MmWaveResult<()> {
        if peers.is_empty() {
            return Ok(());
        }
        let stage = self.analog_stage(own, peers, evaluator, pathloss)?;

        let now = self.clock.now();
        for ((peer, layer), analog) in peers.iter().zip(layers).zip(&stage.tx) {
            own.antenna
                .set_beamforming_vector(peer.id(), *layer, analog.clone(), now);
        }

        let bands = self.grid.len();
        let n = peers.len();
        let mut heq = vec![vec![vec![ZERO; n]; n]; bands];
        for (i, peer) in peers.iter().enumerate() {
            let (tx_i, rx_i) = stage.selections[i];
            let rx_w = BeamformingVector::new(
                bf_vector_2d_fft(rx_i, peer.antenna.dims()),
                BeamId::codebook(rx_i, tx_i),
            );
            for (j, tx_w) in stage.tx.iter().enumerate() {
                let spectrum =
                    evaluator.compute_rx_complex_spectrum(&self.grid, own, peer, tx_w, &rx_w)?;
                for (band, value) in spectrum.into_iter().enumerate() {
                    heq[band][i][j] = value * stage.amplitudes[i];
                }
            }
        }

        let size = layers.iter().max().map_or(0, |l| usize::from(*l) + 1);
        let mut combining = vec![vec![vec![ZERO; size]; size]; bands];
        for (band, heq_band) in heq.iter().enumerate() {
            let x = mmse_solve_matrix(heq_band, self.noise_power)?;
            for (k, out_layer) in layers.iter().enumerate() {
                let row = &mut combining[band][usize::from(*out_layer)];
                for (j, in_layer) in layers.iter().enumerate() {
                    row[usize::from(*in_layer)] = x[j][k];
                }
                normalize(row);
            }
        }

        own.antenna.set_digital_combining(combining);
        debug!(peers = n, bands, "frequency-selective MMSE bundle configured");
        Ok(())
    }
}

/// Unit-norm `sum_j analog[j] * precoder[j][k]`
fn hybrid_weights(
    analog: &[BeamformingVector],
    precoder: &[Vec<Complex64>],
    k: usize,
) -> Vec<Complex64> {
    let len = analog.first().map_or(0, |a| a.len());
    let mut weights = vec![ZERO; len];
    for (j, a) in analog.iter().enumerate() {
        for (w, x) in weights.iter_mut().zip(&a.weights) {
            *w += x * precoder[j][k];
        }
    }
    normalize(&mut weights);
    weights
}

fn normalize(weights: &mut [Complex64]) {
    let norm = weights.iter().map(|w| w.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in weights.iter_mut() {
            *w /= norm;
        }
    }
}
