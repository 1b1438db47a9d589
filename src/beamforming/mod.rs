//! Beam selection for one device
//!
//! Every device owns a [`BeamformingEngine`] configured with one
//! [`Strategy`]. The engine caches the last beam it chose per directed
//! (own, peer) key and writes selected vectors into the device's antenna
//! array:
//!
//! - `Dft`: geometric steering, refreshed when either endpoint moves
//! - `Codebook`: FFT codebook search on the frequency-flat channel,
//!   refreshed after a fixed lifetime
//! - `Mmse`: codebook analog beams plus a flat MMSE digital stage across a
//!   slot bundle
//! - `MmseSpectrum`: as `Mmse` with a per-subband digital combining matrix

pub mod cholesky;
pub mod codebook;
pub mod dft;
mod mmse;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

pub use cholesky::{
    back_substitution, cholesky, forward_substitution, mmse_cholesky, mmse_solve,
    mmse_solve_matrix, ComplexMatrix,
};
pub use codebook::{bf_gain_lookup, bf_vector_2d_fft, channel_4d_fft};
pub use mmse::resolve_beam_conflicts;

use crate::antenna::{BeamId, BeamformingVector};
use crate::clock::SharedClock;
use crate::config::BeamformingConfig;
use crate::device::{Device, NodeId};
use crate::error::{MmWaveError, MmWaveResult};
use crate::geometry::Vector3;
use crate::pairing;
use crate::propagation::PathlossModel;
use crate::spectrum::{SpectrumGainEvaluator, SpectrumGrid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Dft,
    Codebook,
    Mmse,
    MmseSpectrum,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Dft => "dft",
            Strategy::Codebook => "codebook",
            Strategy::Mmse => "mmse",
            Strategy::MmseSpectrum => "mmse_spectrum",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = MmWaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dft" => Ok(Strategy::Dft),
            "codebook" | "fft_codebook" => Ok(Strategy::Codebook),
            "mmse" => Ok(Strategy::Mmse),
            "mmse_spectrum" => Ok(Strategy::MmseSpectrum),
            other => Err(MmWaveError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Cached beam for one directed (own, peer) pair
#[derive(Debug, Clone, PartialEq)]
pub enum BeamCacheEntry {
    Geometric {
        my_pos: Vector3,
        other_pos: Vector3,
        vector: BeamformingVector,
    },
    Codebook {
        my_pos: Vector3,
        other_pos: Vector3,
        vector: BeamformingVector,
        generated_at: Duration,
        tx_beam: usize,
        rx_beam: usize,
        /// Equivalent channel of every (rx beam, tx beam) pair
        equivalent: ComplexMatrix,
    },
}

impl BeamCacheEntry {
    pub fn vector(&self) -> &BeamformingVector {
        match self {
            BeamCacheEntry::Geometric { vector, .. } | BeamCacheEntry::Codebook { vector, .. } => {
                vector
            }
        }
    }

    /// Own and peer positions when the entry was built
    pub fn positions(&self) -> (Vector3, Vector3) {
        match self {
            BeamCacheEntry::Geometric {
                my_pos, other_pos, ..
            }
            | BeamCacheEntry::Codebook {
                my_pos, other_pos, ..
            } => (*my_pos, *other_pos),
        }
    }

    pub fn generated_at(&self) -> MmWaveResult<Duration> {
        match self {
            BeamCacheEntry::Codebook { generated_at, .. } => Ok(*generated_at),
            BeamCacheEntry::Geometric { .. } => Err(MmWaveError::CacheKindMismatch),
        }
    }

    /// `(tx, rx)` codebook indices
    pub fn beam_pair(&self) -> MmWaveResult<(usize, usize)> {
        match self {
            BeamCacheEntry::Codebook {
                tx_beam, rx_beam, ..
            } => Ok((*tx_beam, *rx_beam)),
            BeamCacheEntry::Geometric { .. } => Err(MmWaveError::CacheKindMismatch),
        }
    }

    pub fn equivalent(&self) -> MmWaveResult<&ComplexMatrix> {
        match self {
            BeamCacheEntry::Codebook { equivalent, .. } => Ok(equivalent),
            BeamCacheEntry::Geometric { .. } => Err(MmWaveError::CacheKindMismatch),
        }
    }
}

pub struct BeamformingEngine {
    strategy: Strategy,
    clock: SharedClock,
    codebook_refresh: Duration,
    noise_power: f64,
    reference_power_dbm: f64,
    grid: Arc<SpectrumGrid>,
    cache: HashMap<u128, BeamCacheEntry>,
}

impl BeamformingEngine {
    /// `grid` is the subband grid the frequency-selective strategy solves on
    pub fn new(
        config: &BeamformingConfig,
        grid: Arc<SpectrumGrid>,
        clock: SharedClock,
    ) -> MmWaveResult<Self> {
        Ok(Self {
            strategy: config.strategy.parse()?,
            clock,
            codebook_refresh: config.codebook_refresh(),
            noise_power: config.noise_power,
            reference_power_dbm: config.reference_power_dbm,
            grid,
            cache: HashMap::new(),
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn cached_beams(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_entry(&self, own: NodeId, other: NodeId) -> Option<&BeamCacheEntry> {
        self.cache.get(&pairing::key(own.as_key(), other.as_key()))
    }

    /// Point `own`'s `layer` at `other`
    pub fn set_beamforming_vector_for_device(
        &mut self,
        own: &mut Device,
        other: &Device,
        layer: u8,
        evaluator: &mut SpectrumGainEvaluator,
    ) -> MmWaveResult<()> {
        let entry = match self.strategy {
            Strategy::Dft => self.geometric_entry(own, other)?,
            Strategy::Codebook | Strategy::Mmse | Strategy::MmseSpectrum => {
                self.codebook_entry(own, other, evaluator)?
            }
        };
        let now = self.clock.now();
        own.antenna
            .set_beamforming_vector(other.id(), layer, entry.vector().clone(), now);
        Ok(())
    }

    /// Serve `peers[k]` on `layers[k]` in one slot. Strategies without a
    /// digital stage beamform each peer independently.
    pub fn set_beamforming_vector_for_slot_bundle(
        &mut self,
        own: &mut Device,
        peers: &[&Device],
        layers: &[u8],
        evaluator: &mut SpectrumGainEvaluator,
        pathloss: &dyn PathlossModel,
    ) -> MmWaveResult<()> {
        if peers.len() != layers.len() {
            return Err(MmWaveError::BundleMismatch {
                peers: peers.len(),
                layers: layers.len(),
            });
        }

        match self.strategy {
            Strategy::Dft | Strategy::Codebook => {
                for (peer, layer) in peers.iter().zip(layers) {
                    self.set_beamforming_vector_for_device(own, peer, *layer, evaluator)?;
                }
                Ok(())
            }
            Strategy::Mmse => self.mmse_flat(own, peers, layers, evaluator, pathloss),
            Strategy::MmseSpectrum => self.mmse_spectrum(own, peers, layers, evaluator, pathloss),
        }
    }

    fn geometric_entry(&mut self, own: &Device, other: &Device) -> MmWaveResult<BeamCacheEntry> {
        let (my_pos, other_pos) = (own.position(), other.position());
        if my_pos == other_pos {
            return Err(MmWaveError::CoincidentEndpoints {
                a: own.id(),
                b: other.id(),
            });
        }

        let key = pairing::key(own.id().as_key(), other.id().as_key());
        if let Some(entry) = self.cache.get(&key) {
            if entry.positions() == (my_pos, other_pos) {
                debug!(key, "found a beam in the cache");
                return Ok(entry.clone());
            }
            debug!(key, "beam stale after position change");
        } else {
            debug!(key, "beam not found");
        }

        let entry = BeamCacheEntry::Geometric {
            my_pos,
            other_pos,
            vector: dft::steering_vector(&own.antenna, my_pos, other_pos),
        };
        self.cache.insert(key, entry.clone());
        Ok(entry)
    }

    fn codebook_entry(
        &mut self,
        own: &Device,
        other: &Device,
        evaluator: &mut SpectrumGainEvaluator,
    ) -> MmWaveResult<BeamCacheEntry> {
        let key = pairing::key(own.id().as_key(), other.id().as_key());
        let now = self.clock.now();

        if let Some(entry) = self.cache.get(&key) {
            if now.saturating_sub(entry.generated_at()?) <= self.codebook_refresh {
                debug!(key, "found a codebook beam in the cache");
                return Ok(entry.clone());
            }
            debug!(key, "codebook beam expired");
        } else {
            debug!(key, "codebook beam not found");
        }

        let h = evaluator.frequency_flat_channel_matrix(own, other, 0.0)?;
        let tx_dims = own.antenna.dims();
        let equivalent = channel_4d_fft(&h, other.antenna.dims(), tx_dims)?;
        let (tx_beam, rx_beam) =
            bf_gain_lookup(&equivalent, &BTreeSet::new()).ok_or(MmWaveError::NoAvailableBeam)?;

        let entry = BeamCacheEntry::Codebook {
            my_pos: own.position(),
            other_pos: other.position(),
            vector: BeamformingVector::new(
                bf_vector_2d_fft(tx_beam, tx_dims),
                BeamId::codebook(tx_beam, rx_beam),
            ),
            generated_at: now,
            tx_beam,
            rx_beam,
            equivalent,
        };
        self.cache.insert(key, entry.clone());
        Ok(entry)
    }
}
