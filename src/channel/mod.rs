//! 3GPP TR 38.901 cluster delay line channel generator
//!
//! Realizations are cached per link under a Cantor key of the two node ids.
//! A lookup in either direction reuses the same realization; the reverse
//! direction reads the tensor transposed. A realization is replaced when the
//! LOS condition flips or the coherence period runs out.

pub mod blockage;
pub mod matrix;
pub mod params;
mod realization;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

pub use blockage::{BlockageModel, NonSelfBlocker, SelfBlockingRegion};
pub use matrix::{ChannelLink, ChannelMatrix, ClusterAngles};
pub use params::{LinkState, ParamsTable, Scenario};

use crate::antenna::AntennaArray;
use crate::clock::SharedClock;
use crate::config::ChannelConfig;
use crate::device::Endpoint;
use crate::error::{MmWaveError, MmWaveResult};
use crate::geometry::Angles;
use crate::pairing;
use crate::propagation::ChannelCondition;
use crate::rng::RandomSource;
use realization::{LinkGeometry, Realization};

/// Statistical channel generator with a reciprocity-aware cache
pub struct ChannelGenerator {
    scenario: Scenario,
    frequency_hz: f64,
    update_period: Duration,
    blockage: Option<BlockageModel>,
    clock: SharedClock,
    rng: RandomSource,
    channels: HashMap<u128, Arc<ChannelMatrix>>,
}

impl ChannelGenerator {
    pub fn new(config: &ChannelConfig, clock: SharedClock) -> MmWaveResult<Self> {
        let scenario: Scenario = config.scenario.parse()?;
        Ok(Self {
            scenario,
            frequency_hz: config.frequency_hz,
            update_period: config.update_period(),
            blockage: config
                .blockage
                .then(|| BlockageModel::new(scenario, config)),
            clock,
            rng: RandomSource::new(config.seed),
            channels: HashMap::new(),
        })
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, frequency_hz: f64) {
        self.frequency_hz = frequency_hz;
    }

    pub fn update_period(&self) -> Duration {
        self.update_period
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Number of cached realizations (one per link)
    pub fn cached_links(&self) -> usize {
        self.channels.len()
    }

    /// Cached realization for the link, without refreshing it
    pub fn peek(&self, a: &Endpoint, b: &Endpoint) -> Option<ChannelLink> {
        let (forward, backward) = pairing::directed_keys(a.id.as_key(), b.id.as_key());
        if let Some(matrix) = self.channels.get(&forward) {
            return Some(ChannelLink {
                matrix: matrix.clone(),
                reverse: false,
            });
        }
        self.channels.get(&backward).map(|matrix| ChannelLink {
            matrix: matrix.clone(),
            reverse: true,
        })
    }

    /// Channel from `a` (transmitting with `tx_array`) to `b` (receiving
    /// with `rx_array`).
    pub fn get_channel(
        &mut self,
        a: &Endpoint,
        b: &Endpoint,
        tx_array: &AntennaArray,
        rx_array: &AntennaArray,
        condition: ChannelCondition,
    ) -> MmWaveResult<ChannelLink> {
        if a.position == b.position {
            return Err(MmWaveError::CoincidentEndpoints { a: a.id, b: b.id });
        }

        let (forward, backward) = pairing::directed_keys(a.id.as_key(), b.id.as_key());
        debug!(a = %a.id, b = %b.id, forward, backward, "channel lookup");

        let cached = self.peek(a, b);
        let previous = match cached {
            Some(link) if !self.needs_update(&link.matrix, condition.los) => {
                debug!(reverse = link.reverse, "channel cache hit");
                link.check_dimensions(rx_array.element_count(), tx_array.element_count())?;
                return Ok(link);
            }
            Some(link) => Some(link.matrix),
            None => {
                debug!("channel matrix not found");
                None
            }
        };

        let matrix = self.generate(a, b, tx_array, rx_array, condition, previous.as_deref())?;
        let matrix = Arc::new(matrix);
        self.channels.insert(forward, matrix.clone());
        // An expired realization stored for the other direction is now stale
        self.channels.remove(&backward);

        Ok(ChannelLink {
            matrix,
            reverse: false,
        })
    }

    fn needs_update(&self, matrix: &ChannelMatrix, los: bool) -> bool {
        if matrix.los != los {
            debug!(old = matrix.los, new = los, "update triggered by LOS change");
            return true;
        }
        let now = self.clock.now();
        if !self.update_period.is_zero()
            && now.saturating_sub(matrix.generated_at) > self.update_period
        {
            debug!(
                generated_ns = matrix.generated_at.as_nanos() as u64,
                now_ns = now.as_nanos() as u64,
                "update triggered by coherence expiry"
            );
            return true;
        }
        false
    }

    fn generate(
        &mut self,
        a: &Endpoint,
        b: &Endpoint,
        tx_array: &AntennaArray,
        rx_array: &AntennaArray,
        condition: ChannelCondition,
        previous: Option<&ChannelMatrix>,
    ) -> MmWaveResult<ChannelMatrix> {
        if self.frequency_hz == 0.0 {
            return Err(MmWaveError::ZeroFrequency);
        }

        let (pa, pb) = (a.position, b.position);
        // The lower endpoint is taken as the UT
        let geometry = LinkGeometry {
            tx_angle: Angles::between(&pb, &pa),
            rx_angle: Angles::between(&pa, &pb),
            distance_2d: pa.distance_2d_to(&pb),
            h_bs: pa.z.max(pb.z),
            h_ut: pa.z.min(pb.z),
            ut_location: if pa.z <= pb.z { pa } else { pb },
        };

        let table = ParamsTable::lookup(
            self.scenario,
            &LinkState {
                los: condition.los,
                o2i: condition.o2i,
                h_bs: geometry.h_bs,
                h_ut: geometry.h_ut,
                distance_2d: geometry.distance_2d,
                frequency_hz: self.frequency_hz,
            },
        )?;

        let realization = Realization {
            table: &table,
            condition,
            geometry,
            tx_array,
            rx_array,
            frequency_hz: self.frequency_hz,
            now: self.clock.now(),
            blockage: self.blockage.as_ref(),
            previous,
        };
        let matrix = realization.generate(&mut self.rng)?;

        info!(
            scenario = %self.scenario,
            los = condition.los,
            o2i = condition.o2i,
            clusters = matrix.num_reduced_clusters,
            delay_spread = matrix.delay_spread,
            k_factor_db = matrix.k_factor_db,
            "generated channel realization"
        );

        Ok(matrix)
    }
}
