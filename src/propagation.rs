//! Collaborators supplied by the host: LOS classification and large-scale
//! pathloss. Only the traits matter to the core; the implementations here are
//! the simple ones the NIF scene uses.

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::device::Endpoint;
use crate::geometry::SPEED_OF_LIGHT;
use crate::pairing;

/// Propagation condition of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCondition {
    pub los: bool,
    /// Outdoor-to-indoor
    pub o2i: bool,
}

impl ChannelCondition {
    pub const LOS: ChannelCondition = ChannelCondition { los: true, o2i: false };
    pub const NLOS: ChannelCondition = ChannelCondition { los: false, o2i: false };
}

/// LOS/NLOS classifier for an endpoint pair
pub trait ChannelConditionModel: Send + Sync {
    fn condition(&self, a: &Endpoint, b: &Endpoint) -> ChannelCondition;
}

/// Same condition for every link
#[derive(Debug, Clone, Copy)]
pub struct FixedCondition(pub ChannelCondition);

impl ChannelConditionModel for FixedCondition {
    fn condition(&self, _a: &Endpoint, _b: &Endpoint) -> ChannelCondition {
        self.0
    }
}

/// Per-link conditions set by the host, with a fallback for unknown links
#[derive(Debug, Clone)]
pub struct PairConditionTable {
    fallback: ChannelCondition,
    links: HashMap<u128, ChannelCondition>,
}

impl PairConditionTable {
    pub fn new(fallback: ChannelCondition) -> Self {
        Self {
            fallback,
            links: HashMap::new(),
        }
    }

    pub fn set(&mut self, a: &Endpoint, b: &Endpoint, condition: ChannelCondition) {
        self.links
            .insert(pairing::unordered_key(a.id.as_key(), b.id.as_key()), condition);
    }
}

impl Default for PairConditionTable {
    fn default() -> Self {
        Self::new(ChannelCondition::LOS)
    }
}

impl ChannelConditionModel for PairConditionTable {
    fn condition(&self, a: &Endpoint, b: &Endpoint) -> ChannelCondition {
        self.links
            .get(&pairing::unordered_key(a.id.as_key(), b.id.as_key()))
            .copied()
            .unwrap_or(self.fallback)
    }
}

/// Large-scale pathloss between two endpoints
pub trait PathlossModel: Send + Sync {
    /// Received power in dBm for `tx_power_dbm` sent from `a` to `b`
    fn rx_power_dbm(&self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64;

    /// Linear amplitude gain of the link relative to `reference_dbm`
    fn amplitude(&self, reference_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        10f64.powf((self.rx_power_dbm(reference_dbm, a, b) - reference_dbm) / 20.0)
    }
}

/// Free Space Path Loss
///
/// Formula: L_fs(dB) = 20*log10(4*pi*d*f/c)
#[derive(Debug, Clone, Copy)]
pub struct FreeSpacePathloss {
    pub frequency_hz: f64,
}

impl FreeSpacePathloss {
    pub fn new(frequency_hz: f64) -> Self {
        Self { frequency_hz }
    }

    pub fn loss_db(&self, distance_m: f64) -> f64 {
        let d = distance_m.max(0.1);
        20.0 * (4.0 * PI * d * self.frequency_hz / SPEED_OF_LIGHT).log10()
    }
}

impl PathlossModel for FreeSpacePathloss {
    fn rx_power_dbm(&self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        tx_power_dbm - self.loss_db(a.position.distance_to(&b.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NodeId;
    use crate::geometry::Vector3;

    fn make_endpoint(id: u32, x: f64) -> Endpoint {
        Endpoint::new(NodeId(id), Vector3::new(x, 0.0, 1.5))
    }

    #[test]
    fn test_pair_table_is_direction_independent() {
        let a = make_endpoint(1, 0.0);
        let b = make_endpoint(2, 50.0);
        let mut table = PairConditionTable::default();
        table.set(&a, &b, ChannelCondition::NLOS);
        assert_eq!(table.condition(&b, &a), ChannelCondition::NLOS);
    }

    #[test]
    fn test_pair_table_fallback() {
        let table = PairConditionTable::new(ChannelCondition::NLOS);
        let a = make_endpoint(1, 0.0);
        let b = make_endpoint(5, 10.0);
        assert!(!table.condition(&a, &b).los);
    }

    #[test]
    fn test_free_space_loss_at_28ghz_100m() {
        let model = FreeSpacePathloss::new(28e9);
        // 20log10(4*pi*100*28e9/3e8) = 101.4 dB
        assert!((model.loss_db(100.0) - 101.38).abs() < 0.05);
    }

    #[test]
    fn test_free_space_amplitude_matches_loss() {
        let model = FreeSpacePathloss::new(28e9);
        let a = make_endpoint(1, 0.0);
        let b = make_endpoint(2, 100.0);
        let amp = model.amplitude(30.0, &a, &b);
        let expected = 10f64.powf(-model.loss_db(100.0) / 20.0);
        assert!((amp - expected).abs() < 1e-15);
    }
}
