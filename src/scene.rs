//! Host-facing aggregate of devices, engines and the shared channel state
//!
//! The host drives time explicitly with `advance_to`. Every other call is a
//! synchronous query or update against the devices as they stand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rustler::NifStruct;
use tracing::info;

use crate::antenna::AntennaArray;
use crate::beamforming::BeamformingEngine;
use crate::channel::{ChannelGenerator, ChannelLink};
use crate::clock::{Clock, ManualClock};
use crate::config::{AntennaConfig, BeamformingConfig, SceneConfig};
use crate::device::{Device, Endpoint, NodeId};
use crate::error::{MmWaveError, MmWaveResult};
use crate::geometry::Vector3;
use crate::propagation::{ChannelCondition, FreeSpacePathloss, PairConditionTable};
use crate::spectrum::{SpectrumGainEvaluator, SpectrumGrid, SpectrumValue};

/// Snapshot of a link's current realization for telemetry
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "MinutemodemSimnet.MmWave.ChannelSummary"]
pub struct ChannelSummary {
    pub los: bool,
    pub o2i: bool,
    /// The caller's `a` was the receiver at generation time
    pub reverse: bool,
    pub rx_elements: u32,
    pub tx_elements: u32,
    pub num_clusters: u32,
    pub num_reduced_clusters: u32,
    pub delay_spread_ns: f64,
    pub k_factor_db: f64,
    pub generated_at_ms: f64,
    pub delays_ns: Vec<f64>,
    pub cluster_powers: Vec<f64>,
}

impl From<&ChannelLink> for ChannelSummary {
    fn from(link: &ChannelLink) -> Self {
        let m = &link.matrix;
        let (rx_elements, tx_elements) = if link.reverse {
            (m.tx_elements(), m.rx_elements())
        } else {
            (m.rx_elements(), m.tx_elements())
        };
        Self {
            los: m.los,
            o2i: m.o2i,
            reverse: link.reverse,
            rx_elements: rx_elements as u32,
            tx_elements: tx_elements as u32,
            num_clusters: m.num_clusters() as u32,
            num_reduced_clusters: m.num_reduced_clusters as u32,
            delay_spread_ns: m.delay_spread * 1e9,
            k_factor_db: m.k_factor_db,
            generated_at_ms: m.generated_at.as_secs_f64() * 1e3,
            delays_ns: m.delays.iter().map(|d| d * 1e9).collect(),
            cluster_powers: m.cluster_powers.clone(),
        }
    }
}

pub struct Scene {
    clock: Arc<ManualClock>,
    grid: Arc<SpectrumGrid>,
    evaluator: SpectrumGainEvaluator,
    conditions: PairConditionTable,
    pathloss: FreeSpacePathloss,
    devices: HashMap<NodeId, Device>,
    engines: HashMap<NodeId, BeamformingEngine>,
}

impl Scene {
    pub fn new(config: &SceneConfig) -> MmWaveResult<Self> {
        let clock = ManualClock::shared();
        let generator = ChannelGenerator::new(&config.channel, clock.clone())?;
        let grid = SpectrumGrid::uniform(
            config.channel.frequency_hz,
            config.bandwidth_hz,
            config.num_subbands as usize,
        )?;
        let conditions = PairConditionTable::default();
        let evaluator =
            SpectrumGainEvaluator::new(generator, Box::new(conditions.clone()), clock.clone());

        info!(
            scenario = %config.channel.scenario,
            frequency_hz = config.channel.frequency_hz,
            subbands = config.num_subbands,
            "scene created"
        );

        Ok(Self {
            clock,
            grid: Arc::new(grid),
            evaluator,
            conditions,
            pathloss: FreeSpacePathloss::new(config.channel.frequency_hz),
            devices: HashMap::new(),
            engines: HashMap::new(),
        })
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn grid(&self) -> &Arc<SpectrumGrid> {
        &self.grid
    }

    pub fn device(&self, id: NodeId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn evaluator(&self) -> &SpectrumGainEvaluator {
        &self.evaluator
    }

    pub fn add_device(
        &mut self,
        id: NodeId,
        position: Vector3,
        antenna: &AntennaConfig,
        beamforming: &BeamformingConfig,
    ) -> MmWaveResult<()> {
        if self.devices.contains_key(&id) {
            return Err(MmWaveError::DuplicateDevice(id));
        }
        let array = AntennaArray::from_config(antenna)?;
        let engine = BeamformingEngine::new(beamforming, self.grid.clone(), self.clock.clone())?;

        self.devices
            .insert(id, Device::new(Endpoint::new(id, position), array));
        self.engines.insert(id, engine);
        Ok(())
    }

    pub fn set_mobility(
        &mut self,
        id: NodeId,
        position: Vector3,
        velocity: Vector3,
    ) -> MmWaveResult<()> {
        let device = self
            .devices
            .get_mut(&id)
            .ok_or(MmWaveError::UnknownDevice(id))?;
        device.endpoint.position = position;
        device.endpoint.velocity = velocity;
        Ok(())
    }

    /// Override the propagation condition of the `{a, b}` link
    pub fn set_condition(
        &mut self,
        a: NodeId,
        b: NodeId,
        condition: ChannelCondition,
    ) -> MmWaveResult<()> {
        let ea = self.endpoint(a)?;
        let eb = self.endpoint(b)?;
        self.conditions.set(&ea, &eb, condition);
        self.evaluator
            .set_condition_model(Box::new(self.conditions.clone()));
        Ok(())
    }

    pub fn advance_to(&mut self, now: Duration) {
        self.clock.set(now);
    }

    /// Point `own`'s `layer` at `peer` using `own`'s strategy
    pub fn set_beamforming_vector(
        &mut self,
        own: NodeId,
        peer: NodeId,
        layer: u8,
    ) -> MmWaveResult<()> {
        if own == peer {
            return Err(MmWaveError::CoincidentEndpoints { a: own, b: peer });
        }
        let engine = self
            .engines
            .get_mut(&own)
            .ok_or(MmWaveError::UnknownDevice(own))?;
        let mut device = self
            .devices
            .remove(&own)
            .ok_or(MmWaveError::UnknownDevice(own))?;

        let result = match self.devices.get(&peer) {
            Some(other) => engine.set_beamforming_vector_for_device(
                &mut device,
                other,
                layer,
                &mut self.evaluator,
            ),
            None => Err(MmWaveError::UnknownDevice(peer)),
        };
        self.devices.insert(own, device);
        result
    }

    /// Serve `peers[k]` on `layers[k]` from `own` in one slot
    pub fn set_slot_bundle(
        &mut self,
        own: NodeId,
        peers: &[NodeId],
        layers: &[u8],
    ) -> MmWaveResult<()> {
        if let Some(&peer) = peers.iter().find(|&&p| p == own) {
            return Err(MmWaveError::CoincidentEndpoints { a: own, b: peer });
        }
        let engine = self
            .engines
            .get_mut(&own)
            .ok_or(MmWaveError::UnknownDevice(own))?;
        let mut device = self
            .devices
            .remove(&own)
            .ok_or(MmWaveError::UnknownDevice(own))?;

        let result = peers
            .iter()
            .map(|id| self.devices.get(id).ok_or(MmWaveError::UnknownDevice(*id)))
            .collect::<MmWaveResult<Vec<&Device>>>()
            .and_then(|bundle| {
                engine.set_beamforming_vector_for_slot_bundle(
                    &mut device,
                    &bundle,
                    layers,
                    &mut self.evaluator,
                    &self.pathloss,
                )
            });
        self.devices.insert(own, device);
        result
    }

    pub fn change_to_omni(&mut self, id: NodeId) -> MmWaveResult<()> {
        self.devices
            .get_mut(&id)
            .ok_or(MmWaveError::UnknownDevice(id))?
            .antenna
            .change_to_omni();
        Ok(())
    }

    /// Small-scale received PSD for a flat `tx_psd` sent from `tx` to `rx`.
    /// Large-scale pathloss is left to the host.
    pub fn received_spectrum(
        &mut self,
        tx: NodeId,
        rx: NodeId,
        tx_psd: f64,
        tx_layer: u8,
        rx_layer: u8,
    ) -> MmWaveResult<SpectrumValue> {
        let a = self.devices.get(&tx).ok_or(MmWaveError::UnknownDevice(tx))?;
        let b = self.devices.get(&rx).ok_or(MmWaveError::UnknownDevice(rx))?;
        let psd = SpectrumValue::constant(self.grid.clone(), tx_psd);
        self.evaluator
            .compute_received_spectrum(&psd, a, b, tx_layer, rx_layer)
    }

    /// Current realization of the `a -> b` link, generating it if needed
    pub fn channel_summary(&mut self, a: NodeId, b: NodeId) -> MmWaveResult<ChannelSummary> {
        let da = self.devices.get(&a).ok_or(MmWaveError::UnknownDevice(a))?;
        let db = self.devices.get(&b).ok_or(MmWaveError::UnknownDevice(b))?;
        let link = self.evaluator.channel(da, db)?;
        Ok(ChannelSummary::from(&link))
    }

    fn endpoint(&self, id: NodeId) -> MmWaveResult<Endpoint> {
        self.devices
            .get(&id)
            .map(|d| d.endpoint)
            .ok_or(MmWaveError::UnknownDevice(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scene() -> Scene {
        let mut scene = Scene::new(&SceneConfig::default()).unwrap();
        let antenna = AntennaConfig {
            dim1: 2,
            dim2: 2,
            ..AntennaConfig::default()
        };
        let dft = BeamformingConfig::default();
        scene
            .add_device(NodeId(1), Vector3::new(0.0, 0.0, 10.0), &antenna, &dft)
            .unwrap();
        scene
            .add_device(NodeId(2), Vector3::new(40.0, 10.0, 1.5), &antenna, &dft)
            .unwrap();
        scene
            .add_device(NodeId(3), Vector3::new(-30.0, 25.0, 1.5), &antenna, &dft)
            .unwrap();
        scene
    }

    // ========================================================================
    // REGISTRY
    // ========================================================================

    #[test]
    fn test_duplicate_device() {
        let mut scene = make_scene();
        let result = scene.add_device(
            NodeId(1),
            Vector3::default(),
            &AntennaConfig::default(),
            &BeamformingConfig::default(),
        );
        assert_eq!(result, Err(MmWaveError::DuplicateDevice(NodeId(1))));
        assert_eq!(scene.device_count(), 3);
    }

    #[test]
    fn test_bad_strategy_leaves_registry_untouched() {
        let mut scene = make_scene();
        let config = BeamformingConfig {
            strategy: "zf".to_string(),
            ..BeamformingConfig::default()
        };
        let result = scene.add_device(
            NodeId(9),
            Vector3::default(),
            &AntennaConfig::default(),
            &config,
        );
        assert!(matches!(result, Err(MmWaveError::UnknownStrategy(_))));
        assert!(scene.device(NodeId(9)).is_none());
    }

    #[test]
    fn test_unknown_device() {
        let mut scene = make_scene();
        assert_eq!(
            scene.set_beamforming_vector(NodeId(1), NodeId(7), 0),
            Err(MmWaveError::UnknownDevice(NodeId(7)))
        );
        // The beamforming device is still registered after the failure
        assert!(scene.device(NodeId(1)).is_some());
    }

    #[test]
    fn test_set_mobility() {
        let mut scene = make_scene();
        let velocity = Vector3::new(1.0, 0.0, 0.0);
        scene
            .set_mobility(NodeId(2), Vector3::new(50.0, 0.0, 1.5), velocity)
            .unwrap();
        let device = scene.device(NodeId(2)).unwrap();
        assert_eq!(device.position(), Vector3::new(50.0, 0.0, 1.5));
        assert_eq!(device.velocity(), velocity);
    }

    // ========================================================================
    // LINKS
    // ========================================================================

    #[test]
    fn test_received_spectrum_after_beamforming() {
        let mut scene = make_scene();
        scene.set_beamforming_vector(NodeId(1), NodeId(2), 0).unwrap();
        scene.set_beamforming_vector(NodeId(2), NodeId(1), 0).unwrap();

        let rx = scene
            .received_spectrum(NodeId(1), NodeId(2), 1e-9, 0, 0)
            .unwrap();
        assert_eq!(rx.values().len(), 16);
        assert!(rx.values().iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(rx.sum() > 0.0);
    }

    #[test]
    fn test_omni_passthrough() {
        let mut scene = make_scene();
        scene.change_to_omni(NodeId(1)).unwrap();
        let rx = scene
            .received_spectrum(NodeId(1), NodeId(2), 2.0, 0, 0)
            .unwrap();
        assert!(rx.values().iter().all(|v| *v == 2.0));
    }

    #[test]
    fn test_condition_override_reaches_channel() {
        let mut scene = make_scene();
        assert!(scene.channel_summary(NodeId(1), NodeId(2)).unwrap().los);

        scene
            .set_condition(NodeId(2), NodeId(1), ChannelCondition::NLOS)
            .unwrap();
        let summary = scene.channel_summary(NodeId(1), NodeId(2)).unwrap();
        assert!(!summary.los);
        assert_eq!(summary.k_factor_db, 0.0);
        // Other links keep the default
        assert!(scene.channel_summary(NodeId(1), NodeId(3)).unwrap().los);
    }

    #[test]
    fn test_summary_in_reverse() {
        let mut scene = make_scene();
        let forward = scene.channel_summary(NodeId(1), NodeId(2)).unwrap();
        let backward = scene.channel_summary(NodeId(2), NodeId(1)).unwrap();
        assert!(!forward.reverse);
        assert!(backward.reverse);
        assert_eq!(forward.delays_ns, backward.delays_ns);
        assert_eq!(forward.num_clusters as usize, forward.delays_ns.len());
    }

    #[test]
    fn test_advance_regenerates() {
        let mut scene = make_scene();
        let first = scene.channel_summary(NodeId(1), NodeId(2)).unwrap();
        scene.advance_to(Duration::from_millis(5));
        let second = scene.channel_summary(NodeId(1), NodeId(2)).unwrap();
        assert_eq!(first.generated_at_ms, 0.0);
        assert!((second.generated_at_ms - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_self_bundle_rejected() {
        let mut scene = make_scene();
        assert!(matches!(
            scene.set_slot_bundle(NodeId(1), &[NodeId(2), NodeId(1)], &[0, 1]),
            Err(MmWaveError::CoincidentEndpoints { .. })
        ));
    }

    #[test]
    fn test_dft_slot_bundle() {
        let mut scene = make_scene();
        scene
            .set_slot_bundle(NodeId(1), &[NodeId(2), NodeId(3)], &[0, 1])
            .unwrap();
        let device = scene.device(NodeId(1)).unwrap();
        assert!(device.antenna.current_beamforming_vector(0).is_ok());
        assert!(device.antenna.current_beamforming_vector(1).is_ok());
    }
}
