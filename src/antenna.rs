//! Uniform planar antenna array and its beamforming state
//!
//! Element locations are expressed in wavelengths, so a plane-wave phase is
//! simply `2*pi * (r_hat . location)`. The array stores one vector per
//! (peer, layer) and tracks which one is currently active on each layer.

use rustfft::num_complex::Complex64;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AntennaConfig;
use crate::device::NodeId;
use crate::error::{MmWaveError, MmWaveResult};
use crate::geometry::Vector3;
use crate::pairing;

/// Plane the panel lies in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Panel in the y-z plane, broadside along x
    X0,
    /// Panel in the x-y plane, broadside along z
    Z0,
}

impl FromStr for Orientation {
    type Err = MmWaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X0" | "x0" => Ok(Orientation::X0),
            "Z0" | "z0" => Ok(Orientation::Z0),
            other => Err(MmWaveError::UnknownOrientation(other.to_string())),
        }
    }
}

/// Element radiation pattern, angles in radians
pub trait RadiationPattern: fmt::Debug + Send + Sync {
    fn gain(&self, zenith: f64, azimuth: f64) -> f64;
}

/// Unit gain in every direction
#[derive(Debug, Clone, Copy, Default)]
pub struct IsotropicPattern;

impl RadiationPattern for IsotropicPattern {
    fn gain(&self, _zenith: f64, _azimuth: f64) -> f64 {
        1.0
    }
}

/// Opaque beam identity used as a cache key by dependent caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeamId(pub u128);

const CODEBOOK_TAG: u128 = 1 << 127;
const HYBRID_TAG: u128 = 1 << 126;

impl BeamId {
    /// Angle-derived id, quantized to hundredths of a degree
    pub fn geometric(azimuth_deg: f64, zenith_deg: f64) -> Self {
        let az = ((azimuth_deg + 180.0) * 100.0).round().max(0.0) as u32;
        let zen = (zenith_deg * 100.0).round().max(0.0) as u32;
        BeamId(pairing::key(az, zen))
    }

    /// Codebook index pair
    pub fn codebook(tx_index: usize, rx_index: usize) -> Self {
        BeamId(CODEBOOK_TAG | pairing::key(tx_index as u32, rx_index as u32))
    }

    /// Hybrid analog/digital vector for `layer` built around `tx_index`
    pub fn hybrid(tx_index: usize, layer: u8) -> Self {
        BeamId(HYBRID_TAG | pairing::key(tx_index as u32, u32::from(layer)))
    }
}

/// Complex weight per element plus its identity
#[derive(Debug, Clone, PartialEq)]
pub struct BeamformingVector {
    pub weights: Vec<Complex64>,
    pub id: BeamId,
}

impl BeamformingVector {
    pub fn new(weights: Vec<Complex64>, id: BeamId) -> Self {
        Self { weights, id }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn norm(&self) -> f64 {
        self.weights.iter().map(|w| w.norm_sqr()).sum::<f64>().sqrt()
    }
}

/// Digital combining weights indexed `[subband][output layer][input layer]`
pub type CombiningMatrix = Vec<Vec<Vec<Complex64>>>;

#[derive(Debug, Clone)]
struct StoredBeam {
    vector: BeamformingVector,
    updated_at: Duration,
}

#[derive(Debug, Clone)]
pub struct AntennaArray {
    dim1: usize,
    dim2: usize,
    spacing_h: f64,
    spacing_v: f64,
    orientation: Orientation,
    pattern: Arc<dyn RadiationPattern>,
    stored: HashMap<(NodeId, u8), StoredBeam>,
    current: BTreeMap<u8, BeamformingVector>,
    omni: bool,
    digital_combining: Option<CombiningMatrix>,
}

impl AntennaArray {
    /// Half-wavelength spaced X0 panel with isotropic elements
    pub fn new(dim1: usize, dim2: usize) -> Self {
        Self {
            dim1,
            dim2,
            spacing_h: 0.5,
            spacing_v: 0.5,
            orientation: Orientation::X0,
            pattern: Arc::new(IsotropicPattern),
            stored: HashMap::new(),
            current: BTreeMap::new(),
            omni: false,
            digital_combining: None,
        }
    }

    pub fn from_config(config: &AntennaConfig) -> MmWaveResult<Self> {
        let orientation = config.orientation.parse()?;
        Ok(Self::new(config.dim1 as usize, config.dim2 as usize)
            .with_spacing(config.spacing_h, config.spacing_v)
            .with_orientation(orientation))
    }

    pub fn with_spacing(mut self, horizontal: f64, vertical: f64) -> Self {
        self.spacing_h = horizontal;
        self.spacing_v = vertical;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_pattern(mut self, pattern: Arc<dyn RadiationPattern>) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn dim1(&self) -> usize {
        self.dim1
    }

    pub fn dim2(&self) -> usize {
        self.dim2
    }

    pub fn dims(&self) -> [usize; 2] {
        [self.dim1, self.dim2]
    }

    pub fn element_count(&self) -> usize {
        self.dim1 * self.dim2
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Element position in wavelengths relative to element 0
    pub fn element_location(&self, index: usize) -> Vector3 {
        let h = self.spacing_h * (index % self.dim1) as f64;
        let v = self.spacing_v * (index / self.dim1) as f64;
        match self.orientation {
            Orientation::X0 => Vector3::new(0.0, h, v),
            Orientation::Z0 => Vector3::new(h, v, 0.0),
        }
    }

    pub fn element_locations(&self) -> Vec<Vector3> {
        (0..self.element_count())
            .map(|i| self.element_location(i))
            .collect()
    }

    pub fn radiation_pattern(&self, zenith: f64, azimuth: f64) -> f64 {
        self.pattern.gain(zenith, azimuth)
    }

    // ------------------------------------------------------------------------
    // Beamforming vectors
    // ------------------------------------------------------------------------

    /// Store `vector` for `peer` on `layer` and make it current for the layer.
    /// Other layers are left untouched.
    pub fn set_beamforming_vector(
        &mut self,
        peer: NodeId,
        layer: u8,
        vector: BeamformingVector,
        now: Duration,
    ) {
        self.omni = false;
        self.stored.insert(
            (peer, layer),
            StoredBeam {
                vector: vector.clone(),
                updated_at: now,
            },
        );
        self.current.insert(layer, vector);
    }

    /// Re-select the vector previously stored for `peer` on `layer`
    pub fn change_beamforming_vector(&mut self, peer: NodeId, layer: u8) -> MmWaveResult<()> {
        let stored = self
            .stored
            .get(&(peer, layer))
            .ok_or(MmWaveError::MissingBeamformingVector { layer })?;
        self.omni = false;
        self.current.insert(layer, stored.vector.clone());
        Ok(())
    }

    pub fn current_beamforming_vector(&self, layer: u8) -> MmWaveResult<&BeamformingVector> {
        self.current
            .get(&layer)
            .ok_or(MmWaveError::MissingBeamformingVector { layer })
    }

    pub fn beamforming_vector(&self, peer: NodeId, layer: u8) -> Option<&BeamformingVector> {
        self.stored.get(&(peer, layer)).map(|s| &s.vector)
    }

    pub fn beamforming_vector_update_time(&self, peer: NodeId, layer: u8) -> Option<Duration> {
        self.stored.get(&(peer, layer)).map(|s| s.updated_at)
    }

    pub fn change_to_omni(&mut self) {
        self.omni = true;
    }

    pub fn is_omni(&self) -> bool {
        self.omni
    }

    // ------------------------------------------------------------------------
    // Digital combining
    // ------------------------------------------------------------------------

    pub fn set_digital_combining(&mut self, matrix: CombiningMatrix) {
        self.digital_combining = Some(matrix);
    }

    pub fn clear_digital_combining(&mut self) {
        self.digital_combining = None;
    }

    pub fn digital_combining(&self) -> Option<&CombiningMatrix> {
        self.digital_combining.as_ref()
    }

    pub fn is_digital_combining_on(&self) -> bool {
        self.digital_combining.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn make_vector(n: usize, id: u128) -> BeamformingVector {
        BeamformingVector::new(vec![Complex64::new(1.0 / (n as f64).sqrt(), 0.0); n], BeamId(id))
    }

    // ========================================================================
    // GEOMETRY
    // ========================================================================

    #[test]
    fn test_x0_locations() {
        let array = AntennaArray::new(4, 8);
        assert_eq!(array.element_count(), 32);
        assert_eq!(array.element_location(0), Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(array.element_location(3), Vector3::new(0.0, 1.5, 0.0));
        assert_eq!(array.element_location(5), Vector3::new(0.0, 0.5, 0.5));
        assert_eq!(array.element_location(31), Vector3::new(0.0, 1.5, 3.5));
    }

    #[test]
    fn test_z0_locations() {
        let array = AntennaArray::new(2, 2)
            .with_orientation(Orientation::Z0)
            .with_spacing(1.0, 2.0);
        assert_eq!(array.element_location(1), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(array.element_location(2), Vector3::new(0.0, 2.0, 0.0));
        assert_eq!(array.element_location(3), Vector3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_from_config_rejects_unknown_orientation() {
        let config = AntennaConfig {
            orientation: "Y9".to_string(),
            ..AntennaConfig::default()
        };
        assert!(matches!(
            AntennaArray::from_config(&config),
            Err(MmWaveError::UnknownOrientation(_))
        ));
    }

    #[test]
    fn test_isotropic_pattern() {
        let array = AntennaArray::new(2, 2);
        assert_eq!(array.radiation_pattern(0.3, -1.2), 1.0);
    }

    #[derive(Debug)]
    struct Broadside;

    impl RadiationPattern for Broadside {
        fn gain(&self, zenith: f64, _azimuth: f64) -> f64 {
            zenith.sin().abs()
        }
    }

    #[test]
    fn test_custom_pattern() {
        let array = AntennaArray::new(2, 2).with_pattern(Arc::new(Broadside));
        assert!(array.radiation_pattern(0.0, 0.0).abs() < 1e-12);
        assert!((array.radiation_pattern(FRAC_PI_2, 0.0) - 1.0).abs() < 1e-12);
    }

    // ========================================================================
    // BEAM STORAGE
    // ========================================================================

    #[test]
    fn test_set_vector_leaves_other_layers() {
        let mut array = AntennaArray::new(2, 2);
        array.set_beamforming_vector(NodeId(1), 0, make_vector(4, 10), Duration::ZERO);
        array.set_beamforming_vector(NodeId(2), 1, make_vector(4, 20), Duration::ZERO);

        assert_eq!(array.current_beamforming_vector(0).unwrap().id, BeamId(10));
        assert_eq!(array.current_beamforming_vector(1).unwrap().id, BeamId(20));
    }

    #[test]
    fn test_missing_layer_is_error() {
        let array = AntennaArray::new(2, 2);
        assert_eq!(
            array.current_beamforming_vector(3),
            Err(MmWaveError::MissingBeamformingVector { layer: 3 })
        );
    }

    #[test]
    fn test_change_vector_restores_stored() {
        let mut array = AntennaArray::new(2, 2);
        array.set_beamforming_vector(NodeId(1), 0, make_vector(4, 10), Duration::ZERO);
        array.set_beamforming_vector(NodeId(2), 0, make_vector(4, 20), Duration::from_millis(1));
        assert_eq!(array.current_beamforming_vector(0).unwrap().id, BeamId(20));

        array.change_beamforming_vector(NodeId(1), 0).unwrap();
        assert_eq!(array.current_beamforming_vector(0).unwrap().id, BeamId(10));
        assert_eq!(array.beamforming_vector(NodeId(2), 0).unwrap().id, BeamId(20));
        assert!(array.beamforming_vector(NodeId(2), 1).is_none());
        assert_eq!(
            array.beamforming_vector_update_time(NodeId(2), 0),
            Some(Duration::from_millis(1))
        );
    }

    #[test]
    fn test_setting_vector_clears_omni() {
        let mut array = AntennaArray::new(2, 2);
        array.change_to_omni();
        assert!(array.is_omni());
        array.set_beamforming_vector(NodeId(1), 0, make_vector(4, 1), Duration::ZERO);
        assert!(!array.is_omni());
    }

    #[test]
    fn test_digital_combining_toggle() {
        let mut array = AntennaArray::new(2, 2);
        assert!(!array.is_digital_combining_on());
        array.set_digital_combining(vec![vec![vec![Complex64::new(1.0, 0.0)]]]);
        assert!(array.is_digital_combining_on());
        array.clear_digital_combining();
        assert!(array.digital_combining().is_none());
    }

    // ========================================================================
    // BEAM IDS
    // ========================================================================

    #[test]
    fn test_beam_id_families_are_disjoint() {
        let g = BeamId::geometric(10.0, 90.0);
        let c = BeamId::codebook(3, 4);
        let h = BeamId::hybrid(3, 4);
        assert_ne!(g, c);
        assert_ne!(c, h);
        assert_ne!(g, h);
    }

    #[test]
    fn test_geometric_id_tracks_angles() {
        assert_eq!(BeamId::geometric(10.0, 90.0), BeamId::geometric(10.0, 90.0));
        assert_ne!(BeamId::geometric(10.0, 90.0), BeamId::geometric(25.0, 90.0));
    }
}
