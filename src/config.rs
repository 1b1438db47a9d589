//! Configuration passed in from Elixir
//!
//! Every struct decodes from the matching `MinutemodemSimnet.MmWave.*`
//! struct and has defaults for standalone use.

use rustler::NifStruct;
use std::time::Duration;

/// Statistical channel model settings
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "MinutemodemSimnet.MmWave.ChannelConfig"]
pub struct ChannelConfig {
    /// RMa, UMa, UMi-StreetCanyon, InH-OfficeMixed or InH-OfficeOpen
    pub scenario: String,
    pub frequency_hz: f64,
    /// Coherence period; 0 disables time-based regeneration
    pub update_period_ms: f64,
    /// Enable blockage model A
    pub blockage: bool,
    pub num_non_self_blocking: u32,
    /// Self-blocking region: portrait when true, landscape otherwise
    pub portrait_mode: bool,
    /// Speed of moving blockers (m/s)
    pub blocker_speed: f64,
    pub seed: u64,
}

impl ChannelConfig {
    pub fn update_period(&self) -> Duration {
        Duration::from_secs_f64(self.update_period_ms.max(0.0) / 1e3)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            scenario: "UMa".to_string(),
            frequency_hz: 28e9,
            update_period_ms: 1.0,
            blockage: false,
            num_non_self_blocking: 4,
            portrait_mode: true,
            blocker_speed: 1.0,
            seed: 1,
        }
    }
}

/// Uniform planar array geometry
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "MinutemodemSimnet.MmWave.AntennaConfig"]
pub struct AntennaConfig {
    pub dim1: u32,
    pub dim2: u32,
    /// Horizontal element spacing in wavelengths
    pub spacing_h: f64,
    /// Vertical element spacing in wavelengths
    pub spacing_v: f64,
    /// "X0" or "Z0"
    pub orientation: String,
}

impl Default for AntennaConfig {
    fn default() -> Self {
        Self {
            dim1: 4,
            dim2: 8,
            spacing_h: 0.5,
            spacing_v: 0.5,
            orientation: "X0".to_string(),
        }
    }
}

/// Beam selection settings for one device
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "MinutemodemSimnet.MmWave.BeamformingConfig"]
pub struct BeamformingConfig {
    /// "dft", "codebook", "mmse" or "mmse_spectrum"
    pub strategy: String,
    /// Lifetime of a codebook search result
    pub codebook_refresh_ms: f64,
    /// MMSE regularization, same unit as |Heq|^2
    pub noise_power: f64,
    /// Reference transmit power for the MMSE cross-term pathloss
    pub reference_power_dbm: f64,
}

impl BeamformingConfig {
    pub fn codebook_refresh(&self) -> Duration {
        Duration::from_secs_f64(self.codebook_refresh_ms.max(0.0) / 1e3)
    }
}

impl Default for BeamformingConfig {
    fn default() -> Self {
        Self {
            strategy: "dft".to_string(),
            codebook_refresh_ms: 100.0,
            noise_power: 1e-13,
            reference_power_dbm: 30.0,
        }
    }
}

/// Everything needed to create a scene
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "MinutemodemSimnet.MmWave.SceneConfig"]
pub struct SceneConfig {
    pub channel: ChannelConfig,
    /// Span of the subband grid centred on the carrier
    pub bandwidth_hz: f64,
    pub num_subbands: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            bandwidth_hz: 100e6,
            num_subbands: 16,
        }
    }
}
