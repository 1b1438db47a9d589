//! mmWave Channel NIF for MinuteModem SimNet
//!
//! Implements the 3GPP TR 38.901 clustered delay line channel for
//! 6-100 GHz links between uniform planar arrays, with DFT, FFT codebook
//! and MMSE beamforming on top and per-subband spectrum gain evaluation.

pub mod antenna;
pub mod beamforming;
pub mod channel;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod geometry;
mod nif;
pub mod pairing;
pub mod propagation;
pub mod rng;
pub mod scene;
pub mod slab;
pub mod spectrum;

pub use antenna::AntennaArray;
pub use beamforming::{BeamformingEngine, Strategy};
pub use channel::{ChannelGenerator, ChannelLink, ChannelMatrix};
pub use config::{AntennaConfig, BeamformingConfig, ChannelConfig, SceneConfig};
pub use device::{Device, NodeId};
pub use error::{MmWaveError, MmWaveResult};
pub use scene::{ChannelSummary, Scene};
pub use spectrum::{SpectrumGainEvaluator, SpectrumGrid, SpectrumValue};

use slab::SceneSlab;

// Scenes held for the host, one lock per scene
lazy_static::lazy_static! {
    static ref SCENES: SceneSlab<Scene> = SceneSlab::new(1024);
}

rustler::init!("Elixir.MinutemodemSimnet.MmWave.Nif");
