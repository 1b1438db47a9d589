//! Error types for channel, beamforming and spectrum operations

use thiserror::Error;

use crate::device::NodeId;

/// Result type for mmWave channel operations
pub type MmWaveResult<T> = Result<T, MmWaveError>;

/// Errors raised by the channel generator, the beamforming engines and the
/// spectrum evaluator. None of them are retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MmWaveError {
    /// Scenario string does not name a known 3GPP scenario
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// Channel generation needs a carrier frequency
    #[error("carrier frequency is not set")]
    ZeroFrequency,

    /// No angular shape factor exists for this cluster count
    #[error("no angular scaling factor for {0} clusters")]
    UnsupportedClusterCount(usize),

    /// Scenario cannot model the requested propagation condition
    #[error("scenario {scenario} does not support {reason}")]
    UnsupportedCondition {
        scenario: &'static str,
        reason: &'static str,
    },

    /// Cached tensor does not match the arrays it is used with
    #[error(
        "channel tensor is {actual_rx}x{actual_tx}, arrays expect {expected_rx}x{expected_tx}"
    )]
    AntennaDimensionMismatch {
        expected_rx: usize,
        expected_tx: usize,
        actual_rx: usize,
        actual_tx: usize,
    },

    /// Angles are undefined between two endpoints at the same place
    #[error("devices {a} and {b} share the same position")]
    CoincidentEndpoints { a: NodeId, b: NodeId },

    /// A codebook-only field was requested from a geometric cache entry
    #[error("beam cache entry was not produced by a codebook strategy")]
    CacheKindMismatch,

    #[error("unknown device {0}")]
    UnknownDevice(NodeId),

    #[error("device {0} is already registered")]
    DuplicateDevice(NodeId),

    /// No current beamforming vector stored for the layer
    #[error("no beamforming vector on layer {layer}")]
    MissingBeamformingVector { layer: u8 },

    /// Complex spectra need beamformed arrays on both ends
    #[error("array is in omni transmission mode")]
    OmniArray,

    #[error("digital combining cannot be active at both ends of a link")]
    DigitalCombiningAtBothEnds,

    /// Every transmit codebook index was excluded from the search
    #[error("no transmit beam left after exclusions")]
    NoAvailableBeam,

    /// Cholesky pivot was not strictly positive
    #[error("matrix is not positive definite (pivot {pivot})")]
    NotPositiveDefinite { pivot: f64 },

    #[error("slot bundle has {peers} peers but {layers} layers")]
    BundleMismatch { peers: usize, layers: usize },

    #[error("unknown beamforming strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown antenna orientation: {0}")]
    UnknownOrientation(String),

    /// Spectrum grid has no bands
    #[error("spectrum grid is empty")]
    EmptySpectrum,
}
