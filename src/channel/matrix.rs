//! One channel realization and the handle returned to callers

use std::sync::Arc;
use std::time::Duration;

use rustfft::num_complex::Complex64;

use super::blockage::NonSelfBlocker;
use crate::error::{MmWaveError, MmWaveResult};
use crate::geometry::Vector3;

/// Per-cluster angles in degrees, sub-clusters appended at the end
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterAngles {
    pub aoa: Vec<f64>,
    pub zoa: Vec<f64>,
    pub aod: Vec<f64>,
    pub zod: Vec<f64>,
}

impl ClusterAngles {
    pub fn len(&self) -> usize {
        self.aoa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aoa.is_empty()
    }

    pub(crate) fn push_copy_of(&mut self, cluster: usize) {
        self.aoa.push(self.aoa[cluster]);
        self.zoa.push(self.zoa[cluster]);
        self.aod.push(self.aod[cluster]);
        self.zod.push(self.zod[cluster]);
    }
}

/// Channel tensor between the tx array (generation-time `a`) and the rx
/// array (generation-time `b`).
///
/// Immutable once built; shared between both directions of the link.
#[derive(Debug, Clone)]
pub struct ChannelMatrix {
    /// H[u][s][n]: rx element, tx element, cluster
    pub coefficients: Vec<Vec<Vec<Complex64>>>,
    /// Cluster delays (seconds)
    pub delays: Vec<f64>,
    pub angles: ClusterAngles,
    pub los: bool,
    pub o2i: bool,
    pub generated_at: Duration,
    /// Delay spread (seconds)
    pub delay_spread: f64,
    /// Ricean K-factor (dB), 0 in NLOS
    pub k_factor_db: f64,
    /// Clusters left after pruning, before sub-cluster splitting
    pub num_reduced_clusters: usize,
    /// Normalized power of each retained cluster after blockage
    pub cluster_powers: Vec<f64>,
    pub cluster_phases: Vec<Vec<f64>>,
    pub los_phase: f64,
    pub blockers: Vec<NonSelfBlocker>,
    pub ut_location: Vector3,
}

impl ChannelMatrix {
    pub fn rx_elements(&self) -> usize {
        self.coefficients.len()
    }

    pub fn tx_elements(&self) -> usize {
        self.coefficients.first().map_or(0, |row| row.len())
    }

    /// Cluster dimension including sub-clusters
    pub fn num_clusters(&self) -> usize {
        self.delays.len()
    }

    /// Check the tensor against arrays of `rx` and `tx` elements
    pub fn check_dimensions(&self, rx: usize, tx: usize) -> MmWaveResult<()> {
        if self.rx_elements() != rx || self.tx_elements() != tx {
            return Err(MmWaveError::AntennaDimensionMismatch {
                expected_rx: rx,
                expected_tx: tx,
                actual_rx: self.rx_elements(),
                actual_tx: self.tx_elements(),
            });
        }
        Ok(())
    }
}

/// A cached realization as seen from one direction of the link.
///
/// When `reverse` is set the caller's `a` was the realization's receiver, so
/// the tensor must be indexed `[s][u]`.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    pub matrix: Arc<ChannelMatrix>,
    pub reverse: bool,
}

impl ChannelLink {
    /// Coefficient for the caller's (rx element, tx element, cluster)
    pub fn coefficient(&self, rx: usize, tx: usize, cluster: usize) -> Complex64 {
        if self.reverse {
            self.matrix.coefficients[tx][rx][cluster]
        } else {
            self.matrix.coefficients[rx][tx][cluster]
        }
    }

    /// Check against the caller's arrays
    pub fn check_dimensions(&self, rx: usize, tx: usize) -> MmWaveResult<()> {
        if self.reverse {
            self.matrix.check_dimensions(tx, rx)
        } else {
            self.matrix.check_dimensions(rx, tx)
        }
    }

    pub fn same_realization(&self, other: &ChannelLink) -> bool {
        Arc::ptr_eq(&self.matrix, &other.matrix)
    }
}
