//! Geometric steering toward the straight-line direction of the peer

use rustfft::num_complex::Complex64;

use crate::antenna::{AntennaArray, BeamId, BeamformingVector};
use crate::geometry::{phase_ramp, Angles, Vector3};

/// Equal-magnitude phase-steering vector from `own` toward `other`.
///
/// Positions must differ.
pub fn steering_vector(array: &AntennaArray, own: Vector3, other: Vector3) -> BeamformingVector {
    let d = other - own;
    let azimuth = d.y.atan2(d.x);
    let zenith = Angles::between(&other, &own).theta;
    let power = 1.0 / (array.element_count() as f64).sqrt();

    let weights = array
        .element_locations()
        .iter()
        .map(|loc| Complex64::from_polar(power, -phase_ramp(zenith, azimuth, loc)))
        .collect();

    BeamformingVector::new(
        weights,
        BeamId::geometric(azimuth.to_degrees(), zenith.to_degrees()),
    )
}
