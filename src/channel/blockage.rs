//! Blockage model A (3GPP TR 38.901 section 7.6.4.1)
//!
//! Two kinds of obstruction:
//! - Self-blocking: a fixed angular region behind the handset (the user's body)
//! - Non-self blocking: a handful of obstacles whose azimuth drifts as an
//!   AR(1) process correlated in UT displacement and time
//!
//! Blocker state lives on the channel matrix so it carries over to the next
//! realization of the same link.

use std::f64::consts::PI;

use tracing::debug;

use super::params::Scenario;
use crate::config::ChannelConfig;
use crate::geometry::{erfc, SPEED_OF_LIGHT};
use crate::rng::RandomSource;

/// Flat penalty for a cluster inside the self-blocking region (dB)
const SELF_BLOCKING_LOSS_DB: f64 = 30.0;

/// Angular keep-out region of the user's body (table 7.6.4.1-1), degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfBlockingRegion {
    pub phi: f64,
    pub x: f64,
    pub theta: f64,
    pub y: f64,
}

impl SelfBlockingRegion {
    pub const PORTRAIT: SelfBlockingRegion = SelfBlockingRegion {
        phi: 260.0,
        x: 120.0,
        theta: 100.0,
        y: 80.0,
    };

    pub const LANDSCAPE: SelfBlockingRegion = SelfBlockingRegion {
        phi: 40.0,
        x: 160.0,
        theta: 110.0,
        y: 75.0,
    };

    fn contains(&self, aoa: f64, zoa: f64) -> bool {
        (aoa - self.phi).abs() < self.x / 2.0 && (zoa - self.theta).abs() < self.y / 2.0
    }
}

/// One non-self blocker (table 7.6.4.1-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonSelfBlocker {
    /// Gaussian state, mapped to a uniform azimuth in [0, 360)
    pub phi_normal: f64,
    /// Azimuth width (degrees)
    pub x: f64,
    /// Zenith centre (degrees)
    pub theta: f64,
    /// Zenith height (degrees)
    pub y: f64,
    /// Distance to the UT (meters)
    pub r: f64,
}

impl NonSelfBlocker {
    /// Azimuth centre in degrees
    pub fn phi(&self) -> f64 {
        let mut phi = 0.5 * erfc(-self.phi_normal / 2f64.sqrt()) * 360.0;
        while phi > 360.0 {
            phi -= 360.0;
        }
        while phi < 0.0 {
            phi += 360.0;
        }
        phi
    }

    /// Diffraction loss in dB for a cluster arriving at (aoa, zoa), or `None`
    /// when the cluster misses this blocker.
    fn loss_db(&self, aoa: f64, zoa: f64, wavelength: f64) -> Option<f64> {
        let phi = self.phi();
        let da = aoa - phi;
        let dz = zoa - self.theta;
        if da.abs() >= self.x || dz.abs() >= self.y {
            return None;
        }

        let a1 = aoa - (phi + self.x / 2.0);
        let a2 = aoa - (phi - self.x / 2.0);
        let z1 = zoa - (self.theta + self.y / 2.0);
        let z2 = zoa - (self.theta - self.y / 2.0);

        // Table 7.6.4.1-3
        let sign_a1 = if self.x / 2.0 < da && da <= self.x { -1.0 } else { 1.0 };
        let sign_a2 = if -self.x < da && da <= -self.x / 2.0 { -1.0 } else { 1.0 };
        let sign_z1 = if self.y / 2.0 < dz && dz <= self.y { -1.0 } else { 1.0 };
        let sign_z2 = if -self.y < dz && dz <= -self.y / 2.0 { -1.0 } else { 1.0 };

        let f = |sign: f64, angle_deg: f64| {
            let edge = PI / wavelength * self.r * (1.0 / angle_deg.to_radians().cos() - 1.0);
            (sign * PI / 2.0 * edge.sqrt()).atan() / PI
        };

        let shadow = (f(sign_a1, a1) + f(sign_a2, a2)) * (f(sign_z1, z1) + f(sign_z2, z2));
        Some(-20.0 * (1.0 - shadow).log10())
    }
}

/// Blockage settings for one generator
#[derive(Debug, Clone)]
pub struct BlockageModel {
    scenario: Scenario,
    num_blockers: usize,
    self_region: SelfBlockingRegion,
    blocker_speed: f64,
}

impl BlockageModel {
    pub fn new(scenario: Scenario, config: &ChannelConfig) -> Self {
        Self {
            scenario,
            num_blockers: config.num_non_self_blocking as usize,
            self_region: if config.portrait_mode {
                SelfBlockingRegion::PORTRAIT
            } else {
                SelfBlockingRegion::LANDSCAPE
            },
            blocker_speed: config.blocker_speed,
        }
    }

    pub fn self_region(&self) -> SelfBlockingRegion {
        self.self_region
    }

    /// Draw a fresh set of blockers
    pub fn spawn_blockers(&self, rng: &mut RandomSource) -> Vec<NonSelfBlocker> {
        (0..self.num_blockers)
            .map(|_| {
                let phi_normal = rng.normal();
                if self.scenario.is_indoor() {
                    NonSelfBlocker {
                        phi_normal,
                        x: rng.uniform_range(15.0, 45.0),
                        theta: 90.0,
                        y: rng.uniform_range(5.0, 15.0),
                        r: 2.0,
                    }
                } else {
                    NonSelfBlocker {
                        phi_normal,
                        x: rng.uniform_range(5.0, 15.0),
                        theta: 90.0,
                        y: 5.0,
                        r: 10.0,
                    }
                }
            })
            .collect()
    }

    /// Advance carried-over blockers by `displacement` meters of UT motion
    /// and `elapsed_s` seconds.
    pub fn update_blockers(
        &self,
        blockers: &mut [NonSelfBlocker],
        displacement: f64,
        elapsed_s: f64,
        o2i: bool,
        rng: &mut RandomSource,
    ) {
        let moving = self.blocker_speed > 1e-6;
        if displacement <= 1e-6 && !moving {
            return;
        }

        // Table 7.6.4.1-4
        let corr_distance = if self.scenario.is_indoor() || o2i { 5.0 } else { 10.0 };

        let mut r = if moving {
            let corr_time = corr_distance / self.blocker_speed;
            (-(displacement / corr_distance + elapsed_s / corr_time)).exp()
        } else {
            (-(displacement / corr_distance)).exp()
        };

        // Compensates the correlation lost in the normal-to-uniform mapping
        let mapped = -0.069 * r * r + 1.074 * r - 0.002;
        if mapped < 1.0 {
            r = mapped;
        }

        debug!(displacement, elapsed_s, correlation = r, "updating non-self blockers");

        let innovation = (1.0 - r * r).max(0.0).sqrt();
        for blocker in blockers.iter_mut() {
            blocker.phi_normal = r * blocker.phi_normal + innovation * rng.normal();
        }
    }

    /// Per-cluster attenuation in dB. Angles are wrapped cluster AOA/ZOA in
    /// degrees.
    pub fn attenuation_db(
        &self,
        blockers: &[NonSelfBlocker],
        cluster_aoa: &[f64],
        cluster_zoa: &[f64],
        frequency_hz: f64,
    ) -> Vec<f64> {
        let wavelength = SPEED_OF_LIGHT / frequency_hz;

        cluster_aoa
            .iter()
            .zip(cluster_zoa)
            .enumerate()
            .map(|(cluster, (&aoa, &zoa))| {
                let mut loss = 0.0;
                if self.self_region.contains(aoa, zoa) {
                    loss += SELF_BLOCKING_LOSS_DB;
                    debug!(cluster, "cluster inside self-blocking region");
                }
                for blocker in blockers {
                    if let Some(l) = blocker.loss_db(aoa, zoa, wavelength) {
                        debug!(cluster, loss_db = l, "cluster behind non-self blocker");
                        loss += l;
                    }
                }
                loss
            })
            .collect()
    }
}
