//! Fast-fading realization, TR 38.901 section 7.5 steps 4 to 11

use std::f64::consts::PI;
use std::time::Duration;

use rustfft::num_complex::Complex64;

use super::blockage::{BlockageModel, NonSelfBlocker};
use super::matrix::{ChannelMatrix, ClusterAngles};
use super::params::{
    azimuth_scaling, zenith_scaling, ParamsTable, CLUSTER_PRUNE_THRESHOLD, MAX_AZIMUTH_SPREAD,
    MAX_ZENITH_SPREAD, RAY_OFFSETS,
};
use crate::antenna::AntennaArray;
use crate::error::MmWaveResult;
use crate::geometry::{wrap_azimuth_degrees, wrap_zenith_degrees, Angles, Vector3};
use crate::propagation::ChannelCondition;
use crate::rng::{shuffle_with_seed, RandomSource};

/// Geometry of the link at generation time
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkGeometry {
    /// Direction of the receiver seen from the transmitter
    pub tx_angle: Angles,
    /// Direction of the transmitter seen from the receiver
    pub rx_angle: Angles,
    pub distance_2d: f64,
    pub h_bs: f64,
    pub h_ut: f64,
    pub ut_location: Vector3,
}

/// Large-scale parameters of one realization. Spreads in seconds and degrees.
#[derive(Debug, Clone, Copy)]
struct LargeScale {
    k_factor_db: f64,
    ds: f64,
    asd: f64,
    asa: f64,
    zsd: f64,
    zsa: f64,
}

impl LargeScale {
    fn draw(table: &ParamsTable, los: bool, rng: &mut RandomSource) -> Self {
        let independent: Vec<f64> = (0..table.sqrt_c.size()).map(|_| rng.normal()).collect();
        let lsp = table.sqrt_c.correlate(&independent);

        // NLOS drops K from the vector, shifting every later field down
        let (k_factor_db, rest) = if los {
            (lsp[1] * table.sig_k + table.u_k, &lsp[2..])
        } else {
            (0.0, &lsp[1..])
        };
        let log_normal = |x: f64, sig: f64, mu: f64| 10f64.powf(x * sig + mu);

        Self {
            k_factor_db,
            ds: log_normal(rest[0], table.sig_lg_ds, table.u_lg_ds),
            asd: log_normal(rest[1], table.sig_lg_asd, table.u_lg_asd).min(MAX_AZIMUTH_SPREAD),
            asa: log_normal(rest[2], table.sig_lg_asa, table.u_lg_asa).min(MAX_AZIMUTH_SPREAD),
            zsd: log_normal(rest[3], table.sig_lg_zsd, table.u_lg_zsd).min(MAX_ZENITH_SPREAD),
            zsa: log_normal(rest[4], table.sig_lg_zsa, table.u_lg_zsa).min(MAX_ZENITH_SPREAD),
        }
    }
}

/// Ray angles in radians, `[cluster][ray]`
struct RayAngles {
    aoa: Vec<Vec<f64>>,
    zoa: Vec<Vec<f64>>,
    aod: Vec<Vec<f64>>,
    zod: Vec<Vec<f64>>,
}

/// Everything one realization depends on
pub(crate) struct Realization<'a> {
    pub table: &'a ParamsTable,
    pub condition: ChannelCondition,
    pub geometry: LinkGeometry,
    pub tx_array: &'a AntennaArray,
    pub rx_array: &'a AntennaArray,
    pub frequency_hz: f64,
    pub now: Duration,
    pub blockage: Option<&'a BlockageModel>,
    /// Expired realization of the same link, source of correlated blockers
    pub previous: Option<&'a ChannelMatrix>,
}

impl Realization<'_> {
    pub fn generate(&self, rng: &mut RandomSource) -> MmWaveResult<ChannelMatrix> {
        let table = self.table;
        let los = self.condition.los;
        let num_clusters = table.num_clusters;
        let rays = table.rays_per_cluster;

        // Step 4
        let lsp = LargeScale::draw(table, los, rng);
        let k_linear = 10f64.powf(lsp.k_factor_db / 10.0);

        // Step 5: delays, LOS scaling is applied after pruning
        let mut delays: Vec<f64> = (0..num_clusters)
            .map(|_| -table.r_tau * lsp.ds * rng.uniform().ln())
            .collect();
        let min_delay = delays.iter().copied().fold(f64::INFINITY, f64::min);
        for tau in delays.iter_mut() {
            *tau -= min_delay;
        }
        delays.sort_by(|a, b| a.total_cmp(b));

        // Step 6: powers
        let mut powers: Vec<f64> = delays
            .iter()
            .map(|tau| {
                (-tau * (table.r_tau - 1.0) / table.r_tau / lsp.ds).exp()
                    * 10f64.powf(-rng.normal() * table.shadowing_std / 10.0)
            })
            .collect();
        let total: f64 = powers.iter().sum();
        for p in powers.iter_mut() {
            *p /= total;
        }

        // Cluster 0 carries the specular term for angle generation only
        let angle_powers: Vec<f64> = if los {
            powers
                .iter()
                .enumerate()
                .map(|(n, p)| {
                    let diffuse = p / (1.0 + k_linear);
                    if n == 0 {
                        diffuse + k_linear / (1.0 + k_linear)
                    } else {
                        diffuse
                    }
                })
                .collect()
        } else {
            powers.clone()
        };
        let power_max = angle_powers.iter().copied().fold(0.0, f64::max);

        let keep: Vec<bool> = angle_powers
            .iter()
            .map(|p| *p >= CLUSTER_PRUNE_THRESHOLD * power_max)
            .collect();
        let angle_powers = retain(&angle_powers, &keep);
        let mut powers = retain(&powers, &keep);
        let mut delays = retain(&delays, &keep);
        let reduced = powers.len();

        if los {
            let k = lsp.k_factor_db;
            let c_tau = 0.7705 - 0.0433 * k + 2e-4 * k.powi(2) + 17e-6 * k.powi(3);
            for tau in delays.iter_mut() {
                *tau /= c_tau;
            }
        }

        // Step 7
        let mut angles = self.cluster_angles(&lsp, &angle_powers, power_max, rng)?;
        let ray_angles = self.ray_angles(&angles);
        wrap_cluster_angles(&mut angles);

        // Step 8 of the blockage procedure, applied before ray coupling
        let (blockers, los_attenuation_db) = match self.blockage {
            Some(model) => {
                let blockers = self.blockers(model, rng);
                let attenuation =
                    model.attenuation_db(&blockers, &angles.aoa, &angles.zoa, self.frequency_hz);
                for (p, loss) in powers.iter_mut().zip(&attenuation) {
                    *p /= 10f64.powf(loss / 10.0);
                }
                (blockers, attenuation.first().copied().unwrap_or(0.0))
            }
            None => (Vec::new(), 0.0),
        };

        // Step 8: random coupling of rays
        let mut ray_angles = ray_angles;
        for n in 0..reduced {
            let base = n as u64 * 1000;
            shuffle_with_seed(&mut ray_angles.aod[n], base + 100);
            shuffle_with_seed(&mut ray_angles.aoa[n], base + 200);
            shuffle_with_seed(&mut ray_angles.zod[n], base + 300);
            shuffle_with_seed(&mut ray_angles.zoa[n], base + 400);
        }

        // Step 9 (cross polarization) is skipped: vertical polarization only

        // Step 10
        let cluster_phases: Vec<Vec<f64>> = (0..reduced)
            .map(|_| (0..rays).map(|_| rng.uniform_range(-PI, PI)).collect())
            .collect();
        let los_phase = rng.uniform_range(-PI, PI);

        // Step 11
        let (strongest, second) = strongest_clusters(&powers);
        let mut coefficients = self.cluster_coefficients(
            &ray_angles,
            &cluster_phases,
            &powers,
            strongest,
            second,
        );
        if los {
            self.add_specular_ray(&mut coefficients, k_linear, los_phase, los_attenuation_db);
        }

        // Sub-cluster delays and angles, in the order their coefficients were pushed
        let sub_sources = if strongest == second {
            vec![strongest]
        } else {
            vec![strongest.min(second), strongest.max(second)]
        };
        for &n in &sub_sources {
            let tau = delays[n];
            delays.push(tau + 1.28 * table.c_ds);
            delays.push(tau + 2.56 * table.c_ds);
            angles.push_copy_of(n);
            angles.push_copy_of(n);
        }

        Ok(ChannelMatrix {
            coefficients,
            delays,
            angles,
            los,
            o2i: self.condition.o2i,
            generated_at: self.now,
            delay_spread: lsp.ds,
            k_factor_db: lsp.k_factor_db,
            num_reduced_clusters: reduced,
            cluster_powers: powers,
            cluster_phases,
            los_phase,
            blockers,
            ut_location: self.geometry.ut_location,
        })
    }

    /// Cluster angles in degrees, before wrapping
    fn cluster_angles(
        &self,
        lsp: &LargeScale,
        angle_powers: &[f64],
        power_max: f64,
        rng: &mut RandomSource,
    ) -> MmWaveResult<ClusterAngles> {
        let table = self.table;
        let los = self.condition.los;
        let k = lsp.k_factor_db;

        // Shape factors are keyed by the table cluster count, not the pruned one
        let mut c_phi = azimuth_scaling(table.num_clusters)?;
        let mut c_theta = zenith_scaling(table.num_clusters)?;
        if los {
            c_phi *= 1.1035 - 0.028 * k - 2e-3 * k.powi(2) + 1e-4 * k.powi(3);
            c_theta *= 1.3086 + 0.0339 * k - 0.0077 * k.powi(2) + 2e-4 * k.powi(3);
        }

        let rx_phi = self.geometry.rx_angle.phi_degrees();
        let rx_theta = self.geometry.rx_angle.theta_degrees();
        let tx_phi = self.geometry.tx_angle.phi_degrees();
        let tx_theta = self.geometry.tx_angle.theta_degrees();

        let mut angles = ClusterAngles::default();
        for &p in angle_powers {
            let ln_ratio = (p / power_max).ln();
            let azimuth_shape = (-ln_ratio).sqrt() / 1.4 / c_phi;
            let zenith_shape = -ln_ratio / c_theta;

            let xn = if rng.uniform() < 0.5 { -1.0 } else { 1.0 };
            let aoa = 2.0 * lsp.asa * azimuth_shape * xn + rng.normal() * lsp.asa / 7.0 + rx_phi;
            let aod = 2.0 * lsp.asd * azimuth_shape * xn + rng.normal() * lsp.asd / 7.0 + tx_phi;
            let zoa_centre = if self.condition.o2i { 90.0 } else { rx_theta };
            let zoa = lsp.zsa * zenith_shape * xn + rng.normal() * lsp.zsa / 7.0 + zoa_centre;
            let zod = lsp.zsd * zenith_shape * xn
                + rng.normal() * lsp.zsd / 7.0
                + tx_theta
                + table.offset_zod;

            angles.aoa.push(aoa);
            angles.aod.push(aod);
            angles.zoa.push(zoa);
            angles.zod.push(zod);
        }

        if los {
            // Pin cluster 0 to the geometric LOS direction
            let diff_aoa = angles.aoa[0] - rx_phi;
            let diff_aod = angles.aod[0] - tx_phi;
            let diff_zoa = angles.zoa[0] - rx_theta;
            let diff_zod = angles.zod[0] - tx_theta;
            for n in 0..angles.len() {
                angles.aoa[n] -= diff_aoa;
                angles.aod[n] -= diff_aod;
                angles.zoa[n] -= diff_zoa;
                angles.zod[n] -= diff_zod;
            }
        }

        Ok(angles)
    }

    /// Step 6 of 7.5: spread each cluster into rays, wrapped and in radians
    fn ray_angles(&self, angles: &ClusterAngles) -> RayAngles {
        let table = self.table;
        let zod_spread = 0.375 * 10f64.powf(table.u_lg_zsd);
        let offsets = &RAY_OFFSETS[..table.rays_per_cluster];

        let spread = |centres: &[f64], scale: f64, wrap: fn(f64) -> f64| -> Vec<Vec<f64>> {
            centres
                .iter()
                .map(|c| {
                    offsets
                        .iter()
                        .map(|alpha| wrap(c + scale * alpha).to_radians())
                        .collect()
                })
                .collect()
        };

        RayAngles {
            aoa: spread(&angles.aoa, table.c_asa, wrap_azimuth_degrees),
            aod: spread(&angles.aod, table.c_asd, wrap_azimuth_degrees),
            zoa: spread(&angles.zoa, table.c_zsa, wrap_zenith_degrees),
            zod: spread(&angles.zod, zod_spread, wrap_zenith_degrees),
        }
    }

    fn blockers(&self, model: &BlockageModel, rng: &mut RandomSource) -> Vec<NonSelfBlocker> {
        match self.previous {
            Some(previous) if !previous.blockers.is_empty() => {
                let mut blockers = previous.blockers.clone();
                let displacement = previous
                    .ut_location
                    .distance_2d_to(&self.geometry.ut_location);
                let elapsed = self.now.saturating_sub(previous.generated_at).as_secs_f64();
                model.update_blockers(
                    &mut blockers,
                    displacement,
                    elapsed,
                    self.condition.o2i,
                    rng,
                );
                blockers
            }
            _ => model.spawn_blockers(rng),
        }
    }

    /// Equation 7.5-22 for weak clusters and 7.5-28 for the two strongest,
    /// which are split into three sub-clusters appended in cluster order.
    fn cluster_coefficients(
        &self,
        rays: &RayAngles,
        phases: &[Vec<f64>],
        powers: &[f64],
        strongest: usize,
        second: usize,
    ) -> Vec<Vec<Vec<Complex64>>> {
        let rays_per_cluster = self.table.rays_per_cluster;
        let reduced = powers.len();

        // Per-ray terms that do not depend on the element pair
        let mut ray_gain = Vec::with_capacity(reduced);
        let mut rx_dir = Vec::with_capacity(reduced);
        let mut tx_dir = Vec::with_capacity(reduced);
        for n in 0..reduced {
            let mut gain = Vec::with_capacity(rays_per_cluster);
            let mut rx = Vec::with_capacity(rays_per_cluster);
            let mut tx = Vec::with_capacity(rays_per_cluster);
            for m in 0..rays_per_cluster {
                let pattern = self.rx_array.radiation_pattern(rays.zoa[n][m], rays.aoa[n][m])
                    * self.tx_array.radiation_pattern(rays.zod[n][m], rays.aod[n][m]);
                gain.push(Complex64::from_polar(pattern, phases[n][m]));
                rx.push(Vector3::direction(rays.zoa[n][m], rays.aoa[n][m]) * (2.0 * PI));
                tx.push(Vector3::direction(rays.zod[n][m], rays.aod[n][m]) * (2.0 * PI));
            }
            ray_gain.push(gain);
            rx_dir.push(rx);
            tx_dir.push(tx);
        }

        let scales: Vec<f64> = powers
            .iter()
            .map(|p| (p / rays_per_cluster as f64).sqrt())
            .collect();
        let rx_locations = self.rx_array.element_locations();
        let tx_locations = self.tx_array.element_locations();

        rx_locations
            .iter()
            .map(|u_loc| {
                tx_locations
                    .iter()
                    .map(|s_loc| {
                        let mut row = vec![Complex64::new(0.0, 0.0); reduced];
                        for n in 0..reduced {
                            let mut sub = [Complex64::new(0.0, 0.0); 3];
                            for m in 0..rays_per_cluster {
                                let phase = rx_dir[n][m].dot(u_loc) + tx_dir[n][m].dot(s_loc);
                                let ray = ray_gain[n][m] * Complex64::from_polar(1.0, phase);
                                sub[sub_cluster_of(m)] += ray;
                            }
                            if n != strongest && n != second {
                                row[n] = (sub[0] + sub[1] + sub[2]) * scales[n];
                            } else {
                                row[n] = sub[0] * scales[n];
                                row.push(sub[1] * scales[n]);
                                row.push(sub[2] * scales[n]);
                            }
                        }
                        row
                    })
                    .collect()
            })
            .collect()
    }

    /// Equation 7.5-30: blend the specular ray into the first cluster
    fn add_specular_ray(
        &self,
        coefficients: &mut [Vec<Vec<Complex64>>],
        k_linear: f64,
        los_phase: f64,
        attenuation_db: f64,
    ) {
        let rx = self.geometry.rx_angle;
        let tx = self.geometry.tx_angle;
        let pattern = self.rx_array.radiation_pattern(rx.theta, rx.phi)
            * self.tx_array.radiation_pattern(tx.theta, tx.phi);
        let rx_dir = Vector3::direction(rx.theta, rx.phi) * (2.0 * PI);
        let tx_dir = Vector3::direction(tx.theta, tx.phi) * (2.0 * PI);

        let diffuse = (1.0 / (k_linear + 1.0)).sqrt();
        let specular = (k_linear / (k_linear + 1.0)).sqrt() / 10f64.powf(attenuation_db / 10.0);

        let rx_locations = self.rx_array.element_locations();
        let tx_locations = self.tx_array.element_locations();
        for (u_loc, row) in rx_locations.iter().zip(coefficients.iter_mut()) {
            for (s_loc, clusters) in tx_locations.iter().zip(row.iter_mut()) {
                let phase = los_phase + rx_dir.dot(u_loc) + tx_dir.dot(s_loc);
                let ray = Complex64::from_polar(pattern, phase);
                for (n, h) in clusters.iter_mut().enumerate() {
                    *h *= diffuse;
                    if n == 0 {
                        *h += ray * specular;
                    }
                }
            }
        }
    }
}

/// Sub-cluster of a ray within one of the two strongest clusters
/// (table 7.5-5, 0-based ray index).
fn sub_cluster_of(ray: usize) -> usize {
    match ray {
        9 | 10 | 11 | 12 | 17 | 18 => 1,
        13..=16 => 2,
        _ => 0,
    }
}

/// Indices of the strongest and second strongest clusters. With a single
/// cluster both are 0.
fn strongest_clusters(powers: &[f64]) -> (usize, usize) {
    let mut first = 0;
    let mut max = 0.0;
    for (n, &p) in powers.iter().enumerate() {
        if p > max {
            max = p;
            first = n;
        }
    }
    let mut second = 0;
    let mut max = 0.0;
    for (n, &p) in powers.iter().enumerate() {
        if n != first && p > max {
            max = p;
            second = n;
        }
    }
    (first, second)
}

fn retain(values: &[f64], keep: &[bool]) -> Vec<f64> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(&v, _)| v)
        .collect()
}

fn wrap_cluster_angles(angles: &mut ClusterAngles) {
    for a in angles.aoa.iter_mut().chain(angles.aod.iter_mut()) {
        *a = wrap_azimuth_degrees(*a);
    }
    for z in angles.zoa.iter_mut().chain(angles.zod.iter_mut()) {
        *z = wrap_zenith_degrees(*z);
    }
}
