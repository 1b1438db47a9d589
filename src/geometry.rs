//! Vectors, angle pairs and angle wrapping helpers

use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};

/// Speed of light used for wavelength and Doppler (m/s)
pub const SPEED_OF_LIGHT: f64 = 3e8;

/// 3D position or velocity in meters (or m/s)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance_to(&self, other: &Vector3) -> f64 {
        (*self - *other).norm()
    }

    pub fn distance_2d_to(&self, other: &Vector3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Unit direction for zenith `theta` and azimuth `phi` (radians)
    pub fn direction(theta: f64, phi: f64) -> Self {
        Self {
            x: theta.sin() * phi.cos(),
            y: theta.sin() * phi.sin(),
            z: theta.cos(),
        }
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f64) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<(f64, f64, f64)> for Vector3 {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self::new(x, y, z)
    }
}

/// Azimuth `phi` in (-pi, pi] and zenith `theta` in [0, pi], radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angles {
    pub phi: f64,
    pub theta: f64,
}

impl Angles {
    /// Direction of `target` as seen from `origin`.
    ///
    /// Callers must reject coincident points first; the zenith is undefined
    /// at zero distance.
    pub fn between(target: &Vector3, origin: &Vector3) -> Self {
        let d = *target - *origin;
        let r = d.norm();
        Self {
            phi: d.y.atan2(d.x),
            theta: (d.z / r).acos(),
        }
    }

    pub fn phi_degrees(&self) -> f64 {
        self.phi.to_degrees()
    }

    pub fn theta_degrees(&self) -> f64 {
        self.theta.to_degrees()
    }
}

/// Wrap an azimuth into [0, 360] degrees
pub fn wrap_azimuth_degrees(mut angle: f64) -> f64 {
    while angle > 360.0 {
        angle -= 360.0;
    }
    while angle < 0.0 {
        angle += 360.0;
    }
    angle
}

/// Wrap a zenith into [0, 180] degrees, reflecting angles past 180
pub fn wrap_zenith_degrees(angle: f64) -> f64 {
    let wrapped = wrap_azimuth_degrees(angle);
    if wrapped > 180.0 {
        360.0 - wrapped
    } else {
        wrapped
    }
}

/// Plane-wave phase ramp `2*pi * (r_hat . location)` for an element location
/// given in wavelengths.
pub fn phase_ramp(theta: f64, phi: f64, location: &Vector3) -> f64 {
    2.0 * PI * Vector3::direction(theta, phi).dot(location)
}

/// Complementary error function.
///
/// Abramowitz & Stegun 7.1.26, absolute error below 1.5e-7.
pub fn erfc(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.3275911 * x.abs());
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let result = poly * (-x * x).exp();
    if x >= 0.0 {
        result
    } else {
        2.0 - result
    }
}
