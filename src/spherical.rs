//! # Spherical geometry utilities
//!
//! Pure functions shared by the correspondence engine and the kernel
//! smoother:
//!
//! - great-circle distance and directional difference between horizontal
//!   sky positions ([`angular_distance`], [`angular_difference`]),
//! - the bijective flattening of the visible hemisphere onto the unit disk
//!   ([`altaz_to_disk`], [`disk_to_altaz`]), the smoother's working domain.
//!
//! All angles are radians. Azimuth is measured from north through east and
//! normalized to [0, 2π); altitude is positive above the horizon.

use nalgebra::Vector2;

use crate::constants::{DPI, HALF_PI, Radian};

/// A horizontal sky position: altitude above the horizon and azimuth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltAz {
    pub alt: Radian,
    pub az: Radian,
}

impl AltAz {
    pub fn new(alt: Radian, az: Radian) -> Self {
        AltAz { alt, az }
    }

    /// Zenith distance (co-altitude), the pole-safe complement of altitude.
    pub fn zenith_distance(&self) -> Radian {
        HALF_PI - self.alt
    }
}

/// Normalize an angle to [0, 2π).
pub fn normalize_azimuth(angle: Radian) -> Radian {
    angle.rem_euclid(DPI)
}

/// Wrap an angle to (−π, π].
pub fn wrap_symmetric(angle: Radian) -> Radian {
    let wrapped = angle.rem_euclid(DPI);
    if wrapped > std::f64::consts::PI {
        wrapped - DPI
    } else {
        wrapped
    }
}

/// Great-circle distance between two horizontal sky positions.
///
/// Uses the haversine formulation, which stays numerically stable near zero
/// separation and near the poles where the plain law of cosines loses
/// precision.
///
/// Arguments
/// ---------
/// * `p`, `q`: the two positions.
///
/// Return
/// ------
/// * Separation in radians, in [0, π].
pub fn angular_distance(p: AltAz, q: AltAz) -> Radian {
    let half_dalt = ((q.alt - p.alt) / 2.0).sin();
    let half_daz = ((q.az - p.az) / 2.0).sin();
    let h = half_dalt * half_dalt + p.alt.cos() * q.alt.cos() * half_daz * half_daz;
    2.0 * h.sqrt().min(1.0).asin()
}

/// Directional difference between two horizontal sky positions.
///
/// Unlike [`angular_distance`] this keeps the two components apart: the
/// result is `(Δ zenith distance, Δ azimuth)` going from `p` to `q`. The
/// azimuth component is wrapped to (−π, π], so positions on either side of
/// the north direction produce a small residual rather than one of ±2π.
pub fn angular_difference(p: AltAz, q: AltAz) -> Vector2<f64> {
    Vector2::new(
        q.zenith_distance() - p.zenith_distance(),
        wrap_symmetric(q.az - p.az),
    )
}

/// Flatten a horizontal sky position onto the unit disk.
///
/// The zenith maps to the origin and the horizon to the unit circle; the
/// radial coordinate is linear in zenith distance. The x axis points east
/// and the y axis north. This is the working domain of the kernel smoother:
/// distances on the disk are well behaved everywhere the camera can see.
///
/// The exact inverse is [`disk_to_altaz`].
pub fn altaz_to_disk(position: AltAz) -> Vector2<f64> {
    let rho = position.zenith_distance() / HALF_PI;
    Vector2::new(rho * position.az.sin(), rho * position.az.cos())
}

/// Lift a point of the unit disk back onto the hemisphere.
///
/// Inverse of [`altaz_to_disk`] up to floating-point tolerance. Points
/// outside the unit disk map below the horizon; callers that need to reject
/// them should test `xy.norm() <= 1` beforehand.
pub fn disk_to_altaz(xy: Vector2<f64>) -> AltAz {
    let rho = xy.norm();
    let az = if rho == 0.0 {
        0.0
    } else {
        normalize_azimuth(xy.x.atan2(xy.y))
    };
    AltAz::new(HALF_PI - rho * HALF_PI, az)
}

#[cfg(test)]
mod spherical_test {
    use super::*;
    use crate::constants::RADEG;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_identity() {
        for (alt, az) in [(0.0, 0.0), (0.3, 1.0), (1.2, 4.5), (HALF_PI, 0.0)] {
            let p = AltAz::new(alt, az);
            assert_eq!(angular_distance(p, p), 0.0);
        }
    }

    #[test]
    fn test_distance_symmetry() {
        let p = AltAz::new(0.52, 1.1);
        let q = AltAz::new(1.05, 4.2);
        assert_relative_eq!(
            angular_distance(p, q),
            angular_distance(q, p),
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_distance_known_values() {
        // Horizon points 90° apart in azimuth
        let p = AltAz::new(0.0, 0.0);
        let q = AltAz::new(0.0, HALF_PI);
        assert_relative_eq!(angular_distance(p, q), HALF_PI, epsilon = 1e-12);

        // Zenith to horizon
        let zenith = AltAz::new(HALF_PI, 0.0);
        assert_relative_eq!(angular_distance(zenith, p), HALF_PI, epsilon = 1e-12);

        // Antipodal on the horizon
        let r = AltAz::new(0.0, std::f64::consts::PI);
        assert_relative_eq!(angular_distance(p, r), std::f64::consts::PI, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_stable_near_zero() {
        let p = AltAz::new(0.7, 2.0);
        let q = AltAz::new(0.7 + 1e-10, 2.0);
        let d = angular_distance(p, q);
        assert_relative_eq!(d, 1e-10, epsilon = 1e-15);
    }

    #[test]
    fn test_difference_wraps_azimuth() {
        let p = AltAz::new(0.5, 1.0 * RADEG);
        let q = AltAz::new(0.5, 359.0 * RADEG);
        let delta = angular_difference(p, q);
        assert_relative_eq!(delta.y, -2.0 * RADEG, epsilon = 1e-12);
        assert_relative_eq!(delta.x, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_disk_round_trip() {
        for alt_deg in [0.0, 10.0, 45.0, 80.0, 89.9] {
            for az_deg in [0.0, 90.0, 179.0, 270.0, 359.0] {
                let p = AltAz::new(alt_deg * RADEG, az_deg * RADEG);
                let back = disk_to_altaz(altaz_to_disk(p));
                assert_relative_eq!(back.alt, p.alt, epsilon = 1e-9);
                assert_relative_eq!(back.az, p.az, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_disk_landmarks() {
        // Zenith at the origin
        let zenith = altaz_to_disk(AltAz::new(HALF_PI, 1.23));
        assert_relative_eq!(zenith.norm(), 0.0, epsilon = 1e-15);

        // North horizon at (0, 1), east horizon at (1, 0)
        let north = altaz_to_disk(AltAz::new(0.0, 0.0));
        assert_relative_eq!(north.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(north.y, 1.0, epsilon = 1e-12);

        let east = altaz_to_disk(AltAz::new(0.0, HALF_PI));
        assert_relative_eq!(east.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(east.y, 0.0, epsilon = 1e-12);
    }
}
