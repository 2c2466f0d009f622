//! Waypoint course generation.
//!
//! The base course is fixed ([`FIXED_WAYPOINTS`]). Each episode it is
//! rotated about world z by a uniform yaw (optional), each point is then
//! perturbed per axis by U(−N, N) (optional), and z is clamped to at least
//! [`MIN_WAYPOINT_ALTITUDE`].

use std::f64::consts::TAU;

use rand::Rng;

use crate::constants::{FIXED_WAYPOINTS, MIN_WAYPOINT_ALTITUDE, NUM_WAYPOINTS};
use crate::types::{Vec3, WorldFrame};

/// One episode's ordered waypoints and the yaw applied to the base course.
#[derive(Clone, Debug, PartialEq)]
pub struct WaypointCourse {
    points: Vec<Vec3<WorldFrame>>,
    yaw: f64,
}

impl WaypointCourse {
    /// The unrotated, unperturbed base course.
    pub fn fixed() -> Self {
        Self {
            points: FIXED_WAYPOINTS.iter().map(|&p| Vec3::from_array(p)).collect(),
            yaw: 0.0,
        }
    }

    /// Build a course, rotating then perturbing the base points.
    ///
    /// Draw order: yaw (if enabled), then x, y, z noise per point.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, noise: f64, yaw_random: bool) -> Self {
        let yaw = if yaw_random {
            rng.gen_range(0.0..TAU)
        } else {
            0.0
        };
        let (sin_yaw, cos_yaw) = yaw.sin_cos();

        let points = FIXED_WAYPOINTS
            .iter()
            .map(|&[x, y, z]| {
                let mut wp = [x * cos_yaw - y * sin_yaw, x * sin_yaw + y * cos_yaw, z];
                if noise > 0.0 {
                    for c in wp.iter_mut() {
                        *c += rng.gen_range(-noise..noise);
                    }
                    wp[2] = wp[2].max(MIN_WAYPOINT_ALTITUDE);
                }
                Vec3::from_array(wp)
            })
            .collect();

        Self { points, yaw }
    }

    /// Waypoint `idx`, clamped to the last point.
    #[inline]
    pub fn get(&self, idx: usize) -> Vec3<WorldFrame> {
        self.points[idx.min(NUM_WAYPOINTS - 1)]
    }

    pub fn points(&self) -> &[Vec3<WorldFrame>] {
        &self.points
    }

    pub fn as_arrays(&self) -> Vec<[f64; 3]> {
        self.points.iter().map(|p| p.as_array()).collect()
    }

    /// Applied yaw (radians).
    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Default for WaypointCourse {
    fn default() -> Self {
        Self::fixed()
    }
}
