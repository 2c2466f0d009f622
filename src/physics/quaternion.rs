//! Attitude math on scalar-first `[w, x, y, z]` quaternions.
//!
//! A quaternion here always maps body-frame vectors into the world frame.
//! The raw-array functions serve the integrator and the viewer; the typed
//! wrappers at the bottom are what the rest of the crate calls.

use crate::types::{BodyFrame, Rotation, UnitQuaternion, Vec3};

const IDENTITY: [f64; 4] = [1.0, 0.0, 0.0, 0.0];

/// Rescale to unit norm. Degenerate or non-finite input collapses to identity.
#[inline]
pub fn quat_normalize(q: [f64; 4]) -> [f64; 4] {
    let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
    if !norm.is_finite() || norm < 1e-12 {
        return IDENTITY;
    }
    q.map(|c| c / norm)
}

/// Hamilton product `a ⊗ b`.
#[inline]
pub fn quat_mul(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    let [aw, ax, ay, az] = a;
    let [bw, bx, by, bz] = b;
    [
        aw * bw - ax * bx - ay * by - az * bz,
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
    ]
}

/// Advance `q` by a constant body rate `omega` held for `dt` seconds.
///
/// Uses the exact exponential map, so a constant rate integrates without
/// drift; the result is renormalized.
#[inline]
pub fn quat_integrate(q: [f64; 4], omega: [f64; 3], dt: f64) -> [f64; 4] {
    let rate = omega.iter().map(|w| w * w).sum::<f64>().sqrt();
    if rate < 1e-12 {
        return quat_normalize(q);
    }
    let (sin_half, cos_half) = (0.5 * rate * dt).sin_cos();
    let k = sin_half / rate;
    let step = [cos_half, k * omega[0], k * omega[1], k * omega[2]];
    quat_normalize(quat_mul(q, step))
}

/// Row-major 3x3 rotation matrix of `q`.
#[inline]
pub fn quat_to_rotation_matrix(q: [f64; 4]) -> [f64; 9] {
    let [w, x, y, z] = q;
    let (x2, y2, z2) = (2.0 * x, 2.0 * y, 2.0 * z);
    [
        1.0 - y * y2 - z * z2,
        x * y2 - w * z2,
        x * z2 + w * y2,
        x * y2 + w * z2,
        1.0 - x * x2 - z * z2,
        y * z2 - w * x2,
        x * z2 - w * y2,
        y * z2 + w * x2,
        1.0 - x * x2 - y * y2,
    ]
}

/// Third column of the rotation matrix: where the rotor axis points.
#[inline]
pub fn quat_to_thrust_dir(q: [f64; 4]) -> [f64; 3] {
    let m = quat_to_rotation_matrix(q);
    [m[2], m[5], m[8]]
}

/// (roll, pitch, yaw) in the aerospace ZYX order.
pub fn quat_to_euler(q: [f64; 4]) -> [f64; 3] {
    let [w, x, y, z] = q;
    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    // asin saturates at gimbal lock
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
    [roll, pitch, yaw]
}

/// Inverse of [`quat_to_euler`] away from gimbal lock.
pub fn euler_to_quat([roll, pitch, yaw]: [f64; 3]) -> [f64; 4] {
    let (sr, cr) = (0.5 * roll).sin_cos();
    let (sp, cp) = (0.5 * pitch).sin_cos();
    let (sy, cy) = (0.5 * yaw).sin_cos();
    [
        cr * cp * cy + sr * sp * sy,
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
    ]
}

// ============================================================================
// Typed API
// ============================================================================

pub fn integrate_quaternion(q: UnitQuaternion, omega: Vec3<BodyFrame>, dt: f64) -> UnitQuaternion {
    UnitQuaternion::from_array(quat_integrate(q.as_array(), omega.as_array(), dt))
}

/// Angle in radians between the rotor axis and world up, in `[0, pi]`.
pub fn tilt_angle(q: UnitQuaternion) -> f64 {
    let up = quat_to_thrust_dir(quat_normalize(q.as_array()))[2];
    up.clamp(-1.0, 1.0).acos()
}

pub fn euler_to_quaternion(roll: f64, pitch: f64, yaw: f64) -> UnitQuaternion {
    UnitQuaternion::from_array(euler_to_quat([roll, pitch, yaw]))
}

pub fn quaternion_to_rotation(q: UnitQuaternion) -> Rotation {
    Rotation::from_matrix_unchecked(quat_to_rotation_matrix(q.as_array()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorldFrame;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn close(a: &[f64], b: &[f64], tol: f64) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_normalize_degenerate_is_identity() {
        assert_eq!(quat_normalize([0.0; 4]), IDENTITY);
        assert_eq!(quat_normalize([f64::NAN, 1.0, 0.0, 0.0]), IDENTITY);
    }

    #[test]
    fn test_mul_by_identity() {
        let q = quat_normalize([0.3, -0.2, 0.9, 0.1]);
        assert!(close(&quat_mul(IDENTITY, q), &q, 1e-12));
        assert!(close(&quat_mul(q, IDENTITY), &q, 1e-12));
    }

    #[test]
    fn test_constant_yaw_rate_integrates_exactly() {
        let mut q = IDENTITY;
        for _ in 0..250 {
            q = quat_integrate(q, [0.0, 0.0, 0.4], 0.01);
        }
        assert!((quat_to_euler(q)[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_body_rate_applies_in_body_axes() {
        // Yawed 90 degrees, a body roll rate turns about world y
        let q = quat_integrate(euler_to_quat([0.0, 0.0, FRAC_PI_2]), [0.5, 0.0, 0.0], 0.1);
        let dir = quat_to_thrust_dir(q);
        assert!(dir[0] > 0.04, "dir {:?}", dir);
        assert!(dir[1].abs() < 1e-9, "dir {:?}", dir);
    }

    #[test]
    fn test_euler_round_trip() {
        let rpy = [-0.4, 0.25, 2.0];
        assert!(close(&quat_to_euler(euler_to_quat(rpy)), &rpy, 1e-12));
    }

    #[test]
    fn test_tilt_ignores_yaw() {
        assert!((tilt_angle(euler_to_quaternion(0.3, 0.0, 1.2)) - 0.3).abs() < 1e-12);
        assert!((tilt_angle(euler_to_quaternion(PI, 0.0, 0.0)) - PI).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_maps_world_x_to_body_minus_y_after_left_yaw() {
        let rot = quaternion_to_rotation(euler_to_quaternion(0.0, 0.0, FRAC_PI_2));
        let body = rot.world_to_body(Vec3::<WorldFrame>::new(1.0, 0.0, 0.0));
        assert!(close(&body.as_array(), &[0.0, -1.0, 0.0], 1e-12));
    }
}
