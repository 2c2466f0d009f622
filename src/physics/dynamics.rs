//! Rigid body dynamics for the "+" quadcopter.
//!
//! Pure functions: thrust and torque from motor speeds, accelerations from
//! a wrench, and one semi-implicit Euler step.
//!
//! Motor positions relative to CoM (top view, "+" layout):
//! - Motor 0 (front): (+L, 0, 0)
//! - Motor 1 (back):  (-L, 0, 0)
//! - Motor 2 (left):  (0, +L, 0)
//! - Motor 3 (right): (0, -L, 0)

use crate::constants::{G, MOTOR_YAW_DIRS};
use crate::physics::quaternion::{quat_integrate, quat_to_thrust_dir};
use crate::state::RigidBodyState;
use crate::types::{BodyFrame, UnitQuaternion, Vec3, WorldFrame};

// ============================================================================
// Forces and Torques
// ============================================================================

/// Per-motor thrust (N): F_i = s_i * F_max
#[inline(always)]
pub fn compute_thrusts(speeds: [f64; 4], max_thrust: f64) -> [f64; 4] {
    [
        speeds[0] * max_thrust,
        speeds[1] * max_thrust,
        speeds[2] * max_thrust,
        speeds[3] * max_thrust,
    ]
}

#[inline(always)]
pub fn compute_total_thrust(thrusts: [f64; 4]) -> f64 {
    thrusts[0] + thrusts[1] + thrusts[2] + thrusts[3]
}

/// Body-frame torque from motor thrusts.
///
/// Roll and pitch come from r_i x F_i with F_i along body z; yaw is the
/// reactive torque ±k*F_i (+ for motors 0,1 and - for 2,3).
#[inline(always)]
pub fn compute_torques(thrusts: [f64; 4], arm_length: f64, torque_to_thrust: f64) -> [f64; 3] {
    let tau_x = arm_length * (thrusts[2] - thrusts[3]);
    let tau_y = arm_length * (thrusts[1] - thrusts[0]);
    let tau_z = torque_to_thrust
        * (MOTOR_YAW_DIRS[0] * thrusts[0]
            + MOTOR_YAW_DIRS[1] * thrusts[1]
            + MOTOR_YAW_DIRS[2] * thrusts[2]
            + MOTOR_YAW_DIRS[3] * thrusts[3]);
    [tau_x, tau_y, tau_z]
}

/// World-frame force from total thrust and linear drag (gravity excluded).
///
/// F = R * [0, 0, F_total] - c * v
#[inline(always)]
pub fn compute_body_force(
    quat: [f64; 4],
    total_thrust: f64,
    velocity: [f64; 3],
    drag_coefficient: f64,
) -> [f64; 3] {
    let dir = quat_to_thrust_dir(quat);
    [
        dir[0] * total_thrust - drag_coefficient * velocity[0],
        dir[1] * total_thrust - drag_coefficient * velocity[1],
        dir[2] * total_thrust - drag_coefficient * velocity[2],
    ]
}

// ============================================================================
// Accelerations
// ============================================================================

/// Linear acceleration in world frame: a = F / m - g * z
#[inline(always)]
pub fn compute_linear_acceleration(force: [f64; 3], mass: f64) -> [f64; 3] {
    let m_inv = 1.0 / mass;
    [force[0] * m_inv, force[1] * m_inv, force[2] * m_inv - G]
}

/// Angular acceleration in body frame.
///
/// α = J⁻¹ * (τ - ω × Jω)
///
/// For a diagonal inertia matrix:
/// α_x = (τ_x - ω_y * ω_z * (I_zz - I_yy)) / I_xx
/// α_y = (τ_y - ω_x * ω_z * (I_xx - I_zz)) / I_yy
/// α_z = (τ_z - ω_x * ω_y * (I_yy - I_xx)) / I_zz
#[inline(always)]
pub fn compute_angular_acceleration(
    torques: [f64; 3],
    omega: [f64; 3],
    inertia: [f64; 3],
) -> [f64; 3] {
    let (tau_x, tau_y, tau_z) = (torques[0], torques[1], torques[2]);
    let (wx, wy, wz) = (omega[0], omega[1], omega[2]);
    let [ixx, iyy, izz] = inertia;

    let gyro_x = wy * wz * (izz - iyy);
    let gyro_y = wx * wz * (ixx - izz);
    let gyro_z = wx * wy * (iyy - ixx);

    [
        (tau_x - gyro_x) / ixx,
        (tau_y - gyro_y) / iyy,
        (tau_z - gyro_z) / izz,
    ]
}

// ============================================================================
// Integration
// ============================================================================

/// One semi-implicit Euler step of a rigid body under a wrench.
///
/// Velocities update first; position and orientation then use the new
/// velocities.
///
/// # Arguments
/// * `state` - Current rigid body state
/// * `force` - Applied world-frame force, gravity excluded (N)
/// * `torque` - Applied body-frame torque (N*m)
/// * `mass` - Body mass (kg)
/// * `inertia` - Diagonal inertia (kg*m^2)
/// * `dt` - Time step (s)
#[inline]
pub fn rigid_body_step(
    state: &RigidBodyState,
    force: Vec3<WorldFrame>,
    torque: Vec3<BodyFrame>,
    mass: f64,
    inertia: [f64; 3],
    dt: f64,
) -> RigidBodyState {
    let pos = state.position.as_array();
    let vel = state.velocity.as_array();
    let omega = state.angular_velocity.as_array();

    let lin_accel = compute_linear_acceleration(force.as_array(), mass);
    let ang_accel = compute_angular_acceleration(torque.as_array(), omega, inertia);

    let new_vel = [
        vel[0] + lin_accel[0] * dt,
        vel[1] + lin_accel[1] * dt,
        vel[2] + lin_accel[2] * dt,
    ];
    let new_pos = [
        pos[0] + new_vel[0] * dt,
        pos[1] + new_vel[1] * dt,
        pos[2] + new_vel[2] * dt,
    ];
    let new_omega = [
        omega[0] + ang_accel[0] * dt,
        omega[1] + ang_accel[1] * dt,
        omega[2] + ang_accel[2] * dt,
    ];
    let new_quat = quat_integrate(state.orientation.as_array(), new_omega, dt);

    RigidBodyState {
        position: Vec3::from_array(new_pos),
        velocity: Vec3::from_array(new_vel),
        orientation: UnitQuaternion::from_array(new_quat),
        angular_velocity: Vec3::from_array(new_omega),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{max_thrust_per_motor, ARM_LENGTH, INERTIA, MASS, THRUST_TO_WEIGHT};

    #[test]
    fn test_half_speed_thrust_balances_weight() {
        let max = max_thrust_per_motor(MASS, THRUST_TO_WEIGHT);
        let total = compute_total_thrust(compute_thrusts([0.5; 4], max));
        assert!((total - MASS * G).abs() < 1e-12);
    }

    #[test]
    fn test_equal_thrusts_produce_no_torque() {
        let t = compute_torques([1.0; 4], ARM_LENGTH, 0.01);
        assert_eq!(t, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_back_motor_pitches_nose_down() {
        // More thrust on the back motor gives positive torque about +y,
        // which tips the thrust vector toward +x
        let t = compute_torques([0.0, 1.0, 0.0, 0.0], ARM_LENGTH, 0.01);
        assert!((t[1] - ARM_LENGTH).abs() < 1e-12);
        assert_eq!(t[0], 0.0);
        assert!((t[2] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_left_motor_rolls_positive() {
        let t = compute_torques([0.0, 0.0, 1.0, 0.0], ARM_LENGTH, 0.01);
        assert!((t[0] - ARM_LENGTH).abs() < 1e-12);
        assert!((t[2] + 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_drag_opposes_velocity() {
        let f = compute_body_force([1.0, 0.0, 0.0, 0.0], 0.0, [2.0, -1.0, 0.0], 0.5);
        assert_eq!(f, [-1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_free_fall_acceleration() {
        let a = compute_linear_acceleration([0.0; 3], MASS);
        assert_eq!(a, [0.0, 0.0, -G]);
    }

    #[test]
    fn test_gyroscopic_coupling_vanishes_on_principal_axis() {
        let a = compute_angular_acceleration([0.0; 3], [0.0, 0.0, 5.0], INERTIA);
        assert_eq!(a, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_semi_implicit_step_uses_new_velocity() {
        let s = RigidBodyState::at_rest(Vec3::new(0.0, 0.0, 1.0), UnitQuaternion::identity());
        let next = rigid_body_step(&s, Vec3::zero(), Vec3::zero(), MASS, INERTIA, 0.01);
        assert!((next.velocity.z() + G * 0.01).abs() < 1e-12);
        assert!((next.position.z() - (1.0 - G * 0.01 * 0.01)).abs() < 1e-12);
    }
}
