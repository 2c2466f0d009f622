//! Physical constants and fixed course geometry for the waypoint quadcopter.
//!
//! Values here are the authoritative defaults; every one of them can be
//! overridden through [`crate::config::ExperimentConfig`] except the course
//! itself and the mixer gains.

// ============================================================================
// Physical Properties
// ============================================================================

/// Gravitational acceleration (m/s^2)
pub const G: f64 = 9.81;

/// Mass of the airframe (kg)
pub const MASS: f64 = 0.5;

/// Arm length - distance from center to motor (m)
pub const ARM_LENGTH: f64 = 0.17;

/// Thrust-to-weight ratio with all motors at full speed
pub const THRUST_TO_WEIGHT: f64 = 2.0;

/// Diagonal of the inertia tensor [Ixx, Iyy, Izz] (kg*m^2)
pub const INERTIA: [f64; 3] = [2.3e-3, 2.3e-3, 4.0e-3];

/// Linear drag coefficient (N per m/s)
pub const DRAG_COEFFICIENT: f64 = 0.01;

/// Motor time constant for first-order dynamics (seconds)
pub const MOTOR_TIME_CONSTANT: f64 = 0.02;

/// Reactive yaw torque per newton of thrust (m)
pub const TORQUE_TO_THRUST: f64 = 0.01;

/// Physics tick (seconds)
pub const DEFAULT_TIMESTEP: f64 = 0.01;

// ============================================================================
// Mixer (+ configuration: 0=front, 1=back, 2=left, 3=right)
// ============================================================================

/// Roll command contribution to the left/right motor pair
pub const ROLL_MIX: f64 = 0.3;

/// Pitch command contribution to the front/back motor pair
pub const PITCH_MIX: f64 = 0.3;

/// Yaw command contribution to all motors
pub const YAW_MIX: f64 = 0.2;

/// Motor positions in the body frame.
pub const MOTOR_POSITIONS: [[f64; 3]; 4] = [
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
];

/// Reactive torque sign per motor (+ for 0,1 and - for 2,3)
pub const MOTOR_YAW_DIRS: [f64; 4] = [1.0, 1.0, -1.0, -1.0];

// ============================================================================
// Collision Geometry
// ============================================================================

/// Half extents of the central body box (m)
pub const BODY_HALF_EXTENTS: [f64; 3] = [0.05, 0.05, 0.02];

/// Distance from the arm axis to the underside of a motor pod (m)
pub const MOTOR_POD_DEPTH: f64 = 0.01;

// ============================================================================
// Waypoint Course
// ============================================================================

/// Number of waypoints in the course
pub const NUM_WAYPOINTS: usize = 10;

/// Fixed base course (x, y, z) in meters.
pub const FIXED_WAYPOINTS: [[f64; 3]; NUM_WAYPOINTS] = [
    [5.5, 0.0, 3.3],
    [10.5, 5.5, 4.5],
    [7.5, 11.5, 6.2],
    [0.0, 14.0, 7.2],
    [-7.5, 10.0, 6.2],
    [-11.5, 4.0, 5.2],
    [-10.0, -4.0, 4.2],
    [-5.5, -10.5, 5.2],
    [4.5, -7.5, 3.5],
    [7.5, -2.5, 3.0],
];

/// Minimum altitude of a perturbed waypoint (m)
pub const MIN_WAYPOINT_ALTITUDE: f64 = 0.5;

/// Nominal start position (m)
pub const START_POSITION: [f64; 3] = [0.0, 0.0, 1.0];

/// Clearance added to the ground threshold when clamping start altitude (m)
pub const START_CLEARANCE: f64 = 0.1;

// ============================================================================
// Spaces
// ============================================================================

/// Action dimensionality: [throttle, roll, pitch, yaw]
pub const ACTION_DIM: usize = 4;

/// Observation size without global position
pub const BASE_OBS_DIM: usize = 19;

/// Observation size with global position appended
pub const POSITION_OBS_DIM: usize = BASE_OBS_DIM + 3;

/// Tolerance on the quaternion norm before drift is reported
pub const QUAT_NORM_TOLERANCE: f64 = 1e-3;

// ============================================================================
// Helpers
// ============================================================================

/// Maximum thrust of a single motor (N): m * g * (T/W) / 4
#[inline]
pub fn max_thrust_per_motor(mass: f64, thrust_to_weight: f64) -> f64 {
    mass * G * thrust_to_weight / 4.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_thrust_matches_thrust_to_weight() {
        let total = 4.0 * max_thrust_per_motor(MASS, THRUST_TO_WEIGHT);
        assert!((total / (MASS * G) - THRUST_TO_WEIGHT).abs() < 1e-12);
    }

    #[test]
    fn test_course_is_above_minimum_altitude() {
        for wp in FIXED_WAYPOINTS.iter() {
            assert!(wp[2] >= MIN_WAYPOINT_ALTITUDE);
        }
    }

    #[test]
    fn test_observation_sizes() {
        assert_eq!(BASE_OBS_DIM, 3 + 4 + 3 + 3 + 3 + 1 + 1 + 1);
        assert_eq!(POSITION_OBS_DIM, 22);
    }
}
