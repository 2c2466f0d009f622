//! Physics engine seam and the built-in rigid-body engine.
//!
//! The quadcopter model only talks to [`PhysicsEngine`]: it sets a wrench,
//! advances one tick, and reads the state back. [`RigidBodyEngine`]
//! integrates a free 6-DOF body against a ground plane at z = 0.

use crate::constants::{BODY_HALF_EXTENTS, MOTOR_POD_DEPTH, MOTOR_POSITIONS};
use crate::error::PhysicsError;
use crate::physics::dynamics::rigid_body_step;
use crate::physics::quaternion::quat_to_rotation_matrix;
use crate::state::RigidBodyState;
use crate::types::{BodyFrame, UnitQuaternion, Vec3, WorldFrame};

/// Fraction of horizontal velocity and body rate kept per tick in contact.
const CONTACT_DAMPING: f64 = 0.5;

// ============================================================================
// Engine Trait
// ============================================================================

/// A rigid-body integrator for a single free body.
pub trait PhysicsEngine: Send {
    /// Place the body at rest. Orientation is (w, x, y, z).
    fn reset(&mut self, position: Vec3<WorldFrame>, orientation: UnitQuaternion);

    /// Set the external wrench applied during the next `step`.
    ///
    /// `force` is world-frame and excludes gravity; `torque` is body-frame.
    fn apply_wrench(&mut self, force: Vec3<WorldFrame>, torque: Vec3<BodyFrame>);

    /// Advance one tick.
    fn step(&mut self) -> Result<(), PhysicsError>;

    fn state(&self) -> RigidBodyState;

    /// True if the body touched the ground plane during the last step.
    fn in_ground_contact(&self) -> bool;

    /// Tick length (s).
    fn timestep(&self) -> f64;
}

// ============================================================================
// Collision Geometry
// ============================================================================

/// Body-frame points tested against the ground plane: the eight corners of
/// the central box and the underside of each motor pod.
pub fn collision_points(arm_length: f64) -> Vec<[f64; 3]> {
    let [hx, hy, hz] = BODY_HALF_EXTENTS;
    let mut points = Vec::with_capacity(12);
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            for sz in [-1.0, 1.0] {
                points.push([sx * hx, sy * hy, sz * hz]);
            }
        }
    }
    for dir in MOTOR_POSITIONS.iter() {
        points.push([dir[0] * arm_length, dir[1] * arm_length, -MOTOR_POD_DEPTH]);
    }
    points
}

/// Lowest world z of any collision point.
pub fn lowest_point(state: &RigidBodyState, points: &[[f64; 3]]) -> f64 {
    let r = quat_to_rotation_matrix(state.orientation.as_array());
    let z = state.position.z();
    points
        .iter()
        .map(|p| z + r[6] * p[0] + r[7] * p[1] + r[8] * p[2])
        .fold(f64::INFINITY, f64::min)
}

// ============================================================================
// Rigid Body Engine
// ============================================================================

/// Semi-implicit Euler integrator with a ground plane.
#[derive(Clone, Debug)]
pub struct RigidBodyEngine {
    mass: f64,
    inertia: [f64; 3],
    dt: f64,
    points: Vec<[f64; 3]>,
    state: RigidBodyState,
    force: Vec3<WorldFrame>,
    torque: Vec3<BodyFrame>,
    contact: bool,
}

impl RigidBodyEngine {
    pub fn new(
        mass: f64,
        inertia: [f64; 3],
        arm_length: f64,
        dt: f64,
    ) -> Result<Self, PhysicsError> {
        if !(mass > 0.0) || inertia.iter().any(|&i| !(i > 0.0)) {
            return Err(PhysicsError::InvalidParameter(
                "mass and inertia must be positive".to_string(),
            ));
        }
        if !(dt > 0.0) {
            return Err(PhysicsError::InvalidParameter(format!(
                "timestep must be positive, got {dt}"
            )));
        }
        Ok(Self {
            mass,
            inertia,
            dt,
            points: collision_points(arm_length),
            state: RigidBodyState::default(),
            force: Vec3::zero(),
            torque: Vec3::zero(),
            contact: false,
        })
    }

    /// Push the body out of the ground and bleed off its motion.
    fn resolve_ground_contact(&mut self) -> bool {
        let penetration = -lowest_point(&self.state, &self.points);
        if penetration <= 0.0 {
            return false;
        }
        let [px, py, pz] = self.state.position.as_array();
        let [vx, vy, vz] = self.state.velocity.as_array();
        self.state.position = Vec3::new(px, py, pz + penetration);
        self.state.velocity = Vec3::new(vx * CONTACT_DAMPING, vy * CONTACT_DAMPING, vz.max(0.0));
        self.state.angular_velocity = self.state.angular_velocity * CONTACT_DAMPING;
        true
    }
}

impl PhysicsEngine for RigidBodyEngine {
    fn reset(&mut self, position: Vec3<WorldFrame>, orientation: UnitQuaternion) {
        self.state = RigidBodyState::at_rest(position, orientation);
        self.force = Vec3::zero();
        self.torque = Vec3::zero();
        self.contact = false;
    }

    fn apply_wrench(&mut self, force: Vec3<WorldFrame>, torque: Vec3<BodyFrame>) {
        self.force = force;
        self.torque = torque;
    }

    fn step(&mut self) -> Result<(), PhysicsError> {
        self.state = rigid_body_step(
            &self.state,
            self.force,
            self.torque,
            self.mass,
            self.inertia,
            self.dt,
        );
        self.contact = self.resolve_ground_contact();

        if !self.state.position.is_finite() {
            return Err(PhysicsError::NonFinite { field: "position" });
        }
        if !self.state.velocity.is_finite() {
            return Err(PhysicsError::NonFinite { field: "velocity" });
        }
        if !self.state.angular_velocity.is_finite() {
            return Err(PhysicsError::NonFinite {
                field: "angular velocity",
            });
        }
        Ok(())
    }

    fn state(&self) -> RigidBodyState {
        self.state
    }

    fn in_ground_contact(&self) -> bool {
        self.contact
    }

    fn timestep(&self) -> f64 {
        self.dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ARM_LENGTH, INERTIA, MASS};
    use crate::physics::quaternion::euler_to_quaternion;

    fn engine() -> RigidBodyEngine {
        RigidBodyEngine::new(MASS, INERTIA, ARM_LENGTH, 0.01).unwrap()
    }

    #[test]
    fn test_collision_points_count() {
        assert_eq!(collision_points(ARM_LENGTH).len(), 12);
    }

    #[test]
    fn test_level_lowest_point_is_box_bottom() {
        let s = RigidBodyState::at_rest(Vec3::new(0.0, 0.0, 1.0), UnitQuaternion::identity());
        let low = lowest_point(&s, &collision_points(ARM_LENGTH));
        assert!((low - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_tilted_body_touches_with_motor_pod() {
        let s = RigidBodyState::at_rest(
            Vec3::new(0.0, 0.0, 1.0),
            euler_to_quaternion(0.0, 0.5, 0.0),
        );
        let low = lowest_point(&s, &collision_points(ARM_LENGTH));
        // Front pod tips below the box when pitched
        let pod = 1.0 - ARM_LENGTH * 0.5_f64.sin() - MOTOR_POD_DEPTH * 0.5_f64.cos();
        assert!((low - pod).abs() < 1e-12, "low {} pod {}", low, pod);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(RigidBodyEngine::new(0.0, INERTIA, ARM_LENGTH, 0.01).is_err());
        assert!(RigidBodyEngine::new(MASS, INERTIA, ARM_LENGTH, 0.0).is_err());
    }

    #[test]
    fn test_body_rests_on_ground() {
        let mut e = engine();
        e.reset(Vec3::new(0.0, 0.0, 0.1), UnitQuaternion::identity());
        let mut touched = false;
        for _ in 0..300 {
            e.step().unwrap();
            touched |= e.in_ground_contact();
        }
        assert!(touched);
        let s = e.state();
        assert!(s.position.z() >= BODY_HALF_EXTENTS[2] - 1e-9);
        assert!(s.position.z() < 0.03);
        assert!(s.velocity.z() >= 0.0);
    }

    #[test]
    fn test_airborne_body_reports_no_contact() {
        let mut e = engine();
        e.reset(Vec3::new(0.0, 0.0, 5.0), UnitQuaternion::identity());
        e.step().unwrap();
        assert!(!e.in_ground_contact());
    }

    #[test]
    fn test_non_finite_wrench_is_an_error() {
        let mut e = engine();
        e.reset(Vec3::new(0.0, 0.0, 5.0), UnitQuaternion::identity());
        e.apply_wrench(Vec3::new(f64::NAN, 0.0, 0.0), Vec3::zero());
        assert!(matches!(e.step(), Err(PhysicsError::NonFinite { .. })));
    }
}
