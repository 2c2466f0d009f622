//! True (noise-free) state of the airframe.
//!
//! [`RigidBodyState`] is what the physics engine integrates;
//! [`QuadState`] adds the motor speeds owned by the quadcopter model.
//! Orientations are (w, x, y, z) and rotate body vectors into the world.

use crate::physics::quaternion::tilt_angle;
use crate::types::{BodyFrame, MotorSpeeds, UnitQuaternion, Vec3, WorldFrame};

/// Six-DOF rigid-body state.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RigidBodyState {
    /// Position (m), world frame
    pub position: Vec3<WorldFrame>,
    /// Linear velocity (m/s), world frame
    pub velocity: Vec3<WorldFrame>,
    /// Body-to-world orientation (w, x, y, z)
    pub orientation: UnitQuaternion,
    /// Angular velocity (rad/s), body frame
    pub angular_velocity: Vec3<BodyFrame>,
}

impl RigidBodyState {
    /// Body at rest at `position` with the given orientation.
    pub fn at_rest(position: Vec3<WorldFrame>, orientation: UnitQuaternion) -> Self {
        Self {
            position,
            velocity: Vec3::zero(),
            orientation,
            angular_velocity: Vec3::zero(),
        }
    }

    /// True if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.angular_velocity.is_finite()
            && self.orientation.as_array().iter().all(|v| v.is_finite())
    }
}

/// Full quadcopter state: rigid body plus motors.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct QuadState {
    pub position: Vec3<WorldFrame>,
    pub velocity: Vec3<WorldFrame>,
    /// Body-to-world orientation (w, x, y, z)
    pub orientation: UnitQuaternion,
    pub angular_velocity: Vec3<BodyFrame>,
    /// Current (lagged) normalized motor speeds
    pub motor_speeds: MotorSpeeds,
}

impl QuadState {
    pub fn from_body(body: RigidBodyState, motor_speeds: MotorSpeeds) -> Self {
        Self {
            position: body.position,
            velocity: body.velocity,
            orientation: body.orientation,
            angular_velocity: body.angular_velocity,
            motor_speeds,
        }
    }

    /// Speed (m/s).
    #[inline]
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Angle between body z and world z (radians).
    #[inline]
    pub fn tilt(&self) -> f64 {
        tilt_angle(self.orientation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_rest_has_zero_rates() {
        let s = RigidBodyState::at_rest(Vec3::new(0.0, 0.0, 1.0), UnitQuaternion::identity());
        assert_eq!(s.velocity.as_array(), [0.0; 3]);
        assert_eq!(s.angular_velocity.as_array(), [0.0; 3]);
        assert!(s.is_finite());
    }

    #[test]
    fn test_non_finite_detected() {
        let mut s = RigidBodyState::default();
        s.velocity = Vec3::new(f64::NAN, 0.0, 0.0);
        assert!(!s.is_finite());
    }

    #[test]
    fn test_level_state_has_zero_tilt() {
        let s = QuadState::default();
        assert_eq!(s.tilt(), 0.0);
        assert_eq!(s.speed(), 0.0);
    }
}
