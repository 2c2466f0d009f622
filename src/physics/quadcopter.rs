//! Quadcopter model: mixer and motors on top of a [`PhysicsEngine`].

use crate::config::QuadcopterConfig;
use crate::error::PhysicsError;
use crate::physics::dynamics::{compute_body_force, compute_thrusts, compute_torques, compute_total_thrust};
use crate::physics::engine::{PhysicsEngine, RigidBodyEngine};
use crate::physics::motor::{mix, step_motors, MotorDynamicsConfig};
use crate::physics::quaternion::tilt_angle;
use crate::state::QuadState;
use crate::types::{MotorSpeeds, NormalizedAction, UnitQuaternion, Vec3, WorldFrame};

/// A "+" quadcopter driven through normalized actions.
///
/// Generic over the engine so a different integrator can be swapped in.
pub struct Quadcopter<E: PhysicsEngine = RigidBodyEngine> {
    engine: E,
    params: QuadcopterConfig,
    motor: MotorDynamicsConfig,
    max_thrust: f64,
    motors: MotorSpeeds,
}

impl Quadcopter<RigidBodyEngine> {
    /// Build a quadcopter with the built-in rigid-body engine.
    pub fn new(params: &QuadcopterConfig, dt: f64) -> Result<Self, PhysicsError> {
        params.validate().map_err(PhysicsError::InvalidParameter)?;
        let engine = RigidBodyEngine::new(params.mass, params.inertia, params.arm_length, dt)?;
        Self::with_engine(engine, params)
    }
}

impl<E: PhysicsEngine> Quadcopter<E> {
    pub fn with_engine(engine: E, params: &QuadcopterConfig) -> Result<Self, PhysicsError> {
        params.validate().map_err(PhysicsError::InvalidParameter)?;
        Ok(Self {
            engine,
            params: params.clone(),
            motor: MotorDynamicsConfig::with_time_constant(params.motor_time_constant),
            max_thrust: params.max_thrust(),
            motors: MotorSpeeds::default(),
        })
    }

    /// Place the airframe at rest with stopped motors.
    ///
    /// `orientation` is (w, x, y, z).
    pub fn reset(&mut self, position: Vec3<WorldFrame>, orientation: UnitQuaternion) -> QuadState {
        self.engine.reset(position, orientation);
        self.motors = MotorSpeeds::default();
        self.get_state()
    }

    /// Clip, mix and lag the motors, then hand the resulting wrench to the engine.
    pub fn apply_action(&mut self, action: NormalizedAction, dt: f64) {
        let target = mix(action);
        self.motors = step_motors(target, self.motors, self.motor.compute_alpha(dt));

        let thrusts = compute_thrusts(self.motors.as_array(), self.max_thrust);
        let body = self.engine.state();
        let force = compute_body_force(
            body.orientation.as_array(),
            compute_total_thrust(thrusts),
            body.velocity.as_array(),
            self.params.drag_coefficient,
        );
        let torque = compute_torques(thrusts, self.params.arm_length, self.params.torque_to_thrust);
        self.engine
            .apply_wrench(Vec3::from_array(force), Vec3::from_array(torque));
    }

    /// Advance the engine one tick.
    pub fn step_physics(&mut self) -> Result<(), PhysicsError> {
        self.engine.step()
    }

    pub fn get_state(&self) -> QuadState {
        QuadState::from_body(self.engine.state(), self.motors)
    }

    pub fn check_ground_contact(&self) -> bool {
        self.engine.in_ground_contact()
    }

    /// Angle between body z and world z (radians).
    pub fn get_tilt_angle(&self) -> f64 {
        tilt_angle(self.engine.state().orientation)
    }

    pub fn timestep(&self) -> f64 {
        self.engine.timestep()
    }

    pub fn params(&self) -> &QuadcopterConfig {
        &self.params
    }
}
