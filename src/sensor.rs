//! Noisy IMU and pose sensor.
//!
//! Readings are split by frame: position, velocity and orientation are
//! world-frame; specific force and angular rate are body-frame.
//!
//! Accelerometer and gyro biases follow an Ornstein-Uhlenbeck walk:
//!
//! b ← (1 − dt/τ_b)·b + √(dt/τ_b)·σ_b·ξ,  ξ ~ N(0, I)

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::config::SensorConfig;
use crate::constants::G;
use crate::physics::quaternion::quaternion_to_rotation;
use crate::state::QuadState;
use crate::types::{BodyFrame, UnitQuaternion, Vec3, WorldFrame};

/// One sensor sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReadings {
    pub position: Vec3<WorldFrame>,
    pub velocity: Vec3<WorldFrame>,
    /// Passed through from the true state, (w, x, y, z)
    pub orientation: UnitQuaternion,
    /// Specific force (m/s^2), includes the gravity reaction
    pub acceleration: Vec3<BodyFrame>,
    pub angular_velocity: Vec3<BodyFrame>,
}

/// Current bias state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorBias {
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
}

/// Sensor with per-instance RNG and bias state.
pub struct SensorModel {
    params: SensorConfig,
    rng: StdRng,
    bias: SensorBias,
    prev_velocity: Option<Vec3<WorldFrame>>,
}

#[inline]
fn standard_normal3(rng: &mut StdRng) -> [f64; 3] {
    [
        rng.sample(StandardNormal),
        rng.sample(StandardNormal),
        rng.sample(StandardNormal),
    ]
}

#[inline]
fn ou_step(bias: [f64; 3], dt: f64, tau: f64, std: f64, rng: &mut StdRng) -> [f64; 3] {
    let alpha = dt / tau;
    let xi = standard_normal3(rng);
    let scale = alpha.sqrt() * std;
    [
        (1.0 - alpha) * bias[0] + scale * xi[0],
        (1.0 - alpha) * bias[1] + scale * xi[1],
        (1.0 - alpha) * bias[2] + scale * xi[2],
    ]
}

#[inline]
fn add_gaussian<F>(v: Vec3<F>, std: f64, rng: &mut StdRng) -> Vec3<F> {
    let xi = standard_normal3(rng);
    v + Vec3::new(xi[0] * std, xi[1] * std, xi[2] * std)
}

impl SensorModel {
    pub fn new(params: SensorConfig, seed: u64) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(seed),
            bias: SensorBias::default(),
            prev_velocity: None,
        }
    }

    /// Clear biases and the finite-difference history.
    ///
    /// `Some(seed)` also reseeds the generator; `None` keeps it.
    pub fn reset(&mut self, seed: Option<u64>) {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.bias = SensorBias::default();
        self.prev_velocity = None;
    }

    pub fn bias(&self) -> SensorBias {
        self.bias
    }

    fn update_biases(&mut self, dt: f64) {
        let p = &self.params;
        self.bias.accel = ou_step(
            self.bias.accel,
            dt,
            p.accel_bias_time_constant,
            p.accel_bias_std,
            &mut self.rng,
        );
        self.bias.gyro = ou_step(
            self.bias.gyro,
            dt,
            p.gyro_bias_time_constant,
            p.gyro_bias_std,
            &mut self.rng,
        );
    }

    /// Sample the sensor.
    ///
    /// The first reading after `reset` reports zero kinematic acceleration,
    /// i.e. the specific force is the gravity reaction alone.
    pub fn get_readings(&mut self, state: &QuadState, dt: f64, add_noise: bool) -> SensorReadings {
        if add_noise {
            self.update_biases(dt);
        }

        let accel_world = match self.prev_velocity {
            Some(prev) if dt > 0.0 => (state.velocity - prev) * (1.0 / dt),
            _ => Vec3::zero(),
        };
        self.prev_velocity = Some(state.velocity);

        let specific_force = accel_world - Vec3::new(0.0, 0.0, -G);
        let body_accel = quaternion_to_rotation(state.orientation).world_to_body(specific_force);
        let body_rate = state.angular_velocity;

        if !add_noise {
            return SensorReadings {
                position: state.position,
                velocity: state.velocity,
                orientation: state.orientation,
                acceleration: body_accel,
                angular_velocity: body_rate,
            };
        }

        let p = &self.params;
        let position = add_gaussian(state.position, p.position_noise_std, &mut self.rng);
        let velocity = add_gaussian(state.velocity, p.velocity_noise_std, &mut self.rng);
        let acceleration = add_gaussian(
            body_accel + Vec3::from_array(self.bias.accel),
            p.accel_noise_std,
            &mut self.rng,
        );
        let angular_velocity = add_gaussian(
            body_rate + Vec3::from_array(self.bias.gyro),
            p.gyro_noise_std,
            &mut self.rng,
        );

        SensorReadings {
            position,
            velocity,
            orientation: state.orientation,
            acceleration,
            angular_velocity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::quaternion::euler_to_quaternion;

    fn hovering_state() -> QuadState {
        QuadState {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..QuadState::default()
        }
    }

    #[test]
    fn test_first_reading_is_gravity_reaction() {
        let mut s = SensorModel::new(SensorConfig::default(), 0);
        let r = s.get_readings(&hovering_state(), 0.01, false);
        assert_eq!(r.acceleration.as_array(), [0.0, 0.0, G]);
        assert_eq!(r.position.as_array(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_finite_difference_acceleration() {
        let mut s = SensorModel::new(SensorConfig::default(), 0);
        let mut state = hovering_state();
        s.get_readings(&state, 0.01, false);
        state.velocity = Vec3::new(0.0, 0.0, -0.0981);
        let r = s.get_readings(&state, 0.01, false);
        // Free fall: specific force vanishes
        assert!(r.acceleration.z().abs() < 1e-9, "az {}", r.acceleration.z());
    }

    #[test]
    fn test_specific_force_rotated_into_body() {
        let mut s = SensorModel::new(SensorConfig::default(), 0);
        let state = QuadState {
            orientation: euler_to_quaternion(std::f64::consts::FRAC_PI_2, 0.0, 0.0),
            ..QuadState::default()
        };
        let r = s.get_readings(&state, 0.01, false);
        // Rolled 90 deg: world up lies along body +y
        assert!((r.acceleration.y() - G).abs() < 1e-9);
        assert!(r.acceleration.z().abs() < 1e-9);
    }

    #[test]
    fn test_biases_only_evolve_with_noise() {
        let mut s = SensorModel::new(SensorConfig::default(), 3);
        for _ in 0..10 {
            s.get_readings(&hovering_state(), 0.01, false);
        }
        assert_eq!(s.bias(), SensorBias::default());
        s.get_readings(&hovering_state(), 0.01, true);
        assert_ne!(s.bias(), SensorBias::default());
    }

    #[test]
    fn test_same_seed_same_noise() {
        let mut a = SensorModel::new(SensorConfig::default(), 11);
        let mut b = SensorModel::new(SensorConfig::default(), 11);
        for _ in 0..5 {
            let ra = a.get_readings(&hovering_state(), 0.01, true);
            let rb = b.get_readings(&hovering_state(), 0.01, true);
            assert_eq!(ra, rb);
        }
    }

    #[test]
    fn test_reset_with_seed_replays_sequence() {
        let mut s = SensorModel::new(SensorConfig::default(), 5);
        let first = s.get_readings(&hovering_state(), 0.01, true);
        s.get_readings(&hovering_state(), 0.01, true);
        s.reset(Some(5));
        let again = s.get_readings(&hovering_state(), 0.01, true);
        assert_eq!(first, again);
    }

    #[test]
    fn test_orientation_passes_through_with_noise() {
        let mut s = SensorModel::new(SensorConfig::default(), 1);
        let state = QuadState {
            orientation: euler_to_quaternion(0.1, 0.2, 0.3),
            ..QuadState::default()
        };
        let r = s.get_readings(&state, 0.01, true);
        assert_eq!(r.orientation, state.orientation);
    }
}
