//! Motor mixing and first-order motor response.
//!
//! Real motors cannot change speed instantaneously. Each motor follows
//!
//! d(s)/dt = (s_cmd - s) / tau
//!
//! Discretized as:
//! s(t+dt) = alpha * s_cmd + (1-alpha) * s(t)
//! where alpha = dt / (dt + tau)
//!
//! Motor layout is a "+" configuration (top view):
//! ```text
//!          0 (front, +x)
//!          |
//!  2 (left, +y) ---+--- 3 (right, -y)
//!          |
//!          1 (back, -x)
//! ```

use crate::constants::{MOTOR_TIME_CONSTANT, PITCH_MIX, ROLL_MIX, YAW_MIX};
use crate::types::{MotorSpeeds, NormalizedAction};

// ============================================================================
// Configuration
// ============================================================================

/// Motor dynamics configuration.
///
/// `time_constant = 0.0` gives an instantaneous response.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorDynamicsConfig {
    /// Time constant in seconds.
    pub time_constant: f64,
}

impl Default for MotorDynamicsConfig {
    fn default() -> Self {
        Self {
            time_constant: MOTOR_TIME_CONSTANT,
        }
    }
}

impl MotorDynamicsConfig {
    #[inline]
    pub const fn with_time_constant(time_constant: f64) -> Self {
        Self { time_constant }
    }

    /// alpha = dt / (dt + tau)
    #[inline]
    pub fn compute_alpha(&self, dt: f64) -> f64 {
        if self.time_constant <= 0.0 {
            1.0
        } else {
            dt / (dt + self.time_constant)
        }
    }
}

// ============================================================================
// Mixer
// ============================================================================

/// Map a clipped action onto per-motor target speeds in [0, 1].
///
/// Base throttle is (T + 1) / 2, so T = 0 commands half speed on every motor.
#[inline]
pub fn mix(action: NormalizedAction) -> MotorSpeeds {
    let [throttle, r, p, y] = action.as_array();
    let t = (throttle + 1.0) * 0.5;

    MotorSpeeds::new([
        t - PITCH_MIX * p + YAW_MIX * y,
        t + PITCH_MIX * p + YAW_MIX * y,
        t - ROLL_MIX * r - YAW_MIX * y,
        t + ROLL_MIX * r - YAW_MIX * y,
    ])
}

// ============================================================================
// Lag
// ============================================================================

/// Apply first-order response to a single motor.
#[inline(always)]
pub fn apply_motor_dynamics(target: f64, current: f64, alpha: f64) -> f64 {
    (alpha * target + (1.0 - alpha) * current).clamp(0.0, 1.0)
}

/// Advance all four motors one tick toward their targets.
#[inline]
pub fn step_motors(target: MotorSpeeds, current: MotorSpeeds, alpha: f64) -> MotorSpeeds {
    let t = target.as_array();
    let c = current.as_array();
    MotorSpeeds::new([
        apply_motor_dynamics(t[0], c[0], alpha),
        apply_motor_dynamics(t[1], c[1], alpha),
        apply_motor_dynamics(t[2], c[2], alpha),
        apply_motor_dynamics(t[3], c[3], alpha),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_computation() {
        let config = MotorDynamicsConfig::default();
        let alpha = config.compute_alpha(0.01);
        assert!((alpha - 0.01 / 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_instantaneous() {
        let config = MotorDynamicsConfig::with_time_constant(0.0);
        assert_eq!(config.compute_alpha(0.01), 1.0);
    }

    #[test]
    fn test_zero_action_is_half_throttle() {
        let s = mix(NormalizedAction::new([0.0; 4]));
        assert_eq!(s.as_array(), [0.5; 4]);
    }

    #[test]
    fn test_mixer_pitch_moves_front_and_back() {
        let s = mix(NormalizedAction::new([0.0, 0.0, 1.0, 0.0])).as_array();
        assert!((s[0] - 0.2).abs() < 1e-12);
        assert!((s[1] - 0.8).abs() < 1e-12);
        assert_eq!(s[2], 0.5);
        assert_eq!(s[3], 0.5);
    }

    #[test]
    fn test_mixer_clamps_saturated_targets() {
        let s = mix(NormalizedAction::new([1.0, 1.0, 1.0, 1.0])).as_array();
        for v in s {
            assert!((0.0..=1.0).contains(&v));
        }
        assert_eq!(s[1], 1.0);
    }

    #[test]
    fn test_motor_63_percent_at_tau() {
        let config = MotorDynamicsConfig::with_time_constant(0.02);
        let dt = 0.0001;
        let alpha = config.compute_alpha(dt);
        let mut s = 0.0;
        for _ in 0..200 {
            s = apply_motor_dynamics(1.0, s, alpha);
        }
        let expected = 1.0 - (-1.0_f64).exp();
        assert!((s - expected).abs() < 0.01, "got {}", s);
    }

    #[test]
    fn test_step_motors_stays_in_unit_interval() {
        let mut current = MotorSpeeds::default();
        let target = MotorSpeeds::new([1.0, 0.0, 1.0, 0.0]);
        for _ in 0..1000 {
            current = step_motors(target, current, 0.9);
            for v in current.as_array() {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
