//! Episode termination and truncation checking.
//!
//! Every failure condition is evaluated on each step:
//! - Ground or structural collision
//! - Excessive tilt (when tilt termination is enabled)
//! - Leaving the arena, the altitude ceiling, or dropping below the
//!   ground threshold
//!
//! The penalties of all conditions that hold are summed. The reported kind
//! is the last one in the list above that holds.
//!
//! Truncation is the step limit alone and never coincides with a
//! termination on the same step.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{EnvConfig, RewardConfig};
use crate::types::{Vec3, WorldFrame};

// ============================================================================
// Crash Kinds
// ============================================================================

/// Why an episode failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashKind {
    Collision,
    ExcessiveTilt,
    OutOfBounds,
}

/// Label recorded for an episode that ran out of steps.
pub const TIMEOUT_LABEL: &str = "timeout";

impl CrashKind {
    pub const ALL: [CrashKind; 3] = [
        CrashKind::Collision,
        CrashKind::ExcessiveTilt,
        CrashKind::OutOfBounds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrashKind::Collision => "collision",
            CrashKind::ExcessiveTilt => "excessive_tilt",
            CrashKind::OutOfBounds => "out_of_bounds",
        }
    }

    /// Penalty subtracted from the step reward.
    pub fn penalty(&self, cfg: &RewardConfig) -> f64 {
        match self {
            CrashKind::Collision => cfg.collision_penalty,
            CrashKind::ExcessiveTilt => cfg.tilt_penalty,
            CrashKind::OutOfBounds => cfg.out_of_bounds_penalty,
        }
    }
}

impl fmt::Display for CrashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Crash
// ============================================================================

/// Failure found on one step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Crash {
    /// Last matching condition
    pub kind: CrashKind,
    /// Sum of the penalties of every matching condition
    pub penalty: f64,
}

// ============================================================================
// Checks
// ============================================================================

/// Outside the arena square (plus margin), above the ceiling (plus margin),
/// or below the ground threshold.
#[inline]
pub fn is_out_of_bounds(position: Vec3<WorldFrame>, cfg: &EnvConfig) -> bool {
    let half = cfg.arena_size / 2.0 + cfg.bounds_margin;
    position.x().abs() > half
        || position.y().abs() > half
        || position.z() > cfg.max_altitude + cfg.bounds_margin
        || position.z() < cfg.ground_threshold
}

#[inline]
pub fn is_excessive_tilt(tilt: f64, cfg: &EnvConfig) -> bool {
    !cfg.disable_tilt_termination && tilt > cfg.max_tilt_angle
}

/// All failure conditions that hold this step, folded into one [`Crash`].
///
/// Non-finite positions are treated as out of bounds.
pub fn check_crash(
    ground_contact: bool,
    tilt: f64,
    position: Vec3<WorldFrame>,
    cfg: &EnvConfig,
    rewards: &RewardConfig,
) -> Option<Crash> {
    let holds = |kind: &CrashKind| match kind {
        CrashKind::Collision => ground_contact,
        CrashKind::ExcessiveTilt => is_excessive_tilt(tilt, cfg),
        CrashKind::OutOfBounds => !position.is_finite() || is_out_of_bounds(position, cfg),
    };
    CrashKind::ALL
        .iter()
        .filter(|kind| holds(kind))
        .fold(None, |crash: Option<Crash>, &kind| {
            let penalty = crash.map_or(0.0, |c| c.penalty) + kind.penalty(rewards);
            Some(Crash { kind, penalty })
        })
}

/// Step limit reached.
#[inline]
pub fn check_truncated(episode_step: u64, cfg: &EnvConfig) -> bool {
    episode_step >= cfg.max_episode_steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: f64, y: f64, z: f64) -> Vec3<WorldFrame> {
        Vec3::new(x, y, z)
    }

    #[test]
    fn test_arena_bounds() {
        let cfg = EnvConfig::default();
        // half-width 12.5 + 5 margin
        assert!(!is_out_of_bounds(pos(17.4, 0.0, 2.0), &cfg));
        assert!(is_out_of_bounds(pos(17.6, 0.0, 2.0), &cfg));
        assert!(is_out_of_bounds(pos(0.0, -17.6, 2.0), &cfg));
        assert!(is_out_of_bounds(pos(0.0, 0.0, 15.1), &cfg));
        assert!(is_out_of_bounds(pos(0.0, 0.0, 0.04), &cfg));
        assert!(!is_out_of_bounds(pos(0.0, 0.0, 0.06), &cfg));
    }

    #[test]
    fn test_single_collision() {
        let cfg = EnvConfig::default();
        let crash = check_crash(true, 0.0, pos(0.0, 0.0, 1.0), &cfg, &RewardConfig::default());
        assert_eq!(
            crash,
            Some(Crash {
                kind: CrashKind::Collision,
                penalty: 10.0
            })
        );
    }

    #[test]
    fn test_collision_and_bounds_sum_penalties_and_report_bounds() {
        let cfg = EnvConfig::default();
        let crash = check_crash(true, 0.0, pos(0.0, 0.0, 0.01), &cfg, &RewardConfig::default());
        let crash = crash.unwrap();
        assert_eq!(crash.kind, CrashKind::OutOfBounds);
        assert_eq!(crash.penalty, 15.0);
    }

    #[test]
    fn test_every_condition_at_once() {
        let cfg = EnvConfig::default();
        let crash = check_crash(true, 2.0, pos(0.0, 0.0, 0.0), &cfg, &RewardConfig::default());
        let crash = crash.unwrap();
        assert_eq!(crash.kind, CrashKind::OutOfBounds);
        assert_eq!(crash.penalty, 25.0);
    }

    #[test]
    fn test_tilt_and_bounds_report_bounds() {
        let cfg = EnvConfig::default();
        let crash = check_crash(false, 1.5, pos(0.0, 0.0, 0.01), &cfg, &RewardConfig::default());
        assert_eq!(crash.map(|c| c.kind), Some(CrashKind::OutOfBounds));
    }

    #[test]
    fn test_tilt_ignored_when_disabled() {
        let cfg = EnvConfig::default().with_tilt_termination(false);
        let crash = check_crash(false, 3.0, pos(0.0, 0.0, 2.0), &cfg, &RewardConfig::default());
        assert_eq!(crash, None);
    }

    #[test]
    fn test_non_finite_position_is_out_of_bounds() {
        let cfg = EnvConfig::default();
        let crash = check_crash(false, 0.0, pos(f64::NAN, 0.0, 2.0), &cfg, &RewardConfig::default());
        assert_eq!(crash.map(|c| c.kind), Some(CrashKind::OutOfBounds));
    }

    #[test]
    fn test_truncation_at_limit() {
        let cfg = EnvConfig::default().with_max_episode_steps(10);
        assert!(!check_truncated(9, &cfg));
        assert!(check_truncated(10, &cfg));
    }

    #[test]
    fn test_labels_and_penalties() {
        let r = RewardConfig::default();
        assert_eq!(CrashKind::OutOfBounds.to_string(), "out_of_bounds");
        assert_eq!(CrashKind::ExcessiveTilt.as_str(), "excessive_tilt");
        assert_eq!(CrashKind::Collision.penalty(&r), 10.0);
        assert_eq!(CrashKind::OutOfBounds.penalty(&r), 5.0);
    }
}
