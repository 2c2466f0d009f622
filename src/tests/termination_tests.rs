//! Termination tests defining how an episode ends.
//!
//! These tests define:
//! - Out-of-bounds exits, including falling below the ground threshold
//! - Ground collision
//! - Attitude limits, and running without them
//! - Time limit truncation and its exclusivity with termination

use crate::config::EnvConfig;
use crate::env::{EnvSettings, StepOutcome, WaypointEnv};
use crate::error::EnvError;
use crate::termination::{CrashKind, TIMEOUT_LABEL};

// ============================================================================
// Helper Functions
// ============================================================================

fn env_with(cfg: EnvConfig) -> WaypointEnv {
    let mut env = WaypointEnv::new(EnvSettings::default().with_env(cfg), 42).unwrap();
    env.reset(Some(42)).unwrap();
    env
}

/// Step until the episode ends or `limit` steps pass.
fn run_until_done(env: &mut WaypointEnv, action: [f64; 4], limit: usize) -> Vec<StepOutcome> {
    let mut outcomes = Vec::new();
    for _ in 0..limit {
        let out = env.step(action).unwrap();
        let done = out.done();
        outcomes.push(out);
        if done {
            break;
        }
    }
    outcomes
}

// ============================================================================
// Out of Bounds
// ============================================================================

#[test]
fn should_end_free_fall_below_ground_threshold_as_out_of_bounds() {
    let cfg = EnvConfig::deterministic().with_tilt_termination(false);
    let mut env = env_with(cfg);
    let outcomes = run_until_done(&mut env, [-1.0, 0.0, 0.0, 0.0], 200);

    let last = outcomes.last().unwrap();
    assert!(last.terminated && !last.truncated);
    assert_eq!(last.info.crash, Some(CrashKind::OutOfBounds));
    assert_eq!(last.info.crash_type(), Some("out_of_bounds"));
    assert!(last.info.position[2] < 0.05);
    assert!(outcomes.len() < 60, "fell for {} steps", outcomes.len());

    let total: f64 = outcomes.iter().map(|o| o.reward).sum();
    // Time penalties, negative progress and the crash penalty
    assert!(total < -5.0 && total > -15.0, "total {}", total);
}

#[test]
fn should_end_climb_past_ceiling_as_out_of_bounds() {
    let cfg = EnvConfig::deterministic().with_tilt_termination(false);
    let ceiling = cfg.max_altitude + cfg.bounds_margin;
    let mut env = env_with(cfg);
    let outcomes = run_until_done(&mut env, [1.0, 0.0, 0.0, 0.0], 1000);

    let last = outcomes.last().unwrap();
    assert_eq!(last.info.crash, Some(CrashKind::OutOfBounds));
    assert!(last.info.position[2] > ceiling);
}

// ============================================================================
// Collision
// ============================================================================

#[test]
fn should_report_collision_when_body_touches_ground() {
    let mut cfg = EnvConfig::deterministic().with_tilt_termination(false);
    cfg.ground_threshold = 0.0;
    let mut env = env_with(cfg);
    let outcomes = run_until_done(&mut env, [-1.0, 0.0, 0.0, 0.0], 200);

    let last = outcomes.last().unwrap();
    assert!(last.terminated);
    assert_eq!(last.info.crash, Some(CrashKind::Collision));
    assert_eq!(last.info.crash_type(), Some("collision"));
    assert!(last.info.position[2] >= 0.0);
}

// ============================================================================
// Attitude
// ============================================================================

#[test]
fn should_terminate_on_excessive_tilt() {
    let mut env = env_with(EnvConfig::deterministic());
    let outcomes = run_until_done(&mut env, [0.0, 1.0, 0.0, 0.0], 100);

    let last = outcomes.last().unwrap();
    assert!(last.terminated);
    assert_eq!(last.info.crash, Some(CrashKind::ExcessiveTilt));
    assert!(last.info.max_tilt_deg > 1.4_f64.to_degrees());
    assert!(outcomes.len() < 40);
}

#[test]
fn should_keep_flying_past_tilt_limit_when_disabled() {
    let mut env = env_with(EnvConfig::deterministic().with_tilt_termination(false));
    let outcomes = run_until_done(&mut env, [0.0, 1.0, 0.0, 0.0], 25);

    assert_eq!(outcomes.len(), 25);
    assert!(outcomes.iter().all(|o| !o.done()));
    assert!(outcomes[24].info.max_tilt_deg > 1.4_f64.to_degrees());
}

// ============================================================================
// Truncation
// ============================================================================

#[test]
fn should_truncate_at_step_limit() {
    let mut env = env_with(EnvConfig::deterministic().with_max_episode_steps(30));
    let outcomes = run_until_done(&mut env, [0.0; 4], 100);

    assert_eq!(outcomes.len(), 30);
    let last = outcomes.last().unwrap();
    assert!(last.truncated && !last.terminated);
    assert!(last.info.time_limit_reached);
    assert_eq!(last.info.crash, None);
    assert_eq!(last.info.crash_type(), Some(TIMEOUT_LABEL));
    assert_eq!(last.info.episode_step, 30);
    assert!(outcomes[..29].iter().all(|o| !o.done()));
}

#[test]
fn should_not_truncate_a_terminated_step() {
    let mut cfg = EnvConfig::deterministic()
        .with_max_waypoints(1)
        .with_max_episode_steps(1);
    cfg.waypoint_radius = 7.0;
    let mut env = env_with(cfg);

    let out = env.step([0.0; 4]).unwrap();
    assert!(out.terminated && out.info.success);
    assert!(!out.truncated);
    assert!(!out.info.time_limit_reached);
}

#[test]
fn should_require_reset_after_truncation() {
    let mut env = env_with(EnvConfig::deterministic().with_max_episode_steps(5));
    run_until_done(&mut env, [0.0; 4], 5);
    assert!(env.needs_reset());
    assert!(matches!(env.step([0.0; 4]), Err(EnvError::NeedsReset)));

    env.reset(None).unwrap();
    assert!(!env.needs_reset());
    assert_eq!(env.step([0.0; 4]).unwrap().info.episode_step, 1);
}
