//! Environment tests defining the reset/step contract of `WaypointEnv`.
//!
//! These tests define:
//! - Observation layout and the optional position block
//! - Reward shaping along a trajectory
//! - Waypoint reaching and course completion
//! - Reproducibility under seeds

use crate::config::EnvConfig;
use crate::constants::{BASE_OBS_DIM, FIXED_WAYPOINTS, G, POSITION_OBS_DIM, START_POSITION};
use crate::env::{EnvSettings, StepOutcome, WaypointEnv};
use crate::error::EnvError;
use crate::reward::TimePenalty;

// ============================================================================
// Helper Functions
// ============================================================================

fn env_with(cfg: EnvConfig, seed: u64) -> WaypointEnv {
    WaypointEnv::new(EnvSettings::default().with_env(cfg), seed).unwrap()
}

fn baseline() -> EnvConfig {
    EnvConfig::deterministic().with_tilt_termination(false)
}

fn run(env: &mut WaypointEnv, action: [f64; 4], steps: usize) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(steps);
    for _ in 0..steps {
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
// Observation
// ============================================================================

#[test]
fn should_describe_start_state_in_initial_observation() {
    let mut env = env_with(baseline(), 0);
    let (obs, _) = env.reset(Some(42)).unwrap();
    assert_eq!(obs.len(), BASE_OBS_DIM);

    // At rest, level, gravity reaction only
    assert_eq!(&obs[0..3], &[0.0, 0.0, 0.0]);
    assert_eq!(&obs[3..7], &[1.0, 0.0, 0.0, 0.0]);
    assert!((obs[9] - G).abs() < 1e-12);

    let wp = FIXED_WAYPOINTS[0];
    let rel = [
        wp[0] - START_POSITION[0],
        wp[1] - START_POSITION[1],
        wp[2] - START_POSITION[2],
    ];
    for (i, r) in rel.iter().enumerate() {
        assert!((obs[13 + i] - r / 12.0).abs() < 1e-12);
    }
    assert_eq!(obs[16], 0.0);
    let dist = (rel[0] * rel[0] + rel[1] * rel[1] + rel[2] * rel[2]).sqrt();
    assert!((obs[17] - dist / 12.0).abs() < 1e-12);
    assert_eq!(obs[18], 0.0);
}

#[test]
fn should_append_position_when_enabled() {
    let mut env = env_with(baseline().with_position_observation(true), 0);
    assert_eq!(env.observation_dim(), POSITION_OBS_DIM);
    let (obs, _) = env.reset(Some(0)).unwrap();
    assert_eq!(obs.len(), POSITION_OBS_DIM);
    assert_eq!(&obs[19..22], &START_POSITION);

    let out = env.step([0.0; 4]).unwrap();
    assert_eq!(&out.observation[19..22], &out.info.position);
}

#[test]
fn should_keep_observations_finite_and_bounded() {
    let mut env = env_with(EnvConfig::default(), 3);
    env.reset(Some(3)).unwrap();
    for out in run(&mut env, [0.8, 0.2, -0.1, 0.05], 300) {
        assert!(out.observation.iter().all(|v| v.is_finite()));
        for v in &out.observation[13..19] {
            assert!((-1.0..=1.0).contains(v), "bounded component {}", v);
        }
    }
}

// ============================================================================
// Rewards
// ============================================================================

#[test]
fn should_pay_only_time_penalty_on_first_hover_step() {
    let mut env = env_with(baseline(), 0);
    env.reset(Some(0)).unwrap();
    let out = env.step([0.0; 4]).unwrap();
    assert!((out.reward + 0.01).abs() < 1e-12);
}

#[test]
fn should_penalize_moving_away_from_waypoint() {
    let mut env = env_with(baseline(), 0);
    env.reset(Some(0)).unwrap();
    let outcomes = run(&mut env, [-1.0, 0.0, 0.0, 0.0], 20);
    // Falling increases the distance to the elevated first waypoint
    for out in &outcomes[1..] {
        assert!(out.reward < -0.01, "reward {}", out.reward);
    }
}

#[test]
fn should_accumulate_episode_reward() {
    let mut env = env_with(baseline(), 0);
    env.reset(Some(0)).unwrap();
    let total: f64 = run(&mut env, [0.3, 0.0, 0.0, 0.0], 50)
        .iter()
        .map(|o| o.reward)
        .sum();
    assert!((env.episode_reward() - total).abs() < 1e-9);
}

#[test]
fn should_use_custom_reward_components() {
    let settings = EnvSettings::default().with_env(baseline());
    let mut env = WaypointEnv::with_reward(settings, TimePenalty { penalty: 0.5 }, 0).unwrap();
    env.reset(Some(0)).unwrap();
    for _ in 0..10 {
        let out = env.step([0.2, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(out.reward, -0.5);
    }
}

// ============================================================================
// Waypoints
// ============================================================================

#[test]
fn should_complete_single_waypoint_course_with_bonus() {
    let mut cfg = baseline().with_max_waypoints(1);
    // Wide enough to contain the start position
    cfg.waypoint_radius = 7.0;
    let mut env = env_with(cfg, 0);
    env.reset(Some(0)).unwrap();

    let out = env.step([0.0; 4]).unwrap();
    assert!(out.info.waypoint_reached);
    assert!(out.terminated && !out.truncated);
    assert!(out.info.success);
    assert_eq!(out.info.current_waypoint_idx, 1);
    assert_eq!(out.info.completion_steps, Some(1));
    assert!(out.info.crash.is_none());
    assert_eq!(out.info.crash_type(), None);
    // Waypoint bonus plus the completion bonus
    assert!(out.reward > 150.0, "reward {}", out.reward);
    assert!(matches!(env.step([0.0; 4]), Err(EnvError::NeedsReset)));
}

#[test]
fn should_advance_to_next_waypoint_once() {
    let mut cfg = baseline().with_max_waypoints(2);
    cfg.waypoint_radius = 7.0;
    let mut env = env_with(cfg, 0);
    env.reset(Some(0)).unwrap();

    let first = env.step([0.0; 4]).unwrap();
    assert!(first.info.waypoint_reached && !first.done());
    assert!(first.reward > 49.0);
    assert_eq!(first.info.time_to_first_wp, Some(1));
    assert_eq!(first.info.target_waypoint(), Some(FIXED_WAYPOINTS[1]));

    let second = env.step([0.0; 4]).unwrap();
    assert!(!second.info.waypoint_reached);
    assert!(second.reward < 1.0);
    assert_eq!(env.current_waypoint_idx(), 1);
}

/// Distance to waypoint 0 after one hover step from the fixed start.
fn first_step_distance() -> f64 {
    let mut env = env_with(baseline(), 0);
    env.reset(Some(0)).unwrap();
    env.step([0.0; 4]).unwrap().info.distance
}

#[test]
fn should_not_reach_waypoint_at_exactly_the_radius() {
    let distance = first_step_distance();
    let mut cfg = baseline();
    cfg.waypoint_radius = distance;
    let mut env = env_with(cfg, 0);
    env.reset(Some(0)).unwrap();

    let out = env.step([0.0; 4]).unwrap();
    assert_eq!(out.info.distance, distance);
    assert!(!out.info.waypoint_reached);
    assert_eq!(out.info.current_waypoint_idx, 0);
}

#[test]
fn should_reach_waypoint_just_inside_the_radius() {
    let distance = first_step_distance();
    let mut cfg = baseline();
    cfg.waypoint_radius = distance * (1.0 + 1e-9);
    let mut env = env_with(cfg, 0);
    env.reset(Some(0)).unwrap();

    let out = env.step([0.0; 4]).unwrap();
    assert_eq!(out.info.distance, distance);
    assert!(out.info.waypoint_reached);
    assert_eq!(out.info.current_waypoint_idx, 1);
}

#[test]
fn should_never_decrease_waypoint_index() {
    let mut cfg = EnvConfig::default().with_max_waypoints(3);
    cfg.waypoint_radius = 7.0;
    let mut env = env_with(cfg, 9);
    env.reset(Some(9)).unwrap();
    let mut last = 0;
    for out in run(&mut env, [0.6, 0.0, 0.1, 0.0], 500) {
        assert!(out.info.current_waypoint_idx >= last);
        last = out.info.current_waypoint_idx;
    }
}

// ============================================================================
// Reproducibility
// ============================================================================

#[test]
fn should_generate_same_course_for_same_seed() {
    let cfg = EnvConfig::default()
        .with_waypoint_noise(1.0)
        .with_yaw_random(true);
    let mut a = env_with(cfg.clone(), 7);
    let mut b = env_with(cfg, 7);
    let (_, ia) = a.reset(Some(7)).unwrap();
    let (_, ib) = b.reset(Some(7)).unwrap();

    assert_eq!(ia.waypoints.len(), ib.waypoints.len());
    for (wa, wb) in ia.waypoints.iter().zip(&ib.waypoints) {
        for k in 0..3 {
            assert!((wa[k] - wb[k]).abs() < 1e-12);
        }
    }
    assert_ne!(ia.waypoints[0], FIXED_WAYPOINTS[0]);
}

#[test]
fn should_replay_identical_trajectory_after_reseeding() {
    let mut env = env_with(baseline(), 0);
    let actions: Vec<[f64; 4]> = (0..100)
        .map(|i| {
            let t = i as f64 * 0.1;
            [0.2 * t.sin(), 0.01 * t.cos(), 0.01 * t.sin(), 0.0]
        })
        .collect();

    let mut trajectories = Vec::new();
    for _ in 0..2 {
        let (obs, _) = env.reset(Some(5)).unwrap();
        let mut trace = vec![obs];
        for a in &actions {
            trace.push(env.step(*a).unwrap().observation);
        }
        trajectories.push(trace);
    }
    assert_eq!(trajectories[0], trajectories[1]);
}

#[test]
fn should_replay_noisy_sensor_under_same_seed() {
    let mut a = env_with(EnvConfig::default(), 1);
    let mut b = env_with(EnvConfig::default(), 2);
    assert_eq!(a.reset(Some(21)).unwrap().0, b.reset(Some(21)).unwrap().0);
    for _ in 0..30 {
        let oa = a.step([0.1, 0.0, 0.0, 0.0]).unwrap();
        let ob = b.step([0.1, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(oa.observation, ob.observation);
        assert_eq!(oa.reward, ob.reward);
    }
}

#[test]
fn should_continue_generator_on_unseeded_reset() {
    let cfg = EnvConfig::default().with_waypoint_noise(1.0);
    let mut env = env_with(cfg, 4);
    let (_, first) = env.reset(Some(4)).unwrap();
    let (_, second) = env.reset(None).unwrap();
    assert_ne!(first.waypoints, second.waypoints);
}
