//! Waypoint-course environment.
//!
//! One quadcopter, one sensor, one course. The episode contract is the
//! usual pair:
//!
//! - `reset(seed) -> (observation, ResetInfo)`
//! - `step(action) -> StepOutcome { observation, reward, terminated, truncated, info }`
//!
//! Generic over the per-step shaping `R` for compile-time reward
//! composition; defaults to [`ShapedReward`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{
    EnvConfig, ExperimentConfig, QuadcopterConfig, RewardConfig, SensorConfig, StageConfig,
};
use crate::constants::{ACTION_DIM, QUAT_NORM_TOLERANCE, START_CLEARANCE, START_POSITION};
use crate::error::EnvError;
use crate::info::{ResetInfo, StepInfo};
use crate::observation::{build_observation, ObservationContext};
use crate::physics::Quadcopter;
use crate::reward::{completion_bonus, shaped_reward, RewardComponent, RewardContext, ShapedReward};
use crate::sensor::{SensorModel, SensorReadings};
use crate::state::QuadState;
use crate::termination::{check_crash, check_truncated};
use crate::types::{NormalizedAction, UnitQuaternion, Vec3, WorldFrame};
use crate::waypoints::WaypointCourse;

// ============================================================================
// Settings
// ============================================================================

/// Everything an environment instance needs, taken from an experiment.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct EnvSettings {
    pub env: EnvConfig,
    pub reward: RewardConfig,
    pub quadcopter: QuadcopterConfig,
    pub sensor: SensorConfig,
}

impl EnvSettings {
    /// Base `env` section.
    pub fn from_experiment(cfg: &ExperimentConfig) -> Self {
        Self {
            env: cfg.env.clone(),
            reward: cfg.reward.clone(),
            quadcopter: cfg.quadcopter.clone(),
            sensor: cfg.sensor.clone(),
        }
    }

    /// Base `env` section with a stage's overrides merged on top.
    pub fn for_stage(cfg: &ExperimentConfig, stage: &StageConfig) -> Self {
        Self::from_experiment(cfg).with_env(cfg.env.with_stage(stage))
    }

    /// Evaluation variant of a stage: the stage's course and start policy
    /// with the `evaluation.env` overrides applied.
    pub fn for_evaluation(cfg: &ExperimentConfig, stage: Option<&StageConfig>) -> Self {
        let base = match stage {
            Some(stage) => cfg.env.with_stage(stage),
            None => cfg.env.clone(),
        };
        Self::from_experiment(cfg).with_env(base.with_overrides(&cfg.evaluation.env))
    }

    /// Base `env` section with the `demo.env` overrides.
    pub fn for_demo(cfg: &ExperimentConfig) -> Self {
        Self::from_experiment(cfg).with_env(cfg.env.with_overrides(&cfg.demo.env))
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env = env;
        self
    }

    pub fn validate(&self) -> Result<(), EnvError> {
        self.env.validate().map_err(EnvError::InvalidSettings)?;
        self.reward.validate().map_err(EnvError::InvalidSettings)?;
        self.quadcopter
            .validate()
            .map_err(EnvError::InvalidSettings)?;
        self.sensor.validate().map_err(EnvError::InvalidSettings)?;
        Ok(())
    }
}

// ============================================================================
// Step Outcome
// ============================================================================

/// Result of one `step`.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub observation: Vec<f64>,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepOutcome {
    #[inline]
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

// ============================================================================
// Episode State
// ============================================================================

#[derive(Clone, Debug, Default)]
struct EpisodeState {
    current_idx: usize,
    step: u64,
    prev_distance: Option<f64>,
    speed_sum: f64,
    speed_steps: u64,
    max_tilt: f64,
    time_to_first_wp: Option<u64>,
    total_reward: f64,
}

impl EpisodeState {
    fn mean_speed(&self) -> f64 {
        if self.speed_steps > 0 {
            self.speed_sum / self.speed_steps as f64
        } else {
            0.0
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Quadcopter waypoint-course environment.
pub struct WaypointEnv<R: RewardComponent = ShapedReward> {
    settings: EnvSettings,
    reward_fn: R,
    /// Built lazily on the first reset
    quad: Option<Quadcopter>,
    sensor: SensorModel,
    rng: StdRng,
    course: WaypointCourse,
    effective_waypoints: usize,
    episode: EpisodeState,
    last_readings: Option<SensorReadings>,
    needs_reset: bool,
}

impl WaypointEnv<ShapedReward> {
    /// Environment with the default shaping built from `settings.reward`.
    pub fn new(settings: EnvSettings, seed: u64) -> Result<Self, EnvError> {
        let reward_fn = shaped_reward(&settings.reward);
        Self::with_reward(settings, reward_fn, seed)
    }
}

impl<R: RewardComponent> WaypointEnv<R> {
    /// Environment with a custom per-step shaping.
    pub fn with_reward(settings: EnvSettings, reward_fn: R, seed: u64) -> Result<Self, EnvError> {
        settings.validate()?;
        let sensor = SensorModel::new(settings.sensor.clone(), seed);
        let effective_waypoints = settings.env.effective_waypoints();
        Ok(Self {
            settings,
            reward_fn,
            quad: None,
            sensor,
            rng: StdRng::seed_from_u64(seed),
            course: WaypointCourse::fixed(),
            effective_waypoints,
            episode: EpisodeState::default(),
            last_readings: None,
            needs_reset: true,
        })
    }

    pub fn settings(&self) -> &EnvSettings {
        &self.settings
    }

    pub fn observation_dim(&self) -> usize {
        self.settings.env.observation_dim()
    }

    pub fn action_dim(&self) -> usize {
        ACTION_DIM
    }

    pub fn course(&self) -> &WaypointCourse {
        &self.course
    }

    pub fn current_waypoint_idx(&self) -> usize {
        self.episode.current_idx
    }

    pub fn effective_waypoints(&self) -> usize {
        self.effective_waypoints
    }

    pub fn episode_step(&self) -> u64 {
        self.episode.step
    }

    /// Undiscounted return accumulated this episode.
    pub fn episode_reward(&self) -> f64 {
        self.episode.total_reward
    }

    /// True state, once physics exists.
    pub fn true_state(&self) -> Option<QuadState> {
        self.quad.as_ref().map(|quad| quad.get_state())
    }

    /// Most recent sensor sample.
    pub fn last_readings(&self) -> Option<&SensorReadings> {
        self.last_readings.as_ref()
    }

    /// True after the episode ended and before the next reset.
    pub fn needs_reset(&self) -> bool {
        self.needs_reset
    }

    fn start_position(&mut self) -> Vec3<WorldFrame> {
        let env = &self.settings.env;
        let min_z = env.ground_threshold + START_CLEARANCE;
        let mut pos = START_POSITION;
        if env.random_start_position {
            let jitter = if env.start_position_noise > 0.0 {
                env.start_position_noise
            } else {
                min_z
            };
            if jitter > 0.0 {
                for c in pos.iter_mut() {
                    *c += self.rng.gen_range(-jitter..jitter);
                }
            }
        }
        pos[2] = pos[2].max(min_z);
        Vec3::from_array(pos)
    }

    /// Start a new episode.
    ///
    /// `Some(seed)` reseeds the course generator and the sensor;
    /// `None` continues the generator and derives the sensor seed from it.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<(Vec<f64>, ResetInfo), EnvError> {
        if self.quad.is_none() {
            self.quad = Some(Quadcopter::new(
                &self.settings.quadcopter,
                self.settings.env.timestep,
            )?);
        }

        match seed {
            Some(seed) => {
                self.rng = StdRng::seed_from_u64(seed);
                self.sensor.reset(Some(seed));
            }
            None => {
                let sensor_seed: u64 = self.rng.gen();
                self.sensor.reset(Some(sensor_seed));
            }
        }

        let start = self.start_position();
        let env = &self.settings.env;
        self.course =
            WaypointCourse::generate(&mut self.rng, env.waypoint_noise, env.waypoint_yaw_random);
        self.effective_waypoints = env.effective_waypoints();

        let start_idx = if env.random_start_waypoint {
            self.rng.gen_range(0..self.effective_waypoints)
        } else {
            0
        };
        self.episode = EpisodeState {
            current_idx: start_idx,
            ..EpisodeState::default()
        };

        let quad = self.quad.as_mut().ok_or(EnvError::NeedsReset)?;
        let state = quad.reset(start, UnitQuaternion::identity());
        let readings = self
            .sensor
            .get_readings(&state, env.timestep, env.add_sensor_noise);
        let obs = self.observe(&readings);
        self.last_readings = Some(readings);
        self.needs_reset = false;

        log::debug!(
            "reset: start ({:.2}, {:.2}, {:.2}), yaw {:.3}, idx {}/{}",
            start.x(),
            start.y(),
            start.z(),
            self.course.yaw(),
            start_idx,
            self.effective_waypoints
        );

        let info = ResetInfo {
            waypoints: self.course.as_arrays(),
            waypoint_yaw: self.course.yaw(),
            current_waypoint_idx: start_idx,
            max_waypoints: self.effective_waypoints,
        };
        Ok((obs, info))
    }

    fn observe(&self, readings: &SensorReadings) -> Vec<f64> {
        let env = &self.settings.env;
        let ctx = ObservationContext {
            waypoint: self.course.get(self.episode.current_idx),
            current_idx: self.episode.current_idx,
            effective_waypoints: self.effective_waypoints,
            goal_max_distance: env.goal_max_distance,
            speed_normalization: env.speed_normalization,
            include_position: env.include_position,
        };
        build_observation(readings, &ctx)
    }

    /// Advance one physics tick.
    ///
    /// The action is scaled by `action_scale` and clipped to [-1, 1].
    pub fn step(&mut self, action: [f64; 4]) -> Result<StepOutcome, EnvError> {
        if self.needs_reset {
            return Err(EnvError::NeedsReset);
        }
        let env = &self.settings.env;
        let dt = env.timestep;
        let quad = self.quad.as_mut().ok_or(EnvError::NeedsReset)?;

        self.episode.step += 1;
        let step = self.episode.step;

        quad.apply_action(NormalizedAction::scaled(action, env.action_scale), dt);
        if let Err(e) = quad.step_physics() {
            self.needs_reset = true;
            return Err(e.into());
        }

        let state = quad.get_state();
        let ground_contact = quad.check_ground_contact();
        let tilt = quad.get_tilt_angle();
        let readings = self.sensor.get_readings(&state, dt, env.add_sensor_noise);

        let qnorm = state.orientation.norm();
        if (qnorm - 1.0).abs() > QUAT_NORM_TOLERANCE {
            log::warn!("quaternion norm drifted to {:.6} at step {}", qnorm, step);
        }

        let target = self.course.get(self.episode.current_idx);
        let distance = (state.position - target).norm();
        let speed = state.speed();
        self.episode.speed_sum += speed;
        self.episode.speed_steps += 1;
        self.episode.max_tilt = self.episode.max_tilt.max(tilt);

        let waypoint_reached = distance < env.waypoint_radius;

        let mut reward = self.reward_fn.compute(&RewardContext {
            distance,
            prev_distance: self.episode.prev_distance,
            waypoint_reached,
            waypoint_radius: env.waypoint_radius,
        });
        self.episode.prev_distance = Some(distance);

        let mut terminated = false;
        let mut success = false;
        let mut completion_steps = None;
        if waypoint_reached {
            self.episode.current_idx += 1;
            self.episode.prev_distance = None;
            self.episode.time_to_first_wp.get_or_insert(step);
            log::debug!("waypoint {} reached at step {}", self.episode.current_idx, step);

            if self.episode.current_idx >= self.effective_waypoints {
                terminated = true;
                success = true;
                completion_steps = Some(step);
                reward += completion_bonus(&self.settings.reward, env.max_episode_steps, step);
            }
        }

        let crash = if success {
            None
        } else {
            check_crash(ground_contact, tilt, state.position, env, &self.settings.reward)
        };
        if let Some(crash) = crash {
            terminated = true;
            reward -= crash.penalty;
        }

        let truncated = !terminated && check_truncated(step, env);

        let info = StepInfo {
            distance,
            speed,
            mean_speed: self.episode.mean_speed(),
            max_tilt_deg: self.episode.max_tilt.to_degrees(),
            time_to_first_wp: self.episode.time_to_first_wp,
            current_waypoint_idx: self.episode.current_idx,
            max_waypoints: self.effective_waypoints,
            waypoint_reached,
            episode_step: step,
            waypoint_yaw: self.course.yaw(),
            position: state.position.as_array(),
            velocity: state.velocity.as_array(),
            orientation: state.orientation.as_array(),
            waypoints: self.course.as_arrays(),
            success,
            completion_steps,
            crash: crash.map(|c| c.kind),
            time_limit_reached: truncated,
            terminal_observation: None,
            episode: None,
        };

        self.episode.total_reward += reward;
        let observation = self.observe(&readings);
        self.last_readings = Some(readings);

        if terminated || truncated {
            self.needs_reset = true;
            log::debug!(
                "episode end at step {}: success={} crash={:?} truncated={} return={:.2}",
                step,
                success,
                crash,
                truncated,
                self.episode.total_reward
            );
        }

        Ok(StepOutcome {
            observation,
            reward,
            terminated,
            truncated,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic() -> EnvSettings {
        EnvSettings::default().with_env(EnvConfig::deterministic())
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut env = WaypointEnv::new(deterministic(), 0).unwrap();
        assert!(matches!(env.step([0.0; 4]), Err(EnvError::NeedsReset)));
    }

    #[test]
    fn test_reset_info() {
        let mut env = WaypointEnv::new(deterministic(), 0).unwrap();
        let (obs, info) = env.reset(Some(42)).unwrap();
        assert_eq!(obs.len(), 19);
        assert_eq!(info.waypoints.len(), 10);
        assert_eq!(info.waypoints[0], [5.5, 0.0, 3.3]);
        assert_eq!(info.waypoint_yaw, 0.0);
        assert_eq!(info.current_waypoint_idx, 0);
        assert_eq!(info.max_waypoints, 10);
    }

    #[test]
    fn test_first_step_reward_is_time_penalty() {
        let mut env = WaypointEnv::new(deterministic(), 0).unwrap();
        env.reset(Some(1)).unwrap();
        let out = env.step([0.0; 4]).unwrap();
        assert!((out.reward + 0.01).abs() < 1e-12, "reward {}", out.reward);
        assert!(!out.done());
    }

    #[test]
    fn test_start_position_clamped_above_ground() {
        let cfg = EnvConfig::deterministic().with_random_start_position(5.0);
        let mut env = WaypointEnv::new(EnvSettings::default().with_env(cfg), 3).unwrap();
        for seed in 0..20 {
            env.reset(Some(seed)).unwrap();
            let z = env.true_state().unwrap().position.z();
            assert!(z >= 0.15 - 1e-12, "z {}", z);
        }
    }

    #[test]
    fn test_max_waypoints_caps_course() {
        let cfg = EnvConfig::deterministic()
            .with_max_waypoints(3)
            .with_random_start_waypoint(true);
        let mut env = WaypointEnv::new(EnvSettings::default().with_env(cfg), 0).unwrap();
        for seed in 0..20 {
            let (_, info) = env.reset(Some(seed)).unwrap();
            assert_eq!(info.max_waypoints, 3);
            assert!(info.current_waypoint_idx < 3);
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut cfg = EnvConfig::deterministic();
        cfg.timestep = 0.0;
        let err = WaypointEnv::new(EnvSettings::default().with_env(cfg), 0).err();
        assert!(matches!(err, Some(EnvError::InvalidSettings(_))));
    }
}
