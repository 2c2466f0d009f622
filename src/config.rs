//! Experiment configuration.
//!
//! One explicit [`ExperimentConfig`] record is passed into every factory;
//! nothing reads ambient state. Sections mirror the YAML layout:
//! - `training`, `curriculum`, `ppo`, `vecnormalize`
//! - `env`, `reward`, `quadcopter`, `sensor`
//! - `callbacks`, `evaluation`, `demo`, `visualization`
//!
//! Loading deep-merges the user document onto the serialized defaults, so
//! a YAML file only needs the keys it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::constants::*;
use crate::error::ConfigError;

// ============================================================================
// Training
// ============================================================================

/// Which vector environment implementation drives the workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VecEnvKind {
    /// One OS thread per environment.
    #[default]
    Threaded,
    /// All environments stepped in order on the caller's thread.
    Sync,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    pub output_dir: PathBuf,
    pub total_timesteps: u64,
    pub n_envs: usize,
    pub seed: u64,
    pub resume_from: Option<PathBuf>,
    pub use_viz: bool,
    pub vec_env: VecEnvKind,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("models"),
            total_timesteps: 1_000_000,
            n_envs: 8,
            seed: 42,
            resume_from: None,
            use_viz: false,
            vec_env: VecEnvKind::Threaded,
        }
    }
}

// ============================================================================
// Curriculum
// ============================================================================

/// One curriculum stage. `None` fields inherit from the `env` section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    pub name: String,
    pub total_timesteps: u64,
    pub waypoint_noise: Option<f64>,
    pub add_sensor_noise: Option<bool>,
    pub random_start_waypoint: Option<bool>,
    pub max_waypoints: Option<usize>,
    pub max_episode_steps: Option<u64>,
    pub action_scale: Option<f64>,
    pub random_start_position: Option<bool>,
    pub start_position_noise: Option<f64>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            name: "stage".to_string(),
            total_timesteps: 100_000,
            waypoint_noise: None,
            add_sensor_noise: None,
            random_start_waypoint: None,
            max_waypoints: None,
            max_episode_steps: None,
            action_scale: None,
            random_start_position: None,
            start_position_noise: None,
        }
    }
}

impl StageConfig {
    /// Stage with a name and a step budget and no overrides.
    pub fn new(name: impl Into<String>, total_timesteps: u64) -> Self {
        Self {
            name: name.into(),
            total_timesteps,
            ..Self::default()
        }
    }

    pub fn with_waypoint_noise(mut self, noise: f64) -> Self {
        self.waypoint_noise = Some(noise);
        self
    }

    pub fn with_sensor_noise(mut self, enabled: bool) -> Self {
        self.add_sensor_noise = Some(enabled);
        self
    }

    pub fn with_max_waypoints(mut self, count: usize) -> Self {
        self.max_waypoints = Some(count);
        self
    }

    pub fn with_max_episode_steps(mut self, steps: u64) -> Self {
        self.max_episode_steps = Some(steps);
        self
    }

    pub fn with_action_scale(mut self, scale: f64) -> Self {
        self.action_scale = Some(scale);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CurriculumConfig {
    pub enabled: bool,
    pub stages: Vec<StageConfig>,
}

// ============================================================================
// Learner
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetArchConfig {
    pub pi: Vec<usize>,
    pub vf: Vec<usize>,
}

impl Default for NetArchConfig {
    fn default() -> Self {
        Self {
            pi: vec![256, 256],
            vf: vec![256, 256],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PpoConfig {
    pub learning_rate: f64,
    pub n_steps: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub gamma: f64,
    pub gae_lambda: f64,
    pub clip_range: f64,
    pub ent_coef: f64,
    pub vf_coef: f64,
    pub max_grad_norm: f64,
    pub net_arch: NetArchConfig,
    pub log_std_init: f64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            n_steps: 2048,
            batch_size: 256,
            n_epochs: 10,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            ent_coef: 0.01,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            net_arch: NetArchConfig::default(),
            log_std_init: 0.0,
        }
    }
}

impl PpoConfig {
    /// Validate learner hyperparameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.learning_rate <= 0.0 {
            return Err("ppo.learning_rate must be positive".to_string());
        }
        if self.n_steps == 0 || self.batch_size == 0 || self.n_epochs == 0 {
            return Err("ppo.n_steps, batch_size and n_epochs must be positive".to_string());
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(format!("ppo.gamma must be in (0, 1], got {}", self.gamma));
        }
        if !(self.gae_lambda > 0.0 && self.gae_lambda <= 1.0) {
            return Err(format!(
                "ppo.gae_lambda must be in (0, 1], got {}",
                self.gae_lambda
            ));
        }
        if self.clip_range <= 0.0 {
            return Err("ppo.clip_range must be positive".to_string());
        }
        if self.net_arch.pi.iter().chain(&self.net_arch.vf).any(|&w| w == 0) {
            return Err("ppo.net_arch layer widths must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VecNormalizeConfig {
    pub norm_obs: bool,
    pub norm_reward: bool,
    pub clip_obs: f64,
    pub clip_reward: f64,
    pub eval_norm_reward: bool,
}

impl Default for VecNormalizeConfig {
    fn default() -> Self {
        Self {
            norm_obs: false,
            norm_reward: true,
            clip_obs: 10.0,
            clip_reward: 10.0,
            eval_norm_reward: false,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Episode, arena and observation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvConfig {
    pub waypoint_radius: f64,
    pub waypoint_noise: f64,
    pub waypoint_yaw_random: bool,
    pub max_episode_steps: u64,
    pub arena_size: f64,
    pub max_altitude: f64,
    pub max_tilt_angle: f64,
    pub disable_tilt_termination: bool,
    pub goal_max_distance: f64,
    pub include_position: bool,
    pub random_start_waypoint: bool,
    pub add_sensor_noise: bool,
    pub max_waypoints: Option<usize>,
    pub action_scale: f64,
    pub random_start_position: bool,
    pub start_position_noise: f64,
    pub speed_normalization: f64,
    pub bounds_margin: f64,
    pub ground_threshold: f64,
    pub timestep: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            waypoint_radius: 1.0,
            waypoint_noise: 1.0,
            waypoint_yaw_random: true,
            max_episode_steps: 5000,
            arena_size: 25.0,
            max_altitude: 10.0,
            max_tilt_angle: 1.4,
            disable_tilt_termination: false,
            goal_max_distance: 12.0,
            include_position: false,
            random_start_waypoint: false,
            add_sensor_noise: true,
            max_waypoints: None,
            action_scale: 1.0,
            random_start_position: false,
            start_position_noise: 0.0,
            speed_normalization: 5.0,
            bounds_margin: 5.0,
            ground_threshold: 0.05,
            timestep: DEFAULT_TIMESTEP,
        }
    }
}

impl EnvConfig {
    /// Fully determinized course: no waypoint noise, no yaw, no sensor noise.
    pub fn deterministic() -> Self {
        Self::default()
            .with_waypoint_noise(0.0)
            .with_yaw_random(false)
            .with_sensor_noise(false)
    }

    pub fn with_waypoint_noise(mut self, noise: f64) -> Self {
        self.waypoint_noise = noise;
        self
    }

    pub fn with_yaw_random(mut self, enabled: bool) -> Self {
        self.waypoint_yaw_random = enabled;
        self
    }

    pub fn with_sensor_noise(mut self, enabled: bool) -> Self {
        self.add_sensor_noise = enabled;
        self
    }

    pub fn with_max_episode_steps(mut self, steps: u64) -> Self {
        self.max_episode_steps = steps;
        self
    }

    pub fn with_tilt_termination(mut self, enabled: bool) -> Self {
        self.disable_tilt_termination = !enabled;
        self
    }

    pub fn with_position_observation(mut self, enabled: bool) -> Self {
        self.include_position = enabled;
        self
    }

    pub fn with_max_waypoints(mut self, count: usize) -> Self {
        self.max_waypoints = Some(count);
        self
    }

    pub fn with_random_start_waypoint(mut self, enabled: bool) -> Self {
        self.random_start_waypoint = enabled;
        self
    }

    pub fn with_random_start_position(mut self, noise: f64) -> Self {
        self.random_start_position = true;
        self.start_position_noise = noise;
        self
    }

    /// Apply a curriculum stage's overrides; `None` keeps the base value.
    pub fn with_stage(&self, stage: &StageConfig) -> Self {
        let mut cfg = self.clone();
        if let Some(v) = stage.waypoint_noise {
            cfg.waypoint_noise = v;
        }
        if let Some(v) = stage.add_sensor_noise {
            cfg.add_sensor_noise = v;
        }
        if let Some(v) = stage.random_start_waypoint {
            cfg.random_start_waypoint = v;
        }
        if stage.max_waypoints.is_some() {
            cfg.max_waypoints = stage.max_waypoints;
        }
        if let Some(v) = stage.max_episode_steps {
            cfg.max_episode_steps = v;
        }
        if let Some(v) = stage.action_scale {
            cfg.action_scale = v;
        }
        if let Some(v) = stage.random_start_position {
            cfg.random_start_position = v;
        }
        if let Some(v) = stage.start_position_noise {
            cfg.start_position_noise = v;
        }
        cfg
    }

    /// Apply the evaluation/demo overrides.
    pub fn with_overrides(&self, overrides: &EnvOverrides) -> Self {
        let mut cfg = self.clone();
        cfg.waypoint_noise = overrides.waypoint_noise;
        cfg.waypoint_yaw_random = overrides.waypoint_yaw_random;
        cfg.include_position = overrides.include_position;
        cfg.add_sensor_noise = overrides.add_sensor_noise;
        cfg.disable_tilt_termination = overrides.disable_tilt_termination;
        cfg
    }

    /// Number of waypoints an episode must traverse, in [1, 10].
    pub fn effective_waypoints(&self) -> usize {
        self.max_waypoints
            .unwrap_or(NUM_WAYPOINTS)
            .clamp(1, NUM_WAYPOINTS)
    }

    pub fn observation_dim(&self) -> usize {
        if self.include_position {
            POSITION_OBS_DIM
        } else {
            BASE_OBS_DIM
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("env.timestep", self.timestep),
            ("env.waypoint_radius", self.waypoint_radius),
            ("env.arena_size", self.arena_size),
            ("env.goal_max_distance", self.goal_max_distance),
            ("env.speed_normalization", self.speed_normalization),
            ("env.max_altitude", self.max_altitude),
            ("env.action_scale", self.action_scale),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(format!("{name} must be positive, got {value}"));
            }
        }
        let non_negative = [
            ("env.waypoint_noise", self.waypoint_noise),
            ("env.start_position_noise", self.start_position_noise),
            ("env.ground_threshold", self.ground_threshold),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(format!("{name} must be finite and non-negative, got {value}"));
            }
        }
        if self.max_episode_steps == 0 {
            return Err("env.max_episode_steps must be positive".to_string());
        }
        if let Some(n) = self.max_waypoints {
            if !(1..=NUM_WAYPOINTS).contains(&n) {
                return Err(format!(
                    "max_waypoints must be in [1, {NUM_WAYPOINTS}], got {n}"
                ));
            }
        }
        Ok(())
    }
}

/// Environment keys overridden by the evaluation and demo entry points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvOverrides {
    pub waypoint_noise: f64,
    pub waypoint_yaw_random: bool,
    pub include_position: bool,
    pub add_sensor_noise: bool,
    pub disable_tilt_termination: bool,
}

impl EnvOverrides {
    pub fn evaluation() -> Self {
        Self {
            waypoint_noise: 0.0,
            waypoint_yaw_random: false,
            include_position: false,
            add_sensor_noise: true,
            disable_tilt_termination: true,
        }
    }

    pub fn demo() -> Self {
        Self {
            waypoint_noise: 1.0,
            waypoint_yaw_random: true,
            include_position: false,
            add_sensor_noise: true,
            disable_tilt_termination: false,
        }
    }
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self::evaluation()
    }
}

// ============================================================================
// Reward
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewardConfig {
    pub progress_multiplier: f64,
    pub time_penalty: f64,
    pub waypoint_bonus: f64,
    pub path_complete_bonus: f64,
    pub completion_time_divisor: f64,
    pub close_3x_bonus: f64,
    pub close_radius_3x: f64,
    pub close_1_5x_bonus: f64,
    pub close_radius_1_5x: f64,
    pub collision_penalty: f64,
    pub tilt_penalty: f64,
    pub out_of_bounds_penalty: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            progress_multiplier: 5.0,
            time_penalty: 0.01,
            waypoint_bonus: 50.0,
            path_complete_bonus: 100.0,
            completion_time_divisor: 100.0,
            close_3x_bonus: 0.1,
            close_radius_3x: 3.0,
            close_1_5x_bonus: 0.2,
            close_radius_1_5x: 1.5,
            collision_penalty: 10.0,
            tilt_penalty: 10.0,
            out_of_bounds_penalty: 5.0,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.completion_time_divisor <= 0.0 {
            return Err("reward.completion_time_divisor must be positive".to_string());
        }
        if self.close_radius_1_5x > self.close_radius_3x {
            return Err("reward.close_radius_1_5x must not exceed close_radius_3x".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Physical Parameters
// ============================================================================

/// Airframe parameters. Immutable for the lifetime of an episode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuadcopterConfig {
    pub mass: f64,
    pub arm_length: f64,
    pub inertia: [f64; 3],
    pub thrust_to_weight: f64,
    pub drag_coefficient: f64,
    pub motor_time_constant: f64,
    pub torque_to_thrust: f64,
}

impl Default for QuadcopterConfig {
    fn default() -> Self {
        Self {
            mass: MASS,
            arm_length: ARM_LENGTH,
            inertia: INERTIA,
            thrust_to_weight: THRUST_TO_WEIGHT,
            drag_coefficient: DRAG_COEFFICIENT,
            motor_time_constant: MOTOR_TIME_CONSTANT,
            torque_to_thrust: TORQUE_TO_THRUST,
        }
    }
}

impl QuadcopterConfig {
    /// Maximum thrust of one motor (N).
    #[inline]
    pub fn max_thrust(&self) -> f64 {
        max_thrust_per_motor(self.mass, self.thrust_to_weight)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.mass > 0.0) {
            return Err(format!("quadcopter.mass must be positive, got {}", self.mass));
        }
        if !(self.arm_length > 0.0) {
            return Err("quadcopter.arm_length must be positive".to_string());
        }
        if self.inertia.iter().any(|&i| !(i > 0.0)) {
            return Err("quadcopter.inertia entries must be positive".to_string());
        }
        if !(self.thrust_to_weight > 0.0) {
            return Err("quadcopter.thrust_to_weight must be positive".to_string());
        }
        if self.drag_coefficient < 0.0 || self.motor_time_constant < 0.0 {
            return Err("drag and motor time constant must be non-negative".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    pub accel_noise_std: f64,
    pub accel_bias_std: f64,
    pub accel_bias_time_constant: f64,
    pub gyro_noise_std: f64,
    pub gyro_bias_std: f64,
    pub gyro_bias_time_constant: f64,
    pub position_noise_std: f64,
    pub velocity_noise_std: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            accel_noise_std: 0.1,
            accel_bias_std: 0.02,
            accel_bias_time_constant: 100.0,
            gyro_noise_std: 0.01,
            gyro_bias_std: 0.001,
            gyro_bias_time_constant: 100.0,
            position_noise_std: 0.01,
            velocity_noise_std: 0.05,
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<(), String> {
        let stds = [
            self.accel_noise_std,
            self.accel_bias_std,
            self.gyro_noise_std,
            self.gyro_bias_std,
            self.position_noise_std,
            self.velocity_noise_std,
        ];
        if stds.iter().any(|&s| !(s >= 0.0)) {
            return Err("sensor noise standard deviations must be non-negative".to_string());
        }
        if !(self.accel_bias_time_constant > 0.0 && self.gyro_bias_time_constant > 0.0) {
            return Err("sensor bias time constants must be positive".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Callbacks, Evaluation, Demo, Visualization
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallbackConfig {
    pub checkpoint_freq: u64,
    pub eval_freq: u64,
    pub n_eval_episodes: usize,
    pub log_3d_freq: u64,
    pub summary_update_freq: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            checkpoint_freq: 50_000,
            eval_freq: 10_000,
            n_eval_episodes: 5,
            log_3d_freq: 3,
            summary_update_freq: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationConfig {
    pub realtime: bool,
    pub slow_motion: f64,
    pub env: EnvOverrides,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            realtime: true,
            slow_motion: 1.0,
            env: EnvOverrides::evaluation(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub max_steps: u64,
    pub sleep_time: f64,
    pub env: EnvOverrides,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            max_steps: 500,
            sleep_time: 0.01,
            env: EnvOverrides::demo(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisualizationConfig {
    pub training_app_id: String,
    pub eval_app_id: String,
    pub demo_app_id: String,
    pub spawn: bool,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            training_app_id: "simhops-training".to_string(),
            eval_app_id: "simhops-eval".to_string(),
            demo_app_id: "simhops-demo".to_string(),
            spawn: true,
        }
    }
}

// ============================================================================
// Experiment
// ============================================================================

/// Complete configuration of a training, evaluation, or demo run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub training: TrainingConfig,
    pub curriculum: CurriculumConfig,
    pub ppo: PpoConfig,
    pub vecnormalize: VecNormalizeConfig,
    pub env: EnvConfig,
    pub reward: RewardConfig,
    pub quadcopter: QuadcopterConfig,
    pub sensor: SensorConfig,
    pub callbacks: CallbackConfig,
    pub evaluation: EvaluationConfig,
    pub demo: DemoConfig,
    pub visualization: VisualizationConfig,
}

impl ExperimentConfig {
    /// Load a YAML file, deep-merged onto the defaults, and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse a YAML document, deep-merged onto the defaults, and validate it.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let user: Value = serde_yaml::from_str(text)?;
        let mut merged = serde_yaml::to_value(Self::default())?;
        match user {
            Value::Null => {}
            Value::Mapping(_) => deep_merge(&mut merged, user),
            _ => {
                return Err(ConfigError::Invalid(
                    "top level of the config must be a mapping".to_string(),
                ))
            }
        }
        let config: Self = serde_yaml::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Stages to run, in order. Falls back to a single `"default"` stage.
    pub fn stages(&self) -> Vec<StageConfig> {
        if self.curriculum.enabled && !self.curriculum.stages.is_empty() {
            self.curriculum.stages.clone()
        } else {
            vec![StageConfig::new("default", self.training.total_timesteps)]
        }
    }

    /// Validate cross-section rules. Called by every loader.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = ConfigError::Invalid;
        if self.training.n_envs == 0 {
            return Err(invalid("training.n_envs must be at least 1".to_string()));
        }
        if self.training.total_timesteps == 0 {
            return Err(invalid("training.total_timesteps must be positive".to_string()));
        }
        self.ppo.validate().map_err(invalid)?;
        self.env.validate().map_err(invalid)?;
        self.reward.validate().map_err(invalid)?;
        self.quadcopter.validate().map_err(invalid)?;
        self.sensor.validate().map_err(invalid)?;

        if self.vecnormalize.clip_obs <= 0.0 || self.vecnormalize.clip_reward <= 0.0 {
            return Err(invalid("vecnormalize clip values must be positive".to_string()));
        }
        if self.evaluation.env.include_position != self.env.include_position {
            return Err(invalid(
                "evaluation.env.include_position must match env.include_position".to_string(),
            ));
        }
        if self.evaluation.slow_motion < 0.0 || self.demo.sleep_time < 0.0 {
            return Err(invalid("playback delays must be non-negative".to_string()));
        }
        if self.curriculum.enabled && self.curriculum.stages.is_empty() {
            return Err(invalid(
                "curriculum.enabled requires at least one stage".to_string(),
            ));
        }

        let n_envs = self.training.n_envs as u64;
        for stage in self.stages() {
            if stage.total_timesteps == 0 || stage.total_timesteps % n_envs != 0 {
                return Err(invalid(format!(
                    "stage '{}' budget {} must be a positive multiple of n_envs ({})",
                    stage.name, stage.total_timesteps, n_envs
                )));
            }
            self.env.with_stage(&stage).validate().map_err(invalid)?;
        }
        Ok(())
    }
}

/// Recursively merge `overrides` into `base`. Mappings merge key by key;
/// any other value replaces the base value.
pub fn deep_merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Mapping(base_map), Value::Mapping(over_map)) => {
            for (key, value) in over_map {
                let nested = value.is_mapping()
                    && base_map.get(&key).map_or(false, Value::is_mapping);
                if nested {
                    if let Some(existing) = base_map.get_mut(&key) {
                        deep_merge(existing, value);
                    }
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}
