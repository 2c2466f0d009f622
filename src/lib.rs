//! Quadcopter waypoint-course simulator and curriculum PPO harness.
//!
//! A rigid-body quadcopter with a noisy IMU flies a closed course of ten
//! waypoints. The crate provides:
//!
//! - **Simulation**: rigid-body physics behind the [`physics::PhysicsEngine`]
//!   seam, motor mixing, IMU sensor model
//! - **Environment**: [`env::WaypointEnv`], a Gymnasium-style
//!   reset/step interface with shaped rewards and typed info records
//! - **Vectorization**: synchronous and threaded vector environments with
//!   running-statistics normalization ([`normalization::VecNormalize`])
//! - **Learning**: an MLP PPO learner behind the [`learner::Learner`] trait
//! - **Orchestration**: curriculum stages, checkpoints, periodic evaluation,
//!   CSV/JSON metrics and an optional 3-D viewer ([`train::train`])
//! - **Evaluation**: deterministic playback of saved models ([`eval::evaluate`])
//!
//! # Example
//!
//! ```rust,ignore
//! use simhops::{ExperimentConfig, StopFlag};
//!
//! let config = ExperimentConfig::load("cfg_default.yaml".as_ref())?;
//! let stop = StopFlag::new();
//! simhops::interrupt::install_ctrl_c_handler(stop.clone());
//!
//! let report = simhops::train::train(&config, &stop)?;
//! println!("run {} finished at {} steps", report.run_id, report.total_timesteps);
//! ```
//!
//! # Features
//!
//! - `viz`: stream to a rerun viewer. Without it the visualization sink is
//!   a no-op.

// Core modules
pub mod config;
pub mod constants;
pub mod error;
pub mod state;
pub mod types;

// Simulation
pub mod physics;
pub mod sensor;
pub mod waypoints;

// Environment components
pub mod env;
pub mod info;
pub mod observation;
pub mod reward;
pub mod termination;
pub mod vec_env;

// Learning
pub mod learner;
pub mod normalization;

// Run management
pub mod checkpoint;
pub mod eval;
pub mod interrupt;
pub mod logging;
pub mod metrics;
pub mod train;
pub mod viz;

#[cfg(test)]
mod tests;

pub use config::{EnvConfig, ExperimentConfig, PpoConfig, RewardConfig, StageConfig, VecEnvKind};
pub use env::{EnvSettings, StepOutcome, WaypointEnv};
pub use error::{CheckpointError, ConfigError, EnvError, EvalError, MetricsError, TrainError};
pub use eval::{demo, evaluate, EvalEpisode, EvalOptions};
pub use info::{EpisodeStats, ResetInfo, StepInfo};
pub use interrupt::StopFlag;
pub use learner::{Learner, Policy, PpoLearner};
pub use normalization::{NormalizerState, RunningMeanStd, VecNormalize};
pub use termination::CrashKind;
pub use train::{train, TrainReport};
pub use types::{BodyFrame, NormalizedAction, UnitQuaternion, Vec3, WorldFrame};
pub use vec_env::{make_vec_env, VecEnv, VecStep};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
