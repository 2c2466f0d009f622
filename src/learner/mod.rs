//! Learner boundary and the built-in PPO implementation.
//!
//! The orchestrator only talks to [`Learner`]: it hands over a normalized
//! vector environment, a step budget, callbacks and a stop flag. The global
//! timestep counter lives in the learner and is never reset between calls,
//! so curriculum stages compose into one timeline.

pub mod callback;
pub mod gae;
pub mod network;
pub mod ppo;
pub mod rollout;

pub use callback::{CallbackAction, StepContext, TrainingCallback};
pub use ppo::{PpoCheckpoint, PpoLearner};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::ACTION_DIM;
use crate::error::{CheckpointError, TrainError};
use crate::interrupt::StopFlag;
use crate::normalization::VecNormalize;

/// Statistics of one optimizer update.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    pub update: u64,
    pub timestep: u64,
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    pub approx_kl: f64,
    pub clip_fraction: f64,
    pub explained_variance: f64,
    pub learning_rate: f64,
}

/// How a `learn` call ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LearnOutcome {
    /// Env transitions collected by this call
    pub timesteps: u64,
    pub updates: u64,
    /// The stop flag was raised
    pub interrupted: bool,
    /// A callback asked to stop
    pub stopped_by_callback: bool,
}

impl LearnOutcome {
    pub fn completed(&self) -> bool {
        !self.interrupted && !self.stopped_by_callback
    }
}

/// Read-only view of a trained policy.
pub trait Policy {
    fn obs_dim(&self) -> usize;

    fn num_timesteps(&self) -> u64;

    /// Deterministic action for a normalized observation, clipped to [-1, 1].
    fn act(&self, obs: &[f64]) -> [f64; ACTION_DIM];

    /// Persist everything needed to resume training.
    fn save(&self, path: &Path) -> Result<(), CheckpointError>;
}

/// Trainable policy.
pub trait Learner: Policy + Send {
    /// Collect and train on `budget` more env transitions.
    fn learn(
        &mut self,
        env: &mut VecNormalize,
        budget: u64,
        callbacks: &mut [Box<dyn TrainingCallback>],
        stop: &StopFlag,
    ) -> Result<LearnOutcome, TrainError>;

    /// Action for one observation; stochastic unless `deterministic`.
    fn predict(&mut self, obs: &[f64], deterministic: bool) -> [f64; ACTION_DIM];
}
