//! Training callbacks.
//!
//! Hooks run on the training thread, in registration order. Errors abort
//! the `learn` call; returning [`CallbackAction::Stop`] from `on_step` ends
//! it cleanly after the current vector step.

use crate::error::TrainError;
use crate::normalization::NormalizerState;
use crate::vec_env::VecStep;

use super::{Policy, UpdateStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Everything a callback sees after one vector step.
pub struct StepContext<'a> {
    /// Global env transitions, this step included
    pub num_timesteps: u64,
    /// Actions sent to the envs (clipped)
    pub actions: &'a [[f64; 4]],
    /// Unnormalized rewards
    pub raw_rewards: &'a [f64],
    /// Normalized step result; `infos` carry ground truth
    pub step: &'a VecStep,
    pub policy: &'a dyn Policy,
    pub normalizer: &'a NormalizerState,
}

impl StepContext<'_> {
    pub fn n_envs(&self) -> usize {
        self.raw_rewards.len()
    }
}

pub trait TrainingCallback: Send {
    fn on_training_start(&mut self, _policy: &dyn Policy) -> Result<(), TrainError> {
        Ok(())
    }

    fn on_step(&mut self, ctx: &StepContext<'_>) -> Result<CallbackAction, TrainError>;

    fn on_rollout_end(
        &mut self,
        _stats: &UpdateStats,
        _policy: &dyn Policy,
    ) -> Result<(), TrainError> {
        Ok(())
    }

    fn on_training_end(&mut self, _policy: &dyn Policy) -> Result<(), TrainError> {
        Ok(())
    }
}
