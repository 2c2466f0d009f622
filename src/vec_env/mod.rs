//! Vectorized environments with auto-reset.
//!
//! A [`VecEnv`] steps N independent [`WaypointEnv`]s behind one barrier.
//! When an episode ends the finished env's info record receives the
//! terminal observation and the episode statistics, and the env is reset
//! in place so the returned observation starts the next episode.
//!
//! Env `i` is first reset with seed `base_seed + i`; later resets continue
//! each env's own generator.

pub mod sync;
pub mod threaded;

pub use sync::SyncVecEnv;
pub use threaded::ThreadedVecEnv;

use crate::config::VecEnvKind;
use crate::env::{EnvSettings, StepOutcome, WaypointEnv};
use crate::error::EnvError;
use crate::info::{EpisodeStats, StepInfo};
use crate::reward::RewardComponent;

/// Batched step result, one entry per env.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VecStep {
    pub observations: Vec<Vec<f64>>,
    pub rewards: Vec<f64>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    pub infos: Vec<StepInfo>,
}

impl VecStep {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            terminated: Vec::with_capacity(n),
            truncated: Vec::with_capacity(n),
            infos: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, outcome: StepOutcome) {
        self.observations.push(outcome.observation);
        self.rewards.push(outcome.reward);
        self.terminated.push(outcome.terminated);
        self.truncated.push(outcome.truncated);
        self.infos.push(outcome.info);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    #[inline]
    pub fn done(&self, i: usize) -> bool {
        self.terminated[i] || self.truncated[i]
    }
}

/// N environments stepped in lockstep.
pub trait VecEnv: Send {
    fn n_envs(&self) -> usize;

    fn obs_dim(&self) -> usize;

    /// Reset every env and return the initial observations.
    fn reset(&mut self) -> Result<Vec<Vec<f64>>, EnvError>;

    /// Step every env with its action. `actions.len()` must equal `n_envs`.
    fn step(&mut self, actions: &[[f64; 4]]) -> Result<VecStep, EnvError>;

    /// Release workers. Idempotent.
    fn close(&mut self) -> Result<(), EnvError>;
}

impl<V: VecEnv + ?Sized> VecEnv for Box<V> {
    fn n_envs(&self) -> usize {
        (**self).n_envs()
    }

    fn obs_dim(&self) -> usize {
        (**self).obs_dim()
    }

    fn reset(&mut self) -> Result<Vec<Vec<f64>>, EnvError> {
        (**self).reset()
    }

    fn step(&mut self, actions: &[[f64; 4]]) -> Result<VecStep, EnvError> {
        (**self).step(actions)
    }

    fn close(&mut self) -> Result<(), EnvError> {
        (**self).close()
    }
}

/// Step one env and reset it in place if the episode ended.
pub(crate) fn step_auto_reset<R: RewardComponent>(
    env: &mut WaypointEnv<R>,
    action: [f64; 4],
) -> Result<StepOutcome, EnvError> {
    let mut outcome = env.step(action)?;
    if outcome.done() {
        outcome.info.episode = Some(EpisodeStats {
            reward: env.episode_reward(),
            length: outcome.info.episode_step,
        });
        let (obs, _) = env.reset(None)?;
        outcome.info.terminal_observation = Some(std::mem::replace(&mut outcome.observation, obs));
    }
    Ok(outcome)
}

/// Seed for env `index`'s first reset.
#[inline]
pub(crate) fn env_seed(base_seed: u64, index: usize) -> u64 {
    base_seed.wrapping_add(index as u64)
}

pub(crate) fn check_batch(expected: usize, actions: &[[f64; 4]]) -> Result<(), EnvError> {
    if actions.len() != expected {
        return Err(EnvError::BatchSize {
            expected,
            got: actions.len(),
        });
    }
    Ok(())
}

/// Build `n_envs` environments with the same settings.
pub fn make_envs(
    settings: &EnvSettings,
    n_envs: usize,
    base_seed: u64,
) -> Result<Vec<WaypointEnv>, EnvError> {
    (0..n_envs)
        .map(|i| WaypointEnv::new(settings.clone(), env_seed(base_seed, i)))
        .collect()
}

/// Build the configured vector environment.
pub fn make_vec_env(
    kind: VecEnvKind,
    settings: &EnvSettings,
    n_envs: usize,
    base_seed: u64,
) -> Result<Box<dyn VecEnv>, EnvError> {
    let envs = make_envs(settings, n_envs, base_seed)?;
    Ok(match kind {
        VecEnvKind::Sync => Box::new(SyncVecEnv::new(envs, base_seed)?),
        VecEnvKind::Threaded => Box::new(ThreadedVecEnv::new(envs, base_seed)?),
    })
}
