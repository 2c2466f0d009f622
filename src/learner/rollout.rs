//! On-policy rollout storage.
//!
//! Transitions are interleaved by env: `[env0_t0, env1_t0, ..., env0_t1, ...]`.
//! Cleared after every update.

use super::gae::compute_gae_vectorized;
use crate::constants::ACTION_DIM;

#[derive(Debug)]
pub struct RolloutBuffer {
    n_envs: usize,
    pub observations: Vec<Vec<f64>>,
    /// Unclipped actions as sampled
    pub actions: Vec<[f64; ACTION_DIM]>,
    pub rewards: Vec<f64>,
    /// Transition ended its episode
    pub dones: Vec<bool>,
    pub values: Vec<f64>,
    pub log_probs: Vec<f64>,
    pub advantages: Vec<f64>,
    pub returns: Vec<f64>,
}

impl RolloutBuffer {
    pub fn new(n_envs: usize, rollout_len: usize) -> Self {
        let cap = n_envs * rollout_len;
        Self {
            n_envs,
            observations: Vec::with_capacity(cap),
            actions: Vec::with_capacity(cap),
            rewards: Vec::with_capacity(cap),
            dones: Vec::with_capacity(cap),
            values: Vec::with_capacity(cap),
            log_probs: Vec::with_capacity(cap),
            advantages: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn n_envs(&self) -> usize {
        self.n_envs
    }

    /// Vector steps stored.
    pub fn rollout_len(&self) -> usize {
        self.rewards.len() / self.n_envs.max(1)
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn push(
        &mut self,
        observation: Vec<f64>,
        action: [f64; ACTION_DIM],
        reward: f64,
        done: bool,
        value: f64,
        log_prob: f64,
    ) {
        self.observations.push(observation);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.values.push(value);
        self.log_probs.push(log_prob);
    }

    /// Fill `advantages` and `returns` with GAE, bootstrapping from `last_values`.
    pub fn compute_returns_and_advantages(&mut self, last_values: &[f64], gamma: f64, gae_lambda: f64) {
        let (advantages, returns) = compute_gae_vectorized(
            &self.rewards,
            &self.values,
            &self.dones,
            last_values,
            gamma,
            gae_lambda,
        );
        self.advantages = advantages;
        self.returns = returns;
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.rewards.clear();
        self.dones.clear();
        self.values.clear();
        self.log_probs.clear();
        self.advantages.clear();
        self.returns.clear();
    }
}
