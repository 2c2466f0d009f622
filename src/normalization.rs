//! Observation and reward normalization for vector environments.
//!
//! [`RunningMeanStd`] tracks per-dimension statistics with Welford's
//! algorithm. [`VecNormalize`] wraps a [`VecEnv`]:
//! - observations are standardized by their running statistics and clipped;
//! - rewards are divided by the running standard deviation of the
//!   discounted return and clipped.
//!
//! Statistics are frozen when `training` is false. The whole state persists
//! as JSON ([`NormalizerState`]).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::VecNormalizeConfig;
use crate::error::{CheckpointError, EnvError};
use crate::vec_env::{VecEnv, VecStep};

// ============================================================================
// Running Mean and Standard Deviation (Welford's algorithm)
// ============================================================================

/// Per-dimension running mean and variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    /// Sum of squared deviations; variance = var_sum / count
    var_sum: Vec<f64>,
    count: f64,
    epsilon: f64,
}

impl RunningMeanStd {
    pub fn new(dim: usize) -> Self {
        Self::with_epsilon(dim, 1e-8)
    }

    pub fn with_epsilon(dim: usize, epsilon: f64) -> Self {
        Self {
            mean: vec![0.0; dim],
            var_sum: vec![0.0; dim],
            count: 0.0,
            epsilon,
        }
    }

    /// Add one sample. Samples of the wrong dimension are ignored.
    pub fn update(&mut self, x: &[f64]) {
        if x.len() != self.mean.len() {
            log::warn!(
                "running stats expected {} values, got {}",
                self.mean.len(),
                x.len()
            );
            return;
        }
        self.count += 1.0;
        for (i, &v) in x.iter().enumerate() {
            let delta = v - self.mean[i];
            self.mean[i] += delta / self.count;
            let delta2 = v - self.mean[i];
            self.var_sum[i] += delta * delta2;
        }
    }

    pub fn update_batch<'a, I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        for x in batch {
            self.update(x);
        }
    }

    /// Standard deviation of dimension `i`; 1.0 until two samples exist.
    #[inline]
    pub fn std(&self, i: usize) -> f64 {
        if self.count < 2.0 {
            1.0
        } else {
            (self.var_sum[i] / self.count).sqrt().max(self.epsilon)
        }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2.0 {
            vec![1.0; self.mean.len()]
        } else {
            self.var_sum.iter().map(|&v| v / self.count).collect()
        }
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// (x - mean) / std, clipped to ±clip.
    pub fn normalize_and_clip(&self, x: &[f64], clip: f64) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, &v)| ((v - self.mean[i]) / self.std(i)).clamp(-clip, clip))
            .collect()
    }

    /// Merge statistics from another instance (parallel Welford).
    pub fn merge(&mut self, other: &RunningMeanStd) {
        if other.count == 0.0 || other.dim() != self.dim() {
            return;
        }
        if self.count == 0.0 {
            self.mean.copy_from_slice(&other.mean);
            self.var_sum.copy_from_slice(&other.var_sum);
            self.count = other.count;
            return;
        }
        let total = self.count + other.count;
        for i in 0..self.mean.len() {
            let delta = other.mean[i] - self.mean[i];
            self.mean[i] += delta * other.count / total;
            self.var_sum[i] +=
                other.var_sum[i] + delta * delta * self.count * other.count / total;
        }
        self.count = total;
    }

    pub fn reset(&mut self) {
        self.mean.fill(0.0);
        self.var_sum.fill(0.0);
        self.count = 0.0;
    }
}

// ============================================================================
// Normalizer State
// ============================================================================

/// Serializable normalizer: statistics plus the settings that use them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerState {
    pub obs_rms: RunningMeanStd,
    pub ret_rms: RunningMeanStd,
    pub norm_obs: bool,
    pub norm_reward: bool,
    pub clip_obs: f64,
    pub clip_reward: f64,
    pub gamma: f64,
}

impl NormalizerState {
    pub fn new(obs_dim: usize, cfg: &VecNormalizeConfig, gamma: f64) -> Self {
        Self {
            obs_rms: RunningMeanStd::new(obs_dim),
            ret_rms: RunningMeanStd::new(1),
            norm_obs: cfg.norm_obs,
            norm_reward: cfg.norm_reward,
            clip_obs: cfg.clip_obs,
            clip_reward: cfg.clip_reward,
            gamma,
        }
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_rms.dim()
    }

    /// Observation as the policy sees it.
    pub fn normalize_obs(&self, obs: &[f64]) -> Vec<f64> {
        if self.norm_obs {
            self.obs_rms.normalize_and_clip(obs, self.clip_obs)
        } else {
            obs.to_vec()
        }
    }

    /// Reward as the learner sees it.
    pub fn normalize_reward(&self, reward: f64) -> f64 {
        if self.norm_reward {
            (reward / self.ret_rms.std(0)).clamp(-self.clip_reward, self.clip_reward)
        } else {
            reward
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ============================================================================
// VecNormalize
// ============================================================================

/// Normalizing wrapper around a vector environment.
pub struct VecNormalize<V: VecEnv = Box<dyn VecEnv>> {
    venv: V,
    state: NormalizerState,
    /// Discounted return per env, for reward scaling
    returns: Vec<f64>,
    raw_rewards: Vec<f64>,
    training: bool,
}

impl<V: VecEnv> VecNormalize<V> {
    pub fn new(venv: V, cfg: &VecNormalizeConfig, gamma: f64) -> Self {
        let state = NormalizerState::new(venv.obs_dim(), cfg, gamma);
        let n = venv.n_envs();
        Self {
            venv,
            state,
            returns: vec![0.0; n],
            raw_rewards: vec![0.0; n],
            training: true,
        }
    }

    /// Wrap with previously saved statistics.
    pub fn with_state(venv: V, state: NormalizerState) -> Result<Self, CheckpointError> {
        let mut wrapped = Self::new(venv, &VecNormalizeConfig::default(), state.gamma);
        wrapped.set_state(state)?;
        Ok(wrapped)
    }

    pub fn training(&self) -> bool {
        self.training
    }

    /// Freeze (`false`) or resume (`true`) statistics updates.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn set_norm_reward(&mut self, enabled: bool) {
        self.state.norm_reward = enabled;
    }

    pub fn state(&self) -> &NormalizerState {
        &self.state
    }

    pub fn set_state(&mut self, state: NormalizerState) -> Result<(), CheckpointError> {
        if state.obs_dim() != self.venv.obs_dim() {
            return Err(CheckpointError::Incompatible(format!(
                "normalizer has {} observation dims, environment has {}",
                state.obs_dim(),
                self.venv.obs_dim()
            )));
        }
        self.state = state;
        Ok(())
    }

    /// Copy statistics from another normalizer, keeping our own flags.
    pub fn sync_stats_from(&mut self, other: &NormalizerState) {
        if other.obs_dim() == self.state.obs_dim() {
            self.state.obs_rms = other.obs_rms.clone();
            self.state.ret_rms = other.ret_rms.clone();
        }
    }

    /// Unnormalized rewards of the last step.
    pub fn raw_rewards(&self) -> &[f64] {
        &self.raw_rewards
    }

    pub fn normalize_obs(&self, obs: &[f64]) -> Vec<f64> {
        self.state.normalize_obs(obs)
    }

    pub fn inner(&self) -> &V {
        &self.venv
    }

    pub fn inner_mut(&mut self) -> &mut V {
        &mut self.venv
    }

    fn process_obs(&mut self, obs: &mut [Vec<f64>]) {
        if self.training && self.state.norm_obs {
            self.state
                .obs_rms
                .update_batch(obs.iter().map(|o| o.as_slice()));
        }
        for o in obs.iter_mut() {
            *o = self.state.normalize_obs(o);
        }
    }
}

impl<V: VecEnv> VecEnv for VecNormalize<V> {
    fn n_envs(&self) -> usize {
        self.venv.n_envs()
    }

    fn obs_dim(&self) -> usize {
        self.venv.obs_dim()
    }

    fn reset(&mut self) -> Result<Vec<Vec<f64>>, EnvError> {
        let mut obs = self.venv.reset()?;
        self.returns.iter_mut().for_each(|r| *r = 0.0);
        self.process_obs(&mut obs);
        Ok(obs)
    }

    fn step(&mut self, actions: &[[f64; 4]]) -> Result<VecStep, EnvError> {
        let mut batch = self.venv.step(actions)?;
        self.raw_rewards.clone_from(&batch.rewards);

        self.process_obs(&mut batch.observations);
        for info in batch.infos.iter_mut() {
            if let Some(term) = info.terminal_observation.as_mut() {
                *term = self.state.normalize_obs(term);
            }
        }

        for i in 0..batch.len() {
            self.returns[i] = self.returns[i] * self.state.gamma + batch.rewards[i];
        }
        if self.training && self.state.norm_reward {
            for &ret in &self.returns {
                self.state.ret_rms.update(&[ret]);
            }
        }
        for i in 0..batch.len() {
            batch.rewards[i] = self.state.normalize_reward(batch.rewards[i]);
            if batch.done(i) {
                self.returns[i] = 0.0;
            }
        }
        Ok(batch)
    }

    fn close(&mut self) -> Result<(), EnvError> {
        self.venv.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welford_matches_direct() {
        let mut rms = RunningMeanStd::new(2);
        let data = [[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        for x in &data {
            rms.update(x);
        }
        assert!((rms.mean()[0] - 2.5).abs() < 1e-12);
        assert!((rms.variance()[0] - 1.25).abs() < 1e-12);
        assert!((rms.variance()[1] - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_equals_sequential() {
        let mut a = RunningMeanStd::new(1);
        let mut b = RunningMeanStd::new(1);
        let mut all = RunningMeanStd::new(1);
        for v in [1.0, 5.0, 2.0] {
            a.update(&[v]);
            all.update(&[v]);
        }
        for v in [7.0, -3.0] {
            b.update(&[v]);
            all.update(&[v]);
        }
        a.merge(&b);
        assert!((a.mean()[0] - all.mean()[0]).abs() < 1e-12);
        assert!((a.variance()[0] - all.variance()[0]).abs() < 1e-9);
    }

    #[test]
    fn test_unit_std_before_two_samples() {
        let mut rms = RunningMeanStd::new(1);
        rms.update(&[3.0]);
        assert_eq!(rms.std(0), 1.0);
    }

    #[test]
    fn test_state_clips() {
        let cfg = VecNormalizeConfig {
            norm_obs: true,
            clip_obs: 2.0,
            ..VecNormalizeConfig::default()
        };
        let mut state = NormalizerState::new(1, &cfg, 0.99);
        for v in [0.0, 1.0, 0.0, 1.0] {
            state.obs_rms.update(&[v]);
        }
        assert_eq!(state.normalize_obs(&[100.0]), vec![2.0]);
        assert_eq!(state.normalize_obs(&[-100.0]), vec![-2.0]);
    }

    #[test]
    fn test_state_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("normalizer.json");
        let mut state = NormalizerState::new(3, &VecNormalizeConfig::default(), 0.99);
        state.obs_rms.update(&[1.0, 2.0, 3.0]);
        state.save(&path).unwrap();
        assert_eq!(NormalizerState::load(&path).unwrap(), state);
    }
}
