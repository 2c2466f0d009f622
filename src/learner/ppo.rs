//! Proximal Policy Optimization with a clipped surrogate objective.
//!
//! One `learn` call alternates rollout collection and `n_epochs` passes of
//! minibatch updates until the step budget is spent. The last rollout is
//! shortened so a call never collects more than its budget.
//!
//! Loss per minibatch:
//! - policy: -mean(min(r·A, clip(r, 1±ε)·A)), with the log-ratio clamped
//!   to ±20 before `exp`;
//! - value: mean((V - R)²) weighted by `vf_coef`;
//! - entropy: -ent_coef · H.
//!
//! Rollouts run on the plain ndarray backend; updates run on its autodiff
//! wrapper with burn's Adam. Each parameter tensor's gradient is clipped to
//! an L2 norm of `max_grad_norm`.

use std::fs;
use std::path::Path;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::{NetArchConfig, PpoConfig};
use crate::constants::ACTION_DIM;
use crate::error::{CheckpointError, TrainError};
use crate::interrupt::StopFlag;
use crate::normalization::VecNormalize;
use crate::vec_env::VecEnv;

use super::gae::{explained_variance, normalize_advantages};
use super::network::{
    rows_tensor, sample_action, to_host, vector_tensor, ActorCritic, InferenceBackend,
    TrainBackend,
};
use super::rollout::RolloutBuffer;
use super::{
    CallbackAction, LearnOutcome, Learner, Policy, StepContext, TrainingCallback, UpdateStats,
};

/// exp(20) ≈ 4.85e8, far beyond any meaningful importance ratio.
const MAX_LOG_RATIO: f64 = 20.0;

type Device = <TrainBackend as Backend>::Device;
type ByteRecorder = BinBytesRecorder<FullPrecisionSettings>;

fn record_error(err: impl std::fmt::Debug) -> CheckpointError {
    CheckpointError::Record(format!("{err:?}"))
}

// ============================================================================
// Optimizer
// ============================================================================

/// Object-safe view of a burn optimizer over the actor-critic.
trait PolicyOptimizer: Send {
    fn update(
        &mut self,
        lr: f64,
        model: ActorCritic<TrainBackend>,
        grads: GradientsParams,
    ) -> ActorCritic<TrainBackend>;

    fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError>;

    fn with_bytes(
        self: Box<Self>,
        bytes: Vec<u8>,
        device: &Device,
    ) -> Result<Box<dyn PolicyOptimizer>, CheckpointError>;
}

impl<O> PolicyOptimizer for O
where
    O: Optimizer<ActorCritic<TrainBackend>, TrainBackend> + 'static,
{
    fn update(
        &mut self,
        lr: f64,
        model: ActorCritic<TrainBackend>,
        grads: GradientsParams,
    ) -> ActorCritic<TrainBackend> {
        Optimizer::step(self, lr, model, grads)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        <ByteRecorder as Recorder<TrainBackend>>::record(&ByteRecorder::default(), self.to_record(), ())
            .map_err(record_error)
    }

    fn with_bytes(
        self: Box<Self>,
        bytes: Vec<u8>,
        device: &Device,
    ) -> Result<Box<dyn PolicyOptimizer>, CheckpointError> {
        let record = <ByteRecorder as Recorder<TrainBackend>>::load(&ByteRecorder::default(), bytes, device)
            .map_err(record_error)?;
        Ok(Box::new((*self).load_record(record)))
    }
}

fn adam(config: &PpoConfig) -> impl Optimizer<ActorCritic<TrainBackend>, TrainBackend> + 'static {
    let mut adam_config = AdamConfig::new().with_epsilon(1e-5);
    if config.max_grad_norm > 0.0 {
        adam_config = adam_config
            .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm as f32)));
    }
    adam_config.init()
}

// ============================================================================
// Persistence
// ============================================================================

/// On-disk learner state: a JSON document carrying the layer layout, the
/// counters and burn's binary records of the weights and Adam moments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PpoCheckpoint {
    pub obs_dim: usize,
    pub num_timesteps: u64,
    pub n_updates: u64,
    pub net_arch: NetArchConfig,
    pub model: Vec<u8>,
    pub optimizer: Vec<u8>,
}

impl PpoCheckpoint {
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let text = fs::read_to_string(path)?;
        let ckpt: Self = serde_json::from_str(&text)?;
        if ckpt.obs_dim == 0 {
            return Err(CheckpointError::Incompatible(
                "checkpoint declares an empty observation".to_string(),
            ));
        }
        if ckpt.model.is_empty() {
            return Err(CheckpointError::Incompatible("checkpoint carries no weights".to_string()));
        }
        Ok(ckpt)
    }
}

// ============================================================================
// Learner
// ============================================================================

pub struct PpoLearner {
    config: PpoConfig,
    device: Device,
    /// Trainable weights.
    model: ActorCritic<TrainBackend>,
    /// Gradient-free copy of `model` used for acting, refreshed after updates.
    policy: ActorCritic<InferenceBackend>,
    optimizer: Box<dyn PolicyOptimizer>,
    net_arch: NetArchConfig,
    rng: StdRng,
    num_timesteps: u64,
    n_updates: u64,
}

impl PpoLearner {
    /// Fresh policy for `obs_dim` inputs.
    pub fn new(obs_dim: usize, config: &PpoConfig, seed: u64) -> Self {
        let device = Device::default();
        let mut rng = StdRng::seed_from_u64(seed);
        let model = ActorCritic::new(
            obs_dim,
            &config.net_arch.pi,
            &config.net_arch.vf,
            config.log_std_init,
            &mut rng,
            &device,
        );
        log::debug!(
            "created PPO policy: obs_dim={}, pi={:?}, vf={:?}, {} parameters",
            obs_dim,
            config.net_arch.pi,
            config.net_arch.vf,
            model.num_params()
        );
        Self {
            config: config.clone(),
            policy: model.valid(),
            model,
            optimizer: Box::new(adam(config)),
            net_arch: config.net_arch.clone(),
            device,
            rng,
            num_timesteps: 0,
            n_updates: 0,
        }
    }

    /// Restore a saved learner. Hyperparameters come from `config`; weights,
    /// optimizer moments and counters from the file.
    pub fn load(path: &Path, config: &PpoConfig, seed: u64) -> Result<Self, CheckpointError> {
        let ckpt = PpoCheckpoint::load(path)?;
        if ckpt.net_arch.pi != config.net_arch.pi {
            log::warn!(
                "loaded policy layers {:?} differ from configured {:?}; keeping the loaded ones",
                ckpt.net_arch.pi,
                config.net_arch.pi
            );
        }

        let device = Device::default();
        let mut rng = StdRng::seed_from_u64(seed);
        let skeleton = ActorCritic::<TrainBackend>::new(
            ckpt.obs_dim,
            &ckpt.net_arch.pi,
            &ckpt.net_arch.vf,
            config.log_std_init,
            &mut rng,
            &device,
        );
        let record = <ByteRecorder as Recorder<TrainBackend>>::load(
            &ByteRecorder::default(),
            ckpt.model,
            &device,
        )
        .map_err(|e| {
            CheckpointError::Incompatible(format!("weights do not fit the declared layers: {e:?}"))
        })?;
        let model = skeleton.load_record(record);

        let optimizer: Box<dyn PolicyOptimizer> = Box::new(adam(config));
        let optimizer = if ckpt.optimizer.is_empty() {
            optimizer
        } else {
            optimizer.with_bytes(ckpt.optimizer, &device)?
        };

        log::info!(
            "loaded policy from {} at {} timesteps",
            path.display(),
            ckpt.num_timesteps
        );
        Ok(Self {
            config: config.clone(),
            policy: model.valid(),
            model,
            optimizer,
            net_arch: ckpt.net_arch,
            device,
            rng,
            num_timesteps: ckpt.num_timesteps,
            n_updates: ckpt.n_updates,
        })
    }

    pub fn checkpoint(&self) -> Result<PpoCheckpoint, CheckpointError> {
        let model = <ByteRecorder as Recorder<TrainBackend>>::record(
            &ByteRecorder::default(),
            self.model.clone().into_record(),
            (),
        )
        .map_err(record_error)?;
        Ok(PpoCheckpoint {
            obs_dim: self.model.obs_dim(),
            num_timesteps: self.num_timesteps,
            n_updates: self.n_updates,
            net_arch: self.net_arch.clone(),
            model,
            optimizer: self.optimizer.to_bytes()?,
        })
    }

    /// Acting copy of the current weights.
    pub fn model(&self) -> &ActorCritic<InferenceBackend> {
        &self.policy
    }

    pub fn n_updates(&self) -> u64 {
        self.n_updates
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    fn terminal_value(&self, obs: &[f64]) -> f64 {
        self.policy
            .values(&[obs.to_vec()], &self.device)
            .first()
            .copied()
            .unwrap_or(0.0)
    }

    /// Run `n_epochs` of minibatch updates over a filled buffer.
    fn train_on(&mut self, buffer: &RolloutBuffer) -> UpdateStats {
        let cfg = &self.config;
        let device = &self.device;
        let n = buffer.len();
        let obs_dim = self.model.obs_dim();
        let batch_size = cfg.batch_size.clamp(1, n.max(1));
        let clip = cfg.clip_range;
        let explained = explained_variance(&buffer.values, &buffer.returns);

        let mut model = self.model.clone();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut pg_sum = 0.0;
        let mut value_sum = 0.0;
        let mut kl_sum = 0.0;
        let mut clipped = 0usize;
        let mut samples = 0usize;
        let mut entropy_sum = 0.0;
        let mut minibatches = 0usize;

        for _ in 0..cfg.n_epochs {
            indices.shuffle(&mut self.rng);
            for chunk in indices.chunks(batch_size) {
                let b = chunk.len();
                let mut adv: Vec<f64> = chunk.iter().map(|&i| buffer.advantages[i]).collect();
                normalize_advantages(&mut adv);
                let old_log_probs: Vec<f64> = chunk.iter().map(|&i| buffer.log_probs[i]).collect();
                let returns: Vec<f64> = chunk.iter().map(|&i| buffer.returns[i]).collect();

                let obs = rows_tensor::<TrainBackend, _>(
                    chunk.iter().map(|&i| buffer.observations[i].as_slice()),
                    obs_dim,
                    device,
                );
                let actions = rows_tensor::<TrainBackend, _>(
                    chunk.iter().map(|&i| buffer.actions[i].as_slice()),
                    ACTION_DIM,
                    device,
                );
                let adv = vector_tensor::<TrainBackend>(&adv, device);

                let mean = model.action_mean(obs.clone());
                let log_prob = model.log_prob(mean, actions);
                let log_ratio = (log_prob - vector_tensor::<TrainBackend>(&old_log_probs, device))
                    .clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO);
                let ratio = log_ratio.clone().exp();

                let surr1 = ratio.clone() * adv.clone();
                let surr2 = ratio.clone().clamp(1.0 - clip, 1.0 + clip) * adv;
                let policy_loss = -surr1.min_pair(surr2).mean();

                let values = model.value(obs);
                let value_loss = (values - vector_tensor::<TrainBackend>(&returns, device))
                    .powf_scalar(2.0)
                    .mean();
                let entropy = model.entropy();

                let total_loss = policy_loss.clone()
                    + value_loss.clone().mul_scalar(cfg.vf_coef)
                    - entropy.clone().mul_scalar(cfg.ent_coef);

                let ratios = to_host(ratio);
                for (r, lr) in ratios.iter().zip(to_host(log_ratio)) {
                    kl_sum += (r - 1.0) - lr;
                    if (r - 1.0).abs() > clip {
                        clipped += 1;
                    }
                }
                pg_sum += scalar(policy_loss) * b as f64;
                value_sum += scalar(value_loss) * b as f64;
                entropy_sum += scalar(entropy);

                let grads = total_loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = self.optimizer.update(cfg.learning_rate, model, grads);

                samples += b;
                minibatches += 1;
            }
        }

        self.policy = model.valid();
        self.model = model;
        self.n_updates += 1;
        let per_sample = samples.max(1) as f64;
        UpdateStats {
            update: self.n_updates,
            timestep: self.num_timesteps,
            policy_loss: pg_sum / per_sample,
            value_loss: value_sum / per_sample,
            entropy: entropy_sum / minibatches.max(1) as f64,
            approx_kl: kl_sum / per_sample,
            clip_fraction: clipped as f64 / per_sample,
            explained_variance: explained,
            learning_rate: cfg.learning_rate,
        }
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem()
}

impl Policy for PpoLearner {
    fn obs_dim(&self) -> usize {
        self.model.obs_dim()
    }

    fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }

    fn act(&self, obs: &[f64]) -> [f64; ACTION_DIM] {
        self.policy.deterministic_action(obs, &self.device)
    }

    fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        self.checkpoint()?.save(path)
    }
}

impl Learner for PpoLearner {
    fn learn(
        &mut self,
        env: &mut VecNormalize,
        budget: u64,
        callbacks: &mut [Box<dyn TrainingCallback>],
        stop: &StopFlag,
    ) -> Result<LearnOutcome, TrainError> {
        if env.obs_dim() != self.obs_dim() {
            return Err(TrainError::Learner(format!(
                "policy expects {} observations, environment produces {}",
                self.obs_dim(),
                env.obs_dim()
            )));
        }
        let n_envs = env.n_envs();
        let gamma = self.config.gamma;
        let target = self.num_timesteps + budget;
        let mut outcome = LearnOutcome::default();
        let mut buffer = RolloutBuffer::new(n_envs, self.config.n_steps);

        let mut obs = env.reset()?;
        for cb in callbacks.iter_mut() {
            cb.on_training_start(&*self)?;
        }

        'training: while self.num_timesteps < target {
            let remaining = (target - self.num_timesteps).div_ceil(n_envs as u64) as usize;
            let rollout_len = self.config.n_steps.min(remaining);
            buffer.clear();

            for _ in 0..rollout_len {
                if stop.is_stopped() {
                    outcome.interrupted = true;
                    break 'training;
                }

                let (means, values) = self.policy.evaluate(&obs, &self.device);
                let log_std = self.policy.log_std_values();
                let mut sampled = Vec::with_capacity(n_envs);
                let mut actions = Vec::with_capacity(n_envs);
                for (mean, value) in means.iter().zip(values) {
                    let (action, log_prob) = sample_action(mean, &log_std, &mut self.rng);
                    sampled.push((action, log_prob, value));
                    actions.push(action.map(|a| a.clamp(-1.0, 1.0)));
                }

                let step = env.step(&actions)?;
                self.num_timesteps += n_envs as u64;
                outcome.timesteps += n_envs as u64;

                for (i, (action, log_prob, value)) in sampled.into_iter().enumerate() {
                    let mut reward = step.rewards[i];
                    if step.truncated[i] && !step.terminated[i] {
                        if let Some(terminal) = &step.infos[i].terminal_observation {
                            reward += gamma * self.terminal_value(terminal);
                        }
                    }
                    let o = std::mem::take(&mut obs[i]);
                    buffer.push(o, action, reward, step.done(i), value, log_prob);
                }
                obs.clone_from(&step.observations);

                let ctx = StepContext {
                    num_timesteps: self.num_timesteps,
                    actions: &actions,
                    raw_rewards: env.raw_rewards(),
                    step: &step,
                    policy: &*self,
                    normalizer: env.state(),
                };
                for cb in callbacks.iter_mut() {
                    if cb.on_step(&ctx)? == CallbackAction::Stop {
                        outcome.stopped_by_callback = true;
                    }
                }
                if outcome.stopped_by_callback {
                    break 'training;
                }
            }

            let last_values = self.policy.values(&obs, &self.device);
            buffer.compute_returns_and_advantages(&last_values, gamma, self.config.gae_lambda);
            let stats = self.train_on(&buffer);
            outcome.updates += 1;
            log::debug!(
                "update {} at {} steps: policy_loss={:.4} value_loss={:.4} entropy={:.3} kl={:.5}",
                stats.update,
                stats.timestep,
                stats.policy_loss,
                stats.value_loss,
                stats.entropy,
                stats.approx_kl
            );
            for cb in callbacks.iter_mut() {
                cb.on_rollout_end(&stats, &*self)?;
            }
        }

        for cb in callbacks.iter_mut() {
            cb.on_training_end(&*self)?;
        }
        Ok(outcome)
    }

    fn predict(&mut self, obs: &[f64], deterministic: bool) -> [f64; ACTION_DIM] {
        if deterministic {
            return self.policy.deterministic_action(obs, &self.device);
        }
        let (means, _) = self.policy.evaluate(&[obs.to_vec()], &self.device);
        let log_std = self.policy.log_std_values();
        let (action, _) = sample_action(&means[0], &log_std, &mut self.rng);
        action.map(|a| a.clamp(-1.0, 1.0))
    }
}
