//! Callbacks registered for each curriculum stage.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{save_model_dir, Checkpointer, ModelFiles};
use crate::config::ExperimentConfig;
use crate::env::{EnvSettings, WaypointEnv};
use crate::error::{MetricsError, TrainError};
use crate::eval::{evaluate_model, EpisodeRunner, EvalOptions, EvalSummary};
use crate::interrupt::StopFlag;
use crate::learner::{CallbackAction, Policy, StepContext, TrainingCallback, UpdateStats};
use crate::metrics::{EpisodeRecord, SharedMetrics, UpdateRecord};
use crate::normalization::NormalizerState;
use crate::viz::{NullSink, Timeline, VisualizationSink};

/// Episodes averaged by the console and viewer reward means.
const WINDOW: usize = 100;
/// Episodes between console progress lines.
const REPORT_EVERY: usize = 10;

/// Convert a timestep frequency into a vector-step interval.
pub fn vector_interval(freq: u64, n_envs: usize) -> u64 {
    (freq / n_envs.max(1) as u64).max(1)
}

// ============================================================================
// Rolling episode window
// ============================================================================

#[derive(Debug, Default)]
struct EpisodeWindow {
    rewards: Vec<f64>,
    lengths: Vec<u64>,
    waypoints: Vec<usize>,
}

impl EpisodeWindow {
    fn push(&mut self, reward: f64, length: u64, waypoints: usize) {
        self.rewards.push(reward);
        self.lengths.push(length);
        self.waypoints.push(waypoints);
    }

    fn count(&self) -> usize {
        self.rewards.len()
    }

    fn tail_mean<T: Copy + Into<f64>>(values: &[T]) -> f64 {
        let tail = &values[values.len().saturating_sub(WINDOW)..];
        if tail.is_empty() {
            return 0.0;
        }
        tail.iter().map(|&v| v.into()).sum::<f64>() / tail.len() as f64
    }

    fn mean_reward(&self) -> f64 {
        Self::tail_mean(&self.rewards)
    }

    fn mean_length(&self) -> f64 {
        let lengths: Vec<f64> = self.lengths.iter().map(|&l| l as f64).collect();
        Self::tail_mean(&lengths)
    }

    fn mean_waypoints(&self) -> f64 {
        let wps: Vec<f64> = self.waypoints.iter().map(|&w| w as f64).collect();
        Self::tail_mean(&wps)
    }
}

// ============================================================================
// Background evaluations
// ============================================================================

/// Evaluation threads launched for saved checkpoints.
#[derive(Clone, Default)]
pub struct BackgroundEvals {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundEvals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `files` on a new thread, writing `output_csv`.
    pub fn spawn(
        &self,
        config: ExperimentConfig,
        files: ModelFiles,
        settings: EnvSettings,
        options: EvalOptions,
        stop: StopFlag,
    ) {
        let label = files.policy.display().to_string();
        let spawned = thread::Builder::new()
            .name("checkpoint-eval".to_string())
            .spawn(move || {
                if let Err(e) = evaluate_model(&config, &files, settings, &options, &stop) {
                    log::warn!("background evaluation of {} failed: {e}", files.policy.display());
                }
            });
        match spawned {
            Ok(handle) => self.handles.lock().push(handle),
            Err(e) => log::warn!("could not start evaluation of {label}: {e}"),
        }
    }

    pub fn pending(&self) -> usize {
        self.handles.lock().len()
    }

    /// Wait for every launched evaluation.
    pub fn join_all(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("a background evaluation panicked");
            }
        }
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

/// Periodic checkpoint writer. Every checkpoint is also evaluated on a
/// background thread into `eval_logs/checkpoint_<steps>.csv`.
pub struct CheckpointCallback {
    checkpointer: Checkpointer,
    n_calls: u64,
    eval_logs: PathBuf,
    config: ExperimentConfig,
    eval_settings: EnvSettings,
    n_eval_episodes: usize,
    background: BackgroundEvals,
    stop: StopFlag,
}

impl CheckpointCallback {
    pub fn new(
        checkpointer: Checkpointer,
        eval_logs: PathBuf,
        config: &ExperimentConfig,
        eval_settings: EnvSettings,
        background: BackgroundEvals,
        stop: StopFlag,
    ) -> Self {
        Self {
            checkpointer,
            n_calls: 0,
            eval_logs,
            n_eval_episodes: config.callbacks.n_eval_episodes,
            config: config.clone(),
            eval_settings,
            background,
            stop,
        }
    }
}

impl TrainingCallback for CheckpointCallback {
    fn on_step(&mut self, ctx: &StepContext<'_>) -> Result<CallbackAction, TrainError> {
        self.n_calls += 1;
        if !self.checkpointer.should_save(self.n_calls) {
            return Ok(CallbackAction::Continue);
        }
        let saved = self
            .checkpointer
            .save(ctx.policy, ctx.normalizer, ctx.num_timesteps)?;
        let options = EvalOptions::headless(self.n_eval_episodes)
            .with_output(self.eval_logs.join(format!("checkpoint_{}.csv", saved.step)));
        self.background.spawn(
            self.config.clone(),
            saved.files,
            self.eval_settings.clone(),
            options,
            self.stop.clone(),
        );
        Ok(CallbackAction::Continue)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// One row of `eval_logs/evaluations.csv`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub timestep: u64,
    pub mean_reward: f64,
    pub std_reward: f64,
    pub mean_length: f64,
    pub success_rate: f64,
}

const EVALUATION_COLUMNS: [&str; 5] = [
    "timestep",
    "mean_reward",
    "std_reward",
    "mean_length",
    "success_rate",
];

/// Deterministic evaluation on a dedicated env. Keeps `best_model/` at
/// the best mean reward seen by this callback.
pub struct EvalCallback {
    env: WaypointEnv,
    normalizer: Option<NormalizerState>,
    norm_reward: bool,
    interval: u64,
    n_calls: u64,
    n_episodes: usize,
    best_mean_reward: f64,
    best_model_dir: PathBuf,
    writer: csv::Writer<File>,
    stop: StopFlag,
}

impl EvalCallback {
    pub fn new(
        env: WaypointEnv,
        config: &ExperimentConfig,
        run_dir: &Path,
        stop: StopFlag,
    ) -> Result<Self, MetricsError> {
        let eval_logs = run_dir.join("eval_logs");
        fs::create_dir_all(&eval_logs)?;
        let path = eval_logs.join("evaluations.csv");
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(EVALUATION_COLUMNS)?;
            writer.flush()?;
        }
        Ok(Self {
            env,
            normalizer: None,
            norm_reward: config.vecnormalize.eval_norm_reward,
            interval: vector_interval(config.callbacks.eval_freq, config.training.n_envs),
            n_calls: 0,
            n_episodes: config.callbacks.n_eval_episodes,
            best_mean_reward: f64::NEG_INFINITY,
            best_model_dir: run_dir.join("best_model"),
            writer,
            stop,
        })
    }

    pub fn best_mean_reward(&self) -> f64 {
        self.best_mean_reward
    }

    fn evaluate(&mut self, ctx: &StepContext<'_>) -> Result<(), TrainError> {
        // Frozen copy of the training statistics
        let frozen = match self.normalizer.take() {
            Some(mut n) => {
                n.obs_rms = ctx.normalizer.obs_rms.clone();
                n.ret_rms = ctx.normalizer.ret_rms.clone();
                n
            }
            None => ctx.normalizer.clone(),
        };
        let mut sink = NullSink;
        let mut runner = EpisodeRunner {
            policy: ctx.policy,
            normalizer: Some(&frozen),
            norm_reward: self.norm_reward,
            pacing: None,
            viz: &mut sink,
            stop: &self.stop,
        };
        let mut episodes = Vec::with_capacity(self.n_episodes);
        for i in 1..=self.n_episodes {
            match runner.run_episode(&mut self.env, i)? {
                Some(ep) => episodes.push(ep),
                None => break,
            }
        }
        self.normalizer = Some(frozen);
        if episodes.len() < self.n_episodes {
            return Ok(());
        }

        let summary = EvalSummary::from_episodes(&episodes);
        self.writer
            .serialize(EvaluationRow {
                timestep: ctx.num_timesteps,
                mean_reward: summary.mean_reward,
                std_reward: summary.std_reward,
                mean_length: summary.mean_length,
                success_rate: summary.success_rate,
            })
            .map_err(MetricsError::from)?;
        self.writer.flush().map_err(MetricsError::from)?;
        log::info!(
            "eval at {} steps: reward {:.2} +/- {:.2}, length {:.0}, success {:.0}%",
            ctx.num_timesteps,
            summary.mean_reward,
            summary.std_reward,
            summary.mean_length,
            summary.success_rate * 100.0
        );

        if summary.mean_reward > self.best_mean_reward {
            self.best_mean_reward = summary.mean_reward;
            save_model_dir(&self.best_model_dir, ctx.policy, ctx.normalizer)?;
            log::info!("new best mean reward {:.2}", summary.mean_reward);
        }
        Ok(())
    }
}

impl TrainingCallback for EvalCallback {
    fn on_step(&mut self, ctx: &StepContext<'_>) -> Result<CallbackAction, TrainError> {
        self.n_calls += 1;
        if self.n_calls % self.interval == 0 {
            self.evaluate(ctx)?;
        }
        Ok(CallbackAction::Continue)
    }
}

// ============================================================================
// Metrics and snapshots
// ============================================================================

/// Feeds finished episodes and updates into the metrics sink.
pub struct MetricsCallback {
    metrics: SharedMetrics,
    summary_update_freq: u64,
}

impl MetricsCallback {
    pub fn new(metrics: SharedMetrics, summary_update_freq: u64) -> Self {
        Self {
            metrics,
            summary_update_freq: summary_update_freq.max(1),
        }
    }
}

impl TrainingCallback for MetricsCallback {
    fn on_step(&mut self, ctx: &StepContext<'_>) -> Result<CallbackAction, TrainError> {
        let mut sink = self.metrics.lock();
        for info in ctx.step.infos.iter().filter(|i| i.episode.is_some()) {
            sink.log_episode(ctx.num_timesteps, info)?;
        }
        Ok(CallbackAction::Continue)
    }

    fn on_rollout_end(&mut self, stats: &UpdateStats, _policy: &dyn Policy) -> Result<(), TrainError> {
        let mut sink = self.metrics.lock();
        let update = sink.log_update(stats)?.update;
        if update % self.summary_update_freq == 0 {
            sink.write_summary(stats.timestep)?;
        }
        Ok(())
    }
}

/// Rewrites the summary at the checkpoint cadence.
pub struct SnapshotCallback {
    metrics: SharedMetrics,
    interval: u64,
    n_calls: u64,
}

impl SnapshotCallback {
    pub fn new(metrics: SharedMetrics, interval: u64) -> Self {
        Self {
            metrics,
            interval: interval.max(1),
            n_calls: 0,
        }
    }
}

impl TrainingCallback for SnapshotCallback {
    fn on_step(&mut self, ctx: &StepContext<'_>) -> Result<CallbackAction, TrainError> {
        self.n_calls += 1;
        if self.n_calls % self.interval == 0 {
            self.metrics.lock().write_summary(ctx.num_timesteps)?;
        }
        Ok(CallbackAction::Continue)
    }
}

// ============================================================================
// Console and viewer
// ============================================================================

/// Logs rolling reward means every few episodes.
#[derive(Debug)]
pub struct RewardLogger {
    window: EpisodeWindow,
    max_waypoints: usize,
}

impl RewardLogger {
    pub fn new(max_waypoints: usize) -> Self {
        Self {
            window: EpisodeWindow::default(),
            max_waypoints,
        }
    }

    pub fn episodes(&self) -> usize {
        self.window.count()
    }
}

impl TrainingCallback for RewardLogger {
    fn on_step(&mut self, ctx: &StepContext<'_>) -> Result<CallbackAction, TrainError> {
        for info in &ctx.step.infos {
            let Some(stats) = info.episode else {
                continue;
            };
            self.window
                .push(stats.reward, stats.length, info.waypoints_reached());
            if self.window.count() % REPORT_EVERY == 0 {
                log::info!(
                    "episodes: {}, mean reward: {:.2}, mean length: {:.0}, mean waypoints: {:.1}/{}",
                    self.window.count(),
                    self.window.mean_reward(),
                    self.window.mean_length(),
                    self.window.mean_waypoints(),
                    self.max_waypoints
                );
            }
        }
        Ok(CallbackAction::Continue)
    }
}

/// Streams env 0 and the learning curves to the viewer.
pub struct VizCallback {
    sink: Box<dyn VisualizationSink>,
    log_3d_freq: u64,
    waypoint_radius: f64,
    window: EpisodeWindow,
}

impl VizCallback {
    pub fn new(sink: Box<dyn VisualizationSink>, log_3d_freq: u64, waypoint_radius: f64) -> Self {
        Self {
            sink,
            log_3d_freq: log_3d_freq.max(1),
            waypoint_radius,
            window: EpisodeWindow::default(),
        }
    }
}

impl TrainingCallback for VizCallback {
    fn on_step(&mut self, ctx: &StepContext<'_>) -> Result<CallbackAction, TrainError> {
        self.sink.set_time(Timeline::Timestep, ctx.num_timesteps);
        if ctx.num_timesteps % self.log_3d_freq == 0 {
            if let (Some(info), Some(action)) = (ctx.step.infos.first(), ctx.actions.first()) {
                self.sink.log_step(info, self.waypoint_radius);
                self.sink.log_actions(action);
            }
        }
        if ctx.step.infos.first().is_some_and(|i| i.terminal_observation.is_some()) {
            self.sink.reset_trajectory();
        }
        for info in &ctx.step.infos {
            let Some(stats) = info.episode else {
                continue;
            };
            self.window
                .push(stats.reward, stats.length, info.waypoints_reached());
            let count = self.window.count() as u64;
            if let Some(record) = EpisodeRecord::from_info(count, ctx.num_timesteps, info) {
                self.sink.log_episode(&record);
            }
            if self.window.count() % REPORT_EVERY == 0 {
                log::info!(
                    "episodes: {}, mean reward (100): {:.2}, mean length (100): {:.0}",
                    count,
                    self.window.mean_reward(),
                    self.window.mean_length()
                );
            }
        }
        Ok(CallbackAction::Continue)
    }

    fn on_rollout_end(&mut self, stats: &UpdateStats, _policy: &dyn Policy) -> Result<(), TrainError> {
        self.sink.set_time(Timeline::PpoUpdate, stats.update);
        let record = UpdateRecord::from_stats(stats.update, stats, self.window.mean_reward());
        self.sink.log_update(&record);
        Ok(())
    }
}
