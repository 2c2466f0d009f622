//! Curriculum training orchestrator.
//!
//! [`train`] creates a run directory, runs every stage on one continuous
//! timestep axis and finalizes the run however the stage loop ends:
//!
//! ```text
//! <output>/run_<stamp>/
//!   config.yaml  config.json  run.log
//!   episodes.csv  updates.csv  training_summary.json
//!   checkpoints/stage_<k>/   eval_logs/   best_model/   final_model/
//! <output>/experiments.csv
//! ```

pub mod callbacks;

pub use callbacks::{
    vector_interval, BackgroundEvals, CheckpointCallback, EvalCallback, MetricsCallback,
    RewardLogger, SnapshotCallback, VizCallback,
};

use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoint::{save_model_dir, Checkpointer, ModelFiles};
use crate::config::{ExperimentConfig, StageConfig};
use crate::env::{EnvSettings, WaypointEnv};
use crate::error::{CheckpointError, MetricsError, TrainError};
use crate::eval::EVAL_SEED_OFFSET;
use crate::interrupt::StopFlag;
use crate::learner::{Learner, Policy, PpoLearner, TrainingCallback};
use crate::logging;
use crate::metrics::{MetricsSink, SharedMetrics, TrainingSummary};
use crate::normalization::{NormalizerState, VecNormalize};
use crate::vec_env::{make_vec_env, VecEnv};
use crate::viz;

/// Outcome of a training run.
#[derive(Clone, Debug)]
pub struct TrainReport {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub total_timesteps: u64,
    pub stages_completed: usize,
    pub interrupted: bool,
    pub summary: TrainingSummary,
    /// `final_model/` files, when a model was created
    pub final_model: Option<ModelFiles>,
}

/// Create `<output>/run_<YYYYmmdd_HHMMSS>`, suffixed when the name is taken.
pub fn create_run_dir(output_dir: &Path) -> std::io::Result<(String, PathBuf)> {
    fs::create_dir_all(output_dir)?;
    let base = chrono::Utc::now().format("run_%Y%m%d_%H%M%S").to_string();
    let mut run_id = base.clone();
    let mut suffix = 1;
    loop {
        let path = output_dir.join(&run_id);
        match fs::create_dir(&path) {
            Ok(()) => return Ok((run_id, path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                run_id = format!("{base}_{suffix}");
                suffix += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Mutable state carried from stage to stage.
struct RunState {
    model: Option<PpoLearner>,
    normalizer: Option<NormalizerState>,
    background: BackgroundEvals,
}

/// Run every curriculum stage, then finalize the run.
pub fn train(config: &ExperimentConfig, stop: &StopFlag) -> Result<TrainReport, TrainError> {
    config.validate()?;
    let (run_id, run_dir) = create_run_dir(&config.training.output_dir)?;
    logging::start_run(&run_dir, &run_id)?;

    fs::write(
        run_dir.join("config.yaml"),
        config.to_yaml().map_err(MetricsError::from)?,
    )?;
    let mut sink = MetricsSink::create(&run_dir)?;
    sink.write_run_config(&run_dir, config)?;

    let stages = config.stages();
    sink.set_notes(
        stages
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );
    let metrics = sink.shared();

    let mut state = RunState {
        model: None,
        normalizer: None,
        background: BackgroundEvals::new(),
    };
    let mut stages_completed = 0;
    let mut interrupted = false;
    let mut failure = None;

    for (i, stage) in stages.iter().enumerate() {
        if stop.is_stopped() {
            interrupted = true;
            break;
        }
        let index = i + 1;
        log::info!(
            "starting stage {index}/{}: {} ({} timesteps)",
            stages.len(),
            stage.name,
            stage.total_timesteps
        );
        match run_stage(config, stage, index, &run_dir, &metrics, &mut state, stop) {
            Ok(true) => stages_completed += 1,
            Ok(false) => {
                log::info!("training interrupted during stage {}", stage.name);
                interrupted = true;
                break;
            }
            Err(e) => {
                log::error!("stage {} failed: {e}", stage.name);
                failure = Some(e);
                break;
            }
        }
    }

    // Finalize
    state.background.join_all();
    let total_timesteps = state.model.as_ref().map_or(0, |m| m.num_timesteps());
    let summary = metrics.lock().finalize(total_timesteps)?;

    let final_model = match (&state.model, &state.normalizer) {
        (Some(model), Some(normalizer)) => {
            let files = save_model_dir(&run_dir.join("final_model"), model, normalizer)?;
            log::info!("model saved to {}", run_dir.join("final_model").display());
            Some(files)
        }
        _ => {
            log::info!("training did not start; no model created");
            None
        }
    };
    log::logger().flush();

    if let Some(e) = failure {
        return Err(e);
    }
    Ok(TrainReport {
        run_id,
        run_dir,
        total_timesteps,
        stages_completed,
        interrupted,
        summary,
        final_model,
    })
}

/// Resume target: the learner and, when saved alongside, its normalizer.
fn load_resume(
    path: &Path,
    config: &ExperimentConfig,
) -> Result<(PpoLearner, Option<NormalizerState>), TrainError> {
    let files = ModelFiles::resolve(path).ok_or_else(|| {
        CheckpointError::Incompatible(format!("no policy found under {}", path.display()))
    })?;
    log::info!("resuming from {}", files.policy.display());
    let learner = PpoLearner::load(&files.policy, &config.ppo, config.training.seed)?;
    let normalizer = files
        .normalizer
        .as_deref()
        .map(NormalizerState::load)
        .transpose()?;
    Ok((learner, normalizer))
}

/// Train one stage. `Ok(false)` when the stop flag ended it early.
fn run_stage(
    config: &ExperimentConfig,
    stage: &StageConfig,
    index: usize,
    run_dir: &Path,
    metrics: &SharedMetrics,
    state: &mut RunState,
    stop: &StopFlag,
) -> Result<bool, TrainError> {
    let training = &config.training;
    let settings = EnvSettings::for_stage(config, stage);
    let env_cfg = &settings.env;
    log::info!(
        "env: noise={:.2}, yaw_random={}, sensor_noise={}, random_start={}, max_waypoints={:?}, action_scale={}, start_pos_random={}, start_pos_noise={}",
        env_cfg.waypoint_noise,
        env_cfg.waypoint_yaw_random,
        env_cfg.add_sensor_noise,
        env_cfg.random_start_waypoint,
        env_cfg.max_waypoints,
        env_cfg.action_scale,
        env_cfg.random_start_position,
        env_cfg.start_position_noise
    );

    let venv = make_vec_env(training.vec_env, &settings, training.n_envs, training.seed)?;
    let mut env = VecNormalize::new(venv, &config.vecnormalize, config.ppo.gamma);

    if state.model.is_none() {
        let (learner, normalizer) = match &training.resume_from {
            Some(path) => load_resume(path, config)?,
            None => {
                log::info!("creating new PPO model");
                (
                    PpoLearner::new(env.obs_dim(), &config.ppo, training.seed),
                    None,
                )
            }
        };
        if let Some(saved) = normalizer {
            env.set_state(saved)?;
        }
        state.model = Some(learner);
    } else if let Some(previous) = &state.normalizer {
        env.sync_stats_from(previous);
    }

    let eval_settings = EnvSettings::for_evaluation(config, Some(stage));
    let eval_env = WaypointEnv::new(eval_settings.clone(), training.seed + EVAL_SEED_OFFSET)?;
    let checkpoint_interval = vector_interval(config.callbacks.checkpoint_freq, training.n_envs);
    let checkpointer = Checkpointer::for_stage(run_dir, index, checkpoint_interval)?;

    let mut callbacks: Vec<Box<dyn TrainingCallback>> = vec![
        Box::new(CheckpointCallback::new(
            checkpointer,
            run_dir.join("eval_logs"),
            config,
            eval_settings,
            state.background.clone(),
            stop.clone(),
        )),
        Box::new(EvalCallback::new(eval_env, config, run_dir, stop.clone())?),
        Box::new(MetricsCallback::new(
            metrics.clone(),
            config.callbacks.summary_update_freq,
        )),
        Box::new(SnapshotCallback::new(metrics.clone(), checkpoint_interval)),
    ];
    if training.use_viz {
        let sink = viz::open_sink(
            &config.visualization.training_app_id,
            config.visualization.spawn,
            config.env.arena_size,
        );
        callbacks.push(Box::new(VizCallback::new(
            sink,
            config.callbacks.log_3d_freq,
            env_cfg.waypoint_radius,
        )));
    } else {
        callbacks.push(Box::new(RewardLogger::new(env_cfg.effective_waypoints())));
    }

    let result = match state.model.as_mut() {
        Some(model) => model.learn(&mut env, stage.total_timesteps, &mut callbacks, stop),
        None => Err(TrainError::Learner("no model to train".to_string())),
    };

    state.normalizer = Some(env.state().clone());
    let closed = env.close();
    drop(callbacks);
    state.background.join_all();

    let outcome = result?;
    closed?;
    log::info!(
        "stage {} finished: {} timesteps, {} updates",
        stage.name,
        outcome.timesteps,
        outcome.updates
    );
    Ok(outcome.completed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_dirs_are_unique() {
        let dir = tempdir().unwrap();
        let (a, pa) = create_run_dir(dir.path()).unwrap();
        let (b, pb) = create_run_dir(dir.path()).unwrap();
        assert_ne!(a, b);
        assert!(pa.is_dir() && pb.is_dir());
        assert!(a.starts_with("run_"));
    }

    #[test]
    fn test_run_id_is_utc_time() {
        let dir = tempdir().unwrap();
        let (id, _) = create_run_dir(dir.path()).unwrap();
        let stamped = chrono::NaiveDateTime::parse_from_str(&id, "run_%Y%m%d_%H%M%S")
            .unwrap()
            .and_utc();
        let skew = (chrono::Utc::now() - stamped).num_seconds().abs();
        assert!(skew < 60, "run id {id} is {skew}s away from UTC now");
    }
}
