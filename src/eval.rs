//! Evaluation harness and random-action demo.
//!
//! [`run_episode`] is the single deterministic rollout used everywhere a
//! policy is scored: the `eval` subcommand, the periodic evaluation during
//! training, and the background evaluation of each checkpoint.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::checkpoint::ModelFiles;
use crate::config::ExperimentConfig;
use crate::env::{EnvSettings, WaypointEnv};
use crate::error::{EnvError, EvalError};
use crate::interrupt::StopFlag;
use crate::learner::{Policy, PpoLearner};
use crate::normalization::NormalizerState;
use crate::viz::{self, NullSink, Timeline, VisualizationSink};

/// Offset between the training seed and the default evaluation seed.
pub const EVAL_SEED_OFFSET: u64 = 1000;

pub const EVAL_COLUMNS: [&str; 9] = [
    "eval_run",
    "model_path",
    "episode",
    "reward",
    "length",
    "waypoints_reached",
    "success",
    "crash_type",
    "completion_time_s",
];

/// Result of one evaluation episode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalEpisode {
    pub episode: usize,
    pub reward: f64,
    pub length: u64,
    pub waypoints_reached: usize,
    pub success: bool,
    pub crash_type: Option<String>,
    pub completion_time_s: Option<f64>,
}

/// One row of an evaluation CSV.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalRow {
    pub eval_run: String,
    pub model_path: String,
    pub episode: usize,
    pub reward: f64,
    pub length: u64,
    pub waypoints_reached: usize,
    pub success: bool,
    pub crash_type: Option<String>,
    pub completion_time_s: Option<f64>,
}

impl EvalRow {
    fn new(eval_run: &str, model_path: &Path, ep: &EvalEpisode) -> Self {
        Self {
            eval_run: eval_run.to_string(),
            model_path: model_path.display().to_string(),
            episode: ep.episode,
            reward: ep.reward,
            length: ep.length,
            waypoints_reached: ep.waypoints_reached,
            success: ep.success,
            crash_type: ep.crash_type.clone(),
            completion_time_s: ep.completion_time_s,
        }
    }
}

/// Aggregate over a batch of evaluation episodes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EvalSummary {
    pub episodes: usize,
    pub mean_reward: f64,
    pub std_reward: f64,
    pub mean_length: f64,
    pub success_rate: f64,
}

impl EvalSummary {
    pub fn from_episodes(episodes: &[EvalEpisode]) -> Self {
        if episodes.is_empty() {
            return Self::default();
        }
        let n = episodes.len() as f64;
        let mean_reward = episodes.iter().map(|e| e.reward).sum::<f64>() / n;
        let var = episodes
            .iter()
            .map(|e| (e.reward - mean_reward).powi(2))
            .sum::<f64>()
            / n;
        Self {
            episodes: episodes.len(),
            mean_reward,
            std_reward: var.sqrt(),
            mean_length: episodes.iter().map(|e| e.length as f64).sum::<f64>() / n,
            success_rate: episodes.iter().filter(|e| e.success).count() as f64 / n,
        }
    }
}

/// How an episode is played back.
pub struct EpisodeRunner<'a> {
    pub policy: &'a dyn Policy,
    pub normalizer: Option<&'a NormalizerState>,
    /// Report normalized rather than raw rewards
    pub norm_reward: bool,
    /// Sleep between steps
    pub pacing: Option<Duration>,
    pub viz: &'a mut dyn VisualizationSink,
    pub stop: &'a StopFlag,
}

impl EpisodeRunner<'_> {
    /// Play one deterministic episode. `None` if the stop flag was raised
    /// before it finished.
    pub fn run_episode(
        &mut self,
        env: &mut WaypointEnv,
        episode: usize,
    ) -> Result<Option<EvalEpisode>, EnvError> {
        let (mut obs, _) = env.reset(None)?;
        self.viz.reset_trajectory();
        let waypoint_radius = env.settings().env.waypoint_radius;
        let dt = env.settings().env.timestep;
        let mut total_reward = 0.0;

        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }
            let input = match self.normalizer {
                Some(n) => n.normalize_obs(&obs),
                None => obs,
            };
            let action = self.policy.act(&input);
            let outcome = env.step(action)?;

            total_reward += match self.normalizer {
                Some(n) if self.norm_reward => n.normalize_reward(outcome.reward),
                _ => outcome.reward,
            };

            if self.viz.is_active() {
                self.viz
                    .set_time(Timeline::Timestep, outcome.info.episode_step);
                self.viz.log_step(&outcome.info, waypoint_radius);
                self.viz.log_actions(&action);
            }
            if outcome.info.episode_step % 100 == 0 {
                log::debug!(
                    "step {}: waypoint {}/{}, dist {:.2}m, speed {:.2}m/s",
                    outcome.info.episode_step,
                    outcome.info.current_waypoint_idx,
                    outcome.info.max_waypoints,
                    outcome.info.distance,
                    outcome.info.speed
                );
            }
            if let Some(pause) = self.pacing {
                thread::sleep(pause);
            }

            if outcome.done() {
                let info = outcome.info;
                return Ok(Some(EvalEpisode {
                    episode,
                    reward: total_reward,
                    length: info.episode_step,
                    waypoints_reached: info.waypoints_reached(),
                    success: info.success,
                    crash_type: info.crash_type().map(str::to_string),
                    completion_time_s: info.completion_steps.map(|s| s as f64 * dt),
                }));
            }
            obs = outcome.observation;
        }
    }
}

// ============================================================================
// evaluate
// ============================================================================

/// Options of an evaluation run.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalOptions {
    pub episodes: usize,
    pub output_csv: Option<PathBuf>,
    /// Defaults to `training.seed + 1000`
    pub seed: Option<u64>,
    pub realtime: bool,
    pub visualize: bool,
}

impl EvalOptions {
    pub fn from_config(cfg: &ExperimentConfig) -> Self {
        Self {
            episodes: 1,
            output_csv: None,
            seed: None,
            realtime: cfg.evaluation.realtime,
            visualize: cfg!(feature = "viz"),
        }
    }

    /// Unpaced, no viewer.
    pub fn headless(episodes: usize) -> Self {
        Self {
            episodes,
            output_csv: None,
            seed: None,
            realtime: false,
            visualize: false,
        }
    }

    pub fn with_episodes(mut self, episodes: usize) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_csv = Some(path.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn open_eval_csv(path: &Path) -> Result<csv::Writer<fs::File>, EvalError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let is_new = !path.exists() || fs::metadata(path)?.len() == 0;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if is_new {
        writer.write_record(EVAL_COLUMNS)?;
    }
    Ok(writer)
}

/// Evaluate the policy found under `model_path` on the evaluation variant
/// of the base environment.
pub fn evaluate(
    config: &ExperimentConfig,
    model_path: &Path,
    options: &EvalOptions,
    stop: &StopFlag,
) -> Result<Vec<EvalEpisode>, EvalError> {
    let files =
        ModelFiles::resolve(model_path).ok_or_else(|| EvalError::ModelNotFound(model_path.to_path_buf()))?;
    evaluate_model(
        config,
        &files,
        EnvSettings::for_evaluation(config, None),
        options,
        stop,
    )
}

/// Evaluate the policy in `files` on environments built from `settings`.
pub fn evaluate_model(
    config: &ExperimentConfig,
    files: &ModelFiles,
    settings: EnvSettings,
    options: &EvalOptions,
    stop: &StopFlag,
) -> Result<Vec<EvalEpisode>, EvalError> {
    let seed = options
        .seed
        .unwrap_or(config.training.seed + EVAL_SEED_OFFSET);
    log::info!("loading model from {}", files.policy.display());
    let policy = PpoLearner::load(&files.policy, &config.ppo, seed)?;
    let normalizer = match &files.normalizer {
        Some(path) => {
            log::info!("loading normalization stats from {}", path.display());
            Some(NormalizerState::load(path)?)
        }
        None => None,
    };

    let mut env = WaypointEnv::new(settings, seed)?;
    let got = env.observation_dim();
    for expected in std::iter::once(policy.obs_dim()).chain(normalizer.as_ref().map(|n| n.obs_dim())) {
        if expected != got {
            return Err(EvalError::ObservationMismatch { expected, got });
        }
    }
    let env_cfg = &env.settings().env;
    log::info!(
        "evaluation env: {} waypoints, noise {}, tilt termination {}",
        env.effective_waypoints(),
        env_cfg.waypoint_noise,
        if env_cfg.disable_tilt_termination { "off" } else { "on" }
    );

    let mut sink: Box<dyn VisualizationSink> = if options.visualize {
        viz::open_sink(
            &config.visualization.eval_app_id,
            config.visualization.spawn,
            config.env.arena_size,
        )
    } else {
        Box::new(NullSink)
    };
    let mut writer = options.output_csv.as_deref().map(open_eval_csv).transpose()?;
    let eval_run = chrono::Utc::now().format("eval_%Y%m%d_%H%M%S").to_string();
    let pacing = options
        .realtime
        .then(|| Duration::from_secs_f64(env.settings().env.timestep * config.evaluation.slow_motion));

    // Tie the CSV model path to what the user pointed at.
    let model_dir = files
        .policy
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| files.policy.clone());
    let mut runner = EpisodeRunner {
        policy: &policy,
        normalizer: normalizer.as_ref(),
        norm_reward: false,
        pacing,
        viz: sink.as_mut(),
        stop,
    };
    let mut results = Vec::with_capacity(options.episodes);
    for episode in 1..=options.episodes {
        let Some(ep) = runner.run_episode(&mut env, episode)? else {
            log::info!("evaluation interrupted after {} episodes", results.len());
            break;
        };
        match (&ep.crash_type, ep.completion_time_s) {
            (_, Some(secs)) if ep.success => log::info!(
                "episode {episode}: SUCCESS in {} steps ({secs:.1}s), reward {:.1}",
                ep.length,
                ep.reward
            ),
            (Some(crash), _) => log::info!(
                "episode {episode}: {crash} after {} steps, {} waypoints, reward {:.1}",
                ep.length,
                ep.waypoints_reached,
                ep.reward
            ),
            _ => log::info!(
                "episode {episode}: {} steps, {} waypoints, reward {:.1}",
                ep.length,
                ep.waypoints_reached,
                ep.reward
            ),
        }
        if let Some(w) = writer.as_mut() {
            w.serialize(EvalRow::new(&eval_run, &model_dir, &ep))?;
            w.flush()?;
        }
        results.push(ep);
    }

    let summary = EvalSummary::from_episodes(&results);
    log::info!(
        "evaluation: {} episodes, mean reward {:.2} +/- {:.2}, success rate {:.0}%",
        summary.episodes,
        summary.mean_reward,
        summary.std_reward,
        summary.success_rate * 100.0
    );
    Ok(results)
}

// ============================================================================
// demo
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DemoReport {
    pub steps: u64,
    pub reward: f64,
}

/// Random-action rollout streamed to the demo viewer.
pub fn demo(config: &ExperimentConfig, stop: &StopFlag) -> Result<DemoReport, EvalError> {
    let settings = EnvSettings::for_demo(config);
    let waypoint_radius = settings.env.waypoint_radius;
    let mut env = WaypointEnv::new(settings, config.training.seed)?;
    let mut rng = StdRng::seed_from_u64(config.training.seed);
    let mut sink = viz::open_sink(
        &config.visualization.demo_app_id,
        config.visualization.spawn,
        config.env.arena_size,
    );
    let pause = Duration::from_secs_f64(config.demo.sleep_time.max(0.0));

    env.reset(None)?;
    sink.reset_trajectory();
    let mut report = DemoReport {
        steps: 0,
        reward: 0.0,
    };
    while report.steps < config.demo.max_steps && !stop.is_stopped() {
        let mut action = [0.0; 4];
        for a in action.iter_mut().skip(1) {
            *a = rng.gen_range(-0.3..0.3);
        }
        action[0] = rng.gen_range(-0.1..0.3);

        let outcome = env.step(action)?;
        report.steps += 1;
        report.reward += outcome.reward;

        sink.set_time(Timeline::Timestep, report.steps);
        sink.log_step(&outcome.info, waypoint_radius);
        sink.log_actions(&action);
        if report.steps % 50 == 0 {
            log::info!(
                "step {}: pos {:?}, dist {:.2}m",
                report.steps,
                outcome.info.position,
                outcome.info.distance
            );
        }
        if outcome.done() {
            break;
        }
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }
    log::info!("demo done: steps={}, reward={:.1}", report.steps, report.reward);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::save_model_dir;
    use crate::config::NetArchConfig;
    use tempfile::tempdir;

    fn small_config() -> ExperimentConfig {
        let mut cfg = ExperimentConfig::default();
        cfg.ppo.net_arch = NetArchConfig {
            pi: vec![8],
            vf: vec![8],
        };
        cfg.env.max_episode_steps = 30;
        cfg.evaluation.realtime = false;
        cfg.demo.max_steps = 20;
        cfg.demo.sleep_time = 0.0;
        cfg
    }

    fn save_fresh_model(cfg: &ExperimentConfig, dir: &Path) {
        let obs_dim = cfg.env.with_overrides(&cfg.evaluation.env).observation_dim();
        let policy = PpoLearner::new(obs_dim, &cfg.ppo, 0);
        let norm = NormalizerState::new(obs_dim, &cfg.vecnormalize, cfg.ppo.gamma);
        save_model_dir(&dir.join("final_model"), &policy, &norm).unwrap();
    }

    fn episode(reward: f64, success: bool) -> EvalEpisode {
        EvalEpisode {
            episode: 1,
            reward,
            length: 10,
            waypoints_reached: 0,
            success,
            crash_type: None,
            completion_time_s: None,
        }
    }

    #[test]
    fn test_summary_statistics() {
        let s = EvalSummary::from_episodes(&[episode(1.0, false), episode(3.0, true)]);
        assert_eq!(s.mean_reward, 2.0);
        assert_eq!(s.std_reward, 1.0);
        assert_eq!(s.mean_length, 10.0);
        assert_eq!(s.success_rate, 0.5);
        assert_eq!(EvalSummary::from_episodes(&[]), EvalSummary::default());
    }

    #[test]
    fn test_missing_model_is_reported() {
        let dir = tempdir().unwrap();
        let err = evaluate(
            &small_config(),
            dir.path(),
            &EvalOptions::headless(1),
            &StopFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::ModelNotFound(_)));
    }

    #[test]
    fn test_evaluate_appends_rows_with_single_header() {
        let cfg = small_config();
        let dir = tempdir().unwrap();
        save_fresh_model(&cfg, dir.path());
        let csv_path = dir.path().join("out").join("eval.csv");
        let options = EvalOptions::headless(2).with_output(&csv_path);

        let first = evaluate(&cfg, dir.path(), &options, &StopFlag::new()).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|e| e.length <= 30));
        evaluate(&cfg, dir.path(), &options.clone().with_episodes(1), &StopFlag::new()).unwrap();

        let text = fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], EVAL_COLUMNS.join(","));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines.iter().filter(|l| l.starts_with("eval_run")).count(), 1);
    }

    #[test]
    fn test_same_seed_same_result() {
        let cfg = small_config();
        let dir = tempdir().unwrap();
        save_fresh_model(&cfg, dir.path());
        let options = EvalOptions::headless(1).with_seed(7);
        let a = evaluate(&cfg, dir.path(), &options, &StopFlag::new()).unwrap();
        let b = evaluate(&cfg, dir.path(), &options, &StopFlag::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stop_flag_cancels_before_first_step() {
        let cfg = small_config();
        let dir = tempdir().unwrap();
        save_fresh_model(&cfg, dir.path());
        let stop = StopFlag::new();
        stop.request_stop();
        let results = evaluate(&cfg, dir.path(), &EvalOptions::headless(3), &stop).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_observation_mismatch() {
        let cfg = small_config();
        let dir = tempdir().unwrap();
        save_fresh_model(&cfg, dir.path());
        let mut other = cfg.clone();
        other.evaluation.env.include_position = true;
        let err = evaluate(&other, dir.path(), &EvalOptions::headless(1), &StopFlag::new())
            .unwrap_err();
        assert!(matches!(err, EvalError::ObservationMismatch { .. }));
    }

    #[test]
    fn test_demo_respects_max_steps() {
        let report = demo(&small_config(), &StopFlag::new()).unwrap();
        assert!(report.steps >= 1 && report.steps <= 20);
        assert!(report.reward.is_finite());
    }
}
