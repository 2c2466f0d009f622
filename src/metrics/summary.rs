//! `training_summary.json` and `config.json` documents.

use std::collections::BTreeMap;
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::config::{EnvConfig, ExperimentConfig, NetArchConfig, PpoConfig, RewardConfig};

use super::records::{EpisodeRecord, UpdateRecord};

/// Episodes averaged by the rolling reward statistics.
pub const ROLLING_WINDOW: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub best_reward: f64,
    pub mean_reward_last_100: f64,
    pub total_episodes: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuccessMetrics {
    pub success_rate: f64,
    pub mean_waypoints_reached: f64,
    /// Mean length of successful episodes
    pub mean_completion_steps: Option<f64>,
    pub first_success_episode: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    /// Share of episodes with any crash type, timeouts included
    pub crash_rate: f64,
    pub timeout_rate: f64,
    pub crash_type_breakdown: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalLosses {
    pub policy_loss: Option<f64>,
    pub value_loss: Option<f64>,
    pub entropy: Option<f64>,
    pub kl_divergence: Option<f64>,
    pub clip_fraction: Option<f64>,
    pub explained_variance: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingHealth {
    pub final_losses: FinalLosses,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub timestamp: String,
    pub performance: Performance,
    pub success_metrics: SuccessMetrics,
    pub failure_analysis: FailureAnalysis,
    pub training_health: TrainingHealth,
    pub wall_time_seconds: f64,
    pub total_timesteps: u64,
    pub total_episodes: u64,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Mean reward of the most recent [`ROLLING_WINDOW`] episodes, 0 when empty.
pub fn rolling_mean_reward(episodes: &[EpisodeRecord]) -> f64 {
    let start = episodes.len().saturating_sub(ROLLING_WINDOW);
    mean(episodes[start..].iter().map(|e| e.reward)).unwrap_or(0.0)
}

impl TrainingSummary {
    pub fn build(
        episodes: &[EpisodeRecord],
        last_update: Option<&UpdateRecord>,
        total_timesteps: u64,
        wall_time_seconds: f64,
    ) -> Self {
        let n = episodes.len();
        let rate = |count: usize| if n == 0 { 0.0 } else { count as f64 / n as f64 };

        let best_reward = episodes
            .iter()
            .map(|e| e.reward)
            .fold(None, |best: Option<f64>, r| Some(best.map_or(r, |b| b.max(r))))
            .unwrap_or(0.0);

        let mut crash_type_breakdown = BTreeMap::new();
        for crash in episodes.iter().filter_map(|e| e.crash_type.as_deref()) {
            *crash_type_breakdown.entry(crash.to_string()).or_insert(0) += 1;
        }

        let final_losses = last_update
            .map(|u| FinalLosses {
                policy_loss: Some(u.policy_loss),
                value_loss: Some(u.value_loss),
                entropy: Some(u.entropy),
                kl_divergence: Some(u.kl_divergence),
                clip_fraction: Some(u.clip_fraction),
                explained_variance: Some(u.explained_variance),
            })
            .unwrap_or_default();

        Self {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            performance: Performance {
                best_reward,
                mean_reward_last_100: rolling_mean_reward(episodes),
                total_episodes: n as u64,
            },
            success_metrics: SuccessMetrics {
                success_rate: rate(episodes.iter().filter(|e| e.success).count()),
                mean_waypoints_reached: mean(episodes.iter().map(|e| e.waypoints_reached as f64))
                    .unwrap_or(0.0),
                mean_completion_steps: mean(
                    episodes.iter().filter(|e| e.success).map(|e| e.length as f64),
                ),
                first_success_episode: episodes.iter().find(|e| e.success).map(|e| e.episode),
            },
            failure_analysis: FailureAnalysis {
                crash_rate: rate(episodes.iter().filter(|e| e.crash_type.is_some()).count()),
                timeout_rate: rate(episodes.iter().filter(|e| e.is_timeout()).count()),
                crash_type_breakdown,
            },
            training_health: TrainingHealth { final_losses },
            wall_time_seconds,
            total_timesteps,
            total_episodes: n as u64,
        }
    }
}

// ============================================================================
// config.json
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Hyperparameters {
    #[serde(flatten)]
    pub ppo: PpoConfig,
    pub total_timesteps: u64,
    pub n_envs: usize,
    pub seed: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescription {
    pub policy: String,
    pub activation: String,
    pub net_arch: NetArchConfig,
}

/// Run description captured once at start.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunConfigRecord {
    pub run_id: String,
    pub timestamp: String,
    pub git_commit: Option<String>,
    pub hyperparameters: Hyperparameters,
    pub environment: EnvConfig,
    pub network: NetworkDescription,
    pub reward: RewardConfig,
}

impl RunConfigRecord {
    pub fn new(run_id: &str, cfg: &ExperimentConfig) -> Self {
        Self {
            run_id: run_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            git_commit: git_commit(),
            hyperparameters: Hyperparameters {
                ppo: cfg.ppo.clone(),
                total_timesteps: cfg.training.total_timesteps,
                n_envs: cfg.training.n_envs,
                seed: cfg.training.seed,
            },
            environment: cfg.env.clone(),
            network: NetworkDescription {
                policy: "MlpPolicy".to_string(),
                activation: "tanh".to_string(),
                net_arch: cfg.ppo.net_arch.clone(),
            },
            reward: cfg.reward.clone(),
        }
    }
}

/// `git rev-parse HEAD` of the working directory, if any.
fn git_commit() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let commit = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!commit.is_empty()).then_some(commit)
}
