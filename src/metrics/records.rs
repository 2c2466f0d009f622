//! Row types of the metric CSV files.

use serde::{Deserialize, Serialize};

use crate::info::StepInfo;
use crate::learner::UpdateStats;

pub const EPISODE_COLUMNS: [&str; 11] = [
    "episode",
    "timestep",
    "reward",
    "length",
    "waypoints_reached",
    "success",
    "crash_type",
    "final_distance",
    "mean_speed",
    "max_tilt_deg",
    "time_to_first_wp",
];

pub const UPDATE_COLUMNS: [&str; 10] = [
    "update",
    "timestep",
    "policy_loss",
    "value_loss",
    "entropy",
    "kl_divergence",
    "clip_fraction",
    "explained_variance",
    "learning_rate",
    "mean_episode_reward",
];

pub const EXPERIMENT_COLUMNS: [&str; 7] = [
    "run_id",
    "timestamp",
    "total_timesteps",
    "success_rate",
    "mean_reward",
    "best_reward",
    "notes",
];

/// One row of `episodes.csv`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// 1-based count of episodes seen by this run
    pub episode: u64,
    pub timestep: u64,
    pub reward: f64,
    pub length: u64,
    pub waypoints_reached: usize,
    pub success: bool,
    pub crash_type: Option<String>,
    pub final_distance: f64,
    pub mean_speed: f64,
    pub max_tilt_deg: f64,
    pub time_to_first_wp: Option<u64>,
}

impl EpisodeRecord {
    /// Row for a finished episode; `None` unless the vector env attached
    /// episode statistics to `info`.
    pub fn from_info(episode: u64, timestep: u64, info: &StepInfo) -> Option<Self> {
        let stats = info.episode?;
        Some(Self {
            episode,
            timestep,
            reward: stats.reward,
            length: stats.length,
            waypoints_reached: info.waypoints_reached(),
            success: info.success,
            crash_type: info.crash_type().map(str::to_string),
            final_distance: info.distance,
            mean_speed: info.mean_speed,
            max_tilt_deg: info.max_tilt_deg,
            time_to_first_wp: info.time_to_first_wp,
        })
    }

    pub fn is_timeout(&self) -> bool {
        self.crash_type.as_deref() == Some(crate::termination::TIMEOUT_LABEL)
    }
}

/// One row of `updates.csv`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub update: u64,
    pub timestep: u64,
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    pub kl_divergence: f64,
    pub clip_fraction: f64,
    pub explained_variance: f64,
    pub learning_rate: f64,
    pub mean_episode_reward: f64,
}

impl UpdateRecord {
    pub fn from_stats(update: u64, stats: &UpdateStats, mean_episode_reward: f64) -> Self {
        Self {
            update,
            timestep: stats.timestep,
            policy_loss: stats.policy_loss,
            value_loss: stats.value_loss,
            entropy: stats.entropy,
            kl_divergence: stats.approx_kl,
            clip_fraction: stats.clip_fraction,
            explained_variance: stats.explained_variance,
            learning_rate: stats.learning_rate,
            mean_episode_reward,
        }
    }
}

/// One row of the cross-run `experiments.csv`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub run_id: String,
    pub timestamp: String,
    pub total_timesteps: u64,
    pub success_rate: f64,
    pub mean_reward: f64,
    pub best_reward: f64,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::EpisodeStats;
    use crate::termination::CrashKind;

    fn finished_info() -> StepInfo {
        StepInfo {
            distance: 4.2,
            speed: 1.0,
            mean_speed: 0.8,
            max_tilt_deg: 12.0,
            time_to_first_wp: None,
            current_waypoint_idx: 0,
            max_waypoints: 10,
            waypoint_reached: false,
            episode_step: 44,
            waypoint_yaw: 0.0,
            position: [0.0, 0.0, 0.04],
            velocity: [0.0; 3],
            orientation: [1.0, 0.0, 0.0, 0.0],
            waypoints: Vec::new(),
            success: false,
            completion_steps: None,
            crash: Some(CrashKind::OutOfBounds),
            time_limit_reached: false,
            terminal_observation: None,
            episode: Some(EpisodeStats {
                reward: -5.44,
                length: 44,
            }),
        }
    }

    #[test]
    fn test_episode_record_from_info() {
        let rec = EpisodeRecord::from_info(3, 880, &finished_info()).unwrap();
        assert_eq!(rec.episode, 3);
        assert_eq!(rec.length, 44);
        assert_eq!(rec.crash_type.as_deref(), Some("out_of_bounds"));
        assert!(!rec.success);
        assert!(!rec.is_timeout());
    }

    #[test]
    fn test_unfinished_info_gives_no_row() {
        let mut info = finished_info();
        info.episode = None;
        assert!(EpisodeRecord::from_info(1, 0, &info).is_none());
    }

    #[test]
    fn test_csv_writes_empty_cells_for_absent_values() {
        let rec = EpisodeRecord::from_info(1, 10, &finished_info()).unwrap();
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        wtr.serialize(&rec).unwrap();
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        assert_eq!(text.trim_end(), "1,10,-5.44,44,0,false,out_of_bounds,4.2,0.8,12.0,");
    }
}
