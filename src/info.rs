//! Typed info records emitted alongside reset and step results.
//!
//! Ground truth travels to the metrics and visualization sinks through
//! [`StepInfo`]; it is the only channel that survives the worker boundary
//! of the threaded vector environment.

use serde::{Deserialize, Serialize};

use crate::termination::{CrashKind, TIMEOUT_LABEL};

/// Emitted by `reset`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResetInfo {
    pub waypoints: Vec<[f64; 3]>,
    /// Yaw applied to the base course (radians)
    pub waypoint_yaw: f64,
    pub current_waypoint_idx: usize,
    pub max_waypoints: usize,
}

/// Return and length of a finished episode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    /// Undiscounted, unnormalized return
    pub reward: f64,
    pub length: u64,
}

/// Emitted by every `step`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Distance from the true position to the waypoint checked this step
    pub distance: f64,
    pub speed: f64,
    pub mean_speed: f64,
    pub max_tilt_deg: f64,
    /// Step at which the first waypoint was reached
    pub time_to_first_wp: Option<u64>,
    /// Index after this step's reach check
    pub current_waypoint_idx: usize,
    pub max_waypoints: usize,
    pub waypoint_reached: bool,
    pub episode_step: u64,
    pub waypoint_yaw: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    /// (w, x, y, z)
    pub orientation: [f64; 4],
    pub waypoints: Vec<[f64; 3]>,
    pub success: bool,
    pub completion_steps: Option<u64>,
    pub crash: Option<CrashKind>,
    pub time_limit_reached: bool,
    /// Last observation of a finished episode, set on auto-reset
    pub terminal_observation: Option<Vec<f64>>,
    /// Set on auto-reset
    pub episode: Option<EpisodeStats>,
}

impl StepInfo {
    /// `crash_type` column value: the crash label, "timeout" for a
    /// truncated episode, `None` otherwise.
    pub fn crash_type(&self) -> Option<&'static str> {
        match self.crash {
            Some(kind) => Some(kind.as_str()),
            None if self.time_limit_reached => Some(TIMEOUT_LABEL),
            None => None,
        }
    }

    /// Waypoints passed so far.
    #[inline]
    pub fn waypoints_reached(&self) -> usize {
        self.current_waypoint_idx
    }

    /// Current target, or the last one after completion.
    pub fn target_waypoint(&self) -> Option<[f64; 3]> {
        if self.waypoints.is_empty() {
            return None;
        }
        let idx = self.current_waypoint_idx.min(self.waypoints.len() - 1);
        Some(self.waypoints[idx])
    }
}
