//! Streaming 3-D visualization.
//!
//! The training loop, evaluation harness and demo talk to a
//! [`VisualizationSink`]. With the `viz` feature the sink streams to a
//! rerun viewer; otherwise, or when the viewer cannot be reached, the
//! [`NullSink`] discards everything. Sink failures never reach the caller.
//!
//! Two timelines are used: `timestep` for per-step playback and episode
//! scalars, `ppo_update` for learning curves.

pub mod geometry;
#[cfg(feature = "viz")]
mod rerun_sink;

pub use geometry::{target_arrow, DroneGeometry, WaypointStatus, ARM_COLORS, DEFAULT_ARM_LENGTH};
#[cfg(feature = "viz")]
pub use rerun_sink::RerunSink;

use crate::info::StepInfo;
use crate::metrics::{EpisodeRecord, UpdateRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeline {
    Timestep,
    PpoUpdate,
}

impl Timeline {
    pub fn as_str(self) -> &'static str {
        match self {
            Timeline::Timestep => "timestep",
            Timeline::PpoUpdate => "ppo_update",
        }
    }
}

/// Scene and scalar sink. Every method is infallible from the caller's
/// point of view.
pub trait VisualizationSink: Send {
    fn set_time(&mut self, timeline: Timeline, value: u64);

    /// Drone pose, waypoints, target arrow and trajectory from one info
    /// record.
    fn log_step(&mut self, info: &StepInfo, waypoint_radius: f64);

    fn log_actions(&mut self, action: &[f64; 4]);

    fn log_episode(&mut self, record: &EpisodeRecord);

    fn log_update(&mut self, record: &UpdateRecord);

    /// Drop the accumulated trajectory at episode end.
    fn reset_trajectory(&mut self);

    fn is_active(&self) -> bool {
        true
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl VisualizationSink for NullSink {
    fn set_time(&mut self, _timeline: Timeline, _value: u64) {}
    fn log_step(&mut self, _info: &StepInfo, _waypoint_radius: f64) {}
    fn log_actions(&mut self, _action: &[f64; 4]) {}
    fn log_episode(&mut self, _record: &EpisodeRecord) {}
    fn log_update(&mut self, _record: &UpdateRecord) {}
    fn reset_trajectory(&mut self) {}

    fn is_active(&self) -> bool {
        false
    }
}

/// Open the viewer sink for `app_id`, falling back to [`NullSink`].
#[cfg(feature = "viz")]
pub fn open_sink(app_id: &str, spawn: bool, arena_size: f64) -> Box<dyn VisualizationSink> {
    match RerunSink::connect(app_id, spawn, arena_size) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            log::warn!("visualization unavailable, continuing without it: {e}");
            Box::new(NullSink)
        }
    }
}

/// Open the viewer sink for `app_id`, falling back to [`NullSink`].
#[cfg(not(feature = "viz"))]
pub fn open_sink(app_id: &str, _spawn: bool, _arena_size: f64) -> Box<dyn VisualizationSink> {
    log::warn!("visualization for {app_id} requested but the `viz` feature is disabled");
    Box::new(NullSink)
}
