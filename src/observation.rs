//! Observation generation from sensor readings and waypoint progress.
//!
//! Layout (19 base, 22 with position):
//!
//! | Offset | Size | Component |
//! |--------|------|-----------|
//! | 0  | 3 | velocity (world) |
//! | 3  | 4 | orientation (w, x, y, z) |
//! | 7  | 3 | specific force (body) |
//! | 10 | 3 | angular velocity (body) |
//! | 13 | 3 | relative waypoint / goal_max, clipped to [-1, 1] |
//! | 16 | 1 | progress in [0, 1] |
//! | 17 | 1 | distance / goal_max, capped at 1 |
//! | 18 | 1 | speed / speed_normalization, capped at 1 |
//! | 19 | 3 | position (world), optional |
//!
//! Everything is derived from the sensor, not the true state.

use crate::constants::{BASE_OBS_DIM, POSITION_OBS_DIM};
use crate::sensor::SensorReadings;
use crate::types::{Vec3, WorldFrame};

/// Per-episode inputs besides the sensor sample.
#[derive(Clone, Copy, Debug)]
pub struct ObservationContext {
    /// Current waypoint, already clamped to the course
    pub waypoint: Vec3<WorldFrame>,
    pub current_idx: usize,
    pub effective_waypoints: usize,
    pub goal_max_distance: f64,
    pub speed_normalization: f64,
    pub include_position: bool,
}

impl ObservationContext {
    #[inline]
    pub fn observation_size(&self) -> usize {
        if self.include_position {
            POSITION_OBS_DIM
        } else {
            BASE_OBS_DIM
        }
    }
}

/// Fraction of the course done: 0 at the first waypoint, 1 at the last.
#[inline]
pub fn waypoint_progress(current_idx: usize, effective_waypoints: usize) -> f64 {
    let n = effective_waypoints.max(1);
    let denom = (n - 1).max(1);
    current_idx.min(n - 1) as f64 / denom as f64
}

/// Write one observation to `output` and return the number of elements.
///
/// `output` must hold at least `ctx.observation_size()` elements.
pub fn write_observation(
    readings: &SensorReadings,
    ctx: &ObservationContext,
    output: &mut [f64],
) -> usize {
    let mut offset = 0;
    let mut push = |values: &[f64]| {
        output[offset..offset + values.len()].copy_from_slice(values);
        offset += values.len();
    };

    push(&readings.velocity.as_array());
    push(&readings.orientation.as_array());
    push(&readings.acceleration.as_array());
    push(&readings.angular_velocity.as_array());

    let relative = ctx.waypoint - readings.position;
    let rel = relative.as_array();
    push(&[
        (rel[0] / ctx.goal_max_distance).clamp(-1.0, 1.0),
        (rel[1] / ctx.goal_max_distance).clamp(-1.0, 1.0),
        (rel[2] / ctx.goal_max_distance).clamp(-1.0, 1.0),
    ]);

    push(&[waypoint_progress(ctx.current_idx, ctx.effective_waypoints)]);
    push(&[(relative.norm() / ctx.goal_max_distance).min(1.0)]);
    push(&[(readings.velocity.norm() / ctx.speed_normalization).min(1.0)]);

    if ctx.include_position {
        push(&readings.position.as_array());
    }

    offset
}

/// Build an observation vector, replacing non-finite components by 0.0.
pub fn build_observation(readings: &SensorReadings, ctx: &ObservationContext) -> Vec<f64> {
    let mut obs = vec![0.0; ctx.observation_size()];
    let n = write_observation(readings, ctx, &mut obs);
    debug_assert_eq!(n, obs.len());

    let mut bad = 0;
    for v in obs.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
            bad += 1;
        }
    }
    if bad > 0 {
        log::warn!("observation had {} non-finite components, replaced with 0.0", bad);
    }
    obs
}
