//! Modular reward shaping with compile-time composition.
//!
//! Per-step shaping terms implement [`RewardComponent`] and compose via
//! tuples, so the full shaped reward is a plain value with no vtable:
//!
//! ```ignore
//! use simhops::reward::*;
//!
//! let reward = (
//!     ProgressReward { multiplier: 5.0 },
//!     TimePenalty { penalty: 0.01 },
//!     WaypointBonus { bonus: 50.0 },
//! );
//! ```
//!
//! Terminal terms (path completion and crash penalties) depend on the
//! termination decision and are applied by the environment afterwards via
//! [`completion_bonus`] and [`crate::termination::CrashKind::penalty`].
//!
//! # Built-in Components
//!
//! - [`ProgressReward`] - Reduction in distance since the previous step
//! - [`TimePenalty`] - Constant per-step cost
//! - [`WaypointBonus`] - One-off bonus on reaching a waypoint
//! - [`ProximityBonus`] - Graduated bonus inside 3x and 1.5x the radius

pub mod components;

pub use components::*;

use crate::config::RewardConfig;

/// Inputs to one step's shaping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RewardContext {
    /// Distance to the current waypoint this step (m)
    pub distance: f64,
    /// Distance on the previous step; `None` right after reset or a reach
    pub prev_distance: Option<f64>,
    pub waypoint_reached: bool,
    pub waypoint_radius: f64,
}

/// A shaping term that can be composed at compile time.
pub trait RewardComponent: Clone + Send + Sync {
    /// Human-readable name for logging/debugging.
    const NAME: &'static str;

    fn compute(&self, ctx: &RewardContext) -> f64;
}

// ============================================================================
// Tuple Implementations
// ============================================================================

impl RewardComponent for () {
    const NAME: &'static str = "Empty";

    #[inline(always)]
    fn compute(&self, _ctx: &RewardContext) -> f64 {
        0.0
    }
}

impl<A: RewardComponent, B: RewardComponent> RewardComponent for (A, B) {
    const NAME: &'static str = "Composed2";

    #[inline(always)]
    fn compute(&self, ctx: &RewardContext) -> f64 {
        self.0.compute(ctx) + self.1.compute(ctx)
    }
}

impl<A: RewardComponent, B: RewardComponent, C: RewardComponent> RewardComponent for (A, B, C) {
    const NAME: &'static str = "Composed3";

    #[inline(always)]
    fn compute(&self, ctx: &RewardContext) -> f64 {
        self.0.compute(ctx) + self.1.compute(ctx) + self.2.compute(ctx)
    }
}

impl<A, B, C, D> RewardComponent for (A, B, C, D)
where
    A: RewardComponent,
    B: RewardComponent,
    C: RewardComponent,
    D: RewardComponent,
{
    const NAME: &'static str = "Composed4";

    #[inline(always)]
    fn compute(&self, ctx: &RewardContext) -> f64 {
        self.0.compute(ctx) + self.1.compute(ctx) + self.2.compute(ctx) + self.3.compute(ctx)
    }
}

// ============================================================================
// Waypoint Shaping
// ============================================================================

/// The default per-step shaping of the waypoint task.
pub type ShapedReward = (ProgressReward, TimePenalty, WaypointBonus, ProximityBonus);

/// Build [`ShapedReward`] from the reward section.
pub fn shaped_reward(cfg: &RewardConfig) -> ShapedReward {
    (
        ProgressReward {
            multiplier: cfg.progress_multiplier,
        },
        TimePenalty {
            penalty: cfg.time_penalty,
        },
        WaypointBonus {
            bonus: cfg.waypoint_bonus,
        },
        ProximityBonus {
            outer_radius: cfg.close_radius_3x,
            outer_bonus: cfg.close_3x_bonus,
            inner_radius: cfg.close_radius_1_5x,
            inner_bonus: cfg.close_1_5x_bonus,
        },
    )
}

/// Path-complete bonus plus the linear time bonus
/// max(0, (max_steps − step) / divisor).
#[inline]
pub fn completion_bonus(cfg: &RewardConfig, max_episode_steps: u64, step: u64) -> f64 {
    let remaining = max_episode_steps as f64 - step as f64;
    cfg.path_complete_bonus + (remaining / cfg.completion_time_divisor).max(0.0)
}
