//! Built-in shaping components for waypoint tracking.
//!
//! Each component is a small `Copy` struct implementing [`RewardComponent`].

use super::{RewardComponent, RewardContext};

// ============================================================================
// Progress
// ============================================================================

/// Rewards reduction in distance to the current waypoint.
///
/// `reward += multiplier * (d_prev - d)`, zero when `d_prev` is unset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressReward {
    pub multiplier: f64,
}

impl RewardComponent for ProgressReward {
    const NAME: &'static str = "ProgressReward";

    #[inline]
    fn compute(&self, ctx: &RewardContext) -> f64 {
        match ctx.prev_distance {
            Some(prev) => (prev - ctx.distance) * self.multiplier,
            None => 0.0,
        }
    }
}

// ============================================================================
// Time Penalty
// ============================================================================

/// Constant per-step cost.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimePenalty {
    pub penalty: f64,
}

impl RewardComponent for TimePenalty {
    const NAME: &'static str = "TimePenalty";

    #[inline(always)]
    fn compute(&self, _ctx: &RewardContext) -> f64 {
        -self.penalty
    }
}

// ============================================================================
// Waypoint Bonus
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaypointBonus {
    pub bonus: f64,
}

impl RewardComponent for WaypointBonus {
    const NAME: &'static str = "WaypointBonus";

    #[inline(always)]
    fn compute(&self, ctx: &RewardContext) -> f64 {
        if ctx.waypoint_reached {
            self.bonus
        } else {
            0.0
        }
    }
}

// ============================================================================
// Proximity Bonus
// ============================================================================

/// Graduated bonus near the waypoint.
///
/// Radii are multiples of the waypoint radius. The inner bonus is only
/// paid inside the outer ring, so both stack.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProximityBonus {
    pub outer_radius: f64,
    pub outer_bonus: f64,
    pub inner_radius: f64,
    pub inner_bonus: f64,
}

impl RewardComponent for ProximityBonus {
    const NAME: &'static str = "ProximityBonus";

    #[inline]
    fn compute(&self, ctx: &RewardContext) -> f64 {
        let mut reward = 0.0;
        if ctx.distance < ctx.waypoint_radius * self.outer_radius {
            reward += self.outer_bonus;
            if ctx.distance < ctx.waypoint_radius * self.inner_radius {
                reward += self.inner_bonus;
            }
        }
        reward
    }
}
