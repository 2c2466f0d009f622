//! Scene geometry derived from the simulator's ground truth.
//!
//! These helpers are independent of the viewer so they compile and test
//! without the `viz` feature.

use crate::physics::quaternion::quat_to_rotation_matrix;

/// Drawn arm length when the caller has no airframe config at hand.
pub const DEFAULT_ARM_LENGTH: f64 = 0.17;

/// Length of the drawn body up-vector.
const UP_VECTOR_LENGTH: f64 = 0.25;

/// Arrows shorter than this are not drawn.
const MIN_ARROW_DISTANCE: f64 = 0.1;
/// Cap on the drawn target arrow.
const MAX_ARROW_LENGTH: f64 = 3.0;

/// Arm colours: front, back, left, right.
pub const ARM_COLORS: [[u8; 4]; 4] = [
    [255, 50, 50, 255],
    [100, 100, 100, 255],
    [50, 255, 50, 255],
    [50, 255, 50, 255],
];

fn rotate(rot: &[f64; 9], v: [f64; 3]) -> [f64; 3] {
    [
        rot[0] * v[0] + rot[1] * v[1] + rot[2] * v[2],
        rot[3] * v[0] + rot[4] * v[1] + rot[5] * v[2],
        rot[6] * v[0] + rot[7] * v[1] + rot[8] * v[2],
    ]
}

/// World-frame drawing of the airframe in "+" layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DroneGeometry {
    pub center: [f64; 3],
    /// Motor positions: front (+x), back, left (+y), right
    pub motors: [[f64; 3]; 4],
    /// Body z-axis scaled to the drawn length
    pub up: [f64; 3],
}

impl DroneGeometry {
    /// `orientation` is (w, x, y, z).
    pub fn from_pose(position: [f64; 3], orientation: [f64; 4], arm_length: f64) -> Self {
        let rot = quat_to_rotation_matrix(orientation);
        let offsets = [
            [arm_length, 0.0, 0.0],
            [-arm_length, 0.0, 0.0],
            [0.0, arm_length, 0.0],
            [0.0, -arm_length, 0.0],
        ];
        let motors = offsets.map(|o| {
            let r = rotate(&rot, o);
            [position[0] + r[0], position[1] + r[1], position[2] + r[2]]
        });
        Self {
            center: position,
            motors,
            up: rotate(&rot, [0.0, 0.0, UP_VECTOR_LENGTH]),
        }
    }

    /// Arm segments from the centre to each motor.
    pub fn arms(&self) -> [([f64; 3], [f64; 3]); 4] {
        self.motors.map(|m| (self.center, m))
    }
}

/// Progress state of a waypoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaypointStatus {
    Done,
    Current,
    Upcoming,
}

impl WaypointStatus {
    pub fn classify(index: usize, current_idx: usize) -> Self {
        match index.cmp(&current_idx) {
            std::cmp::Ordering::Less => WaypointStatus::Done,
            std::cmp::Ordering::Equal => WaypointStatus::Current,
            std::cmp::Ordering::Greater => WaypointStatus::Upcoming,
        }
    }

    /// RGBA
    pub fn color(self) -> [u8; 4] {
        match self {
            WaypointStatus::Done => [0, 255, 0, 100],
            WaypointStatus::Current => [255, 255, 0, 255],
            WaypointStatus::Upcoming => [255, 128, 0, 150],
        }
    }

    /// Marker radius as a fraction of the waypoint radius.
    pub fn radius_scale(self) -> f64 {
        match self {
            WaypointStatus::Done => 0.5,
            WaypointStatus::Current => 1.0,
            WaypointStatus::Upcoming => 0.7,
        }
    }
}

/// Vector from the drone towards `target`, capped in length. `None` when
/// the drone is already at the target.
pub fn target_arrow(position: [f64; 3], target: [f64; 3]) -> Option<[f64; 3]> {
    let d = [
        target[0] - position[0],
        target[1] - position[1],
        target[2] - position[2],
    ];
    let distance = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
    if !(distance > MIN_ARROW_DISTANCE) {
        return None;
    }
    let scale = distance.min(MAX_ARROW_LENGTH) / distance;
    Some([d[0] * scale, d[1] * scale, d[2] * scale])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 3], b: [f64; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn test_level_pose_geometry() {
        let g = DroneGeometry::from_pose([1.0, 2.0, 3.0], [1.0, 0.0, 0.0, 0.0], 0.2);
        assert!(close(g.motors[0], [1.2, 2.0, 3.0]));
        assert!(close(g.motors[2], [1.0, 2.2, 3.0]));
        assert!(close(g.up, [0.0, 0.0, 0.25]));
        assert_eq!(g.arms()[1].0, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_yawed_pose_rotates_arms() {
        // 90 degrees about z
        let h = std::f64::consts::FRAC_PI_4;
        let g = DroneGeometry::from_pose([0.0; 3], [h.cos(), 0.0, 0.0, h.sin()], 1.0);
        assert!(close(g.motors[0], [0.0, 1.0, 0.0]));
        assert!(close(g.up, [0.0, 0.0, 0.25]));
    }

    #[test]
    fn test_rolled_pose_tilts_up_vector() {
        // 90 degrees about x
        let h = std::f64::consts::FRAC_PI_4;
        let g = DroneGeometry::from_pose([0.0; 3], [h.cos(), h.sin(), 0.0, 0.0], 1.0);
        assert!(close(g.up, [0.0, -0.25, 0.0]));
    }

    #[test]
    fn test_waypoint_status() {
        assert_eq!(WaypointStatus::classify(0, 2), WaypointStatus::Done);
        assert_eq!(WaypointStatus::classify(2, 2), WaypointStatus::Current);
        assert_eq!(WaypointStatus::classify(5, 2), WaypointStatus::Upcoming);
        assert_eq!(WaypointStatus::Current.color(), [255, 255, 0, 255]);
        assert_eq!(WaypointStatus::Done.radius_scale(), 0.5);
    }

    #[test]
    fn test_target_arrow_is_capped() {
        let a = target_arrow([0.0; 3], [10.0, 0.0, 0.0]).unwrap();
        assert!(close(a, [3.0, 0.0, 0.0]));
        let b = target_arrow([0.0; 3], [0.0, 1.0, 0.0]).unwrap();
        assert!(close(b, [0.0, 1.0, 0.0]));
        assert!(target_arrow([1.0; 3], [1.0, 1.0, 1.05]).is_none());
    }
}
