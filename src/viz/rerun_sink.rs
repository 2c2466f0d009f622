//! rerun-backed sink.

use rerun::{
    Arrows3D, Boxes3D, Clear, Color, LineStrips3D, Points3D, RecordingStream,
    RecordingStreamBuilder, RecordingStreamResult, Scalar, ViewCoordinates,
};

use crate::info::StepInfo;
use crate::metrics::{EpisodeRecord, UpdateRecord};

use super::geometry::{target_arrow, DroneGeometry, WaypointStatus, ARM_COLORS, DEFAULT_ARM_LENGTH};
use super::{Timeline, VisualizationSink};

fn rgba(c: [u8; 4]) -> Color {
    Color::from_unmultiplied_rgba(c[0], c[1], c[2], c[3])
}

fn p32(p: [f64; 3]) -> [f32; 3] {
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

pub struct RerunSink {
    rec: RecordingStream,
    trajectory: Vec<[f32; 3]>,
    warned: bool,
}

impl RerunSink {
    pub fn connect(app_id: &str, spawn: bool, arena_size: f64) -> RecordingStreamResult<Self> {
        let builder = RecordingStreamBuilder::new(app_id);
        let rec = if spawn {
            builder.spawn()?
        } else {
            builder.connect_tcp()?
        };
        let mut sink = Self {
            rec,
            trajectory: Vec::new(),
            warned: false,
        };
        let result = sink.init_world(arena_size as f32);
        sink.report(result);
        Ok(sink)
    }

    fn init_world(&self, size: f32) -> RecordingStreamResult<()> {
        self.rec.log_static("world", &ViewCoordinates::RIGHT_HAND_Z_UP)?;
        self.rec.log_static(
            "world/ground",
            &Boxes3D::from_centers_and_half_sizes([[0.0, 0.0, 0.0]], [[size, size, 0.01]])
                .with_colors([rgba([80, 80, 80, 80])]),
        )?;
        self.rec.log_static(
            "world/origin",
            &Arrows3D::from_vectors([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]])
                .with_origins([[0.0f32; 3]; 3])
                .with_colors([
                    rgba([255, 0, 0, 200]),
                    rgba([0, 255, 0, 200]),
                    rgba([0, 0, 255, 200]),
                ]),
        )
    }

    /// Viewer errors are logged once and otherwise ignored.
    fn report(&mut self, result: RecordingStreamResult<()>) {
        if let Err(e) = result {
            if !self.warned {
                log::warn!("visualization stream error (further errors suppressed): {e}");
                self.warned = true;
            }
        }
    }

    fn log_scene(&mut self, info: &StepInfo, waypoint_radius: f64) -> RecordingStreamResult<()> {
        let pos = p32(info.position);
        self.rec.log(
            "world/drone/center",
            &Points3D::new([pos])
                .with_colors([rgba([50, 50, 200, 255])])
                .with_radii([0.08]),
        )?;

        let geometry = DroneGeometry::from_pose(info.position, info.orientation, DEFAULT_ARM_LENGTH);
        let arms: Vec<Vec<[f32; 3]>> = geometry
            .arms()
            .iter()
            .map(|(a, b)| vec![p32(*a), p32(*b)])
            .collect();
        self.rec.log(
            "world/drone/arms",
            &LineStrips3D::new(arms).with_colors(ARM_COLORS.map(rgba)),
        )?;
        self.rec.log(
            "world/drone/up",
            &Arrows3D::from_vectors([p32(geometry.up)])
                .with_origins([pos])
                .with_colors([rgba([255, 255, 0, 200])]),
        )?;

        let speed = info.speed;
        if speed > 0.1 {
            let v = info.velocity.map(|c| c * 0.3);
            self.rec.log(
                "world/drone/velocity",
                &Arrows3D::from_vectors([p32(v)])
                    .with_origins([pos])
                    .with_colors([rgba([0, 200, 255, 200])]),
            )?;
        }

        if !info.waypoints.is_empty() {
            let statuses: Vec<WaypointStatus> = (0..info.waypoints.len())
                .map(|i| WaypointStatus::classify(i, info.current_waypoint_idx))
                .collect();
            let points: Vec<[f32; 3]> = info.waypoints.iter().map(|w| p32(*w)).collect();
            self.rec.log(
                "world/waypoints",
                &Points3D::new(points.clone())
                    .with_colors(statuses.iter().map(|s| rgba(s.color())))
                    .with_radii(
                        statuses
                            .iter()
                            .map(|s| (waypoint_radius * s.radius_scale()) as f32),
                    ),
            )?;
            if points.len() > 1 {
                self.rec.log(
                    "world/waypoint_path",
                    &LineStrips3D::new([points]).with_colors([rgba([180, 180, 180, 80])]),
                )?;
            }
        }

        if let Some(arrow) = info
            .target_waypoint()
            .and_then(|t| target_arrow(info.position, t))
        {
            self.rec.log(
                "world/drone/to_target",
                &Arrows3D::from_vectors([p32(arrow)])
                    .with_origins([pos])
                    .with_colors([rgba([255, 100, 100, 200])]),
            )?;
        }

        self.trajectory.push(pos);
        if self.trajectory.len() > 1 {
            self.rec.log(
                "world/trajectory",
                &LineStrips3D::new([self.trajectory.clone()])
                    .with_colors([rgba([100, 100, 255, 180])]),
            )?;
        }
        Ok(())
    }

    fn log_scalars(&self, entries: &[(&str, f64)]) -> RecordingStreamResult<()> {
        for (path, value) in entries {
            self.rec.log(*path, &Scalar::new(*value))?;
        }
        Ok(())
    }
}

impl VisualizationSink for RerunSink {
    fn set_time(&mut self, timeline: Timeline, value: u64) {
        self.rec
            .set_time_sequence(timeline.as_str(), i64::try_from(value).unwrap_or(i64::MAX));
    }

    fn log_step(&mut self, info: &StepInfo, waypoint_radius: f64) {
        let result = self.log_scene(info, waypoint_radius);
        self.report(result);
    }

    fn log_actions(&mut self, action: &[f64; 4]) {
        let result = self.log_scalars(&[
            ("actions/throttle", action[0]),
            ("actions/roll", action[1]),
            ("actions/pitch", action[2]),
            ("actions/yaw", action[3]),
        ]);
        self.report(result);
    }

    fn log_episode(&mut self, record: &EpisodeRecord) {
        let result = self.log_scalars(&[
            ("episode/reward", record.reward),
            ("episode/length", record.length as f64),
            ("episode/waypoints_reached", record.waypoints_reached as f64),
            ("episode/success", if record.success { 1.0 } else { 0.0 }),
        ]);
        self.report(result);
    }

    fn log_update(&mut self, record: &UpdateRecord) {
        let result = self.log_scalars(&[
            ("progress/mean_reward", record.mean_episode_reward),
            ("losses/policy", record.policy_loss),
            ("losses/value", record.value_loss),
            ("losses/entropy", record.entropy),
            ("ppo/approx_kl", record.kl_divergence),
            ("ppo/clip_fraction", record.clip_fraction),
            ("ppo/explained_variance", record.explained_variance),
            ("ppo/learning_rate", record.learning_rate),
        ]);
        self.report(result);
    }

    fn reset_trajectory(&mut self) {
        self.trajectory.clear();
        let result = self.rec.log("world/trajectory", &Clear::recursive());
        self.report(result);
    }
}
