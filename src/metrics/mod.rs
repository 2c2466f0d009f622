//! Structured metrics for training runs.
//!
//! [`MetricsSink`] owns the run's metric files:
//! - `episodes.csv`: one row per finished episode;
//! - `updates.csv`: one row per optimizer update;
//! - `training_summary.json`: rewritten on every summary write;
//! - `config.json`: captured once at run start;
//! - `<output>/experiments.csv`: one row appended per summary write.
//!
//! Rows are flushed as they are written. Callbacks share one sink through
//! [`SharedMetrics`]; only the training thread writes to it.

pub mod records;
pub mod summary;

pub use records::{EpisodeRecord, ExperimentRecord, UpdateRecord};
pub use summary::{rolling_mean_reward, RunConfigRecord, TrainingSummary};

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::ExperimentConfig;
use crate::error::MetricsError;
use crate::info::StepInfo;
use crate::learner::UpdateStats;

use records::{EPISODE_COLUMNS, EXPERIMENT_COLUMNS, UPDATE_COLUMNS};

pub type SharedMetrics = Arc<Mutex<MetricsSink>>;

fn csv_with_header(path: &Path, header: &[&str]) -> Result<csv::Writer<File>, MetricsError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(header)?;
    writer.flush()?;
    Ok(writer)
}

pub struct MetricsSink {
    run_id: String,
    summary_path: PathBuf,
    experiments_path: PathBuf,
    start: Instant,
    episodes: Vec<EpisodeRecord>,
    updates: Vec<UpdateRecord>,
    episode_writer: csv::Writer<File>,
    update_writer: csv::Writer<File>,
    notes: String,
}

impl MetricsSink {
    /// Open the CSV files of `run_dir` and write their headers.
    pub fn create(run_dir: &Path) -> Result<Self, MetricsError> {
        fs::create_dir_all(run_dir)?;
        let run_id = run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string());
        let experiments_dir = run_dir.parent().unwrap_or(run_dir);
        Ok(Self {
            run_id,
            summary_path: run_dir.join("training_summary.json"),
            experiments_path: experiments_dir.join("experiments.csv"),
            start: Instant::now(),
            episodes: Vec::new(),
            updates: Vec::new(),
            episode_writer: csv_with_header(&run_dir.join("episodes.csv"), &EPISODE_COLUMNS)?,
            update_writer: csv_with_header(&run_dir.join("updates.csv"), &UPDATE_COLUMNS)?,
            notes: String::new(),
        })
    }

    pub fn shared(self) -> SharedMetrics {
        Arc::new(Mutex::new(self))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Free text for the `notes` column of `experiments.csv`.
    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    /// Write `config.json` into `run_dir`.
    pub fn write_run_config(&self, run_dir: &Path, cfg: &ExperimentConfig) -> Result<(), MetricsError> {
        let record = RunConfigRecord::new(&self.run_id, cfg);
        fs::write(run_dir.join("config.json"), serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }

    pub fn episodes(&self) -> &[EpisodeRecord] {
        &self.episodes
    }

    pub fn updates(&self) -> &[UpdateRecord] {
        &self.updates
    }

    pub fn episode_count(&self) -> u64 {
        self.episodes.len() as u64
    }

    pub fn mean_reward_last_100(&self) -> f64 {
        rolling_mean_reward(&self.episodes)
    }

    /// Record a finished episode. Infos without episode statistics are
    /// ignored.
    pub fn log_episode(
        &mut self,
        timestep: u64,
        info: &StepInfo,
    ) -> Result<Option<&EpisodeRecord>, MetricsError> {
        let Some(record) = EpisodeRecord::from_info(self.episode_count() + 1, timestep, info) else {
            return Ok(None);
        };
        self.episode_writer.serialize(&record)?;
        self.episode_writer.flush()?;
        self.episodes.push(record);
        Ok(self.episodes.last())
    }

    pub fn log_update(&mut self, stats: &UpdateStats) -> Result<&UpdateRecord, MetricsError> {
        let update = self.updates.len() as u64 + 1;
        let record = UpdateRecord::from_stats(update, stats, self.mean_reward_last_100());
        self.update_writer.serialize(&record)?;
        self.update_writer.flush()?;
        self.updates.push(record);
        Ok(&self.updates[self.updates.len() - 1])
    }

    pub fn summary(&self, total_timesteps: u64) -> TrainingSummary {
        TrainingSummary::build(
            &self.episodes,
            self.updates.last(),
            total_timesteps,
            self.start.elapsed().as_secs_f64(),
        )
    }

    /// Rewrite `training_summary.json` and append an `experiments.csv` row.
    pub fn write_summary(&mut self, total_timesteps: u64) -> Result<TrainingSummary, MetricsError> {
        let summary = self.summary(total_timesteps);
        fs::write(&self.summary_path, serde_json::to_string_pretty(&summary)?)?;
        self.append_experiment(&summary)?;
        Ok(summary)
    }

    fn append_experiment(&self, summary: &TrainingSummary) -> Result<(), MetricsError> {
        let exists = self.experiments_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.experiments_path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if !exists {
            writer.write_record(EXPERIMENT_COLUMNS)?;
        }
        writer.serialize(ExperimentRecord {
            run_id: self.run_id.clone(),
            timestamp: summary.timestamp.clone(),
            total_timesteps: summary.total_timesteps,
            success_rate: summary.success_metrics.success_rate,
            mean_reward: summary.performance.mean_reward_last_100,
            best_reward: summary.performance.best_reward,
            notes: self.notes.clone(),
        })?;
        writer.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), MetricsError> {
        self.episode_writer.flush()?;
        self.update_writer.flush()?;
        Ok(())
    }

    /// Flush the CSVs and write the final summary.
    pub fn finalize(&mut self, total_timesteps: u64) -> Result<TrainingSummary, MetricsError> {
        self.flush()?;
        let summary = self.write_summary(total_timesteps)?;
        log::info!(
            "metrics finalized: {} episodes, success rate {:.1}%, best reward {:.2}",
            summary.total_episodes,
            summary.success_metrics.success_rate * 100.0,
            summary.performance.best_reward
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::EpisodeStats;
    use crate::termination::CrashKind;
    use tempfile::tempdir;

    fn finished(length: u64, crash: Option<CrashKind>, success: bool) -> StepInfo {
        StepInfo {
            distance: 2.0,
            speed: 0.0,
            mean_speed: 0.5,
            max_tilt_deg: 3.0,
            time_to_first_wp: success.then_some(40),
            current_waypoint_idx: if success { 10 } else { 0 },
            max_waypoints: 10,
            waypoint_reached: success,
            episode_step: length,
            waypoint_yaw: 0.0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            orientation: [1.0, 0.0, 0.0, 0.0],
            waypoints: Vec::new(),
            success,
            completion_steps: success.then_some(length),
            crash,
            time_limit_reached: false,
            terminal_observation: None,
            episode: Some(EpisodeStats {
                reward: if success { 600.0 } else { -5.0 },
                length,
            }),
        }
    }

    #[test]
    fn test_headers_written_on_create() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run_a");
        let sink = MetricsSink::create(&run).unwrap();
        drop(sink);
        let episodes = fs::read_to_string(run.join("episodes.csv")).unwrap();
        assert_eq!(episodes.lines().next().unwrap(), EPISODE_COLUMNS.join(","));
        let updates = fs::read_to_string(run.join("updates.csv")).unwrap();
        assert_eq!(updates.lines().count(), 1);
    }

    #[test]
    fn test_episode_rows_are_numbered_and_flushed() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run_b");
        let mut sink = MetricsSink::create(&run).unwrap();
        sink.log_episode(100, &finished(44, Some(CrashKind::OutOfBounds), false))
            .unwrap();
        sink.log_episode(200, &finished(900, None, true)).unwrap();

        let mut rdr = csv::Reader::from_path(run.join("episodes.csv")).unwrap();
        let rows: Vec<EpisodeRecord> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].episode, 1);
        assert_eq!(rows[1].episode, 2);
        assert_eq!(rows[1].crash_type, None);
        assert_eq!(rows[1].time_to_first_wp, Some(40));
    }

    #[test]
    fn test_summary_and_experiments_row() {
        let dir = tempdir().unwrap();
        let run = dir.path().join("run_c");
        let mut sink = MetricsSink::create(&run).unwrap();
        sink.set_notes("default");
        sink.log_episode(10, &finished(10, Some(CrashKind::Collision), false))
            .unwrap();
        sink.write_summary(10).unwrap();
        sink.finalize(20).unwrap();

        let text = fs::read_to_string(run.join("training_summary.json")).unwrap();
        let summary: TrainingSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(summary.total_timesteps, 20);
        assert_eq!(summary.failure_analysis.crash_rate, 1.0);

        let mut rdr = csv::Reader::from_path(dir.path().join("experiments.csv")).unwrap();
        let rows: Vec<ExperimentRecord> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].run_id, "run_c");
        assert_eq!(rows[1].notes, "default");
    }

    #[test]
    fn test_update_rows_carry_rolling_reward() {
        let dir = tempdir().unwrap();
        let mut sink = MetricsSink::create(&dir.path().join("run_d")).unwrap();
        sink.log_episode(5, &finished(5, Some(CrashKind::OutOfBounds), false))
            .unwrap();
        let stats = UpdateStats {
            update: 1,
            timestep: 64,
            ..UpdateStats::default()
        };
        let rec = sink.log_update(&stats).unwrap();
        assert_eq!(rec.update, 1);
        assert_eq!(rec.mean_episode_reward, -5.0);
    }
}
