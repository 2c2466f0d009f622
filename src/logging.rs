//! Process-wide logger.
//!
//! [`RunLogger`] backs the `log` facade. Records go to stderr and, once
//! [`start_run`] has pointed it at a run directory, are appended to
//! `<run>/run.log` as well.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

pub const RUN_LOG_FILE: &str = "run.log";

pub struct RunLogger {
    level: LevelFilter,
    file: Mutex<Option<(PathBuf, File)>>,
}

static LOGGER: OnceLock<RunLogger> = OnceLock::new();

impl RunLogger {
    fn new(level: LevelFilter) -> Self {
        Self {
            level,
            file: Mutex::new(None),
        }
    }

    fn format(record: &Record) -> String {
        format!(
            "{} {} {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    }

    /// Current `run.log`, if any.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.file.lock().as_ref().map(|(p, _)| p.clone())
    }

    /// Switch to `path`, writing `header` as its first record.
    fn retarget(&self, path: &Path, header: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = format!(
            "{} {} {header}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            Level::Info
        );
        writeln!(file, "{line}")?;
        eprintln!("{line}");
        *self.file.lock() = Some((path.to_path_buf(), file));
        Ok(())
    }
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        if record.level() <= Level::Warn || record.target().starts_with("simhops") {
            eprintln!("{line}");
        }
        if let Some((_, file)) = self.file.lock().as_mut() {
            let _ = writeln!(file, "{line}");
        }
    }

    fn flush(&self) {
        if let Some((_, file)) = self.file.lock().as_mut() {
            let _ = file.flush();
        }
    }
}

/// Install the logger. Later calls return the installed instance.
pub fn init(level: LevelFilter) -> &'static RunLogger {
    let mut installed_now = false;
    let logger = LOGGER.get_or_init(|| {
        installed_now = true;
        RunLogger::new(level)
    });
    if installed_now && log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
    logger
}

/// Point the logger at `<run_dir>/run.log` and write the run header.
pub fn start_run(run_dir: &Path, run_id: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(run_dir)?;
    let path = run_dir.join(RUN_LOG_FILE);
    let logger = init(LevelFilter::Info);
    let header = format!(
        "Run {run_id} started at {}",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S")
    );
    logger.retarget(&path, &header)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_start_run_writes_header_and_retargets() {
        let dir = tempdir().unwrap();
        let first = start_run(&dir.path().join("run_a"), "run_a").unwrap();
        let second = start_run(&dir.path().join("run_b"), "run_b").unwrap();
        assert!(init(LevelFilter::Info).log_path().is_some());
        let text = std::fs::read_to_string(&first).unwrap();
        assert!(text.contains("Run run_a started at"));
        let text = std::fs::read_to_string(&second).unwrap();
        assert!(text.contains("Run run_b started at"));
    }

    #[test]
    fn test_run_header_is_stamped_in_utc() {
        let dir = tempdir().unwrap();
        let path = start_run(&dir.path().join("run_utc"), "run_utc").unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let stamp = text
            .lines()
            .find_map(|l| l.split("Run run_utc started at ").nth(1))
            .unwrap();
        let stamped = chrono::NaiveDateTime::parse_from_str(stamp.trim(), "%Y-%m-%dT%H:%M:%S")
            .unwrap()
            .and_utc();
        assert!((chrono::Utc::now() - stamped).num_seconds().abs() < 60);
    }
}
