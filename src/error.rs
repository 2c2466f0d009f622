//! Error types for every layer of the harness.
//!
//! Lower layers own narrow enums; [`TrainError`] and [`EvalError`] collect
//! them for the two entry points.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration could not be read, parsed, or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The rigid-body integrator reached a state it cannot continue from.
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("non-finite {field} after physics step")]
    NonFinite { field: &'static str },

    #[error("invalid physical parameter: {0}")]
    InvalidParameter(String),
}

/// Episode-level failures.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("physics failure: {0}")]
    Physics(#[from] PhysicsError),

    #[error("invalid environment settings: {0}")]
    InvalidSettings(String),

    #[error("episode has ended; call reset() before step()")]
    NeedsReset,

    #[error("expected {expected} actions, got {got}")]
    BatchSize { expected: usize, got: usize },

    #[error("environment worker {index} failed: {message}")]
    Worker { index: usize, message: String },

    #[error("vector environment is closed")]
    Closed,
}

/// Model and normalizer persistence failures.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no checkpoints found in {0}")]
    NoCheckpoints(PathBuf),

    #[error("incompatible checkpoint: {0}")]
    Incompatible(String),

    #[error("tensor record error: {0}")]
    Record(String),
}

/// Metric file failures.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Anything that can stop a training run.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("learner error: {0}")]
    Learner(String),
}

/// Evaluation and demo failures.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("no policy found under {0}")]
    ModelNotFound(PathBuf),

    #[error("model expects {expected} observations, environment produces {got}")]
    ObservationMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TrainError {
    /// True for errors the binary reports with the configuration exit code.
    pub fn is_config(&self) -> bool {
        matches!(self, TrainError::Config(_))
    }
}

impl EvalError {
    pub fn is_config(&self) -> bool {
        matches!(self, EvalError::Config(_))
    }
}
