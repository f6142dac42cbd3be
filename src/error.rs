//! Error types for the forecaster

use std::path::PathBuf;
use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Provider returned nothing usable (empty page set, failed fetch)
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Not enough rows left after NaN-elimination (or too few for the folds)
    #[error("Insufficient history: {rows} usable rows, {required} required")]
    InsufficientHistory { rows: usize, required: usize },

    #[error("No trained ensemble at {0}")]
    ArtifactMissing(PathBuf),

    #[error("Artifact {path} is corrupt: {reason}")]
    ArtifactCorrupt { path: PathBuf, reason: String },

    /// A persisted feature column is not available at inference time
    #[error("Feature mismatch: {0}")]
    FeatureMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// A blocking worker panicked or was cancelled
    #[error("Worker error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ForecastError {
    /// Whether the inference/accuracy paths may answer with a neutral default
    /// instead of surfacing this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::DataUnavailable(_)
                | ForecastError::InsufficientHistory { .. }
                | ForecastError::ArtifactMissing(_)
                | ForecastError::ArtifactCorrupt { .. }
                | ForecastError::Api(_)
                | ForecastError::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
