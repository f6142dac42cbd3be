//! Ensemble artifact and metadata persistence
//!
//! One artifact per task: `{task, models, feature_cols}` plus a separate
//! metadata record `{task, metrics, num_rows, trained_at}`. Both are JSON and
//! are replaced atomically, so a reader sees either the old file or the new
//! one, never a partial write.

use super::metrics::TrainingMetrics;
use super::model::{FoldModel, Task, TrainedModel};
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Fold models plus the ordered feature columns they were fitted on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleArtifact {
    pub task: Task,
    pub models: Vec<FoldModel>,
    pub feature_cols: Vec<String>,
}

impl EnsembleArtifact {
    pub fn n_models(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        tracing::info!(
            "Saved {} ensemble ({} models, {} features) to {}",
            self.task,
            self.models.len(),
            self.feature_cols.len(),
            path.display()
        );
        Ok(())
    }

    /// Load and check that every model matches `task` and the column count
    pub fn load(path: &Path, task: Task) -> Result<Self> {
        let artifact: EnsembleArtifact = read_json(path)?;
        let corrupt = |reason: String| ForecastError::ArtifactCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        if artifact.task != task {
            return Err(corrupt(format!(
                "expected a {} ensemble, found {}",
                task, artifact.task
            )));
        }
        for (i, model) in artifact.models.iter().enumerate() {
            if model.task() != task {
                return Err(corrupt(format!("model {} is a {} model", i, model.task())));
            }
            if model.n_features() != artifact.feature_cols.len() {
                return Err(corrupt(format!(
                    "model {} expects {} features, artifact lists {}",
                    i,
                    model.n_features(),
                    artifact.feature_cols.len()
                )));
            }
        }
        Ok(artifact)
    }
}

/// Training summary stored next to the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub task: Task,
    pub metrics: TrainingMetrics,
    pub num_rows: usize,
    pub trained_at: DateTime<Utc>,
}

impl ArtifactMeta {
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(tmp.as_file_mut(), value)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ForecastError::ArtifactMissing(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ForecastError::ArtifactCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };
    serde_json::from_str(&text).map_err(|e| ForecastError::ArtifactCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
