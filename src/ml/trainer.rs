//! Ensemble trainer
//!
//! `Idle -> fold fit -> fold evaluate (x k) -> aggregate -> persist`
//!
//! Every fold model is kept: the deployable ensemble is the full list. Folds
//! are data-disjoint in their outputs, so they may be fitted on the rayon
//! pool; results are collected in fold order either way.

use super::artifact::{ArtifactMeta, EnsembleArtifact};
use super::calibration::CalibratedClassifier;
use super::cv::{Fold, TimeSeriesSplit};
use super::dataset::Dataset;
use super::gbm::{GradientBoostedClassifier, GradientBoostedRegressor};
use super::metrics::TrainingMetrics;
use super::model::{FoldModel, Task};
use crate::config::TrainingConfig;
use crate::error::{ForecastError, Result};
use chrono::Utc;
use rayon::prelude::*;
use std::fmt;
use std::path::Path;

/// Phases a training run passes through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Idle,
    FitFold(usize),
    EvaluateFold(usize),
    Aggregate,
    Persist,
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingPhase::Idle => write!(f, "idle"),
            TrainingPhase::FitFold(i) => write!(f, "fit fold {}", i + 1),
            TrainingPhase::EvaluateFold(i) => write!(f, "evaluate fold {}", i + 1),
            TrainingPhase::Aggregate => write!(f, "aggregate"),
            TrainingPhase::Persist => write!(f, "persist"),
        }
    }
}

/// Concatenated out-of-fold predictions, in row order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutOfFold {
    /// Dataset row of each prediction
    pub rows: Vec<usize>,
    pub predictions: Vec<f64>,
    pub targets: Vec<f64>,
}

/// Result of a training run, not yet written to disk
#[derive(Debug, Clone)]
pub struct TrainedEnsemble {
    pub artifact: EnsembleArtifact,
    pub meta: ArtifactMeta,
    pub out_of_fold: OutOfFold,
}

impl TrainedEnsemble {
    pub fn metrics(&self) -> TrainingMetrics {
        self.meta.metrics
    }

    /// Write artifact then metadata, each atomically
    pub fn persist(&self, model_path: &Path, meta_path: &Path) -> Result<()> {
        log_phase(self.artifact.task, TrainingPhase::Persist);
        self.artifact.save(model_path)?;
        self.meta.save(meta_path)?;
        Ok(())
    }
}

struct FoldOutput {
    model: FoldModel,
    predictions: Vec<f64>,
}

#[derive(Clone)]
pub struct EnsembleTrainer {
    config: TrainingConfig,
}

impl EnsembleTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train_regression(&self, dataset: &Dataset) -> Result<TrainedEnsemble> {
        self.train(dataset, Task::Regression)
    }

    pub fn train_classification(&self, dataset: &Dataset) -> Result<TrainedEnsemble> {
        self.train(dataset, Task::Classification)
    }

    pub fn train(&self, dataset: &Dataset, task: Task) -> Result<TrainedEnsemble> {
        log_phase(task, TrainingPhase::Idle);
        if dataset.is_empty() {
            return Err(ForecastError::InsufficientHistory {
                rows: 0,
                required: self.config.n_splits + 1,
            });
        }

        let folds = TimeSeriesSplit::new(self.config.n_splits).split(dataset.len())?;
        tracing::info!(
            "Training {} ensemble: {} rows, {} features, {} folds",
            task,
            dataset.len(),
            dataset.n_features(),
            folds.len()
        );

        let outputs: Vec<FoldOutput> = if self.config.parallel_folds {
            folds
                .par_iter()
                .map(|fold| self.run_fold(dataset, fold, task))
                .collect::<Result<Vec<_>>>()?
        } else {
            folds
                .iter()
                .map(|fold| self.run_fold(dataset, fold, task))
                .collect::<Result<Vec<_>>>()?
        };

        log_phase(task, TrainingPhase::Aggregate);
        let mut out_of_fold = OutOfFold::default();
        let mut models = Vec::with_capacity(outputs.len());
        for (fold, output) in folds.iter().zip(outputs) {
            for (row, prediction) in fold.validation.clone().zip(output.predictions) {
                out_of_fold.rows.push(row);
                out_of_fold.predictions.push(prediction);
                out_of_fold.targets.push(dataset.targets[row]);
            }
            models.push(output.model);
        }

        let metrics = match task {
            Task::Regression => {
                TrainingMetrics::regression(&out_of_fold.targets, &out_of_fold.predictions)
            }
            Task::Classification => {
                TrainingMetrics::classification(&out_of_fold.targets, &out_of_fold.predictions)
            }
        };
        tracing::info!("{} out-of-fold metrics: {:?}", task, metrics);

        Ok(TrainedEnsemble {
            artifact: EnsembleArtifact {
                task,
                models,
                feature_cols: dataset.feature_cols.clone(),
            },
            meta: ArtifactMeta {
                task,
                metrics,
                num_rows: dataset.len(),
                trained_at: Utc::now(),
            },
            out_of_fold,
        })
    }

    fn run_fold(&self, dataset: &Dataset, fold: &Fold, task: Task) -> Result<FoldOutput> {
        log_phase(task, TrainingPhase::FitFold(fold.index));
        let (x_train, y_train) = dataset.subset(&fold.train_indices());
        let (x_val, y_val) = dataset.subset(&fold.validation_indices());

        let model = match task {
            Task::Regression => FoldModel::Regressor(GradientBoostedRegressor::fit(
                &self.config.regressor,
                &x_train,
                &y_train,
            )?),
            Task::Classification => {
                let weights = balanced_weights(&y_train);
                let base = GradientBoostedClassifier::fit(
                    &self.config.classifier,
                    &x_train,
                    &y_train,
                    Some(&weights),
                )?;
                // Calibrated on the same rows it is evaluated on below; the
                // resulting out-of-fold metrics are optimistic.
                FoldModel::Classifier(CalibratedClassifier::fit(base, &x_val, &y_val)?)
            }
        };

        log_phase(task, TrainingPhase::EvaluateFold(fold.index));
        let predictions = match &model {
            FoldModel::Regressor(m) => x_val.iter().map(|row| m.predict(row)).collect(),
            FoldModel::Classifier(m) => x_val.iter().map(|row| m.predict_proba(row)).collect(),
        };

        tracing::debug!(
            "{} fold {}: train {:?}, validation {:?}",
            task,
            fold.index + 1,
            fold.train,
            fold.validation
        );
        Ok(FoldOutput { model, predictions })
    }
}

/// Inverse class frequency: `total / (2 * count(class))`
pub fn balanced_weights(labels: &[f64]) -> Vec<f64> {
    let total = labels.len() as f64;
    let positives = labels.iter().filter(|y| **y >= 0.5).count() as f64;
    let negatives = total - positives;
    labels
        .iter()
        .map(|y| {
            let count = if *y >= 0.5 { positives } else { negatives };
            total / (2.0 * count)
        })
        .collect()
}

fn log_phase(task: Task, phase: TrainingPhase) {
    tracing::debug!("{} trainer: {}", task, phase);
}
