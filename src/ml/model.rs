//! Trained-model capability
//!
//! The trainer and the prediction service only see [`TrainedModel`]. The
//! persisted ensemble stores [`FoldModel`], one per cross-validation fold.

use super::calibration::CalibratedClassifier;
use super::gbm::GradientBoostedRegressor;
use crate::error::ForecastError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which target an ensemble was trained for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Regression,
    Classification,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Regression => "regression",
            Task::Classification => "classification",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regression" | "reg" => Ok(Task::Regression),
            "classification" | "cls" => Ok(Task::Classification),
            other => Err(ForecastError::InvalidInput(format!("unknown task: {}", other))),
        }
    }
}

/// A fitted model evaluated on one feature row
pub trait TrainedModel: Send + Sync {
    /// Point prediction: the target value for regressors, the 0/1 class for
    /// classifiers.
    fn predict(&self, row: &[f64]) -> f64;

    /// Probability of the positive class, `None` for regressors
    fn predict_probability(&self, row: &[f64]) -> Option<f64>;

    /// Width of the rows the model was fitted on
    fn n_features(&self) -> usize;
}

/// One fold's fitted model as persisted in the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum FoldModel {
    Regressor(GradientBoostedRegressor),
    Classifier(CalibratedClassifier),
}

impl FoldModel {
    pub fn task(&self) -> Task {
        match self {
            FoldModel::Regressor(_) => Task::Regression,
            FoldModel::Classifier(_) => Task::Classification,
        }
    }
}

impl TrainedModel for FoldModel {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            FoldModel::Regressor(m) => m.predict(row),
            FoldModel::Classifier(m) => {
                if m.predict_proba(row) >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn predict_probability(&self, row: &[f64]) -> Option<f64> {
        match self {
            FoldModel::Regressor(_) => None,
            FoldModel::Classifier(m) => Some(m.predict_proba(row)),
        }
    }

    fn n_features(&self) -> usize {
        match self {
            FoldModel::Regressor(m) => m.n_features(),
            FoldModel::Classifier(m) => m.n_features(),
        }
    }
}
