//! Prediction service
//!
//! Rebuilds the freshest feature row from a short trailing window of raw data
//! and evaluates every fold model of a persisted ensemble on it:
//! - regression: mean prediction and its spread across folds
//! - classification: mean calibrated probability, direction and confidence
//!
//! Expected cold-start conditions (no artifact, no data, too little history)
//! produce [`Forecast::Neutral`] instead of an error, so callers can tell a
//! real forecast from a fallback without checking for magic values.

use super::artifact::EnsembleArtifact;
use super::dataset::latest_feature_row;
use super::features::FeatureBuilder;
use super::model::{Task, TrainedModel};
use super::series::{mean, population_std};
use crate::config::InferenceConfig;
use crate::data::{fetch_merged, MarketDataSource};
use crate::error::{ForecastError, Result};
use crate::types::{days_ago_ms, AlignedRecord, Direction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A real forecast, or a neutral default with the reason it was used
#[derive(Debug, Clone, PartialEq)]
pub enum Forecast<T> {
    Ready(T),
    Neutral(String),
}

impl<T> Forecast<T> {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Forecast::Neutral(reason.into())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Forecast::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Forecast::Ready(value) => Some(value),
            Forecast::Neutral(_) => None,
        }
    }

    pub fn neutral_reason(&self) -> Option<&str> {
        match self {
            Forecast::Ready(_) => None,
            Forecast::Neutral(reason) => Some(reason),
        }
    }
}

impl<T: NeutralDefault> Forecast<T> {
    /// Flatten into the wire shape: the value (or its neutral default) plus
    /// `neutral_reason` when it is a fallback.
    pub fn into_response(self) -> ForecastResponse<T> {
        match self {
            Forecast::Ready(forecast) => ForecastResponse {
                forecast,
                neutral_reason: None,
            },
            Forecast::Neutral(reason) => ForecastResponse {
                forecast: T::neutral(),
                neutral_reason: Some(reason),
            },
        }
    }
}

/// Value used when no forecast can be produced
pub trait NeutralDefault {
    fn neutral() -> Self;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse<T> {
    #[serde(flatten)]
    pub forecast: T,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub neutral_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionForecast {
    pub pred_next_funding: f64,
    /// Spread of fold predictions, not a confidence interval
    pub pred_std: f64,
    pub n_models: usize,
}

impl NeutralDefault for RegressionForecast {
    fn neutral() -> Self {
        Self {
            pred_next_funding: 0.0,
            pred_std: 0.0,
            n_models: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationForecast {
    pub direction: Direction,
    pub prob_positive: f64,
    pub prob_std: f64,
    pub confidence: f64,
    pub n_models: usize,
}

impl NeutralDefault for ClassificationForecast {
    fn neutral() -> Self {
        Self {
            direction: Direction::Positive,
            prob_positive: 0.5,
            prob_std: 0.0,
            confidence: 0.5,
            n_models: 0,
        }
    }
}

/// Mean and population spread of every model's prediction on `row`
pub fn aggregate_regression<M: TrainedModel>(models: &[M], row: &[f64]) -> Option<RegressionForecast> {
    if models.is_empty() {
        return None;
    }
    let predictions: Vec<f64> = models.iter().map(|m| m.predict(row)).collect();
    Some(RegressionForecast {
        pred_next_funding: mean(&predictions),
        pred_std: population_std(&predictions),
        n_models: predictions.len(),
    })
}

/// Mean calibrated probability, thresholded at 0.5 for the direction
pub fn aggregate_classification<M: TrainedModel>(
    models: &[M],
    row: &[f64],
) -> Option<ClassificationForecast> {
    let probabilities: Vec<f64> = models
        .iter()
        .filter_map(|m| m.predict_probability(row))
        .collect();
    if probabilities.is_empty() {
        return None;
    }
    let prob_positive = mean(&probabilities);
    let direction = Direction::from_probability(prob_positive);
    let confidence = match direction {
        Direction::Positive => prob_positive,
        Direction::Negative => 1.0 - prob_positive,
    };
    Some(ClassificationForecast {
        direction,
        prob_positive,
        prob_std: population_std(&probabilities),
        confidence,
        n_models: probabilities.len(),
    })
}

/// Recoverable errors become `Neutral`; anything else is returned
fn recover<T>(result: Result<T>, context: &str) -> Result<Forecast<T>> {
    match result {
        Ok(value) => Ok(Forecast::Ready(value)),
        Err(e) if e.is_recoverable() => {
            tracing::warn!("{} falling back to neutral: {}", context, e);
            Ok(Forecast::neutral(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone)]
pub struct PredictionService {
    builder: FeatureBuilder,
    lookback_days: i64,
}

impl PredictionService {
    pub fn new(builder: FeatureBuilder, config: &InferenceConfig) -> Self {
        Self {
            builder,
            lookback_days: config.lookback_days,
        }
    }

    pub fn lookback_days(&self) -> i64 {
        self.lookback_days
    }

    /// Evaluate the regression ensemble on the latest row derivable from
    /// `records`. A persisted column missing from the rebuilt frame is an
    /// error, never a neutral value.
    pub fn regression_from_records(
        &self,
        artifact: &EnsembleArtifact,
        records: &[AlignedRecord],
    ) -> Result<Forecast<RegressionForecast>> {
        let row = match self.latest_row(artifact, Task::Regression, records)? {
            Forecast::Ready(row) => row,
            Forecast::Neutral(reason) => return Ok(Forecast::Neutral(reason)),
        };
        Ok(aggregate_regression(&artifact.models, &row)
            .map(Forecast::Ready)
            .unwrap_or_else(|| Forecast::neutral("ensemble has no models")))
    }

    pub fn classification_from_records(
        &self,
        artifact: &EnsembleArtifact,
        records: &[AlignedRecord],
    ) -> Result<Forecast<ClassificationForecast>> {
        let row = match self.latest_row(artifact, Task::Classification, records)? {
            Forecast::Ready(row) => row,
            Forecast::Neutral(reason) => return Ok(Forecast::Neutral(reason)),
        };
        Ok(aggregate_classification(&artifact.models, &row)
            .map(Forecast::Ready)
            .unwrap_or_else(|| Forecast::neutral("ensemble has no classifier models")))
    }

    /// Feature row reindexed to the artifact's columns, or the reason none
    /// can be evaluated
    fn latest_row(
        &self,
        artifact: &EnsembleArtifact,
        task: Task,
        records: &[AlignedRecord],
    ) -> Result<Forecast<Vec<f64>>> {
        if artifact.task != task {
            return Err(ForecastError::InvalidInput(format!(
                "expected a {} ensemble, got {}",
                task, artifact.task
            )));
        }
        if artifact.is_empty() {
            tracing::warn!("{} ensemble has no models", task);
            return Ok(Forecast::neutral("ensemble has no models"));
        }
        if records.is_empty() {
            return Ok(Forecast::neutral("no aligned rows to build features from"));
        }

        let frame = self.builder.build(records);
        let row = recover(
            latest_feature_row(&frame, &artifact.feature_cols),
            "feature row",
        )?;
        Ok(match row {
            Forecast::Ready(latest) => {
                tracing::debug!("Evaluating {} ensemble on hour {}", task, latest.hour);
                Forecast::Ready(latest.values)
            }
            Forecast::Neutral(reason) => Forecast::Neutral(reason),
        })
    }

    /// Trailing window of aligned rows ending at `now`
    pub async fn fetch_recent(
        &self,
        source: &dyn MarketDataSource,
        coin: &str,
        interval: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlignedRecord>> {
        let start = days_ago_ms(now, self.lookback_days);
        fetch_merged(source, coin, interval, start, now.timestamp_millis()).await
    }

    /// Regression forecast for the next funding payment from fresh data
    pub async fn predict_next_regression(
        &self,
        source: &dyn MarketDataSource,
        model_path: &Path,
        coin: &str,
        interval: &str,
        now: DateTime<Utc>,
    ) -> Result<Forecast<RegressionForecast>> {
        let prepared = self
            .prepare(source, model_path, Task::Regression, coin, interval, now)
            .await?;
        let (artifact, records) = match prepared {
            Forecast::Ready(inputs) => inputs,
            Forecast::Neutral(reason) => return Ok(Forecast::Neutral(reason)),
        };
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.regression_from_records(&artifact, &records))
            .await?
    }

    /// Direction forecast for the next funding payment from fresh data
    pub async fn predict_next_classification(
        &self,
        source: &dyn MarketDataSource,
        model_path: &Path,
        coin: &str,
        interval: &str,
        now: DateTime<Utc>,
    ) -> Result<Forecast<ClassificationForecast>> {
        let prepared = self
            .prepare(source, model_path, Task::Classification, coin, interval, now)
            .await?;
        let (artifact, records) = match prepared {
            Forecast::Ready(inputs) => inputs,
            Forecast::Neutral(reason) => return Ok(Forecast::Neutral(reason)),
        };
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.classification_from_records(&artifact, &records))
            .await?
    }

    async fn prepare(
        &self,
        source: &dyn MarketDataSource,
        model_path: &Path,
        task: Task,
        coin: &str,
        interval: &str,
        now: DateTime<Utc>,
    ) -> Result<Forecast<(EnsembleArtifact, Vec<AlignedRecord>)>> {
        let artifact = match recover(EnsembleArtifact::load(model_path, task), "artifact")? {
            Forecast::Ready(artifact) => artifact,
            Forecast::Neutral(reason) => return Ok(Forecast::Neutral(reason)),
        };
        let records = match recover(self.fetch_recent(source, coin, interval, now).await, "fetch")? {
            Forecast::Ready(records) => records,
            Forecast::Neutral(reason) => return Ok(Forecast::Neutral(reason)),
        };
        Ok(Forecast::Ready((artifact, records)))
    }
}
