//! Funding-rate forecasting pipeline
//!
//! - Feature engineering over aligned funding/candle rows
//! - Supervised dataset preparation with a fixed feature exclusion set
//! - Histogram gradient boosting with isotonic calibration
//! - Time-series k-fold ensemble training and persisted artifacts
//! - Ensemble inference with explicit neutral fallbacks

pub mod artifact;
pub mod calibration;
pub mod cv;
pub mod dataset;
pub mod features;
pub mod gbm;
pub mod metrics;
pub mod model;
pub mod predictor;
pub mod series;
pub mod trainer;


pub use artifact::{ArtifactMeta, EnsembleArtifact};
pub use calibration::{CalibratedClassifier, IsotonicCalibrator};
pub use cv::{Fold, TimeSeriesSplit};
pub use dataset::{
    latest_feature_row, prepare_classification, prepare_dataset, prepare_regression, Dataset,
    LatestRow, EXCLUDED_COLUMNS,
};
pub use features::{FeatureBuilder, FeatureConfig, FeatureFrame};
pub use gbm::{GbmParams, GradientBoostedClassifier, GradientBoostedRegressor};
pub use metrics::{ClassificationMetrics, RegressionMetrics, TrainingMetrics};
pub use model::{FoldModel, Task, TrainedModel};
pub use predictor::{
    aggregate_classification, aggregate_regression, ClassificationForecast, Forecast,
    ForecastResponse, NeutralDefault, PredictionService, RegressionForecast,
};
pub use trainer::{EnsembleTrainer, OutOfFold, TrainedEnsemble, TrainingPhase};
