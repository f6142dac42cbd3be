//! Invocation surface shared by the CLI and the dashboard
//!
//! Wires configuration, the market data provider, the trainer, the
//! prediction service and the accuracy tracker together. Prediction,
//! logging and accuracy calls are total: upstream failures are logged and
//! answered with a well-formed default. Training and fetching surface their
//! errors, since nothing sensible can stand in for a failed training run.

pub mod schedule;

pub use schedule::effective_next_funding;

use crate::config::Config;
use crate::data::{
    collect_dataset, read_merged, write_candles, write_funding, write_merged, AssetContext,
    FundingContextSource, MarketDataSource, PredictedFunding,
};
use crate::error::{ForecastError, Result};
use crate::ml::{
    prepare_dataset, ClassificationForecast, EnsembleArtifact, EnsembleTrainer, FeatureBuilder,
    Forecast, ForecastResponse, NeutralDefault, PredictionService, RegressionForecast, Task,
    TrainingMetrics,
};
use crate::tracker::{
    AccuracySummary, AccuracyTracker, HistoryView, LastComparison, PredictionLog,
};
use crate::types::{days_ago_ms, AlignedRecord, Direction, PredictionLogEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Row counts and files written by a fetch
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub funding_rows: usize,
    pub candles_rows: usize,
    pub merged_rows: usize,
    pub funding_csv: PathBuf,
    pub candles_csv: PathBuf,
    /// `None` when the merge was empty and nothing was written
    pub merged_csv: Option<PathBuf>,
    #[serde(skip)]
    pub merged: Vec<AlignedRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub task: Task,
    pub metrics: TrainingMetrics,
    pub num_rows: usize,
    pub model: PathBuf,
    pub meta: PathBuf,
}

/// Output of one live cycle
#[derive(Debug, Clone, Serialize)]
pub struct LiveReport {
    pub time: DateTime<Utc>,
    pub coin: String,
    pub direction: Direction,
    pub prob_positive: f64,
    pub confidence: f64,
    pub n_models: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neutral_reason: Option<String>,
    pub hl_predicted_funding: Option<PredictedFunding>,
    pub hl_current_ctx: Option<AssetContext>,
}

pub struct ForecastService {
    config: Config,
    source: Arc<dyn MarketDataSource>,
    context: Arc<dyn FundingContextSource>,
    builder: FeatureBuilder,
    predictor: PredictionService,
    trainer: EnsembleTrainer,
    tracker: AccuracyTracker,
}

impl ForecastService {
    pub fn new(
        config: Config,
        source: Arc<dyn MarketDataSource>,
        context: Arc<dyn FundingContextSource>,
    ) -> Self {
        let builder = FeatureBuilder::with_defaults();
        let predictor = PredictionService::new(builder.clone(), &config.inference);
        let trainer = EnsembleTrainer::new(config.training.clone());
        let tracker = AccuracyTracker::new(
            PredictionLog::new(config.paths.predictions_log()),
            &config.accuracy,
        );
        Self {
            config,
            source,
            context,
            builder,
            predictor,
            trainer,
            tracker,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coin(&self) -> &str {
        &self.config.api.coin
    }

    fn interval(&self) -> &str {
        &self.config.api.interval
    }

    /// Artifact and metadata paths for a task
    pub fn model_paths(&self, task: Task) -> (PathBuf, PathBuf) {
        let paths = &self.config.paths;
        match task {
            Task::Regression => (paths.model_file(self.coin()), paths.model_meta(self.coin())),
            Task::Classification => (
                paths.cls_model_file(self.coin()),
                paths.cls_model_meta(self.coin()),
            ),
        }
    }

    /// Fetch `history_days` of raw series, align them and write the CSVs
    pub async fn fetch(&self, now: DateTime<Utc>) -> Result<FetchReport> {
        let coin = self.coin();
        let start = days_ago_ms(now, self.config.api.history_days);
        let data = collect_dataset(
            self.source.as_ref(),
            coin,
            self.interval(),
            start,
            now.timestamp_millis(),
        )
        .await?;

        let paths = &self.config.paths;
        let funding_csv = paths.funding_csv(coin);
        let candles_csv = paths.candles_csv(coin, self.interval());
        write_funding(&funding_csv, &data.funding)?;
        write_candles(&candles_csv, &data.candles)?;

        let merged_csv = if data.merged.is_empty() {
            tracing::warn!("Merge for {} is empty, merged CSV not written", coin);
            None
        } else {
            let path = paths.merged_csv(coin);
            write_merged(&path, &data.merged)?;
            Some(path)
        };

        Ok(FetchReport {
            funding_rows: data.funding.len(),
            candles_rows: data.candles.len(),
            merged_rows: data.merged.len(),
            funding_csv,
            candles_csv,
            merged_csv,
            merged: data.merged,
        })
    }

    /// Build features, train the fold ensemble and persist it
    pub fn train(&self, task: Task, records: &[AlignedRecord]) -> Result<TrainingReport> {
        let (model, meta) = self.model_paths(task);
        fit_and_persist(&self.builder, &self.trainer, task, records, model, meta, self.coin())
    }

    /// `train` on the blocking pool, keeping async workers free during the fit
    pub async fn train_blocking(&self, task: Task, records: Vec<AlignedRecord>) -> Result<TrainingReport> {
        let builder = self.builder.clone();
        let trainer = self.trainer.clone();
        let (model, meta) = self.model_paths(task);
        let coin = self.coin().to_string();
        tokio::task::spawn_blocking(move || {
            fit_and_persist(&builder, &trainer, task, &records, model, meta, &coin)
        })
        .await?
    }

    pub fn train_regression(&self, records: &[AlignedRecord]) -> Result<TrainingReport> {
        self.train(Task::Regression, records)
    }

    pub fn train_classification(&self, records: &[AlignedRecord]) -> Result<TrainingReport> {
        self.train(Task::Classification, records)
    }

    /// Train from a merged CSV (the configured one when `path` is `None`)
    pub fn train_from_csv(&self, task: Task, path: Option<&Path>) -> Result<TrainingReport> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.paths.merged_csv(self.coin()));
        let records = self.load_merged(&path)?;
        self.train(task, &records)
    }

    /// Stored merged rows; a missing file is `DataUnavailable`
    pub fn load_merged(&self, path: &Path) -> Result<Vec<AlignedRecord>> {
        if !path.exists() {
            return Err(ForecastError::DataUnavailable(format!(
                "merged dataset {} not found, run fetch first",
                path.display()
            )));
        }
        read_merged(path)
    }

    pub async fn predict_regression(&self, now: DateTime<Utc>) -> ForecastResponse<RegressionForecast> {
        let (model, _) = self.model_paths(Task::Regression);
        let result = self
            .predictor
            .predict_next_regression(self.source.as_ref(), &model, self.coin(), self.interval(), now)
            .await;
        settle(result, "regression forecast")
    }

    pub async fn predict_classification(
        &self,
        now: DateTime<Utc>,
    ) -> ForecastResponse<ClassificationForecast> {
        let (model, _) = self.model_paths(Task::Classification);
        let result = self
            .predictor
            .predict_next_classification(self.source.as_ref(), &model, self.coin(), self.interval(), now)
            .await;
        settle(result, "direction forecast")
    }

    /// Regression forecast from stored rows instead of fresh provider data
    pub fn regression_from_records(&self, records: &[AlignedRecord]) -> ForecastResponse<RegressionForecast> {
        let (model, _) = self.model_paths(Task::Regression);
        let result = EnsembleArtifact::load(&model, Task::Regression)
            .and_then(|artifact| self.predictor.regression_from_records(&artifact, records));
        settle(result, "offline regression forecast")
    }

    pub fn classification_from_records(
        &self,
        records: &[AlignedRecord],
    ) -> ForecastResponse<ClassificationForecast> {
        let (model, _) = self.model_paths(Task::Classification);
        let result = EnsembleArtifact::load(&model, Task::Classification)
            .and_then(|artifact| self.predictor.classification_from_records(&artifact, records));
        settle(result, "offline direction forecast")
    }

    /// Append to the prediction log; `None` if the write failed
    pub fn log_prediction(
        &self,
        direction: Direction,
        prob_positive: f64,
        now: DateTime<Utc>,
    ) -> Option<PredictionLogEntry> {
        self.tracker
            .record(direction, prob_positive, now)
            .map_err(|e| tracing::warn!("Could not log prediction: {}", e))
            .ok()
    }

    pub async fn rolling_accuracy(&self, max_days: i64, now: DateTime<Utc>) -> AccuracySummary {
        self.tracker
            .rolling_accuracy(self.source.as_ref(), self.coin(), max_days, now)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Rolling accuracy unavailable: {}", e);
                AccuracySummary::empty()
            })
    }

    /// Rolling accuracy over the configured window
    pub async fn accuracy(&self, now: DateTime<Utc>) -> AccuracySummary {
        self.rolling_accuracy(self.tracker.window_days(), now).await
    }

    pub async fn last_comparison(&self, now: DateTime<Utc>) -> LastComparison {
        self.tracker
            .last_comparison(self.source.as_ref(), self.coin(), now)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Last comparison unavailable: {}", e);
                LastComparison::NoPredictions
            })
    }

    pub async fn history(&self, days: i64, now: DateTime<Utc>) -> HistoryView {
        self.tracker
            .history(self.source.as_ref(), self.coin(), days, now)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("History unavailable: {}", e);
                HistoryView {
                    funding_history: Vec::new(),
                    predictions_log: Vec::new(),
                }
            })
    }

    pub async fn live_context(&self) -> Option<AssetContext> {
        self.context.current_context(self.coin()).await
    }

    pub async fn venue_prediction(&self) -> Option<PredictedFunding> {
        self.context.predicted_funding(self.coin()).await
    }

    pub fn next_funding_time(&self, predicted: Option<&PredictedFunding>, now: DateTime<Utc>) -> i64 {
        effective_next_funding(
            predicted.and_then(|p| p.next_funding_time),
            now.timestamp_millis(),
            &self.config.schedule,
        )
    }

    /// Fetch, retrain the direction ensemble, predict and log the prediction
    pub async fn live_cycle(&self, now: DateTime<Utc>) -> Result<LiveReport> {
        let fetched = self.fetch(now).await?;
        self.train_blocking(Task::Classification, fetched.merged).await?;

        let response = self.predict_classification(now).await;
        let forecast = response.forecast;
        if response.neutral_reason.is_none() {
            self.log_prediction(forecast.direction, forecast.prob_positive, now);
        }

        let (hl_predicted_funding, hl_current_ctx) =
            tokio::join!(self.venue_prediction(), self.live_context());

        Ok(LiveReport {
            time: now,
            coin: self.coin().to_string(),
            direction: forecast.direction,
            prob_positive: forecast.prob_positive,
            confidence: forecast.confidence,
            n_models: forecast.n_models,
            neutral_reason: response.neutral_reason,
            hl_predicted_funding,
            hl_current_ctx,
        })
    }
}

fn fit_and_persist(
    builder: &FeatureBuilder,
    trainer: &EnsembleTrainer,
    task: Task,
    records: &[AlignedRecord],
    model: PathBuf,
    meta: PathBuf,
    coin: &str,
) -> Result<TrainingReport> {
    let frame = builder.build(records);
    let dataset = prepare_dataset(&frame, task)?;
    let trained = trainer.train(&dataset, task)?;

    trained.persist(&model, &meta)?;
    tracing::info!("Trained {} ensemble for {} on {} rows", task, coin, trained.meta.num_rows);

    Ok(TrainingReport {
        task,
        metrics: trained.metrics(),
        num_rows: trained.meta.num_rows,
        model,
        meta,
    })
}

/// Wire shape of a forecast result, neutral on any error
fn settle<T: NeutralDefault>(result: Result<Forecast<T>>, context: &str) -> ForecastResponse<T> {
    match result {
        Ok(forecast) => forecast.into_response(),
        Err(e) => {
            tracing::warn!("{} failed, answering neutral: {}", context, e);
            Forecast::<T>::neutral(e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathsConfig, TrainingConfig};
    use crate::data::{MockFundingContextSource, MockMarketDataSource};
    use crate::ml::GbmParams;
    use crate::types::{ms_to_datetime, Candle, FundingEvent, HOUR_MS};

    const START: i64 = 1_704_067_200_000;

    fn raw_series(hours: usize) -> (Vec<FundingEvent>, Vec<Candle>) {
        let mut price = 30.0;
        let mut funding = Vec::with_capacity(hours);
        let mut candles = Vec::with_capacity(hours);
        for i in 0..hours {
            let t = START + i as i64 * HOUR_MS;
            let step = (i as f64 * 0.45).sin() * 0.3 + (i as f64 * 0.07).cos() * 0.1;
            price += step;
            funding.push(FundingEvent {
                time: t + 3,
                funding_rate: 0.00002 * step.signum() + 0.00001 * (i as f64 * 0.2).sin(),
                premium: 0.0001 * step,
                coin: "HYPE".to_string(),
            });
            candles.push(Candle {
                open_time: t,
                close_time: t + HOUR_MS - 1,
                open: price - step,
                high: price + 0.2,
                low: price - 0.2,
                close: price,
                volume: 500.0 + ((i * 13) % 50) as f64,
                interval: "1h".to_string(),
            });
        }
        (funding, candles)
    }

    fn config(dir: &Path) -> Config {
        let params = GbmParams {
            max_iter: 20,
            learning_rate: 0.1,
            min_samples_leaf: 10,
            ..GbmParams::regression_defaults()
        };
        Config {
            paths: PathsConfig {
                data_dir: dir.join("data").to_string_lossy().into_owned(),
                models_dir: dir.join("models").to_string_lossy().into_owned(),
            },
            training: TrainingConfig {
                n_splits: 3,
                parallel_folds: false,
                regressor: params.clone(),
                classifier: params,
            },
            ..Config::default()
        }
    }

    fn source(hours: usize) -> MockMarketDataSource {
        let (funding, candles) = raw_series(hours);
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch_funding_history()
            .returning(move |_, _, _| Ok(funding.clone()));
        source
            .expect_fetch_candles()
            .returning(move |_, _, _, _| Ok(candles.clone()));
        source
    }

    fn failing_source() -> MockMarketDataSource {
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch_funding_history()
            .returning(|_, _, _| Err(ForecastError::Api("connection refused".to_string())));
        source
            .expect_fetch_candles()
            .returning(|_, _, _, _| Err(ForecastError::Api("connection refused".to_string())));
        source
    }

    fn venue() -> MockFundingContextSource {
        let mut context = MockFundingContextSource::new();
        context.expect_current_context().returning(|_| {
            Some(AssetContext {
                funding: Some(0.0000125),
                ..AssetContext::default()
            })
        });
        context.expect_predicted_funding().returning(|_| {
            Some(PredictedFunding {
                funding_rate: Some(0.00001),
                next_funding_time: None,
            })
        });
        context
    }

    fn service(dir: &Path, source: MockMarketDataSource) -> ForecastService {
        ForecastService::new(config(dir), Arc::new(source), Arc::new(venue()))
    }

    #[tokio::test]
    async fn test_predictions_without_models_are_neutral() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), source(100));
        let now = ms_to_datetime(START + 100 * HOUR_MS);

        let reg = service.predict_regression(now).await;
        assert_eq!(reg.forecast, RegressionForecast::neutral());
        assert!(reg.neutral_reason.is_some());

        let cls = service.predict_classification(now).await;
        assert_eq!(cls.forecast.prob_positive, 0.5);
        assert!(cls.neutral_reason.is_some());
    }

    #[tokio::test]
    async fn test_train_then_predict() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), source(300));
        let now = ms_to_datetime(START + 300 * HOUR_MS);

        let fetched = service.fetch(now).await.unwrap();
        assert_eq!(fetched.funding_rows, 300);
        assert_eq!(fetched.merged_rows, 300);
        assert!(fetched.merged_csv.as_ref().unwrap().exists());

        let report = service.train_from_csv(Task::Regression, None).unwrap();
        assert!(report.model.exists());
        assert!(report.meta.exists());
        assert!(matches!(report.metrics, TrainingMetrics::Regression(_)));

        let reg = service.predict_regression(now).await;
        assert!(reg.neutral_reason.is_none());
        assert_eq!(reg.forecast.n_models, 3);

        let offline = service.regression_from_records(&fetched.merged);
        assert_eq!(offline.forecast, reg.forecast);
    }

    #[test]
    fn test_train_without_merged_csv_fails() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), source(10));
        let err = service.train_from_csv(Task::Classification, None).unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_live_cycle_logs_direction() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), source(300));
        let now = ms_to_datetime(START + 300 * HOUR_MS);

        let report = service.live_cycle(now).await.unwrap();
        assert_eq!(report.n_models, 3);
        assert!(report.neutral_reason.is_none());
        assert!(report.hl_current_ctx.is_some());
        assert_eq!(report.confidence, report.prob_positive.max(1.0 - report.prob_positive));

        match service.last_comparison(now).await {
            LastComparison::Awaiting {
                predicted_direction,
                ..
            } => assert_eq!(predicted_direction, report.direction),
            other => panic!("expected an awaiting comparison, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_train_blocking_persists_ensemble() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), source(300));
        let now = ms_to_datetime(START + 300 * HOUR_MS);

        let fetched = service.fetch(now).await.unwrap();
        let report = service
            .train_blocking(Task::Classification, fetched.merged)
            .await
            .unwrap();
        assert_eq!(report.task, Task::Classification);
        assert!(report.model.exists());
        assert!(report.meta.exists());
        assert_eq!(report.model, service.model_paths(Task::Classification).0);
        assert!(service.predict_classification(now).await.neutral_reason.is_none());
    }

    #[tokio::test]
    async fn test_accuracy_paths_are_total() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), failing_source());
        let now = ms_to_datetime(START);

        assert!(service.log_prediction(Direction::Negative, 0.2, now).is_some());
        let later = ms_to_datetime(START + 2 * HOUR_MS);
        assert_eq!(service.accuracy(later).await, AccuracySummary::empty());
        assert!(matches!(
            service.last_comparison(later).await,
            LastComparison::Awaiting { .. }
        ));
        let history = service.history(3, later).await;
        assert!(history.funding_history.is_empty());
        assert_eq!(history.predictions_log.len(), 1);
        assert!(history.predictions_log[0].realized.is_none());
    }

    #[test]
    fn test_next_funding_time_without_venue_value() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), source(1));
        let now = ms_to_datetime(START + 10 * HOUR_MS + 60_000);
        assert_eq!(service.next_funding_time(None, now), START + 11 * HOUR_MS);
    }
}
