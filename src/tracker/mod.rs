//! Prediction log and realized-accuracy tracking
//!
//! Every direction forecast is appended to a CSV log. An entry is resolved by
//! the first funding event strictly after its logged time: the sign of that
//! event's rate is the realized direction. Entries with no later event yet
//! are unresolved and never counted.

use crate::config::AccuracyConfig;
use crate::data::MarketDataSource;
use crate::error::{ForecastError, Result};
use crate::types::{days_ago_ms, Direction, FundingEvent, PredictionLogEntry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only CSV log of `time,direction,prob_positive`
#[derive(Debug)]
pub struct PredictionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PredictionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single write, adding the header to a new file
    pub fn append(&self, entry: &PredictionLogEntry) -> Result<()> {
        let _guard = self.write_lock.lock();

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(Vec::new());
        writer.serialize(entry)?;
        let line = writer
            .into_inner()
            .map_err(|e| ForecastError::Io(e.into_error()))?;

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    /// All readable entries in log order; a missing file is an empty log
    pub fn read_all(&self) -> Result<Vec<PredictionLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut entries = Vec::new();
        for (line, row) in reader.deserialize::<PredictionLogEntry>().enumerate() {
            match row {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping unreadable log row {}: {}", line + 2, e),
            }
        }
        Ok(entries)
    }
}

/// Rolling accuracy over resolved entries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub count: usize,
    pub correct: usize,
    /// `None` when nothing in the window is resolved
    pub accuracy: Option<f64>,
}

impl AccuracySummary {
    pub fn empty() -> Self {
        Self {
            count: 0,
            correct: 0,
            accuracy: None,
        }
    }
}

/// Outcome of the most recent logged prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LastComparison {
    NoPredictions,
    Awaiting {
        last_prediction_time: DateTime<Utc>,
        predicted_direction: Direction,
    },
    Resolved {
        last_prediction_time: DateTime<Utc>,
        predicted_direction: Direction,
        prob_positive: f64,
        realized_direction: Direction,
        correct: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingPoint {
    pub time: i64,
    #[serde(rename = "fundingRate")]
    pub funding_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntry {
    pub time: DateTime<Utc>,
    pub direction: Direction,
    pub prob_positive: f64,
    pub realized: Option<Direction>,
    pub correct: bool,
}

/// Recent funding and log entries for charting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    #[serde(rename = "fundingHistory")]
    pub funding_history: Vec<FundingPoint>,
    #[serde(rename = "predictionsLog")]
    pub predictions_log: Vec<ResolvedEntry>,
}

/// Events kept for charting
const HISTORY_POINTS: usize = 500;

/// Sign of the first event strictly after `time_ms`.
///
/// `events` must be sorted ascending by time.
pub fn realized_direction(time_ms: i64, events: &[FundingEvent]) -> Option<Direction> {
    events
        .iter()
        .find(|e| e.time > time_ms)
        .map(|e| Direction::from_rate(e.funding_rate))
}

pub struct AccuracyTracker {
    log: PredictionLog,
    window_days: i64,
    history_limit: usize,
}

impl AccuracyTracker {
    pub fn new(log: PredictionLog, config: &AccuracyConfig) -> Self {
        Self {
            log,
            window_days: config.window_days,
            history_limit: config.history_limit,
        }
    }

    pub fn log(&self) -> &PredictionLog {
        &self.log
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    pub fn record(
        &self,
        direction: Direction,
        prob_positive: f64,
        now: DateTime<Utc>,
    ) -> Result<PredictionLogEntry> {
        let entry = PredictionLogEntry {
            time: now,
            direction,
            prob_positive,
        };
        self.log.append(&entry)?;
        tracing::info!(
            "Logged prediction {} (p={:.4}) to {}",
            direction,
            prob_positive,
            self.log.path().display()
        );
        Ok(entry)
    }

    /// Funding events after the earliest entry, enough to resolve every entry.
    ///
    /// A failed lookup leaves every entry unresolved.
    async fn events_for(
        &self,
        source: &dyn MarketDataSource,
        coin: &str,
        entries: &[PredictionLogEntry],
        now: DateTime<Utc>,
    ) -> Vec<FundingEvent> {
        let Some(start) = entries.iter().map(PredictionLogEntry::time_ms).min() else {
            return Vec::new();
        };
        match source
            .fetch_funding_history(coin, start, now.timestamp_millis())
            .await
        {
            Ok(mut events) => {
                events.sort_by_key(|e| e.time);
                events
            }
            Err(e) => {
                tracing::warn!("Could not fetch realized funding for {}: {}", coin, e);
                Vec::new()
            }
        }
    }

    /// Realized direction for one entry, `None` while unresolved
    pub async fn resolve(
        &self,
        source: &dyn MarketDataSource,
        coin: &str,
        entry: &PredictionLogEntry,
        now: DateTime<Utc>,
    ) -> Option<Direction> {
        let events = self.events_for(source, coin, std::slice::from_ref(entry), now).await;
        realized_direction(entry.time_ms(), &events)
    }

    /// Share of resolved entries within `max_days` whose direction was right
    pub async fn rolling_accuracy(
        &self,
        source: &dyn MarketDataSource,
        coin: &str,
        max_days: i64,
        now: DateTime<Utc>,
    ) -> Result<AccuracySummary> {
        let cutoff = days_ago_ms(now, max_days);
        let entries: Vec<PredictionLogEntry> = self
            .log
            .read_all()?
            .into_iter()
            .filter(|e| e.time_ms() >= cutoff)
            .collect();
        if entries.is_empty() {
            return Ok(AccuracySummary::empty());
        }

        let events = self.events_for(source, coin, &entries, now).await;
        let mut count = 0;
        let mut correct = 0;
        for entry in &entries {
            if let Some(realized) = realized_direction(entry.time_ms(), &events) {
                count += 1;
                if realized == entry.direction {
                    correct += 1;
                }
            }
        }

        Ok(AccuracySummary {
            count,
            correct,
            accuracy: (count > 0).then(|| correct as f64 / count as f64),
        })
    }

    pub async fn last_comparison(
        &self,
        source: &dyn MarketDataSource,
        coin: &str,
        now: DateTime<Utc>,
    ) -> Result<LastComparison> {
        let Some(latest) = self.log.read_all()?.pop() else {
            return Ok(LastComparison::NoPredictions);
        };
        Ok(match self.resolve(source, coin, &latest, now).await {
            None => LastComparison::Awaiting {
                last_prediction_time: latest.time,
                predicted_direction: latest.direction,
            },
            Some(realized) => LastComparison::Resolved {
                last_prediction_time: latest.time,
                predicted_direction: latest.direction,
                prob_positive: latest.prob_positive,
                realized_direction: realized,
                correct: realized == latest.direction,
            },
        })
    }

    /// Funding over the last `days` plus the latest log entries, resolved
    pub async fn history(
        &self,
        source: &dyn MarketDataSource,
        coin: &str,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<HistoryView> {
        let start = days_ago_ms(now, days);
        let mut funding = source
            .fetch_funding_history(coin, start, now.timestamp_millis())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Funding history unavailable for {}: {}", coin, e);
                Vec::new()
            });
        funding.sort_by_key(|e| e.time);
        let skip = funding.len().saturating_sub(HISTORY_POINTS);
        let funding_history = funding[skip..]
            .iter()
            .map(|e| FundingPoint {
                time: e.time,
                funding_rate: e.funding_rate,
            })
            .collect();

        let entries = self.log.read_all()?;
        let skip = entries.len().saturating_sub(self.history_limit);
        let entries = &entries[skip..];
        let events = self.events_for(source, coin, entries, now).await;
        let predictions_log = entries
            .iter()
            .map(|entry| {
                let realized = realized_direction(entry.time_ms(), &events);
                ResolvedEntry {
                    time: entry.time,
                    direction: entry.direction,
                    prob_positive: entry.prob_positive,
                    realized,
                    correct: realized == Some(entry.direction),
                }
            })
            .collect();

        Ok(HistoryView {
            funding_history,
            predictions_log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockMarketDataSource;
    use crate::types::{ms_to_datetime, HOUR_MS};

    const T: i64 = 1_704_067_200_000;

    fn event(time: i64, rate: f64) -> FundingEvent {
        FundingEvent {
            time,
            funding_rate: rate,
            premium: 0.0,
            coin: "HYPE".to_string(),
        }
    }

    fn tracker(dir: &Path) -> AccuracyTracker {
        AccuracyTracker::new(
            PredictionLog::new(dir.join("predictions_log.csv")),
            &AccuracyConfig::default(),
        )
    }

    fn source_with(events: Vec<FundingEvent>) -> MockMarketDataSource {
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch_funding_history()
            .returning(move |_, start, end| {
                Ok(events
                    .iter()
                    .filter(|e| e.time >= start && e.time <= end)
                    .cloned()
                    .collect())
            });
        source
    }

    #[test]
    fn test_log_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = PredictionLog::new(dir.path().join("logs").join("predictions_log.csv"));
        for i in 0..3 {
            log.append(&PredictionLogEntry {
                time: ms_to_datetime(T + i * HOUR_MS),
                direction: Direction::Negative,
                prob_positive: 0.25,
            })
            .unwrap();
        }
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert!(text.starts_with("time,direction,prob_positive"));
        assert_eq!(text.matches("prob_positive").count(), 1);

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].time_ms(), T + 2 * HOUR_MS);
        assert_eq!(entries[0].direction, Direction::Negative);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PredictionLog::new(dir.path().join("none.csv")).read_all().unwrap().is_empty());
    }

    #[test]
    fn test_realized_direction_uses_first_later_event() {
        let events = vec![event(T, 0.5), event(T + HOUR_MS, -0.1), event(T + 2 * HOUR_MS, 0.3)];
        // an event at exactly the logged time does not count
        assert_eq!(realized_direction(T, &events), Some(Direction::Negative));
        assert_eq!(realized_direction(T + 2 * HOUR_MS, &events), None);
        // zero is not positive
        assert_eq!(realized_direction(0, &[event(1, 0.0)]), Some(Direction::Negative));
    }

    #[tokio::test]
    async fn test_positive_prediction_resolved_correct() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());
        tracker.record(Direction::Positive, 0.7, ms_to_datetime(T)).unwrap();

        let source = source_with(vec![event(T + HOUR_MS, 0.0002)]);
        let now = ms_to_datetime(T + 2 * HOUR_MS);
        match tracker.last_comparison(&source, "HYPE", now).await.unwrap() {
            LastComparison::Resolved {
                correct,
                realized_direction,
                ..
            } => {
                assert!(correct);
                assert_eq!(realized_direction, Direction::Positive);
            }
            other => panic!("expected a resolved comparison, got {:?}", other),
        }

        let history = tracker.history(&source, "HYPE", 3, now).await.unwrap();
        assert_eq!(history.predictions_log.len(), 1);
        assert!(history.predictions_log[0].correct);
    }

    #[tokio::test]
    async fn test_rolling_accuracy_counts_resolved_in_window() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());
        let now = ms_to_datetime(T + 30 * 24 * HOUR_MS);

        // outside the 14 day window
        tracker.record(Direction::Positive, 0.9, ms_to_datetime(T)).unwrap();
        let recent = T + 20 * 24 * HOUR_MS;
        tracker.record(Direction::Positive, 0.6, ms_to_datetime(recent)).unwrap();
        tracker
            .record(Direction::Negative, 0.3, ms_to_datetime(recent + HOUR_MS))
            .unwrap();
        tracker
            .record(Direction::Negative, 0.4, ms_to_datetime(recent + 2 * HOUR_MS))
            .unwrap();
        // still unresolved
        tracker
            .record(Direction::Positive, 0.8, ms_to_datetime(recent + 10 * HOUR_MS))
            .unwrap();

        let source = source_with(vec![
            event(T + HOUR_MS, -0.1),
            event(recent + HOUR_MS / 2, 0.0001),
            event(recent + HOUR_MS + HOUR_MS / 2, 0.0002),
            event(recent + 2 * HOUR_MS + HOUR_MS / 2, -0.0001),
        ]);

        let summary = tracker.rolling_accuracy(&source, "HYPE", 14, now).await.unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.correct, 2);
        assert!((summary.accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_empty_log_has_no_accuracy() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());
        let source = source_with(vec![]);
        let now = ms_to_datetime(T);
        assert_eq!(
            tracker.rolling_accuracy(&source, "HYPE", 14, now).await.unwrap(),
            AccuracySummary::empty()
        );
        assert_eq!(
            tracker.last_comparison(&source, "HYPE", now).await.unwrap(),
            LastComparison::NoPredictions
        );
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_entries_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());
        tracker.record(Direction::Positive, 0.7, ms_to_datetime(T)).unwrap();

        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch_funding_history()
            .returning(|_, _, _| Err(ForecastError::Api("timeout".to_string())));

        let now = ms_to_datetime(T + 5 * HOUR_MS);
        let summary = tracker.rolling_accuracy(&source, "HYPE", 14, now).await.unwrap();
        assert_eq!(summary.count, 0);
        assert!(summary.accuracy.is_none());
        assert!(matches!(
            tracker.last_comparison(&source, "HYPE", now).await.unwrap(),
            LastComparison::Awaiting { .. }
        ));
    }
}
