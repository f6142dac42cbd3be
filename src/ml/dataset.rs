//! Supervised dataset preparation
//!
//! Targets are the next hour's funding rate (regression) or whether it is
//! strictly positive (classification). Rows with any undefined value,
//! including the final row which has no successor, are dropped.

use super::features::{
    FeatureFrame, COL_CLOSE_TIME, COL_FUNDING_RATE, COL_HIGH, COL_HOUR, COL_LOW, COL_OPEN,
    COL_OPEN_TIME, COL_TIME,
};
use super::model::Task;
use super::series::Column;
use crate::error::{ForecastError, Result};

pub const TARGET_COL: &str = "target_next_funding";
pub const LABEL_COL: &str = "label";

/// Columns never used as model inputs: identifiers, raw timestamps, the raw
/// candle fields other than close/volume, and the targets themselves.
pub const EXCLUDED_COLUMNS: &[&str] = &[
    COL_HOUR,
    COL_TIME,
    COL_OPEN_TIME,
    COL_CLOSE_TIME,
    COL_OPEN,
    COL_HIGH,
    COL_LOW,
    COL_FUNDING_RATE,
    TARGET_COL,
    LABEL_COL,
];

/// Dense feature matrix with aligned targets, in chronological order
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub feature_cols: Vec<String>,
    pub hours: Vec<i64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_cols.len()
    }

    /// Rows at `indices` (features, targets)
    pub fn subset(&self, indices: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x = indices.iter().map(|&i| self.features[i].clone()).collect();
        let y = indices.iter().map(|&i| self.targets[i]).collect();
        (x, y)
    }
}

/// Most recent complete feature row, ordered like the persisted columns
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRow {
    pub hour: i64,
    pub values: Vec<f64>,
}

/// Every column that is not excluded, in frame order
pub fn select_feature_columns(frame: &FeatureFrame) -> Vec<String> {
    frame
        .names()
        .iter()
        .filter(|name| !EXCLUDED_COLUMNS.contains(&name.as_str()))
        .cloned()
        .collect()
}

pub fn prepare_regression(frame: &FeatureFrame) -> Result<Dataset> {
    prepare_dataset(frame, Task::Regression)
}

pub fn prepare_classification(frame: &FeatureFrame) -> Result<Dataset> {
    prepare_dataset(frame, Task::Classification)
}

pub fn prepare_dataset(frame: &FeatureFrame, task: Task) -> Result<Dataset> {
    let rates = frame.column(COL_FUNDING_RATE).ok_or_else(|| {
        ForecastError::InvalidInput(format!("frame has no {} column", COL_FUNDING_RATE))
    })?;

    let mut frame = frame.clone();
    let next_rate = lead(rates, 1);
    if task == Task::Classification {
        let labels: Column = next_rate
            .iter()
            .map(|v| v.map(|r| if r > 0.0 { 1.0 } else { 0.0 }))
            .collect();
        frame.insert(TARGET_COL, next_rate);
        frame.insert(LABEL_COL, labels);
    } else {
        frame.insert(TARGET_COL, next_rate);
    }

    let feature_cols = select_feature_columns(&frame);
    let target_col = match task {
        Task::Regression => TARGET_COL,
        Task::Classification => LABEL_COL,
    };

    let rows = frame.complete_rows();
    if rows.is_empty() {
        return Err(ForecastError::InsufficientHistory {
            rows: 0,
            required: 1,
        });
    }

    let mut features = Vec::with_capacity(rows.len());
    let mut targets = Vec::with_capacity(rows.len());
    let mut hours = Vec::with_capacity(rows.len());
    for &row in &rows {
        let x: Option<Vec<f64>> = feature_cols.iter().map(|c| frame.value(row, c)).collect();
        let (Some(x), Some(y)) = (x, frame.value(row, target_col)) else {
            continue;
        };
        features.push(x);
        targets.push(y);
        hours.push(frame.hours()[row]);
    }

    tracing::debug!(
        "Prepared {:?} dataset: {} rows x {} features ({} raw rows)",
        task,
        targets.len(),
        feature_cols.len(),
        frame.len()
    );

    Ok(Dataset {
        features,
        targets,
        feature_cols,
        hours,
    })
}

/// Reindex the latest complete row to `feature_cols`.
///
/// A persisted column missing from the frame is a hard `FeatureMismatch`;
/// no complete row at all is `InsufficientHistory`.
pub fn latest_feature_row(frame: &FeatureFrame, feature_cols: &[String]) -> Result<LatestRow> {
    let missing: Vec<&str> = feature_cols
        .iter()
        .filter(|c| !frame.has_column(c))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ForecastError::FeatureMismatch(format!(
            "columns not available at inference: {}",
            missing.join(", ")
        )));
    }

    (0..frame.len())
        .rev()
        .find_map(|row| {
            let values: Option<Vec<f64>> = feature_cols
                .iter()
                .map(|c| frame.value(row, c).filter(|v| v.is_finite()))
                .collect();
            values.map(|values| LatestRow {
                hour: frame.hours()[row],
                values,
            })
        })
        .ok_or(ForecastError::InsufficientHistory {
            rows: frame.len(),
            required: 1,
        })
}

/// Value `k` rows ahead
fn lead(values: &[Option<f64>], k: usize) -> Column {
    (0..values.len())
        .map(|i| values.get(i + k).copied().flatten())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::FeatureBuilder;
    use crate::types::{AlignedRecord, Candle, FundingEvent, HOUR_MS};

    fn records(n: usize) -> Vec<AlignedRecord> {
        (0..n)
            .map(|i| {
                let t = 1_704_067_200_000 + i as i64 * HOUR_MS;
                let close = 50.0 + (i as f64 * 0.3).sin();
                AlignedRecord::from_funding(&FundingEvent {
                    time: t,
                    funding_rate: if i % 3 == 0 { -0.0001 } else { 0.0001 * i as f64 },
                    premium: 0.0001,
                    coin: "HYPE".to_string(),
                })
                .with_candle(&Candle {
                    open_time: t,
                    close_time: t + HOUR_MS - 1,
                    open: close,
                    high: close + 0.1,
                    low: close - 0.1,
                    close,
                    volume: 500.0 + i as f64,
                    interval: "1h".to_string(),
                })
            })
            .collect()
    }

    fn frame(n: usize) -> FeatureFrame {
        FeatureBuilder::with_defaults().build(&records(n))
    }

    #[test]
    fn test_regression_target_is_next_rate() {
        let frame = frame(40);
        let ds = prepare_regression(&frame).unwrap();
        // rows 24..=38 are complete, 39 has no successor
        assert_eq!(ds.len(), 15);
        assert_eq!(ds.hours[0], frame.hours()[24]);
        assert_eq!(ds.targets[0], frame.value(25, COL_FUNDING_RATE).unwrap());
        assert_eq!(*ds.hours.last().unwrap(), frame.hours()[38]);
    }

    #[test]
    fn test_classification_labels() {
        let frame = frame(40);
        let ds = prepare_classification(&frame).unwrap();
        for (i, hour) in ds.hours.iter().enumerate() {
            let row = frame.hours().iter().position(|h| h == hour).unwrap();
            let next = frame.value(row + 1, COL_FUNDING_RATE).unwrap();
            assert_eq!(ds.targets[i], if next > 0.0 { 1.0 } else { 0.0 });
        }
    }

    #[test]
    fn test_feature_columns_exclude_raw_fields() {
        let ds = prepare_regression(&frame(40)).unwrap();
        for excluded in EXCLUDED_COLUMNS {
            assert!(!ds.feature_cols.iter().any(|c| c == excluded));
        }
        assert!(ds.feature_cols.iter().any(|c| c == "close"));
        assert!(ds.feature_cols.iter().any(|c| c == "premium"));
        assert!(ds.feature_cols.iter().any(|c| c == "rsi_14"));
        assert_eq!(ds.features[0].len(), ds.n_features());
    }

    #[test]
    fn test_too_short_history_is_insufficient() {
        let err = prepare_regression(&frame(20)).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientHistory { .. }));
    }

    #[test]
    fn test_latest_row_uses_terminal_row() {
        let frame = frame(40);
        let cols = prepare_regression(&frame).unwrap().feature_cols;
        let latest = latest_feature_row(&frame, &cols).unwrap();
        assert_eq!(latest.hour, frame.hours()[39]);
        assert_eq!(latest.values.len(), cols.len());
    }

    #[test]
    fn test_latest_row_respects_persisted_order() {
        let frame = frame(40);
        let cols = vec!["rsi_14".to_string(), "close".to_string()];
        let latest = latest_feature_row(&frame, &cols).unwrap();
        assert_eq!(latest.values[0], frame.value(39, "rsi_14").unwrap());
        assert_eq!(latest.values[1], frame.value(39, "close").unwrap());
    }

    #[test]
    fn test_latest_row_missing_column_fails() {
        let frame = frame(40);
        let cols = vec!["close".to_string(), "not_a_feature".to_string()];
        let err = latest_feature_row(&frame, &cols).unwrap_err();
        assert!(matches!(err, ForecastError::FeatureMismatch(_)));
    }

    #[test]
    fn test_latest_row_without_complete_rows() {
        let frame = frame(10);
        let err = latest_feature_row(&frame, &["vol_24".to_string()]).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientHistory { .. }));
    }
}
