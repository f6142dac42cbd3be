//! Feature engineering for hourly funding data
//!
//! Builds a fixed-width numeric frame from aligned funding/candle rows:
//! - Calendar features (hour of day, day of week) plus cyclical encodings
//! - Price returns, realised volatility, RSI and z-score on the close
//! - Lags, EMAs and magnitudes of funding rate and premium
//! - Volume changes and moving averages
//!
//! Stages run in a fixed order and each one is skipped when its source
//! column is absent. Warm-up rows are left undefined and dropped later.

use super::series::{self, Column};
use crate::types::{ms_to_datetime, AlignedRecord};
use chrono::{Datelike, Timelike};
use std::collections::HashMap;
use std::f64::consts::PI;

pub const COL_HOUR: &str = "hour";
pub const COL_TIME: &str = "time";
pub const COL_FUNDING_RATE: &str = "fundingRate";
pub const COL_PREMIUM: &str = "premium";
pub const COL_OPEN_TIME: &str = "open_time";
pub const COL_CLOSE_TIME: &str = "close_time";
pub const COL_OPEN: &str = "open";
pub const COL_HIGH: &str = "high";
pub const COL_LOW: &str = "low";
pub const COL_CLOSE: &str = "close";
pub const COL_VOLUME: &str = "volume";
pub const COL_HOUR_OF_DAY: &str = "hour_of_day";
pub const COL_DAY_OF_WEEK: &str = "day_of_week";

/// Column-oriented numeric table keyed by hour.
///
/// Column order is insertion order and is significant: it is what the
/// dataset preparer turns into the persisted feature list.
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    hours: Vec<i64>,
    names: Vec<String>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl FeatureFrame {
    pub fn new(hours: Vec<i64>) -> Self {
        Self {
            hours,
            ..Default::default()
        }
    }

    /// Frame of raw columns. Candle columns are only present if at least one
    /// row carries a candle.
    pub fn from_records(records: &[AlignedRecord]) -> Self {
        let mut frame = Self::new(records.iter().map(|r| r.hour).collect());
        frame.insert(COL_HOUR, records.iter().map(|r| Some(r.hour as f64)).collect());
        frame.insert(COL_TIME, records.iter().map(|r| Some(r.time as f64)).collect());
        frame.insert(COL_FUNDING_RATE, records.iter().map(|r| Some(r.funding_rate)).collect());
        frame.insert(COL_PREMIUM, records.iter().map(|r| Some(r.premium)).collect());

        if records.iter().any(AlignedRecord::has_candle) {
            frame.insert(COL_OPEN_TIME, records.iter().map(|r| r.open_time.map(|t| t as f64)).collect());
            frame.insert(COL_CLOSE_TIME, records.iter().map(|r| r.close_time.map(|t| t as f64)).collect());
            frame.insert(COL_OPEN, records.iter().map(|r| r.open).collect());
            frame.insert(COL_HIGH, records.iter().map(|r| r.high).collect());
            frame.insert(COL_LOW, records.iter().map(|r| r.low).collect());
            frame.insert(COL_CLOSE, records.iter().map(|r| r.close).collect());
            frame.insert(COL_VOLUME, records.iter().map(|r| r.volume).collect());
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }

    pub fn hours(&self) -> &[i64] {
        &self.hours
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.index.get(name).map(|&i| self.columns[i].as_slice())
    }

    /// Add a column, replacing any existing column of the same name in place
    pub fn insert(&mut self, name: &str, values: Column) {
        debug_assert_eq!(values.len(), self.hours.len());
        match self.index.get(name) {
            Some(&i) => self.columns[i] = values,
            None => {
                self.index.insert(name.to_string(), self.columns.len());
                self.names.push(name.to_string());
                self.columns.push(values);
            }
        }
    }

    /// Value at (row, column)
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name).and_then(|c| c.get(row).copied().flatten())
    }

    /// Indices of rows where every column is defined and finite
    pub fn complete_rows(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|&row| {
                self.columns
                    .iter()
                    .all(|c| matches!(c[row], Some(v) if v.is_finite()))
            })
            .collect()
    }
}

/// Windows and lags used by the feature builder
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    pub return_lags: Vec<usize>,
    pub volatility_windows: Vec<usize>,
    pub rsi_period: usize,
    pub zscore_window: usize,
    /// Columns that receive lag/EMA/abs features
    pub lagged_columns: Vec<String>,
    pub lags: Vec<usize>,
    pub ema_spans: Vec<usize>,
    pub volume_change_lags: Vec<usize>,
    pub volume_ma_windows: Vec<usize>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            return_lags: vec![1, 3, 6, 12],
            volatility_windows: vec![6, 12, 24],
            rsi_period: 14,
            zscore_window: 24,
            lagged_columns: vec![COL_FUNDING_RATE.to_string(), COL_PREMIUM.to_string()],
            lags: vec![1, 2, 3, 6, 12, 24],
            ema_spans: vec![12, 24],
            volume_change_lags: vec![1, 6],
            volume_ma_windows: vec![6, 24],
        }
    }
}

impl FeatureConfig {
    /// Number of leading rows left incomplete by the warm-up windows
    pub fn warmup_rows(&self) -> usize {
        self.return_lags
            .iter()
            .chain(self.volatility_windows.iter())
            .chain(self.lags.iter())
            .chain(self.volume_change_lags.iter())
            .copied()
            .chain(self.volume_ma_windows.iter().map(|w| w.saturating_sub(1)))
            .chain([self.zscore_window.saturating_sub(1), 1])
            .max()
            .unwrap_or(0)
    }
}

/// Pure transformer from aligned rows to a feature frame
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn build(&self, records: &[AlignedRecord]) -> FeatureFrame {
        self.build_frame(&FeatureFrame::from_records(records))
    }

    /// Apply every stage to a copy of `input`
    pub fn build_frame(&self, input: &FeatureFrame) -> FeatureFrame {
        let mut frame = input.clone();
        if frame.is_empty() {
            return frame;
        }
        self.add_time_features(&mut frame);
        self.add_cyclical_features(&mut frame);
        self.add_price_features(&mut frame);
        self.add_lag_features(&mut frame);
        self.add_volume_features(&mut frame);
        frame
    }

    fn add_time_features(&self, frame: &mut FeatureFrame) {
        if !frame.has_column(COL_HOUR) {
            return;
        }
        let (hour_of_day, day_of_week): (Column, Column) = frame
            .hours()
            .iter()
            .map(|&h| {
                let ts = ms_to_datetime(h);
                (
                    Some(ts.hour() as f64),
                    Some(ts.weekday().num_days_from_monday() as f64),
                )
            })
            .unzip();
        frame.insert(COL_HOUR_OF_DAY, hour_of_day);
        frame.insert(COL_DAY_OF_WEEK, day_of_week);
    }

    fn add_cyclical_features(&self, frame: &mut FeatureFrame) {
        for (source, period, sin_name, cos_name) in [
            (COL_HOUR_OF_DAY, 24.0, "hour_sin", "hour_cos"),
            (COL_DAY_OF_WEEK, 7.0, "dow_sin", "dow_cos"),
        ] {
            let Some(values) = frame.column(source) else {
                continue;
            };
            let angles: Column = values.iter().map(|v| v.map(|v| 2.0 * PI * v / period)).collect();
            let sin: Column = angles.iter().map(|a| a.map(f64::sin)).collect();
            let cos: Column = angles.iter().map(|a| a.map(f64::cos)).collect();
            frame.insert(sin_name, sin);
            frame.insert(cos_name, cos);
        }
    }

    fn add_price_features(&self, frame: &mut FeatureFrame) {
        let Some(price) = frame.column(COL_CLOSE).map(<[Option<f64>]>::to_vec) else {
            return;
        };

        for &lag in &self.config.return_lags {
            frame.insert(&format!("ret_{}", lag), series::pct_change(&price, lag));
        }

        let returns = series::pct_change(&price, 1);
        for &window in &self.config.volatility_windows {
            frame.insert(&format!("vol_{}", window), series::rolling_std(&returns, window));
        }

        let period = self.config.rsi_period;
        frame.insert(&format!("rsi_{}", period), series::rsi(&price, period));

        let window = self.config.zscore_window;
        frame.insert(&format!("z_score_{}", window), series::zscore(&price, window));
    }

    fn add_lag_features(&self, frame: &mut FeatureFrame) {
        for name in &self.config.lagged_columns {
            let Some(values) = frame.column(name).map(<[Option<f64>]>::to_vec) else {
                continue;
            };
            for &lag in &self.config.lags {
                frame.insert(&format!("{}_lag_{}", name, lag), series::shift(&values, lag));
            }
            for &span in &self.config.ema_spans {
                frame.insert(&format!("{}_ema_{}", name, span), series::ema(&values, span));
            }
            frame.insert(&format!("{}_abs", name), series::abs(&values));
        }
    }

    fn add_volume_features(&self, frame: &mut FeatureFrame) {
        let Some(volume) = frame.column(COL_VOLUME).map(<[Option<f64>]>::to_vec) else {
            return;
        };
        for &lag in &self.config.volume_change_lags {
            frame.insert(&format!("vol_chg_{}", lag), series::pct_change(&volume, lag));
        }
        for &window in &self.config.volume_ma_windows {
            frame.insert(&format!("vol_ma_{}", window), series::rolling_mean(&volume, window));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candle, FundingEvent, HOUR_MS};

    // 2024-01-01 00:00 UTC, a Monday
    const START: i64 = 1_704_067_200_000;

    fn records(n: usize) -> Vec<AlignedRecord> {
        (0..n)
            .map(|i| {
                let t = START + i as i64 * HOUR_MS;
                let close = 100.0 + i as f64;
                AlignedRecord::from_funding(&FundingEvent {
                    time: t,
                    funding_rate: 0.0001 * ((i % 5) as f64 - 2.0),
                    premium: 0.00005 * (i % 3) as f64,
                    coin: "HYPE".to_string(),
                })
                .with_candle(&Candle {
                    open_time: t,
                    close_time: t + HOUR_MS - 1,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000.0 + (i % 4) as f64 * 10.0,
                    interval: "1h".to_string(),
                })
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let frame = FeatureBuilder::with_defaults().build(&[]);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_time_features() {
        let frame = FeatureBuilder::with_defaults().build(&records(30));
        assert_eq!(frame.value(0, COL_HOUR_OF_DAY), Some(0.0));
        assert_eq!(frame.value(0, COL_DAY_OF_WEEK), Some(0.0));
        assert_eq!(frame.value(25, COL_HOUR_OF_DAY), Some(1.0));
        assert_eq!(frame.value(25, COL_DAY_OF_WEEK), Some(1.0));
        assert!((frame.value(6, "hour_sin").unwrap() - 1.0).abs() < 1e-12);
        assert!((frame.value(0, "hour_cos").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_price_scenario() {
        let frame = FeatureBuilder::with_defaults().build(&records(30));
        for row in 1..30 {
            assert!(frame.value(row, "ret_1").unwrap() > 0.0);
        }
        assert!(frame.value(29, "rsi_14").unwrap() > 99.0);
        assert!(frame.value(28, "rsi_14").unwrap() > 99.0);
    }

    #[test]
    fn test_expected_columns_present() {
        let frame = FeatureBuilder::with_defaults().build(&records(30));
        for name in [
            "ret_1", "ret_3", "ret_6", "ret_12", "vol_6", "vol_12", "vol_24", "rsi_14",
            "z_score_24", "fundingRate_lag_1", "fundingRate_lag_24", "fundingRate_ema_12",
            "fundingRate_ema_24", "fundingRate_abs", "premium_lag_6", "premium_ema_24",
            "premium_abs", "vol_chg_1", "vol_chg_6", "vol_ma_6", "vol_ma_24",
        ] {
            assert!(frame.has_column(name), "missing {}", name);
        }
    }

    #[test]
    fn test_warmup_rows_undefined() {
        let frame = FeatureBuilder::with_defaults().build(&records(30));
        assert_eq!(frame.value(23, "fundingRate_lag_24"), None);
        assert!(frame.value(24, "fundingRate_lag_24").is_some());
        assert_eq!(frame.value(23, "vol_24"), None);
        assert!(frame.value(24, "vol_24").is_some());
        let complete = frame.complete_rows();
        assert_eq!(complete.first(), Some(&24));
    }

    #[test]
    fn test_price_stage_skipped_without_candles() {
        let funding_only: Vec<AlignedRecord> = records(30)
            .iter()
            .map(|r| {
                AlignedRecord::from_funding(&FundingEvent {
                    time: r.time,
                    funding_rate: r.funding_rate,
                    premium: r.premium,
                    coin: r.coin.clone(),
                })
            })
            .collect();
        let frame = FeatureBuilder::with_defaults().build(&funding_only);
        assert!(!frame.has_column("ret_1"));
        assert!(!frame.has_column("vol_ma_6"));
        assert!(frame.has_column("fundingRate_lag_1"));
    }

    #[test]
    fn test_build_does_not_mutate_input() {
        let base = FeatureFrame::from_records(&records(10));
        let names_before = base.names().to_vec();
        let built = FeatureBuilder::with_defaults().build_frame(&base);
        assert_eq!(base.names(), names_before.as_slice());
        assert!(built.names().len() > names_before.len());
    }

    #[test]
    fn test_no_look_ahead() {
        let base = records(60);
        let mut perturbed = base.clone();
        for r in perturbed.iter_mut().skip(40) {
            r.close = r.close.map(|c| c * 2.0);
            r.volume = r.volume.map(|v| v * 5.0);
            r.funding_rate = -r.funding_rate * 10.0;
            r.premium += 0.01;
        }
        let builder = FeatureBuilder::with_defaults();
        let a = builder.build(&base);
        let b = builder.build(&perturbed);
        for name in a.names() {
            let ca = a.column(name).unwrap();
            let cb = b.column(name).unwrap();
            assert_eq!(&ca[..40], &cb[..40], "column {} leaked future data", name);
        }
    }

    #[test]
    fn test_warmup_rows() {
        assert_eq!(FeatureConfig::default().warmup_rows(), 24);
    }
}
