//! Core data types shared across the pipeline

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One hour in milliseconds
pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// One funding payment as reported by the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingEvent {
    /// Event time (ms since epoch)
    pub time: i64,
    #[serde(rename = "fundingRate")]
    pub funding_rate: f64,
    pub premium: f64,
    pub coin: String,
}

/// OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(rename = "openTime")]
    pub open_time: i64,
    #[serde(rename = "closeTime")]
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub interval: String,
}

/// Funding event joined with the latest candle at or before its hour.
///
/// Candle fields are `None` when no candle opened within one hour before the
/// floored funding hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedRecord {
    /// Funding time floored to the hour (ms)
    pub hour: i64,
    /// Raw funding event time (ms)
    pub time: i64,
    pub coin: String,
    #[serde(rename = "fundingRate")]
    pub funding_rate: f64,
    pub premium: f64,
    #[serde(rename = "openTime")]
    pub open_time: Option<i64>,
    #[serde(rename = "closeTime")]
    pub close_time: Option<i64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl AlignedRecord {
    /// Record carrying only the funding side
    pub fn from_funding(event: &FundingEvent) -> Self {
        Self {
            hour: floor_hour_ms(event.time),
            time: event.time,
            coin: event.coin.clone(),
            funding_rate: event.funding_rate,
            premium: event.premium,
            open_time: None,
            close_time: None,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }

    pub fn with_candle(mut self, candle: &Candle) -> Self {
        self.open_time = Some(candle.open_time);
        self.close_time = Some(candle.close_time);
        self.open = Some(candle.open);
        self.high = Some(candle.high);
        self.low = Some(candle.low);
        self.close = Some(candle.close);
        self.volume = Some(candle.volume);
        self
    }

    pub fn has_candle(&self) -> bool {
        self.open_time.is_some()
    }
}

/// Sign of a funding payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    /// Strictly positive rates are `Positive`; zero counts as `Negative`
    pub fn from_rate(rate: f64) -> Self {
        if rate > 0.0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }

    /// `Positive` when the probability reaches the 0.5 threshold
    pub fn from_probability(prob_positive: f64) -> Self {
        if prob_positive >= 0.5 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the append-only prediction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogEntry {
    pub time: DateTime<Utc>,
    pub direction: Direction,
    pub prob_positive: f64,
}

impl PredictionLogEntry {
    pub fn time_ms(&self) -> i64 {
        self.time.timestamp_millis()
    }
}

/// Floor a millisecond timestamp to the start of its UTC hour
pub fn floor_hour_ms(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(HOUR_MS)
}

/// Start of the next UTC hour strictly after the floored hour of `ts_ms`
pub fn next_hour_ms(ts_ms: i64) -> i64 {
    floor_hour_ms(ts_ms) + HOUR_MS
}

/// Millisecond timestamp `days` days before `now`
pub fn days_ago_ms(now: DateTime<Utc>, days: i64) -> i64 {
    (now - Duration::days(days)).timestamp_millis()
}

/// Convert ms since epoch to a UTC datetime (out-of-range clamps to epoch)
pub fn ms_to_datetime(ts_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
