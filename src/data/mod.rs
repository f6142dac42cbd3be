//! Market data sources, alignment and on-disk series
//!
//! The forecaster only talks to the venue through the traits below; the
//! HTTP implementation lives in [`crate::client`].

pub mod align;
pub mod store;

pub use align::{align_on_hour, CANDLE_TOLERANCE_MS};
pub use store::{read_candles, read_funding, read_merged, write_candles, write_funding, write_merged};

use crate::error::{ForecastError, Result};
use crate::types::{AlignedRecord, Candle, FundingEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Historical funding and candle series, sorted ascending and deduplicated
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_funding_history(
        &self,
        coin: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<FundingEvent>>;

    async fn fetch_candles(
        &self,
        coin: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>>;
}

/// Venue-side funding snapshot, used for display and cross-checks only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetContext {
    pub funding: Option<f64>,
    pub premium: Option<f64>,
    #[serde(rename = "markPx")]
    pub mark_px: Option<f64>,
    #[serde(rename = "oraclePx")]
    pub oracle_px: Option<f64>,
    #[serde(rename = "openInterest")]
    pub open_interest: Option<f64>,
}

/// Venue forecast of the next funding payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedFunding {
    #[serde(rename = "fundingRate")]
    pub funding_rate: Option<f64>,
    #[serde(rename = "nextFundingTime")]
    pub next_funding_time: Option<i64>,
}

/// Live funding context. Never used as a training feature.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FundingContextSource: Send + Sync {
    async fn current_context(&self, coin: &str) -> Option<AssetContext>;

    async fn predicted_funding(&self, coin: &str) -> Option<PredictedFunding>;
}

/// Raw and merged series from one fetch
#[derive(Debug, Clone, Default)]
pub struct CollectedDataset {
    pub funding: Vec<FundingEvent>,
    pub candles: Vec<Candle>,
    pub merged: Vec<AlignedRecord>,
}

/// Fetch both series for a window and align them
pub async fn collect_dataset(
    source: &dyn MarketDataSource,
    coin: &str,
    interval: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<CollectedDataset> {
    let mut funding = source.fetch_funding_history(coin, start_ms, end_ms).await?;
    let mut candles = source.fetch_candles(coin, interval, start_ms, end_ms).await?;

    // Stable sorts keep provider order for identical timestamps
    funding.sort_by_key(|e| e.time);
    candles.sort_by_key(|c| c.open_time);

    let merged = align_on_hour(&funding, &candles);
    tracing::info!(
        "Collected {} funding events, {} candles, {} merged rows for {}",
        funding.len(),
        candles.len(),
        merged.len(),
        coin
    );

    Ok(CollectedDataset {
        funding,
        candles,
        merged,
    })
}

/// Like [`collect_dataset`] but an empty merge is `DataUnavailable`
pub async fn fetch_merged(
    source: &dyn MarketDataSource,
    coin: &str,
    interval: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<AlignedRecord>> {
    let collected = collect_dataset(source, coin, interval, start_ms, end_ms).await?;
    if collected.merged.is_empty() {
        return Err(ForecastError::DataUnavailable(format!(
            "no aligned rows for {} between {} and {}",
            coin, start_ms, end_ms
        )));
    }
    Ok(collected.merged)
}
