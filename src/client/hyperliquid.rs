//! Hyperliquid info API client
//!
//! Every request is a JSON POST to the info endpoint. Numeric fields come
//! back as strings or numbers depending on the endpoint; both are accepted.

use crate::config::ApiConfig;
use crate::data::{AssetContext, FundingContextSource, MarketDataSource, PredictedFunding};
use crate::error::Result;
use crate::types::{Candle, FundingEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Float(f64),
    Text(String),
}

impl Number {
    fn to_f64(&self) -> Option<f64> {
        match self {
            Number::Float(v) => Some(*v),
            Number::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn flexible_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let raw = Number::deserialize(deserializer)?;
    raw.to_f64()
        .ok_or_else(|| de::Error::custom("expected a number or numeric string"))
}

fn flexible_opt_f64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    let raw = Option::<Number>::deserialize(deserializer)?;
    Ok(raw.and_then(|n| n.to_f64()))
}

#[derive(Debug, Deserialize)]
struct RawFunding {
    coin: String,
    #[serde(rename = "fundingRate", deserialize_with = "flexible_f64")]
    funding_rate: f64,
    #[serde(default, deserialize_with = "flexible_opt_f64")]
    premium: Option<f64>,
    time: i64,
}

impl From<RawFunding> for FundingEvent {
    fn from(raw: RawFunding) -> Self {
        FundingEvent {
            time: raw.time,
            funding_rate: raw.funding_rate,
            premium: raw.premium.unwrap_or(f64::NAN),
            coin: raw.coin,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    t: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(deserialize_with = "flexible_f64")]
    o: f64,
    #[serde(deserialize_with = "flexible_f64")]
    h: f64,
    #[serde(deserialize_with = "flexible_f64")]
    l: f64,
    #[serde(deserialize_with = "flexible_f64")]
    c: f64,
    #[serde(deserialize_with = "flexible_f64")]
    v: f64,
    #[serde(default)]
    i: String,
}

impl From<RawCandle> for Candle {
    fn from(raw: RawCandle) -> Self {
        Candle {
            open_time: raw.t,
            close_time: raw.close_time,
            open: raw.o,
            high: raw.h,
            low: raw.l,
            close: raw.c,
            volume: raw.v,
            interval: raw.i,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    universe: Vec<UniverseEntry>,
}

#[derive(Debug, Deserialize)]
struct UniverseEntry {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawAssetContext {
    #[serde(default, deserialize_with = "flexible_opt_f64")]
    funding: Option<f64>,
    #[serde(default, deserialize_with = "flexible_opt_f64")]
    premium: Option<f64>,
    #[serde(rename = "markPx", default, deserialize_with = "flexible_opt_f64")]
    mark_px: Option<f64>,
    #[serde(rename = "oraclePx", default, deserialize_with = "flexible_opt_f64")]
    oracle_px: Option<f64>,
    #[serde(rename = "openInterest", default, deserialize_with = "flexible_opt_f64")]
    open_interest: Option<f64>,
}

impl From<RawAssetContext> for AssetContext {
    fn from(raw: RawAssetContext) -> Self {
        AssetContext {
            funding: raw.funding,
            premium: raw.premium,
            mark_px: raw.mark_px,
            oracle_px: raw.oracle_px,
            open_interest: raw.open_interest,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPredicted {
    #[serde(rename = "fundingRate", default, deserialize_with = "flexible_opt_f64")]
    funding_rate: Option<f64>,
    #[serde(rename = "nextFundingTime", default)]
    next_funding_time: Option<i64>,
}

/// Hyperliquid client for funding history, candles and live funding context
#[derive(Clone)]
pub struct HyperliquidClient {
    http: Client,
    info_url: String,
    venue: String,
    max_pages: usize,
    page_delay: Duration,
}

impl HyperliquidClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            info_url: config.info_url.clone(),
            venue: config.venue.clone(),
            max_pages: config.max_pages,
            page_delay: Duration::from_millis(config.page_delay_ms),
        })
    }

    async fn post_info<T: DeserializeOwned>(&self, body: Value) -> Result<T> {
        let resp = self
            .http
            .post(&self.info_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn meta(&self) -> Result<Meta> {
        self.post_info(json!({ "type": "meta" })).await
    }

    /// Whether the coin is listed; a failed lookup counts as not listed
    pub async fn coin_in_universe(&self, coin: &str) -> bool {
        match self.meta().await {
            Ok(meta) => meta.universe.iter().any(|u| u.name == coin),
            Err(e) => {
                tracing::warn!("Failed to fetch meta: {}", e);
                false
            }
        }
    }

    async fn funding_page(&self, coin: &str, start_ms: i64, end_ms: i64) -> Result<Vec<FundingEvent>> {
        let page: Vec<RawFunding> = self
            .post_info(json!({
                "type": "fundingHistory",
                "coin": coin,
                "startTime": start_ms,
                "endTime": end_ms,
            }))
            .await?;
        debug!("Funding page from {}: {} events", start_ms, page.len());
        Ok(page.into_iter().map(FundingEvent::from).collect())
    }

    async fn asset_contexts(&self) -> Result<(Meta, Vec<RawAssetContext>)> {
        self.post_info(json!({ "type": "metaAndAssetCtxs" })).await
    }
}

/// Walk funding pages from `start_ms`, each starting one ms after the last
/// event seen. Stops on an empty page, a page that does not advance, the end
/// of the window or `max_pages`. The result is sorted and unique per
/// `(coin, time)`.
async fn paginate_funding<F, Fut>(
    start_ms: i64,
    end_ms: i64,
    max_pages: usize,
    delay: Duration,
    mut fetch_page: F,
) -> Result<Vec<FundingEvent>>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<Vec<FundingEvent>>>,
{
    let mut events = Vec::new();
    let mut cursor = start_ms;

    for _ in 0..max_pages {
        let mut page = fetch_page(cursor).await?;
        if page.is_empty() {
            break;
        }
        page.sort_by_key(|e| e.time);
        let last = page.last().map_or(cursor, |e| e.time);
        events.extend(page);

        if last <= cursor {
            break;
        }
        cursor = last + 1;
        if cursor > end_ms {
            break;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    events.sort_by_key(|e| e.time);
    let mut seen = HashSet::new();
    events.retain(|e| seen.insert((e.coin.clone(), e.time)));
    Ok(events)
}

/// Entry for `coin` at `venue` in a `predictedFundings` payload.
///
/// The payload is `[[coin, [[venue, {fundingRate, nextFundingTime}], ...]], ...]`
/// and venue entries may be null.
fn find_predicted(payload: &Value, coin: &str, venue: &str) -> Option<PredictedFunding> {
    let entry = payload.as_array()?.iter().find_map(|entry| match entry.as_array() {
        Some(pair) if pair.len() == 2 && pair[0].as_str() == Some(coin) => Some(&pair[1]),
        _ => None,
    })?;

    entry.as_array()?.iter().find_map(|v| {
        let pair = v.as_array()?;
        if pair.len() != 2 || pair[0].as_str() != Some(venue) {
            return None;
        }
        let raw: RawPredicted = serde_json::from_value(pair[1].clone()).ok()?;
        Some(PredictedFunding {
            funding_rate: raw.funding_rate,
            next_funding_time: raw.next_funding_time,
        })
    })
}

/// Context at the coin's position in the universe
fn context_for(coin: &str, meta: Meta, contexts: Vec<RawAssetContext>) -> Option<AssetContext> {
    let idx = meta.universe.iter().position(|u| u.name == coin)?;
    contexts.into_iter().nth(idx).map(AssetContext::from)
}

#[async_trait]
impl MarketDataSource for HyperliquidClient {
    async fn fetch_funding_history(
        &self,
        coin: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<FundingEvent>> {
        let events = paginate_funding(start_ms, end_ms, self.max_pages, self.page_delay, |cursor| {
            self.funding_page(coin, cursor, end_ms)
        })
        .await?;
        tracing::info!("Fetched {} funding events for {}", events.len(), coin);
        Ok(events)
    }

    async fn fetch_candles(
        &self,
        coin: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>> {
        let raw: Option<Vec<RawCandle>> = self
            .post_info(json!({
                "type": "candleSnapshot",
                "req": {
                    "coin": coin,
                    "interval": interval,
                    "startTime": start_ms,
                    "endTime": end_ms,
                },
            }))
            .await?;
        let mut candles: Vec<Candle> = raw.unwrap_or_default().into_iter().map(Candle::from).collect();
        candles.sort_by_key(|c| c.open_time);
        tracing::info!("Fetched {} {} candles for {}", candles.len(), interval, coin);
        Ok(candles)
    }
}

#[async_trait]
impl FundingContextSource for HyperliquidClient {
    async fn current_context(&self, coin: &str) -> Option<AssetContext> {
        match self.asset_contexts().await {
            Ok((meta, contexts)) => context_for(coin, meta, contexts),
            Err(e) => {
                tracing::warn!("Failed to fetch current funding context: {}", e);
                None
            }
        }
    }

    async fn predicted_funding(&self, coin: &str) -> Option<PredictedFunding> {
        match self.post_info::<Value>(json!({ "type": "predictedFundings" })).await {
            Ok(payload) => find_predicted(&payload, coin, &self.venue),
            Err(e) => {
                tracing::warn!("Failed to fetch predicted fundings: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(time: i64) -> FundingEvent {
        FundingEvent {
            time,
            funding_rate: 0.0001,
            premium: 0.0,
            coin: "HYPE".to_string(),
        }
    }

    #[test]
    fn test_funding_accepts_strings_and_numbers() {
        let raw: Vec<RawFunding> = serde_json::from_str(
            r#"[{"coin":"HYPE","fundingRate":"0.0000125","premium":"-0.0003","time":1},
                {"coin":"HYPE","fundingRate":0.00002,"time":2}]"#,
        )
        .unwrap();
        let events: Vec<FundingEvent> = raw.into_iter().map(FundingEvent::from).collect();
        assert_eq!(events[0].funding_rate, 0.0000125);
        assert_eq!(events[0].premium, -0.0003);
        assert_eq!(events[1].funding_rate, 0.00002);
        assert!(events[1].premium.is_nan());
    }

    #[test]
    fn test_candle_fields() {
        let raw: RawCandle = serde_json::from_str(
            r#"{"t":3600000,"T":7199999,"s":"HYPE","i":"1h","o":"10.5","c":"11","h":"11.2","l":"10.1","v":"1234.5","n":42}"#,
        )
        .unwrap();
        let candle = Candle::from(raw);
        assert_eq!(candle.open_time, 3_600_000);
        assert_eq!(candle.close_time, 7_199_999);
        assert_eq!(candle.close, 11.0);
        assert_eq!(candle.volume, 1234.5);
        assert_eq!(candle.interval, "1h");
    }

    #[tokio::test]
    async fn test_pagination_advances_and_dedupes() {
        let calls = AtomicUsize::new(0);
        let events = paginate_funding(0, 1_000, 10, Duration::ZERO, |cursor| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match cursor {
                    0 => vec![event(20), event(10), event(30)],
                    // overlaps the previous page
                    31 => vec![event(30), event(40), event(50)],
                    _ => vec![],
                })
            }
        })
        .await
        .unwrap();

        let times: Vec<i64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![10, 20, 30, 40, 50]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_end_and_on_stall() {
        let past_end = paginate_funding(0, 25, 10, Duration::ZERO, |cursor| async move {
            Ok(if cursor == 0 { vec![event(25)] } else { vec![event(99)] })
        })
        .await
        .unwrap();
        assert_eq!(past_end.len(), 1);

        let stalled = paginate_funding(50, 1_000, 10, Duration::ZERO, |_| async move {
            Ok(vec![event(50)])
        })
        .await
        .unwrap();
        assert_eq!(stalled.len(), 1);
    }

    #[tokio::test]
    async fn test_pagination_respects_page_cap() {
        let events = paginate_funding(0, i64::MAX, 3, Duration::ZERO, |cursor| async move {
            Ok(vec![event(cursor + 5)])
        })
        .await
        .unwrap();
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_pagination_propagates_errors() {
        let err = paginate_funding(0, 10, 3, Duration::ZERO, |_| async move {
            Err(ForecastError::Api("429".to_string()))
        })
        .await
        .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_find_predicted_venue() {
        let payload = json!([
            ["BTC", [["HlPerp", {"fundingRate": "0.00001", "nextFundingTime": 1}]]],
            ["HYPE", [
                ["BinPerp", {"fundingRate": "0.0001", "nextFundingTime": 2}],
                ["HlPerp", {"fundingRate": "0.0000125", "nextFundingTime": 1704070800000_i64}],
                null
            ]]
        ]);
        let predicted = find_predicted(&payload, "HYPE", "HlPerp").unwrap();
        assert_eq!(predicted.funding_rate, Some(0.0000125));
        assert_eq!(predicted.next_funding_time, Some(1_704_070_800_000));
        assert!(find_predicted(&payload, "HYPE", "BybitPerp").is_none());
        assert!(find_predicted(&payload, "ETH", "HlPerp").is_none());
        assert!(find_predicted(&json!({"error": "bad"}), "HYPE", "HlPerp").is_none());
    }

    #[test]
    fn test_context_by_universe_position() {
        let (meta, contexts): (Meta, Vec<RawAssetContext>) = serde_json::from_value(json!([
            {"universe": [{"name": "BTC"}, {"name": "HYPE"}]},
            [
                {"funding": "0.00001", "markPx": "60000"},
                {"funding": "0.0000125", "premium": "0.0002", "markPx": "21.5", "oraclePx": 21.4, "openInterest": "1000"}
            ]
        ]))
        .unwrap();
        let ctx = context_for("HYPE", meta, contexts).unwrap();
        assert_eq!(ctx.funding, Some(0.0000125));
        assert_eq!(ctx.oracle_px, Some(21.4));
        assert_eq!(ctx.open_interest, Some(1000.0));
        assert!(context_for("SOL", Meta::default(), Vec::new()).is_none());
    }

    #[test]
    fn test_client_from_config() {
        let client = HyperliquidClient::new(&ApiConfig::default()).unwrap();
        assert_eq!(client.venue, "HlPerp");
        assert_eq!(client.page_delay, Duration::from_millis(50));
    }
}
