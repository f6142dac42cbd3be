//! Funding/candle alignment
//!
//! Each funding event is matched to the latest candle whose open time is at
//! or before the event's floored hour, within a one hour tolerance. Matching
//! only ever looks backwards, so a candle is never attached to a funding
//! event that precedes it.

use crate::types::{AlignedRecord, Candle, FundingEvent, HOUR_MS};

/// Maximum gap between a candle's open time and the funding hour
pub const CANDLE_TOLERANCE_MS: i64 = HOUR_MS;

/// Merge funding events with candles into one row per funding event.
///
/// Both inputs must be sorted ascending (funding by `time`, candles by
/// `open_time`). Returns an empty vector if either side is empty.
pub fn align_on_hour(funding: &[FundingEvent], candles: &[Candle]) -> Vec<AlignedRecord> {
    if funding.is_empty() || candles.is_empty() {
        return Vec::new();
    }

    let mut records: Vec<AlignedRecord> = funding.iter().map(AlignedRecord::from_funding).collect();
    // Flooring can only reorder events that share an hour; keep input order for ties
    records.sort_by_key(|r| r.hour);

    let mut cursor = 0usize;
    let mut latest: Option<&Candle> = None;

    for record in records.iter_mut() {
        while cursor < candles.len() && candles[cursor].open_time <= record.hour {
            latest = Some(&candles[cursor]);
            cursor += 1;
        }

        if let Some(candle) = latest {
            if record.hour - candle.open_time <= CANDLE_TOLERANCE_MS {
                *record = record.clone().with_candle(candle);
            }
        }
    }

    records
}
