//! Next funding time shown to clients
//!
//! The venue's advertised next funding time can be missing, stale or far in
//! the future. [`effective_next_funding`] turns it into a usable timestamp.

use crate::config::ScheduleConfig;
use crate::types::HOUR_MS;

/// Sanitised next funding time (ms).
///
/// - absent: the next interval boundary after `now_ms`
/// - older than `stale_grace_ms`: rolled forward by whole intervals past `now_ms`
/// - more than `max_lead_ms` ahead: clamped to the next boundary
pub fn effective_next_funding(raw: Option<i64>, now_ms: i64, policy: &ScheduleConfig) -> i64 {
    let interval = if policy.interval_ms > 0 {
        policy.interval_ms
    } else {
        HOUR_MS
    };
    let next_boundary = now_ms - now_ms.rem_euclid(interval) + interval;

    let Some(mut next) = raw else {
        return next_boundary;
    };
    if next < now_ms - policy.stale_grace_ms {
        let behind = (now_ms - next) / interval + 1;
        next += behind * interval;
    }
    if next > now_ms + policy.max_lead_ms {
        return next_boundary;
    }
    next
}
