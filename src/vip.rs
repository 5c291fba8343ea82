//! VIP entitlement math.
//!
//! An entitlement is a single expiry timestamp per subscriber. Paying while
//! still VIP stacks the new period on top of the remaining time; paying after
//! expiry starts a fresh window from now.

use serde::Serialize;

use crate::models::Subscriber;

pub const SECONDS_PER_DAY: i64 = 86400;

/// True when `expires_at` lies strictly in the future.
pub fn vip_active(expires_at: Option<i64>, now: i64) -> bool {
    matches!(expires_at, Some(exp) if exp > now)
}

/// New expiry after granting `days` more VIP time.
pub fn extend_expiry(current: Option<i64>, now: i64, days: i64) -> i64 {
    let base = current.map_or(now, |exp| exp.max(now));
    base + days * SECONDS_PER_DAY
}

#[derive(Debug, Clone, Serialize)]
pub struct VipStatus {
    pub subscriber: String,
    pub vip: bool,
    pub expires_at: Option<i64>,
    pub remaining_seconds: i64,
}

impl VipStatus {
    pub fn evaluate(subscriber: &str, record: Option<&Subscriber>, now: i64) -> Self {
        let expires_at = record.and_then(|s| s.vip_expires_at);
        let vip = vip_active(expires_at, now);
        Self {
            subscriber: subscriber.to_string(),
            vip,
            expires_at,
            remaining_seconds: match expires_at {
                Some(exp) if vip => exp - now,
                _ => 0,
            },
        }
    }
}
