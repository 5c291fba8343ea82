//! Shared utility functions.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Read a header as a trimmed string, ignoring non-UTF-8 and empty values.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Format a Unix timestamp for people (e.g., "15/01/2025 14:30 UTC").
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%d/%m/%Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "data desconhecida".to_string())
}

/// Format cents as "R$ 10,50".
pub fn format_brl(cents: i64) -> String {
    format!("R$ {},{:02}", cents / 100, (cents % 100).abs())
}
