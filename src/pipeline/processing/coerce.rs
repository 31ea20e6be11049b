//! Lenient coercion of client-supplied scalars.
//!
//! Trackers send everything as strings and not always well-formed ones.
//! These helpers never fail; callers pick the default.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

const UUID_LEN: usize = 36;

/// `"1"`/`"0"`/`"true"`/`"false"` (any case). Anything else is `None`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Non-negative integer, accepting a trailing fraction. Defaults to 0.
pub fn parse_count(raw: &str) -> u64 {
    let raw = raw.trim();
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
        .unwrap_or(0)
}

/// Parses a UUID, truncating over-long input first. Unparsable values are
/// logged and dropped.
pub fn parse_uuid(field: &str, raw: &str) -> Option<Uuid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let candidate: String = raw.chars().take(UUID_LEN).collect();
    match Uuid::parse_str(&candidate) {
        Ok(uuid) => Some(uuid),
        Err(e) => {
            warn!("Malformed UUID in '{}': {} ({})", field, raw, e);
            None
        }
    }
}

/// Epoch milliseconds, RFC 3339, or a naive ISO-8601 timestamp read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(millis) = raw.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    if let Ok(millis) = raw.parse::<f64>() {
        return Utc.timestamp_millis_opt(millis as i64).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Percent-decodes a URL a second time; trackers sometimes double-encode.
pub fn decode_url(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Text form of a scalar JSON value.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
