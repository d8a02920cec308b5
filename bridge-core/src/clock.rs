//! Wall clock and timestamp conversions.
//!
//! Timestamps are carried as milliseconds since the Unix epoch. Strings are
//! read and written as RFC 3339.

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Get the current timestamp in milliseconds since epoch.
#[must_use]
#[cfg(not(all(feature = "wasm", target_arch = "wasm32")))]
#[allow(clippy::cast_possible_truncation)] // Timestamps won't exceed i64 for millions of years
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Get the current timestamp in milliseconds since epoch.
#[must_use]
#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
#[allow(clippy::cast_possible_truncation)]
pub fn now_millis() -> i64 {
    js_sys::Date::now() as i64
}

/// Read a JSON value as epoch milliseconds.
///
/// Accepts finite numbers, numeric strings and RFC 3339 strings.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn millis_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64)),
        Value::String(s) => parse_millis(s),
        _ => None,
    }
}

/// Parse a numeric or RFC 3339 string as epoch milliseconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_millis(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(millis) = text.parse::<i64>() {
        return Some(millis);
    }
    OffsetDateTime::parse(text, &Rfc3339)
        .ok()
        .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Format epoch milliseconds as an RFC 3339 string.
#[must_use]
pub fn format_millis(millis: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_now_is_positive() {
        assert!(now_millis() > 0);
    }

    #[test]
    fn test_millis_from_value() {
        assert_eq!(millis_from_value(&json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
        assert_eq!(millis_from_value(&json!(12.9)), Some(12));
        assert_eq!(millis_from_value(&json!("1500")), Some(1500));
        assert_eq!(
            millis_from_value(&json!("1970-01-01T00:00:01Z")),
            Some(1000)
        );
        assert_eq!(millis_from_value(&json!("yesterday")), None);
        assert_eq!(millis_from_value(&json!(true)), None);
        assert_eq!(millis_from_value(&Value::Null), None);
    }

    #[test]
    fn test_format_round_trip() {
        let formatted = format_millis(1_000).expect("should format");
        assert_eq!(formatted, "1970-01-01T00:00:01Z");
        assert_eq!(parse_millis(&formatted), Some(1_000));
    }
}
