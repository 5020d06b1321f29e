//! Freshness timestamps carried in client payloads.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Parse a client timestamp into unix milliseconds.
///
/// Accepts RFC 3339, ISO-8601 without an offset (read as UTC), a bare
/// `YYYY-MM-DD` date (UTC midnight), or a JSON number of epoch milliseconds.
/// Missing or unparseable values are [`UNKNOWN_FRESHNESS`], older than any
/// real timestamp, pre-1970 dates included.
#[allow(clippy::cast_possible_truncation)] // fractional epoch millis
pub fn freshness_millis(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::String(raw)) => parse_text(raw.trim()).unwrap_or(UNKNOWN_FRESHNESS),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .unwrap_or(UNKNOWN_FRESHNESS),
        _ => UNKNOWN_FRESHNESS,
    }
}

/// Freshness of a record whose timestamp is missing or unreadable.
pub const UNKNOWN_FRESHNESS: i64 = i64::MIN;

fn parse_text(raw: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_rfc3339_with_offsets() {
        assert_eq!(
            freshness_millis(Some(&json!("2024-01-01T00:00:00Z"))),
            1_704_067_200_000
        );
        assert_eq!(
            freshness_millis(Some(&json!("2024-01-01T01:00:00+01:00"))),
            1_704_067_200_000
        );
        assert_eq!(
            freshness_millis(Some(&json!("2024-01-01T00:00:00.250Z"))),
            1_704_067_200_250
        );
    }

    #[test]
    fn offsetless_and_date_only_values_are_utc() {
        assert_eq!(
            freshness_millis(Some(&json!("2024-01-01T00:00:00"))),
            1_704_067_200_000
        );
        assert_eq!(
            freshness_millis(Some(&json!("2024-01-01"))),
            1_704_067_200_000
        );
    }

    #[test]
    fn numbers_are_epoch_millis() {
        assert_eq!(freshness_millis(Some(&json!(1_704_067_200_000_i64))), 1_704_067_200_000);
    }

    #[test]
    fn garbage_and_missing_values_are_oldest() {
        assert_eq!(freshness_millis(None), UNKNOWN_FRESHNESS);
        assert_eq!(freshness_millis(Some(&Value::Null)), UNKNOWN_FRESHNESS);
        assert_eq!(freshness_millis(Some(&json!("yesterday"))), UNKNOWN_FRESHNESS);
        assert_eq!(freshness_millis(Some(&json!({ "at": 1 }))), UNKNOWN_FRESHNESS);
    }

    #[test]
    fn pre_epoch_dates_outrank_unreadable_ones() {
        let pre_epoch = freshness_millis(Some(&json!("1969-07-20T20:17:00Z")));
        assert_eq!(pre_epoch, -14_182_980_000);
        assert!(pre_epoch > freshness_millis(Some(&json!("not a date"))));
        assert!(freshness_millis(Some(&json!(0))) > freshness_millis(None));
    }
}
