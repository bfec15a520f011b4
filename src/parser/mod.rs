//! Payload and timestamp parsing for inbound events
//!
//! Payloads arrive as raw text: bare scalars, JSON documents, or JSON
//! documents whose interesting value sits behind a dotted path. Everything
//! here is pure — structural failures log at warning level and resolve to
//! `None` / the fallback timestamp, never to an error for the caller.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;
use tracing::warn;

/// Render a decoded JSON value the way downstream transforms expect it:
/// scalars as their bare string form, containers as compact JSON.
fn stringify(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Object(_) | JsonValue::Array(_) => {
            serde_json::to_string(value).ok()
        }
    }
}

fn parse_scalar_payload(raw_payload: &str) -> Option<String> {
    let stripped = raw_payload.trim();
    if stripped.is_empty() {
        return None;
    }

    match serde_json::from_str::<JsonValue>(stripped) {
        Ok(decoded) => stringify(&decoded),
        Err(_) => Some(stripped.to_string()),
    }
}

/// Walk a dot-chain of object keys. Missing key or a non-object mid-chain
/// resolves to `None`.
fn walk_path<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = root;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Extract the value of interest from a raw payload.
///
/// Without a path the payload is treated as a scalar (JSON decoded when it
/// parses, re-stringified). With a path the payload must be a JSON object;
/// the resolved value is stringified the same way.
pub fn parse_payload(raw_payload: &str, payload_path: Option<&str>) -> Option<String> {
    let path = match payload_path {
        None | Some("") => return parse_scalar_payload(raw_payload),
        Some(path) => path,
    };

    let decoded: JsonValue = match serde_json::from_str(raw_payload) {
        Ok(value) => value,
        Err(_) => {
            warn!(path = path, "payload_path is set but payload is not valid JSON");
            return None;
        }
    };

    match walk_path(&decoded, path) {
        Some(value) => stringify(value),
        None => {
            warn!(path = path, payload = raw_payload, "payload_path not found");
            None
        }
    }
}

/// Resolve the event timestamp from a payload, falling back to
/// `fallback_ts` (normalized to UTC) on any failure.
pub fn parse_event_timestamp(
    raw_payload: &str,
    timestamp_path: Option<&str>,
    fallback_ts: DateTime<Utc>,
) -> DateTime<Utc> {
    let path = match timestamp_path {
        None | Some("") => return fallback_ts,
        Some(path) => path,
    };

    let decoded: JsonValue = match serde_json::from_str(raw_payload) {
        Ok(value) => value,
        Err(_) => {
            warn!(path = path, "timestamp_path is set but payload is not valid JSON");
            return fallback_ts;
        }
    };

    let raw_value = match walk_path(&decoded, path) {
        Some(value) => value,
        None => {
            warn!(path = path, payload = raw_payload, "timestamp_path not found");
            return fallback_ts;
        }
    };

    match coerce_datetime_value(raw_value) {
        Some(parsed) => parsed,
        None => {
            warn!(path = path, value = %raw_value, "timestamp_path value is not a valid datetime");
            fallback_ts
        }
    }
}

/// Coerce a JSON value into a UTC datetime: numbers as epoch seconds or
/// milliseconds, strings as epoch numbers or ISO-8601.
pub fn coerce_datetime_value(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::Number(n) => epoch_to_datetime(n.as_f64()?),
        JsonValue::String(s) => coerce_datetime_str(s),
        _ => None,
    }
}

/// Coerce a raw string into a UTC datetime. Accepts epoch seconds, epoch
/// milliseconds (magnitude > 10^12), and ISO-8601 with or without an
/// offset; naive datetimes are assumed UTC.
pub fn coerce_datetime_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(numeric) = trimmed.parse::<f64>() {
        return epoch_to_datetime(numeric);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Naive datetime (no offset) — assume UTC.
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    None
}

/// Epoch-magnitude auto-detection: values beyond 10^12 are milliseconds.
fn epoch_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let seconds = if value.abs() > 1_000_000_000_000.0 {
        value / 1000.0
    } else {
        value
    };
    let millis = (seconds * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn scalar_payload_is_stripped() {
        assert_eq!(parse_payload("  1234 \n", None), Some("1234".to_string()));
        assert_eq!(parse_payload("", None), None);
        assert_eq!(parse_payload("   ", None), None);
    }

    #[test]
    fn scalar_json_payload_is_restringified() {
        assert_eq!(parse_payload("\"on\"", None), Some("on".to_string()));
        assert_eq!(parse_payload("true", None), Some("true".to_string()));
        assert_eq!(parse_payload("null", None), None);
    }

    #[test]
    fn dotted_path_walks_objects() {
        let payload = r#"{"meter":{"power":{"value":512.5}}}"#;
        assert_eq!(
            parse_payload(payload, Some("meter.power.value")),
            Some("512.5".to_string())
        );
    }

    #[test]
    fn dotted_path_missing_key_is_none() {
        let payload = r#"{"meter":{"power":1}}"#;
        assert_eq!(parse_payload(payload, Some("meter.energy")), None);
        // Non-object mid-chain
        assert_eq!(parse_payload(payload, Some("meter.power.value")), None);
    }

    #[test]
    fn dotted_path_container_value_is_compact_json() {
        let payload = r#"{"plan": {"a": 1, "b": [1, 2]}}"#;
        assert_eq!(
            parse_payload(payload, Some("plan")),
            Some(r#"{"a":1,"b":[1,2]}"#.to_string())
        );
    }

    #[test]
    fn path_on_non_json_payload_is_none() {
        assert_eq!(parse_payload("not json", Some("a.b")), None);
    }

    #[test]
    fn timestamp_iso_with_zulu() {
        let fallback = utc(2000, 1, 1, 0, 0, 0);
        let payload = r#"{"ts":"2026-02-21T14:00:00Z"}"#;
        assert_eq!(
            parse_event_timestamp(payload, Some("ts"), fallback),
            utc(2026, 2, 21, 14, 0, 0)
        );
    }

    #[test]
    fn timestamp_naive_is_utc() {
        let fallback = utc(2000, 1, 1, 0, 0, 0);
        let payload = r#"{"ts":"2026-02-21T14:00:00"}"#;
        assert_eq!(
            parse_event_timestamp(payload, Some("ts"), fallback),
            utc(2026, 2, 21, 14, 0, 0)
        );
    }

    #[test]
    fn timestamp_epoch_seconds_and_millis() {
        let fallback = utc(2000, 1, 1, 0, 0, 0);
        let expected = utc(2026, 2, 21, 14, 0, 0);
        let seconds = expected.timestamp();
        let payload_s = format!(r#"{{"ts":{seconds}}}"#);
        let payload_ms = format!(r#"{{"ts":{}}}"#, seconds * 1000);
        assert_eq!(parse_event_timestamp(&payload_s, Some("ts"), fallback), expected);
        assert_eq!(parse_event_timestamp(&payload_ms, Some("ts"), fallback), expected);
    }

    #[test]
    fn timestamp_failures_fall_back() {
        let fallback = utc(2026, 2, 21, 14, 0, 0);
        assert_eq!(
            parse_event_timestamp("not json", Some("ts"), fallback),
            fallback
        );
        assert_eq!(
            parse_event_timestamp(r#"{"ts":"garbage"}"#, Some("ts"), fallback),
            fallback
        );
        assert_eq!(parse_event_timestamp(r#"{"a":1}"#, None, fallback), fallback);
    }

    #[test]
    fn coerce_epoch_string() {
        let expected = utc(2026, 2, 21, 14, 0, 0);
        assert_eq!(
            coerce_datetime_str(&expected.timestamp().to_string()),
            Some(expected)
        );
        assert_eq!(coerce_datetime_str(""), None);
        assert_eq!(coerce_datetime_str("never"), None);
    }
}
