//! Inbound ingest endpoints (202 on accept).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::DomainError;
use crate::ingest::channels::{get_input_channel_by_code, resolve_http_channel};
use crate::ingest::InputIngestResult;
use crate::parser::coerce_datetime_str;
use crate::types::InputChannel;

use super::error::ApiResult;
use super::{extract_client_id, repeated_query_values, AppState};

fn parse_explicit_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DomainError> {
    match raw {
        None => Ok(None),
        Some(raw) => coerce_datetime_str(&raw)
            .map(Some)
            .ok_or_else(|| DomainError::validation(format!("invalid timestamp value: {raw}"))),
    }
}

/// Channel resolution for path-style ingest: a first segment naming an
/// enabled HTTP channel wins; everything else lands on the default HTTP
/// channel.
async fn resolve_channel_and_key_path(
    state: &AppState,
    channel_or_path: &str,
) -> Result<(InputChannel, String), DomainError> {
    let path_value = channel_or_path.trim_matches('/');
    if path_value.is_empty() {
        return Err(DomainError::validation("input key is required"));
    }

    let parts: Vec<&str> = path_value.split('/').collect();
    if parts.len() >= 2 {
        if let Some(candidate) = get_input_channel_by_code(&state.pool, parts[0]).await? {
            if candidate.is_http() {
                if !candidate.enabled {
                    return Err(DomainError::conflict(format!(
                        "HTTP channel '{}' is disabled",
                        parts[0]
                    )));
                }
                return Ok((candidate, parts[1..].join("/")));
            }
        }
    }

    let channel = resolve_http_channel(&state.pool, None).await?;
    Ok((channel, path_value.to_string()))
}

/// `key=value` embedded in the path wins over the `value` query arg.
fn extract_key_value(key_path: &str, query_value: Option<String>) -> Result<(String, String), DomainError> {
    if let Some((key, value)) = key_path.split_once('=') {
        let key = key.trim();
        if key.is_empty() {
            return Err(DomainError::validation("input key is empty"));
        }
        return Ok((key.to_string(), value.to_string()));
    }

    let value = query_value.ok_or_else(|| {
        DomainError::validation("value query parameter is required when path does not contain '=value'")
    })?;
    let key = key_path.trim();
    if key.is_empty() {
        return Err(DomainError::validation("input key is empty"));
    }
    Ok((key.to_string(), value))
}

/// GET /eos/input/{channel_or_path}
pub async fn ingest_http_get(
    State(state): State<AppState>,
    Path(channel_or_path): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<(StatusCode, Json<InputIngestResult>)> {
    let raw = raw_query.as_deref();
    let query_value = repeated_query_values(raw, "value").into_iter().next();
    let ts_raw = repeated_query_values(raw, "ts")
        .into_iter()
        .next()
        .or_else(|| repeated_query_values(raw, "timestamp").into_iter().next());

    let (channel, key_path) = resolve_channel_and_key_path(&state, &channel_or_path).await?;
    let (key, payload_text) = extract_key_value(&key_path, query_value)?;
    let explicit_ts = parse_explicit_ts(ts_raw)?;

    let metadata = serde_json::json!({
        "source": "http",
        "method": "GET",
        "remote_addr": extract_client_id(&headers, connect_info.as_ref()),
        "path": format!("/eos/input/{channel_or_path}"),
    });

    let result = state
        .ingest
        .ingest(&channel, &key, &payload_text, Utc::now(), metadata, explicit_ts)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct HttpInputPushRequest {
    pub channel_code: Option<String>,
    pub input_key: String,
    pub value: Option<JsonValue>,
    pub payload: Option<JsonValue>,
    pub ts: Option<JsonValue>,
    pub timestamp: Option<JsonValue>,
}

fn coerce_ts_field(value: Option<&JsonValue>) -> Result<Option<DateTime<Utc>>, DomainError> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => crate::parser::coerce_datetime_value(value)
            .map(Some)
            .ok_or_else(|| DomainError::validation(format!("invalid timestamp value: {value}"))),
    }
}

/// POST /api/input/http/push
pub async fn ingest_http_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<HttpInputPushRequest>,
) -> ApiResult<(StatusCode, Json<InputIngestResult>)> {
    let input_key = request.input_key.trim().to_string();
    if input_key.is_empty() {
        return Err(DomainError::validation("input_key is required").into());
    }

    let channel_code = request
        .channel_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());
    let channel = resolve_http_channel(&state.pool, channel_code).await?;

    let payload_text = match (&request.payload, &request.value) {
        (Some(payload), _) => serde_json::to_string(payload)
            .map_err(|e| DomainError::validation(format!("unserializable payload: {e}")))?,
        (None, Some(JsonValue::String(text))) => text.clone(),
        (None, Some(value)) => serde_json::to_string(value)
            .map_err(|e| DomainError::validation(format!("unserializable value: {e}")))?,
        (None, None) => {
            return Err(DomainError::validation("Provide either payload or value").into());
        }
    };

    let explicit_ts = coerce_ts_field(request.ts.as_ref().or(request.timestamp.as_ref()))?;

    let metadata = serde_json::json!({
        "source": "http",
        "method": "POST",
        "remote_addr": extract_client_id(&headers, connect_info.as_ref()),
    });

    let result = state
        .ingest
        .ingest(&channel, &input_key, &payload_text, Utc::now(), metadata, explicit_ts)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_path_form() {
        let (key, value) = extract_key_value("house_load_w=1234", None).unwrap();
        assert_eq!(key, "house_load_w");
        assert_eq!(value, "1234");
    }

    #[test]
    fn query_value_form_requires_value() {
        let (key, value) =
            extract_key_value("house_load_w", Some("1234".to_string())).unwrap();
        assert_eq!(key, "house_load_w");
        assert_eq!(value, "1234");
        assert!(extract_key_value("house_load_w", None).is_err());
        assert!(extract_key_value("=5", None).is_err());
    }
}
