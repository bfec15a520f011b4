//! Signal backbone, power and EMR read endpoints.

use axum::extract::{RawQuery, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::backbone::{self, DataPipelineStatus};
use crate::emr;
use crate::error::DomainError;
use crate::parser::coerce_datetime_str;
use crate::types::signals::{SignalLatestItem, SignalSeriesPoint};
use crate::types::Resolution;

use super::error::ApiResult;
use super::{repeated_query_values, AppState};

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(500).clamp(1, 5000)
}

fn parse_ts(raw: Option<&str>, label: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
    match raw {
        None => Ok(None),
        Some(raw) => coerce_datetime_str(raw)
            .map(Some)
            .ok_or_else(|| DomainError::validation(format!("invalid '{label}' timestamp: {raw}"))),
    }
}

/// Default series window: the last 24 hours.
fn resolve_window(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), DomainError> {
    let to_value = to.unwrap_or_else(Utc::now);
    let from_value = from.unwrap_or_else(|| to_value - Duration::hours(24));
    if from_value >= to_value {
        return Err(DomainError::validation("'from' must be before 'to'"));
    }
    Ok((from_value, to_value))
}

fn single_query_value(raw_query: Option<&str>, name: &str) -> Option<String> {
    repeated_query_values(raw_query, name).into_iter().next()
}

pub async fn get_signals(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<Vec<SignalLatestItem>>> {
    let limit = single_query_value(raw_query.as_deref(), "limit")
        .and_then(|value| value.parse::<i64>().ok());
    let rows = backbone::list_signals_with_latest(&state.pool, clamp_limit(limit)).await?;
    Ok(Json(rows))
}

pub async fn get_latest(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<Vec<SignalLatestItem>>> {
    let keys = repeated_query_values(raw_query.as_deref(), "signal_key");
    let limit = single_query_value(raw_query.as_deref(), "limit")
        .and_then(|value| value.parse::<i64>().ok());
    let rows =
        backbone::list_latest_by_signal_keys(&state.pool, &keys, clamp_limit(limit)).await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub signal_key: String,
    pub resolution: String,
    pub points: Vec<SignalSeriesPoint>,
}

pub async fn get_series(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<SeriesResponse>> {
    let raw = raw_query.as_deref();
    let signal_key = single_query_value(raw, "signal_key")
        .ok_or_else(|| DomainError::validation("signal_key is required"))?;
    let resolution =
        Resolution::parse(&single_query_value(raw, "resolution").unwrap_or_else(|| "raw".into()))?;
    let from = parse_ts(single_query_value(raw, "from").as_deref(), "from")?;
    let to = parse_ts(single_query_value(raw, "to").as_deref(), "to")?;
    let (from_value, to_value) = resolve_window(from, to)?;

    let series =
        backbone::fetch_signal_series(&state.pool, &signal_key, from_value, to_value, resolution)
            .await?;
    Ok(Json(SeriesResponse {
        signal_key: series.signal_key,
        resolution: series.resolution.as_str().to_string(),
        points: series.points,
    }))
}

pub async fn get_retention_status(
    State(state): State<AppState>,
) -> ApiResult<Json<DataPipelineStatus>> {
    let status = backbone::get_data_pipeline_status(&state.pool).await?;
    Ok(Json(status))
}

pub async fn get_power_latest(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<Vec<emr::PowerSamplePoint>>> {
    let mut keys = repeated_query_values(raw_query.as_deref(), "key");
    if keys.is_empty() {
        keys = emr::POWER_KEYS.iter().map(|key| key.to_string()).collect();
    }
    let rows = emr::get_latest_power_samples(&state.pool, &keys).await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
pub struct PowerSeriesResponse {
    pub key: String,
    pub points: Vec<emr::PowerSamplePoint>,
}

pub async fn get_power_series(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<PowerSeriesResponse>> {
    let raw = raw_query.as_deref();
    let key = single_query_value(raw, "key")
        .ok_or_else(|| DomainError::validation("key is required"))?;
    let from = parse_ts(single_query_value(raw, "from").as_deref(), "from")?;
    let to = parse_ts(single_query_value(raw, "to").as_deref(), "to")?;
    let (from_value, to_value) = resolve_window(from, to)?;

    let points = emr::get_power_series(&state.pool, &key, from_value, to_value).await?;
    Ok(Json(PowerSeriesResponse { key, points }))
}

pub async fn get_emr_latest(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<Vec<emr::EmrPoint>>> {
    let mut keys = repeated_query_values(raw_query.as_deref(), "emr_key");
    if keys.is_empty() {
        keys = emr::emr_keys().iter().map(|key| key.to_string()).collect();
    }
    let rows = emr::get_latest_emr_values(&state.pool, &keys).await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
pub struct EmrSeriesResponse {
    pub emr_key: String,
    pub points: Vec<emr::EmrPoint>,
}

pub async fn get_emr_series(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<EmrSeriesResponse>> {
    let raw = raw_query.as_deref();
    let emr_key = single_query_value(raw, "emr_key")
        .ok_or_else(|| DomainError::validation("emr_key is required"))?;
    let from = parse_ts(single_query_value(raw, "from").as_deref(), "from")?;
    let to = parse_ts(single_query_value(raw, "to").as_deref(), "to")?;
    let (from_value, to_value) = resolve_window(from, to)?;

    let points = emr::get_emr_series(&state.pool, &emr_key, from_value, to_value).await?;
    Ok(Json(EmrSeriesResponse { emr_key, points }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn inverted_range_is_a_validation_error() {
        let from = Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        assert!(matches!(
            resolve_window(Some(from), Some(to)),
            Err(DomainError::Validation(_))
        ));
        assert!(resolve_window(Some(to), Some(from)).is_ok());
    }

    #[test]
    fn missing_bounds_default_to_last_24_hours() {
        let (from, to) = resolve_window(None, None).unwrap();
        assert_eq!(to - from, Duration::hours(24));
    }

    #[test]
    fn limits_clamp_into_contract_range() {
        assert_eq!(clamp_limit(None), 500);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), 5000);
    }
}
