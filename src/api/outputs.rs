//! Output signal bundle endpoints.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use crate::error::DomainError;
use crate::output::{record_bundle_fetch, render_loxone, resolve_output_bundle, OutputBundle};

use super::error::ApiResult;
use super::{extract_client_id, repeated_query_values, AppState};

fn parse_run_id(raw_query: Option<&str>) -> Result<Option<i64>, DomainError> {
    match repeated_query_values(raw_query, "run_id").into_iter().next() {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| DomainError::validation(format!("invalid run_id: {raw}"))),
    }
}

/// GET /api/eos/output-signals — internal view, no fetch accounting.
pub async fn get_output_signals(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<OutputBundle>> {
    let run_id = parse_run_id(raw_query.as_deref())?;
    let bundle = resolve_output_bundle(&state.pool, run_id).await?;
    Ok(Json(bundle))
}

/// GET /eos/get/outputs — the external pull surface. Every pull updates
/// per-signal fetch accounting.
pub async fn get_outputs_external(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<Response> {
    let raw = raw_query.as_deref();
    let run_id = parse_run_id(raw)?;
    let format = repeated_query_values(raw, "format")
        .into_iter()
        .next()
        .unwrap_or_else(|| "loxone".to_string());
    if format != "loxone" && format != "json" {
        return Err(DomainError::validation(format!(
            "unknown format '{format}' (expected loxone|json)"
        ))
        .into());
    }

    let client_id = extract_client_id(&headers, connect_info.as_ref());
    let mut bundle = resolve_output_bundle(&state.pool, run_id).await?;
    record_bundle_fetch(&state.pool, &mut bundle, client_id.as_deref()).await?;

    info!(
        client = client_id.as_deref().unwrap_or("-"),
        run_id = bundle.run_id,
        signal_count = bundle.signals.len(),
        "output signals pull"
    );

    if format == "json" {
        return Ok(Json(bundle).into_response());
    }

    let body = render_loxone(&bundle);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}
