//! Setup field endpoints: batch writes, external pushes, layout and
//! readiness.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;
use crate::params::setup_fields::{
    get_setup_layout, get_setup_readiness, write_setup_fields, FieldUpdate, FieldWriteResult,
    SetupLayout, SetupReadiness,
};
use crate::parser::coerce_datetime_value;
use crate::types::FieldSource;

use super::error::ApiResult;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SetupFieldUpdateRequest {
    pub field_id: String,
    pub value: JsonValue,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub ts: Option<JsonValue>,
    #[serde(default)]
    pub timestamp: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct SetupFieldPatchRequest {
    #[serde(default)]
    pub updates: Vec<SetupFieldUpdateRequest>,
}

#[derive(Debug, Serialize)]
pub struct SetupFieldPatchResponse {
    pub results: Vec<FieldWriteResult>,
}

fn to_field_update(
    request: SetupFieldUpdateRequest,
    default_source: FieldSource,
) -> Result<FieldUpdate, DomainError> {
    let source = match request.source.as_deref() {
        None => default_source,
        Some(raw) => FieldSource::parse(raw)?,
    };
    let event_ts = request
        .ts
        .as_ref()
        .or(request.timestamp.as_ref())
        .and_then(coerce_datetime_value);
    Ok(FieldUpdate {
        field_id: request.field_id,
        value: request.value,
        source,
        event_ts,
    })
}

/// POST /api/setup/fields — batch field writes (UI surface).
pub async fn patch_setup_fields(
    State(state): State<AppState>,
    Json(request): Json<SetupFieldPatchRequest>,
) -> ApiResult<Json<SetupFieldPatchResponse>> {
    let updates = request
        .updates
        .into_iter()
        .map(|update| to_field_update(update, FieldSource::Ui))
        .collect::<Result<Vec<_>, _>>()?;
    let results = write_setup_fields(&state.pool, updates).await?;
    Ok(Json(SetupFieldPatchResponse { results }))
}

#[derive(Debug, Deserialize)]
pub struct SetupSetRequest {
    pub value: JsonValue,
    #[serde(default)]
    pub ts: Option<JsonValue>,
    #[serde(default)]
    pub timestamp: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct SetupSetResponse {
    pub accepted: bool,
    pub field_id: String,
    pub status: String,
    pub error: Option<String>,
}

/// PUT /eos/set/{path} — external field push. The path is the field id;
/// the write is recorded with source `http`, arming the override window.
pub async fn put_setup_field(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(request): Json<SetupSetRequest>,
) -> ApiResult<Json<SetupSetResponse>> {
    let field_id = path.trim_matches('/').replace('/', ".");
    if field_id.is_empty() {
        return Err(DomainError::validation("field path is required").into());
    }

    let event_ts = request
        .ts
        .as_ref()
        .or(request.timestamp.as_ref())
        .and_then(coerce_datetime_value);

    let results = write_setup_fields(
        &state.pool,
        vec![FieldUpdate {
            field_id: field_id.clone(),
            value: request.value,
            source: FieldSource::Http,
            event_ts,
        }],
    )
    .await?;

    let result = results
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::Fatal("field write produced no result".to_string()))?;
    Ok(Json(SetupSetResponse {
        accepted: result.status == "saved",
        field_id,
        status: result.status,
        error: result.error,
    }))
}

/// GET /api/setup/layout
pub async fn get_layout(State(state): State<AppState>) -> ApiResult<Json<SetupLayout>> {
    let layout = get_setup_layout(&state.pool, &state.config).await?;
    Ok(Json(layout))
}

/// GET /api/setup/readiness
pub async fn get_readiness(State(state): State<AppState>) -> ApiResult<Json<SetupReadiness>> {
    let readiness = get_setup_readiness(&state.pool, &state.config).await?;
    Ok(Json(readiness))
}
