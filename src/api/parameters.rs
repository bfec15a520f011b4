//! Parameter profile endpoints: draft updates, validation, apply.

use axum::extract::{RawQuery, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;
use crate::params::{self, catalog, profiles};
use crate::types::{ProfileRevision, RevisionSource};

use super::error::ApiResult;
use super::{repeated_query_values, AppState};

#[derive(Debug, Serialize)]
pub struct ProfileDetailResponse {
    pub profile: profiles::ParameterProfile,
    pub current_draft: Option<ProfileRevision>,
    pub last_applied: Option<ProfileRevision>,
    pub revisions: Vec<ProfileRevision>,
}

/// GET /api/parameters/profile
pub async fn get_profile_detail(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<ProfileDetailResponse>> {
    let limit = repeated_query_values(raw_query.as_deref(), "limit")
        .into_iter()
        .next()
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(30)
        .clamp(1, 200);

    let profile = profiles::get_active_profile(&state.pool)
        .await?
        .ok_or_else(|| DomainError::unavailable("no active parameter profile"))?;
    let current_draft = profiles::get_current_draft_revision(&state.pool, profile.id).await?;
    let last_applied = profiles::get_last_applied_revision(&state.pool, profile.id).await?;
    let revisions = profiles::list_revisions(&state.pool, profile.id, limit).await?;

    Ok(Json(ProfileDetailResponse {
        profile,
        current_draft,
        last_applied,
        revisions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DraftUpdateRequest {
    pub payload_json: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct DraftUpdateResponse {
    pub revision: ProfileRevision,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// PUT /api/parameters/draft — validate and store a new draft revision.
pub async fn update_draft(
    State(state): State<AppState>,
    Json(request): Json<DraftUpdateRequest>,
) -> ApiResult<Json<DraftUpdateResponse>> {
    let (revision, outcome) =
        params::update_draft(&state.pool, request.payload_json, RevisionSource::Manual).await?;
    Ok(Json(DraftUpdateResponse {
        revision,
        valid: outcome.valid,
        errors: outcome.errors,
        warnings: outcome.warnings,
    }))
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub normalized_payload: JsonValue,
}

/// POST /api/parameters/validate — pure validation, nothing persisted.
pub async fn validate_payload(
    Json(payload): Json<JsonValue>,
) -> ApiResult<Json<ValidateResponse>> {
    let outcome = params::validate_payload(&payload, &catalog::dynamic_parameter_catalog());
    Ok(Json(ValidateResponse {
        valid: outcome.valid,
        errors: outcome.errors,
        warnings: outcome.warnings,
        normalized_payload: outcome.normalized_payload,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub revision_id: Option<i64>,
}

/// POST /api/parameters/apply — apply a revision (default: the current
/// draft). Validation failures surface as 400 with the reasons.
pub async fn apply_revision(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> ApiResult<Json<ProfileRevision>> {
    let revision_id = match request.revision_id {
        Some(revision_id) => revision_id,
        None => {
            let profile = profiles::get_active_profile(&state.pool)
                .await?
                .ok_or_else(|| DomainError::unavailable("no active parameter profile"))?;
            profiles::get_current_draft_revision(&state.pool, profile.id)
                .await?
                .map(|revision| revision.id)
                .ok_or_else(|| DomainError::not_found("no current draft revision"))?
        }
    };
    let revision = params::apply_revision(&state.pool, revision_id).await?;
    Ok(Json(revision))
}

/// GET /api/parameters/catalog — the dynamic parameter catalog.
pub async fn get_catalog() -> Json<Vec<catalog::DynamicParameterEntry>> {
    Json(catalog::dynamic_parameter_catalog())
}
