//! Run lifecycle and runtime status endpoints.

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;
use crate::jobs::measurement_sync::{last_sync_run, run_measurement_sync, SyncTrigger};
use crate::orchestrator::eos_client::RefreshScope;
use crate::orchestrator::{
    self, get_artifact_payload, get_run, list_plan_instructions, CollectorStatus,
};
use crate::prefs::{self, PREF_AUTO_RUN_PRESET, PREF_MEASUREMENT_SYNC_ENABLED};
use crate::types::{ArtifactType, PlanInstruction, RunRecord};

use super::error::ApiResult;
use super::{repeated_query_values, AppState};

/// GET /api/eos/runs
pub async fn list_runs(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> ApiResult<Json<Vec<RunRecord>>> {
    let limit = repeated_query_values(raw_query.as_deref(), "limit")
        .into_iter()
        .next()
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(50)
        .clamp(1, 500);
    let runs = orchestrator::list_runs(&state.pool, limit).await?;
    Ok(Json(runs))
}

/// GET /api/eos/runs/:run_id
pub async fn get_run_detail(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> ApiResult<Json<RunRecord>> {
    let run = get_run(&state.pool, run_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("run {run_id} not found")))?;
    Ok(Json(run))
}

#[derive(Debug, Serialize)]
pub struct RunPlanResponse {
    pub run_id: i64,
    pub payload_json: Option<JsonValue>,
    pub instructions: Vec<PlanInstruction>,
}

/// GET /api/eos/runs/:run_id/plan
pub async fn get_run_plan(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> ApiResult<Json<RunPlanResponse>> {
    get_run(&state.pool, run_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("run {run_id} not found")))?;
    let payload_json = get_artifact_payload(&state.pool, run_id, ArtifactType::Plan).await?;
    let instructions = list_plan_instructions(&state.pool, run_id).await?;
    Ok(Json(RunPlanResponse { run_id, payload_json, instructions }))
}

#[derive(Debug, Serialize)]
pub struct RunSolutionResponse {
    pub run_id: i64,
    pub payload_json: Option<JsonValue>,
}

/// GET /api/eos/runs/:run_id/solution
pub async fn get_run_solution(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> ApiResult<Json<RunSolutionResponse>> {
    get_run(&state.pool, run_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("run {run_id} not found")))?;
    let payload_json = get_artifact_payload(&state.pool, run_id, ArtifactType::Solution).await?;
    Ok(Json(RunSolutionResponse { run_id, payload_json }))
}

#[derive(Debug, Serialize)]
pub struct ForceRunResponse {
    pub run_id: i64,
    pub status: String,
    pub message: String,
}

/// POST /api/eos/force-run — 409 `force_run_in_progress` while a run is
/// active.
pub async fn force_run(State(state): State<AppState>) -> ApiResult<Json<ForceRunResponse>> {
    let run_id = state.orchestrator.force_run().await?;
    Ok(Json(ForceRunResponse {
        run_id,
        status: "succeeded".to_string(),
        message: "optimization run completed".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub scope: String,
    pub status: String,
    pub summary: JsonValue,
}

/// POST /api/eos/predictions/refresh
pub async fn refresh_predictions(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<(StatusCode, Json<RefreshResponse>)> {
    let scope = RefreshScope::parse(request.scope.as_deref().unwrap_or("all"))?;
    let summary = state.orchestrator.refresh_predictions(scope, None).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            scope: scope.as_str().to_string(),
            status: "ok".to_string(),
            summary,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct RuntimeStatusResponse {
    pub eos_base_url: String,
    pub collector: CollectorStatus,
    pub workers: JsonValue,
}

/// GET /api/eos/status
pub async fn get_runtime_status(
    State(state): State<AppState>,
) -> ApiResult<Json<RuntimeStatusResponse>> {
    let collector = state.orchestrator.status_snapshot().await;
    let data_pipeline = state.supervisor.data_pipeline.lock().await.clone();
    let scheduler = state.supervisor.scheduler.lock().await.clone();
    let measurement_sync = state.supervisor.measurement_sync.lock().await.clone();
    Ok(Json(RuntimeStatusResponse {
        eos_base_url: state.config.eos_base_url.clone(),
        collector,
        workers: serde_json::json!({
            "data_pipeline": data_pipeline,
            "scheduler": scheduler,
            "measurement_sync": measurement_sync,
        }),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AutoRunRequest {
    pub preset: String,
}

#[derive(Debug, Serialize)]
pub struct AutoRunResponse {
    pub preset: String,
}

/// POST /api/eos/auto-run — persist the auto-run preset and refresh the
/// worker snapshot.
pub async fn set_auto_run(
    State(state): State<AppState>,
    Json(request): Json<AutoRunRequest>,
) -> ApiResult<Json<AutoRunResponse>> {
    if !matches!(request.preset.as_str(), "off" | "15m" | "30m" | "60m") {
        return Err(DomainError::validation(format!(
            "unknown preset '{}' (expected off|15m|30m|60m)",
            request.preset
        ))
        .into());
    }
    prefs::set_preference(
        &state.pool,
        PREF_AUTO_RUN_PRESET,
        &serde_json::json!(request.preset),
    )
    .await?;
    state.prefs.refresh(&state.pool).await?;
    Ok(Json(AutoRunResponse { preset: request.preset }))
}

#[derive(Debug, Serialize)]
pub struct MeasurementSyncStatusResponse {
    pub enabled: bool,
    pub last_run: Option<JsonValue>,
    pub worker: JsonValue,
}

/// GET /api/eos/measurement-sync/status
pub async fn get_measurement_sync_status(
    State(state): State<AppState>,
) -> ApiResult<Json<MeasurementSyncStatusResponse>> {
    let enabled = state.config.eos_measurement_sync_enabled
        && state.prefs.load().measurement_sync_enabled;
    let last_run = last_sync_run(&state.pool).await?;
    let worker = state.supervisor.measurement_sync.lock().await.clone();
    Ok(Json(MeasurementSyncStatusResponse {
        enabled,
        last_run,
        worker: serde_json::to_value(worker).unwrap_or_default(),
    }))
}

#[derive(Debug, Serialize)]
pub struct MeasurementSyncForceResponse {
    pub run_id: i64,
    pub status: String,
}

/// POST /api/eos/measurement-sync/force
pub async fn force_measurement_sync(
    State(state): State<AppState>,
) -> ApiResult<Json<MeasurementSyncForceResponse>> {
    let client = state.orchestrator.client();
    let outcome = run_measurement_sync(&state.pool, &client, SyncTrigger::Force).await?;
    Ok(Json(MeasurementSyncForceResponse {
        run_id: outcome.run_id,
        status: outcome.status,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MeasurementSyncToggleRequest {
    pub enabled: bool,
}

/// POST /api/eos/measurement-sync/enabled — persist the sync toggle.
pub async fn set_measurement_sync_enabled(
    State(state): State<AppState>,
    Json(request): Json<MeasurementSyncToggleRequest>,
) -> ApiResult<Json<MeasurementSyncStatusResponse>> {
    prefs::set_preference(
        &state.pool,
        PREF_MEASUREMENT_SYNC_ENABLED,
        &serde_json::json!(request.enabled),
    )
    .await?;
    state.prefs.refresh(&state.pool).await?;
    get_measurement_sync_status(State(state)).await
}
