//! Orchestrator — aligned optimizer runs, artifact persistence, warm start
//!
//! A run snapshots its inputs (parameter payload, mappings, live state,
//! runtime config), assembles the optimizer payload with per-field HTTP
//! overrides, optionally pre-refreshes predictions (staging them through
//! the signal backbone under the prediction allowlist), invokes EOS with a
//! warm-start solution from the prior run, applies safety gates to the
//! returned plan, and persists everything under the run row. The run-state
//! machine enforces single-writer semantics: only one run may be `running`.

pub mod eos_client;
pub mod guards;
pub mod pv_fallback;
pub mod scheduler;
pub mod warm_start;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backbone::store::{ingest_signal_measurement, SignalIngest};
use crate::backbone::{self, PREDICTION_SIGNAL_ALLOWLIST};
use crate::config::AppConfig;
use crate::error::{DomainError, DomainResult};
use crate::ingest::mappings::list_enabled_mappings;
use crate::params::{profiles, setup_fields, validate::set_value_at_path};
use crate::parser::coerce_datetime_value;
use crate::types::{
    ArtifactType, PlanInstruction, QualityStatus, RunRecord, RunStatus, SignalValue, SourceType,
    TriggerSource,
};

use eos_client::{EosApi, RefreshScope};
use guards::{apply_no_grid_charge_guard, GuardEvent, InstructionDraft};
use warm_start::extract_start_solution;

// ─── Run repository ─────────────────────────────────────────────────────

const RUN_SELECT: &str = r#"
    SELECT id, trigger_source, run_mode, eos_last_run_datetime, status,
           started_at, finished_at, error_text, created_at
    FROM eos_runs
"#;

pub async fn get_run(pool: &PgPool, run_id: i64) -> DomainResult<Option<RunRecord>> {
    let query = format!("{RUN_SELECT} WHERE id = $1");
    Ok(sqlx::query_as::<_, RunRecord>(&query)
        .bind(run_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn list_runs(pool: &PgPool, limit: i64) -> DomainResult<Vec<RunRecord>> {
    let query = format!("{RUN_SELECT} ORDER BY created_at DESC, id DESC LIMIT $1");
    Ok(sqlx::query_as::<_, RunRecord>(&query)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}

pub async fn get_running_run(pool: &PgPool) -> DomainResult<Option<RunRecord>> {
    let query = format!("{RUN_SELECT} WHERE status = 'running' ORDER BY id DESC LIMIT 1");
    Ok(sqlx::query_as::<_, RunRecord>(&query)
        .fetch_optional(pool)
        .await?)
}

pub async fn latest_succeeded_run(pool: &PgPool) -> DomainResult<Option<RunRecord>> {
    let query = format!("{RUN_SELECT} WHERE status = 'succeeded' ORDER BY id DESC LIMIT 1");
    Ok(sqlx::query_as::<_, RunRecord>(&query)
        .fetch_optional(pool)
        .await?)
}

async fn open_run(pool: &PgPool, trigger: TriggerSource, run_mode: &str) -> DomainResult<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"INSERT INTO eos_runs (trigger_source, run_mode, status)
           VALUES ($1, $2, 'running')
           RETURNING id"#,
    )
    .bind(trigger.as_str())
    .bind(run_mode)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn close_run(
    pool: &PgPool,
    run_id: i64,
    status: RunStatus,
    eos_last_run_datetime: Option<DateTime<Utc>>,
    error_text: Option<&str>,
) -> DomainResult<()> {
    sqlx::query(
        r#"UPDATE eos_runs
           SET status = $2, finished_at = now(), eos_last_run_datetime = $3, error_text = $4
           WHERE id = $1"#,
    )
    .bind(run_id)
    .bind(status.as_str())
    .bind(eos_last_run_datetime)
    .bind(error_text)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_artifact(
    pool: &PgPool,
    run_id: i64,
    artifact_type: ArtifactType,
    artifact_key: &str,
    payload: &JsonValue,
) -> DomainResult<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"INSERT INTO eos_artifacts (run_id, artifact_type, artifact_key, payload_json)
           VALUES ($1, $2, $3, $4)
           RETURNING id"#,
    )
    .bind(run_id)
    .bind(artifact_type.as_str())
    .bind(artifact_key)
    .bind(payload)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get_artifact_payload(
    pool: &PgPool,
    run_id: i64,
    artifact_type: ArtifactType,
) -> DomainResult<Option<JsonValue>> {
    let row: Option<(JsonValue,)> = sqlx::query_as(
        r#"SELECT payload_json FROM eos_artifacts
           WHERE run_id = $1 AND artifact_type = $2
           ORDER BY id DESC LIMIT 1"#,
    )
    .bind(run_id)
    .bind(artifact_type.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(payload,)| payload))
}

pub async fn list_plan_instructions(
    pool: &PgPool,
    run_id: i64,
) -> DomainResult<Vec<PlanInstruction>> {
    let rows = sqlx::query_as::<_, PlanInstruction>(
        r#"SELECT id, run_id, plan_id, instruction_index, instruction_type, resource_id,
                  actuator_id, starts_at, ends_at, execution_time, operation_mode_id,
                  operation_mode_factor, payload_json, created_at
           FROM eos_plan_instructions
           WHERE run_id = $1
           ORDER BY instruction_index ASC, id ASC"#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─── Collector status ───────────────────────────────────────────────────

/// Live status of the orchestrator, exposed by the runtime API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorStatus {
    pub running: bool,
    pub force_run_in_progress: bool,
    pub last_force_request_ts: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub auto_run_preset: String,
    pub aligned_scheduler_enabled: bool,
    pub aligned_scheduler_minutes: String,
    pub aligned_scheduler_delay_seconds: u32,
    pub aligned_scheduler_next_due_ts: Option<DateTime<Utc>>,
    pub aligned_scheduler_last_trigger_ts: Option<DateTime<Utc>>,
    pub aligned_scheduler_last_skip_reason: Option<String>,
    pub last_observed_eos_run_datetime: Option<DateTime<Utc>>,
}

// ─── Plan parsing ───────────────────────────────────────────────────────

/// Parse the optimizer response into plan instruction drafts.
/// Accepts `{plan: {instructions: [...]}}` or a top-level `instructions`
/// array; unknown fields stay in the per-instruction payload.
pub fn parse_plan_instructions(response: &JsonValue) -> Vec<InstructionDraft> {
    let instructions = response
        .get("plan")
        .and_then(|plan| plan.get("instructions"))
        .or_else(|| response.get("instructions"))
        .and_then(JsonValue::as_array);

    let Some(instructions) = instructions else {
        return Vec::new();
    };

    instructions
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let text = |key: &str| raw.get(key).and_then(JsonValue::as_str).map(str::to_string);
            let time = |key: &str| raw.get(key).and_then(coerce_datetime_value);
            InstructionDraft {
                instruction_index: raw
                    .get("instruction_index")
                    .and_then(JsonValue::as_i64)
                    .unwrap_or(index as i64),
                instruction_type: text("instruction_type")
                    .or_else(|| text("type"))
                    .unwrap_or_else(|| "unknown".to_string()),
                resource_id: text("resource_id"),
                actuator_id: text("actuator_id"),
                starts_at: time("starts_at"),
                ends_at: time("ends_at"),
                execution_time: time("execution_time"),
                operation_mode_id: text("operation_mode_id"),
                operation_mode_factor: raw
                    .get("operation_mode_factor")
                    .and_then(JsonValue::as_f64),
                payload_json: raw.clone(),
            }
        })
        .collect()
}

/// Expand a prediction list into `(ts, value)` points. Entries may be
/// objects carrying their own timestamps or bare numbers on an hourly
/// index anchored at the current hour.
pub fn prediction_points(entries: &[JsonValue], anchor: DateTime<Utc>) -> Vec<(DateTime<Utc>, f64)> {
    let hour_anchor = anchor
        .with_minute(0)
        .and_then(|ts| ts.with_second(0))
        .and_then(|ts| ts.with_nanosecond(0))
        .unwrap_or(anchor);

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match entry {
            JsonValue::Number(number) => number
                .as_f64()
                .map(|value| (hour_anchor + Duration::hours(index as i64), value)),
            JsonValue::Object(object) => {
                let ts = object
                    .get("date_time")
                    .or_else(|| object.get("ts"))
                    .and_then(coerce_datetime_value)?;
                let value = object.get("value").and_then(JsonValue::as_f64)?;
                Some((ts, value))
            }
            _ => None,
        })
        .collect()
}

// ─── Orchestrator service ───────────────────────────────────────────────

#[derive(Clone)]
pub struct Orchestrator {
    pool: PgPool,
    config: AppConfig,
    client: Arc<dyn EosApi>,
    status: Arc<Mutex<CollectorStatus>>,
}

impl Orchestrator {
    pub fn new(pool: PgPool, config: AppConfig, client: Arc<dyn EosApi>) -> Self {
        let status = CollectorStatus {
            aligned_scheduler_enabled: config.eos_aligned_scheduler_enabled,
            aligned_scheduler_minutes: config.eos_aligned_scheduler_minutes.clone(),
            aligned_scheduler_delay_seconds: config.eos_aligned_scheduler_delay_seconds,
            auto_run_preset: "off".to_string(),
            ..CollectorStatus::default()
        };
        Self {
            pool,
            config,
            client,
            status: Arc::new(Mutex::new(status)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self) -> Arc<dyn EosApi> {
        Arc::clone(&self.client)
    }

    pub async fn status_snapshot(&self) -> CollectorStatus {
        self.status.lock().await.clone()
    }

    pub async fn update_status<F: FnOnce(&mut CollectorStatus)>(&self, mutate: F) {
        let mut status = self.status.lock().await;
        mutate(&mut status);
    }

    /// Force an immediate run. A second force while a run is active is a
    /// conflict.
    pub async fn force_run(&self) -> DomainResult<i64> {
        if get_running_run(&self.pool).await?.is_some() {
            return Err(DomainError::conflict("force_run_in_progress"));
        }
        self.update_status(|status| {
            status.last_force_request_ts = Some(Utc::now());
            status.force_run_in_progress = true;
        })
        .await;
        let result = self.execute_run(TriggerSource::Force).await;
        self.update_status(|status| status.force_run_in_progress = false).await;
        result
    }

    /// Scheduler entry point: run unless another run is active, in which
    /// case the tick is skipped with `skip_reason="overlap"`.
    pub async fn run_if_idle(&self, trigger: TriggerSource) -> DomainResult<Option<i64>> {
        if get_running_run(&self.pool).await?.is_some() {
            warn!(trigger = trigger.as_str(), "run skipped - overlap");
            self.update_status(|status| {
                status.aligned_scheduler_last_skip_reason = Some("overlap".to_string());
            })
            .await;
            return Ok(None);
        }
        self.update_status(|status| {
            status.aligned_scheduler_last_trigger_ts = Some(Utc::now());
            status.aligned_scheduler_last_skip_reason = None;
        })
        .await;
        Ok(Some(self.execute_run(trigger).await?))
    }

    /// Full run lifecycle. The run row is always closed, with `failed`
    /// carrying the error text.
    async fn execute_run(&self, trigger: TriggerSource) -> DomainResult<i64> {
        let run_mode = self.current_run_mode().await;
        let run_id = open_run(&self.pool, trigger, &run_mode).await?;
        info!(run_id = run_id, trigger = trigger.as_str(), "Optimization run started");

        match self.run_body(run_id, trigger).await {
            Ok(eos_last_run) => {
                close_run(&self.pool, run_id, RunStatus::Succeeded, eos_last_run, None).await?;
                self.update_status(|status| {
                    status.last_error = None;
                    status.last_observed_eos_run_datetime = eos_last_run;
                })
                .await;
                info!(run_id = run_id, "Optimization run succeeded");
                Ok(run_id)
            }
            Err(err) => {
                error!(run_id = run_id, error = %err, "Optimization run failed");
                close_run(&self.pool, run_id, RunStatus::Failed, None, Some(&err.to_string()))
                    .await?;
                self.update_status(|status| status.last_error = Some(err.to_string())).await;
                Err(err)
            }
        }
    }

    async fn current_run_mode(&self) -> String {
        let payload = self.last_applied_payload().await.ok().flatten();
        payload
            .as_ref()
            .and_then(|payload| payload.get("ems"))
            .and_then(|ems| ems.get("mode"))
            .and_then(JsonValue::as_str)
            .unwrap_or("OPTIMIZATION")
            .to_string()
    }

    async fn last_applied_payload(&self) -> DomainResult<Option<JsonValue>> {
        let Some(profile) = profiles::get_active_profile(&self.pool).await? else {
            return Ok(None);
        };
        Ok(profiles::get_last_applied_revision(&self.pool, profile.id)
            .await?
            .map(|revision| revision.payload_json))
    }

    async fn run_body(
        &self,
        run_id: i64,
        trigger: TriggerSource,
    ) -> DomainResult<Option<DateTime<Utc>>> {
        // 1. Snapshot inputs as artifacts.
        let parameter_payload = self
            .last_applied_payload()
            .await?
            .unwrap_or_else(|| serde_json::json!({}));
        insert_artifact(
            &self.pool,
            run_id,
            ArtifactType::ParameterPayload,
            "parameter_payload",
            &parameter_payload,
        )
        .await?;

        let mappings = list_enabled_mappings(&self.pool).await?;
        insert_artifact(
            &self.pool,
            run_id,
            ArtifactType::Mappings,
            "mappings",
            &serde_json::to_value(&mappings).unwrap_or_default(),
        )
        .await?;

        let live_state = backbone::list_signals_with_latest(&self.pool, 500).await?;
        insert_artifact(
            &self.pool,
            run_id,
            ArtifactType::LiveState,
            "live_state",
            &serde_json::to_value(&live_state).unwrap_or_default(),
        )
        .await?;

        insert_artifact(
            &self.pool,
            run_id,
            ArtifactType::RuntimeConfig,
            "runtime_config",
            &self.runtime_config_snapshot(),
        )
        .await?;

        // 2. Assemble optimizer input: applied payload + HTTP overrides.
        let mut assembled = parameter_payload;
        let overrides = setup_fields::active_http_overrides(&self.pool, &self.config).await?;
        for (field_id, value, _ts) in &overrides {
            if let Err(err) = set_value_at_path(&mut assembled, field_id, None, value.clone()) {
                warn!(field_id = %field_id, error = %err, "HTTP override merge skipped");
            }
        }

        // 3. Optional pre-refresh of predictions.
        let mut health_notes: Vec<JsonValue> = Vec::new();
        if self.config.eos_force_run_pre_refresh_enabled && trigger == TriggerSource::Force {
            let scope = RefreshScope::parse(&self.config.eos_force_run_pre_refresh_scope)
                .unwrap_or(RefreshScope::All);
            match self.refresh_predictions(scope, Some(run_id)).await {
                Ok(summary) => health_notes.push(summary),
                Err(err) => {
                    warn!(run_id = run_id, error = %err, "pre-refresh failed, continuing");
                    health_notes.push(serde_json::json!({
                        "pre_refresh": "failed",
                        "error": err.to_string(),
                    }));
                }
            }
        }

        // 4. Warm start from the prior run's solution.
        let warm_start = match latest_succeeded_run(&self.pool).await? {
            Some(prior) => get_artifact_payload(&self.pool, prior.id, ArtifactType::Solution)
                .await?
                .and_then(|solution| extract_start_solution(&solution, None)),
            None => None,
        };
        if let Some(object) = assembled.as_object_mut() {
            let start_solution = match &warm_start {
                Some(solution) => serde_json::json!(solution),
                None => JsonValue::Null,
            };
            object.insert("start_solution".to_string(), start_solution);
        }

        insert_artifact(
            &self.pool,
            run_id,
            ArtifactType::AssembledEosInput,
            "assembled_eos_input",
            &assembled,
        )
        .await?;

        // 5. Invoke the optimizer.
        let timeout = StdDuration::from_secs(self.config.eos_force_run_timeout_seconds);
        let response = self.client.optimize(&assembled, timeout).await?;

        let solution = response.get("solution").cloned().unwrap_or_else(|| response.clone());
        insert_artifact(&self.pool, run_id, ArtifactType::Solution, "solution", &solution).await?;

        // 6. Safety gates, then plan persistence.
        let mut instructions = parse_plan_instructions(&response);
        let guard_events = self.apply_safety_gates(&mut instructions).await?;

        let plan_payload = response
            .get("plan")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"instructions": []}));
        insert_artifact(&self.pool, run_id, ArtifactType::Plan, "plan", &plan_payload).await?;
        self.persist_plan(run_id, &instructions).await?;

        // 7. Health artifact: guard interventions + refresh notes.
        let health_snapshot = self.client.get_health().await.ok();
        let health = serde_json::json!({
            "guards": guard_events,
            "notes": health_notes,
            "eos_health": health_snapshot.as_ref().map(|snapshot| snapshot.payload.clone()),
        });
        insert_artifact(&self.pool, run_id, ArtifactType::Health, "health", &health).await?;

        Ok(health_snapshot.and_then(|snapshot| snapshot.eos_last_run_datetime))
    }

    async fn apply_safety_gates(
        &self,
        instructions: &mut [InstructionDraft],
    ) -> DomainResult<Vec<GuardEvent>> {
        let grid_power = backbone::list_latest_by_signal_keys(
            &self.pool,
            &["grid_power_w".to_string()],
            1,
        )
        .await?
        .into_iter()
        .next()
        .and_then(|item| item.last_value_num);

        Ok(apply_no_grid_charge_guard(
            instructions,
            grid_power,
            self.config.eos_no_grid_charge_guard_threshold_w,
            self.config.eos_no_grid_charge_guard_enabled,
        ))
    }

    async fn persist_plan(
        &self,
        run_id: i64,
        instructions: &[InstructionDraft],
    ) -> DomainResult<()> {
        let plan_id = Uuid::new_v4().to_string();
        for draft in instructions {
            sqlx::query(
                r#"INSERT INTO eos_plan_instructions
                    (run_id, plan_id, instruction_index, instruction_type, resource_id,
                     actuator_id, starts_at, ends_at, execution_time, operation_mode_id,
                     operation_mode_factor, payload_json)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
            )
            .bind(run_id)
            .bind(&plan_id)
            .bind(draft.instruction_index)
            .bind(&draft.instruction_type)
            .bind(&draft.resource_id)
            .bind(&draft.actuator_id)
            .bind(draft.starts_at)
            .bind(draft.ends_at)
            .bind(draft.execution_time)
            .bind(&draft.operation_mode_id)
            .bind(draft.operation_mode_factor)
            .bind(&draft.payload_json)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Refresh predictions from EOS and stage the allowlisted series as
    /// backbone signals. PV provider failures may fall back to a usable
    /// import provider; the original provider is always restored.
    pub async fn refresh_predictions(
        &self,
        scope: RefreshScope,
        run_id: Option<i64>,
    ) -> DomainResult<JsonValue> {
        let mut fallback_note: Option<JsonValue> = None;

        let refresh_result = self.client.update_predictions(scope).await;
        if let Err(refresh_err) = refresh_result {
            if !self.config.eos_prediction_pv_import_fallback_enabled
                || !matches!(scope, RefreshScope::All | RefreshScope::Pv)
            {
                return Err(refresh_err);
            }
            fallback_note = Some(self.attempt_pv_import_fallback(scope, &refresh_err).await?);
        }

        let mut staged = 0usize;
        for key in PREDICTION_SIGNAL_ALLOWLIST {
            let series_key = key.trim_start_matches("prediction.");
            let entries = match self.client.get_prediction_list(series_key).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(key = key, error = %err, "prediction list fetch failed");
                    continue;
                }
            };
            let now = Utc::now();
            for (ts, value) in prediction_points(&entries, now) {
                let mut ingest = SignalIngest::new(
                    key.to_string(),
                    SignalValue::Number(value),
                    ts,
                    SourceType::EosPrediction,
                );
                ingest.quality = QualityStatus::Ok;
                ingest.run_id = run_id;
                ingest_signal_measurement(&self.pool, ingest).await?;
                staged += 1;
            }
        }

        Ok(serde_json::json!({
            "pre_refresh": "ok",
            "scope": scope.as_str(),
            "staged_points": staged,
            "pv_fallback": fallback_note,
        }))
    }

    /// Switch to the import provider when its profile is usable, re-run
    /// the refresh, and restore the original provider regardless of the
    /// retry outcome.
    async fn attempt_pv_import_fallback(
        &self,
        scope: RefreshScope,
        refresh_err: &DomainError,
    ) -> DomainResult<JsonValue> {
        let config_payload = self.client.get_config().await?;
        let fallback_provider = &self.config.eos_prediction_pv_import_provider;

        let (usable, reason) =
            pv_fallback::is_valid_pv_fallback_provider(&config_payload, fallback_provider);
        if !usable {
            let note = reason.unwrap_or_else(|| "no usable import data".to_string());
            warn!(provider = %fallback_provider, note = %note, "PV fallback refused");
            return Ok(serde_json::json!({
                "applied": false,
                "note": format!("no usable import data: {note}"),
                "error": refresh_err.to_string(),
            }));
        }

        let original_provider = config_payload
            .get("pvforecast")
            .and_then(|pv| pv.get("provider"))
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        self.client
            .put_config_path("pvforecast/provider", &serde_json::json!(fallback_provider))
            .await?;
        let retry = self.client.update_predictions(scope).await;

        // Restore the original provider whatever the retry did.
        let restore = match &original_provider {
            Some(provider) => {
                self.client
                    .put_config_path("pvforecast/provider", &serde_json::json!(provider))
                    .await
                    .map(|_| "restored")
            }
            None => Ok("no_original_provider"),
        };
        if let Err(restore_err) = &restore {
            error!(error = %restore_err, "PV provider restore failed");
        }

        match retry {
            Ok(()) => Ok(serde_json::json!({
                "applied": true,
                "provider": fallback_provider,
                "restored": restore.is_ok(),
                "error": refresh_err.to_string(),
            })),
            Err(retry_err) => Ok(serde_json::json!({
                "applied": true,
                "provider": fallback_provider,
                "restored": restore.is_ok(),
                "retry_error": retry_err.to_string(),
                "error": refresh_err.to_string(),
            })),
        }
    }

    fn runtime_config_snapshot(&self) -> JsonValue {
        serde_json::json!({
            "eos_base_url": self.config.eos_base_url,
            "eos_force_run_timeout_seconds": self.config.eos_force_run_timeout_seconds,
            "eos_aligned_scheduler_enabled": self.config.eos_aligned_scheduler_enabled,
            "eos_aligned_scheduler_minutes": self.config.eos_aligned_scheduler_minutes,
            "eos_aligned_scheduler_delay_seconds": self.config.eos_aligned_scheduler_delay_seconds,
            "eos_no_grid_charge_guard_enabled": self.config.eos_no_grid_charge_guard_enabled,
            "eos_no_grid_charge_guard_threshold_w": self.config.eos_no_grid_charge_guard_threshold_w,
            "eos_prediction_pv_import_fallback_enabled":
                self.config.eos_prediction_pv_import_fallback_enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn plan_parsing_reads_nested_instructions() {
        let response = json!({
            "plan": {"instructions": [
                {
                    "instruction_type": "battery_control",
                    "resource_id": "battery1",
                    "execution_time": "2026-02-21T14:00:00Z",
                    "operation_mode_id": "CHARGE",
                    "operation_mode_factor": 0.5
                },
                {"type": "ev_control", "resource_id": "ev1"}
            ]},
            "solution": {"start_solution": [1, 0]}
        });
        let drafts = parse_plan_instructions(&response);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].instruction_index, 0);
        assert_eq!(drafts[0].resource_id.as_deref(), Some("battery1"));
        assert_eq!(
            drafts[0].execution_time,
            Some(Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap())
        );
        assert_eq!(drafts[1].instruction_type, "ev_control");
        assert_eq!(drafts[1].instruction_index, 1);
    }

    #[test]
    fn plan_parsing_handles_missing_plan() {
        assert!(parse_plan_instructions(&json!({"solution": {}})).is_empty());
    }

    #[test]
    fn prediction_points_from_bare_numbers_use_hourly_index() {
        let anchor = Utc.with_ymd_and_hms(2026, 2, 21, 14, 25, 30).unwrap();
        let points = prediction_points(&[json!(1.0), json!(2.0)], anchor);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].0, Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap());
        assert_eq!(points[1].0, Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap());
    }

    #[test]
    fn prediction_points_from_objects_use_embedded_timestamps() {
        let anchor = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        let entries = vec![json!({"date_time": "2026-02-21T16:00:00Z", "value": 512.5})];
        let points = prediction_points(&entries, anchor);
        assert_eq!(
            points,
            vec![(Utc.with_ymd_and_hms(2026, 2, 21, 16, 0, 0).unwrap(), 512.5)]
        );
    }
}
