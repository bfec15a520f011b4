//! Measurement sync — pushes the latest EMR registers to EOS.
//!
//! Runs periodically (or on force) and records every attempt in
//! `eos_measurement_sync_runs`. A sync is `blocked` while an optimization
//! run is active so the optimizer never sees half-updated registers.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::emr::{emr_keys, get_latest_emr_values};
use crate::error::DomainResult;
use crate::orchestrator::eos_client::EosApi;
use crate::orchestrator::get_running_run;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Periodic,
    Force,
}

impl SyncTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::Force => "force",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub run_id: i64,
    pub status: String,
    pub pushed_count: i32,
}

/// Execute one measurement sync pass.
pub async fn run_measurement_sync(
    pool: &PgPool,
    client: &Arc<dyn EosApi>,
    trigger: SyncTrigger,
) -> DomainResult<SyncOutcome> {
    let (sync_id,): (i64,) = sqlx::query_as(
        r#"INSERT INTO eos_measurement_sync_runs (trigger_source, started_at, status)
           VALUES ($1, now(), 'running')
           RETURNING id"#,
    )
    .bind(trigger.as_str())
    .fetch_one(pool)
    .await?;

    if get_running_run(pool).await?.is_some() {
        finish_sync(pool, sync_id, "blocked", 0, None, Some("optimization run in progress")).await?;
        return Ok(SyncOutcome {
            run_id: sync_id,
            status: "blocked".to_string(),
            pushed_count: 0,
        });
    }

    let keys: Vec<String> = emr_keys().iter().map(|key| key.to_string()).collect();
    let latest = get_latest_emr_values(pool, &keys).await?;

    let mut pushed = 0i32;
    let mut failures: Vec<String> = Vec::new();
    for point in &latest {
        match client
            .put_measurement_value(&point.emr_key, point.ts, point.emr_kwh)
            .await
        {
            Ok(()) => pushed += 1,
            Err(err) => {
                warn!(key = %point.emr_key, error = %err, "measurement push failed");
                failures.push(format!("{}: {err}", point.emr_key));
            }
        }
    }

    let status = if failures.is_empty() {
        "ok"
    } else if pushed > 0 {
        "partial"
    } else {
        "error"
    };
    let details = serde_json::json!({
        "pushed": pushed,
        "register_count": latest.len(),
        "failures": failures,
    });
    let error_text = (!failures.is_empty()).then(|| failures.join("; "));

    finish_sync(pool, sync_id, status, pushed, Some(details), error_text.as_deref()).await?;

    if pushed > 0 {
        info!(pushed = pushed, status = status, "Measurement sync complete");
    }
    Ok(SyncOutcome {
        run_id: sync_id,
        status: status.to_string(),
        pushed_count: pushed,
    })
}

async fn finish_sync(
    pool: &PgPool,
    sync_id: i64,
    status: &str,
    pushed_count: i32,
    details: Option<serde_json::Value>,
    error_text: Option<&str>,
) -> DomainResult<()> {
    sqlx::query(
        r#"UPDATE eos_measurement_sync_runs
           SET finished_at = now(), status = $2, pushed_count = $3, details_json = $4, error_text = $5
           WHERE id = $1"#,
    )
    .bind(sync_id)
    .bind(status)
    .bind(pushed_count)
    .bind(details)
    .bind(error_text)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent sync run, for the status endpoint.
pub async fn last_sync_run(pool: &PgPool) -> DomainResult<Option<serde_json::Value>> {
    let row: Option<(i64, String, chrono::DateTime<chrono::Utc>, Option<chrono::DateTime<chrono::Utc>>, String, i32, Option<serde_json::Value>, Option<String>)> =
        sqlx::query_as(
            r#"SELECT id, trigger_source, started_at, finished_at, status, pushed_count,
                      details_json, error_text
               FROM eos_measurement_sync_runs
               ORDER BY started_at DESC, id DESC LIMIT 1"#,
        )
        .fetch_optional(pool)
        .await?;
    Ok(row.map(
        |(id, trigger_source, started_at, finished_at, status, pushed_count, details_json, error_text)| {
            serde_json::json!({
                "id": id,
                "trigger_source": trigger_source,
                "started_at": started_at,
                "finished_at": finished_at,
                "status": status,
                "pushed_count": pushed_count,
                "details_json": details_json,
                "error_text": error_text,
            })
        },
    ))
}
