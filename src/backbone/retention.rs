//! Retention job — tiered deletion over the signal store.
//!
//! Each tier has its own `*_retention_days` knob; `0` disables the tier.
//! Deletes run in bounded chunks so a stop request aborts quickly and
//! transactions stay small. A tier failure does not stop the remaining
//! tiers; the job surfaces the worst status.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::DomainResult;

use super::status::{finish_job_run, open_job_run};

pub const RETENTION_JOB_NAME: &str = "retention";

const DELETE_CHUNK_SIZE: i64 = 5000;

/// Run one retention pass across all tiers. Returns the job-run id.
pub async fn run_retention_job(pool: &PgPool, config: &AppConfig) -> DomainResult<i64> {
    let job_id = open_job_run(pool, RETENTION_JOB_NAME).await?;

    let tiers: [(&str, &str, &str, i64); 4] = [
        ("raw", "signal_measurements_raw", "ts", config.data_raw_retention_days),
        ("rollup_5m", "signal_rollup_5m", "bucket_start", config.data_rollup_5m_retention_days),
        ("rollup_1h", "signal_rollup_1h", "bucket_start", config.data_rollup_1h_retention_days),
        ("rollup_1d", "signal_rollup_1d", "bucket_start", config.data_rollup_1d_retention_days),
    ];

    let mut total_deleted = 0i64;
    let mut failures: Vec<String> = Vec::new();
    let mut tier_details = serde_json::Map::new();

    for (tier_name, table, ts_column, retention_days) in tiers {
        if retention_days <= 0 {
            tier_details.insert(tier_name.to_string(), serde_json::json!({"skipped": true}));
            continue;
        }
        let cutoff = Utc::now() - Duration::days(retention_days);
        match delete_older_than(pool, table, ts_column, cutoff).await {
            Ok(deleted) => {
                total_deleted += deleted;
                tier_details.insert(
                    tier_name.to_string(),
                    serde_json::json!({"deleted": deleted, "cutoff": cutoff.to_rfc3339()}),
                );
            }
            Err(err) => {
                warn!(tier = tier_name, error = %err, "Retention tier failed");
                failures.push(format!("{tier_name}: {err}"));
                tier_details.insert(
                    tier_name.to_string(),
                    serde_json::json!({"error": err.to_string()}),
                );
            }
        }
    }

    let status = if failures.is_empty() {
        "ok"
    } else if failures.len() < 4 {
        "partial"
    } else {
        "error"
    };
    let error_text = if failures.is_empty() {
        None
    } else {
        Some(failures.join("; "))
    };

    finish_job_run(
        pool,
        job_id,
        status,
        total_deleted,
        Some(serde_json::Value::Object(tier_details)),
        error_text.as_deref(),
    )
    .await?;

    if total_deleted > 0 {
        info!(deleted = total_deleted, status = status, "Retention pass complete");
    }
    Ok(job_id)
}

/// Chunked delete keyed on the tier's time column.
async fn delete_older_than(
    pool: &PgPool,
    table: &str,
    ts_column: &str,
    cutoff: chrono::DateTime<chrono::Utc>,
) -> Result<i64, sqlx::Error> {
    // Rollup tiers have a composite PK, so chunk on ctid; the raw tier
    // chunks on id.
    let query = if table == "signal_measurements_raw" {
        format!(
            "DELETE FROM {table} WHERE id IN (
                SELECT id FROM {table} WHERE {ts_column} < $1 ORDER BY {ts_column} ASC LIMIT $2
            )"
        )
    } else {
        format!(
            "DELETE FROM {table} WHERE ctid IN (
                SELECT ctid FROM {table} WHERE {ts_column} < $1 LIMIT $2
            )"
        )
    };

    let mut deleted = 0i64;
    loop {
        let result = sqlx::query(&query)
            .bind(cutoff)
            .bind(DELETE_CHUNK_SIZE)
            .execute(pool)
            .await?;
        let chunk = result.rows_affected() as i64;
        deleted += chunk;
        if chunk < DELETE_CHUNK_SIZE {
            break;
        }
    }
    Ok(deleted)
}
