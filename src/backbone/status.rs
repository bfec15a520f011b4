//! Pipeline job bookkeeping and the data-pipeline status snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::error::DomainResult;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobRunSnapshot {
    pub id: i64,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub affected_rows: i64,
    pub details_json: Option<JsonValue>,
    pub error_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataPipelineStatus {
    pub last_rollup_run: Option<JobRunSnapshot>,
    pub last_retention_run: Option<JobRunSnapshot>,
    pub raw_rows_24h: i64,
    pub rollup_rows_24h: i64,
    pub signal_catalog_count: i64,
}

/// Open a job-run row in `running` state; the job id is used to finish it.
pub async fn open_job_run(pool: &PgPool, job_name: &str) -> DomainResult<i64> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO data_job_runs (job_name, status) VALUES ($1, 'running') RETURNING id",
    )
    .bind(job_name)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn finish_job_run(
    pool: &PgPool,
    job_id: i64,
    status: &str,
    affected_rows: i64,
    details: Option<JsonValue>,
    error_text: Option<&str>,
) -> DomainResult<()> {
    sqlx::query(
        r#"UPDATE data_job_runs
           SET finished_at = now(), status = $2, affected_rows = $3,
               details_json = $4, error_text = $5
           WHERE id = $1"#,
    )
    .bind(job_id)
    .bind(status)
    .bind(affected_rows)
    .bind(details)
    .bind(error_text)
    .execute(pool)
    .await?;
    Ok(())
}

async fn last_finished_job(pool: &PgPool, job_name: &str) -> DomainResult<Option<JobRunSnapshot>> {
    let row = sqlx::query_as::<_, JobRunSnapshot>(
        r#"SELECT id, job_name, started_at, finished_at, status, affected_rows,
                  details_json, error_text
           FROM data_job_runs
           WHERE job_name = $1 AND status <> 'running'
           ORDER BY started_at DESC, id DESC LIMIT 1"#,
    )
    .bind(job_name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Snapshot for the retention/status endpoint: last job outcomes plus
/// 24-hour row counts and catalog size.
pub async fn get_data_pipeline_status(pool: &PgPool) -> DomainResult<DataPipelineStatus> {
    let last_rollup_run = last_finished_job(pool, super::rollup::ROLLUP_JOB_NAME).await?;
    let last_retention_run = last_finished_job(pool, super::retention::RETENTION_JOB_NAME).await?;

    let (raw_rows_24h,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM signal_measurements_raw WHERE ingested_at > now() - interval '24 hours'",
    )
    .fetch_one(pool)
    .await?;
    let (rollup_rows_24h,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM signal_rollup_5m WHERE bucket_start > now() - interval '24 hours'",
    )
    .fetch_one(pool)
    .await?;
    let (signal_catalog_count,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM signal_catalog")
            .fetch_one(pool)
            .await?;

    Ok(DataPipelineStatus {
        last_rollup_run,
        last_retention_run,
        raw_rows_24h,
        rollup_rows_24h,
        signal_catalog_count,
    })
}
