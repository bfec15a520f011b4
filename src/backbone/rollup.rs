//! Rollup job — compacts raw measurements into 5m/1h/1d aggregate tiers.
//!
//! Windowing: the 5-minute bucket is `floor(ts / 5min)`; the 1-hour and
//! 1-day tiers derive from the 5-minute tier so the pipeline stays
//! monotonic. Buckets are recomputed from all source rows they cover, so
//! re-running over the same window produces identical rows.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::PgPool;
use tracing::{error, info};

use crate::error::DomainResult;

use super::status::{finish_job_run, open_job_run};

pub const ROLLUP_JOB_NAME: &str = "rollup";

/// Floor a timestamp onto its 5-minute bucket start.
pub fn bucket_start_5m(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(300);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

/// Floor a timestamp onto its 1-hour bucket start.
pub fn bucket_start_1h(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(3600);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

/// Floor a timestamp onto its 1-day bucket start.
pub fn bucket_start_1d(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(86_400);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

/// Run one rollup pass. Compacts measurements ingested after the last
/// successful watermark, records the pass in `data_job_runs`, and returns
/// the job-run id.
pub async fn run_rollup_job(pool: &PgPool) -> DomainResult<i64> {
    let job_id = open_job_run(pool, ROLLUP_JOB_NAME).await?;
    let new_watermark = Utc::now();
    let watermark = last_watermark(pool).await?;

    match materialize(pool, watermark, new_watermark).await {
        Ok(affected) => {
            let details = serde_json::json!({
                "watermark": new_watermark.to_rfc3339(),
                "previous_watermark": watermark.map(|w| w.to_rfc3339()),
            });
            finish_job_run(pool, job_id, "ok", affected, Some(details), None).await?;
            if affected > 0 {
                info!(affected = affected, "Rollup pass complete");
            }
            Ok(job_id)
        }
        Err(err) => {
            error!(error = %err, "Rollup pass failed");
            finish_job_run(pool, job_id, "error", 0, None, Some(&err.to_string())).await?;
            Err(err)
        }
    }
}

/// Watermark of the last successful rollup pass, read back from its
/// job-run details.
async fn last_watermark(pool: &PgPool) -> DomainResult<Option<DateTime<Utc>>> {
    let row: Option<(Option<serde_json::Value>,)> = sqlx::query_as(
        r#"SELECT details_json FROM data_job_runs
           WHERE job_name = $1 AND status = 'ok'
           ORDER BY started_at DESC, id DESC LIMIT 1"#,
    )
    .bind(ROLLUP_JOB_NAME)
    .fetch_optional(pool)
    .await?;

    let watermark = row
        .and_then(|(details,)| details)
        .and_then(|details| {
            details
                .get("watermark")
                .and_then(|v| v.as_str())
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        })
        .map(|dt| dt.with_timezone(&Utc));
    Ok(watermark)
}

async fn materialize(
    pool: &PgPool,
    watermark: Option<DateTime<Utc>>,
    new_watermark: DateTime<Utc>,
) -> DomainResult<i64> {
    // Dirty window = ts range of rows ingested since the watermark,
    // widened to bucket boundaries.
    // No prior watermark: everything since the epoch is dirty.
    let epoch = Utc.timestamp_opt(0, 0).single().unwrap_or(new_watermark);
    let dirty: Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> = sqlx::query_as(
        r#"SELECT min(ts), max(ts) FROM signal_measurements_raw
           WHERE ingested_at > $1 AND ingested_at <= $2"#,
    )
    .bind(watermark.unwrap_or(epoch))
    .bind(new_watermark)
    .fetch_optional(pool)
    .await?;

    let (min_ts, max_ts) = match dirty {
        Some((Some(min_ts), Some(max_ts))) => (min_ts, max_ts),
        _ => return Ok(0),
    };

    let from_5m = bucket_start_5m(min_ts);
    let to_5m = bucket_start_5m(max_ts) + Duration::minutes(5);

    let mut affected = 0i64;

    let r5m = sqlx::query(
        r#"INSERT INTO signal_rollup_5m
            (signal_id, bucket_start, min_num, max_num, avg_num, sum_num, count_num, last_num, last_text)
           SELECT m.signal_id,
                  to_timestamp(floor(extract(epoch FROM m.ts) / 300) * 300) AS bucket_start,
                  min(m.value_num), max(m.value_num), avg(m.value_num), sum(m.value_num),
                  count(*),
                  (array_agg(m.value_num ORDER BY m.ts DESC, m.id DESC))[1],
                  (array_agg(m.value_text ORDER BY m.ts DESC, m.id DESC))[1]
           FROM signal_measurements_raw m
           WHERE m.ts >= $1 AND m.ts < $2
           GROUP BY m.signal_id, bucket_start
           ON CONFLICT (signal_id, bucket_start) DO UPDATE SET
             min_num = EXCLUDED.min_num,
             max_num = EXCLUDED.max_num,
             avg_num = EXCLUDED.avg_num,
             sum_num = EXCLUDED.sum_num,
             count_num = EXCLUDED.count_num,
             last_num = EXCLUDED.last_num,
             last_text = EXCLUDED.last_text"#,
    )
    .bind(from_5m)
    .bind(to_5m)
    .execute(pool)
    .await?;
    affected += r5m.rows_affected() as i64;

    let from_1h = bucket_start_1h(min_ts);
    let to_1h = bucket_start_1h(max_ts) + Duration::hours(1);

    let r1h = sqlx::query(
        r#"INSERT INTO signal_rollup_1h
            (signal_id, bucket_start, min_num, max_num, avg_num, sum_num, count_num, last_num, last_text)
           SELECT r.signal_id,
                  to_timestamp(floor(extract(epoch FROM r.bucket_start) / 3600) * 3600) AS bucket_start,
                  min(r.min_num), max(r.max_num),
                  CASE WHEN sum(r.count_num) > 0 AND sum(r.sum_num) IS NOT NULL
                       THEN sum(r.sum_num) / sum(r.count_num) END,
                  sum(r.sum_num),
                  sum(r.count_num),
                  (array_agg(r.last_num ORDER BY r.bucket_start DESC))[1],
                  (array_agg(r.last_text ORDER BY r.bucket_start DESC))[1]
           FROM signal_rollup_5m r
           WHERE r.bucket_start >= $1 AND r.bucket_start < $2
           GROUP BY r.signal_id, 2
           ON CONFLICT (signal_id, bucket_start) DO UPDATE SET
             min_num = EXCLUDED.min_num,
             max_num = EXCLUDED.max_num,
             avg_num = EXCLUDED.avg_num,
             sum_num = EXCLUDED.sum_num,
             count_num = EXCLUDED.count_num,
             last_num = EXCLUDED.last_num,
             last_text = EXCLUDED.last_text"#,
    )
    .bind(from_1h)
    .bind(to_1h)
    .execute(pool)
    .await?;
    affected += r1h.rows_affected() as i64;

    let from_1d = bucket_start_1d(min_ts);
    let to_1d = bucket_start_1d(max_ts) + Duration::days(1);

    let r1d = sqlx::query(
        r#"INSERT INTO signal_rollup_1d
            (signal_id, bucket_start, min_num, max_num, avg_num, sum_num, count_num, last_num, last_text)
           SELECT r.signal_id,
                  date_trunc('day', r.bucket_start) AS bucket_start,
                  min(r.min_num), max(r.max_num),
                  CASE WHEN sum(r.count_num) > 0 AND sum(r.sum_num) IS NOT NULL
                       THEN sum(r.sum_num) / sum(r.count_num) END,
                  sum(r.sum_num),
                  sum(r.count_num),
                  (array_agg(r.last_num ORDER BY r.bucket_start DESC))[1],
                  (array_agg(r.last_text ORDER BY r.bucket_start DESC))[1]
           FROM signal_rollup_5m r
           WHERE r.bucket_start >= $1 AND r.bucket_start < $2
           GROUP BY r.signal_id, 2
           ON CONFLICT (signal_id, bucket_start) DO UPDATE SET
             min_num = EXCLUDED.min_num,
             max_num = EXCLUDED.max_num,
             avg_num = EXCLUDED.avg_num,
             sum_num = EXCLUDED.sum_num,
             count_num = EXCLUDED.count_num,
             last_num = EXCLUDED.last_num,
             last_text = EXCLUDED.last_text"#,
    )
    .bind(from_1d)
    .bind(to_1d)
    .execute(pool)
    .await?;
    affected += r1d.rows_affected() as i64;

    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn five_minute_bucket_floors() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 21, 14, 4, 50).unwrap();
        assert_eq!(
            bucket_start_5m(ts),
            Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap()
        );
        let exact = Utc.with_ymd_and_hms(2026, 2, 21, 14, 5, 0).unwrap();
        assert_eq!(bucket_start_5m(exact), exact);
    }

    #[test]
    fn hour_and_day_buckets_floor() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 21, 14, 59, 59).unwrap();
        assert_eq!(
            bucket_start_1h(ts),
            Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap()
        );
        assert_eq!(
            bucket_start_1d(ts),
            Utc.with_ymd_and_hms(2026, 2, 21, 0, 0, 0).unwrap()
        );
    }

    /// The spec scenario: 30 samples at 10 s cadence, values 0..=2900,
    /// all land in one 5-minute bucket with deterministic aggregates.
    #[test]
    fn scenario_aggregates_are_deterministic() {
        let base = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        let samples: Vec<(DateTime<Utc>, f64)> = (0..30)
            .map(|i| (base + Duration::seconds(i * 10), (i * 100) as f64))
            .collect();

        let bucket = bucket_start_5m(samples[0].0);
        assert!(samples.iter().all(|(ts, _)| bucket_start_5m(*ts) == bucket));

        let count = samples.len() as i64;
        let min = samples.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
        let max = samples.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = samples.iter().map(|(_, v)| *v).sum();
        let avg = sum / count as f64;
        let last = samples.last().map(|(_, v)| *v).unwrap();

        assert_eq!(count, 30);
        assert_eq!(min, 0.0);
        assert_eq!(max, 2900.0);
        assert_eq!(sum, 43_500.0);
        assert_eq!(avg, 1450.0);
        assert_eq!(last, 2900.0);
    }
}
