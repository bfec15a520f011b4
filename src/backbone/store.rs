//! Catalog, measurement and latest-state store operations.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::warn;

use crate::error::{DomainError, DomainResult};
use crate::types::signals::{SignalLatestItem, SignalSeriesPoint};
use crate::types::{QualityStatus, Resolution, SignalValue, SourceType, ValueType};

use super::{canonical_unit_for_field, ingest_lag_ms, prediction_key_allowed};

/// One canonical measurement ready for the store.
#[derive(Debug, Clone)]
pub struct SignalIngest {
    pub signal_key: String,
    pub label: String,
    pub value: SignalValue,
    pub ts: DateTime<Utc>,
    pub quality: QualityStatus,
    pub source_type: SourceType,
    pub run_id: Option<i64>,
    pub source_ref_id: Option<i64>,
    pub unit: Option<String>,
    pub tags: Option<JsonValue>,
    pub ingested_at: DateTime<Utc>,
}

impl SignalIngest {
    pub fn new(
        signal_key: impl Into<String>,
        value: SignalValue,
        ts: DateTime<Utc>,
        source_type: SourceType,
    ) -> Self {
        let signal_key = signal_key.into();
        Self {
            label: signal_key.clone(),
            signal_key,
            value,
            ts,
            quality: QualityStatus::Ok,
            source_type,
            run_id: None,
            source_ref_id: None,
            unit: None,
            tags: None,
            ingested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalSeries {
    pub signal_key: String,
    pub resolution: Resolution,
    pub points: Vec<SignalSeriesPoint>,
}

/// Upsert the catalog row for a key, freezing value type and unit on first
/// sight, and return `(signal_id, declared_value_type)`.
async fn upsert_catalog_entry(
    pool: &PgPool,
    signal_key: &str,
    label: &str,
    value_type: ValueType,
    canonical_unit: Option<&str>,
    tags: Option<&JsonValue>,
) -> DomainResult<(i64, ValueType)> {
    if signal_key.len() > 160 {
        return Err(DomainError::validation(format!(
            "signal key exceeds 160 chars: {signal_key}"
        )));
    }

    let existing: Option<(i64, String)> =
        sqlx::query_as("SELECT id, value_type FROM signal_catalog WHERE signal_key = $1")
            .bind(signal_key)
            .fetch_optional(pool)
            .await?;

    if let Some((id, declared)) = existing {
        return Ok((id, ValueType::parse(&declared)?));
    }

    let tags_json = tags.cloned().unwrap_or_else(|| JsonValue::Object(Default::default()));
    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"INSERT INTO signal_catalog (signal_key, label, value_type, canonical_unit, tags_json)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (signal_key) DO NOTHING
           RETURNING id"#,
    )
    .bind(signal_key)
    .bind(label)
    .bind(value_type.as_str())
    .bind(canonical_unit)
    .bind(&tags_json)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some((id,)) => Ok((id, value_type)),
        None => {
            // Concurrent first-sight insert won; read the frozen declaration.
            let (id, declared): (i64, String) =
                sqlx::query_as("SELECT id, value_type FROM signal_catalog WHERE signal_key = $1")
                    .bind(signal_key)
                    .fetch_one(pool)
                    .await?;
            Ok((id, ValueType::parse(&declared)?))
        }
    }
}

/// Coerce an incoming value to the catalog's frozen declaration.
/// A mismatch that cannot be coerced is a validation failure.
fn coerce_to_declared(value: SignalValue, declared: ValueType) -> DomainResult<SignalValue> {
    if value.value_type() == declared {
        return Ok(value);
    }
    let coerced = match (&value, declared) {
        (SignalValue::Text(t), ValueType::Number) => t.trim().parse::<f64>().ok().map(SignalValue::Number),
        (SignalValue::Number(n), ValueType::Text) => Some(SignalValue::Text(format_compact(*n))),
        (SignalValue::Bool(b), ValueType::Text) => Some(SignalValue::Text(b.to_string())),
        (SignalValue::Bool(b), ValueType::Number) => {
            Some(SignalValue::Number(if *b { 1.0 } else { 0.0 }))
        }
        (SignalValue::Text(t), ValueType::Json) => {
            serde_json::from_str::<JsonValue>(t).ok().map(SignalValue::Json)
        }
        _ => None,
    };
    coerced.ok_or_else(|| {
        DomainError::validation(format!(
            "value type {} does not match catalog declaration {}",
            value.value_type().as_str(),
            declared.as_str()
        ))
    })
}

/// Compact numeric rendering: integral values without a fraction, others
/// with shortest round-trip form.
pub fn format_compact(value: f64) -> String {
    if (value - value.round()).abs() <= 1e-9 && value.abs() < 1e15 {
        format!("{}", value.round() as i64)
    } else {
        let formatted = format!("{value:.12}");
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        trimmed.to_string()
    }
}

/// Ingest one measurement: catalog upsert, dedup-guarded raw insert,
/// conditional latest-state update. Returns the measurement row id (the
/// pre-existing one when the dedup key already matched).
pub async fn ingest_signal_measurement(pool: &PgPool, ingest: SignalIngest) -> DomainResult<i64> {
    if !prediction_key_allowed(&ingest.signal_key) {
        return Err(DomainError::validation(format!(
            "prediction signal '{}' is not allowlisted",
            ingest.signal_key
        )));
    }

    let unit = canonical_unit_for_field(&ingest.signal_key, ingest.unit.as_deref());
    let (signal_id, declared) = upsert_catalog_entry(
        pool,
        &ingest.signal_key,
        &ingest.label,
        ingest.value.value_type(),
        unit.as_deref(),
        ingest.tags.as_ref(),
    )
    .await?;

    let value = coerce_to_declared(ingest.value, declared)?;
    let (value_num, value_text, value_bool, value_json) = value.columns();
    let lag_ms = ingest_lag_ms(ingest.ingested_at, ingest.ts);

    let mut tx = pool.begin().await?;

    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"INSERT INTO signal_measurements_raw
            (signal_id, ts, value_num, value_text, value_bool, value_json,
             quality_status, source_type, run_id, source_ref_id, ingested_at, ingest_lag_ms)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
           ON CONFLICT (signal_id, ts, source_type, COALESCE(run_id, 0), COALESCE(source_ref_id, 0))
           DO NOTHING
           RETURNING id"#,
    )
    .bind(signal_id)
    .bind(ingest.ts)
    .bind(value_num)
    .bind(value_text)
    .bind(value_bool)
    .bind(value_json)
    .bind(ingest.quality.as_str())
    .bind(ingest.source_type.as_str())
    .bind(ingest.run_id)
    .bind(ingest.source_ref_id)
    .bind(ingest.ingested_at)
    .bind(lag_ms)
    .fetch_optional(&mut *tx)
    .await?;

    let measurement_id = match inserted {
        Some((id,)) => id,
        None => {
            // Dedup hit — accepted as a no-op.
            let (id,): (i64,) = sqlx::query_as(
                r#"SELECT id FROM signal_measurements_raw
                   WHERE signal_id = $1 AND ts = $2 AND source_type = $3
                     AND COALESCE(run_id, 0) = COALESCE($4, 0)
                     AND COALESCE(source_ref_id, 0) = COALESCE($5, 0)"#,
            )
            .bind(signal_id)
            .bind(ingest.ts)
            .bind(ingest.source_type.as_str())
            .bind(ingest.run_id)
            .bind(ingest.source_ref_id)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(id);
        }
    };

    // Latest-state moves forward only: out-of-order arrivals cannot regress
    // the cache.
    sqlx::query(
        r#"INSERT INTO signal_state_latest
            (signal_id, ts, value_num, value_text, value_bool, value_json,
             quality_status, source_type, run_id, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
           ON CONFLICT (signal_id) DO UPDATE SET
             ts = EXCLUDED.ts,
             value_num = EXCLUDED.value_num,
             value_text = EXCLUDED.value_text,
             value_bool = EXCLUDED.value_bool,
             value_json = EXCLUDED.value_json,
             quality_status = EXCLUDED.quality_status,
             source_type = EXCLUDED.source_type,
             run_id = EXCLUDED.run_id,
             updated_at = now()
           WHERE signal_state_latest.ts <= EXCLUDED.ts"#,
    )
    .bind(signal_id)
    .bind(ingest.ts)
    .bind(value_num)
    .bind(value_text)
    .bind(value_bool)
    .bind(value_json)
    .bind(ingest.quality.as_str())
    .bind(ingest.source_type.as_str())
    .bind(ingest.run_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(measurement_id)
}

/// Fetch an ascending series over the half-open interval `[from, to)`.
pub async fn fetch_signal_series(
    pool: &PgPool,
    signal_key: &str,
    from_ts: DateTime<Utc>,
    to_ts: DateTime<Utc>,
    resolution: Resolution,
) -> DomainResult<SignalSeries> {
    if from_ts >= to_ts {
        return Err(DomainError::validation("'from' must be before 'to'"));
    }

    let signal_id: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM signal_catalog WHERE signal_key = $1")
            .bind(signal_key)
            .fetch_optional(pool)
            .await?;
    let Some((signal_id,)) = signal_id else {
        warn!(signal_key = signal_key, "series requested for unknown signal");
        return Ok(SignalSeries {
            signal_key: signal_key.to_string(),
            resolution,
            points: Vec::new(),
        });
    };

    let points = match resolution {
        Resolution::Raw => {
            let rows: Vec<(
                DateTime<Utc>,
                Option<f64>,
                Option<String>,
                Option<bool>,
                Option<JsonValue>,
                String,
                String,
                Option<i64>,
            )> = sqlx::query_as(
                r#"SELECT ts, value_num, value_text, value_bool, value_json,
                          quality_status, source_type, run_id
                   FROM signal_measurements_raw
                   WHERE signal_id = $1 AND ts >= $2 AND ts < $3
                   ORDER BY ts ASC, id ASC"#,
            )
            .bind(signal_id)
            .bind(from_ts)
            .bind(to_ts)
            .fetch_all(pool)
            .await?;
            rows.into_iter()
                .map(
                    |(ts, value_num, value_text, value_bool, value_json, quality, source, run_id)| {
                        SignalSeriesPoint {
                            ts,
                            value_num,
                            value_text,
                            value_bool,
                            value_json,
                            quality_status: Some(quality),
                            source_type: Some(source),
                            run_id,
                            ..Default::default()
                        }
                    },
                )
                .collect()
        }
        Resolution::FiveMinutes | Resolution::OneHour | Resolution::OneDay => {
            let table = match resolution {
                Resolution::FiveMinutes => "signal_rollup_5m",
                Resolution::OneHour => "signal_rollup_1h",
                _ => "signal_rollup_1d",
            };
            let query = format!(
                r#"SELECT bucket_start, min_num, max_num, avg_num, sum_num, count_num, last_num, last_text
                   FROM {table}
                   WHERE signal_id = $1 AND bucket_start >= $2 AND bucket_start < $3
                   ORDER BY bucket_start ASC"#
            );
            let rows: Vec<(
                DateTime<Utc>,
                Option<f64>,
                Option<f64>,
                Option<f64>,
                Option<f64>,
                i64,
                Option<f64>,
                Option<String>,
            )> = sqlx::query_as(&query)
                .bind(signal_id)
                .bind(from_ts)
                .bind(to_ts)
                .fetch_all(pool)
                .await?;
            rows.into_iter()
                .map(
                    |(ts, min_num, max_num, avg_num, sum_num, count_num, last_num, last_text)| {
                        SignalSeriesPoint {
                            ts,
                            min_num,
                            max_num,
                            avg_num,
                            sum_num,
                            count_num: Some(count_num),
                            last_num,
                            value_text: last_text,
                            ..Default::default()
                        }
                    },
                )
                .collect()
        }
    };

    Ok(SignalSeries {
        signal_key: signal_key.to_string(),
        resolution,
        points,
    })
}

const LATEST_JOIN_SELECT: &str = r#"
    SELECT c.signal_key, c.label, c.value_type, c.canonical_unit, c.tags_json,
           s.ts AS last_ts,
           s.value_num AS last_value_num,
           s.value_text AS last_value_text,
           s.value_bool AS last_value_bool,
           s.value_json AS last_value_json,
           s.quality_status AS last_quality_status,
           s.source_type AS last_source_type,
           s.run_id AS last_run_id,
           s.updated_at
    FROM signal_catalog c
    LEFT JOIN signal_state_latest s ON s.signal_id = c.id
"#;

/// Catalog x latest-state join, deterministic key ordering.
pub async fn list_signals_with_latest(
    pool: &PgPool,
    limit: i64,
) -> DomainResult<Vec<SignalLatestItem>> {
    let query = format!("{LATEST_JOIN_SELECT} ORDER BY c.signal_key ASC LIMIT $1");
    let rows = sqlx::query_as::<_, SignalLatestItem>(&query)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Latest state for an explicit key set, deterministic key ordering.
pub async fn list_latest_by_signal_keys(
    pool: &PgPool,
    signal_keys: &[String],
    limit: i64,
) -> DomainResult<Vec<SignalLatestItem>> {
    if signal_keys.is_empty() {
        return list_signals_with_latest(pool, limit).await;
    }
    let query =
        format!("{LATEST_JOIN_SELECT} WHERE c.signal_key = ANY($1) ORDER BY c.signal_key ASC LIMIT $2");
    let rows = sqlx::query_as::<_, SignalLatestItem>(&query)
        .bind(signal_keys)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_format_strips_integral_fraction() {
        assert_eq!(format_compact(512.0), "512");
        assert_eq!(format_compact(-3.0), "-3");
        assert_eq!(format_compact(12.5), "12.5");
    }

    #[test]
    fn coerce_numeric_text_to_number() {
        let coerced = coerce_to_declared(SignalValue::Text("42".into()), ValueType::Number).unwrap();
        assert_eq!(coerced, SignalValue::Number(42.0));
    }

    #[test]
    fn coerce_rejects_incompatible() {
        assert!(coerce_to_declared(SignalValue::Text("abc".into()), ValueType::Number).is_err());
    }

    #[test]
    fn coerce_number_to_declared_text() {
        let coerced = coerce_to_declared(SignalValue::Number(7.0), ValueType::Text).unwrap();
        assert_eq!(coerced, SignalValue::Text("7".into()));
    }
}
