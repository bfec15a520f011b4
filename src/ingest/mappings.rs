//! Input mapping repository.
//!
//! A mapping binds an external input key on a channel to a canonical
//! `eos_field`, or pins the field to a fixed value. The key column keeps
//! its historical `mqtt_topic` name; under HTTP-only operation it holds
//! the normalized input key, which is what all lookups use.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::DomainResult;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InputMapping {
    pub id: i64,
    pub eos_field: String,
    pub channel_id: Option<i64>,
    #[sqlx(rename = "mqtt_topic")]
    pub input_key: Option<String>,
    pub payload_path: Option<String>,
    pub timestamp_path: Option<String>,
    pub unit: Option<String>,
    pub value_multiplier: f64,
    pub sign_convention: String,
    pub fixed_value: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const MAPPING_SELECT: &str = r#"
    SELECT id, eos_field, channel_id, mqtt_topic, payload_path, timestamp_path,
           unit, value_multiplier, sign_convention, fixed_value, enabled,
           created_at, updated_at
    FROM input_mappings
"#;

pub async fn list_mappings(pool: &PgPool) -> DomainResult<Vec<InputMapping>> {
    let query = format!("{MAPPING_SELECT} ORDER BY eos_field ASC");
    let rows = sqlx::query_as::<_, InputMapping>(&query).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn list_enabled_mappings(pool: &PgPool) -> DomainResult<Vec<InputMapping>> {
    let query = format!("{MAPPING_SELECT} WHERE enabled = TRUE ORDER BY eos_field ASC");
    let rows = sqlx::query_as::<_, InputMapping>(&query).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn get_mapping_by_channel_input_key(
    pool: &PgPool,
    channel_id: i64,
    input_key: &str,
) -> DomainResult<Option<InputMapping>> {
    let query = format!(
        "{MAPPING_SELECT} WHERE channel_id = $1 AND mqtt_topic = $2 AND enabled = TRUE"
    );
    let row = sqlx::query_as::<_, InputMapping>(&query)
        .bind(channel_id)
        .bind(input_key)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Upsert a mapping for a channel-bound input key. Used by bootstrap and
/// the setup engine when live fields are wired to canonical keys.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_channel_mapping(
    pool: &PgPool,
    eos_field: &str,
    channel_id: i64,
    input_key: &str,
    payload_path: Option<&str>,
    timestamp_path: Option<&str>,
    unit: Option<&str>,
    value_multiplier: f64,
    sign_convention: &str,
) -> DomainResult<InputMapping> {
    let row = sqlx::query_as::<_, InputMapping>(
        r#"INSERT INTO input_mappings
            (eos_field, channel_id, mqtt_topic, payload_path, timestamp_path,
             unit, value_multiplier, sign_convention, enabled)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
           ON CONFLICT (eos_field) DO UPDATE SET
             channel_id = EXCLUDED.channel_id,
             mqtt_topic = EXCLUDED.mqtt_topic,
             payload_path = EXCLUDED.payload_path,
             timestamp_path = EXCLUDED.timestamp_path,
             unit = EXCLUDED.unit,
             value_multiplier = EXCLUDED.value_multiplier,
             sign_convention = EXCLUDED.sign_convention,
             fixed_value = NULL,
             enabled = TRUE,
             updated_at = now()
           RETURNING id, eos_field, channel_id, mqtt_topic, payload_path, timestamp_path,
                     unit, value_multiplier, sign_convention, fixed_value, enabled,
                     created_at, updated_at"#,
    )
    .bind(eos_field)
    .bind(channel_id)
    .bind(input_key)
    .bind(payload_path)
    .bind(timestamp_path)
    .bind(unit)
    .bind(value_multiplier)
    .bind(sign_convention)
    .fetch_one(pool)
    .await?;
    Ok(row)
}
