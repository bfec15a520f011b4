//! Input observation log — every key ever seen on a channel, with its
//! last payload and a monotonic message counter.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::error::DomainResult;

pub async fn upsert_input_observation(
    pool: &PgPool,
    channel_id: i64,
    input_key: &str,
    normalized_key: &str,
    payload: &str,
    last_meta: &JsonValue,
    event_ts: DateTime<Utc>,
) -> DomainResult<()> {
    sqlx::query(
        r#"INSERT INTO input_observations
            (channel_id, input_key, normalized_key, first_seen, last_seen,
             last_payload, message_count, last_meta_json)
           VALUES ($1, $2, $3, $4, $4, $5, 1, $6)
           ON CONFLICT (channel_id, input_key) DO UPDATE SET
             last_seen = EXCLUDED.last_seen,
             last_payload = EXCLUDED.last_payload,
             message_count = input_observations.message_count + 1,
             last_meta_json = EXCLUDED.last_meta_json"#,
    )
    .bind(channel_id)
    .bind(input_key)
    .bind(normalized_key)
    .bind(event_ts)
    .bind(payload)
    .bind(last_meta)
    .execute(pool)
    .await?;
    Ok(())
}
