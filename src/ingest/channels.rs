//! Input channel repository.

use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::error::{DomainError, DomainResult};
use crate::types::{ChannelType, InputChannel};

pub async fn list_input_channels(pool: &PgPool) -> DomainResult<Vec<InputChannel>> {
    let rows = sqlx::query_as::<_, InputChannel>(
        r#"SELECT id, code, name, channel_type, enabled, is_default, config_json,
                  created_at, updated_at
           FROM input_channels
           ORDER BY channel_type ASC, code ASC"#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_input_channel_by_code(
    pool: &PgPool,
    code: &str,
) -> DomainResult<Option<InputChannel>> {
    let row = sqlx::query_as::<_, InputChannel>(
        r#"SELECT id, code, name, channel_type, enabled, is_default, config_json,
                  created_at, updated_at
           FROM input_channels WHERE code = $1"#,
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_default_input_channel(
    pool: &PgPool,
    channel_type: ChannelType,
) -> DomainResult<Option<InputChannel>> {
    let row = sqlx::query_as::<_, InputChannel>(
        r#"SELECT id, code, name, channel_type, enabled, is_default, config_json,
                  created_at, updated_at
           FROM input_channels
           WHERE channel_type = $1 AND is_default = TRUE"#,
    )
    .bind(channel_type.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Bootstrap helper: make sure a default channel of the given type exists.
/// An existing non-default channel of the type is promoted before a new
/// one is created.
pub async fn ensure_default_channel_exists(
    pool: &PgPool,
    channel_type: ChannelType,
    fallback_code: &str,
    fallback_name: &str,
) -> DomainResult<InputChannel> {
    if let Some(existing) = get_default_input_channel(pool, channel_type).await? {
        return Ok(existing);
    }

    let promoted = sqlx::query_as::<_, InputChannel>(
        r#"UPDATE input_channels SET is_default = TRUE, updated_at = now()
           WHERE id = (
               SELECT id FROM input_channels
               WHERE channel_type = $1
               ORDER BY enabled DESC, id ASC LIMIT 1
           )
           RETURNING id, code, name, channel_type, enabled, is_default, config_json,
                     created_at, updated_at"#,
    )
    .bind(channel_type.as_str())
    .fetch_optional(pool)
    .await?;
    if let Some(channel) = promoted {
        return Ok(channel);
    }

    let created = sqlx::query_as::<_, InputChannel>(
        r#"INSERT INTO input_channels (code, name, channel_type, enabled, is_default, config_json)
           VALUES ($1, $2, $3, TRUE, TRUE, $4)
           ON CONFLICT (code) DO UPDATE SET updated_at = now()
           RETURNING id, code, name, channel_type, enabled, is_default, config_json,
                     created_at, updated_at"#,
    )
    .bind(fallback_code)
    .bind(fallback_name)
    .bind(channel_type.as_str())
    .bind(JsonValue::Object(Default::default()))
    .fetch_one(pool)
    .await?;
    Ok(created)
}

/// Resolve the HTTP channel for an ingest request. An explicit code must
/// name an enabled HTTP channel (404 unknown, 409 disabled); otherwise the
/// default HTTP channel is used (503 when none is configured).
pub async fn resolve_http_channel(
    pool: &PgPool,
    channel_code: Option<&str>,
) -> DomainResult<InputChannel> {
    if let Some(code) = channel_code {
        let channel = get_input_channel_by_code(pool, code)
            .await?
            .filter(|channel| channel.is_http())
            .ok_or_else(|| DomainError::not_found(format!("HTTP channel '{code}' not found")))?;
        if !channel.enabled {
            return Err(DomainError::conflict(format!("HTTP channel '{code}' is disabled")));
        }
        return Ok(channel);
    }

    let default_channel = get_default_input_channel(pool, ChannelType::Http)
        .await?
        .ok_or_else(|| DomainError::unavailable("No default HTTP input channel configured"))?;
    if !default_channel.enabled {
        return Err(DomainError::conflict("Default HTTP input channel is disabled"));
    }
    Ok(default_channel)
}
