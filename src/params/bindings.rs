//! Dynamic parameter bindings — external inputs that write into the
//! active profile's draft payload.
//!
//! A binding maps `(channel, input_key)` onto a dotted parameter path with
//! an optional array selector. Every inbound event is recorded in
//! `parameter_input_events` with its apply outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::DomainResult;
use crate::ingest::apply_value_transform;
use crate::parser::{parse_event_timestamp, parse_payload};
use crate::types::{InputChannel, ParameterInputApplyStatus, RevisionSource, ValidationStatus};

use super::catalog::{catalog_entry, ParameterValueType};
use super::profiles;
use super::validate::{set_value_at_path, validate_payload};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ParameterBinding {
    pub id: i64,
    pub parameter_key: String,
    pub selector_value: Option<String>,
    pub channel_id: i64,
    pub input_key: String,
    pub payload_path: Option<String>,
    pub timestamp_path: Option<String>,
    pub incoming_unit: Option<String>,
    pub value_multiplier: f64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn get_binding_by_channel_input_key(
    pool: &PgPool,
    channel_id: i64,
    input_key: &str,
) -> DomainResult<Option<ParameterBinding>> {
    let row = sqlx::query_as::<_, ParameterBinding>(
        r#"SELECT id, parameter_key, selector_value, channel_id, input_key, payload_path,
                  timestamp_path, incoming_unit, value_multiplier, enabled, created_at, updated_at
           FROM parameter_bindings
           WHERE channel_id = $1 AND input_key = $2 AND enabled = TRUE"#,
    )
    .bind(channel_id)
    .bind(input_key)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[allow(clippy::too_many_arguments)]
async fn record_event(
    pool: &PgPool,
    binding_id: Option<i64>,
    channel_id: i64,
    input_key: &str,
    normalized_key: &str,
    raw_payload: &str,
    parsed_value_text: Option<&str>,
    event_ts: DateTime<Utc>,
    revision_id: Option<i64>,
    apply_status: ParameterInputApplyStatus,
    error_text: Option<&str>,
) -> DomainResult<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"INSERT INTO parameter_input_events
            (binding_id, channel_id, input_key, normalized_key, raw_payload,
             parsed_value_text, event_ts, revision_id, apply_status, error_text)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           RETURNING id"#,
    )
    .bind(binding_id)
    .bind(channel_id)
    .bind(input_key)
    .bind(normalized_key)
    .bind(raw_payload)
    .bind(parsed_value_text)
    .bind(event_ts)
    .bind(revision_id)
    .bind(apply_status.as_str())
    .bind(error_text)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Convert a transformed value string into the JSON shape its catalog
/// entry expects.
fn value_to_json(value_text: &str, value_type: Option<ParameterValueType>) -> JsonValue {
    match value_type {
        Some(ParameterValueType::StringList) => {
            if let Ok(JsonValue::Array(items)) = serde_json::from_str(value_text) {
                return JsonValue::Array(items);
            }
            JsonValue::Array(
                value_text
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| JsonValue::String(part.to_string()))
                    .collect(),
            )
        }
        _ => {
            if let Ok(number) = value_text.trim().parse::<f64>() {
                if let Some(number) = serde_json::Number::from_f64(number) {
                    return JsonValue::Number(number);
                }
            }
            match value_text {
                "true" => JsonValue::Bool(true),
                "false" => JsonValue::Bool(false),
                other => JsonValue::String(other.to_string()),
            }
        }
    }
}

/// Handle one `eos/param/*` event: resolve the binding, transform and
/// validate the value, and merge it into the active profile's draft as a
/// new `dynamic_input` revision.
pub async fn handle_parameter_input(
    pool: &PgPool,
    config: &AppConfig,
    channel: &InputChannel,
    input_key: &str,
    normalized_key: &str,
    payload_text: &str,
    event_ts: DateTime<Utc>,
) -> DomainResult<()> {
    if channel.is_http() && !config.param_dynamic_allow_http {
        record_event(
            pool,
            None,
            channel.id,
            input_key,
            normalized_key,
            payload_text,
            None,
            event_ts,
            None,
            ParameterInputApplyStatus::Rejected,
            Some("dynamic parameter input over HTTP is disabled"),
        )
        .await?;
        return Ok(());
    }

    let binding =
        get_binding_by_channel_input_key(pool, channel.id, normalized_key).await?;
    let Some(binding) = binding else {
        record_event(
            pool,
            None,
            channel.id,
            input_key,
            normalized_key,
            payload_text,
            None,
            event_ts,
            None,
            ParameterInputApplyStatus::IgnoredUnbound,
            None,
        )
        .await?;
        return Ok(());
    };

    let parsed = parse_payload(payload_text, binding.payload_path.as_deref());
    let source_ts =
        parse_event_timestamp(payload_text, binding.timestamp_path.as_deref(), event_ts);
    let transformed = apply_value_transform(
        parsed.as_deref(),
        binding.value_multiplier,
        "canonical",
        &binding.parameter_key,
    );

    let Some(transformed) = transformed else {
        record_event(
            pool,
            Some(binding.id),
            channel.id,
            input_key,
            normalized_key,
            payload_text,
            None,
            source_ts,
            None,
            ParameterInputApplyStatus::Rejected,
            Some("payload did not resolve to a value"),
        )
        .await?;
        return Ok(());
    };

    let entry = catalog_entry(&binding.parameter_key);
    let value_json = value_to_json(&transformed, entry.as_ref().map(|e| e.value_type));

    // Range/option check against the catalog before touching the draft.
    if let Some(entry) = &entry {
        if let Some(number) = value_json.as_f64() {
            let below = entry.minimum.map(|minimum| number < minimum).unwrap_or(false);
            let above = entry.maximum.map(|maximum| number > maximum).unwrap_or(false);
            if below || above {
                record_event(
                    pool,
                    Some(binding.id),
                    channel.id,
                    input_key,
                    normalized_key,
                    payload_text,
                    Some(&transformed),
                    source_ts,
                    None,
                    ParameterInputApplyStatus::Rejected,
                    Some(&format!(
                        "value {number} outside [{:?}, {:?}]",
                        entry.minimum, entry.maximum
                    )),
                )
                .await?;
                return Ok(());
            }
        }
        if entry.value_type == ParameterValueType::Enum {
            let ok = value_json
                .as_str()
                .map(|text| entry.options.iter().any(|option| option == text))
                .unwrap_or(false);
            if !ok {
                record_event(
                    pool,
                    Some(binding.id),
                    channel.id,
                    input_key,
                    normalized_key,
                    payload_text,
                    Some(&transformed),
                    source_ts,
                    None,
                    ParameterInputApplyStatus::Rejected,
                    Some(&format!("'{transformed}' not in {:?}", entry.options)),
                )
                .await?;
                return Ok(());
            }
        }
    }

    let Some(profile) = profiles::get_active_profile(pool).await? else {
        record_event(
            pool,
            Some(binding.id),
            channel.id,
            input_key,
            normalized_key,
            payload_text,
            Some(&transformed),
            source_ts,
            None,
            ParameterInputApplyStatus::BlockedNoActiveProfile,
            None,
        )
        .await?;
        return Ok(());
    };

    let draft = profiles::get_current_draft_revision(pool, profile.id).await?;
    let mut payload = draft
        .as_ref()
        .map(|revision| revision.payload_json.clone())
        .unwrap_or_else(|| serde_json::json!({}));

    let merge = set_value_at_path(
        &mut payload,
        &binding.parameter_key,
        binding.selector_value.as_deref(),
        value_json,
    );
    if let Err(err) = merge {
        warn!(
            parameter_key = %binding.parameter_key,
            error = %err,
            "parameter input merge failed"
        );
        record_event(
            pool,
            Some(binding.id),
            channel.id,
            input_key,
            normalized_key,
            payload_text,
            Some(&transformed),
            source_ts,
            None,
            ParameterInputApplyStatus::ApplyFailed,
            Some(&err.to_string()),
        )
        .await?;
        return Ok(());
    }

    let outcome = validate_payload(&payload, &super::catalog::dynamic_parameter_catalog());
    let validation_status = if outcome.valid {
        ValidationStatus::Valid
    } else {
        ValidationStatus::Invalid
    };
    let issues = serde_json::json!({
        "errors": outcome.errors,
        "warnings": outcome.warnings,
    });

    let revision = profiles::create_profile_revision(
        pool,
        profile.id,
        RevisionSource::DynamicInput,
        payload,
        validation_status,
        Some(issues),
        true,
    )
    .await?;

    record_event(
        pool,
        Some(binding.id),
        channel.id,
        input_key,
        normalized_key,
        payload_text,
        Some(&transformed),
        source_ts,
        Some(revision.id),
        ParameterInputApplyStatus::Applied,
        None,
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_list_values_split_on_commas() {
        let value = value_to_json(
            "house_load_w, pv_power_w",
            Some(ParameterValueType::StringList),
        );
        assert_eq!(value, serde_json::json!(["house_load_w", "pv_power_w"]));
    }

    #[test]
    fn scalar_values_infer_type() {
        assert_eq!(value_to_json("10", None), serde_json::json!(10.0));
        assert_eq!(value_to_json("true", None), serde_json::json!(true));
        assert_eq!(value_to_json("IDLE", None), serde_json::json!("IDLE"));
    }
}
