//! Ingest pipeline — inbound events to canonical measurements
//!
//! One ingest is one short transaction chain: observation upsert, mapping
//! lookup, payload parse + transform, telemetry event, backbone ingest,
//! EMR handoff for power-relevant fields. Parameter-channel keys
//! (`eos/param/*`) are early-accepted and routed to the parameter binding
//! engine instead of the signal path.

pub mod channels;
pub mod mappings;
pub mod observations;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::warn;

use crate::backbone::store::{ingest_signal_measurement, SignalIngest};
use crate::config::AppConfig;
use crate::emr::{EmrPipeline, POWER_KEYS};
use crate::error::DomainResult;
use crate::params::bindings;
use crate::parser::{parse_event_timestamp, parse_payload};
use crate::types::{InputChannel, QualityStatus, SignalValue, SourceType};

use mappings::InputMapping;

/// Prefix that canonical input keys carry.
pub const INPUT_KEY_PREFIX: &str = "eos/input/";
/// Prefix that routes an event to the parameter binding path.
pub const PARAM_KEY_PREFIX: &str = "eos/param/";

/// Outcome of a single ingest.
#[derive(Debug, Clone, Serialize)]
pub struct InputIngestResult {
    pub accepted: bool,
    pub channel_id: i64,
    pub channel_code: String,
    pub channel_type: String,
    pub input_key: String,
    pub normalized_key: String,
    pub mapping_matched: bool,
    pub mapping_id: Option<i64>,
    pub event_ts: DateTime<Utc>,
}

/// Normalize an external input key onto the canonical namespace:
/// lowercase, strip leading slashes, ensure the `eos/input/` prefix
/// (`eos/...` keys are re-rooted under it).
pub fn normalize_input_key(input_key: &str) -> String {
    let trimmed = input_key.trim().trim_start_matches('/').to_lowercase();
    if trimmed.starts_with(INPUT_KEY_PREFIX) || trimmed.starts_with(PARAM_KEY_PREFIX) {
        return trimmed;
    }
    if let Some(rest) = trimmed.strip_prefix("eos/") {
        return format!("{INPUT_KEY_PREFIX}{rest}");
    }
    format!("{INPUT_KEY_PREFIX}{trimmed}")
}

/// Apply the mapping transform: `v' = v × multiplier`, negated for
/// `positive_is_export`. Integral results render without a fraction.
/// Non-numeric payloads pass through, with a warning when a non-identity
/// transform was configured.
pub fn apply_value_transform(
    parsed_value: Option<&str>,
    value_multiplier: f64,
    sign_convention: &str,
    eos_field: &str,
) -> Option<String> {
    let raw = parsed_value?;
    let Ok(numeric) = raw.trim().parse::<f64>() else {
        let non_identity =
            (value_multiplier - 1.0).abs() > 1e-9 || sign_convention == "positive_is_export";
        if non_identity {
            warn!(
                field = eos_field,
                value = raw,
                "value transform skipped for non-numeric payload"
            );
        }
        return Some(raw.to_string());
    };

    let mut transformed = numeric * value_multiplier;
    if sign_convention == "positive_is_export" {
        transformed = -transformed;
    }

    Some(crate::backbone::store::format_compact(transformed))
}

/// The ingest pipeline service. Cheap to clone; owns the pool handle and
/// the EMR handoff.
#[derive(Clone)]
pub struct InputIngestPipeline {
    pool: PgPool,
    config: AppConfig,
    emr: EmrPipeline,
}

impl InputIngestPipeline {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let emr = EmrPipeline::new(pool.clone(), config.clone());
        Self { pool, config, emr }
    }

    /// Ingest one inbound event on a resolved channel.
    pub async fn ingest(
        &self,
        channel: &InputChannel,
        input_key: &str,
        payload_text: &str,
        event_received_ts: DateTime<Utc>,
        metadata: JsonValue,
        explicit_timestamp: Option<DateTime<Utc>>,
    ) -> DomainResult<InputIngestResult> {
        // Parameter channel path: consumed by the setup/binding engine,
        // no signal emission.
        if input_key.trim().starts_with(PARAM_KEY_PREFIX)
            || normalize_input_key(input_key).starts_with(PARAM_KEY_PREFIX)
        {
            let normalized_key = normalize_input_key(input_key);
            if self.config.param_dynamic_enabled {
                bindings::handle_parameter_input(
                    &self.pool,
                    &self.config,
                    channel,
                    input_key,
                    &normalized_key,
                    payload_text,
                    explicit_timestamp.unwrap_or(event_received_ts),
                )
                .await?;
            }
            return Ok(InputIngestResult {
                accepted: true,
                channel_id: channel.id,
                channel_code: channel.code.clone(),
                channel_type: channel.channel_type.clone(),
                input_key: input_key.to_string(),
                normalized_key,
                mapping_matched: false,
                mapping_id: None,
                event_ts: explicit_timestamp.unwrap_or(event_received_ts),
            });
        }

        let normalized_key = normalize_input_key(input_key);

        observations::upsert_input_observation(
            &self.pool,
            channel.id,
            input_key,
            &normalized_key,
            payload_text,
            &metadata,
            event_received_ts,
        )
        .await?;

        let mapping =
            mappings::get_mapping_by_channel_input_key(&self.pool, channel.id, &normalized_key)
                .await?;

        let Some(mapping) = mapping else {
            // Unmapped keys are still accepted; the observation row is the
            // discovery surface.
            return Ok(InputIngestResult {
                accepted: true,
                channel_id: channel.id,
                channel_code: channel.code.clone(),
                channel_type: channel.channel_type.clone(),
                input_key: input_key.to_string(),
                normalized_key,
                mapping_matched: false,
                mapping_id: None,
                event_ts: explicit_timestamp.unwrap_or(event_received_ts),
            });
        };

        let parsed_value = parse_payload(payload_text, mapping.payload_path.as_deref());
        let timestamp_fallback = explicit_timestamp.unwrap_or(event_received_ts);
        let source_ts = match explicit_timestamp {
            Some(explicit) => explicit,
            None => parse_event_timestamp(
                payload_text,
                mapping.timestamp_path.as_deref(),
                timestamp_fallback,
            ),
        };
        let transformed_value = apply_value_transform(
            parsed_value.as_deref(),
            mapping.value_multiplier,
            &mapping.sign_convention,
            &mapping.eos_field,
        );

        let telemetry_event_id = self
            .create_telemetry_event(&mapping, payload_text, transformed_value.as_deref(), source_ts)
            .await?;

        if let Some(ref value_text) = transformed_value {
            let value = SignalValue::infer_from_text(value_text);
            let source_type = if channel.channel_type == "mqtt" {
                SourceType::MqttInput
            } else {
                SourceType::HttpInput
            };
            let mut ingest = SignalIngest::new(
                mapping.eos_field.clone(),
                value.clone(),
                source_ts,
                source_type,
            );
            ingest.quality = QualityStatus::Ok;
            ingest.source_ref_id = Some(telemetry_event_id);
            ingest.unit = mapping.unit.clone();
            ingest.tags = Some(serde_json::json!({
                "eos_field": mapping.eos_field,
                "source": channel.channel_type,
                "channel_code": channel.code,
                "input_key": normalized_key,
            }));
            ingest_signal_measurement(&self.pool, ingest).await?;

            // Power-relevant fields feed the EMR integrator.
            if POWER_KEYS.contains(&mapping.eos_field.as_str()) {
                if let Some(value_w) = value.as_number() {
                    self.emr
                        .process_power_sample(
                            &mapping.eos_field,
                            value_w,
                            source_ts,
                            &channel.channel_type,
                            Some(payload_text),
                        )
                        .await?;
                }
            }
        }

        Ok(InputIngestResult {
            accepted: true,
            channel_id: channel.id,
            channel_code: channel.code.clone(),
            channel_type: channel.channel_type.clone(),
            input_key: input_key.to_string(),
            normalized_key,
            mapping_matched: true,
            mapping_id: Some(mapping.id),
            event_ts: source_ts,
        })
    }

    async fn create_telemetry_event(
        &self,
        mapping: &InputMapping,
        raw_payload: &str,
        parsed_value: Option<&str>,
        event_ts: DateTime<Utc>,
    ) -> DomainResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"INSERT INTO telemetry_events (mapping_id, eos_field, raw_payload, parsed_value, ts)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(mapping.id)
        .bind(&mapping.eos_field)
        .bind(raw_payload)
        .bind(parsed_value)
        .bind(event_ts)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_lowercases_and_prefixes() {
        assert_eq!(normalize_input_key("House_Load_W"), "eos/input/house_load_w");
        assert_eq!(normalize_input_key("/pv_power_w"), "eos/input/pv_power_w");
        assert_eq!(normalize_input_key("eos/input/pv_power_w"), "eos/input/pv_power_w");
        assert_eq!(normalize_input_key("eos/pv_power_w"), "eos/input/pv_power_w");
        assert_eq!(
            normalize_input_key("eos/param/ems.mode"),
            "eos/param/ems.mode"
        );
    }

    #[test]
    fn transform_applies_multiplier_and_sign() {
        assert_eq!(
            apply_value_transform(Some("1.5"), 1000.0, "canonical", "pv_power_w"),
            Some("1500".to_string())
        );
        assert_eq!(
            apply_value_transform(Some("250"), 1.0, "positive_is_export", "grid_power_w"),
            Some("-250".to_string())
        );
    }

    #[test]
    fn transform_keeps_fractional_precision() {
        assert_eq!(
            apply_value_transform(Some("2.5"), 1.0, "canonical", "x"),
            Some("2.5".to_string())
        );
    }

    #[test]
    fn transform_passes_non_numeric_through() {
        assert_eq!(
            apply_value_transform(Some("OPTIMIZATION"), 2.0, "canonical", "ems_mode"),
            Some("OPTIMIZATION".to_string())
        );
        assert_eq!(apply_value_transform(None, 1.0, "canonical", "x"), None);
    }
}
