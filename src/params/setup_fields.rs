//! Setup field surface — the HTTP-driven field-override layer.
//!
//! The field layout is a static catalog (categories, per-field value types
//! and constraints). Reading a field resolves the most recent successful
//! `setup_field_events` row; writing one emits an event, validates against
//! the catalog, and on acceptance merges the normalized value into the
//! active profile's draft revision as a `dynamic_input` revision. HTTP
//! writes additionally arm a per-field override window during which the
//! field is externally authoritative.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::warn;

use crate::backbone::store::list_latest_by_signal_keys;
use crate::config::AppConfig;
use crate::error::{DomainError, DomainResult};
use crate::types::{FieldSource, RevisionSource, SetupApplyStatus, ValidationStatus};

use super::profiles;
use super::validate::{set_value_at_path, validate_payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldGroup {
    Mandatory,
    Optional,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValueType {
    Number,
    String,
    Select,
    StringList,
}

/// Static description of one settable (or observed) field.
#[derive(Debug, Clone, Serialize)]
pub struct SetupFieldSpec {
    pub field_id: String,
    pub category_id: String,
    pub label: String,
    pub group: FieldGroup,
    pub required: bool,
    pub value_type: FieldValueType,
    pub unit: Option<String>,
    pub options: Vec<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub http_path_template: String,
    pub advanced: bool,
}

impl SetupFieldSpec {
    #[allow(clippy::too_many_arguments)]
    fn profile_field(
        field_id: &str,
        category_id: &str,
        label: &str,
        required: bool,
        value_type: FieldValueType,
        unit: Option<&str>,
        options: &[&str],
        minimum: Option<f64>,
        maximum: Option<f64>,
    ) -> Self {
        Self {
            field_id: field_id.to_string(),
            category_id: category_id.to_string(),
            label: label.to_string(),
            group: if required { FieldGroup::Mandatory } else { FieldGroup::Optional },
            required,
            value_type,
            unit: unit.map(str::to_string),
            options: options.iter().map(|s| s.to_string()).collect(),
            minimum,
            maximum,
            http_path_template: format!("/eos/set/{field_id}"),
            advanced: false,
        }
    }

    fn live_field(signal_key: &str, label: &str) -> Self {
        Self {
            field_id: format!("live.{signal_key}"),
            category_id: "live".to_string(),
            label: label.to_string(),
            group: FieldGroup::Live,
            required: true,
            value_type: FieldValueType::Number,
            unit: Some("W".to_string()),
            options: Vec::new(),
            minimum: None,
            maximum: None,
            http_path_template: format!("/eos/input/{signal_key}"),
            advanced: false,
        }
    }

    /// Dotted path inside the profile payload. Live fields have none.
    pub fn payload_path(&self) -> Option<&str> {
        if self.group == FieldGroup::Live {
            None
        } else {
            Some(&self.field_id)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupCategorySpec {
    pub category_id: String,
    pub title: String,
    pub requirement_label: String,
}

pub fn setup_categories() -> Vec<SetupCategorySpec> {
    [
        ("ems", "Energy management", "MUSS"),
        ("prices", "Prices & tariffs", "MUSS"),
        ("battery", "Battery", "KANN"),
        ("live", "Live input signals", "MUSS"),
    ]
    .into_iter()
    .map(|(category_id, title, requirement)| SetupCategorySpec {
        category_id: category_id.to_string(),
        title: title.to_string(),
        requirement_label: requirement.to_string(),
    })
    .collect()
}

/// The static field catalog.
pub fn setup_field_catalog() -> Vec<SetupFieldSpec> {
    vec![
        SetupFieldSpec::profile_field(
            "ems.mode",
            "ems",
            "EMS mode",
            true,
            FieldValueType::Select,
            None,
            &["OPTIMIZATION", "IDLE", "DISABLED"],
            None,
            None,
        ),
        SetupFieldSpec::profile_field(
            "ems.interval",
            "ems",
            "EMS interval",
            true,
            FieldValueType::Number,
            Some("s"),
            &[],
            Some(1.0),
            Some(86_400.0),
        ),
        SetupFieldSpec::profile_field(
            "elecprice.charges_kwh",
            "prices",
            "Electricity surcharge",
            true,
            FieldValueType::Number,
            Some("EUR/kWh"),
            &[],
            Some(0.0),
            Some(10.0),
        ),
        SetupFieldSpec::profile_field(
            "elecprice.vat_rate",
            "prices",
            "VAT factor",
            false,
            FieldValueType::Number,
            Some("x"),
            &[],
            Some(0.0),
            Some(5.0),
        ),
        SetupFieldSpec::profile_field(
            "feedintariff.provider_settings.FeedInTariffFixed.feed_in_tariff_kwh",
            "prices",
            "Feed-in tariff",
            false,
            FieldValueType::Number,
            Some("EUR/kWh"),
            &[],
            Some(0.0),
            Some(10.0),
        ),
        SetupFieldSpec::profile_field(
            "devices.batteries.0.min_soc_percentage",
            "battery",
            "Battery min SoC",
            false,
            FieldValueType::Number,
            Some("%"),
            &[],
            Some(0.0),
            Some(100.0),
        ),
        SetupFieldSpec::profile_field(
            "devices.batteries.0.max_soc_percentage",
            "battery",
            "Battery max SoC",
            false,
            FieldValueType::Number,
            Some("%"),
            &[],
            Some(0.0),
            Some(100.0),
        ),
        SetupFieldSpec::profile_field(
            "devices.batteries.0.max_charge_power_w",
            "battery",
            "Battery max charge power",
            false,
            FieldValueType::Number,
            Some("W"),
            &[],
            Some(0.0),
            Some(100_000.0),
        ),
        SetupFieldSpec::profile_field(
            "measurement.keys",
            "ems",
            "Measurement keys",
            false,
            FieldValueType::StringList,
            None,
            &[],
            None,
            None,
        ),
        SetupFieldSpec::live_field("house_load_w", "House load"),
        SetupFieldSpec::live_field("pv_power_w", "PV power"),
        SetupFieldSpec::live_field("grid_power_w", "Grid power"),
        SetupFieldSpec::live_field("battery_power_w", "Battery power"),
    ]
}

pub fn field_spec(field_id: &str) -> Option<SetupFieldSpec> {
    setup_field_catalog()
        .into_iter()
        .find(|spec| spec.field_id == field_id)
}

/// Latest event metadata per field.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FieldEventState {
    pub field_id: String,
    pub source: String,
    pub event_ts: DateTime<Utc>,
    pub apply_status: String,
    pub error_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Most recent successful event per field, optionally filtered.
pub async fn latest_field_events(
    pool: &PgPool,
    field_ids: Option<&[String]>,
) -> DomainResult<Vec<FieldEventState>> {
    let rows = match field_ids {
        Some(ids) => {
            sqlx::query_as::<_, FieldEventState>(
                r#"SELECT DISTINCT ON (field_id)
                       field_id, source, event_ts, apply_status, error_text, created_at
                   FROM setup_field_events
                   WHERE field_id = ANY($1)
                   ORDER BY field_id, created_at DESC, id DESC"#,
            )
            .bind(ids)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, FieldEventState>(
                r#"SELECT DISTINCT ON (field_id)
                       field_id, source, event_ts, apply_status, error_text, created_at
                   FROM setup_field_events
                   ORDER BY field_id, created_at DESC, id DESC"#,
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Fields whose last event came over HTTP inside the override window,
/// mapped to `(normalized value, event_ts)`. The orchestrator merges these
/// over the applied payload when assembling optimizer input.
pub async fn active_http_overrides(
    pool: &PgPool,
    config: &AppConfig,
) -> DomainResult<Vec<(String, JsonValue, DateTime<Utc>)>> {
    let window_start = Utc::now() - Duration::seconds(config.http_override_active_seconds);
    let rows: Vec<(String, Option<JsonValue>, DateTime<Utc>)> = sqlx::query_as(
        r#"SELECT DISTINCT ON (field_id) field_id, normalized_value_json, created_at
           FROM setup_field_events
           WHERE source = 'http'
             AND apply_status IN ('accepted', 'applied')
             AND created_at >= $1
           ORDER BY field_id, created_at DESC, id DESC"#,
    )
    .bind(window_start)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .filter_map(|(field_id, value, ts)| value.map(|value| (field_id, value, ts)))
        .collect())
}

/// Normalize a raw field value against its spec. Pure; rejects with a
/// field-level reason.
pub fn normalize_field_value(spec: &SetupFieldSpec, value: &JsonValue) -> DomainResult<JsonValue> {
    match spec.value_type {
        FieldValueType::Number => {
            let number = match value {
                JsonValue::Number(n) => n.as_f64(),
                JsonValue::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| DomainError::validation(format!("{}: expected a number", spec.field_id)))?;
            if let Some(minimum) = spec.minimum {
                if number < minimum {
                    return Err(DomainError::validation(format!(
                        "{}: {number} below minimum {minimum}",
                        spec.field_id
                    )));
                }
            }
            if let Some(maximum) = spec.maximum {
                if number > maximum {
                    return Err(DomainError::validation(format!(
                        "{}: {number} above maximum {maximum}",
                        spec.field_id
                    )));
                }
            }
            serde_json::Number::from_f64(number)
                .map(JsonValue::Number)
                .ok_or_else(|| DomainError::validation(format!("{}: non-finite number", spec.field_id)))
        }
        FieldValueType::Select => {
            let text = value
                .as_str()
                .ok_or_else(|| DomainError::validation(format!("{}: expected a string", spec.field_id)))?;
            if !spec.options.iter().any(|option| option == text) {
                return Err(DomainError::validation(format!(
                    "{}: '{text}' not one of {:?}",
                    spec.field_id, spec.options
                )));
            }
            Ok(JsonValue::String(text.to_string()))
        }
        FieldValueType::String => {
            let text = value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            Ok(JsonValue::String(text))
        }
        FieldValueType::StringList => match value {
            JsonValue::Array(items) if items.iter().all(JsonValue::is_string) => Ok(value.clone()),
            JsonValue::String(text) => Ok(JsonValue::Array(
                text.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| JsonValue::String(part.to_string()))
                    .collect(),
            )),
            _ => Err(DomainError::validation(format!(
                "{}: expected a string list",
                spec.field_id
            ))),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldWriteResult {
    pub field_id: String,
    pub status: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FieldUpdate {
    pub field_id: String,
    pub value: JsonValue,
    pub source: FieldSource,
    pub event_ts: Option<DateTime<Utc>>,
}

async fn insert_field_event(
    pool: &PgPool,
    update: &FieldUpdate,
    normalized: Option<&JsonValue>,
    apply_status: SetupApplyStatus,
    error_text: Option<&str>,
) -> DomainResult<i64> {
    let raw_value_text = match &update.value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    let (id,): (i64,) = sqlx::query_as(
        r#"INSERT INTO setup_field_events
            (field_id, source, raw_value_text, normalized_value_json, event_ts, apply_status, error_text)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING id"#,
    )
    .bind(&update.field_id)
    .bind(update.source.as_str())
    .bind(raw_value_text)
    .bind(normalized)
    .bind(update.event_ts.unwrap_or_else(Utc::now))
    .bind(apply_status.as_str())
    .bind(error_text)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn set_event_status(
    pool: &PgPool,
    event_id: i64,
    apply_status: SetupApplyStatus,
    error_text: Option<&str>,
) -> DomainResult<()> {
    sqlx::query("UPDATE setup_field_events SET apply_status = $2, error_text = $3 WHERE id = $1")
        .bind(event_id)
        .bind(apply_status.as_str())
        .bind(error_text)
        .execute(pool)
        .await?;
    Ok(())
}

/// Apply a batch of field writes. Each update validates independently;
/// accepted profile-field updates merge into the draft revision.
pub async fn write_setup_fields(
    pool: &PgPool,
    updates: Vec<FieldUpdate>,
) -> DomainResult<Vec<FieldWriteResult>> {
    let mut results = Vec::with_capacity(updates.len());

    for update in updates {
        let Some(spec) = field_spec(&update.field_id) else {
            insert_field_event(
                pool,
                &update,
                None,
                SetupApplyStatus::Rejected,
                Some("unknown field"),
            )
            .await?;
            results.push(FieldWriteResult {
                field_id: update.field_id.clone(),
                status: "rejected".to_string(),
                error: Some("unknown field".to_string()),
            });
            continue;
        };

        if spec.group == FieldGroup::Live {
            insert_field_event(
                pool,
                &update,
                None,
                SetupApplyStatus::Rejected,
                Some("live signals are ingested via /eos/input, not settable"),
            )
            .await?;
            results.push(FieldWriteResult {
                field_id: update.field_id.clone(),
                status: "rejected".to_string(),
                error: Some("live signals are ingested via /eos/input, not settable".to_string()),
            });
            continue;
        }

        let normalized = match normalize_field_value(&spec, &update.value) {
            Ok(normalized) => normalized,
            Err(err) => {
                let reason = err.to_string();
                insert_field_event(pool, &update, None, SetupApplyStatus::Rejected, Some(&reason))
                    .await?;
                results.push(FieldWriteResult {
                    field_id: update.field_id.clone(),
                    status: "rejected".to_string(),
                    error: Some(reason),
                });
                continue;
            }
        };

        let event_id = insert_field_event(
            pool,
            &update,
            Some(&normalized),
            SetupApplyStatus::Accepted,
            None,
        )
        .await?;

        match merge_into_draft(pool, &spec, normalized).await {
            Ok(()) => {
                set_event_status(pool, event_id, SetupApplyStatus::Applied, None).await?;
                results.push(FieldWriteResult {
                    field_id: update.field_id.clone(),
                    status: "saved".to_string(),
                    error: None,
                });
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(field_id = %update.field_id, error = %reason, "setup field apply failed");
                set_event_status(pool, event_id, SetupApplyStatus::Failed, Some(&reason)).await?;
                results.push(FieldWriteResult {
                    field_id: update.field_id.clone(),
                    status: "rejected".to_string(),
                    error: Some(reason),
                });
            }
        }
    }

    Ok(results)
}

async fn merge_into_draft(
    pool: &PgPool,
    spec: &SetupFieldSpec,
    value: JsonValue,
) -> DomainResult<()> {
    let Some(path) = spec.payload_path() else {
        return Ok(());
    };
    let profile = profiles::get_active_profile(pool)
        .await?
        .ok_or_else(|| DomainError::unavailable("no active parameter profile"))?;
    let draft = profiles::get_current_draft_revision(pool, profile.id).await?;
    let mut payload = draft
        .map(|revision| revision.payload_json)
        .unwrap_or_else(|| serde_json::json!({}));

    set_value_at_path(&mut payload, path, None, value)?;

    let outcome = validate_payload(&payload, &super::catalog::dynamic_parameter_catalog());
    let status = if outcome.valid {
        ValidationStatus::Valid
    } else {
        ValidationStatus::Invalid
    };
    let issues = serde_json::json!({"errors": outcome.errors, "warnings": outcome.warnings});

    profiles::create_profile_revision(
        pool,
        profile.id,
        RevisionSource::DynamicInput,
        payload,
        status,
        Some(issues),
        true,
    )
    .await?;
    Ok(())
}

/// Read a value out of the draft payload at a field's dotted path.
/// Numeric segments index arrays.
pub fn value_at_path<'a>(payload: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = payload;
    for segment in path.split('.') {
        current = match segment.parse::<usize>() {
            Ok(index) => current.as_array()?.get(index)?,
            Err(_) => current.as_object()?.get(segment)?,
        };
    }
    Some(current)
}

// ─── Layout & readiness ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SetupFieldView {
    pub field_id: String,
    pub category_id: String,
    pub group: FieldGroup,
    pub label: String,
    pub required: bool,
    pub value_type: FieldValueType,
    pub unit: Option<String>,
    pub options: Vec<String>,
    pub current_value: Option<JsonValue>,
    pub valid: bool,
    pub missing: bool,
    pub last_source: Option<String>,
    pub last_update_ts: Option<DateTime<Utc>>,
    pub http_path_template: String,
    pub http_override_active: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupCategoryView {
    pub category_id: String,
    pub title: String,
    pub requirement_label: String,
    pub required_count: i64,
    pub invalid_required_count: i64,
    pub fields: Vec<SetupFieldView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupLayout {
    pub generated_at: DateTime<Utc>,
    pub invalid_required_total: i64,
    pub categories: Vec<SetupCategoryView>,
}

/// Resolve the full layout: catalog specs joined with draft payload
/// values, event metadata and live signal freshness.
pub async fn get_setup_layout(pool: &PgPool, config: &AppConfig) -> DomainResult<SetupLayout> {
    let specs = setup_field_catalog();
    let events = latest_field_events(pool, None).await?;
    let now = Utc::now();

    let draft_payload = match profiles::get_active_profile(pool).await? {
        Some(profile) => profiles::get_current_draft_revision(pool, profile.id)
            .await?
            .map(|revision| revision.payload_json),
        None => None,
    };

    let live_keys: Vec<String> = specs
        .iter()
        .filter(|spec| spec.group == FieldGroup::Live)
        .filter_map(|spec| spec.field_id.strip_prefix("live.").map(str::to_string))
        .collect();
    let live_latest = list_latest_by_signal_keys(pool, &live_keys, live_keys.len().max(1) as i64)
        .await?;

    let override_window = Duration::seconds(config.http_override_active_seconds);

    let mut views = Vec::with_capacity(specs.len());
    for spec in &specs {
        let event = events.iter().find(|event| event.field_id == spec.field_id);
        let (current_value, valid, missing, error) = if spec.group == FieldGroup::Live {
            let signal_key = spec.field_id.strip_prefix("live.").unwrap_or_default();
            let latest = live_latest.iter().find(|item| item.signal_key == signal_key);
            match latest.and_then(|item| item.last_ts.map(|ts| (item, ts))) {
                Some((item, ts)) => {
                    let age = now.signed_duration_since(ts).num_seconds();
                    let fresh = age <= config.live_stale_seconds;
                    let value = item
                        .last_value_num
                        .and_then(serde_json::Number::from_f64)
                        .map(JsonValue::Number);
                    let error = (!fresh).then(|| format!("stale for {age}s"));
                    (value, fresh, false, error)
                }
                None => (None, false, true, Some("no value received yet".to_string())),
            }
        } else {
            let value = draft_payload
                .as_ref()
                .and_then(|payload| value_at_path(payload, &spec.field_id))
                .cloned();
            let missing = value.is_none();
            let valid = match &value {
                Some(value) => normalize_field_value(spec, value).is_ok(),
                None => false,
            };
            (value, valid, missing, None)
        };

        let http_override_active = event
            .map(|event| {
                event.source == "http"
                    && matches!(event.apply_status.as_str(), "accepted" | "applied")
                    && now.signed_duration_since(event.created_at) <= override_window
            })
            .unwrap_or(false);

        views.push(SetupFieldView {
            field_id: spec.field_id.clone(),
            category_id: spec.category_id.clone(),
            group: spec.group,
            label: spec.label.clone(),
            required: spec.required,
            value_type: spec.value_type,
            unit: spec.unit.clone(),
            options: spec.options.clone(),
            current_value,
            valid,
            missing,
            last_source: event.map(|event| event.source.clone()),
            last_update_ts: event.map(|event| event.created_at),
            http_path_template: spec.http_path_template.clone(),
            http_override_active,
            error,
        });
    }

    let mut categories = Vec::new();
    for category in setup_categories() {
        let fields: Vec<SetupFieldView> = views
            .iter()
            .filter(|view| view.category_id == category.category_id)
            .cloned()
            .collect();
        let required_count = fields.iter().filter(|field| field.required).count() as i64;
        let invalid_required_count = fields
            .iter()
            .filter(|field| field.required && !field.valid)
            .count() as i64;
        categories.push(SetupCategoryView {
            category_id: category.category_id,
            title: category.title,
            requirement_label: category.requirement_label,
            required_count,
            invalid_required_count,
            fields,
        });
    }

    let invalid_required_total = categories
        .iter()
        .map(|category| category.invalid_required_count)
        .sum();

    Ok(SetupLayout {
        generated_at: now,
        invalid_required_total,
        categories,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessItem {
    pub field_id: String,
    pub required: bool,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupReadiness {
    pub readiness_level: String,
    pub blockers_count: i64,
    pub warnings_count: i64,
    pub items: Vec<ReadinessItem>,
}

/// Readiness report: missing/invalid required fields block, stale live
/// signals warn.
pub async fn get_setup_readiness(pool: &PgPool, config: &AppConfig) -> DomainResult<SetupReadiness> {
    let layout = get_setup_layout(pool, config).await?;
    let mut items = Vec::new();
    let mut blockers = 0i64;
    let mut warnings = 0i64;

    for category in &layout.categories {
        for field in &category.fields {
            if field.valid {
                continue;
            }
            let (status, message) = if field.group == FieldGroup::Live {
                if field.missing {
                    ("blocked", "no value received yet".to_string())
                } else {
                    ("warning", field.error.clone().unwrap_or_else(|| "stale".to_string()))
                }
            } else if field.required {
                ("blocked", "required field missing or invalid".to_string())
            } else {
                ("warning", "optional field missing or invalid".to_string())
            };
            if status == "blocked" {
                blockers += 1;
            } else {
                warnings += 1;
            }
            items.push(ReadinessItem {
                field_id: field.field_id.clone(),
                required: field.required,
                status: status.to_string(),
                message,
            });
        }
    }

    let readiness_level = if blockers > 0 {
        "blocked"
    } else if warnings > 0 {
        "degraded"
    } else {
        "ready"
    };

    Ok(SetupReadiness {
        readiness_level: readiness_level.to_string(),
        blockers_count: blockers,
        warnings_count: warnings,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_number_enforces_range() {
        let spec = field_spec("ems.interval").unwrap();
        assert!(normalize_field_value(&spec, &json!(900)).is_ok());
        assert!(normalize_field_value(&spec, &json!("900")).is_ok());
        assert!(normalize_field_value(&spec, &json!(0)).is_err());
        assert!(normalize_field_value(&spec, &json!("abc")).is_err());
    }

    #[test]
    fn normalize_select_enforces_options() {
        let spec = field_spec("ems.mode").unwrap();
        assert_eq!(
            normalize_field_value(&spec, &json!("IDLE")).unwrap(),
            json!("IDLE")
        );
        assert!(normalize_field_value(&spec, &json!("TURBO")).is_err());
    }

    #[test]
    fn normalize_string_list_splits_commas() {
        let spec = field_spec("measurement.keys").unwrap();
        assert_eq!(
            normalize_field_value(&spec, &json!("a, b")).unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(
            normalize_field_value(&spec, &json!(["a", "b"])).unwrap(),
            json!(["a", "b"])
        );
    }

    #[test]
    fn value_at_path_handles_indexes() {
        let payload = json!({"devices": {"batteries": [{"min_soc_percentage": 10}]}});
        assert_eq!(
            value_at_path(&payload, "devices.batteries.0.min_soc_percentage"),
            Some(&json!(10))
        );
        assert_eq!(value_at_path(&payload, "devices.batteries.1.x"), None);
    }

    #[test]
    fn catalog_live_fields_are_read_only_paths() {
        let spec = field_spec("live.house_load_w").unwrap();
        assert_eq!(spec.payload_path(), None);
        assert_eq!(spec.http_path_template, "/eos/input/house_load_w");
    }
}
