//! Parameter payload validation and path merging.
//!
//! Payloads are deeply nested JSON with open-ended keys and array
//! selectors. Validation is a catalog-driven walk over the tree — no
//! reflection. Normalization canonicalizes device array ordering and
//! string-list fields.

use serde_json::{Map, Value as JsonValue};

use crate::error::{DomainError, DomainResult};

use super::catalog::{DynamicParameterEntry, ParameterValueType};

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub normalized_payload: JsonValue,
}

/// Validate a parameter payload against the dynamic catalog. Pure.
pub fn validate_payload(
    payload: &JsonValue,
    catalog: &[DynamicParameterEntry],
) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(root) = payload.as_object() else {
        return ValidationOutcome {
            valid: false,
            errors: vec!["payload must be a JSON object".to_string()],
            warnings,
            normalized_payload: payload.clone(),
        };
    };

    for entry in catalog {
        for (path, value) in resolve_catalog_path(payload, &entry.parameter_key) {
            check_value(entry, &path, &value, &mut errors, &mut warnings);
        }
    }

    if !root.contains_key("ems") {
        warnings.push("payload has no 'ems' section".to_string());
    }

    let normalized_payload = normalize_payload(payload.clone());

    ValidationOutcome {
        valid: errors.is_empty(),
        errors,
        warnings,
        normalized_payload,
    }
}

fn check_value(
    entry: &DynamicParameterEntry,
    path: &str,
    value: &JsonValue,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    match entry.value_type {
        ParameterValueType::Number => {
            let Some(number) = value.as_f64() else {
                errors.push(format!("{path}: expected a number, got {value}"));
                return;
            };
            if let Some(minimum) = entry.minimum {
                if number < minimum {
                    errors.push(format!("{path}: {number} below minimum {minimum}"));
                }
            }
            if let Some(maximum) = entry.maximum {
                if number > maximum {
                    errors.push(format!("{path}: {number} above maximum {maximum}"));
                }
            }
        }
        ParameterValueType::Enum => {
            let Some(text) = value.as_str() else {
                errors.push(format!("{path}: expected a string, got {value}"));
                return;
            };
            if !entry.options.iter().any(|option| option == text) {
                errors.push(format!(
                    "{path}: '{text}' not in {:?}",
                    entry.options
                ));
            }
        }
        ParameterValueType::StringList => {
            let ok = value.is_array()
                && value
                    .as_array()
                    .map(|items| items.iter().all(JsonValue::is_string))
                    .unwrap_or(false);
            if !ok && !value.is_string() {
                warnings.push(format!("{path}: expected a list of strings"));
            }
        }
        ParameterValueType::Text => {
            if !value.is_string() {
                warnings.push(format!("{path}: expected a string"));
            }
        }
    }
}

/// Resolve a catalog path (possibly carrying `[]` array segments) to the
/// concrete `(path, value)` pairs present in the payload.
fn resolve_catalog_path(payload: &JsonValue, parameter_key: &str) -> Vec<(String, JsonValue)> {
    let mut found = Vec::new();
    collect_paths(payload, parameter_key, String::new(), &mut found);
    found
}

fn collect_paths(
    current: &JsonValue,
    remaining: &str,
    resolved: String,
    found: &mut Vec<(String, JsonValue)>,
) {
    let (segment, rest) = match remaining.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (remaining, None),
    };

    let (key, is_array) = match segment.strip_suffix("[]") {
        Some(key) => (key, true),
        None => (segment, false),
    };

    let Some(child) = current.get(key) else {
        return;
    };
    let child_path = if resolved.is_empty() {
        key.to_string()
    } else {
        format!("{resolved}.{key}")
    };

    if is_array {
        let Some(items) = child.as_array() else {
            return;
        };
        for (index, item) in items.iter().enumerate() {
            let indexed = format!("{child_path}[{index}]");
            match rest {
                Some(rest) => collect_paths(item, rest, indexed, found),
                None => found.push((indexed, item.clone())),
            }
        }
    } else {
        match rest {
            Some(rest) => collect_paths(child, rest, child_path, found),
            None => found.push((child_path, child.clone())),
        }
    }
}

/// Canonicalize a payload: device arrays sorted by `device_id`, comma
/// string-lists split into arrays under `measurement.*`.
pub fn normalize_payload(mut payload: JsonValue) -> JsonValue {
    if let Some(devices) = payload.get_mut("devices").and_then(JsonValue::as_object_mut) {
        for (_, value) in devices.iter_mut() {
            if let Some(items) = value.as_array_mut() {
                items.sort_by(|a, b| {
                    let ka = a.get("device_id").and_then(JsonValue::as_str).unwrap_or("");
                    let kb = b.get("device_id").and_then(JsonValue::as_str).unwrap_or("");
                    ka.cmp(kb)
                });
            }
        }
    }

    if let Some(measurement) = payload
        .get_mut("measurement")
        .and_then(JsonValue::as_object_mut)
    {
        for (_, value) in measurement.iter_mut() {
            if let Some(text) = value.as_str() {
                let items: Vec<JsonValue> = text
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| JsonValue::String(part.to_string()))
                    .collect();
                *value = JsonValue::Array(items);
            }
        }
    }

    payload
}

/// Set `value` at a dotted path inside `payload`, creating intermediate
/// objects. A `[]` segment selects the array element whose `device_id`
/// equals `selector` (appending a new element when absent); a numeric
/// segment indexes an array directly.
pub fn set_value_at_path(
    payload: &mut JsonValue,
    path: &str,
    selector: Option<&str>,
    value: JsonValue,
) -> DomainResult<()> {
    if path.is_empty() {
        return Err(DomainError::validation("empty parameter path"));
    }
    if !payload.is_object() {
        *payload = JsonValue::Object(Map::new());
    }

    let segments: Vec<&str> = path.split('.').collect();
    let mut current = payload;

    for (position, segment) in segments.iter().enumerate() {
        let is_last = position == segments.len() - 1;

        if let Some(key) = segment.strip_suffix("[]") {
            let object = current
                .as_object_mut()
                .ok_or_else(|| DomainError::validation(format!("'{key}' parent is not an object")))?;
            let array = object
                .entry(key.to_string())
                .or_insert_with(|| JsonValue::Array(Vec::new()));
            let items = array
                .as_array_mut()
                .ok_or_else(|| DomainError::validation(format!("'{key}' is not an array")))?;

            let selector = selector.ok_or_else(|| {
                DomainError::validation(format!("path '{path}' requires a selector value"))
            })?;
            let index = items.iter().position(|item| {
                item.get("device_id").and_then(JsonValue::as_str) == Some(selector)
            });
            let index = match index {
                Some(index) => index,
                None => {
                    let mut element = Map::new();
                    element.insert(
                        "device_id".to_string(),
                        JsonValue::String(selector.to_string()),
                    );
                    items.push(JsonValue::Object(element));
                    items.len() - 1
                }
            };
            current = &mut items[index];
            if is_last {
                *current = value;
                return Ok(());
            }
            continue;
        }

        if let Ok(index) = segment.parse::<usize>() {
            let items = current
                .as_array_mut()
                .ok_or_else(|| DomainError::validation(format!("'{segment}' parent is not an array")))?;
            while items.len() <= index {
                items.push(JsonValue::Null);
            }
            current = &mut items[index];
            if is_last {
                *current = value;
                return Ok(());
            }
            if !current.is_object() && !current.is_array() {
                *current = JsonValue::Object(Map::new());
            }
            continue;
        }

        let object = current.as_object_mut().ok_or_else(|| {
            DomainError::validation(format!("'{segment}' parent is not an object in '{path}'"))
        })?;
        if is_last {
            object.insert(segment.to_string(), value);
            return Ok(());
        }
        let child = object
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !child.is_object() && !child.is_array() {
            *child = JsonValue::Object(Map::new());
        }
        current = child;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::catalog::dynamic_parameter_catalog;
    use serde_json::json;

    #[test]
    fn set_simple_path_creates_objects() {
        let mut payload = json!({});
        set_value_at_path(&mut payload, "ems.mode", None, json!("OPTIMIZATION")).unwrap();
        assert_eq!(payload, json!({"ems": {"mode": "OPTIMIZATION"}}));
    }

    #[test]
    fn set_array_selector_updates_matching_device() {
        let mut payload = json!({
            "devices": {"batteries": [
                {"device_id": "lfp", "min_soc_percentage": 5},
                {"device_id": "shaby", "min_soc_percentage": 15}
            ]}
        });
        set_value_at_path(
            &mut payload,
            "devices.batteries[].min_soc_percentage",
            Some("lfp"),
            json!(10),
        )
        .unwrap();
        assert_eq!(
            payload["devices"]["batteries"][0]["min_soc_percentage"],
            json!(10)
        );
        assert_eq!(
            payload["devices"]["batteries"][1]["min_soc_percentage"],
            json!(15)
        );
    }

    #[test]
    fn set_array_selector_appends_missing_device() {
        let mut payload = json!({});
        set_value_at_path(
            &mut payload,
            "devices.batteries[].max_soc_percentage",
            Some("lfp"),
            json!(95),
        )
        .unwrap();
        assert_eq!(
            payload["devices"]["batteries"][0],
            json!({"device_id": "lfp", "max_soc_percentage": 95})
        );
    }

    #[test]
    fn selector_required_for_array_paths() {
        let mut payload = json!({});
        assert!(set_value_at_path(
            &mut payload,
            "devices.batteries[].min_soc_percentage",
            None,
            json!(10)
        )
        .is_err());
    }

    #[test]
    fn validation_flags_out_of_range_soc() {
        let payload = json!({
            "ems": {"mode": "OPTIMIZATION"},
            "devices": {"batteries": [{"device_id": "lfp", "min_soc_percentage": 140}]}
        });
        let outcome = validate_payload(&payload, &dynamic_parameter_catalog());
        assert!(!outcome.valid);
        assert!(outcome.errors.iter().any(|e| e.contains("above maximum")));
    }

    #[test]
    fn validation_flags_unknown_enum_value() {
        let payload = json!({"ems": {"mode": "TURBO"}});
        let outcome = validate_payload(&payload, &dynamic_parameter_catalog());
        assert!(!outcome.valid);
    }

    #[test]
    fn validation_accepts_reasonable_payload() {
        let payload = json!({
            "ems": {"mode": "OPTIMIZATION", "interval": 900},
            "elecprice": {"charges_kwh": 0.23, "vat_rate": 1.19},
            "devices": {"batteries": [{"device_id": "lfp", "min_soc_percentage": 10}]}
        });
        let outcome = validate_payload(&payload, &dynamic_parameter_catalog());
        assert!(outcome.valid, "errors: {:?}", outcome.errors);
    }

    #[test]
    fn normalization_sorts_devices_and_splits_lists() {
        let payload = json!({
            "devices": {"batteries": [
                {"device_id": "shaby"},
                {"device_id": "lfp"}
            ]},
            "measurement": {"keys": "house_load_w, pv_power_w"}
        });
        let normalized = normalize_payload(payload);
        assert_eq!(
            normalized["devices"]["batteries"][0]["device_id"],
            json!("lfp")
        );
        assert_eq!(
            normalized["measurement"]["keys"],
            json!(["house_load_w", "pv_power_w"])
        );
    }
}
