//! PV forecast import-provider fallback validation.
//!
//! When the live PV provider fails during a prediction refresh, the
//! orchestrator may switch to a configured import provider — but only when
//! that provider's import profile is actually usable. A profile that is
//! effectively binary (e.g. `[0]*24 + [12000]*24`) is a stuck artifact,
//! not a forecast.

use serde_json::Value as JsonValue;

/// Minimum distinct values an import profile must carry to be usable.
pub const MIN_UNIQUE_IMPORT_VALUES: usize = 3;

/// Check whether `provider_id` is configured with a usable import profile.
/// Returns `(valid, reason)`; the reason explains a refusal.
pub fn is_valid_pv_fallback_provider(
    config_payload: &JsonValue,
    provider_id: &str,
) -> (bool, Option<String>) {
    let Some(pvforecast) = config_payload.get("pvforecast") else {
        return (false, Some("no pvforecast section in EOS config".to_string()));
    };

    if let Some(providers) = pvforecast.get("providers").and_then(JsonValue::as_array) {
        let known = providers
            .iter()
            .filter_map(JsonValue::as_str)
            .any(|candidate| candidate == provider_id);
        if !known {
            return (
                false,
                Some(format!("provider '{provider_id}' not in configured providers")),
            );
        }
    }

    let import_json = pvforecast
        .get("provider_settings")
        .and_then(|settings| settings.get(provider_id))
        .and_then(|provider| provider.get("import_json"));
    let Some(import_json) = import_json else {
        return (false, Some(format!("provider '{provider_id}' has no import_json")));
    };

    // import_json may arrive as an embedded JSON string.
    let decoded;
    let import = match import_json {
        JsonValue::String(raw) => match serde_json::from_str::<JsonValue>(raw) {
            Ok(value) => {
                decoded = value;
                &decoded
            }
            Err(_) => return (false, Some("import_json is not valid JSON".to_string())),
        },
        other => other,
    };

    let series = import
        .get("pvforecast_ac_power")
        .and_then(JsonValue::as_array)
        .or_else(|| import.as_array());
    let Some(series) = series else {
        return (false, Some("import profile has no pvforecast_ac_power series".to_string()));
    };

    if series.is_empty() {
        return (false, Some("import profile is empty".to_string()));
    }

    let mut unique: Vec<u64> = series
        .iter()
        .filter_map(JsonValue::as_f64)
        .map(f64::to_bits)
        .collect();
    unique.sort_unstable();
    unique.dedup();

    if unique.len() < MIN_UNIQUE_IMPORT_VALUES {
        return (
            false,
            Some(format!(
                "too few unique values in import profile ({} < {MIN_UNIQUE_IMPORT_VALUES})",
                unique.len()
            )),
        );
    }

    (true, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pv_config(import_json: JsonValue) -> JsonValue {
        json!({
            "pvforecast": {
                "provider": "PVForecastAkkudoktor",
                "providers": ["PVForecastAkkudoktor", "PVForecastImport"],
                "provider_settings": {
                    "PVForecastImport": {"import_json": import_json}
                }
            }
        })
    }

    #[test]
    fn binary_import_profile_is_refused() {
        let mut profile = vec![0.0; 24];
        profile.extend(vec![12_000.0; 24]);
        let config = pv_config(json!({"pvforecast_ac_power": profile}));

        let (valid, reason) = is_valid_pv_fallback_provider(&config, "PVForecastImport");
        assert!(!valid);
        assert!(reason.unwrap_or_default().contains("too few unique values"));
    }

    #[test]
    fn varied_import_profile_is_accepted() {
        let profile: Vec<f64> = (0..48).map(|i| ((i % 24) * 250) as f64).collect();
        let config = pv_config(json!({"pvforecast_ac_power": profile}));

        let (valid, reason) = is_valid_pv_fallback_provider(&config, "PVForecastImport");
        assert!(valid, "reason: {reason:?}");
    }

    #[test]
    fn string_encoded_import_json_is_decoded() {
        let profile: Vec<f64> = (0..24).map(|i| (i * 100) as f64).collect();
        let embedded = serde_json::to_string(&json!({"pvforecast_ac_power": profile})).unwrap();
        let config = pv_config(json!(embedded));

        let (valid, _) = is_valid_pv_fallback_provider(&config, "PVForecastImport");
        assert!(valid);
    }

    #[test]
    fn unknown_provider_is_refused() {
        let config = pv_config(json!({"pvforecast_ac_power": [1.0, 2.0, 3.0]}));
        let (valid, reason) = is_valid_pv_fallback_provider(&config, "SomethingElse");
        assert!(!valid);
        assert!(reason.unwrap_or_default().contains("not in configured providers"));
    }

    #[test]
    fn missing_import_json_is_refused() {
        let config = json!({
            "pvforecast": {
                "providers": ["PVForecastImport"],
                "provider_settings": {}
            }
        });
        let (valid, _) = is_valid_pv_fallback_provider(&config, "PVForecastImport");
        assert!(!valid);
    }
}
