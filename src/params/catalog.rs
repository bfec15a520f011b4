//! Dynamic parameter catalog — the known dotted parameter paths with
//! their constraints. Drives payload validation and the binding surface.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterValueType {
    Number,
    Enum,
    StringList,
    Text,
}

#[derive(Debug, Clone, Serialize)]
pub struct DynamicParameterEntry {
    pub parameter_key: String,
    pub label: String,
    pub hint: String,
    pub value_type: ParameterValueType,
    pub expected_unit: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub options: Vec<String>,
    pub requires_selector: bool,
    pub examples: Vec<String>,
}

impl DynamicParameterEntry {
    #[allow(clippy::too_many_arguments)]
    fn number(
        parameter_key: &str,
        label: &str,
        hint: &str,
        unit: Option<&str>,
        minimum: f64,
        maximum: f64,
        requires_selector: bool,
        example: &str,
    ) -> Self {
        Self {
            parameter_key: parameter_key.to_string(),
            label: label.to_string(),
            hint: hint.to_string(),
            value_type: ParameterValueType::Number,
            expected_unit: unit.map(str::to_string),
            minimum: Some(minimum),
            maximum: Some(maximum),
            options: Vec::new(),
            requires_selector,
            examples: vec![example.to_string()],
        }
    }

    fn string_list(parameter_key: &str, label: &str, example: &str) -> Self {
        Self {
            parameter_key: parameter_key.to_string(),
            label: label.to_string(),
            hint: "Comma-separated list or JSON list.".to_string(),
            value_type: ParameterValueType::StringList,
            expected_unit: None,
            minimum: None,
            maximum: None,
            options: Vec::new(),
            requires_selector: false,
            examples: vec![example.to_string()],
        }
    }
}

/// The full catalog. Selector-bearing paths (`[]`) address device array
/// elements by device id.
pub fn dynamic_parameter_catalog() -> Vec<DynamicParameterEntry> {
    let mut entries = vec![DynamicParameterEntry {
        parameter_key: "ems.mode".to_string(),
        label: "EMS mode".to_string(),
        hint: "Execution mode of the energy management run loop.".to_string(),
        value_type: ParameterValueType::Enum,
        expected_unit: None,
        minimum: None,
        maximum: None,
        options: vec![
            "OPTIMIZATION".to_string(),
            "IDLE".to_string(),
            "DISABLED".to_string(),
        ],
        requires_selector: false,
        examples: vec!["OPTIMIZATION".to_string()],
    }];

    entries.push(DynamicParameterEntry::number(
        "ems.interval",
        "EMS interval",
        "Seconds between automatic runs.",
        Some("s"),
        1.0,
        86_400.0,
        false,
        "900",
    ));

    for (key, label) in [
        ("devices.batteries[].min_soc_percentage", "Battery min SoC"),
        ("devices.batteries[].max_soc_percentage", "Battery max SoC"),
        ("devices.electric_vehicles[].min_soc_percentage", "EV min SoC"),
        ("devices.electric_vehicles[].max_soc_percentage", "EV max SoC"),
    ] {
        entries.push(DynamicParameterEntry::number(
            key,
            label,
            "State-of-charge bound in percent.",
            Some("%"),
            0.0,
            100.0,
            true,
            "10",
        ));
    }

    for (key, label) in [
        ("devices.batteries[].min_charge_power_w", "Battery min charge power"),
        ("devices.batteries[].max_charge_power_w", "Battery max charge power"),
        ("devices.electric_vehicles[].min_charge_power_w", "EV min charge power"),
        ("devices.electric_vehicles[].max_charge_power_w", "EV max charge power"),
        ("devices.inverters[].max_power_w", "Inverter max power"),
    ] {
        entries.push(DynamicParameterEntry::number(
            key,
            label,
            "Power bound in watts.",
            Some("W"),
            0.0,
            100_000.0,
            true,
            "11000",
        ));
    }

    entries.push(DynamicParameterEntry::number(
        "elecprice.charges_kwh",
        "Electricity price surcharge",
        "Additional cost per kWh in EUR/kWh.",
        Some("EUR/kWh"),
        0.0,
        10.0,
        false,
        "0.23",
    ));
    entries.push(DynamicParameterEntry::number(
        "elecprice.vat_rate",
        "VAT factor",
        "Factor, e.g. 1.19 for 19%.",
        Some("x"),
        0.0,
        5.0,
        false,
        "1.19",
    ));
    entries.push(DynamicParameterEntry::number(
        "feedintariff.provider_settings.FeedInTariffFixed.feed_in_tariff_kwh",
        "Feed-in tariff",
        "Fixed feed-in tariff in EUR/kWh.",
        Some("EUR/kWh"),
        0.0,
        10.0,
        false,
        "0.09",
    ));

    entries.push(DynamicParameterEntry::string_list(
        "measurement.keys",
        "Measurement keys",
        "house_load_w,pv_power_w",
    ));
    entries.push(DynamicParameterEntry::string_list(
        "measurement.load_emr_keys",
        "Load EMR keys",
        "house_load_emr_kwh",
    ));
    entries.push(DynamicParameterEntry::string_list(
        "measurement.grid_import_emr_keys",
        "Grid import EMR keys",
        "grid_import_emr_kwh",
    ));
    entries.push(DynamicParameterEntry::string_list(
        "measurement.grid_export_emr_keys",
        "Grid export EMR keys",
        "grid_export_emr_kwh",
    ));
    entries.push(DynamicParameterEntry::string_list(
        "measurement.pv_production_emr_keys",
        "PV production EMR keys",
        "pv_production_emr_kwh",
    ));

    entries
}

/// Look up a catalog entry by parameter key.
pub fn catalog_entry(parameter_key: &str) -> Option<DynamicParameterEntry> {
    dynamic_parameter_catalog()
        .into_iter()
        .find(|entry| entry.parameter_key == parameter_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_selector_paths() {
        let catalog = dynamic_parameter_catalog();
        let battery = catalog
            .iter()
            .find(|e| e.parameter_key == "devices.batteries[].min_soc_percentage")
            .unwrap();
        assert!(battery.requires_selector);
        assert_eq!(battery.maximum, Some(100.0));
    }

    #[test]
    fn lookup_by_key() {
        assert!(catalog_entry("ems.mode").is_some());
        assert!(catalog_entry("nonsense.key").is_none());
    }
}
