//! Signal backbone types: value variants, quality, provenance, resolutions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;

/// Declared value type of a catalog signal. Frozen at first ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Number,
    Text,
    Bool,
    Json,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Bool => "bool",
            Self::Json => "json",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "number" => Ok(Self::Number),
            "text" => Ok(Self::Text),
            "bool" => Ok(Self::Bool),
            "json" => Ok(Self::Json),
            other => Err(DomainError::validation(format!(
                "unknown value type '{other}'"
            ))),
        }
    }
}

/// Quality classification carried on every measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Ok,
    Gap,
    Interpolated,
}

impl QualityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Gap => "gap",
            Self::Interpolated => "interpolated",
        }
    }
}

/// Provenance of a measurement row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    HttpInput,
    MqttInput,
    ParamInput,
    FixedInput,
    EosPrediction,
    EosPlan,
    EosSolution,
    DeviceFeedback,
    Derived,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpInput => "http_input",
            Self::MqttInput => "mqtt_input",
            Self::ParamInput => "param_input",
            Self::FixedInput => "fixed_input",
            Self::EosPrediction => "eos_prediction",
            Self::EosPlan => "eos_plan",
            Self::EosSolution => "eos_solution",
            Self::DeviceFeedback => "device_feedback",
            Self::Derived => "derived",
        }
    }
}

/// Series resolution selector for `fetch_signal_series`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Raw,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::FiveMinutes => "5m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "raw" => Ok(Self::Raw),
            "5m" => Ok(Self::FiveMinutes),
            "1h" => Ok(Self::OneHour),
            "1d" => Ok(Self::OneDay),
            other => Err(DomainError::validation(format!(
                "unknown resolution '{other}' (expected raw|5m|1h|1d)"
            ))),
        }
    }
}

/// A typed measurement value. Exactly one of the four storage columns is
/// populated per row; this variant keeps ingest call sites honest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Json(JsonValue),
}

impl SignalValue {
    /// Infer the catalog value type for a freshly parsed payload string.
    /// Numeric first, then booleans, then JSON containers, else text.
    pub fn infer_from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(num) = trimmed.parse::<f64>() {
            if num.is_finite() {
                return Self::Number(num);
            }
        }
        match trimmed {
            "true" | "True" => return Self::Bool(true),
            "false" | "False" => return Self::Bool(false),
            _ => {}
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(json) = serde_json::from_str::<JsonValue>(trimmed) {
                return Self::Json(json);
            }
        }
        Self::Text(raw.to_string())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Number(_) => ValueType::Number,
            Self::Bool(_) => ValueType::Bool,
            Self::Text(_) => ValueType::Text,
            Self::Json(_) => ValueType::Json,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Split into the four nullable storage columns.
    pub fn columns(&self) -> (Option<f64>, Option<&str>, Option<bool>, Option<&JsonValue>) {
        match self {
            Self::Number(n) => (Some(*n), None, None, None),
            Self::Text(t) => (None, Some(t.as_str()), None, None),
            Self::Bool(b) => (None, None, Some(*b), None),
            Self::Json(j) => (None, None, None, Some(j)),
        }
    }
}

/// Catalog row joined with the latest-state cache.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SignalLatestItem {
    pub signal_key: String,
    pub label: String,
    pub value_type: String,
    pub canonical_unit: Option<String>,
    pub tags_json: JsonValue,
    pub last_ts: Option<DateTime<Utc>>,
    pub last_value_num: Option<f64>,
    pub last_value_text: Option<String>,
    pub last_value_bool: Option<bool>,
    pub last_value_json: Option<JsonValue>,
    pub last_quality_status: Option<String>,
    pub last_source_type: Option<String>,
    pub last_run_id: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One point of a signal series. Raw reads populate the value columns,
/// rollup reads populate the aggregate columns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalSeriesPoint {
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_num: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_bool: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_json: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_num: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_num: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_num: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum_num: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_num: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_num: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_prefers_number_over_text() {
        assert_eq!(SignalValue::infer_from_text("1234"), SignalValue::Number(1234.0));
        assert_eq!(SignalValue::infer_from_text(" 12.5 "), SignalValue::Number(12.5));
    }

    #[test]
    fn infer_detects_bool_and_json() {
        assert_eq!(SignalValue::infer_from_text("true"), SignalValue::Bool(true));
        assert!(matches!(
            SignalValue::infer_from_text(r#"{"a":1}"#),
            SignalValue::Json(_)
        ));
    }

    #[test]
    fn infer_falls_back_to_text() {
        assert_eq!(
            SignalValue::infer_from_text("OPTIMIZATION"),
            SignalValue::Text("OPTIMIZATION".to_string())
        );
        // Malformed JSON container stays text.
        assert_eq!(
            SignalValue::infer_from_text("{broken"),
            SignalValue::Text("{broken".to_string())
        );
    }

    #[test]
    fn resolution_round_trip() {
        for raw in ["raw", "5m", "1h", "1d"] {
            let parsed = Resolution::parse(raw).unwrap();
            assert_eq!(parsed.as_str(), raw);
        }
        assert!(Resolution::parse("2h").is_err());
    }
}
