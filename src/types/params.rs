//! Parameter profile and setup-field types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;

/// Where a profile revision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionSource {
    Manual,
    Import,
    Bootstrap,
    EosPull,
    DynamicInput,
}

impl RevisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Import => "import",
            Self::Bootstrap => "bootstrap",
            Self::EosPull => "eos_pull",
            Self::DynamicInput => "dynamic_input",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Unknown,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Unknown => "unknown",
        }
    }
}

/// Origin of a setup-field override event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Ui,
    Http,
    Import,
    System,
}

impl FieldSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Http => "http",
            Self::Import => "import",
            Self::System => "system",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "ui" => Ok(Self::Ui),
            "http" => Ok(Self::Http),
            "import" => Ok(Self::Import),
            "system" => Ok(Self::System),
            other => Err(DomainError::validation(format!(
                "unknown field source '{other}'"
            ))),
        }
    }
}

/// Lifecycle status of a setup-field event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupApplyStatus {
    Accepted,
    Applied,
    Rejected,
    Failed,
}

impl SetupApplyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Lifecycle status of a dynamic parameter input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterInputApplyStatus {
    Accepted,
    Rejected,
    Applied,
    ApplyFailed,
    IgnoredUnbound,
    BlockedNoActiveProfile,
}

impl ParameterInputApplyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Applied => "applied",
            Self::ApplyFailed => "apply_failed",
            Self::IgnoredUnbound => "ignored_unbound",
            Self::BlockedNoActiveProfile => "blocked_no_active_profile",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProfileRevision {
    pub id: i64,
    pub profile_id: i64,
    pub revision_no: i32,
    pub source: String,
    pub payload_json: JsonValue,
    pub validation_status: String,
    pub validation_issues_json: Option<JsonValue>,
    pub is_current_draft: bool,
    pub is_last_applied: bool,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}
