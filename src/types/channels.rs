//! Input channel types.
//!
//! A channel is the named ingress an external system publishes through.
//! HTTP is the live ingress; MQTT remains as a disabled alternate sharing
//! the same ingest contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Mqtt,
    Http,
}

impl ChannelType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mqtt => "mqtt",
            Self::Http => "http",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "mqtt" => Ok(Self::Mqtt),
            "http" => Ok(Self::Http),
            other => Err(DomainError::validation(format!(
                "unknown channel type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InputChannel {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub channel_type: String,
    pub enabled: bool,
    pub is_default: bool,
    pub config_json: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InputChannel {
    pub fn channel_type(&self) -> Result<ChannelType, DomainError> {
        ChannelType::parse(&self.channel_type)
    }

    pub fn is_http(&self) -> bool {
        self.channel_type == "http"
    }
}
