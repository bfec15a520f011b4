//! Optimization run types: lifecycle, trigger sources, artifacts, plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Run state machine: pending -> running -> succeeded | failed | aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    AlignedScheduler,
    Force,
    AutoPreset,
    PreRefresh,
}

impl TriggerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlignedScheduler => "aligned_scheduler",
            Self::Force => "force",
            Self::AutoPreset => "auto_preset",
            Self::PreRefresh => "pre_refresh",
        }
    }
}

/// Typed blobs persisted under a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    ParameterPayload,
    Mappings,
    LiveState,
    RuntimeConfig,
    AssembledEosInput,
    Plan,
    Solution,
    Health,
}

impl ArtifactType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParameterPayload => "parameter_payload",
            Self::Mappings => "mappings",
            Self::LiveState => "live_state",
            Self::RuntimeConfig => "runtime_config",
            Self::AssembledEosInput => "assembled_eos_input",
            Self::Plan => "plan",
            Self::Solution => "solution",
            Self::Health => "health",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RunRecord {
    pub id: i64,
    pub trigger_source: String,
    pub run_mode: String,
    pub eos_last_run_datetime: Option<DateTime<Utc>>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlanInstruction {
    pub id: i64,
    pub run_id: i64,
    pub plan_id: String,
    pub instruction_index: i64,
    pub instruction_type: String,
    pub resource_id: Option<String>,
    pub actuator_id: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub execution_time: Option<DateTime<Utc>>,
    pub operation_mode_id: Option<String>,
    pub operation_mode_factor: Option<f64>,
    pub payload_json: JsonValue,
    pub created_at: DateTime<Utc>,
}
