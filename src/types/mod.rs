//! Shared domain types
//!
//! Enumerations and row structs used across the backbone, ingest pipeline,
//! parameter engine and orchestrator.

pub mod channels;
pub mod params;
pub mod runs;
pub mod signals;

pub use channels::{ChannelType, InputChannel};
pub use params::{
    FieldSource, ParameterInputApplyStatus, ProfileRevision, RevisionSource, SetupApplyStatus,
    ValidationStatus,
};
pub use runs::{ArtifactType, PlanInstruction, RunRecord, RunStatus, TriggerSource};
pub use signals::{
    QualityStatus, Resolution, SignalValue, SourceType, ValueType,
};
