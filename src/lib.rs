//! eos-hub: energy-management orchestration backend
//!
//! Ingests household energy telemetry over HTTP, normalizes it into a
//! canonical time-series signal store, maintains the parameter profile
//! driving the external EOS optimizer, runs aligned optimization runs,
//! and serves the resulting control signals to pull consumers.
//!
//! ## Architecture
//!
//! - **parser**: payload / timestamp decoding for inbound events
//! - **backbone**: signal catalog, measurement log, rollups, retention
//! - **emr**: power-sample integration into energy-meter registers
//! - **ingest**: channel-routed ingest pipeline feeding the backbone
//! - **params**: profile revisions, setup fields, dynamic bindings
//! - **orchestrator**: aligned runs against EOS, artifacts, safety gates
//! - **output**: pull-based current output signal bundle
//! - **prefs / jobs**: persisted toggles and supervised background loops
//! - **api**: the axum HTTP edge

pub mod api;
pub mod backbone;
pub mod config;
pub mod db;
pub mod emr;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod orchestrator;
pub mod output;
pub mod params;
pub mod parser;
pub mod prefs;
pub mod types;

pub use config::AppConfig;
pub use error::{DomainError, DomainResult};
