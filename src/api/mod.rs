//! HTTP edge — route registration and shared state
//!
//! Handlers are thin adapters: parse the request, call into the domain
//! modules, map typed errors onto status codes. All domain logic lives in
//! the backbone, ingest, params, orchestrator and output modules.

pub mod data;
pub mod error;
pub mod health;
pub mod ingest;
pub mod legacy;
pub mod outputs;
pub mod parameters;
pub mod runs;
pub mod setup;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::ingest::InputIngestPipeline;
use crate::jobs::JobSupervisor;
use crate::orchestrator::Orchestrator;
use crate::prefs::PreferenceCache;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub ingest: InputIngestPipeline,
    pub orchestrator: Orchestrator,
    pub prefs: Arc<PreferenceCache>,
    pub supervisor: JobSupervisor,
}

/// Client identification: first `x-forwarded-for` hop, falling back to
/// the transport peer address.
pub fn extract_client_id(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first_hop = forwarded.split(',').next().map(str::trim).unwrap_or("");
        if !first_hop.is_empty() {
            return Some(first_hop.to_string());
        }
    }
    connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Minimal percent-decoding for query values (`%XX` escapes and `+` as
/// space).
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            b'%' if index + 2 < bytes.len() => {
                let hex = bytes.get(index + 1..index + 3);
                match hex.and_then(|hex| {
                    std::str::from_utf8(hex)
                        .ok()
                        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                }) {
                    Some(byte) => {
                        decoded.push(byte);
                        index += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        index += 1;
                    }
                }
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Parse repeated query parameters (`?signal_key=a&signal_key=b`) out of a
/// raw query string.
pub fn repeated_query_values(raw_query: Option<&str>, name: &str) -> Vec<String> {
    let Some(raw) = raw_query else {
        return Vec::new();
    };
    raw.split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| *key == name)
        .map(|(_, value)| percent_decode(value))
        .filter(|value| !value.is_empty())
        .collect()
}

/// Build the complete API router.
pub fn build_router(state: AppState) -> Router {
    let max_payload = state.config.max_payload_size;

    Router::new()
        .route("/health", get(health::get_health))
        // Signal backbone
        .route("/api/data/signals", get(data::get_signals))
        .route("/api/data/latest", get(data::get_latest))
        .route("/api/data/series", get(data::get_series))
        .route("/api/data/retention/status", get(data::get_retention_status))
        .route("/api/data/power/latest", get(data::get_power_latest))
        .route("/api/data/power/series", get(data::get_power_series))
        .route("/api/data/emr/latest", get(data::get_emr_latest))
        .route("/api/data/emr/series", get(data::get_emr_series))
        // Ingest
        .route("/eos/input/*channel_or_path", get(ingest::ingest_http_get))
        .route("/api/input/http/push", post(ingest::ingest_http_post))
        // Output projection
        .route("/api/eos/output-signals", get(outputs::get_output_signals))
        .route("/eos/get/outputs", get(outputs::get_outputs_external))
        // Setup fields
        .route("/api/setup/fields", post(setup::patch_setup_fields))
        .route("/api/setup/layout", get(setup::get_layout))
        .route("/api/setup/readiness", get(setup::get_readiness))
        .route("/eos/set/*path", put(setup::put_setup_field))
        // Parameter profile
        .route("/api/parameters/profile", get(parameters::get_profile_detail))
        .route("/api/parameters/draft", put(parameters::update_draft))
        .route("/api/parameters/validate", post(parameters::validate_payload))
        .route("/api/parameters/apply", post(parameters::apply_revision))
        .route("/api/parameters/catalog", get(parameters::get_catalog))
        // Runs & runtime
        .route("/api/eos/runs", get(runs::list_runs))
        .route("/api/eos/runs/:run_id", get(runs::get_run_detail))
        .route("/api/eos/runs/:run_id/plan", get(runs::get_run_plan))
        .route("/api/eos/runs/:run_id/solution", get(runs::get_run_solution))
        .route("/api/eos/force-run", post(runs::force_run))
        .route("/api/eos/predictions/refresh", post(runs::refresh_predictions))
        .route("/api/eos/status", get(runs::get_runtime_status))
        .route("/api/eos/auto-run", post(runs::set_auto_run))
        .route(
            "/api/eos/measurement-sync/status",
            get(runs::get_measurement_sync_status),
        )
        .route(
            "/api/eos/measurement-sync/force",
            post(runs::force_measurement_sync),
        )
        .route(
            "/api/eos/measurement-sync/enabled",
            post(runs::set_measurement_sync_enabled),
        )
        // Legacy surface
        .merge(legacy::legacy_router())
        .layer(RequestBodyLimitLayer::new(max_payload))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_query_values_parses_multi_args() {
        let raw = Some("signal_key=a&limit=5&signal_key=b.c");
        assert_eq!(
            repeated_query_values(raw, "signal_key"),
            vec!["a".to_string(), "b.c".to_string()]
        );
        assert_eq!(repeated_query_values(raw, "missing"), Vec::<String>::new());
        assert_eq!(repeated_query_values(None, "signal_key"), Vec::<String>::new());
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let raw = Some("from=2026-02-21T14%3A00%3A00Z&to=2026-02-21T15:00:00%2B00:00");
        assert_eq!(
            repeated_query_values(raw, "from"),
            vec!["2026-02-21T14:00:00Z".to_string()]
        );
        assert_eq!(
            repeated_query_values(raw, "to"),
            vec!["2026-02-21T15:00:00+00:00".to_string()]
        );
    }

    #[test]
    fn client_id_prefers_forwarded_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        assert_eq!(extract_client_id(&headers, None), Some("10.0.0.1".to_string()));

        let headers = HeaderMap::new();
        let addr: SocketAddr = "192.168.1.5:443".parse().unwrap();
        let info = ConnectInfo(addr);
        assert_eq!(
            extract_client_id(&headers, Some(&info)),
            Some("192.168.1.5".to_string())
        );
    }
}
