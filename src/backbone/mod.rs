//! Signal backbone — canonical measurement log, latest-state cache,
//! rollup tiers, catalog and retention
//!
//! Every inbound value funnels through [`store::ingest_signal_measurement`]:
//! catalog upsert (value type and unit frozen at first sight), dedup-guarded
//! raw insert, conditional latest-state update — one transaction per ingest.
//! Rollup and retention run as background jobs recorded in `data_job_runs`.

pub mod retention;
pub mod rollup;
pub mod status;
pub mod store;

pub use status::{get_data_pipeline_status, DataPipelineStatus, JobRunSnapshot};
pub use store::{
    fetch_signal_series, ingest_signal_measurement, list_latest_by_signal_keys,
    list_signals_with_latest, SignalIngest, SignalSeries,
};

/// Signals the optimizer is allowed to stage under `prediction.*`.
/// Authoritative allowlist; every other prediction key is rejected at ingest.
pub const PREDICTION_SIGNAL_ALLOWLIST: &[&str] = &[
    "prediction.elecprice_marketprice_wh",
    "prediction.elecprice_marketprice_kwh",
    "prediction.pvforecast_ac_power",
    "prediction.pvforecastakkudoktor_ac_power_any",
    "prediction.loadforecast_power_w",
    "prediction.load_mean_adjusted",
    "prediction.load_mean",
    "prediction.loadakkudoktor_mean_power_w",
];

/// Whether a signal key passes the prediction ingest gate. Non-prediction
/// keys always pass.
pub fn prediction_key_allowed(signal_key: &str) -> bool {
    !signal_key.starts_with("prediction.") || PREDICTION_SIGNAL_ALLOWLIST.contains(&signal_key)
}

/// Canonical unit inferred from well-known field suffixes; explicit mapping
/// units win for everything else.
pub fn canonical_unit_for_field(eos_field: &str, unit: Option<&str>) -> Option<String> {
    let field = eos_field.trim().to_lowercase();
    if field.ends_with("_w") {
        return Some("W".to_string());
    }
    if field.ends_with("_wh") {
        return Some("Wh".to_string());
    }
    if field.ends_with("_pct") || field.ends_with("_percentage") {
        return Some("%".to_string());
    }
    if field.contains("euro_pro_wh") {
        return Some("EUR/Wh".to_string());
    }
    unit.map(str::to_string)
}

/// `ingest_lag_ms = clamp((ingested_at - ts) in ms, 0, i32::MAX)`.
/// Future-dated signals yield 0.
pub fn ingest_lag_ms(
    ingested_at: chrono::DateTime<chrono::Utc>,
    ts: chrono::DateTime<chrono::Utc>,
) -> i32 {
    let lag = ingested_at.signed_duration_since(ts).num_milliseconds();
    lag.clamp(0, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn lag_clamps_to_int32_max() {
        let ingested_at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        let ts = ingested_at - Duration::days(40);
        assert_eq!(ingest_lag_ms(ingested_at, ts), 2_147_483_647);
    }

    #[test]
    fn lag_for_future_signal_is_zero() {
        let ingested_at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        let ts = ingested_at + Duration::minutes(5);
        assert_eq!(ingest_lag_ms(ingested_at, ts), 0);
    }

    #[test]
    fn lag_for_recent_signal_is_exact() {
        let ingested_at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 1).unwrap();
        let ts = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        assert_eq!(ingest_lag_ms(ingested_at, ts), 1000);
    }

    #[test]
    fn prediction_gate_uses_allowlist() {
        assert!(prediction_key_allowed("prediction.pvforecast_ac_power"));
        assert!(prediction_key_allowed("house_load_w"));
        assert!(!prediction_key_allowed("prediction.someone_elses_series"));
    }

    #[test]
    fn unit_inference_by_suffix() {
        assert_eq!(canonical_unit_for_field("house_load_w", None).as_deref(), Some("W"));
        assert_eq!(canonical_unit_for_field("grid_import_wh", None).as_deref(), Some("Wh"));
        assert_eq!(canonical_unit_for_field("battery_soc_pct", None).as_deref(), Some("%"));
        assert_eq!(
            canonical_unit_for_field("preis_euro_pro_wh", None).as_deref(),
            Some("EUR/Wh")
        );
        assert_eq!(canonical_unit_for_field("ems_mode", Some("x")).as_deref(), Some("x"));
        assert_eq!(canonical_unit_for_field("ems_mode", None), None);
    }
}
