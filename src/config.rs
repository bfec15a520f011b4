//! Service configuration — environment variables, CLI args, defaults
//!
//! Every knob is an env var with a hard default; a handful of deployment
//! basics (database URL, bind address) can also be given on the command
//! line. Parsing is forgiving: a malformed env value falls back to the
//! default with a warning instead of refusing to start.

use std::str::FromStr;

use tracing::warn;

/// Complete runtime configuration, constructed once at startup and passed
/// down explicitly (no ambient singletons).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Bind address (e.g. "0.0.0.0:8080")
    pub bind_address: String,
    /// Maximum request payload size in bytes (default: 1 MB)
    pub max_payload_size: usize,
    /// Seconds before a live input value counts as stale
    pub live_stale_seconds: i64,

    // ─── EOS optimizer ──────────────────────────────────────────────────
    pub eos_base_url: String,
    pub eos_sync_poll_seconds: u64,
    pub eos_force_run_timeout_seconds: u64,
    pub eos_aligned_scheduler_enabled: bool,
    /// Comma-separated minute set, e.g. "0,15,30,45"
    pub eos_aligned_scheduler_minutes: String,
    pub eos_aligned_scheduler_delay_seconds: u32,
    pub eos_aligned_scheduler_base_interval_seconds: u64,
    pub eos_force_run_pre_refresh_enabled: bool,
    /// One of all|pv|prices|load
    pub eos_force_run_pre_refresh_scope: String,
    pub eos_prediction_pv_import_fallback_enabled: bool,
    pub eos_prediction_pv_import_provider: String,
    pub eos_pv_akkudoktor_azimuth_workaround_enabled: bool,
    pub eos_no_grid_charge_guard_enabled: bool,
    pub eos_no_grid_charge_guard_threshold_w: f64,

    // ─── Signal store retention & jobs ──────────────────────────────────
    pub data_raw_retention_days: i64,
    pub data_rollup_5m_retention_days: i64,
    pub data_rollup_1h_retention_days: i64,
    pub data_rollup_1d_retention_days: i64,
    pub data_rollup_job_seconds: u64,
    pub data_retention_job_seconds: u64,

    // ─── EMR integrator envelopes ───────────────────────────────────────
    pub emr_enabled: bool,
    pub emr_hold_max_seconds: i64,
    pub emr_delta_min_seconds: i64,
    pub emr_delta_max_seconds: i64,
    pub emr_power_min_w: f64,
    pub emr_power_max_w: f64,
    pub emr_house_power_max_w: f64,
    pub emr_pv_power_max_w: f64,
    pub emr_grid_power_max_w: f64,
    pub emr_battery_power_min_w: f64,
    pub emr_battery_power_max_w: f64,
    pub emr_grid_conflict_threshold_w: f64,

    // ─── Measurement sync ───────────────────────────────────────────────
    pub eos_measurement_sync_enabled: bool,
    pub eos_measurement_sync_seconds: u64,
    pub eos_measurement_sync_force_timeout_seconds: u64,

    // ─── Dynamic parameters & setup fields ──────────────────────────────
    pub param_dynamic_enabled: bool,
    pub param_dynamic_allow_http: bool,
    pub http_override_active_seconds: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            bind_address: "0.0.0.0:8080".to_string(),
            max_payload_size: 1_048_576,
            live_stale_seconds: 120,
            eos_base_url: "http://eos:8503".to_string(),
            eos_sync_poll_seconds: 30,
            eos_force_run_timeout_seconds: 240,
            eos_aligned_scheduler_enabled: true,
            eos_aligned_scheduler_minutes: "0,15,30,45".to_string(),
            eos_aligned_scheduler_delay_seconds: 1,
            eos_aligned_scheduler_base_interval_seconds: 86_400,
            eos_force_run_pre_refresh_enabled: true,
            eos_force_run_pre_refresh_scope: "all".to_string(),
            eos_prediction_pv_import_fallback_enabled: true,
            eos_prediction_pv_import_provider: "PVForecastImport".to_string(),
            eos_pv_akkudoktor_azimuth_workaround_enabled: true,
            eos_no_grid_charge_guard_enabled: true,
            eos_no_grid_charge_guard_threshold_w: 50.0,
            data_raw_retention_days: 35,
            data_rollup_5m_retention_days: 400,
            data_rollup_1h_retention_days: 1825,
            data_rollup_1d_retention_days: 0,
            data_rollup_job_seconds: 300,
            data_retention_job_seconds: 3600,
            emr_enabled: true,
            emr_hold_max_seconds: 300,
            emr_delta_min_seconds: 1,
            emr_delta_max_seconds: 3600,
            emr_power_min_w: 0.0,
            emr_power_max_w: 50_000.0,
            emr_house_power_max_w: 60_000.0,
            emr_pv_power_max_w: 60_000.0,
            emr_grid_power_max_w: 60_000.0,
            emr_battery_power_min_w: -25_000.0,
            emr_battery_power_max_w: 25_000.0,
            emr_grid_conflict_threshold_w: 50.0,
            eos_measurement_sync_enabled: true,
            eos_measurement_sync_seconds: 30,
            eos_measurement_sync_force_timeout_seconds: 20,
            param_dynamic_enabled: true,
            param_dynamic_allow_http: true,
            http_override_active_seconds: 120,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with CLI overrides.
    pub fn from_env(
        database_url: Option<String>,
        bind_address: Option<String>,
        port: Option<u16>,
    ) -> anyhow::Result<Self> {
        let mut config = Self::default();

        // Database URL: CLI arg > env var
        config.database_url = database_url
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_default();

        if let Some(addr) = bind_address {
            config.bind_address = addr;
        } else if let Some(p) = port {
            config.bind_address = format!("0.0.0.0:{p}");
        } else if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            config.bind_address = addr;
        }

        env_parse("MAX_PAYLOAD_SIZE", &mut config.max_payload_size);
        env_parse("LIVE_STALE_SECONDS", &mut config.live_stale_seconds);

        if let Ok(url) = std::env::var("EOS_BASE_URL") {
            config.eos_base_url = url;
        }
        env_parse("EOS_SYNC_POLL_SECONDS", &mut config.eos_sync_poll_seconds);
        env_parse(
            "EOS_FORCE_RUN_TIMEOUT_SECONDS",
            &mut config.eos_force_run_timeout_seconds,
        );
        env_parse(
            "EOS_ALIGNED_SCHEDULER_ENABLED",
            &mut config.eos_aligned_scheduler_enabled,
        );
        if let Ok(minutes) = std::env::var("EOS_ALIGNED_SCHEDULER_MINUTES") {
            config.eos_aligned_scheduler_minutes = minutes;
        }
        env_parse(
            "EOS_ALIGNED_SCHEDULER_DELAY_SECONDS",
            &mut config.eos_aligned_scheduler_delay_seconds,
        );
        env_parse(
            "EOS_ALIGNED_SCHEDULER_BASE_INTERVAL_SECONDS",
            &mut config.eos_aligned_scheduler_base_interval_seconds,
        );
        env_parse(
            "EOS_FORCE_RUN_PRE_REFRESH_ENABLED",
            &mut config.eos_force_run_pre_refresh_enabled,
        );
        if let Ok(scope) = std::env::var("EOS_FORCE_RUN_PRE_REFRESH_SCOPE") {
            config.eos_force_run_pre_refresh_scope = scope;
        }
        env_parse(
            "EOS_PREDICTION_PV_IMPORT_FALLBACK_ENABLED",
            &mut config.eos_prediction_pv_import_fallback_enabled,
        );
        if let Ok(provider) = std::env::var("EOS_PREDICTION_PV_IMPORT_PROVIDER") {
            config.eos_prediction_pv_import_provider = provider;
        }
        env_parse(
            "EOS_PV_AKKUDOKTOR_AZIMUTH_WORKAROUND_ENABLED",
            &mut config.eos_pv_akkudoktor_azimuth_workaround_enabled,
        );
        env_parse(
            "EOS_NO_GRID_CHARGE_GUARD_ENABLED",
            &mut config.eos_no_grid_charge_guard_enabled,
        );
        env_parse(
            "EOS_NO_GRID_CHARGE_GUARD_THRESHOLD_W",
            &mut config.eos_no_grid_charge_guard_threshold_w,
        );

        env_parse("DATA_RAW_RETENTION_DAYS", &mut config.data_raw_retention_days);
        env_parse(
            "DATA_ROLLUP_5M_RETENTION_DAYS",
            &mut config.data_rollup_5m_retention_days,
        );
        env_parse(
            "DATA_ROLLUP_1H_RETENTION_DAYS",
            &mut config.data_rollup_1h_retention_days,
        );
        env_parse(
            "DATA_ROLLUP_1D_RETENTION_DAYS",
            &mut config.data_rollup_1d_retention_days,
        );
        env_parse("DATA_ROLLUP_JOB_SECONDS", &mut config.data_rollup_job_seconds);
        env_parse(
            "DATA_RETENTION_JOB_SECONDS",
            &mut config.data_retention_job_seconds,
        );

        env_parse("EMR_ENABLED", &mut config.emr_enabled);
        env_parse("EMR_HOLD_MAX_SECONDS", &mut config.emr_hold_max_seconds);
        env_parse("EMR_DELTA_MIN_SECONDS", &mut config.emr_delta_min_seconds);
        env_parse("EMR_DELTA_MAX_SECONDS", &mut config.emr_delta_max_seconds);
        env_parse("EMR_POWER_MIN_W", &mut config.emr_power_min_w);
        env_parse("EMR_POWER_MAX_W", &mut config.emr_power_max_w);
        env_parse("EMR_HOUSE_POWER_MAX_W", &mut config.emr_house_power_max_w);
        env_parse("EMR_PV_POWER_MAX_W", &mut config.emr_pv_power_max_w);
        env_parse("EMR_GRID_POWER_MAX_W", &mut config.emr_grid_power_max_w);
        env_parse("EMR_BATTERY_POWER_MIN_W", &mut config.emr_battery_power_min_w);
        env_parse("EMR_BATTERY_POWER_MAX_W", &mut config.emr_battery_power_max_w);
        env_parse(
            "EMR_GRID_CONFLICT_THRESHOLD_W",
            &mut config.emr_grid_conflict_threshold_w,
        );

        env_parse(
            "EOS_MEASUREMENT_SYNC_ENABLED",
            &mut config.eos_measurement_sync_enabled,
        );
        env_parse(
            "EOS_MEASUREMENT_SYNC_SECONDS",
            &mut config.eos_measurement_sync_seconds,
        );
        env_parse(
            "EOS_MEASUREMENT_SYNC_FORCE_TIMEOUT_SECONDS",
            &mut config.eos_measurement_sync_force_timeout_seconds,
        );

        env_parse("PARAM_DYNAMIC_ENABLED", &mut config.param_dynamic_enabled);
        env_parse(
            "PARAM_DYNAMIC_ALLOW_HTTP",
            &mut config.param_dynamic_allow_http,
        );
        env_parse(
            "HTTP_OVERRIDE_ACTIVE_SECONDS",
            &mut config.http_override_active_seconds,
        );

        Ok(config)
    }

    /// Parse the aligned-scheduler minute set. Malformed or out-of-range
    /// entries are dropped; an empty result falls back to the default set.
    pub fn aligned_scheduler_minute_set(&self) -> Vec<u32> {
        let mut minutes: Vec<u32> = self
            .eos_aligned_scheduler_minutes
            .split(',')
            .filter_map(|part| part.trim().parse::<u32>().ok())
            .filter(|minute| *minute < 60)
            .collect();
        minutes.sort_unstable();
        minutes.dedup();
        if minutes.is_empty() {
            vec![0, 15, 30, 45]
        } else {
            minutes
        }
    }
}

/// Parse an env var into `target`, keeping the existing value (and warning)
/// when the var is present but malformed.
fn env_parse<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!(var = name, value = %raw, "ignoring malformed env value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_set_parses_and_sorts() {
        let config = AppConfig {
            eos_aligned_scheduler_minutes: "45, 0,15,30".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.aligned_scheduler_minute_set(), vec![0, 15, 30, 45]);
    }

    #[test]
    fn minute_set_drops_invalid_entries() {
        let config = AppConfig {
            eos_aligned_scheduler_minutes: "5,xx,75,5".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.aligned_scheduler_minute_set(), vec![5]);
    }

    #[test]
    fn minute_set_falls_back_when_empty() {
        let config = AppConfig {
            eos_aligned_scheduler_minutes: "".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.aligned_scheduler_minute_set(), vec![0, 15, 30, 45]);
    }
}
