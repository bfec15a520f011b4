//! EMR integrator — power samples to cumulative energy-meter registers
//!
//! Converts instantaneous `(key, ts, value_w)` power samples into monotonic
//! `(emr_key, ts, emr_kwh)` registers. The integration decision
//! ([`integrate_step`]) is pure; persistence applies the decision against
//! `power_samples` and `energy_emr`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::DomainResult;

/// Power keys the integrator derives registers for. Static mapping: one
/// EMR key per power key.
pub const POWER_KEYS: &[&str] = &[
    "house_load_w",
    "pv_power_w",
    "grid_power_w",
    "grid_import_power_w",
    "grid_export_power_w",
    "battery_power_w",
];

/// Static power-key → EMR-register mapping.
pub fn emr_key_for_power_key(power_key: &str) -> Option<&'static str> {
    match power_key {
        "house_load_w" => Some("house_load_emr_kwh"),
        "pv_power_w" => Some("pv_production_emr_kwh"),
        "grid_power_w" => Some("grid_emr_kwh"),
        "grid_import_power_w" => Some("grid_import_emr_kwh"),
        "grid_export_power_w" => Some("grid_export_emr_kwh"),
        "battery_power_w" => Some("battery_emr_kwh"),
        _ => None,
    }
}

/// All known EMR register keys, sorted.
pub fn emr_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = POWER_KEYS
        .iter()
        .filter_map(|key| emr_key_for_power_key(key))
        .collect();
    keys.sort_unstable();
    keys
}

/// Acceptance envelope and delta policy, derived from config per key class.
#[derive(Debug, Clone, Copy)]
pub struct EmrPolicy {
    pub power_min_w: f64,
    pub power_max_w: f64,
    pub delta_min_seconds: i64,
    pub delta_max_seconds: i64,
}

impl EmrPolicy {
    /// Per-key envelope: PV / house / grid use their own positive maxima,
    /// battery carries a signed range, unknown keys the generic envelope.
    pub fn for_key(config: &AppConfig, power_key: &str) -> Self {
        let (min_w, max_w) = match power_key {
            "pv_power_w" => (0.0, config.emr_pv_power_max_w),
            "house_load_w" => (0.0, config.emr_house_power_max_w),
            "grid_power_w" | "grid_import_power_w" | "grid_export_power_w" => {
                (0.0, config.emr_grid_power_max_w)
            }
            "battery_power_w" => (config.emr_battery_power_min_w, config.emr_battery_power_max_w),
            _ => (config.emr_power_min_w, config.emr_power_max_w),
        };
        Self {
            power_min_w: min_w,
            power_max_w: max_w,
            delta_min_seconds: config.emr_delta_min_seconds,
            delta_max_seconds: config.emr_delta_max_seconds,
        }
    }
}

/// Last persisted register state for a key.
#[derive(Debug, Clone, Copy)]
pub struct EmrState {
    pub emr_kwh: f64,
    pub last_ts: DateTime<Utc>,
    pub last_power_w: Option<f64>,
}

/// What to do with an incoming sample.
#[derive(Debug, Clone, PartialEq)]
pub enum EmrDecision {
    /// Sample refused; register unchanged, nothing written.
    Drop { reason: String },
    /// Gap too large for extrapolation — write a `hold` row carrying the
    /// previous register value, quality flagged as gap upstream.
    Hold { emr_kwh: f64 },
    /// Normal trapezoidal integration step.
    Integrate { emr_kwh: f64, note: Option<String> },
    /// First sample for this key: seed the register at zero.
    Seed,
}

/// Pure integration decision.
///
/// `Δkwh = mean(last_power_w, value_w) × Δt / 3_600_000`; any would-be
/// decrement is clamped to the previous register value.
pub fn integrate_step(
    policy: &EmrPolicy,
    prev: Option<&EmrState>,
    ts: DateTime<Utc>,
    value_w: f64,
) -> EmrDecision {
    if !value_w.is_finite() || value_w < policy.power_min_w || value_w > policy.power_max_w {
        return EmrDecision::Drop {
            reason: format!(
                "power {value_w} W outside envelope [{}, {}]",
                policy.power_min_w, policy.power_max_w
            ),
        };
    }

    let Some(prev) = prev else {
        return EmrDecision::Seed;
    };

    let delta_seconds = ts.signed_duration_since(prev.last_ts).num_seconds();
    if delta_seconds < policy.delta_min_seconds {
        return EmrDecision::Drop {
            reason: format!("delta {delta_seconds}s below minimum {}s", policy.delta_min_seconds),
        };
    }
    if delta_seconds > policy.delta_max_seconds {
        return EmrDecision::Hold { emr_kwh: prev.emr_kwh };
    }

    let last_power = prev.last_power_w.unwrap_or(value_w);
    let mean_w = (last_power + value_w) / 2.0;
    let delta_kwh = mean_w * delta_seconds as f64 / 3_600_000.0;
    let next = prev.emr_kwh + delta_kwh;

    if next < prev.emr_kwh {
        EmrDecision::Integrate {
            emr_kwh: prev.emr_kwh,
            note: Some(format!("decrement clamped (delta {delta_kwh:.6} kWh)")),
        }
    } else {
        EmrDecision::Integrate { emr_kwh: next, note: None }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PowerSamplePoint {
    pub key: String,
    pub ts: DateTime<Utc>,
    pub value_w: f64,
    pub source: String,
    pub quality: String,
    pub raw_payload: Option<String>,
    pub ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmrPoint {
    pub emr_key: String,
    pub ts: DateTime<Utc>,
    pub emr_kwh: f64,
    pub last_power_w: Option<f64>,
    pub last_ts: Option<DateTime<Utc>>,
    pub method: String,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// EMR pipeline service: applies the pure decision against the store.
#[derive(Clone)]
pub struct EmrPipeline {
    pool: PgPool,
    config: AppConfig,
}

impl EmrPipeline {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        Self { pool, config }
    }

    /// Process one mapped power value: persist the sample (deduped) and
    /// advance the register according to the integration policy.
    pub async fn process_power_sample(
        &self,
        power_key: &str,
        value_w: f64,
        ts: DateTime<Utc>,
        source: &str,
        raw_payload: Option<&str>,
    ) -> DomainResult<()> {
        if !self.config.emr_enabled {
            return Ok(());
        }
        let Some(emr_key) = emr_key_for_power_key(power_key) else {
            return Ok(());
        };

        if let Some(conflict) = self.grid_conflict(power_key, value_w).await? {
            warn!(
                key = power_key,
                value_w = value_w,
                counterpart = %conflict,
                "grid import/export conflict - sample refused"
            );
            return Ok(());
        }

        let policy = EmrPolicy::for_key(&self.config, power_key);

        sqlx::query(
            r#"INSERT INTO power_samples (ts, key, value_w, source, quality, raw_payload)
               VALUES ($1, $2, $3, $4, 'ok', $5)
               ON CONFLICT (key, ts, source) DO NOTHING"#,
        )
        .bind(ts)
        .bind(power_key)
        .bind(value_w)
        .bind(source)
        .bind(raw_payload)
        .execute(&self.pool)
        .await?;

        let prev: Option<(f64, DateTime<Utc>, Option<f64>)> = sqlx::query_as(
            r#"SELECT emr_kwh, ts, last_power_w FROM energy_emr
               WHERE emr_key = $1 ORDER BY ts DESC, id DESC LIMIT 1"#,
        )
        .bind(emr_key)
        .fetch_optional(&self.pool)
        .await?;
        let prev_state = prev.map(|(emr_kwh, last_ts, last_power_w)| EmrState {
            emr_kwh,
            last_ts,
            last_power_w,
        });

        match integrate_step(&policy, prev_state.as_ref(), ts, value_w) {
            EmrDecision::Drop { reason } => {
                debug!(key = power_key, reason = %reason, "EMR sample dropped");
            }
            EmrDecision::Seed => {
                self.insert_emr_row(emr_key, ts, 0.0, Some(value_w), None, "integrate", Some("seed"))
                    .await?;
            }
            EmrDecision::Hold { emr_kwh } => {
                let last_ts = prev_state.map(|s| s.last_ts);
                self.insert_emr_row(
                    emr_key,
                    ts,
                    emr_kwh,
                    Some(value_w),
                    last_ts,
                    "hold",
                    Some("gap exceeds delta_max, extrapolation refused"),
                )
                .await?;
            }
            EmrDecision::Integrate { emr_kwh, note } => {
                let last_ts = prev_state.map(|s| s.last_ts);
                if let Some(ref note) = note {
                    warn!(key = power_key, note = %note, "EMR monotonic clamp");
                }
                self.insert_emr_row(
                    emr_key,
                    ts,
                    emr_kwh,
                    Some(value_w),
                    last_ts,
                    "integrate",
                    note.as_deref(),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Grid conflict check: when import and export both report active flow
    /// beyond the threshold, both samples are refused before any register
    /// write, keeping the monotonicity invariant untouched.
    async fn grid_conflict(&self, power_key: &str, value_w: f64) -> DomainResult<Option<String>> {
        let counterpart = match power_key {
            "grid_import_power_w" => "grid_export_power_w",
            "grid_export_power_w" => "grid_import_power_w",
            _ => return Ok(None),
        };
        let threshold = self.config.emr_grid_conflict_threshold_w;
        if value_w.abs() <= threshold {
            return Ok(None);
        }

        let window_start = Utc::now() - Duration::seconds(self.config.emr_hold_max_seconds);
        let other: Option<(f64,)> = sqlx::query_as(
            r#"SELECT value_w FROM power_samples
               WHERE key = $1 AND ts >= $2
               ORDER BY ts DESC, id DESC LIMIT 1"#,
        )
        .bind(counterpart)
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await?;

        match other {
            Some((other_w,)) if other_w.abs() > threshold => {
                Ok(Some(format!("{counterpart}={other_w} W")))
            }
            _ => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_emr_row(
        &self,
        emr_key: &str,
        ts: DateTime<Utc>,
        emr_kwh: f64,
        last_power_w: Option<f64>,
        last_ts: Option<DateTime<Utc>>,
        method: &str,
        notes: Option<&str>,
    ) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO energy_emr (ts, emr_key, emr_kwh, last_power_w, last_ts, method, notes)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (emr_key, ts) DO NOTHING"#,
        )
        .bind(ts)
        .bind(emr_key)
        .bind(emr_kwh)
        .bind(last_power_w)
        .bind(last_ts)
        .bind(method)
        .bind(notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Latest sample per power key.
pub async fn get_latest_power_samples(
    pool: &PgPool,
    keys: &[String],
) -> DomainResult<Vec<PowerSamplePoint>> {
    let rows = sqlx::query_as::<_, PowerSamplePoint>(
        r#"SELECT DISTINCT ON (key) key, ts, value_w, source, quality, raw_payload, ingested_at
           FROM power_samples
           WHERE key = ANY($1)
           ORDER BY key, ts DESC, id DESC"#,
    )
    .bind(keys)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_power_series(
    pool: &PgPool,
    key: &str,
    from_ts: DateTime<Utc>,
    to_ts: DateTime<Utc>,
) -> DomainResult<Vec<PowerSamplePoint>> {
    let rows = sqlx::query_as::<_, PowerSamplePoint>(
        r#"SELECT key, ts, value_w, source, quality, raw_payload, ingested_at
           FROM power_samples
           WHERE key = $1 AND ts >= $2 AND ts < $3
           ORDER BY ts ASC, id ASC"#,
    )
    .bind(key)
    .bind(from_ts)
    .bind(to_ts)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Latest register value per EMR key.
pub async fn get_latest_emr_values(pool: &PgPool, emr_keys: &[String]) -> DomainResult<Vec<EmrPoint>> {
    let rows = sqlx::query_as::<_, EmrPoint>(
        r#"SELECT DISTINCT ON (emr_key) emr_key, ts, emr_kwh, last_power_w, last_ts,
                  method, notes, created_at
           FROM energy_emr
           WHERE emr_key = ANY($1)
           ORDER BY emr_key, ts DESC, id DESC"#,
    )
    .bind(emr_keys)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_emr_series(
    pool: &PgPool,
    emr_key: &str,
    from_ts: DateTime<Utc>,
    to_ts: DateTime<Utc>,
) -> DomainResult<Vec<EmrPoint>> {
    let rows = sqlx::query_as::<_, EmrPoint>(
        r#"SELECT emr_key, ts, emr_kwh, last_power_w, last_ts, method, notes, created_at
           FROM energy_emr
           WHERE emr_key = $1 AND ts >= $2 AND ts < $3
           ORDER BY ts ASC, id ASC"#,
    )
    .bind(emr_key)
    .bind(from_ts)
    .bind(to_ts)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> EmrPolicy {
        EmrPolicy {
            power_min_w: 0.0,
            power_max_w: 50_000.0,
            delta_min_seconds: 1,
            delta_max_seconds: 3600,
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn first_sample_seeds_register() {
        assert_eq!(integrate_step(&policy(), None, ts(0), 1000.0), EmrDecision::Seed);
    }

    #[test]
    fn envelope_violation_drops_sample() {
        let prev = EmrState { emr_kwh: 1.0, last_ts: ts(0), last_power_w: Some(1000.0) };
        assert!(matches!(
            integrate_step(&policy(), Some(&prev), ts(10), 60_000.0),
            EmrDecision::Drop { .. }
        ));
        assert!(matches!(
            integrate_step(&policy(), Some(&prev), ts(10), -5.0),
            EmrDecision::Drop { .. }
        ));
    }

    #[test]
    fn trapezoidal_integration() {
        let prev = EmrState { emr_kwh: 10.0, last_ts: ts(0), last_power_w: Some(1000.0) };
        // mean(1000, 2000) = 1500 W over 3600 s = 1.5 kWh
        match integrate_step(&policy(), Some(&prev), ts(3600), 2000.0) {
            EmrDecision::Integrate { emr_kwh, note } => {
                assert!((emr_kwh - 11.5).abs() < 1e-9);
                assert!(note.is_none());
            }
            other => panic!("expected integrate, got {other:?}"),
        }
    }

    #[test]
    fn sub_minimum_delta_drops() {
        let prev = EmrState { emr_kwh: 10.0, last_ts: ts(0), last_power_w: Some(1000.0) };
        assert!(matches!(
            integrate_step(&policy(), Some(&prev), ts(0), 1000.0),
            EmrDecision::Drop { .. }
        ));
    }

    #[test]
    fn oversized_gap_holds_register() {
        let prev = EmrState { emr_kwh: 10.0, last_ts: ts(0), last_power_w: Some(1000.0) };
        assert_eq!(
            integrate_step(&policy(), Some(&prev), ts(7200), 1000.0),
            EmrDecision::Hold { emr_kwh: 10.0 }
        );
    }

    #[test]
    fn register_never_decreases() {
        let signed = EmrPolicy {
            power_min_w: -25_000.0,
            power_max_w: 25_000.0,
            delta_min_seconds: 1,
            delta_max_seconds: 3600,
        };
        let prev = EmrState { emr_kwh: 10.0, last_ts: ts(0), last_power_w: Some(-2000.0) };
        match integrate_step(&signed, Some(&prev), ts(3600), -2000.0) {
            EmrDecision::Integrate { emr_kwh, note } => {
                assert_eq!(emr_kwh, 10.0);
                assert!(note.is_some());
            }
            other => panic!("expected clamped integrate, got {other:?}"),
        }
    }

    #[test]
    fn monotonic_over_sequence() {
        let p = policy();
        let mut state = EmrState { emr_kwh: 0.0, last_ts: ts(0), last_power_w: Some(500.0) };
        let samples = [(60, 800.0), (120, 300.0), (180, 0.0), (240, 1200.0)];
        for (offset, value_w) in samples {
            if let EmrDecision::Integrate { emr_kwh, .. } =
                integrate_step(&p, Some(&state), ts(offset), value_w)
            {
                assert!(emr_kwh >= state.emr_kwh);
                state = EmrState { emr_kwh, last_ts: ts(offset), last_power_w: Some(value_w) };
            }
        }
    }

    #[test]
    fn static_key_mapping() {
        assert_eq!(emr_key_for_power_key("pv_power_w"), Some("pv_production_emr_kwh"));
        assert_eq!(emr_key_for_power_key("unknown_w"), None);
        assert_eq!(emr_keys().len(), 6);
    }
}
