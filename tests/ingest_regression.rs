//! Ingest Pipeline Regression Tests
//!
//! Exercises the pure ingest chain end-to-end: key normalization, payload
//! parsing, value transforms, catalog value inference, lag clamping and
//! EMR integration policy. Asserts the literal scenarios the pipeline
//! contract promises.

use chrono::{Duration, TimeZone, Utc};

use eos_hub::backbone::{ingest_lag_ms, prediction_key_allowed};
use eos_hub::emr::{integrate_step, EmrDecision, EmrPolicy, EmrState};
use eos_hub::ingest::{apply_value_transform, normalize_input_key};
use eos_hub::parser::{parse_event_timestamp, parse_payload};
use eos_hub::types::SignalValue;

#[test]
fn http_push_chain_produces_canonical_measurement_value() {
    // A Shelly-style JSON payload behind a dotted path, scaled to watts.
    let payload = r#"{"emeter": {"power": 1.234, "ts": "2026-02-21T14:00:00Z"}}"#;

    let key = normalize_input_key("/EOS/House_Load_W");
    assert_eq!(key, "eos/input/house_load_w");

    let parsed = parse_payload(payload, Some("emeter.power")).expect("value resolves");
    assert_eq!(parsed, "1.234");

    let transformed =
        apply_value_transform(Some(&parsed), 1000.0, "canonical", "house_load_w").expect("numeric");
    assert_eq!(transformed, "1234");

    let fallback = Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap();
    let ts = parse_event_timestamp(payload, Some("emeter.ts"), fallback);
    assert_eq!(ts, Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap());

    assert_eq!(SignalValue::infer_from_text(&transformed), SignalValue::Number(1234.0));
}

#[test]
fn export_sign_convention_negates_grid_power() {
    let transformed = apply_value_transform(Some("250"), 1.0, "positive_is_export", "grid_power_w");
    assert_eq!(transformed.as_deref(), Some("-250"));
}

#[test]
fn ingest_lag_scenarios_from_contract() {
    let ingested_at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();

    // 40 days in the past clamps to i32::MAX.
    assert_eq!(ingest_lag_ms(ingested_at, ingested_at - Duration::days(40)), 2_147_483_647);
    // 5 minutes in the future clamps to 0.
    assert_eq!(ingest_lag_ms(ingested_at, ingested_at + Duration::minutes(5)), 0);
}

#[test]
fn prediction_allowlist_is_authoritative() {
    for key in [
        "prediction.elecprice_marketprice_wh",
        "prediction.elecprice_marketprice_kwh",
        "prediction.pvforecast_ac_power",
        "prediction.pvforecastakkudoktor_ac_power_any",
        "prediction.loadforecast_power_w",
        "prediction.load_mean_adjusted",
        "prediction.load_mean",
        "prediction.loadakkudoktor_mean_power_w",
    ] {
        assert!(prediction_key_allowed(key), "{key} should be allowlisted");
    }
    assert!(!prediction_key_allowed("prediction.windforecast_power_w"));
}

#[test]
fn emr_register_stays_monotonic_across_a_day_of_samples() {
    let policy = EmrPolicy {
        power_min_w: 0.0,
        power_max_w: 50_000.0,
        delta_min_seconds: 1,
        delta_max_seconds: 3600,
    };
    let base = Utc.with_ymd_and_hms(2026, 2, 21, 0, 0, 0).unwrap();

    let mut state: Option<EmrState> = None;
    let mut previous_kwh = 0.0f64;

    for step in 0..96 {
        let ts = base + Duration::minutes(step * 15);
        // A daily load curve with zero periods and spikes.
        let value_w = match step % 8 {
            0 | 1 => 0.0,
            2 => 350.0,
            3 => 4200.0,
            4 => 800.0,
            _ => 120.0,
        };
        match integrate_step(&policy, state.as_ref(), ts, value_w) {
            EmrDecision::Seed => {
                state = Some(EmrState { emr_kwh: 0.0, last_ts: ts, last_power_w: Some(value_w) });
            }
            EmrDecision::Integrate { emr_kwh, .. } => {
                assert!(emr_kwh >= previous_kwh, "register decreased at step {step}");
                previous_kwh = emr_kwh;
                state = Some(EmrState { emr_kwh, last_ts: ts, last_power_w: Some(value_w) });
            }
            other => panic!("unexpected decision at step {step}: {other:?}"),
        }
    }

    // 24h of this curve integrates to a plausible daily energy figure.
    assert!(previous_kwh > 5.0 && previous_kwh < 50.0, "got {previous_kwh} kWh");
}

#[test]
fn emr_gap_policy_holds_and_refuses_extrapolation() {
    let policy = EmrPolicy {
        power_min_w: 0.0,
        power_max_w: 50_000.0,
        delta_min_seconds: 1,
        delta_max_seconds: 300,
    };
    let t0 = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
    let state = EmrState { emr_kwh: 42.5, last_ts: t0, last_power_w: Some(900.0) };

    // 20 minutes of silence: the register holds its value.
    let decision = integrate_step(&policy, Some(&state), t0 + Duration::minutes(20), 900.0);
    assert_eq!(decision, EmrDecision::Hold { emr_kwh: 42.5 });
}
