//! Orchestration Regression Tests
//!
//! Covers the aligned scheduler trigger math, warm-start extraction from
//! solution artifacts, PV import-provider fallback validation and the
//! no-grid-charge safety gate — the decision layers a run is built from.

use chrono::{TimeZone, Utc};
use serde_json::json;

use eos_hub::orchestrator::guards::{apply_no_grid_charge_guard, InstructionDraft};
use eos_hub::orchestrator::parse_plan_instructions;
use eos_hub::orchestrator::pv_fallback::is_valid_pv_fallback_provider;
use eos_hub::orchestrator::scheduler::{next_aligned_trigger, preset_minute_set};
use eos_hub::orchestrator::warm_start::extract_start_solution;

#[test]
fn aligned_scheduler_walks_quarter_hours_with_delay() {
    let minutes = [0u32, 15, 30, 45];
    let mut now = Utc.with_ymd_and_hms(2026, 2, 21, 13, 59, 59).unwrap();

    let mut fired = Vec::new();
    for _ in 0..4 {
        let due = next_aligned_trigger(now, &minutes, 1);
        fired.push(due);
        now = due; // pretend we fired exactly on time
    }

    assert_eq!(
        fired,
        vec![
            Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 1).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 21, 14, 15, 1).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 21, 14, 30, 1).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 21, 14, 45, 1).unwrap(),
        ]
    );
}

#[test]
fn hourly_preset_fires_once_per_hour() {
    let minutes = preset_minute_set("60m").expect("known preset");
    let now = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 30).unwrap();
    let due = next_aligned_trigger(now, &minutes, 0);
    assert_eq!(due, Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap());
}

#[test]
fn warm_start_contract_scenarios() {
    assert_eq!(
        extract_start_solution(&json!({"start_solution": [1, 0, "0.5"]}), None),
        Some(vec![1.0, 0.0, 0.5])
    );
    assert_eq!(extract_start_solution(&json!({"start_solution": [1, "x"]}), None), None);
    assert_eq!(extract_start_solution(&json!({"start_solution": null}), None), None);
    assert_eq!(
        extract_start_solution(&json!({"start_solution": [1, 0, 1]}), Some(4)),
        None
    );
}

#[test]
fn pv_fallback_refuses_binary_import_profile() {
    let mut profile = vec![0.0; 24];
    profile.extend(vec![12_000.0; 24]);
    let config = json!({
        "pvforecast": {
            "provider": "PVForecastAkkudoktor",
            "providers": ["PVForecastAkkudoktor", "PVForecastImport"],
            "provider_settings": {
                "PVForecastImport": {"import_json": {"pvforecast_ac_power": profile}}
            }
        }
    });

    let (valid, reason) = is_valid_pv_fallback_provider(&config, "PVForecastImport");
    assert!(!valid);
    assert!(reason.unwrap_or_default().contains("too few unique values"));
}

#[test]
fn plan_round_trip_through_guard_keeps_safe_instructions() {
    let response = json!({
        "plan": {"instructions": [
            {
                "instruction_type": "battery_control",
                "resource_id": "battery1",
                "operation_mode_id": "CHARGE",
                "operation_mode_factor": 1.0,
                "power_kw": 5.0
            },
            {
                "instruction_type": "battery_mode",
                "resource_id": "battery1",
                "operation_mode_id": "DISCHARGE",
                "operation_mode_factor": 0.5
            }
        ]}
    });

    let mut drafts: Vec<InstructionDraft> = parse_plan_instructions(&response);
    assert_eq!(drafts.len(), 2);

    // Grid import well above the guard threshold: the charge instruction
    // is downgraded, the discharge instruction untouched.
    let events = apply_no_grid_charge_guard(&mut drafts, Some(750.0), 50.0, true);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].instruction_index, 0);
    assert_eq!(drafts[0].operation_mode_id.as_deref(), Some("IDLE"));
    assert_eq!(drafts[1].operation_mode_id.as_deref(), Some("DISCHARGE"));
}
