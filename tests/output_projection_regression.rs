//! Output Projection Regression Tests
//!
//! The pull bundle reduction and the Loxone text rendering, asserted at
//! the instruction level so the scenarios hold regardless of storage.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use serde_json::Value as JsonValue;

use eos_hub::output::{
    format_loxone_value, reduce_current_instructions, requested_power_kw,
};
use eos_hub::types::PlanInstruction;

fn instruction(
    id: i64,
    index: i64,
    resource: &str,
    execution_time: Option<DateTime<Utc>>,
    payload: JsonValue,
) -> PlanInstruction {
    PlanInstruction {
        id,
        run_id: 7,
        plan_id: "p-1".to_string(),
        instruction_index: index,
        instruction_type: "battery_control".to_string(),
        resource_id: Some(resource.to_string()),
        actuator_id: None,
        starts_at: None,
        ends_at: None,
        execution_time,
        operation_mode_id: None,
        operation_mode_factor: None,
        payload_json: payload,
        created_at: Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap(),
    }
}

#[test]
fn loxone_lines_render_two_signals_sorted() {
    // Two signals with kW values 2 and 0 render as "a:2.0\nb:0.0".
    let values = [("a", Some(2.0)), ("b", Some(0.0))];
    let body = values
        .iter()
        .map(|(key, kw)| format!("{key}:{}", format_loxone_value(*kw)))
        .collect::<Vec<_>>()
        .join("\n");
    assert_eq!(body, "a:2.0\nb:0.0");
}

#[test]
fn loxone_values_always_carry_a_fraction() {
    assert_eq!(format_loxone_value(Some(2.0)), "2.0");
    assert_eq!(format_loxone_value(Some(2.5)), "2.5");
    assert_eq!(format_loxone_value(Some(0.125)), "0.125");
    assert_eq!(format_loxone_value(Some(-1.5)), "-1.5");
    assert_eq!(format_loxone_value(None), "0.0");
}

#[test]
fn reduction_picks_exactly_one_instruction_per_resource() {
    let at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 20, 0).unwrap();
    let t13 = Utc.with_ymd_and_hms(2026, 2, 21, 13, 0, 0).unwrap();
    let t14 = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
    let t15 = Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap();

    let instructions = vec![
        instruction(1, 0, "battery1", Some(t13), json!({"power_kw": 0.5})),
        instruction(2, 1, "battery1", Some(t14), json!({"power_kw": 2.0})),
        instruction(3, 2, "battery1", Some(t15), json!({"power_kw": 9.0})),
        instruction(4, 3, "wallbox1", Some(t14), json!({"power_w": 11000.0})),
    ];

    let current = reduce_current_instructions(&instructions, at);
    assert_eq!(current.len(), 2);
    assert_eq!(requested_power_kw(&current["battery1"]), Some(2.0));
    assert_eq!(requested_power_kw(&current["wallbox1"]), Some(11.0));
}

#[test]
fn duplicate_slots_resolve_to_highest_instruction_index() {
    let at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 20, 0).unwrap();
    let t14 = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();

    let instructions = vec![
        instruction(10, 0, "battery1", Some(t14), json!({"power_kw": 1.0})),
        instruction(11, 5, "battery1", Some(t14), json!({"power_kw": 3.0})),
        instruction(12, 5, "battery1", Some(t14), json!({"power_kw": 4.0})),
        instruction(9, 2, "battery1", Some(t14), json!({"power_kw": 2.0})),
    ];

    // Highest index wins; within the same index, the higher id wins.
    let current = reduce_current_instructions(&instructions, at);
    assert_eq!(requested_power_kw(&current["battery1"]), Some(4.0));
}

#[test]
fn future_only_plans_yield_no_current_instruction() {
    let at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
    let t15 = Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap();
    let instructions = vec![instruction(1, 0, "battery1", Some(t15), json!({"power_kw": 1.0}))];

    let current = reduce_current_instructions(&instructions, at);
    assert!(current.is_empty());
}

#[test]
fn interval_instructions_cover_only_their_window() {
    let t14 = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
    let t15 = Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap();
    let mut windowed = instruction(1, 0, "battery1", None, json!({"power_kw": 1.5}));
    windowed.starts_at = Some(t14);
    windowed.ends_at = Some(t15);
    let instructions = vec![windowed];

    let inside = Utc.with_ymd_and_hms(2026, 2, 21, 14, 30, 0).unwrap();
    assert_eq!(reduce_current_instructions(&instructions, inside).len(), 1);

    let after = Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap();
    assert!(reduce_current_instructions(&instructions, after).is_empty());
}
