//! Output projection — the pull-delivered current control signal bundle
//!
//! Downstream controllers poll `/eos/get/outputs`; the bundle reduces the
//! latest successful run's plan instructions to one current value per
//! output signal, overlays the safety-gate status, and merges per-signal
//! fetch accounting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::error::DomainResult;
use crate::orchestrator::{latest_succeeded_run, list_plan_instructions};
use crate::types::PlanInstruction;

pub const CENTRAL_HTTP_PATH: &str = "/eos/get/outputs";

#[derive(Debug, Clone, Serialize)]
pub struct OutputSignalItem {
    pub signal_key: String,
    pub label: String,
    pub resource_id: Option<String>,
    pub requested_power_kw: Option<f64>,
    pub unit: &'static str,
    pub operation_mode_id: Option<String>,
    pub operation_mode_factor: Option<f64>,
    pub effective_at: Option<DateTime<Utc>>,
    pub run_id: Option<i64>,
    pub json_path_value: String,
    pub last_fetch_ts: Option<DateTime<Utc>>,
    pub last_fetch_client: Option<String>,
    pub fetch_count: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputBundle {
    pub central_http_path: &'static str,
    pub run_id: Option<i64>,
    pub fetched_at: DateTime<Utc>,
    pub signals: BTreeMap<String, OutputSignalItem>,
}

/// Extract the requested power in kW from an instruction.
pub fn requested_power_kw(instruction: &PlanInstruction) -> Option<f64> {
    let payload = &instruction.payload_json;
    if let Some(kw) = payload.get("requested_power_kw").and_then(JsonValue::as_f64) {
        return Some(kw);
    }
    if let Some(kw) = payload.get("power_kw").and_then(JsonValue::as_f64) {
        return Some(kw);
    }
    if let Some(w) = payload.get("power_w").and_then(JsonValue::as_f64) {
        return Some(w / 1000.0);
    }
    None
}

fn effective_time(instruction: &PlanInstruction) -> Option<DateTime<Utc>> {
    instruction.execution_time.or(instruction.starts_at)
}

/// Whether an instruction covers `at`: an explicit `[starts_at, ends_at)`
/// window wins; otherwise its execution time must not be in the future.
fn covers(instruction: &PlanInstruction, at: DateTime<Utc>) -> bool {
    match (instruction.starts_at, instruction.ends_at) {
        (Some(starts_at), Some(ends_at)) => starts_at <= at && at < ends_at,
        _ => match effective_time(instruction) {
            Some(effective) => effective <= at,
            None => true,
        },
    }
}

/// Reduce a run's instructions to the single current instruction per
/// resource: scope to coverage of `at`, collapse duplicates per
/// `(resource_id, execution_time)` keeping the highest instruction_index
/// (tie broken on id), then keep the most recently effective instruction
/// per resource.
pub fn reduce_current_instructions(
    instructions: &[PlanInstruction],
    at: DateTime<Utc>,
) -> BTreeMap<String, PlanInstruction> {
    let mut current: BTreeMap<String, PlanInstruction> = BTreeMap::new();

    for instruction in instructions {
        let Some(resource_id) = instruction.resource_id.clone() else {
            continue;
        };
        if !covers(instruction, at) {
            continue;
        }

        match current.get(&resource_id) {
            None => {
                current.insert(resource_id, instruction.clone());
            }
            Some(existing) => {
                let replace = match (effective_time(existing), effective_time(instruction)) {
                    (Some(a), Some(b)) if a != b => b > a,
                    // Same effective slot: the highest index wins, ties on id.
                    _ => {
                        (instruction.instruction_index, instruction.id)
                            > (existing.instruction_index, existing.id)
                    }
                };
                if replace {
                    current.insert(resource_id, instruction.clone());
                }
            }
        }
    }

    current
}

fn item_status(instruction: &PlanInstruction, at: DateTime<Utc>) -> String {
    if let Some(safety) = instruction.payload_json.get("safety") {
        if safety.get("blocked").and_then(JsonValue::as_bool).unwrap_or(false) {
            return "blocked".to_string();
        }
        return "guarded".to_string();
    }
    if let Some(ends_at) = instruction.ends_at {
        if ends_at <= at {
            return "stale".to_string();
        }
    }
    "ok".to_string()
}

/// Resolve the bundle for a run (default: latest succeeded). Fetch
/// accounting is applied separately by [`record_bundle_fetch`].
pub async fn resolve_output_bundle(
    pool: &PgPool,
    run_id: Option<i64>,
) -> DomainResult<OutputBundle> {
    let fetched_at = Utc::now();

    let run_id = match run_id {
        Some(id) => Some(id),
        None => latest_succeeded_run(pool).await?.map(|run| run.id),
    };
    let Some(run_id) = run_id else {
        return Ok(OutputBundle {
            central_http_path: CENTRAL_HTTP_PATH,
            run_id: None,
            fetched_at,
            signals: BTreeMap::new(),
        });
    };

    let instructions = list_plan_instructions(pool, run_id).await?;
    let current = reduce_current_instructions(&instructions, fetched_at);

    // Every resource named by the plan is an output signal; resources with
    // no current instruction surface as `missing`.
    let mut signals = BTreeMap::new();
    let mut resources: Vec<String> = instructions
        .iter()
        .filter_map(|instruction| instruction.resource_id.clone())
        .collect();
    resources.sort();
    resources.dedup();

    for resource_id in resources {
        let signal_key = resource_id.clone();
        let json_path_value = format!("$.signals.{signal_key}.requested_power_kw");
        let item = match current.get(&resource_id) {
            Some(instruction) => OutputSignalItem {
                signal_key: signal_key.clone(),
                label: signal_key.clone(),
                resource_id: Some(resource_id.clone()),
                requested_power_kw: requested_power_kw(instruction),
                unit: "kW",
                operation_mode_id: instruction.operation_mode_id.clone(),
                operation_mode_factor: instruction.operation_mode_factor,
                effective_at: effective_time(instruction),
                run_id: Some(run_id),
                json_path_value,
                last_fetch_ts: None,
                last_fetch_client: None,
                fetch_count: 0,
                status: item_status(instruction, fetched_at),
            },
            None => OutputSignalItem {
                signal_key: signal_key.clone(),
                label: signal_key.clone(),
                resource_id: Some(resource_id.clone()),
                requested_power_kw: None,
                unit: "kW",
                operation_mode_id: None,
                operation_mode_factor: None,
                effective_at: None,
                run_id: Some(run_id),
                json_path_value,
                last_fetch_ts: None,
                last_fetch_client: None,
                fetch_count: 0,
                status: "missing".to_string(),
            },
        };
        signals.insert(signal_key, item);
    }

    Ok(OutputBundle {
        central_http_path: CENTRAL_HTTP_PATH,
        run_id: Some(run_id),
        fetched_at,
        signals,
    })
}

/// Update per-signal fetch accounting and merge the resulting state into
/// the bundle items.
pub async fn record_bundle_fetch(
    pool: &PgPool,
    bundle: &mut OutputBundle,
    client: Option<&str>,
) -> DomainResult<()> {
    for (signal_key, item) in bundle.signals.iter_mut() {
        let (last_fetch_ts, last_fetch_client, fetch_count): (
            Option<DateTime<Utc>>,
            Option<String>,
            i64,
        ) = sqlx::query_as(
            r#"INSERT INTO output_signal_access_state
                (signal_key, resource_id, last_fetch_ts, last_fetch_client, fetch_count, updated_at)
               VALUES ($1, $2, now(), $3, 1, now())
               ON CONFLICT (signal_key) DO UPDATE SET
                 last_fetch_ts = now(),
                 last_fetch_client = EXCLUDED.last_fetch_client,
                 fetch_count = output_signal_access_state.fetch_count + 1,
                 updated_at = now()
               RETURNING last_fetch_ts, last_fetch_client, fetch_count"#,
        )
        .bind(signal_key)
        .bind(&item.resource_id)
        .bind(client)
        .fetch_one(pool)
        .await?;

        item.last_fetch_ts = last_fetch_ts;
        item.last_fetch_client = last_fetch_client;
        item.fetch_count = fetch_count;
    }
    Ok(())
}

/// Loxone text value: up to three decimals, trailing zeros stripped, but
/// always `\d+.\d+` (`2.5`, `2.0`). Missing or non-finite values render
/// as `0.0`.
pub fn format_loxone_value(value: Option<f64>) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return "0.0".to_string();
    };
    let compact = format!("{value:.3}");
    let compact = compact.trim_end_matches('0').trim_end_matches('.');
    if compact.contains('.') {
        compact.to_string()
    } else {
        format!("{compact}.0")
    }
}

/// Render the Loxone text body: `{signal_key}:{value}` lines sorted by
/// key.
pub fn render_loxone(bundle: &OutputBundle) -> String {
    bundle
        .signals
        .iter()
        .map(|(signal_key, item)| {
            format!("{signal_key}:{}", format_loxone_value(item.requested_power_kw))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn instruction(
        id: i64,
        index: i64,
        resource: &str,
        execution_time: Option<DateTime<Utc>>,
        payload: JsonValue,
    ) -> PlanInstruction {
        PlanInstruction {
            id,
            run_id: 1,
            plan_id: "plan".to_string(),
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
    fn loxone_format_always_has_fraction() {
        assert_eq!(format_loxone_value(Some(2.0)), "2.0");
        assert_eq!(format_loxone_value(Some(0.0)), "0.0");
        assert_eq!(format_loxone_value(Some(2.5)), "2.5");
        assert_eq!(format_loxone_value(Some(1.2344)), "1.234");
        assert_eq!(format_loxone_value(None), "0.0");
        assert_eq!(format_loxone_value(Some(f64::NAN)), "0.0");
    }

    #[test]
    fn loxone_body_is_sorted_lines() {
        let at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        let mut signals = BTreeMap::new();
        for (key, kw) in [("b", 0.0), ("a", 2.0)] {
            signals.insert(
                key.to_string(),
                OutputSignalItem {
                    signal_key: key.to_string(),
                    label: key.to_string(),
                    resource_id: Some(key.to_string()),
                    requested_power_kw: Some(kw),
                    unit: "kW",
                    operation_mode_id: None,
                    operation_mode_factor: None,
                    effective_at: None,
                    run_id: Some(1),
                    json_path_value: String::new(),
                    last_fetch_ts: None,
                    last_fetch_client: None,
                    fetch_count: 0,
                    status: "ok".to_string(),
                },
            );
        }
        let bundle = OutputBundle {
            central_http_path: CENTRAL_HTTP_PATH,
            run_id: Some(1),
            fetched_at: at,
            signals,
        };
        assert_eq!(render_loxone(&bundle), "a:2.0\nb:0.0");
    }

    #[test]
    fn reduction_keeps_latest_covering_instruction() {
        let at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 30, 0).unwrap();
        let t14 = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        let t15 = Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap();
        let instructions = vec![
            instruction(1, 0, "battery1", Some(t14), json!({"power_kw": 1.0})),
            instruction(2, 1, "battery1", Some(t15), json!({"power_kw": 9.0})), // future
        ];
        let current = reduce_current_instructions(&instructions, at);
        assert_eq!(requested_power_kw(&current["battery1"]), Some(1.0));
    }

    #[test]
    fn reduction_resolves_duplicates_by_index_then_id() {
        let at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 30, 0).unwrap();
        let t14 = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        let instructions = vec![
            instruction(1, 0, "battery1", Some(t14), json!({"power_kw": 1.0})),
            instruction(2, 2, "battery1", Some(t14), json!({"power_kw": 2.0})),
            instruction(3, 1, "battery1", Some(t14), json!({"power_kw": 3.0})),
        ];
        let current = reduce_current_instructions(&instructions, at);
        assert_eq!(requested_power_kw(&current["battery1"]), Some(2.0));
    }

    #[test]
    fn power_extraction_prefers_explicit_kw() {
        let at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap();
        let with_w = instruction(1, 0, "r", Some(at), json!({"power_w": 2500.0}));
        assert_eq!(requested_power_kw(&with_w), Some(2.5));
        let with_kw = instruction(2, 0, "r", Some(at), json!({"requested_power_kw": 1.5, "power_w": 9.0}));
        assert_eq!(requested_power_kw(&with_kw), Some(1.5));
    }

    #[test]
    fn guarded_instruction_never_reads_ok() {
        let at = Utc.with_ymd_and_hms(2026, 2, 21, 14, 30, 0).unwrap();
        let guarded = instruction(
            1,
            0,
            "battery1",
            Some(Utc.with_ymd_and_hms(2026, 2, 21, 14, 0, 0).unwrap()),
            json!({"safety": {"guard": "no_grid_charge_guard"}}),
        );
        assert_eq!(item_status(&guarded, at), "guarded");
    }
}
