//! Safety gates applied to optimizer plans before persistence.

use serde_json::Value as JsonValue;

/// A plan instruction as parsed from the optimizer response, before it is
/// written to `eos_plan_instructions`.
#[derive(Debug, Clone)]
pub struct InstructionDraft {
    pub instruction_index: i64,
    pub instruction_type: String,
    pub resource_id: Option<String>,
    pub actuator_id: Option<String>,
    pub starts_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ends_at: Option<chrono::DateTime<chrono::Utc>>,
    pub execution_time: Option<chrono::DateTime<chrono::Utc>>,
    pub operation_mode_id: Option<String>,
    pub operation_mode_factor: Option<f64>,
    pub payload_json: JsonValue,
}

/// One gate intervention, recorded in the run's health artifact.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GuardEvent {
    pub guard: String,
    pub instruction_index: i64,
    pub resource_id: Option<String>,
    pub original_mode: Option<String>,
    pub note: String,
}

/// Whether an instruction would charge a battery from the grid.
/// "discharge" modes are not charging.
fn names_charge(raw: &str) -> bool {
    let lowered = raw.to_ascii_lowercase();
    lowered.contains("charge") && !lowered.contains("discharge")
}

fn is_grid_charge(instruction: &InstructionDraft) -> bool {
    let mode_says_charge = instruction
        .operation_mode_id
        .as_deref()
        .map(|mode| names_charge(mode) && instruction.operation_mode_factor.unwrap_or(0.0) > 0.0)
        .unwrap_or(false);
    let type_says_charge = names_charge(&instruction.instruction_type);
    mode_says_charge || type_says_charge
}

/// `no_grid_charge_guard`: when the plan would charge the battery while
/// live grid import exceeds the threshold, the instruction is downgraded
/// to idle and annotated. Returns the interventions.
pub fn apply_no_grid_charge_guard(
    instructions: &mut [InstructionDraft],
    live_grid_power_w: Option<f64>,
    threshold_w: f64,
    enabled: bool,
) -> Vec<GuardEvent> {
    let mut events = Vec::new();
    if !enabled {
        return events;
    }
    let Some(grid_power_w) = live_grid_power_w else {
        return events;
    };
    if grid_power_w <= threshold_w {
        return events;
    }

    for instruction in instructions.iter_mut() {
        if !is_grid_charge(instruction) {
            continue;
        }
        let original_mode = instruction.operation_mode_id.clone();
        instruction.operation_mode_id = Some("IDLE".to_string());
        instruction.operation_mode_factor = Some(0.0);
        if let Some(object) = instruction.payload_json.as_object_mut() {
            object.insert(
                "safety".to_string(),
                serde_json::json!({
                    "guard": "no_grid_charge_guard",
                    "grid_power_w": grid_power_w,
                    "threshold_w": threshold_w,
                    "original_operation_mode_id": original_mode,
                }),
            );
        }
        events.push(GuardEvent {
            guard: "no_grid_charge_guard".to_string(),
            instruction_index: instruction.instruction_index,
            resource_id: instruction.resource_id.clone(),
            original_mode,
            note: format!(
                "grid power {grid_power_w} W above threshold {threshold_w} W, instruction downgraded to idle"
            ),
        });
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn charge_instruction(index: i64) -> InstructionDraft {
        InstructionDraft {
            instruction_index: index,
            instruction_type: "battery_control".to_string(),
            resource_id: Some("battery1".to_string()),
            actuator_id: None,
            starts_at: None,
            ends_at: None,
            execution_time: None,
            operation_mode_id: Some("CHARGE".to_string()),
            operation_mode_factor: Some(0.8),
            payload_json: json!({}),
        }
    }

    #[test]
    fn guard_downgrades_charge_when_grid_import_high() {
        let mut instructions = vec![charge_instruction(0)];
        let events = apply_no_grid_charge_guard(&mut instructions, Some(400.0), 50.0, true);
        assert_eq!(events.len(), 1);
        assert_eq!(instructions[0].operation_mode_id.as_deref(), Some("IDLE"));
        assert_eq!(instructions[0].operation_mode_factor, Some(0.0));
        assert!(instructions[0].payload_json.get("safety").is_some());
    }

    #[test]
    fn guard_leaves_plan_alone_below_threshold() {
        let mut instructions = vec![charge_instruction(0)];
        let events = apply_no_grid_charge_guard(&mut instructions, Some(10.0), 50.0, true);
        assert!(events.is_empty());
        assert_eq!(instructions[0].operation_mode_id.as_deref(), Some("CHARGE"));
    }

    #[test]
    fn guard_disabled_or_blind_does_nothing() {
        let mut instructions = vec![charge_instruction(0)];
        assert!(apply_no_grid_charge_guard(&mut instructions, Some(400.0), 50.0, false).is_empty());
        assert!(apply_no_grid_charge_guard(&mut instructions, None, 50.0, true).is_empty());
    }

    #[test]
    fn guard_skips_non_charge_instructions() {
        let mut instructions = vec![InstructionDraft {
            operation_mode_id: Some("DISCHARGE".to_string()),
            instruction_type: "battery_mode".to_string(),
            ..charge_instruction(1)
        }];
        let events = apply_no_grid_charge_guard(&mut instructions, Some(400.0), 50.0, true);
        assert!(events.is_empty());
        assert_eq!(instructions[0].operation_mode_id.as_deref(), Some("DISCHARGE"));
    }
}
