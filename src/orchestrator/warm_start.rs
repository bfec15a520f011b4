//! Warm-start extraction from a prior run's solution artifact.

use serde_json::Value as JsonValue;

/// Pull a usable `start_solution` vector out of a solution payload.
///
/// Accepts numeric entries and string-encoded numbers. When
/// `expected_len` is given the vector must match it exactly; otherwise a
/// minimum of two entries is required. Anything else yields `None` — the
/// optimizer then cold-starts.
pub fn extract_start_solution(
    payload: &JsonValue,
    expected_len: Option<usize>,
) -> Option<Vec<f64>> {
    let entries = payload.get("start_solution")?.as_array()?;

    match expected_len {
        Some(expected) if entries.len() != expected => return None,
        None if entries.len() < 2 => return None,
        _ => {}
    }

    let mut solution = Vec::with_capacity(entries.len());
    for entry in entries {
        let number = match entry {
            JsonValue::Number(n) => n.as_f64()?,
            JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if !number.is_finite() {
            return None;
        }
        solution.push(number);
    }
    Some(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_numeric_and_string_numeric_entries() {
        let payload = json!({"start_solution": [1, 0, "0.5"]});
        assert_eq!(
            extract_start_solution(&payload, None),
            Some(vec![1.0, 0.0, 0.5])
        );
    }

    #[test]
    fn rejects_non_numeric_entries() {
        assert_eq!(extract_start_solution(&json!({"start_solution": [1, "x"]}), None), None);
        assert_eq!(extract_start_solution(&json!({"start_solution": null}), None), None);
        assert_eq!(extract_start_solution(&json!({}), None), None);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(extract_start_solution(&json!({"start_solution": [1]}), None), None);
        assert_eq!(
            extract_start_solution(&json!({"start_solution": [1, 0, 1]}), Some(4)),
            None
        );
        assert_eq!(
            extract_start_solution(&json!({"start_solution": [1, 0, 1]}), Some(3)),
            Some(vec![1.0, 0.0, 1.0])
        );
    }
}
