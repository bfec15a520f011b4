//! Aligned scheduler — wall-clock triggers on fixed minutes of the hour.

use chrono::{DateTime, Duration, Timelike, Utc};

/// Compute the next trigger instant: the next UTC minute within the
/// configured set, offset by `delay_seconds`. Strictly after `now`.
pub fn next_aligned_trigger(
    now: DateTime<Utc>,
    minute_set: &[u32],
    delay_seconds: u32,
) -> DateTime<Utc> {
    debug_assert!(!minute_set.is_empty());

    // Walk minute by minute from the top of the current minute; bounded by
    // one hour plus one step since the set is non-empty.
    let current_minute_start = now - Duration::seconds(i64::from(now.second()))
        - Duration::nanoseconds(i64::from(now.nanosecond()));

    for step in 0..=60 {
        let candidate_minute = current_minute_start + Duration::minutes(step);
        if minute_set.contains(&candidate_minute.minute()) {
            let candidate = candidate_minute + Duration::seconds(i64::from(delay_seconds));
            if candidate > now {
                return candidate;
            }
        }
    }
    // Unreachable with a non-empty set; fall back one hour out.
    now + Duration::hours(1)
}

/// Map an auto-run preset onto the minute set it drives.
pub fn preset_minute_set(preset: &str) -> Option<Vec<u32>> {
    match preset {
        "off" => None,
        "15m" => Some(vec![0, 15, 30, 45]),
        "30m" => Some(vec![0, 30]),
        "60m" => Some(vec![0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_trigger_picks_next_minute_in_set() {
        let now = Utc.with_ymd_and_hms(2026, 2, 21, 14, 7, 30).unwrap();
        let next = next_aligned_trigger(now, &[0, 15, 30, 45], 1);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 21, 14, 15, 1).unwrap());
    }

    #[test]
    fn next_trigger_skips_past_instant_in_same_minute() {
        // 14:15:30 with delay 1: the 14:15:01 instant already passed.
        let now = Utc.with_ymd_and_hms(2026, 2, 21, 14, 15, 30).unwrap();
        let next = next_aligned_trigger(now, &[0, 15, 30, 45], 1);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 21, 14, 30, 1).unwrap());
    }

    #[test]
    fn next_trigger_honors_delay_within_current_minute() {
        let now = Utc.with_ymd_and_hms(2026, 2, 21, 14, 15, 0).unwrap();
        let next = next_aligned_trigger(now, &[0, 15, 30, 45], 5);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 21, 14, 15, 5).unwrap());
    }

    #[test]
    fn next_trigger_wraps_to_next_hour() {
        let now = Utc.with_ymd_and_hms(2026, 2, 21, 14, 50, 0).unwrap();
        let next = next_aligned_trigger(now, &[0], 0);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 21, 15, 0, 0).unwrap());
    }

    #[test]
    fn presets_map_to_minute_sets() {
        assert_eq!(preset_minute_set("15m"), Some(vec![0, 15, 30, 45]));
        assert_eq!(preset_minute_set("30m"), Some(vec![0, 30]));
        assert_eq!(preset_minute_set("60m"), Some(vec![0]));
        assert_eq!(preset_minute_set("off"), None);
        assert_eq!(preset_minute_set("7m"), None);
    }
}
