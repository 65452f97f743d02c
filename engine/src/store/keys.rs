use chrono::{TimeZone, Utc};

/// Name of the JSON manifest written next to the step images.
pub const MANIFEST_NAME: &str = "steps.json";

/// Render a step timestamp (seconds) as `%Y%m%dT%H%M%S%3fZ`.
///
/// Timestamps outside chrono's range (or not finite) fall back to the raw
/// millisecond count so the name stays deterministic.
fn fmt_ts(seconds: f64) -> String {
    let ms = (seconds * 1000.0).round();
    if !ms.is_finite() {
        return "unknown".into();
    }
    let ms = ms as i64;
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y%m%dT%H%M%S%3fZ").to_string(),
        None => format!("{ms}ms"),
    }
}

/// File name for a persisted step image.
/// e.g. "step_004_19700101T000012500Z.png" for index 4 at t=12.5s
pub fn step_file_name(index: usize, timestamp: f64) -> String {
    format!("step_{index:03}_{ts}.png", ts = fmt_ts(timestamp))
}

/// Object key for a persisted step image under `prefix`.
pub fn step_key(prefix: &str, index: usize, timestamp: f64) -> String {
    format!("{prefix}{}", step_file_name(index, timestamp))
}

/// Object key for the manifest under `prefix`.
pub fn manifest_key(prefix: &str) -> String {
    format!("{prefix}{MANIFEST_NAME}")
}

/// Prefix shared by every file name ever produced for `index`.
pub(crate) fn index_prefix(index: usize) -> String {
    format!("step_{index:03}_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(step_file_name(0, 0.0), "step_000_19700101T000000000Z.png");
        assert_eq!(step_file_name(4, 12.5), "step_004_19700101T000012500Z.png");

        // Wall-clock capture timestamps (Unix seconds) encode the real time.
        // 2026-02-18T09:30:00.000Z = 1771407000 s
        assert_eq!(
            step_file_name(12, 1_771_407_000.0),
            "step_012_20260218T093000000Z.png"
        );
    }

    #[test]
    fn keys_sort_in_step_order() {
        let names: Vec<String> = [(0, 0.0), (1, 1.5), (2, 30.0), (10, 31.0)]
            .iter()
            .map(|&(i, ts)| step_file_name(i, ts))
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn same_step_same_name() {
        assert_eq!(step_file_name(3, 7.25), step_file_name(3, 7.25));
        assert!(step_file_name(3, 7.25).starts_with(&index_prefix(3)));
        assert!(!step_file_name(30, 7.25).starts_with(&index_prefix(3)));
    }

    #[test]
    fn out_of_range_timestamps_fall_back() {
        assert_eq!(step_file_name(1, f64::NAN), "step_001_unknown.png");
        assert!(step_file_name(1, 1e300).ends_with("ms.png"));
    }

    #[test]
    fn prefixed_keys() {
        assert_eq!(step_key("steps/", 2, 0.0), "steps/step_002_19700101T000000000Z.png");
        assert_eq!(manifest_key("steps/"), "steps/steps.json");
    }
}
