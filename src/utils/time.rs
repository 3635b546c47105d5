use chrono::{DateTime, Local, TimeZone, Utc};

/// Format used for window labels in exported tables
pub const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// ISO-8601 format (microseconds, no offset) used in persisted records
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Render a UNIX timestamp in seconds as a local `YYYY-MM-DD HH:MM:SS` label
pub fn window_label(seconds: f64) -> String {
    let secs = seconds.floor();
    let nanos = ((seconds - secs) * 1e9) as u32;
    match Utc.timestamp_opt(secs as i64, nanos.min(999_999_999)).single() {
        Some(utc) => utc.with_timezone(&Local).format(LABEL_FORMAT).to_string(),
        None => format!("{:.6}", seconds),
    }
}

/// Render a record timestamp in local time
pub fn iso_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format(ISO_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_have_second_resolution() {
        let label = window_label(1_700_000_000.25);
        assert_eq!(label.len(), "2023-11-14 22:13:20".len());
        assert_eq!(label, window_label(1_700_000_000.0));
    }

    #[test]
    fn iso_timestamp_has_microseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        assert!(iso_timestamp(&ts).ends_with(".123456"));
        assert!(iso_timestamp(&ts).contains('T'));
    }
}
