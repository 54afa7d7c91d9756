mod repository;
mod schema;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub use repository::Repository;

/// Fixed-width UTC text so stored timestamps compare correctly as strings.
pub(crate) fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56.000000Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();
        assert!(format_ts(&a) < format_ts(&b));
        assert_eq!(format_ts(&a).len(), format_ts(&b).len());
    }

    #[test]
    fn parses_both_formats() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 11, 12, 34, 56).unwrap();
        assert_eq!(parse_datetime(&format_ts(&dt)), Some(dt));
        assert_eq!(parse_datetime("2026-01-11 12:34:56"), Some(dt));
        assert_eq!(parse_datetime("yesterday"), None);
    }
}
