//! Timestamps.
//!
//! Every stored date is an RFC 3339 UTC string with microsecond precision and
//! a `Z` suffix, so lexical order matches chronological order in SQL.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn to_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in stored form.
pub fn timestamp_now() -> String {
    to_timestamp(now())
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Stored form of `at - seconds`, or `None` when that falls outside the
/// representable range.
pub fn timestamp_before(at: DateTime<Utc>, seconds: i64) -> Option<String> {
    let delta = TimeDelta::try_seconds(seconds)?;
    at.checked_sub_signed(delta).map(to_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 8, 5, 1).unwrap();
        assert_eq!(to_timestamp(at), "2024-03-09T08:05:01.000000Z");
        assert_eq!(parse_timestamp(&to_timestamp(at)), Some(at));
    }

    #[test]
    fn test_lexical_order_is_chronological() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let earlier = timestamp_before(at, 3600).unwrap();
        assert!(earlier < to_timestamp(at));
        assert_eq!(earlier, "2024-12-31T22:59:59.000000Z");
    }

    #[test]
    fn test_out_of_range_offset_is_none() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(timestamp_before(at, i64::MAX).is_none());
        assert!(timestamp_before(at, 200_000_000_000_000 * 60).is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }
}
