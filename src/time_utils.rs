// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.
//!
//! Stored timestamps use a fixed-width microsecond form so that string order
//! in the document store matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp with fixed microsecond precision (lexicographically sortable).
pub fn format_sortable(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse any RFC3339 timestamp into UTC.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sortable_format_orders_like_time() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let later = earlier + chrono::Duration::microseconds(1500);

        let a = format_sortable(earlier);
        let b = format_sortable(later);

        assert_eq!(a, "2024-01-15T10:00:00.000000Z");
        assert!(a < b);
        assert_eq!(parse_utc(&b), Some(later));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_utc("yesterday"), None);
    }
}
