//! Maps raw provider payloads into the stable output shapes
//!
//! Telemetry readings get a parsed instant, a localized display string and a
//! pair of arrow symbols. Document pages pass through untouched except for the
//! pagination bookkeeping, which is reset once every page has been collected.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::data::{DocumentPage, RawReading, Reading, TrendCode, UpstreamError};

/// Marker used for both symbol fields when a trend code is not recognized
pub const UNKNOWN_TREND: &str = "Unknown";

/// Trend names indexed by the provider's numeric code
const TREND_NAMES: [&str; 10] = [
    "None",
    "DoubleUp",
    "SingleUp",
    "FortyFiveUp",
    "Flat",
    "FortyFiveDown",
    "SingleDown",
    "DoubleDown",
    "NotComputable",
    "RateOutOfRange",
];

/// Display format: `7/15/2024, 4:00:00 AM`
const DISPLAY_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Resolves a trend code to its numeric form
///
/// Returns `None` for numbers past the known range and for unknown names.
pub fn trend_number(code: &TrendCode) -> Option<u8> {
    match code {
        TrendCode::Numeric(n) if (*n as usize) < TREND_NAMES.len() => Some(*n),
        TrendCode::Numeric(_) => None,
        TrendCode::Named(name) => TREND_NAMES
            .iter()
            .position(|known| known.eq_ignore_ascii_case(name))
            .map(|i| i as u8),
    }
}

/// Maps a trend code to its (HTML entity, Unicode) arrow pair
///
/// Only the seven directional trends have arrows; everything else, including
/// the provider's own "None" and "NotComputable", maps to `UNKNOWN_TREND`.
pub fn trend_symbols(code: &TrendCode) -> (&'static str, &'static str) {
    match trend_number(code) {
        Some(1) => ("&uarr;&uarr;", "⇈"),
        Some(2) => ("&uarr;", "↑"),
        Some(3) => ("&nearr;", "↗"),
        Some(4) => ("&rarr;", "→"),
        Some(5) => ("&searr;", "↘"),
        Some(6) => ("&darr;", "↓"),
        Some(7) => ("&darr;&darr;", "⇊"),
        _ => (UNKNOWN_TREND, UNKNOWN_TREND),
    }
}

/// Extracts the first run of digits from a provider timestamp
/// (e.g. `Date(1721044800000-0700)`) and reads it as epoch milliseconds
pub fn parse_provider_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let millis: i64 = digits.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Renders an instant on a 12-hour clock in the given timezone
pub fn format_display_time(instant: DateTime<Utc>, timezone: Tz) -> String {
    instant.with_timezone(&timezone).format(DISPLAY_FORMAT).to_string()
}

/// Builds the caller-facing reading from a raw provider reading
///
/// The result is always marked `cached: false`; the telemetry handler flags the
/// copy it stores.
pub fn normalize_reading(raw: &RawReading, timezone: Tz) -> Result<Reading, UpstreamError> {
    let timestamp = parse_provider_timestamp(&raw.wall_time)
        .ok_or_else(|| UpstreamError::InvalidTimestamp(raw.wall_time.clone()))?;
    let (html, unicode) = trend_symbols(&raw.trend);

    Ok(Reading {
        value: raw.value,
        trend: trend_number(&raw.trend),
        trend_description: html.to_string(),
        trend_description_unicode: unicode.to_string(),
        timestamp,
        parsed_timestamp: format_display_time(timestamp, timezone),
        cached: false,
    })
}

/// The page produced once aggregation has consumed every upstream page
pub fn completed_page(results: Vec<Value>) -> DocumentPage {
    DocumentPage {
        results,
        next_cursor: None,
        has_more: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    #[test]
    fn test_flat_maps_to_right_arrow() {
        let flat = TrendCode::Named("Flat".to_string());
        assert_eq!(trend_symbols(&flat), ("&rarr;", "→"));
        assert_eq!(trend_symbols(&TrendCode::Numeric(4)), ("&rarr;", "→"));
    }

    #[test]
    fn test_directional_trends() {
        let cases = [
            ("DoubleUp", "&uarr;&uarr;", "⇈"),
            ("SingleUp", "&uarr;", "↑"),
            ("FortyFiveUp", "&nearr;", "↗"),
            ("FortyFiveDown", "&searr;", "↘"),
            ("SingleDown", "&darr;", "↓"),
            ("DoubleDown", "&darr;&darr;", "⇊"),
        ];
        for (name, html, unicode) in cases {
            assert_eq!(
                trend_symbols(&TrendCode::Named(name.to_string())),
                (html, unicode),
                "trend {}",
                name
            );
        }
    }

    #[test]
    fn test_unrecognized_trend_maps_to_unknown() {
        let odd = TrendCode::Named("Sideways".to_string());
        assert_eq!(trend_symbols(&odd), (UNKNOWN_TREND, UNKNOWN_TREND));
        assert_eq!(trend_number(&odd), None);

        assert_eq!(trend_symbols(&TrendCode::Numeric(42)), ("Unknown", "Unknown"));
        assert_eq!(trend_number(&TrendCode::Numeric(42)), None);
    }

    #[test]
    fn test_non_directional_codes_are_unknown_but_numbered() {
        let not_computable = TrendCode::Named("NotComputable".to_string());
        assert_eq!(trend_symbols(&not_computable), (UNKNOWN_TREND, UNKNOWN_TREND));
        assert_eq!(trend_number(&not_computable), Some(8));
    }

    #[test]
    fn test_parse_provider_timestamp_takes_first_digit_run() {
        let instant = parse_provider_timestamp("Date(1721044800000-0400)").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap());

        let plain = parse_provider_timestamp("/Date(1721044800000)/").unwrap();
        assert_eq!(plain, instant);
    }

    #[test]
    fn test_parse_provider_timestamp_without_digits() {
        assert!(parse_provider_timestamp("Date()").is_none());
        assert!(parse_provider_timestamp("").is_none());
    }

    #[test]
    fn test_format_display_time_uses_twelve_hour_clock() {
        let instant = Utc.with_ymd_and_hms(2024, 7, 15, 16, 5, 9).unwrap();
        assert_eq!(format_display_time(instant, New_York), "7/15/2024, 12:05:09 PM");

        let morning = Utc.with_ymd_and_hms(2024, 1, 3, 9, 30, 0).unwrap();
        assert_eq!(format_display_time(morning, New_York), "1/3/2024, 4:30:00 AM");
    }

    #[test]
    fn test_normalize_reading() {
        let raw = RawReading {
            value: 104,
            trend: TrendCode::Named("SingleDown".to_string()),
            wall_time: "Date(1721044800000)".to_string(),
        };
        let reading = normalize_reading(&raw, New_York).unwrap();

        assert_eq!(reading.value, 104);
        assert_eq!(reading.trend, Some(6));
        assert_eq!(reading.trend_description, "&darr;");
        assert_eq!(reading.trend_description_unicode, "↓");
        assert_eq!(reading.parsed_timestamp, "7/15/2024, 8:00:00 AM");
        assert!(!reading.cached);
    }

    #[test]
    fn test_normalize_reading_rejects_bad_timestamp() {
        let raw = RawReading {
            value: 90,
            trend: TrendCode::Numeric(4),
            wall_time: "yesterday".to_string(),
        };
        assert!(matches!(
            normalize_reading(&raw, New_York),
            Err(UpstreamError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_completed_page_clears_bookkeeping() {
        let page = completed_page(vec![serde_json::json!({"id": 1})]);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
        assert_eq!(page.results.len(), 1);
    }
}
