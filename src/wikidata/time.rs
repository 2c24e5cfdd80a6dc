use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

/// The proleptic Gregorian calendar. Values on any other calendar model
/// are dropped.
const GREGORIAN_CALENDAR: &str = "Q1985727";

lazy_static! {
    /// Date component of a Wikidata time string, positive years only.
    /// Month and day may be zero at coarse precisions.
    static ref TIME_VALUE: Regex = Regex::new(r"^\+(\d{1,16})-(\d{2})-(\d{2})T").unwrap();
}

/// Convert a Wikidata time claim value to epoch seconds UTC.
///
/// Precisions 7 through 9 produce the year only; 10 adds the month; 11
/// through 13 add the day; 14 parses the full ISO datetime. Anything
/// unparseable (non-Gregorian, negative year, out-of-range date, unknown
/// precision) yields None.
pub fn parse_time_value(value: &Value) -> Option<i64> {
    let calendar = value.get("calendarmodel")?.as_str()?;
    if !calendar.ends_with(GREGORIAN_CALENDAR) {
        return None;
    }
    let time = value.get("time")?.as_str()?;
    let precision = value.get("precision")?.as_u64()?;

    match precision {
        7..=13 => {
            let caps = TIME_VALUE.captures(time)?;
            let year: i64 = caps[1].parse().ok()?;
            if year > i64::from(i32::max_value()) {
                return None;
            }
            let month: u32 = caps[2].parse().ok()?;
            let day: u32 = caps[3].parse().ok()?;
            let (month, day) = match precision {
                7..=9 => (1, 1),
                10 => (month.max(1), 1),
                _ => (month.max(1), day.max(1)),
            };
            Some(
                NaiveDate::from_ymd_opt(year as i32, month, day)?
                    .and_hms_opt(0, 0, 0)?
                    .timestamp(),
            )
        }
        14 => Some(
            DateTime::parse_from_rfc3339(time.trim_start_matches('+'))
                .ok()?
                .timestamp(),
        ),
        _ => None,
    }
}
