use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::models::GlucoseReading;

/// Month-day and 24h time, e.g. `10-17 14:05`
pub fn short_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%m-%d %H:%M").to_string()
}

/// One history row: source label, local time, right-aligned value.
pub fn format_reading_row(reading: &GlucoseReading) -> String {
    format_reading_row_in(reading, &Local)
}

pub fn format_reading_row_in<Tz: TimeZone>(reading: &GlucoseReading, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    format!(
        "{} {}  {:>3}",
        reading.source_label(),
        short_datetime(&reading.timestamp().with_timezone(tz)),
        reading.value()
    )
}

/// "5 min ago" style age of a timestamp, for the status line
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{} min ago", secs / 60)
    } else if secs < 86_400 {
        format!("{} h ago", secs / 3600)
    } else {
        format!("{} d ago", secs / 86_400)
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
