//! Display helpers for readings and timestamps.

pub mod format;

pub use format::{format_age, format_reading_row, short_datetime, truncate_string};
