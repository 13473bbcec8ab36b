use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote service a reading was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Backend {
    /// Self-hosted Nightscout server
    #[default]
    Nightscout,
    /// Abbott LibreLinkUp cloud
    LibreLinkUp,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Nightscout, Backend::LibreLinkUp];

    /// Display name shown next to the service toggle.
    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Nightscout => "Nightscout",
            Backend::LibreLinkUp => "LibreLinkUp",
        }
    }

    /// Stable lowercase key used for file names and config values.
    pub fn key(&self) -> &'static str {
        match self {
            Backend::Nightscout => "nightscout",
            Backend::LibreLinkUp => "librelinkup",
        }
    }

    /// Switch to the other backend
    pub fn toggle(&self) -> Self {
        match self {
            Backend::Nightscout => Backend::LibreLinkUp,
            Backend::LibreLinkUp => Backend::Nightscout,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nightscout" | "ns" => Ok(Backend::Nightscout),
            "librelinkup" | "llu" | "libre" => Ok(Backend::LibreLinkUp),
            other => Err(format!("unknown service: {}", other)),
        }
    }
}

/// Largest value accepted from a backend payload, in mg/dL
pub const MAX_GLUCOSE_VALUE: f64 = u16::MAX as f64;

/// Round a payload value to whole mg/dL, rejecting values no sensor reports.
pub fn glucose_value(raw: f64) -> Result<i32, String> {
    if !raw.is_finite() || !(0.0..=MAX_GLUCOSE_VALUE).contains(&raw) {
        return Err(format!("glucose value out of range: {}", raw));
    }
    i32::try_from(raw.round() as i64).map_err(|e| format!("glucose value {}: {}", raw, e))
}

/// A single glucose value in mg/dL.
///
/// Readings are immutable once created. Two readings are the same entry
/// when they share `(source, timestamp)`; ordering is by timestamp with
/// the source as tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct GlucoseReading {
    source: String,
    value: i32,
    timestamp: DateTime<Utc>,
}

impl GlucoseReading {
    pub fn new(source: impl Into<String>, value: i32, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            value,
            timestamp,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Source without its trailing serial, e.g. `"xDrip-DexcomG6 8G1234"` -> `"xDrip-DexcomG6"`.
    pub fn source_label(&self) -> &str {
        match self.source.rfind(' ') {
            Some(idx) => &self.source[..idx],
            None => &self.source,
        }
    }

    /// Identity used for deduplication
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (&self.source, self.timestamp)
    }

    pub fn same_entry(&self, other: &GlucoseReading) -> bool {
        self.timestamp == other.timestamp && self.source == other.source
    }

    /// Ordering on the identity key only (timestamp, then source).
    pub fn cmp_key(&self, other: &GlucoseReading) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl Ord for GlucoseReading {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key(other).then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for GlucoseReading {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
