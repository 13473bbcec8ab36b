use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::reading::glucose_value;
use super::GlucoseReading;

/// Source used when an entry carries no `device` field
pub const DEFAULT_NIGHTSCOUT_SOURCE: &str = "Nightscout";

/// Entry as returned by `/api/v1/entries.json`.
///
/// Only `sgv` entries carry a glucose value; calibrations (`cal`) and
/// meter readings (`mbg`) share the collection and are skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct NightscoutEntry {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sgv: Option<f64>,
    /// Epoch milliseconds
    #[serde(default)]
    pub date: Option<f64>,
    #[serde(rename = "dateString", default)]
    pub date_string: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
}

impl NightscoutEntry {
    pub fn is_sgv(&self) -> bool {
        self.kind.as_deref().map(|k| k == "sgv").unwrap_or(true)
    }

    fn timestamp(&self) -> Result<DateTime<Utc>, String> {
        if let Some(ms) = self.date {
            if !ms.is_finite() {
                return Err(format!("date out of range: {}", ms));
            }
            return Utc
                .timestamp_millis_opt(ms as i64)
                .single()
                .ok_or_else(|| format!("date out of range: {}", ms));
        }
        match self.date_string.as_deref() {
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("invalid dateString {:?}: {}", s, e)),
            None => Err("entry has neither date nor dateString".to_string()),
        }
    }

    /// Convert into a reading. Returns `Ok(None)` for non-sgv entries.
    pub fn into_reading(self) -> Result<Option<GlucoseReading>, String> {
        if !self.is_sgv() {
            return Ok(None);
        }
        let value = self.sgv.ok_or_else(|| "sgv entry without sgv value".to_string())?;
        let value = glucose_value(value)?;
        let timestamp = self.timestamp()?;
        let source = self
            .device
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NIGHTSCOUT_SOURCE.to_string());
        Ok(Some(GlucoseReading::new(source, value, timestamp)))
    }
}

/// Decode a full entries payload. Any malformed sgv entry fails the whole batch.
pub fn parse_entries(entries: Vec<NightscoutEntry>) -> Result<Vec<GlucoseReading>, String> {
    let mut readings = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(reading) = entry.into_reading()? {
            readings.push(reading);
        }
    }
    Ok(readings)
}
