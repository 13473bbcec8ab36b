//! Wire types for the LibreLinkUp follower API.
//!
//! Every response is wrapped in `{"status": n, "data": ...}`. Readings sit
//! inside connection objects (`glucoseMeasurement`) or in the graph
//! endpoint's `graphData` list.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use super::reading::glucose_value;
use super::GlucoseReading;

/// Source prefix for readings fetched from LibreLinkUp
pub const LIBRE_LINK_UP_SOURCE: &str = "LibreLinkUp";

/// `FactoryTimestamp` format, always UTC: `1/2/2023 3:04:05 PM`
const FACTORY_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// Envelope status for a successful call
pub const STATUS_OK: i32 = 0;

/// Envelope status for rejected email/password
pub const STATUS_BAD_CREDENTIALS: i32 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub status: i32,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ErrorMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(rename = "authTicket", default)]
    pub auth_ticket: Option<AuthTicket>,
    #[serde(default)]
    pub redirect: bool,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthTicket {
    pub token: String,
    /// Epoch seconds
    pub expires: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    #[serde(rename = "patientId")]
    pub patient_id: String,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    pub last_name: Option<String>,
    #[serde(rename = "glucoseMeasurement", default)]
    pub glucose_measurement: Option<Measurement>,
    #[serde(default)]
    pub sensor: Option<Sensor>,
}

impl Connection {
    /// Reading source for this connection, `"LibreLinkUp <serial>"` when the sensor is known.
    pub fn source(&self) -> String {
        match self.sensor.as_ref().and_then(|s| s.sn.as_deref()) {
            Some(sn) if !sn.is_empty() => format!("{} {}", LIBRE_LINK_UP_SOURCE, sn),
            _ => LIBRE_LINK_UP_SOURCE.to_string(),
        }
    }

    pub fn patient_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{} {}", f, l),
            (Some(f), None) => f.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => self.patient_id.clone(),
        }
    }

    /// Current measurement of this connection as a reading
    pub fn current_reading(&self) -> Result<GlucoseReading, String> {
        let measurement = self
            .glucose_measurement
            .as_ref()
            .ok_or_else(|| format!("connection {} has no glucoseMeasurement", self.patient_id))?;
        measurement.to_reading(&self.source())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sensor {
    #[serde(default)]
    pub sn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Measurement {
    #[serde(rename = "ValueInMgPerDl", default)]
    pub value_in_mg_per_dl: Option<f64>,
    #[serde(rename = "FactoryTimestamp", default)]
    pub factory_timestamp: Option<String>,
}

impl Measurement {
    pub fn to_reading(&self, source: &str) -> Result<GlucoseReading, String> {
        let value = self
            .value_in_mg_per_dl
            .ok_or_else(|| "measurement without ValueInMgPerDl".to_string())
            .and_then(glucose_value)?;
        let raw = self
            .factory_timestamp
            .as_deref()
            .ok_or_else(|| "measurement without FactoryTimestamp".to_string())?;
        let timestamp = parse_factory_timestamp(raw)?;
        Ok(GlucoseReading::new(source, value, timestamp))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub connection: Option<Connection>,
    #[serde(rename = "graphData", default)]
    pub graph_data: Vec<Measurement>,
}

pub fn parse_factory_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(raw.trim(), FACTORY_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid FactoryTimestamp {:?}: {}", raw, e))
}

/// Readings of every connection's current measurement.
pub fn connection_readings(connections: &[Connection]) -> Result<Vec<GlucoseReading>, String> {
    connections.iter().map(Connection::current_reading).collect()
}

/// Readings of a graph payload, all attributed to `source`.
pub fn graph_readings(graph: &GraphData, source: &str) -> Result<Vec<GlucoseReading>, String> {
    graph.graph_data.iter().map(|m| m.to_reading(source)).collect()
}
