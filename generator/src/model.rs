use crate::errors::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A synthetic sensor identity referenced by telemetry rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub device_id: String,
    pub location_name: String,
}

/// Operational status reported with each reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Active,
    Idle,
    Warning,
    Error,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Active, Status::Idle, Status::Warning, Status::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "ACTIVE",
            Status::Idle => "IDLE",
            Status::Warning => "WARNING",
            Status::Error => "ERROR",
        }
    }
}

/// Event attached to a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NormalOperation,
    HighTemperature,
    LowBattery,
    MaintenanceRequired,
    SystemUpdate,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::NormalOperation,
        EventType::HighTemperature,
        EventType::LowBattery,
        EventType::MaintenanceRequired,
        EventType::SystemUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NormalOperation => "NORMAL_OPERATION",
            EventType::HighTemperature => "HIGH_TEMPERATURE",
            EventType::LowBattery => "LOW_BATTERY",
            EventType::MaintenanceRequired => "MAINTENANCE_REQUIRED",
            EventType::SystemUpdate => "SYSTEM_UPDATE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Serialization(format!("Unknown status {:?}", s)))
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| Error::Serialization(format!("Unknown event type {:?}", s)))
    }
}

/// One synthesized telemetry measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub time: DateTime<Utc>,
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub status: Status,
    pub event_type: EventType,
}

/// Row shape of `sensor_data`; status columns are plain TEXT
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SensorRow {
    pub time: DateTime<Utc>,
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
    pub event_type: String,
}

impl TryFrom<SensorRow> for SensorReading {
    type Error = Error;

    fn try_from(row: SensorRow) -> Result<Self, Self::Error> {
        Ok(SensorReading {
            time: row.time,
            device_id: row.device_id,
            temperature: row.temperature,
            humidity: row.humidity,
            pressure: row.pressure,
            latitude: row.latitude,
            longitude: row.longitude,
            status: row.status.parse()?,
            event_type: row.event_type.parse()?,
        })
    }
}
