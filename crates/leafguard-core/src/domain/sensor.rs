//! Sensor kinds and readings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capacitive soil probes and the DHT22 cannot report outside these.
const PERCENT_RANGE: (f64, f64) = (0.0, 100.0);
const DHT22_TEMPERATURE_RANGE_C: (f64, f64) = (-40.0, 80.0);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Soil moisture, percent.
    Moisture,
    /// Air temperature, degrees Celsius.
    Temperature,
    /// Relative air humidity, percent.
    Humidity,
}

impl SensorKind {
    /// Dense index for slot arrays.
    pub fn index(self) -> usize {
        match self {
            SensorKind::Moisture => 0,
            SensorKind::Temperature => 1,
            SensorKind::Humidity => 2,
        }
    }

    /// Inclusive physical range a reading must fall in to be accepted.
    pub fn valid_range(self) -> (f64, f64) {
        match self {
            SensorKind::Moisture | SensorKind::Humidity => PERCENT_RANGE,
            SensorKind::Temperature => DHT22_TEMPERATURE_RANGE_C,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Moisture => "moisture",
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub kind: SensorKind,
    pub value: f64,
    pub received_at: DateTime<Utc>,
}
