//! Latest-value store for the soil and climate sensors.
//!
//! Each [`SensorKind`] has an independent slot. Ingestion overwrites the slot
//! (last received wins, regardless of any device-side timestamp) and reads
//! past the staleness bound report [`SensorRead::Stale`] instead of the old
//! value.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::SensorConfig;
use crate::domain::{SensorKind, SensorReading};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("{kind} reading is stale or missing")]
    Stale { kind: SensorKind },

    #[error("{kind} value {value} outside valid range [{min}, {max}]")]
    OutOfRange {
        kind: SensorKind,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{kind} value is not a finite number")]
    NonFinite { kind: SensorKind },
}

/// Result of reading one slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SensorRead {
    Fresh(SensorReading),
    /// A reading exists but is too old (or stamped after the read time).
    Stale { received_at: DateTime<Utc> },
    /// Nothing has been ingested for this kind.
    Missing,
}

impl SensorRead {
    pub fn fresh(&self) -> Option<&SensorReading> {
        match self {
            SensorRead::Fresh(reading) => Some(reading),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.fresh().map(|r| r.value)
    }

    /// The reading, or `SensorError::Stale` if it cannot be trusted.
    pub fn require(&self, kind: SensorKind) -> Result<SensorReading, SensorError> {
        self.fresh().copied().ok_or(SensorError::Stale { kind })
    }
}

/// All three slots read at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub moisture: SensorRead,
    pub temperature: SensorRead,
    pub humidity: SensorRead,
}

/// Fresh moisture, temperature and humidity values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub moisture: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl SensorSnapshot {
    pub fn get(&self, kind: SensorKind) -> &SensorRead {
        match kind {
            SensorKind::Moisture => &self.moisture,
            SensorKind::Temperature => &self.temperature,
            SensorKind::Humidity => &self.humidity,
        }
    }

    /// All three values, or the first kind that is stale or missing.
    pub fn require_all(&self) -> Result<Climate, SensorError> {
        Ok(Climate {
            moisture: self.moisture.require(SensorKind::Moisture)?.value,
            temperature: self.temperature.require(SensorKind::Temperature)?.value,
            humidity: self.humidity.require(SensorKind::Humidity)?.value,
        })
    }
}

#[derive(Debug)]
pub struct SensorStore {
    staleness: Duration,
    slots: [RwLock<Option<SensorReading>>; 3],
}

impl SensorStore {
    pub fn new(staleness: Duration) -> Self {
        Self {
            staleness,
            slots: Default::default(),
        }
    }

    pub fn from_config(config: &SensorConfig) -> Self {
        Self::new(config.staleness())
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Reject values the sensor cannot physically report.
    pub fn check(kind: SensorKind, value: f64) -> Result<(), SensorError> {
        if !value.is_finite() {
            return Err(SensorError::NonFinite { kind });
        }
        let (min, max) = kind.valid_range();
        if value < min || value > max {
            return Err(SensorError::OutOfRange {
                kind,
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Overwrite the slot for `kind` with `received_at = now`.
    pub fn ingest(
        &self,
        kind: SensorKind,
        value: f64,
        now: DateTime<Utc>,
    ) -> Result<SensorReading, SensorError> {
        Self::check(kind, value)?;

        let reading = SensorReading {
            kind,
            value,
            received_at: now,
        };
        *self.slots[kind.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(reading);
        Ok(reading)
    }

    /// `Stale` iff `now - received_at > staleness`; a reading stamped after
    /// `now` is never returned.
    pub fn get(&self, kind: SensorKind, now: DateTime<Utc>) -> SensorRead {
        let slot = *self.slots[kind.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match slot {
            None => SensorRead::Missing,
            Some(reading) => {
                let age = now - reading.received_at;
                if age < Duration::zero() || age > self.staleness {
                    SensorRead::Stale {
                        received_at: reading.received_at,
                    }
                } else {
                    SensorRead::Fresh(reading)
                }
            }
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SensorSnapshot {
        SensorSnapshot {
            moisture: self.get(SensorKind::Moisture, now),
            temperature: self.get(SensorKind::Temperature, now),
            humidity: self.get(SensorKind::Humidity, now),
        }
    }
}
