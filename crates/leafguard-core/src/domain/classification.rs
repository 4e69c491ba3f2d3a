//! Per-frame classification results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output of the presence model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlantLabel {
    NonPlant,
    Plant,
}

/// Ordinal disease severity.
///
/// The discriminants are the ordinal scale used by the temporal smoother.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Healthy = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Severity {
    /// All levels in ascending order.
    pub const ALL: [Severity; 4] = [
        Severity::Healthy,
        Severity::Low,
        Severity::Medium,
        Severity::High,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Round a smoothed ordinal to the nearest defined level.
    ///
    /// Values outside `[0, 3]` saturate; halves round up.
    pub fn nearest(value: f64) -> Self {
        let clamped = if value.is_finite() {
            value.clamp(0.0, 3.0)
        } else {
            0.0
        };
        Self::from_ordinal(clamped.round() as u8).unwrap_or(Severity::High)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Healthy => "healthy",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a label string does not name a severity level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity label: {0}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" => Ok(Severity::Healthy),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// Result of running the gated two-stage classifier on one frame.
///
/// Immutable once created; `confidence` is always inside `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub label: PlantLabel,

    /// Present only when the presence gate passed and the severity model ran.
    pub severity: Option<Severity>,

    pub confidence: f64,

    pub timestamp: DateTime<Utc>,
}

impl ClassificationResult {
    /// A plant observation. `severity` is `None` when the presence gate
    /// rejected the frame.
    pub fn plant(severity: Option<Severity>, confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            label: PlantLabel::Plant,
            severity,
            confidence: clamp_unit(confidence),
            timestamp,
        }
    }

    pub fn non_plant(confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            label: PlantLabel::NonPlant,
            severity: None,
            confidence: clamp_unit(confidence),
            timestamp,
        }
    }

    /// The result substituted when a model invocation fails.
    pub fn degraded(timestamp: DateTime<Utc>) -> Self {
        Self::non_plant(0.0, timestamp)
    }

    pub fn is_plant(&self) -> bool {
        self.label == PlantLabel::Plant
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rounds_to_closest_level() {
        assert_eq!(Severity::nearest(0.0), Severity::Healthy);
        assert_eq!(Severity::nearest(0.49), Severity::Healthy);
        assert_eq!(Severity::nearest(0.5), Severity::Low);
        assert_eq!(Severity::nearest(2.4), Severity::Medium);
        assert_eq!(Severity::nearest(2.6), Severity::High);
    }

    #[test]
    fn nearest_saturates_out_of_range() {
        assert_eq!(Severity::nearest(-1.0), Severity::Healthy);
        assert_eq!(Severity::nearest(7.0), Severity::High);
        assert_eq!(Severity::nearest(f64::NAN), Severity::Healthy);
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" medium ".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("rotten".parse::<Severity>().is_err());
    }

    #[test]
    fn ordinal_roundtrip_covers_all_levels() {
        for s in Severity::ALL {
            assert_eq!(Severity::from_ordinal(s.ordinal()), Some(s));
        }
        assert_eq!(Severity::from_ordinal(4), None);
    }

    #[test]
    fn constructors_clamp_confidence() {
        let now = Utc::now();
        assert_eq!(ClassificationResult::plant(None, 1.7, now).confidence, 1.0);
        assert_eq!(ClassificationResult::non_plant(-0.2, now).confidence, 0.0);
        let degraded = ClassificationResult::degraded(now);
        assert_eq!(degraded.label, PlantLabel::NonPlant);
        assert_eq!(degraded.severity, None);
        assert_eq!(degraded.confidence, 0.0);
    }
}
