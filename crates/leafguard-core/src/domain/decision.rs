//! Irrigation decisions and the pump commands they produce.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why an evaluation cycle did or did not irrigate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Triggered,
    ManualOverride,
    Cooldown,
    NoPlant,
    Healthy,
    LowStability,
    SensorStale,
    SensorThresholdNotMet,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::Triggered => "triggered",
            DecisionReason::ManualOverride => "manual_override",
            DecisionReason::Cooldown => "cooldown",
            DecisionReason::NoPlant => "no_plant",
            DecisionReason::Healthy => "healthy",
            DecisionReason::LowStability => "low_stability",
            DecisionReason::SensorStale => "sensor_stale",
            DecisionReason::SensorThresholdNotMet => "sensor_threshold_not_met",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation cycle. Computed fresh, never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IrrigationDecision {
    pub should_irrigate: bool,
    pub duration_seconds: f64,
    pub reason: DecisionReason,
}

impl IrrigationDecision {
    pub fn irrigate(duration_seconds: f64, reason: DecisionReason) -> Self {
        Self {
            should_irrigate: true,
            duration_seconds,
            reason,
        }
    }

    pub fn hold(reason: DecisionReason) -> Self {
        Self {
            should_irrigate: false,
            duration_seconds: 0.0,
            reason,
        }
    }

    /// Command string understood by the field device (`RUN` / `STOP`).
    pub fn motor_command(&self) -> &'static str {
        if self.should_irrigate {
            "RUN"
        } else {
            "STOP"
        }
    }

    /// The pump command to dispatch, if this decision irrigates.
    pub fn pump_command(&self, issued_at: DateTime<Utc>) -> Option<PumpCommand> {
        self.should_irrigate
            .then(|| PumpCommand::run(self.duration_seconds, issued_at))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PumpAction {
    Run,
    Stop,
}

/// Instruction for the remote actuator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PumpCommand {
    pub id: Uuid,
    pub action: PumpAction,
    pub duration_seconds: f64,
    pub issued_at: DateTime<Utc>,
}

impl PumpCommand {
    pub fn run(duration_seconds: f64, issued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: PumpAction::Run,
            duration_seconds,
            issued_at,
        }
    }

    /// Explicit deactivate, sent at shutdown if the pump may still be on.
    pub fn stop(issued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: PumpAction::Stop,
            duration_seconds: 0.0,
            issued_at,
        }
    }

    /// When a `Run` command is expected to finish.
    pub fn ends_at(&self) -> DateTime<Utc> {
        let millis = (self.duration_seconds * 1000.0).round() as i64;
        self.issued_at + chrono::Duration::milliseconds(millis)
    }
}

/// What the dispatcher observed when sending a command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActuationOutcome {
    pub accepted: bool,
    pub error: Option<String>,
}

impl ActuationOutcome {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(error: impl fmt::Display) -> Self {
        Self {
            accepted: false,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_never_carries_a_duration() {
        let d = IrrigationDecision::hold(DecisionReason::Cooldown);
        assert!(!d.should_irrigate);
        assert_eq!(d.duration_seconds, 0.0);
        assert_eq!(d.motor_command(), "STOP");
        assert!(d.pump_command(Utc::now()).is_none());
    }

    #[test]
    fn irrigate_produces_run_command() {
        let now = Utc::now();
        let d = IrrigationDecision::irrigate(3.5, DecisionReason::Triggered);
        let cmd = d.pump_command(now).expect("run command");
        assert_eq!(cmd.action, PumpAction::Run);
        assert_eq!(cmd.duration_seconds, 3.5);
        assert_eq!(cmd.ends_at(), now + chrono::Duration::milliseconds(3500));
    }

    #[test]
    fn reason_serializes_snake_case() {
        let json = serde_json::to_string(&DecisionReason::SensorThresholdNotMet).unwrap();
        assert_eq!(json, "\"sensor_threshold_not_met\"");
    }
}
