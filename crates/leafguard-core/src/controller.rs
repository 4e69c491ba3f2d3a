//! Decision side of the daemon.
//!
//! Joins the latest published verdict with the sensor store, runs the
//! engine and dispatches any resulting pump command. Every request handler
//! goes through here; the frame task never does.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::activity::ActivityLog;
use crate::dispatch::ActuationDispatcher;
use crate::domain::{
    ActuationOutcome, DecisionReason, IrrigationDecision, PumpCommand, SensorKind, Severity,
};
use crate::engine::IrrigationEngine;
use crate::metrics::{MetricsSnapshot, METRICS};
use crate::obs;
use crate::sensors::{SensorError, SensorStore};
use crate::smoother::SmoothedVerdict;

/// Everything one evaluation cycle produced.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CycleReport {
    pub decision: IrrigationDecision,
    pub verdict: SmoothedVerdict,
    pub command: Option<PumpCommand>,
    pub outcome: Option<ActuationOutcome>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    pub plant: bool,
    pub severity: Option<Severity>,
    pub confidence: f64,
    pub stability: f64,
    pub moisture: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    /// `RUN` while the last accepted run command may still be active.
    pub motor: &'static str,
    pub cooldown_remaining_seconds: f64,
    pub manual_pending: bool,
    pub metrics: MetricsSnapshot,
}

pub struct IrrigationController {
    engine: IrrigationEngine,
    sensors: Arc<SensorStore>,
    verdict: watch::Receiver<SmoothedVerdict>,
    dispatcher: ActuationDispatcher,
    activity: Arc<ActivityLog>,
    last_reason: Mutex<Option<DecisionReason>>,
}

impl IrrigationController {
    pub fn new(
        engine: IrrigationEngine,
        sensors: Arc<SensorStore>,
        verdict: watch::Receiver<SmoothedVerdict>,
        dispatcher: ActuationDispatcher,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            engine,
            sensors,
            verdict,
            dispatcher,
            activity,
            last_reason: Mutex::new(None),
        }
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    pub fn sensors(&self) -> &Arc<SensorStore> {
        &self.sensors
    }

    pub fn engine(&self) -> &IrrigationEngine {
        &self.engine
    }

    /// Store a DHT22 pair. Both values are validated before either is written.
    pub fn ingest_climate(
        &self,
        temperature: f64,
        humidity: f64,
        now: DateTime<Utc>,
    ) -> Result<(), SensorError> {
        SensorStore::check(SensorKind::Temperature, temperature)?;
        SensorStore::check(SensorKind::Humidity, humidity)?;
        for (kind, value) in [
            (SensorKind::Temperature, temperature),
            (SensorKind::Humidity, humidity),
        ] {
            let reading = self.sensors.ingest(kind, value, now)?;
            obs::emit_sensor_ingested(&reading);
        }
        Ok(())
    }

    /// Store a soil-moisture reading and immediately run a cycle.
    pub async fn process_moisture(
        &self,
        moisture: f64,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, SensorError> {
        let reading = self.sensors.ingest(SensorKind::Moisture, moisture, now)?;
        obs::emit_sensor_ingested(&reading);
        Ok(self.evaluate_cycle(now).await)
    }

    pub async fn evaluate_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let verdict = *self.verdict.borrow();
        let snapshot = self.sensors.snapshot(now);
        let decision = self.engine.evaluate(&verdict, &snapshot, now);
        METRICS.inc_evaluations();
        obs::emit_decision_evaluated(&decision, &verdict);

        let command = decision.pump_command(now);
        let outcome = match &command {
            Some(command) => {
                METRICS.inc_irrigations();
                obs::emit_irrigation_triggered(&decision, command);
                let outcome = self.dispatcher.dispatch(command.clone()).await;
                self.log_trigger(&decision, &verdict, &outcome);
                Some(outcome)
            }
            None => {
                self.log_hold(&decision);
                None
            }
        };

        CycleReport {
            decision,
            verdict,
            command,
            outcome,
        }
    }

    /// Queue a one-shot spray for the next cycle outside cooldown.
    pub fn request_manual_spray(&self) {
        self.engine.request_manual_spray();
        self.activity.info("Manual spray requested");
    }

    pub fn status(&self, now: DateTime<Utc>) -> StatusReport {
        let verdict = *self.verdict.borrow();
        let sensors = self.sensors.snapshot(now);
        let motor = if self.dispatcher.pump_active(now) {
            "RUN"
        } else {
            "STOP"
        };

        StatusReport {
            plant: verdict.severity.is_some(),
            severity: verdict.severity,
            confidence: verdict.confidence,
            stability: verdict.stability,
            moisture: sensors.moisture.value(),
            temperature: sensors.temperature.value(),
            humidity: sensors.humidity.value(),
            motor,
            cooldown_remaining_seconds: self.engine.phase(now).remaining(now).num_milliseconds()
                as f64
                / 1000.0,
            manual_pending: self.engine.manual_pending(),
            metrics: METRICS.snapshot(),
        }
    }

    /// Stop the pump if it may still be running and flush counters.
    pub async fn shutdown(&self, now: DateTime<Utc>) -> Option<ActuationOutcome> {
        let outcome = self.dispatcher.shutdown(now).await;
        match &outcome {
            Some(o) if o.accepted && !self.dispatcher.reaches_device() => self
                .activity
                .info("Shutting down; the device ends the current spray on its own timer"),
            Some(o) if o.accepted => self.activity.info("Pump stopped for shutdown"),
            Some(o) => self.activity.error(format!(
                "Failed to stop pump: {}",
                o.error.as_deref().unwrap_or("unknown error")
            )),
            None => {}
        }
        METRICS.flush();
        outcome
    }

    fn log_trigger(
        &self,
        decision: &IrrigationDecision,
        verdict: &SmoothedVerdict,
        outcome: &ActuationOutcome,
    ) {
        self.set_last_reason(decision.reason);
        if !outcome.accepted {
            self.activity.error(format!(
                "Pump command failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
            return;
        }
        let message = match (decision.reason, verdict.severity) {
            (DecisionReason::ManualOverride, _) => {
                format!("Manual spray for {:.1}s", decision.duration_seconds)
            }
            (_, Some(severity)) => format!(
                "Spraying for {:.1}s ({severity} severity)",
                decision.duration_seconds
            ),
            (_, None) => format!("Spraying for {:.1}s", decision.duration_seconds),
        };
        self.activity.success(message);
    }

    /// Holds are logged only when the reason changes, so a steady state does
    /// not flood the ring.
    fn log_hold(&self, decision: &IrrigationDecision) {
        if self.set_last_reason(decision.reason) == Some(decision.reason) {
            return;
        }
        match decision.reason {
            DecisionReason::SensorStale => self.activity.warning("Sensor data stale, holding"),
            DecisionReason::Cooldown => self.activity.info("Cooling down"),
            DecisionReason::SensorThresholdNotMet => {
                self.activity.info("Conditions not met for spraying")
            }
            DecisionReason::LowStability => self.activity.info("Waiting for a stable verdict"),
            DecisionReason::Healthy => self.activity.info("Plant healthy"),
            DecisionReason::NoPlant => self.activity.info("No plant in view"),
            DecisionReason::Triggered | DecisionReason::ManualOverride => {}
        }
    }

    fn set_last_reason(&self, reason: DecisionReason) -> Option<DecisionReason> {
        self.last_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLevel;
    use crate::config::IrrigationConfig;
    use crate::dispatch::ReplyActuator;
    use crate::domain::PumpAction;
    use crate::fakes::RecordingActuator;

    fn controller(
        verdict: SmoothedVerdict,
        actuator: Arc<RecordingActuator>,
    ) -> (IrrigationController, watch::Sender<SmoothedVerdict>) {
        let (tx, rx) = watch::channel(verdict);
        let c = IrrigationController::new(
            IrrigationEngine::new(IrrigationConfig::default()),
            Arc::new(SensorStore::new(chrono::Duration::seconds(10))),
            rx,
            ActuationDispatcher::new(actuator),
            Arc::new(ActivityLog::new(50)),
        );
        (c, tx)
    }

    fn high() -> SmoothedVerdict {
        SmoothedVerdict {
            severity: Some(Severity::High),
            stability: 0.9,
            window_size: 20,
            confidence: 0.95,
        }
    }

    #[tokio::test]
    async fn moisture_post_triggers_and_dispatches() {
        let actuator = Arc::new(RecordingActuator::new());
        let (c, _tx) = controller(high(), actuator.clone());
        let now = Utc::now();

        c.ingest_climate(25.0, 50.0, now).unwrap();
        let report = c.process_moisture(20.0, now).await.unwrap();

        assert!(report.decision.should_irrigate);
        assert_eq!(report.decision.duration_seconds, 5.0);
        assert_eq!(report.outcome, Some(ActuationOutcome::accepted()));
        assert_eq!(actuator.commands().len(), 1);
        assert_eq!(c.status(now).motor, "RUN");

        let last = c.activity().snapshot().pop().unwrap();
        assert_eq!(last.level, ActivityLevel::Success);
    }

    #[tokio::test]
    async fn invalid_climate_writes_nothing() {
        let (c, _tx) = controller(high(), Arc::new(RecordingActuator::new()));
        let now = Utc::now();
        assert!(c.ingest_climate(25.0, 150.0, now).is_err());
        assert_eq!(c.status(now).temperature, None);
    }

    #[tokio::test]
    async fn holds_log_once_per_reason() {
        let (c, _tx) = controller(high(), Arc::new(RecordingActuator::new()));
        let now = Utc::now();
        for _ in 0..3 {
            let report = c.evaluate_cycle(now).await;
            assert_eq!(report.decision.reason, DecisionReason::SensorStale);
        }
        assert_eq!(c.activity().len(), 1);
    }

    #[tokio::test]
    async fn reads_latest_published_verdict() {
        let (c, tx) = controller(SmoothedVerdict::empty(), Arc::new(RecordingActuator::new()));
        let now = Utc::now();
        c.ingest_climate(25.0, 50.0, now).unwrap();
        assert_eq!(
            c.process_moisture(20.0, now).await.unwrap().decision.reason,
            DecisionReason::NoPlant
        );

        tx.send_replace(high());
        assert!(c.evaluate_cycle(now).await.decision.should_irrigate);
    }

    #[tokio::test]
    async fn shutdown_after_trigger_sends_stop() {
        let actuator = Arc::new(RecordingActuator::new());
        let (c, _tx) = controller(high(), actuator.clone());
        let now = Utc::now();
        c.ingest_climate(25.0, 50.0, now).unwrap();
        c.process_moisture(20.0, now).await.unwrap();

        let outcome = c.shutdown(now + chrono::Duration::seconds(1)).await;
        assert_eq!(outcome, Some(ActuationOutcome::accepted()));
        let actions: Vec<_> = actuator.commands().iter().map(|c| c.action).collect();
        assert_eq!(actions, vec![PumpAction::Run, PumpAction::Stop]);
        let last = c.activity().snapshot().pop().unwrap();
        assert_eq!(last.message, "Pump stopped for shutdown");
    }

    #[tokio::test]
    async fn reply_topology_shutdown_does_not_claim_a_stop() {
        let (tx, rx) = watch::channel(high());
        let c = IrrigationController::new(
            IrrigationEngine::new(IrrigationConfig::default()),
            Arc::new(SensorStore::new(chrono::Duration::seconds(10))),
            rx,
            ActuationDispatcher::new(Arc::new(ReplyActuator)),
            Arc::new(ActivityLog::new(50)),
        );
        let now = Utc::now();
        c.ingest_climate(25.0, 50.0, now).unwrap();
        assert!(c.process_moisture(20.0, now).await.unwrap().decision.should_irrigate);

        c.shutdown(now + chrono::Duration::seconds(1)).await;
        let messages: Vec<String> = c.activity().snapshot().into_iter().map(|e| e.message).collect();
        assert!(!messages.iter().any(|m| m == "Pump stopped for shutdown"));
        assert!(messages.last().unwrap().contains("device ends the current spray"));
        drop(tx);
    }

    #[tokio::test]
    async fn status_reports_cooldown_remaining() {
        let (c, _tx) = controller(high(), Arc::new(RecordingActuator::new()));
        let now = Utc::now();
        c.ingest_climate(25.0, 50.0, now).unwrap();
        c.process_moisture(20.0, now).await.unwrap();

        let later = now + chrono::Duration::seconds(10);
        let status = c.status(later);
        assert_eq!(status.cooldown_remaining_seconds, 20.0);
        assert_eq!(status.motor, "STOP");
        assert_eq!(status.severity, Some(Severity::High));
    }
}
