//! Irrigation decision state machine.
//!
//! Two phases, `Idle` and `Cooldown`. An Idle evaluation that passes every
//! condition irrigates and starts the cooldown; every evaluation inside the
//! cooldown holds with reason `Cooldown`. Once the interval has elapsed the
//! engine is Idle again. The phase is derived from [`CooldownState`] at
//! evaluation time, and the state lock is held across check-and-transition
//! so concurrent evaluations cannot both trigger.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::IrrigationConfig;
use crate::domain::{DecisionReason, IrrigationDecision, Severity};
use crate::sensors::SensorSnapshot;
use crate::smoother::SmoothedVerdict;

/// Process-wide trigger bookkeeping, mutated only by a decision to irrigate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CooldownState {
    pub last_trigger_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum EnginePhase {
    Idle,
    Cooldown { until: DateTime<Utc> },
}

#[derive(Debug, Default)]
struct EngineInner {
    cooldown: CooldownState,
    manual_requested: bool,
}

#[derive(Debug)]
pub struct IrrigationEngine {
    config: IrrigationConfig,
    inner: Mutex<EngineInner>,
}

impl IrrigationEngine {
    pub fn new(config: IrrigationConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(EngineInner::default()),
        }
    }

    pub fn config(&self) -> &IrrigationConfig {
        &self.config
    }

    /// Run one evaluation cycle.
    pub fn evaluate(
        &self,
        verdict: &SmoothedVerdict,
        sensors: &SensorSnapshot,
        now: DateTime<Utc>,
    ) -> IrrigationDecision {
        let mut inner = self.lock();

        if let EnginePhase::Cooldown { .. } = self.phase_of(&inner.cooldown, now) {
            return IrrigationDecision::hold(DecisionReason::Cooldown);
        }

        let decision = if inner.manual_requested {
            inner.manual_requested = false;
            IrrigationDecision::irrigate(
                self.config.manual_duration(),
                DecisionReason::ManualOverride,
            )
        } else {
            match self.assess(verdict, sensors) {
                Ok(duration) => IrrigationDecision::irrigate(duration, DecisionReason::Triggered),
                Err(reason) => IrrigationDecision::hold(reason),
            }
        };

        if decision.should_irrigate {
            inner.cooldown.last_trigger_at = Some(now);
        }
        decision
    }

    /// Queue a one-shot override for the next Idle evaluation.
    pub fn request_manual_spray(&self) {
        self.lock().manual_requested = true;
    }

    pub fn manual_pending(&self) -> bool {
        self.lock().manual_requested
    }

    pub fn phase(&self, now: DateTime<Utc>) -> EnginePhase {
        self.phase_of(&self.lock().cooldown, now)
    }

    pub fn cooldown_state(&self) -> CooldownState {
        self.lock().cooldown
    }

    /// Spray duration for a severity, `None` for healthy plants.
    pub fn duration_for(&self, severity: Severity) -> Option<f64> {
        self.config.duration_for(severity)
    }

    /// The duration to irrigate for, or the first unmet condition.
    fn assess(
        &self,
        verdict: &SmoothedVerdict,
        sensors: &SensorSnapshot,
    ) -> Result<f64, DecisionReason> {
        let severity = verdict.severity.ok_or(DecisionReason::NoPlant)?;
        let duration = self
            .duration_for(severity)
            .ok_or(DecisionReason::Healthy)?;

        if verdict.stability < self.config.min_stability {
            return Err(DecisionReason::LowStability);
        }

        let climate = sensors.require_all().map_err(|err| {
            tracing::debug!(error = %err, "sensor not fresh");
            DecisionReason::SensorStale
        })?;

        let c = &self.config;
        if climate.moisture < c.moisture_limit
            && climate.humidity < c.humidity_limit
            && climate.temperature < c.temperature_limit
        {
            Ok(duration)
        } else {
            Err(DecisionReason::SensorThresholdNotMet)
        }
    }

    fn phase_of(&self, cooldown: &CooldownState, now: DateTime<Utc>) -> EnginePhase {
        match cooldown.last_trigger_at {
            Some(at) if now - at < self.config.cooldown() => EnginePhase::Cooldown {
                until: at + self.config.cooldown(),
            },
            _ => EnginePhase::Idle,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EnginePhase {
    /// Time left in the cooldown, zero when Idle.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self {
            EnginePhase::Idle => Duration::zero(),
            EnginePhase::Cooldown { until } => (*until - now).max(Duration::zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SensorKind, SensorReading};
    use crate::sensors::SensorRead;

    fn fresh(kind: SensorKind, value: f64, at: DateTime<Utc>) -> SensorRead {
        SensorRead::Fresh(SensorReading {
            kind,
            value,
            received_at: at,
        })
    }

    fn sensors(moisture: f64, temperature: f64, humidity: f64, at: DateTime<Utc>) -> SensorSnapshot {
        SensorSnapshot {
            moisture: fresh(SensorKind::Moisture, moisture, at),
            temperature: fresh(SensorKind::Temperature, temperature, at),
            humidity: fresh(SensorKind::Humidity, humidity, at),
        }
    }

    fn verdict(severity: Option<Severity>, stability: f64) -> SmoothedVerdict {
        SmoothedVerdict {
            severity,
            stability,
            window_size: 20,
            confidence: 0.9,
        }
    }

    fn engine() -> IrrigationEngine {
        IrrigationEngine::new(IrrigationConfig::default())
    }

    #[test]
    fn triggers_and_enters_cooldown() {
        let e = engine();
        let now = Utc::now();
        let d = e.evaluate(
            &verdict(Some(Severity::High), 0.9),
            &sensors(20.0, 25.0, 50.0, now),
            now,
        );
        assert_eq!(d, IrrigationDecision::irrigate(5.0, DecisionReason::Triggered));
        assert_eq!(e.cooldown_state().last_trigger_at, Some(now));
        assert!(matches!(e.phase(now), EnginePhase::Cooldown { .. }));
    }

    #[test]
    fn each_unmet_condition_has_its_reason() {
        let e = engine();
        let now = Utc::now();
        let ok = sensors(20.0, 25.0, 50.0, now);

        let cases = [
            (verdict(None, 1.0), ok, DecisionReason::NoPlant),
            (verdict(Some(Severity::Healthy), 1.0), ok, DecisionReason::Healthy),
            (verdict(Some(Severity::Low), 0.3), ok, DecisionReason::LowStability),
            (
                verdict(Some(Severity::Low), 0.9),
                SensorSnapshot {
                    humidity: SensorRead::Missing,
                    ..ok
                },
                DecisionReason::SensorStale,
            ),
            (
                verdict(Some(Severity::Low), 0.9),
                sensors(20.0, 31.0, 50.0, now),
                DecisionReason::SensorThresholdNotMet,
            ),
            (
                verdict(Some(Severity::Low), 0.9),
                sensors(20.0, 25.0, 70.0, now),
                DecisionReason::SensorThresholdNotMet,
            ),
        ];

        for (v, s, reason) in cases {
            let d = e.evaluate(&v, &s, now);
            assert_eq!(d, IrrigationDecision::hold(reason), "expected {reason}");
        }
        assert_eq!(e.cooldown_state().last_trigger_at, None);
    }

    #[test]
    fn cooldown_expires_back_to_idle() {
        let e = engine();
        let t0 = Utc::now();
        let v = verdict(Some(Severity::Medium), 0.9);

        assert!(e.evaluate(&v, &sensors(20.0, 25.0, 50.0, t0), t0).should_irrigate);

        let t1 = t0 + Duration::seconds(29);
        let d = e.evaluate(&v, &sensors(20.0, 25.0, 50.0, t1), t1);
        assert_eq!(d.reason, DecisionReason::Cooldown);
        assert_eq!(e.phase(t1).remaining(t1), Duration::seconds(1));

        let t2 = t0 + Duration::seconds(30);
        assert_eq!(e.phase(t2), EnginePhase::Idle);
        let d = e.evaluate(&v, &sensors(20.0, 25.0, 50.0, t2), t2);
        assert_eq!(d, IrrigationDecision::irrigate(3.5, DecisionReason::Triggered));
    }

    #[test]
    fn manual_override_bypasses_conditions_once() {
        let e = engine();
        let now = Utc::now();
        let healthy = verdict(Some(Severity::Healthy), 1.0);
        let wet = sensors(80.0, 25.0, 50.0, now);

        e.request_manual_spray();
        assert!(e.manual_pending());
        let d = e.evaluate(&healthy, &wet, now);
        assert_eq!(d, IrrigationDecision::irrigate(3.0, DecisionReason::ManualOverride));
        assert!(!e.manual_pending());

        let later = now + Duration::seconds(31);
        assert_eq!(e.evaluate(&healthy, &wet, later).reason, DecisionReason::Healthy);
    }

    #[test]
    fn manual_override_waits_for_cooldown() {
        let e = engine();
        let t0 = Utc::now();
        let v = verdict(Some(Severity::High), 0.9);
        e.evaluate(&v, &sensors(20.0, 25.0, 50.0, t0), t0);

        e.request_manual_spray();
        let t1 = t0 + Duration::seconds(5);
        assert_eq!(
            e.evaluate(&v, &sensors(20.0, 25.0, 50.0, t1), t1).reason,
            DecisionReason::Cooldown
        );
        assert!(e.manual_pending());

        let t2 = t0 + Duration::seconds(30);
        assert_eq!(
            e.evaluate(&v, &sensors(20.0, 25.0, 50.0, t2), t2).reason,
            DecisionReason::ManualOverride
        );
    }

    #[test]
    fn concurrent_evaluations_trigger_once() {
        let e = std::sync::Arc::new(engine());
        let now = Utc::now();
        let v = verdict(Some(Severity::High), 0.9);
        let s = sensors(20.0, 25.0, 50.0, now);

        let decisions: Vec<IrrigationDecision> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let e = &e;
                    scope.spawn(move || e.evaluate(&v, &s, now))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let triggered = decisions.iter().filter(|d| d.should_irrigate).count();
        assert_eq!(triggered, 1);
        assert!(decisions
            .iter()
            .filter(|d| !d.should_irrigate)
            .all(|d| d.reason == DecisionReason::Cooldown));
    }

    #[test]
    fn duration_mapping_is_monotonic_and_bounded() {
        let e = engine();
        let durations: Vec<f64> = [Severity::Low, Severity::Medium, Severity::High]
            .into_iter()
            .filter_map(|s| e.duration_for(s))
            .collect();
        assert_eq!(durations, vec![2.0, 3.5, 5.0]);
        assert!(durations.windows(2).all(|w| w[0] <= w[1]));
        assert!(durations.iter().all(|d| (2.0..=5.0).contains(d)));
    }
}
