//! End-to-end irrigation decisions over the sensor store and engine.

use chrono::{DateTime, Duration, Utc};
use leafguard_core::{
    DecisionReason, IrrigationConfig, IrrigationDecision, IrrigationEngine, SensorKind,
    SensorStore, Severity, SmoothedVerdict,
};

fn verdict(severity: Severity, stability: f64) -> SmoothedVerdict {
    SmoothedVerdict {
        severity: Some(severity),
        stability,
        window_size: 20,
        confidence: 0.9,
    }
}

fn store_with(moisture: f64, temperature: f64, humidity: f64, at: DateTime<Utc>) -> SensorStore {
    let store = SensorStore::new(Duration::seconds(10));
    store.ingest(SensorKind::Moisture, moisture, at).unwrap();
    store.ingest(SensorKind::Temperature, temperature, at).unwrap();
    store.ingest(SensorKind::Humidity, humidity, at).unwrap();
    store
}

#[test]
fn high_severity_dry_soil_triggers_max_duration() {
    let now = Utc::now();
    let engine = IrrigationEngine::new(IrrigationConfig::default());
    let store = store_with(20.0, 25.0, 50.0, now);

    let d = engine.evaluate(&verdict(Severity::High, 0.9), &store.snapshot(now), now);
    assert_eq!(d, IrrigationDecision::irrigate(5.0, DecisionReason::Triggered));
    assert_eq!(d.motor_command(), "RUN");
}

#[test]
fn wet_soil_holds() {
    let now = Utc::now();
    let engine = IrrigationEngine::new(IrrigationConfig::default());
    let store = store_with(50.0, 25.0, 50.0, now);

    let d = engine.evaluate(&verdict(Severity::Medium, 0.9), &store.snapshot(now), now);
    assert!(!d.should_irrigate);
    assert_eq!(d.reason, DecisionReason::SensorThresholdNotMet);
    assert_eq!(d.motor_command(), "STOP");
}

#[test]
fn healthy_plant_holds_regardless_of_sensors() {
    let now = Utc::now();
    let engine = IrrigationEngine::new(IrrigationConfig::default());
    let empty = SensorStore::new(Duration::seconds(10));

    for snapshot in [store_with(5.0, 25.0, 30.0, now).snapshot(now), empty.snapshot(now)] {
        let d = engine.evaluate(&verdict(Severity::Healthy, 1.0), &snapshot, now);
        assert_eq!(d, IrrigationDecision::hold(DecisionReason::Healthy));
    }
}

#[test]
fn second_trigger_inside_cooldown_holds() {
    let t0 = Utc::now();
    let engine = IrrigationEngine::new(IrrigationConfig::default());
    let v = verdict(Severity::High, 0.9);

    let first = engine.evaluate(&v, &store_with(20.0, 25.0, 50.0, t0).snapshot(t0), t0);
    assert!(first.should_irrigate);

    let t1 = t0 + Duration::seconds(5);
    let second = engine.evaluate(&v, &store_with(20.0, 25.0, 50.0, t1).snapshot(t1), t1);
    assert_eq!(second, IrrigationDecision::hold(DecisionReason::Cooldown));
}

#[test]
fn reading_older_than_bound_is_stale() {
    let t0 = Utc::now();
    let engine = IrrigationEngine::new(IrrigationConfig::default());
    let store = store_with(20.0, 25.0, 50.0, t0);

    let now = t0 + Duration::seconds(15);
    let d = engine.evaluate(&verdict(Severity::High, 0.9), &store.snapshot(now), now);
    assert_eq!(d, IrrigationDecision::hold(DecisionReason::SensorStale));
}

#[test]
fn never_triggers_twice_within_cooldown() {
    let config = IrrigationConfig::default();
    let cooldown = config.cooldown();
    let engine = IrrigationEngine::new(config);
    let v = verdict(Severity::Low, 1.0);
    let t0 = Utc::now();

    let mut triggers = Vec::new();
    for step in 0..240 {
        let now = t0 + Duration::milliseconds(step * 500);
        let store = store_with(10.0, 20.0, 40.0, now);
        if engine.evaluate(&v, &store.snapshot(now), now).should_irrigate {
            triggers.push(now);
        }
    }

    assert_eq!(triggers.len(), 4, "120 s of continuous demand with a 30 s cooldown");
    for pair in triggers.windows(2) {
        assert!(pair[1] - pair[0] >= cooldown);
    }
}

#[test]
fn threshold_boundaries_are_exclusive() {
    let now = Utc::now();
    let config = IrrigationConfig::default();
    let limit = config.moisture_limit;
    let engine = IrrigationEngine::new(config);

    let at_limit = store_with(limit, 25.0, 50.0, now);
    let d = engine.evaluate(&verdict(Severity::Low, 0.9), &at_limit.snapshot(now), now);
    assert_eq!(d.reason, DecisionReason::SensorThresholdNotMet);
}
