//! Structured observability hooks for the frame and decision loops.
//!
//! Every emitter logs an `event = "..."` field so log pipelines can filter
//! on it. Per-frame work runs inside [`frame_span`].

use tracing::{info, warn};

use crate::dispatch::ActuationError;
use crate::domain::{IrrigationDecision, PumpCommand, SensorReading};
use crate::smoother::SmoothedVerdict;
use crate::vision::ClassifierError;

/// Span covering the processing of one frame. Attach with
/// `tracing::Instrument` rather than entering it across awaits.
pub fn frame_span(frame_id: u64) -> tracing::Span {
    tracing::info_span!("leafguard.frame", frame_id = frame_id)
}

pub fn emit_classifier_failed(error: &ClassifierError) {
    warn!(event = "classifier.failed", error = %error);
}

pub fn emit_frame_skipped(frame_id: u64, reason: &dyn std::fmt::Display) {
    warn!(event = "frame.skipped", frame_id = frame_id, reason = %reason);
}

pub fn emit_verdict_changed(previous: &SmoothedVerdict, current: &SmoothedVerdict) {
    info!(
        event = "verdict.changed",
        from = ?previous.severity,
        to = ?current.severity,
        stability = current.stability,
    );
}

pub fn emit_decision_evaluated(decision: &IrrigationDecision, verdict: &SmoothedVerdict) {
    tracing::debug!(
        event = "decision.evaluated",
        reason = %decision.reason,
        should_irrigate = decision.should_irrigate,
        severity = ?verdict.severity,
        stability = verdict.stability,
    );
}

pub fn emit_irrigation_triggered(decision: &IrrigationDecision, command: &PumpCommand) {
    info!(
        event = "irrigation.triggered",
        reason = %decision.reason,
        duration_seconds = decision.duration_seconds,
        command_id = %command.id,
    );
}

pub fn emit_dispatch_failed(command: &PumpCommand, error: &ActuationError) {
    warn!(
        event = "pump.dispatch_failed",
        command_id = %command.id,
        action = ?command.action,
        error = %error,
    );
}

pub fn emit_sensor_ingested(reading: &SensorReading) {
    tracing::debug!(
        event = "sensor.ingested",
        kind = %reading.kind,
        value = reading.value,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_span_is_constructible_without_subscriber() {
        let span = frame_span(7);
        let _guard = span.enter();
    }
}
