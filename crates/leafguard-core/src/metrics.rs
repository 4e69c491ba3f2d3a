//! Global atomic counters for the frame and decision loops.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (on shutdown, or from a periodic tick).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    classifier_failures: AtomicU64,
    evaluations: AtomicU64,
    irrigations_triggered: AtomicU64,
    dispatch_failures: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub classifier_failures: u64,
    pub evaluations: u64,
    pub irrigations_triggered: u64,
    pub dispatch_failures: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            classifier_failures: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            irrigations_triggered: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_frames_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "frames_processed", "counter incremented");
    }

    /// A frame that never reached the classifier (decode or ROI failure).
    pub fn inc_frames_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "frames_skipped", "counter incremented");
    }

    pub fn inc_classifier_failures(&self) {
        self.classifier_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "classifier_failures", "counter incremented");
    }

    pub fn inc_evaluations(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations", "counter incremented");
    }

    pub fn inc_irrigations(&self) {
        self.irrigations_triggered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "irrigations_triggered", "counter incremented");
    }

    pub fn inc_dispatch_failures(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "dispatch_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            frames_processed = s.frames_processed,
            frames_skipped = s.frames_skipped,
            classifier_failures = s.classifier_failures,
            evaluations = s.evaluations,
            irrigations_triggered = s.irrigations_triggered,
            dispatch_failures = s.dispatch_failures,
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_processed: self.frames_processed(),
            frames_skipped: self.frames_skipped(),
            classifier_failures: self.classifier_failures(),
            evaluations: self.evaluations(),
            irrigations_triggered: self.irrigations_triggered(),
            dispatch_failures: self.dispatch_failures(),
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    pub fn classifier_failures(&self) -> u64 {
        self.classifier_failures.load(Ordering::Relaxed)
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn irrigations_triggered(&self) -> u64 {
        self.irrigations_triggered.load(Ordering::Relaxed)
    }

    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.frames_processed.store(0, Ordering::Relaxed);
        self.frames_skipped.store(0, Ordering::Relaxed);
        self.classifier_failures.store(0, Ordering::Relaxed);
        self.evaluations.store(0, Ordering::Relaxed);
        self.irrigations_triggered.store(0, Ordering::Relaxed);
        self.dispatch_failures.store(0, Ordering::Relaxed);
    }
}
