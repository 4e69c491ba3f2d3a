//! Temporal smoothing of per-frame classifications.
//!
//! Raw severity flickers with illumination, motion and model jitter. The
//! smoother keeps a fixed-capacity FIFO window of recent results and derives
//! a [`SmoothedVerdict`] from the window contents alone, so re-deriving from
//! the same window always yields the same verdict.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::{SmoothingConfig, VisionConfig};
use crate::domain::{ClassificationResult, Severity};

/// Stabilized view of the recent classifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SmoothedVerdict {
    /// `None` when no result in the window carries a usable severity.
    pub severity: Option<Severity>,

    /// Fraction of the window capacity whose raw result agrees with
    /// `severity`. Reaches 1.0 only once the full window agrees.
    pub stability: f64,

    /// Number of results the verdict was derived from.
    pub window_size: usize,

    /// Exponentially smoothed per-frame confidence, for display.
    pub confidence: f64,
}

impl SmoothedVerdict {
    pub fn empty() -> Self {
        Self {
            severity: None,
            stability: 0.0,
            window_size: 0,
            confidence: 0.0,
        }
    }
}

impl Default for SmoothedVerdict {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    capacity: usize,
    alpha: f64,
    min_severity_confidence: f64,
    window: VecDeque<ClassificationResult>,
}

impl TemporalSmoother {
    /// `capacity` is raised to at least 1.
    pub fn new(capacity: usize, alpha: f64, min_severity_confidence: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            alpha,
            min_severity_confidence,
            window: VecDeque::with_capacity(capacity),
        }
    }

    pub fn from_config(smoothing: &SmoothingConfig, vision: &VisionConfig) -> Self {
        Self::new(
            smoothing.window_size,
            smoothing.alpha,
            vision.min_severity_confidence,
        )
    }

    /// Append a result, evicting the oldest when full, and re-derive.
    pub fn push(&mut self, result: ClassificationResult) -> SmoothedVerdict {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(result);
        self.verdict()
    }

    pub fn verdict(&self) -> SmoothedVerdict {
        if self.window.is_empty() {
            return SmoothedVerdict::empty();
        }

        let mut severity_ema: Option<f64> = None;
        let mut confidence_ema: Option<f64> = None;
        for result in &self.window {
            confidence_ema = Some(self.step(confidence_ema, result.confidence));
            if let Some(severity) = self.usable_severity(result) {
                severity_ema = Some(self.step(severity_ema, f64::from(severity.ordinal())));
            }
        }

        let severity = severity_ema.map(Severity::nearest);
        let agreeing = self
            .window
            .iter()
            .filter(|r| self.usable_severity(r) == severity)
            .count();

        SmoothedVerdict {
            severity,
            stability: agreeing as f64 / self.capacity as f64,
            window_size: self.window.len(),
            confidence: confidence_ema.unwrap_or(0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window contents, oldest first.
    pub fn window(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.window.iter()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// `ema_0` is the first value; afterwards `alpha * v + (1 - alpha) * ema`.
    fn step(&self, ema: Option<f64>, value: f64) -> f64 {
        match ema {
            None => value,
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
        }
    }

    /// Severity that may move the estimate; low-confidence grades don't.
    fn usable_severity(&self, result: &ClassificationResult) -> Option<Severity> {
        result
            .severity
            .filter(|_| result.confidence >= self.min_severity_confidence)
    }
}
