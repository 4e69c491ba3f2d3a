//! Gated two-stage classification over black-box image models.
//!
//! The presence model decides whether a plant is in view. The severity
//! model is only consulted when the presence model is confident enough; a
//! rejected frame never reaches it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;
use tracing::info;

use super::roi::Region;
use crate::config::VisionConfig;
use crate::domain::{ClassificationResult, PlantLabel, Severity};
use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    #[error("model '{model}' invocation failed: {reason}")]
    Invocation { model: String, reason: String },

    #[error("model '{model}' returned malformed scores: {reason}")]
    MalformedOutput { model: String, reason: String },

    #[error("unknown severity label: {0}")]
    UnknownLabel(String),
}

/// A black-box image model returning one score per output class.
///
/// No model runtime is assumed; implementations may call a local engine, a
/// model server, or return scripted values in tests.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    async fn predict(&self, input: &RgbImage) -> Result<Vec<f64>, ClassifierError>;

    /// Verify the model is reachable. Called once at startup.
    async fn probe(&self) -> Result<(), ClassifierError> {
        Ok(())
    }
}

pub struct ClassifierAdapter {
    presence: Arc<dyn ImageClassifier>,
    severity: Arc<dyn ImageClassifier>,
    presence_threshold: f64,
    /// Severity for each output index of the severity model.
    severity_labels: Vec<Severity>,
}

impl ClassifierAdapter {
    pub fn new(
        presence: Arc<dyn ImageClassifier>,
        severity: Arc<dyn ImageClassifier>,
        config: &VisionConfig,
    ) -> Result<Self, ClassifierError> {
        let severity_labels = config
            .severity_labels
            .iter()
            .map(|label| {
                label
                    .parse::<Severity>()
                    .map_err(|_| ClassifierError::UnknownLabel(label.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            presence,
            severity,
            presence_threshold: config.presence_threshold,
            severity_labels,
        })
    }

    /// Probe both models; used to fail startup early.
    pub async fn probe(&self) -> Result<(), ClassifierError> {
        self.presence.probe().await?;
        self.severity.probe().await
    }

    /// Build the adapter and probe both models before the first frame.
    pub async fn connect(
        presence: Arc<dyn ImageClassifier>,
        severity: Arc<dyn ImageClassifier>,
        config: &VisionConfig,
    ) -> crate::domain::Result<Self> {
        let adapter = Self::new(presence, severity, config)?;
        adapter.probe().await?;
        info!(
            presence = adapter.presence.name(),
            severity = adapter.severity.name(),
            labels = ?adapter.severity_labels,
            "classifier models ready"
        );
        Ok(adapter)
    }

    /// Plant / non-plant with the confidence of that label.
    ///
    /// Accepts either a single plant probability or a two-class
    /// `[non_plant, plant]` distribution.
    pub async fn classify_presence(
        &self,
        region: &Region,
    ) -> Result<(PlantLabel, f64), ClassifierError> {
        let scores = self.presence.predict(&region.image).await?;
        let malformed = |reason: String| ClassifierError::MalformedOutput {
            model: self.presence.name().to_string(),
            reason,
        };

        let plant_probability = match scores.as_slice() {
            [p] | [_, p] => *p,
            other => return Err(malformed(format!("expected 1 or 2 scores, got {}", other.len()))),
        };
        if !plant_probability.is_finite() {
            return Err(malformed(format!("non-finite score {plant_probability}")));
        }
        let p = plant_probability.clamp(0.0, 1.0);

        if p >= 0.5 {
            Ok((PlantLabel::Plant, p))
        } else {
            Ok((PlantLabel::NonPlant, 1.0 - p))
        }
    }

    /// Arg-max severity with its score.
    pub async fn classify_severity(
        &self,
        region: &Region,
    ) -> Result<(Severity, f64), ClassifierError> {
        let scores = self.severity.predict(&region.image).await?;
        let malformed = |reason: String| ClassifierError::MalformedOutput {
            model: self.severity.name().to_string(),
            reason,
        };

        if scores.len() != self.severity_labels.len() {
            return Err(malformed(format!(
                "expected {} scores, got {}",
                self.severity_labels.len(),
                scores.len()
            )));
        }
        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(malformed(format!("non-finite score {bad}")));
        }

        let (index, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, s)| {
                if s > best.1 {
                    (i, s)
                } else {
                    best
                }
            });
        Ok((self.severity_labels[index], confidence.clamp(0.0, 1.0)))
    }

    /// Run the gated pipeline. Model failures degrade to a zero-confidence
    /// `NonPlant` result and are reported, never returned.
    pub async fn classify(&self, region: &Region, at: DateTime<Utc>) -> ClassificationResult {
        match self.try_classify(region, at).await {
            Ok(result) => result,
            Err(err) => {
                METRICS.inc_classifier_failures();
                obs::emit_classifier_failed(&err);
                ClassificationResult::degraded(at)
            }
        }
    }

    async fn try_classify(
        &self,
        region: &Region,
        at: DateTime<Utc>,
    ) -> Result<ClassificationResult, ClassifierError> {
        let (label, presence) = self.classify_presence(region).await?;
        if label == PlantLabel::NonPlant {
            return Ok(ClassificationResult::non_plant(presence, at));
        }
        if presence < self.presence_threshold {
            // A plant may be in view but not confidently enough to grade.
            return Ok(ClassificationResult::plant(None, presence, at));
        }

        let (severity, confidence) = self.classify_severity(region).await?;
        Ok(ClassificationResult::plant(Some(severity), confidence, at))
    }
}
