//! Crate-level error taxonomy for LeafGuard.
//!
//! Each component owns a narrower error type; runtime errors are recovered
//! at the component boundary and only reach this enum on startup paths.

use crate::config::ConfigError;
use crate::dispatch::ActuationError;
use crate::sensors::SensorError;
use crate::vision::{CaptureError, ClassifierError, RoiError};

#[derive(Debug, thiserror::Error)]
pub enum LeafguardError {
    #[error("region of interest: {0}")]
    Roi(#[from] RoiError),

    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("camera: {0}")]
    Capture(#[from] CaptureError),

    #[error("sensor: {0}")]
    Sensor(#[from] SensorError),

    #[error("actuation: {0}")]
    Actuation(#[from] ActuationError),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for LeafGuard operations.
pub type Result<T> = std::result::Result<T, LeafguardError>;
