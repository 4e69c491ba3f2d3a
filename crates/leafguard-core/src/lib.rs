//! LeafGuard Core Library
//!
//! Vision staging, temporal smoothing, sensor fusion and the irrigation
//! decision engine behind the `leafguardd` daemon.

pub mod activity;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod sensors;
pub mod smoother;
pub mod telemetry;
pub mod vision;

pub use activity::{ActivityEntry, ActivityLevel, ActivityLog};

pub use config::{
    ActivityConfig, ActuationConfig, ActuationMode, CaptureConfig, CaptureSource,
    ClassifierConfig, ConfigError, IrrigationConfig, LeafguardConfig, SensorConfig,
    ServerConfig, SmoothingConfig, SprayDurations, VisionConfig,
};

pub use controller::{CycleReport, IrrigationController, StatusReport};

pub use dispatch::{
    actuator_from_config, ActuationDispatcher, ActuationError, Actuator, HttpActuator,
    ReplyActuator,
};

pub use domain::{
    ActuationOutcome, ClassificationResult, DecisionReason, IrrigationDecision, LeafguardError,
    PlantLabel, PumpAction, PumpCommand, Result, SensorKind, SensorReading, Severity,
};

pub use engine::{CooldownState, EnginePhase, IrrigationEngine};

pub use metrics::{Metrics, MetricsSnapshot, METRICS};

pub use pipeline::{FramePipeline, Preview, PreviewFeed};

pub use sensors::{Climate, SensorError, SensorRead, SensorSnapshot, SensorStore};

pub use smoother::{SmoothedVerdict, TemporalSmoother};

pub use telemetry::init_tracing;

pub use vision::{
    ClassifierAdapter, ClassifierError, Frame, FrameSource, HttpClassifier, ImageClassifier,
    RoiExtractor,
};

/// Crate version, reported by `/status` and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
