//! Domain models for LeafGuard.
//!
//! Canonical definitions for the core entities:
//! - `ClassificationResult`: one model verdict for one frame
//! - `SensorReading`: latest value of a soil or climate sensor
//! - `IrrigationDecision`: outcome of one evaluation cycle
//! - `PumpCommand`: what gets sent to the remote actuator

pub mod classification;
pub mod decision;
pub mod error;
pub mod sensor;

// Re-export main types and errors
pub use classification::{ClassificationResult, ParseSeverityError, PlantLabel, Severity};
pub use decision::{ActuationOutcome, DecisionReason, IrrigationDecision, PumpAction, PumpCommand};
pub use error::{LeafguardError, Result};
pub use sensor::{SensorKind, SensorReading};
