//! Frame-to-classification staging.
//!
//! A captured [`Frame`] is cropped by the [`RoiExtractor`], resized to the
//! model input, and handed to the [`ClassifierAdapter`], which runs the
//! presence and severity models as a gated two-stage pipeline.

pub mod classifier;
pub mod frame;
pub mod http;
pub mod overlay;
pub mod roi;
pub mod source;

pub use classifier::{ClassifierAdapter, ClassifierError, ImageClassifier};
pub use frame::Frame;
pub use http::HttpClassifier;
pub use overlay::{annotate, encode_jpeg};
pub use roi::{Region, RoiBounds, RoiError, RoiExtractor};
pub use source::{open_source, CaptureError, DirectoryFrameSource, FrameSource, SnapshotFrameSource};
