//! Frame-processing task.
//!
//! Owns the ROI extractor, the classifier adapter and the smoother. Each
//! verdict is published through a `watch` channel; readers only ever see a
//! complete snapshot. The annotated preview for `/video_feed` is published
//! the same way.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Instrument};

use crate::activity::ActivityLog;
use crate::config::LeafguardConfig;
use crate::domain::ClassificationResult;
use crate::metrics::METRICS;
use crate::obs;
use crate::smoother::{SmoothedVerdict, TemporalSmoother};
use crate::vision::{annotate, encode_jpeg, ClassifierAdapter, Frame, FrameSource, RoiExtractor};

/// Latest encoded preview frame, shared without copying.
pub type Preview = Option<Arc<Vec<u8>>>;

/// Hands out preview receivers without holding one itself, so frames are
/// only encoded while someone is watching.
#[derive(Clone)]
pub struct PreviewFeed(Arc<watch::Sender<Preview>>);

impl PreviewFeed {
    pub fn subscribe(&self) -> watch::Receiver<Preview> {
        self.0.subscribe()
    }

    pub fn watchers(&self) -> usize {
        self.0.receiver_count()
    }
}

pub struct FramePipeline {
    roi: RoiExtractor,
    classifier: ClassifierAdapter,
    smoother: TemporalSmoother,
    jpeg_quality: u8,
    activity: Arc<ActivityLog>,
    verdict_tx: watch::Sender<SmoothedVerdict>,
    preview_tx: Arc<watch::Sender<Preview>>,
}

impl FramePipeline {
    pub fn new(
        roi: RoiExtractor,
        classifier: ClassifierAdapter,
        smoother: TemporalSmoother,
        jpeg_quality: u8,
        activity: Arc<ActivityLog>,
    ) -> Self {
        let (verdict_tx, _) = watch::channel(SmoothedVerdict::empty());
        let (preview_tx, _) = watch::channel(None);
        Self {
            roi,
            classifier,
            smoother,
            jpeg_quality,
            activity,
            verdict_tx,
            preview_tx: Arc::new(preview_tx),
        }
    }

    pub fn from_config(
        config: &LeafguardConfig,
        classifier: ClassifierAdapter,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self::new(
            RoiExtractor::from_config(&config.vision),
            classifier,
            TemporalSmoother::from_config(&config.smoothing, &config.vision),
            config.capture.jpeg_quality,
            activity,
        )
    }

    pub fn subscribe_verdict(&self) -> watch::Receiver<SmoothedVerdict> {
        self.verdict_tx.subscribe()
    }

    pub fn subscribe_preview(&self) -> watch::Receiver<Preview> {
        self.preview_tx.subscribe()
    }

    pub fn preview_feed(&self) -> PreviewFeed {
        PreviewFeed(self.preview_tx.clone())
    }

    pub fn verdict(&self) -> SmoothedVerdict {
        *self.verdict_tx.borrow()
    }

    /// Run one frame through ROI, classification and smoothing.
    ///
    /// Returns the raw classification, or `None` when the frame was skipped.
    pub async fn process_frame(&mut self, frame: &Frame) -> Option<ClassificationResult> {
        let span = obs::frame_span(frame.id);
        self.process_inner(frame).instrument(span).await
    }

    async fn process_inner(&mut self, frame: &Frame) -> Option<ClassificationResult> {
        let region = match self.roi.extract(frame) {
            Ok(region) => region,
            Err(err) => {
                METRICS.inc_frames_skipped();
                obs::emit_frame_skipped(frame.id, &err);
                self.publish_preview(&frame.image);
                return None;
            }
        };

        let result = self.classifier.classify(&region, frame.captured_at).await;
        let previous = self.verdict();
        let verdict = self.smoother.push(result.clone());
        METRICS.inc_frames_processed();

        if verdict.severity != previous.severity {
            obs::emit_verdict_changed(&previous, &verdict);
            match verdict.severity {
                Some(severity) => self
                    .activity
                    .info(format!("Plant detected: {severity} severity")),
                None if previous.severity.is_some() => self.activity.info("No plant in view"),
                None => {}
            }
        }
        self.verdict_tx.send_replace(verdict);

        let annotated = annotate(frame, region.bounds, &verdict);
        self.publish_preview(&annotated);
        Some(result)
    }

    fn publish_preview(&self, image: &image::RgbImage) {
        if self.preview_tx.receiver_count() == 0 {
            return;
        }
        match encode_jpeg(image, self.jpeg_quality) {
            Ok(bytes) => {
                self.preview_tx.send_replace(Some(Arc::new(bytes)));
            }
            Err(err) => warn!(event = "preview.encode_failed", error = %err),
        }
    }

    /// Pull frames at `fps` until `shutdown` flips to `true` or its sender
    /// is dropped. Ticks missed while a frame is in flight are skipped.
    pub async fn run(
        mut self,
        mut source: Box<dyn FrameSource>,
        fps: u32,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(fps = fps, "frame loop started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match source.next_frame().await {
                Ok(frame) => {
                    self.process_frame(&frame).await;
                }
                Err(err) => {
                    METRICS.inc_frames_skipped();
                    warn!(event = "frame.capture_failed", error = %err);
                }
            }
        }

        info!(
            frames = METRICS.frames_processed(),
            "frame loop stopped"
        );
    }
}
