//! In-memory fakes for the capability traits (testing only)
//!
//! `ScriptedClassifier`, `RecordingActuator` and `VecFrameSource` satisfy the
//! trait contracts without a model server, a pump or a camera.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;

use crate::dispatch::{ActuationError, Actuator};
use crate::domain::PumpCommand;
use crate::vision::{CaptureError, ClassifierError, Frame, FrameSource, ImageClassifier};

// ---------------------------------------------------------------------------
// ScriptedClassifier
// ---------------------------------------------------------------------------

/// Replays queued outputs, then repeats the fallback forever.
#[derive(Debug)]
pub struct ScriptedClassifier {
    name: String,
    script: Mutex<VecDeque<Result<Vec<f64>, ClassifierError>>>,
    fallback: Result<Vec<f64>, ClassifierError>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn constant(name: &str, scores: Vec<f64>) -> Self {
        Self::new(name, Ok(scores))
    }

    pub fn failing(name: &str) -> Self {
        Self::new(
            name,
            Err(ClassifierError::Invocation {
                model: name.to_string(),
                reason: "scripted failure".into(),
            }),
        )
    }

    fn new(name: &str, fallback: Result<Vec<f64>, ClassifierError>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue outputs returned before the fallback.
    pub fn then(self, scores: Vec<f64>) -> Self {
        self.script.lock().unwrap().push_back(Ok(scores));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageClassifier for ScriptedClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, _input: &RgbImage) -> Result<Vec<f64>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn probe(&self) -> Result<(), ClassifierError> {
        self.fallback.as_ref().map(|_| ()).map_err(Clone::clone)
    }
}

// ---------------------------------------------------------------------------
// RecordingActuator
// ---------------------------------------------------------------------------

/// Records every command it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    commands: Mutex<Vec<PumpCommand>>,
    fail: bool,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records commands but reports every send as a transport failure.
    pub fn failing() -> Self {
        Self {
            commands: Mutex::default(),
            fail: true,
        }
    }

    pub fn commands(&self) -> Vec<PumpCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn send(&self, command: &PumpCommand) -> Result<(), ActuationError> {
        self.commands.lock().unwrap().push(command.clone());
        if self.fail {
            Err(ActuationError::Transport("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// VecFrameSource
// ---------------------------------------------------------------------------

/// Yields the given images once each, then reports `NoFrames`, unless
/// built with [`VecFrameSource::cycle`].
#[derive(Debug, Default)]
pub struct VecFrameSource {
    images: VecDeque<RgbImage>,
    next_id: u64,
    cycle: bool,
}

impl VecFrameSource {
    pub fn new(images: impl IntoIterator<Item = RgbImage>) -> Self {
        Self {
            images: images.into_iter().collect(),
            next_id: 0,
            cycle: false,
        }
    }

    /// Repeat the images forever.
    pub fn cycle(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// `count` blank frames of the given size.
    pub fn blank(count: usize, width: u32, height: u32) -> Self {
        Self::new((0..count).map(|_| RgbImage::new(width, height)))
    }
}

#[async_trait]
impl FrameSource for VecFrameSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let image = self
            .images
            .pop_front()
            .ok_or_else(|| CaptureError::NoFrames("<memory>".into()))?;
        if self.cycle {
            self.images.push_back(image.clone());
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(Frame::new(id, image, Utc::now()))
    }
}
