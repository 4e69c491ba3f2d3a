//! Camera frame sources.
//!
//! The physical capture driver is external; these sources cover the two ways
//! a deployment hands frames over: a directory of stills written by a capture
//! process, or a camera that serves JPEG snapshots over HTTP.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::frame::Frame;
use crate::config::{CaptureConfig, CaptureSource};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),

    #[error("no image files found in {0}")]
    NoFrames(PathBuf),

    #[error("camera request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for CaptureError {
    fn from(err: reqwest::Error) -> Self {
        CaptureError::Http(err.to_string())
    }
}

#[async_trait]
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    async fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Open the configured source. Failure here is fatal at startup.
pub async fn open_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    match &config.source {
        CaptureSource::Directory { path } => Ok(Box::new(DirectoryFrameSource::open(path)?)),
        CaptureSource::Snapshot { url } => Ok(Box::new(
            SnapshotFrameSource::connect(url, Duration::from_secs(5)).await?,
        )),
    }
}

/// Cycles through the PNG/JPEG files of a directory in name order.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    files: Vec<PathBuf>,
    cursor: usize,
    next_id: u64,
}

impl DirectoryFrameSource {
    pub fn open(dir: &Path) -> Result<Self, CaptureError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(CaptureError::NoFrames(dir.to_path_buf()));
        }
        files.sort();
        info!(dir = %dir.display(), frames = files.len(), "directory frame source opened");

        Ok(Self {
            files,
            cursor: 0,
            next_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();
        let bytes = tokio::fs::read(path).await?;
        let id = self.next_id;
        self.next_id += 1;
        Frame::decode(id, &bytes, Utc::now())
    }
}

/// Fetches a fresh JPEG from a camera snapshot URL on every call.
pub struct SnapshotFrameSource {
    url: String,
    client: reqwest::Client,
    next_id: u64,
}

impl SnapshotFrameSource {
    /// Connects and grabs one frame to prove the camera is reachable.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("leafguard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        let mut source = Self {
            url: url.to_string(),
            client,
            next_id: 0,
        };
        let first = source.next_frame().await?;
        info!(url = %url, width = first.width(), height = first.height(), "snapshot camera connected");
        Ok(source)
    }
}

#[async_trait]
impl FrameSource for SnapshotFrameSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Http(format!("camera returned {status}")));
        }
        let bytes = response.bytes().await?;
        let id = self.next_id;
        self.next_id += 1;
        Frame::decode(id, &bytes, Utc::now())
    }
}
