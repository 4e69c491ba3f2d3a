//! Captured frames.

use chrono::{DateTime, Utc};
use image::RgbImage;

use super::source::CaptureError;

/// One captured camera frame, owned by the processing task for one cycle.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic capture counter.
    pub id: u64,
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(id: u64, image: RgbImage, captured_at: DateTime<Utc>) -> Self {
        Self {
            id,
            image,
            captured_at,
        }
    }

    /// Decode an encoded still (JPEG, PNG) into a frame.
    pub fn decode(id: u64, bytes: &[u8], captured_at: DateTime<Utc>) -> Result<Self, CaptureError> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self::new(id, image, captured_at))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
