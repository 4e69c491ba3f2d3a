//! Centered region-of-interest extraction.

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::frame::Frame;
use crate::config::VisionConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoiError {
    #[error("frame {width}x{height} is smaller than the {size}x{size} region of interest")]
    InputTooSmall { width: u32, height: u32, size: u32 },
}

/// Placement of the square ROI inside a frame (top-left corner + side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiBounds {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl RoiBounds {
    pub fn right(&self) -> u32 {
        self.x + self.size
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.size
    }
}

/// The cropped, model-sized input for one frame.
#[derive(Debug, Clone)]
pub struct Region {
    pub image: RgbImage,
    /// Where the crop came from in the source frame.
    pub bounds: RoiBounds,
}

/// Crops a fixed square centered on the frame and resizes it for the models.
#[derive(Debug, Clone)]
pub struct RoiExtractor {
    size: u32,
    model_input_size: u32,
}

impl RoiExtractor {
    pub fn new(size: u32, model_input_size: u32) -> Self {
        Self {
            size,
            model_input_size,
        }
    }

    pub fn from_config(config: &VisionConfig) -> Self {
        Self::new(config.roi_size, config.model_input_size)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Centered bounds for a `width` x `height` frame.
    pub fn bounds(&self, width: u32, height: u32) -> Result<RoiBounds, RoiError> {
        if width < self.size || height < self.size {
            return Err(RoiError::InputTooSmall {
                width,
                height,
                size: self.size,
            });
        }
        Ok(RoiBounds {
            x: (width - self.size) / 2,
            y: (height - self.size) / 2,
            size: self.size,
        })
    }

    pub fn extract(&self, frame: &Frame) -> Result<Region, RoiError> {
        let bounds = self.bounds(frame.width(), frame.height())?;
        let crop = imageops::crop_imm(&frame.image, bounds.x, bounds.y, bounds.size, bounds.size)
            .to_image();
        let image = if self.model_input_size == self.size {
            crop
        } else {
            imageops::resize(
                &crop,
                self.model_input_size,
                self.model_input_size,
                FilterType::Triangle,
            )
        };
        Ok(Region { image, bounds })
    }
}
