//! Annotated preview frames for the video feed.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageResult, Rgb, RgbImage};

use super::frame::Frame;
use super::roi::RoiBounds;
use crate::smoother::SmoothedVerdict;

const BRACKET_LEN: u32 = 40;
const THICKNESS: u32 = 3;
const CROSS: u32 = 15;
const BAR_HEIGHT: u32 = 6;
const BAR_GAP: u32 = 10;

const GREEN: Rgb<u8> = Rgb([0, 245, 160]);
const RED: Rgb<u8> = Rgb([230, 40, 40]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GRAY: Rgb<u8> = Rgb([100, 100, 100]);

/// Draw the ROI corner brackets, a center crosshair and a stability bar.
///
/// Brackets are green while a plant verdict is held and red otherwise; the
/// bar under the box fills in proportion to the verdict's stability.
pub fn annotate(frame: &Frame, bounds: RoiBounds, verdict: &SmoothedVerdict) -> RgbImage {
    let mut img = frame.image.clone();
    let color = if verdict.severity.is_some() { GREEN } else { RED };

    let (x1, y1, x2, y2) = (bounds.x, bounds.y, bounds.right(), bounds.bottom());
    let len = BRACKET_LEN.min(bounds.size / 2);

    // top-left, top-right, bottom-left, bottom-right
    fill(&mut img, x1, y1, len, THICKNESS, color);
    fill(&mut img, x1, y1, THICKNESS, len, color);
    fill(&mut img, x2.saturating_sub(len), y1, len, THICKNESS, color);
    fill(&mut img, x2.saturating_sub(THICKNESS), y1, THICKNESS, len, color);
    fill(&mut img, x1, y2.saturating_sub(THICKNESS), len, THICKNESS, color);
    fill(&mut img, x1, y2.saturating_sub(len), THICKNESS, len, color);
    fill(&mut img, x2.saturating_sub(len), y2.saturating_sub(THICKNESS), len, THICKNESS, color);
    fill(&mut img, x2.saturating_sub(THICKNESS), y2.saturating_sub(len), THICKNESS, len, color);

    let (cx, cy) = (x1 + bounds.size / 2, y1 + bounds.size / 2);
    fill(&mut img, cx.saturating_sub(CROSS), cy.saturating_sub(1), CROSS * 2, 2, WHITE);
    fill(&mut img, cx.saturating_sub(1), cy.saturating_sub(CROSS), 2, CROSS * 2, WHITE);

    let bar_y = y2 + BAR_GAP;
    let filled = (f64::from(bounds.size) * verdict.stability.clamp(0.0, 1.0)).round() as u32;
    fill(&mut img, x1, bar_y, bounds.size, BAR_HEIGHT, GRAY);
    fill(&mut img, x1, bar_y, filled, BAR_HEIGHT, color);

    img
}

/// Paint a rectangle, clipped to the image.
fn fill(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = x.saturating_add(w).min(img.width());
    let y_end = y.saturating_add(h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use chrono::Utc;

    fn verdict(severity: Option<Severity>, stability: f64) -> SmoothedVerdict {
        SmoothedVerdict {
            severity,
            stability,
            window_size: 20,
            confidence: 0.9,
        }
    }

    #[test]
    fn brackets_follow_verdict_color() {
        let frame = Frame::new(1, RgbImage::new(400, 400), Utc::now());
        let bounds = RoiBounds { x: 50, y: 50, size: 300 };

        let img = annotate(&frame, bounds, &verdict(Some(Severity::Low), 1.0));
        assert_eq!(img.get_pixel(50, 50), &GREEN);

        let img = annotate(&frame, bounds, &verdict(None, 0.0));
        assert_eq!(img.get_pixel(50, 50), &RED);
    }

    #[test]
    fn stability_bar_is_clipped_to_frame() {
        // Bar would land below a frame that exactly fits the ROI.
        let frame = Frame::new(1, RgbImage::new(300, 300), Utc::now());
        let bounds = RoiBounds { x: 0, y: 0, size: 300 };
        let img = annotate(&frame, bounds, &verdict(Some(Severity::High), 0.5));
        assert_eq!(img.dimensions(), (300, 300));
    }

    #[test]
    fn jpeg_has_soi_marker() {
        let bytes = encode_jpeg(&RgbImage::new(16, 16), 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
