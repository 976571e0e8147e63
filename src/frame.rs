//! Frames and pixel-level helpers.
//!
//! A `Frame` is an ephemeral color image plus the source's frame index. It is
//! created per processed image or video frame, read during detection, and
//! dropped immediately after — only crops outlive it.

use image::{GrayImage, Rgb, RgbImage};

use crate::detect::region::Rect;

/// Rectangle outline thickness used when annotating detections.
const OUTLINE_THICKNESS: u32 = 2;

/// A single color frame. Never mutated after detection starts.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    /// Source frame index (0-based for stills, the decoder's numbering for
    /// video frames).
    pub index: u64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Single-channel intensity view for the classifier. Color is only
    /// discarded for detection; crops are taken from the color image.
    pub fn to_gray(&self) -> GrayImage {
        let (width, height) = self.image.dimensions();
        let rgb = self.image.as_raw();
        let mut luma = Vec::with_capacity((width * height) as usize);
        for px in rgb.chunks_exact(3) {
            let v = (px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000;
            luma.push(v as u8);
        }
        GrayImage::from_raw(width, height, luma)
            .unwrap_or_else(|| GrayImage::new(width, height))
    }

    /// Extract the color sub-image under `rect`. The rectangle is clamped to
    /// the frame, so a region produced by detection always crops cleanly.
    pub fn crop(&self, rect: &Rect) -> RgbImage {
        let (fw, fh) = self.image.dimensions();
        let x = rect.x.min(fw.saturating_sub(1));
        let y = rect.y.min(fh.saturating_sub(1));
        let w = rect.width.min(fw - x).max(1);
        let h = rect.height.min(fh - y).max(1);
        image::imageops::crop_imm(&self.image, x, y, w, h).to_image()
    }

    /// Downscale so the frame is at most `max_width` wide, preserving aspect.
    /// Frames already narrow enough are returned untouched.
    pub fn shrink_to_width(self, max_width: u32) -> Self {
        if max_width == 0 || self.image.width() <= max_width {
            return self;
        }
        let scale = max_width as f32 / self.image.width() as f32;
        let height = ((self.image.height() as f32 * scale).round() as u32).max(1);
        let image = image::imageops::resize(
            &self.image,
            max_width,
            height,
            image::imageops::FilterType::Triangle,
        );
        Self {
            image,
            index: self.index,
        }
    }
}

/// Draw hollow rectangles around detections, for review output.
pub fn draw_regions(image: &mut RgbImage, regions: &[Rect], color: Rgb<u8>) {
    let (fw, fh) = image.dimensions();
    for rect in regions {
        for t in 0..OUTLINE_THICKNESS {
            let left = rect.x.saturating_add(t);
            let right = rect.right().saturating_sub(t + 1);
            let top = rect.y.saturating_add(t);
            let bottom = rect.bottom().saturating_sub(t + 1);
            for x in rect.x..rect.right().min(fw) {
                if top < fh {
                    image.put_pixel(x, top, color);
                }
                if bottom < fh && bottom > top {
                    image.put_pixel(x, bottom, color);
                }
            }
            for y in rect.y..rect.bottom().min(fh) {
                if left < fw {
                    image.put_pixel(left, y, color);
                }
                if right < fw && right > left {
                    image.put_pixel(right, y, color);
                }
            }
        }
    }
}
