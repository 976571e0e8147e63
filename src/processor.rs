//! Single-frame processing: detect, then crop.

use image::RgbImage;

use crate::detect::detector::{DetectionParams, Detector};
use crate::detect::region::DetectionRegion;
use crate::error::Result;
use crate::frame::Frame;

/// A plate crop that has not been committed to the result store yet. It has
/// no identifier — identifiers are assigned by the store at insertion.
#[derive(Clone, Debug)]
pub struct PlateCandidate {
    pub region: DetectionRegion,
    pub image: RgbImage,
}

/// Drives detection over one frame and extracts candidate crops.
///
/// Each call is independent: no deduplication happens at this layer. The
/// still-image path calls `process` once and commits every candidate; the
/// video path filters candidates through the deduplicator first.
pub struct FrameProcessor {
    detector: Detector,
}

impl FrameProcessor {
    pub fn new(detector: Detector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Detect plate regions in `frame` and crop the original color image at
    /// each region. Detector failures propagate unchanged.
    pub fn process(&self, frame: &Frame, params: &DetectionParams) -> Result<Vec<PlateCandidate>> {
        let gray = frame.to_gray();
        let rects = self.detector.detect(&gray, params)?;
        log::debug!(
            "frame {}: {} candidate region(s)",
            frame.index,
            rects.len()
        );
        Ok(rects
            .into_iter()
            .map(|rect| PlateCandidate {
                region: DetectionRegion::new(rect, frame.index),
                image: frame.crop(&rect),
            })
            .collect())
    }
}
