use std::path::Path;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use platescan::{CascadeModel, DetectionParams};

/// The committed miniature cascade tuned to the synthetic plate pattern.
pub fn test_model() -> Arc<CascadeModel> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/plate_cascade.json");
    Arc::new(CascadeModel::load(path).expect("test cascade loads"))
}

pub fn test_params() -> DetectionParams {
    DetectionParams {
        scale_step: 1.1,
        min_neighbors: 3,
        min_size: (20, 10),
    }
}

/// Uniform mid-gray field the synthetic plate pattern stands out against.
pub fn background(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([170, 170, 170]))
}
