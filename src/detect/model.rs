//! Cascade model loading and window evaluation.
//!
//! The model is a staged classifier over rectangular mean-intensity features,
//! evaluated on an integral image. Each weak classifier sums weighted region
//! means inside the scan window and votes; a stage passes when its vote total
//! clears the stage threshold; a window is positive only if every stage
//! passes, with early rejection on the first failing stage.
//!
//! The model is loaded once at startup and is read-only afterwards. Callers
//! share it through an `Arc` handle; there is no ambient global.

use std::fs;
use std::path::Path;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// On-disk model descriptor (JSON).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CascadeDescriptor {
    pub name: String,
    pub window: WindowSize,
    pub stages: Vec<StageDescriptor>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StageDescriptor {
    /// Minimum vote total for the stage to pass.
    pub threshold: f32,
    pub weak: Vec<WeakDescriptor>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WeakDescriptor {
    /// Weighted regions in base-window coordinates.
    pub rects: Vec<FeatureRect>,
    /// Feature value at or above this votes `pass_vote`, below votes `fail_vote`.
    pub threshold: f32,
    pub pass_vote: f32,
    pub fail_vote: f32,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct FeatureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

/// A loaded, validated cascade. Read-only after construction.
#[derive(Clone, Debug)]
pub struct CascadeModel {
    name: String,
    window_width: u32,
    window_height: u32,
    stages: Vec<StageDescriptor>,
}

impl CascadeModel {
    /// Load and validate a model file. Any failure here is fatal for
    /// detection, so errors carry the offending path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::model_load(path, format!("read failed: {e}")))?;
        let descriptor: CascadeDescriptor = serde_json::from_str(&raw)
            .map_err(|e| Error::model_load(path, format!("invalid JSON: {e}")))?;
        Self::from_descriptor(descriptor)
            .map_err(|reason| Error::model_load(path, reason))
    }

    /// Build a model from an in-memory descriptor.
    pub fn from_descriptor(
        descriptor: CascadeDescriptor,
    ) -> std::result::Result<Self, String> {
        let window = descriptor.window;
        if window.width == 0 || window.height == 0 {
            return Err("model window has zero dimension".to_string());
        }
        if descriptor.stages.is_empty() {
            return Err("model has no stages".to_string());
        }
        for (si, stage) in descriptor.stages.iter().enumerate() {
            if stage.weak.is_empty() {
                return Err(format!("stage {si} has no weak classifiers"));
            }
            for weak in &stage.weak {
                if weak.rects.is_empty() {
                    return Err(format!("stage {si} has a featureless weak classifier"));
                }
                for rect in &weak.rects {
                    if rect.width == 0 || rect.height == 0 {
                        return Err(format!("stage {si} has a zero-area feature rect"));
                    }
                    if rect.x + rect.width > window.width
                        || rect.y + rect.height > window.height
                    {
                        return Err(format!(
                            "stage {si} feature rect ({}, {}, {}, {}) exceeds the {}x{} window",
                            rect.x, rect.y, rect.width, rect.height, window.width, window.height
                        ));
                    }
                }
            }
        }
        Ok(Self {
            name: descriptor.name,
            window_width: window.width,
            window_height: window.height,
            stages: descriptor.stages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base scan-window size, before scaling.
    pub fn window(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Precompute pixel-space features for one scan scale, so rounding is
    /// done once per scale rather than per window.
    pub(crate) fn at_scale(&self, scale: f32) -> ScaledCascade {
        let window_width = scale_len(self.window_width, scale);
        let window_height = scale_len(self.window_height, scale);
        let stages = self
            .stages
            .iter()
            .map(|stage| ScaledStage {
                threshold: stage.threshold,
                weak: stage
                    .weak
                    .iter()
                    .map(|weak| ScaledWeak {
                        rects: weak
                            .rects
                            .iter()
                            .map(|r| scale_rect(r, scale, window_width, window_height))
                            .collect(),
                        threshold: weak.threshold,
                        pass_vote: weak.pass_vote,
                        fail_vote: weak.fail_vote,
                    })
                    .collect(),
            })
            .collect();
        ScaledCascade {
            window_width,
            window_height,
            stages,
        }
    }
}

fn scale_len(len: u32, scale: f32) -> u32 {
    ((len as f32 * scale).round() as u32).max(1)
}

fn scale_rect(rect: &FeatureRect, scale: f32, window_width: u32, window_height: u32) -> ScaledRect {
    let dx = ((rect.x as f32 * scale).round() as u32).min(window_width - 1);
    let dy = ((rect.y as f32 * scale).round() as u32).min(window_height - 1);
    // Rounding can push a rect one pixel past the scaled window; clamp back in.
    let width = scale_len(rect.width, scale).min(window_width - dx);
    let height = scale_len(rect.height, scale).min(window_height - dy);
    ScaledRect {
        dx,
        dy,
        width,
        height,
        weight: rect.weight,
    }
}

/// One scale of the cascade, with features in pixel offsets from the window
/// origin.
pub(crate) struct ScaledCascade {
    pub window_width: u32,
    pub window_height: u32,
    stages: Vec<ScaledStage>,
}

struct ScaledStage {
    threshold: f32,
    weak: Vec<ScaledWeak>,
}

struct ScaledWeak {
    rects: Vec<ScaledRect>,
    threshold: f32,
    pass_vote: f32,
    fail_vote: f32,
}

struct ScaledRect {
    dx: u32,
    dy: u32,
    width: u32,
    height: u32,
    weight: f32,
}

impl ScaledCascade {
    /// Classify the window at (x, y). The window must lie inside the frame
    /// the integral image was built from.
    pub fn evaluate(&self, integral: &IntegralImage, x: u32, y: u32) -> bool {
        for stage in &self.stages {
            let mut votes = 0.0f32;
            for weak in &stage.weak {
                let mut value = 0.0f32;
                for r in &weak.rects {
                    value += r.weight * integral.mean(x + r.dx, y + r.dy, r.width, r.height);
                }
                votes += if value >= weak.threshold {
                    weak.pass_vote
                } else {
                    weak.fail_vote
                };
            }
            if votes < stage.threshold {
                return false;
            }
        }
        true
    }
}

/// Summed-area table over a grayscale frame. Built once per frame; any
/// rectangle sum is four lookups after that.
pub struct IntegralImage {
    width: u32,
    height: u32,
    sums: Vec<u64>,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let stride = width as usize + 1;
        let mut sums = vec![0u64; stride * (height as usize + 1)];
        let pixels = gray.as_raw();
        for y in 0..height as usize {
            let mut row_sum = 0u64;
            for x in 0..width as usize {
                row_sum += pixels[y * width as usize + x] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        Self {
            width,
            height,
            sums,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn rect_sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        let stride = self.width as usize + 1;
        let (x, y, w, h) = (x as usize, y as usize, width as usize, height as usize);
        let top_left = self.sums[y * stride + x];
        let top_right = self.sums[y * stride + x + w];
        let bottom_left = self.sums[(y + h) * stride + x];
        let bottom_right = self.sums[(y + h) * stride + x + w];
        bottom_right + top_left - top_right - bottom_left
    }

    /// Mean intensity over a rectangle, in 0..=255.
    pub fn mean(&self, x: u32, y: u32, width: u32, height: u32) -> f32 {
        debug_assert!(x + width <= self.width && y + height <= self.height);
        self.rect_sum(x, y, width, height) as f32 / (width as u64 * height as u64) as f32
    }
}
