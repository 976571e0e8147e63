//! Runtime configuration.
//!
//! Configuration is layered: an optional JSON file named by the
//! `PLATESCAN_CONFIG` environment variable, then `PLATESCAN_*` environment
//! overrides, then a validation pass that clamps tuning values into range.
//! Detection parameter changes only ever affect the next detection call;
//! nothing is applied retroactively to crops already in the store.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::dedup::DedupConfig;
use crate::detect::detector::DetectionParams;
use crate::scan::ScanOptions;

const DEFAULT_MODEL_PATH: &str = "cascade.json";
const DEFAULT_OUT_DIR: &str = "plates";
const DEFAULT_STRIDE: u32 = 2;
const DEFAULT_QUEUE_DEPTH: usize = 8;
const DEFAULT_MAX_WIDTH: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct PlatescanConfigFile {
    model_path: Option<String>,
    out_dir: Option<String>,
    detection: Option<DetectionConfigFile>,
    dedup: Option<DedupConfigFile>,
    video: Option<VideoConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    scale_step: Option<f32>,
    min_neighbors: Option<u32>,
    min_width: Option<u32>,
    min_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DedupConfigFile {
    iou_threshold: Option<f32>,
    capacity: Option<usize>,
    max_frame_gap: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    stride: Option<u32>,
    queue_depth: Option<usize>,
    max_width: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct PlatescanConfig {
    pub model_path: PathBuf,
    pub out_dir: PathBuf,
    pub detection: DetectionParams,
    pub dedup: DedupConfig,
    pub video: VideoSettings,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub stride: u32,
    pub queue_depth: usize,
    /// 0 disables the processing downscale.
    pub max_width: u32,
}

impl PlatescanConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PLATESCAN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PlatescanConfigFile) -> Self {
        let defaults = DedupConfig::default();
        let detection_defaults = DetectionParams::default();
        Self {
            model_path: file
                .model_path
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            out_dir: file
                .out_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR)),
            detection: DetectionParams {
                scale_step: file
                    .detection
                    .as_ref()
                    .and_then(|d| d.scale_step)
                    .unwrap_or(detection_defaults.scale_step),
                min_neighbors: file
                    .detection
                    .as_ref()
                    .and_then(|d| d.min_neighbors)
                    .unwrap_or(detection_defaults.min_neighbors),
                min_size: (
                    file.detection
                        .as_ref()
                        .and_then(|d| d.min_width)
                        .unwrap_or(detection_defaults.min_size.0),
                    file.detection
                        .as_ref()
                        .and_then(|d| d.min_height)
                        .unwrap_or(detection_defaults.min_size.1),
                ),
            },
            dedup: DedupConfig {
                iou_threshold: file
                    .dedup
                    .as_ref()
                    .and_then(|d| d.iou_threshold)
                    .unwrap_or(defaults.iou_threshold),
                capacity: file
                    .dedup
                    .as_ref()
                    .and_then(|d| d.capacity)
                    .unwrap_or(defaults.capacity),
                max_frame_gap: file
                    .dedup
                    .as_ref()
                    .and_then(|d| d.max_frame_gap)
                    .unwrap_or(defaults.max_frame_gap),
            },
            video: VideoSettings {
                stride: file
                    .video
                    .as_ref()
                    .and_then(|v| v.stride)
                    .unwrap_or(DEFAULT_STRIDE),
                queue_depth: file
                    .video
                    .as_ref()
                    .and_then(|v| v.queue_depth)
                    .unwrap_or(DEFAULT_QUEUE_DEPTH),
                max_width: file
                    .video
                    .and_then(|v| v.max_width)
                    .unwrap_or(DEFAULT_MAX_WIDTH),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PLATESCAN_MODEL") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(dir) = std::env::var("PLATESCAN_OUT_DIR") {
            if !dir.trim().is_empty() {
                self.out_dir = PathBuf::from(dir);
            }
        }
        if let Ok(step) = std::env::var("PLATESCAN_SCALE_STEP") {
            self.detection.scale_step = step
                .parse()
                .map_err(|_| anyhow!("PLATESCAN_SCALE_STEP must be a number"))?;
        }
        if let Ok(neighbors) = std::env::var("PLATESCAN_MIN_NEIGHBORS") {
            self.detection.min_neighbors = neighbors
                .parse()
                .map_err(|_| anyhow!("PLATESCAN_MIN_NEIGHBORS must be an integer"))?;
        }
        if let Ok(stride) = std::env::var("PLATESCAN_STRIDE") {
            self.video.stride = stride
                .parse()
                .map_err(|_| anyhow!("PLATESCAN_STRIDE must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        // Out-of-range tuning input is clamped, not rejected, so a slider
        // can never push the detector into an ill-formed state.
        self.detection = self.detection.clamped();

        if !(0.0..=1.0).contains(&self.dedup.iou_threshold) {
            return Err(anyhow!("dedup.iou_threshold must be within 0.0..=1.0"));
        }
        if self.dedup.capacity == 0 {
            return Err(anyhow!("dedup.capacity must be at least 1"));
        }
        self.video.stride = self.video.stride.max(1);
        self.video.queue_depth = self.video.queue_depth.max(1);
        Ok(())
    }

    /// Per-scan options derived from this configuration.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            params: self.detection.clone(),
            stride: self.video.stride,
            queue_depth: self.video.queue_depth,
            dedup: self.dedup.clone(),
            max_width: if self.video.max_width == 0 {
                None
            } else {
                Some(self.video.max_width)
            },
        }
    }
}

fn read_config_file(path: &Path) -> Result<PlatescanConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
