//! platescan
//!
//! License-plate region detection for still images and video streams, with
//! review-oriented management of the resulting plate crops.
//!
//! # Architecture
//!
//! The pipeline is a chain of small components; UI concerns (file dialogs,
//! playback, sliders) live outside the crate and drive it through explicit
//! calls plus an injected cancellation token:
//!
//! ```text
//! caller ── VideoScanner ──► FrameProcessor ──► Detector (CascadeModel)
//!    │            │                                   │
//!    │            └──► Deduplicator ──► ResultStore ◄─┘ (still-image path)
//!    └── save_all / clear / snapshot
//! ```
//!
//! - [`detect::CascadeModel`]: the pre-trained staged classifier, loaded
//!   once at startup and shared read-only.
//! - [`detect::Detector`]: multi-scale window scan with neighbor grouping.
//! - [`processor::FrameProcessor`]: per-frame detection plus color crops.
//! - [`scan::VideoScanner`]: strided, cancellable video scans with decode
//!   and detection decoupled by a bounded queue.
//! - [`dedup::Deduplicator`]: suppresses re-detections of a plate that is
//!   still in view.
//! - [`store::ResultStore`]: insertion-ordered crops with atomic id
//!   assignment and bulk export to disk.

pub mod config;
pub mod dedup;
pub mod detect;
pub mod error;
pub mod frame;
pub mod processor;
pub mod scan;
pub mod source;
pub mod store;

pub use config::PlatescanConfig;
pub use dedup::{DedupConfig, Deduplicator};
pub use detect::{CascadeModel, DetectionParams, DetectionRegion, Detector, Rect};
pub use error::{Error, Result};
pub use frame::{draw_regions, Frame};
pub use processor::{FrameProcessor, PlateCandidate};
pub use scan::{CancelToken, ScanOptions, ScanStream, VideoScanner};
pub use source::VideoSource;
pub use store::{PlateCrop, ResultStore, SaveReport};
