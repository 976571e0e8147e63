//! Error taxonomy for the detection pipeline.
//!
//! Four failure classes, matching how far a failure reaches:
//!
//! - `ModelLoad`: the cascade model could not be loaded. Fatal — without a
//!   model no detection is possible, so this is only seen at startup.
//! - `InvalidInput`: the caller handed the detector an unusable frame.
//! - `SourceRead`: a video source could not be opened or decoded. Aborts the
//!   current scan only; crops already accepted stay in the store and the
//!   caller may start a fresh scan.
//! - `DirectoryUnwritable`: the export directory could not be created or
//!   opened. Aborts one save batch; per-file write failures inside a batch
//!   are NOT errors — they are collected in `SaveReport`.
//!
//! Nothing in the detection path is retried automatically: detection is
//! deterministic for a given frame and parameter set.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load cascade model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("invalid input frame: {0}")]
    InvalidInput(String),

    #[error("video source '{source_name}' failed: {reason}")]
    SourceRead { source_name: String, reason: String },

    #[error("cannot create or open export directory {path}: {source}")]
    DirectoryUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn source_read(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceRead {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}
