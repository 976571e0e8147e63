//! Ordered collection of accepted plate crops.
//!
//! The store is the only shared mutable state in the pipeline: the active
//! scan (or the single-image call) writes, observers read snapshots. `add`
//! is the sole mutation point — identifier assignment and the append happen
//! under one lock, so a reader can never see a partially inserted crop or a
//! duplicated identifier.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbImage;

use crate::detect::region::DetectionRegion;
use crate::error::{Error, Result};
use crate::processor::PlateCandidate;

/// An accepted plate crop. Identifiers are unique and monotonically
/// increasing for the lifetime of the store, and are never reused — not even
/// after `clear`.
#[derive(Clone, Debug)]
pub struct PlateCrop {
    pub id: u64,
    pub region: DetectionRegion,
    pub image: RgbImage,
    /// Unix timestamp (seconds) of insertion.
    pub created_at_s: u64,
}

/// Outcome of a bulk save. Per-file failures are data, not errors: one bad
/// write must not lose the rest of the session's detections.
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Number of crop files written.
    pub written: usize,
    /// Crops that failed to write, with the reason.
    pub failed: Vec<(u64, String)>,
}

#[derive(Default)]
struct StoreInner {
    crops: Vec<PlateCrop>,
    next_id: u64,
}

/// Insertion-ordered store of accepted crops.
#[derive(Default)]
pub struct ResultStore {
    inner: Mutex<StoreInner>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned lock only means a panic elsewhere; the vector append
        // below keeps the store consistent, so recover the guard.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Commit a candidate, assigning the next identifier. Insertion order is
    /// preserved on enumeration — it is the detection order, which matters
    /// for review.
    pub fn add(&self, candidate: PlateCandidate) -> u64 {
        let created_at_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.crops.push(PlateCrop {
            id,
            region: candidate.region,
            image: candidate.image,
            created_at_s,
        });
        id
    }

    pub fn get(&self, id: u64) -> Option<PlateCrop> {
        self.lock().crops.iter().find(|c| c.id == id).cloned()
    }

    /// Copy of the current contents, in insertion order. This is the
    /// read-only observer interface.
    pub fn snapshot(&self) -> Vec<PlateCrop> {
        self.lock().crops.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all crops. Already issued identifiers stay burned.
    pub fn clear(&self) {
        self.lock().crops.clear();
    }

    /// Write every crop as `plate_<id>.jpg` into `dir`, creating the
    /// directory if needed. Fails only when the directory itself cannot be
    /// created; individual write failures are collected in the report.
    pub fn save_all(&self, dir: &Path) -> Result<SaveReport> {
        std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryUnwritable {
            path: dir.to_path_buf(),
            source,
        })?;

        let crops = self.snapshot();
        let mut report = SaveReport::default();
        for crop in &crops {
            let file = dir.join(crop_file_name(crop.id));
            match crop.image.save(&file) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    log::warn!("skipping crop {}: write to {} failed: {}", crop.id, file.display(), e);
                    report.failed.push((crop.id, e.to_string()));
                }
            }
        }
        log::info!(
            "saved {} crop(s) to {} ({} failed)",
            report.written,
            dir.display(),
            report.failed.len()
        );
        Ok(report)
    }
}

fn crop_file_name(id: u64) -> PathBuf {
    PathBuf::from(format!("plate_{id:05}.jpg"))
}
