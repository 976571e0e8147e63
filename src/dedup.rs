//! Cross-frame suppression of repeated detections.
//!
//! A plate that stays in view is detected again on every sampled frame. The
//! deduplicator remembers a short window of recently accepted regions and
//! suppresses a new region only when it overlaps a remembered one strongly
//! AND the two lie close together in time — the "same physical plate still
//! in view" case, not two different plates that happen to overlap.

use crate::detect::region::DetectionRegion;

/// Deduplication tunables. The defaults are conservative; both the overlap
/// threshold and the temporal window are configuration, not constants.
#[derive(Clone, Debug, PartialEq)]
pub struct DedupConfig {
    /// Overlap strictly above this IoU counts as the same region. A
    /// borderline overlap (exactly at the threshold) is treated as novel:
    /// a suppressed crop is gone for good, an extra one is only clutter.
    pub iou_threshold: f32,
    /// How many recently accepted regions are remembered.
    pub capacity: usize,
    /// Maximum frame-index gap for two detections to count as the same
    /// plate. Counted in sampled frames; the video scanner scales this by
    /// its stride.
    pub max_frame_gap: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            capacity: 5,
            max_frame_gap: 5,
        }
    }
}

impl DedupConfig {
    /// Rescale the temporal window from sampled-frame units to source-frame
    /// units for a scan at the given stride.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.max_frame_gap = self.max_frame_gap.saturating_mul(stride.max(1) as u64);
        self
    }
}

/// Sliding-window novelty filter over recently accepted regions.
///
/// The memory is a fixed-size arena with index-based FIFO eviction: once
/// full, each newly remembered region overwrites the oldest slot.
pub struct Deduplicator {
    config: DedupConfig,
    recent: Vec<DetectionRegion>,
    next_slot: usize,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            config: DedupConfig {
                capacity,
                ..config
            },
            recent: Vec::with_capacity(capacity),
            next_slot: 0,
        }
    }

    /// Judge a region; record it when novel. Pure bookkeeping, no errors.
    pub fn is_novel(&mut self, region: &DetectionRegion) -> bool {
        let duplicate = self.recent.iter().any(|seen| {
            region.frame_index.saturating_sub(seen.frame_index) <= self.config.max_frame_gap
                && seen.rect.iou(&region.rect) > self.config.iou_threshold
        });
        if !duplicate {
            self.remember(*region);
        }
        !duplicate
    }

    fn remember(&mut self, region: DetectionRegion) {
        if self.recent.len() < self.config.capacity {
            self.recent.push(region);
        } else {
            self.recent[self.next_slot] = region;
        }
        self.next_slot = (self.next_slot + 1) % self.config.capacity;
    }

    /// Forget everything; used when a new scan starts.
    pub fn reset(&mut self) {
        self.recent.clear();
        self.next_slot = 0;
    }

    pub fn remembered(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::region::Rect;

    fn region(x: u32, y: u32, frame_index: u64) -> DetectionRegion {
        DetectionRegion::new(Rect::new(x, y, 40, 20), frame_index)
    }

    #[test]
    fn identical_region_is_novel_then_duplicate() {
        let mut dedup = Deduplicator::new(DedupConfig::default());
        let r = region(10, 10, 1);
        assert!(dedup.is_novel(&r));
        assert!(!dedup.is_novel(&r));
    }

    #[test]
    fn same_rect_outside_temporal_window_is_novel_again() {
        let mut dedup = Deduplicator::new(DedupConfig::default());
        assert!(dedup.is_novel(&region(10, 10, 1)));
        // Gap of 6 sampled frames exceeds the default window of 5.
        assert!(dedup.is_novel(&region(10, 10, 7)));
    }

    #[test]
    fn distinct_locations_are_both_novel() {
        let mut dedup = Deduplicator::new(DedupConfig::default());
        assert!(dedup.is_novel(&region(10, 10, 1)));
        assert!(dedup.is_novel(&region(200, 10, 1)));
    }

    #[test]
    fn borderline_overlap_counts_as_novel() {
        let mut dedup = Deduplicator::new(DedupConfig {
            iou_threshold: 1.0 / 3.0,
            ..DedupConfig::default()
        });
        // Two 40x20 rects offset by half their width: IoU = 20*20 / (800 +
        // 800 - 400) = 1/3, exactly at the threshold — kept as novel.
        assert!(dedup.is_novel(&region(0, 0, 1)));
        assert!(dedup.is_novel(&region(20, 0, 2)));
    }

    #[test]
    fn arena_evicts_oldest_first() {
        let mut dedup = Deduplicator::new(DedupConfig {
            capacity: 2,
            max_frame_gap: 100,
            ..DedupConfig::default()
        });
        assert!(dedup.is_novel(&region(0, 0, 1)));
        assert!(dedup.is_novel(&region(100, 0, 2)));
        assert!(dedup.is_novel(&region(200, 0, 3))); // evicts (0, 0)
        assert_eq!(dedup.remembered(), 2);
        // The oldest region has been forgotten, so it is novel again.
        assert!(dedup.is_novel(&region(0, 0, 4)));
        // ... and (200, 0) is still remembered.
        assert!(!dedup.is_novel(&region(200, 0, 5)));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut dedup = Deduplicator::new(DedupConfig::default());
        assert!(dedup.is_novel(&region(10, 10, 1)));
        dedup.reset();
        assert!(dedup.is_novel(&region(10, 10, 2)));
    }

    #[test]
    fn with_stride_scales_the_temporal_window() {
        let cfg = DedupConfig::default().with_stride(3);
        assert_eq!(cfg.max_frame_gap, 15);
    }
}
