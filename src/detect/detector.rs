//! Multi-scale scanning detector.
//!
//! The detector walks scan scales from the model's base window up by
//! `scale_step` until the window no longer fits the frame, classifies every
//! window position at each scale, then clusters overlapping raw hits. A
//! cluster survives only when it holds at least `min_neighbors` raw hits —
//! the noise-rejection policy: raising `min_neighbors` trades recall for
//! precision and can only shrink the result set.

use std::collections::HashMap;
use std::sync::Arc;

use image::GrayImage;

use crate::detect::model::{CascadeModel, IntegralImage};
use crate::detect::region::Rect;
use crate::error::{Error, Result};

/// Advertised tuning range for `scale_step`.
pub const SCALE_STEP_MIN: f32 = 1.01;
pub const SCALE_STEP_MAX: f32 = 2.0;
/// Advertised upper bound for `min_neighbors`.
pub const MIN_NEIGHBORS_MAX: u32 = 20;

/// Cluster similarity tolerance for neighbor grouping, as a fraction of the
/// rectangles' size.
const GROUP_EPS: f32 = 0.2;

/// Detection tuning parameters.
///
/// Values coming from an interactive surface may be out of range; they are
/// clamped by `clamped()` before any detection runs, so the scan itself only
/// ever sees well-formed parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionParams {
    /// Geometric step between successive scan scales. Smaller is more
    /// thorough and slower. Must stay above 1.
    pub scale_step: f32,
    /// Minimum overlapping raw hits for a cluster to be accepted. Zero
    /// disables grouping and returns the raw hits.
    pub min_neighbors: u32,
    /// Candidate regions smaller than this (width, height) are discarded.
    pub min_size: (u32, u32),
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_step: 1.1,
            min_neighbors: 5,
            min_size: (30, 30),
        }
    }
}

impl DetectionParams {
    /// Snap out-of-range values into the advertised ranges.
    pub fn clamped(&self) -> Self {
        let scale_step = if self.scale_step.is_finite() {
            self.scale_step.clamp(SCALE_STEP_MIN, SCALE_STEP_MAX)
        } else {
            Self::default().scale_step
        };
        Self {
            scale_step,
            min_neighbors: self.min_neighbors.min(MIN_NEIGHBORS_MAX),
            min_size: (self.min_size.0.max(1), self.min_size.1.max(1)),
        }
    }
}

/// Scanning detector over a shared read-only cascade model.
pub struct Detector {
    model: Arc<CascadeModel>,
}

impl Detector {
    pub fn new(model: Arc<CascadeModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &CascadeModel {
        &self.model
    }

    /// Detect candidate regions in a grayscale frame.
    ///
    /// Pure with respect to the frame and parameters; the model is read-only.
    /// Fails only on a zero-dimension frame. A valid frame with no plates
    /// simply yields an empty vector.
    pub fn detect(&self, gray: &GrayImage, params: &DetectionParams) -> Result<Vec<Rect>> {
        let (frame_w, frame_h) = gray.dimensions();
        if frame_w == 0 || frame_h == 0 {
            return Err(Error::InvalidInput(
                "frame has zero width or height".to_string(),
            ));
        }
        let params = params.clamped();
        let integral = IntegralImage::new(gray);

        let mut raw = Vec::new();
        let mut scale = 1.0f32;
        loop {
            let scaled = self.model.at_scale(scale);
            let (win_w, win_h) = (scaled.window_width, scaled.window_height);
            if win_w > frame_w || win_h > frame_h {
                break;
            }
            // Scales below min_size cannot produce acceptable regions; this
            // is where the min-size floor is applied.
            if win_w >= params.min_size.0 && win_h >= params.min_size.1 {
                let step = (scale.round() as u32).max(1);
                let mut y = 0;
                while y + win_h <= frame_h {
                    let mut x = 0;
                    while x + win_w <= frame_w {
                        if scaled.evaluate(&integral, x, y) {
                            raw.push(Rect::new(x, y, win_w, win_h));
                        }
                        x += step;
                    }
                    y += step;
                }
            }
            scale *= params.scale_step;
        }

        if params.min_neighbors == 0 {
            return Ok(raw);
        }

        let regions = group_rectangles(&raw, GROUP_EPS)
            .into_iter()
            .filter(|cluster| cluster.count >= params.min_neighbors as usize)
            .map(|cluster| cluster.average)
            .filter(|r| r.width >= params.min_size.0 && r.height >= params.min_size.1)
            .collect();
        Ok(regions)
    }
}

struct Cluster {
    average: Rect,
    count: usize,
}

/// Partition raw hits into similarity clusters and average each cluster.
///
/// Two rectangles belong together when all four edge deltas stay within
/// `eps` of their size — the classic groupRectangles policy.
fn group_rectangles(rects: &[Rect], eps: f32) -> Vec<Cluster> {
    let mut parent: Vec<usize> = (0..rects.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // Accumulate per root, keeping first-seen cluster order.
    let mut order: Vec<usize> = Vec::new();
    let mut sums: HashMap<usize, (u64, u64, u64, u64, usize)> = HashMap::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        let entry = sums.entry(root).or_insert_with(|| {
            order.push(root);
            (0, 0, 0, 0, 0)
        });
        entry.0 += r.x as u64;
        entry.1 += r.y as u64;
        entry.2 += r.width as u64;
        entry.3 += r.height as u64;
        entry.4 += 1;
    }

    order
        .into_iter()
        .map(|root| {
            let (sx, sy, sw, sh, n) = sums[&root];
            let n64 = n as u64;
            Cluster {
                average: Rect::new(
                    (sx / n64) as u32,
                    (sy / n64) as u32,
                    (sw / n64) as u32,
                    (sh / n64) as u32,
                ),
                count: n,
            }
        })
        .collect()
}

fn similar(a: &Rect, b: &Rect, eps: f32) -> bool {
    let delta = eps * 0.5 * (a.width.min(b.width) + a.height.min(b.height)) as f32;
    let close = |p: u32, q: u32| (p as f32 - q as f32).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.right(), b.right())
        && close(a.bottom(), b.bottom())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::model::{
        CascadeDescriptor, FeatureRect, StageDescriptor, WeakDescriptor, WindowSize,
    };
    use image::{GrayImage, Luma};

    /// One-stage center-contrast cascade on an 8x8 window: fires wherever the
    /// window center is markedly brighter than the window as a whole.
    fn contrast_model() -> Arc<CascadeModel> {
        let descriptor = CascadeDescriptor {
            name: "contrast".to_string(),
            window: WindowSize {
                width: 8,
                height: 8,
            },
            stages: vec![StageDescriptor {
                threshold: 0.5,
                weak: vec![WeakDescriptor {
                    rects: vec![
                        FeatureRect {
                            x: 2,
                            y: 2,
                            width: 4,
                            height: 4,
                            weight: 1.0,
                        },
                        FeatureRect {
                            x: 0,
                            y: 0,
                            width: 8,
                            height: 8,
                            weight: -1.0,
                        },
                    ],
                    threshold: 30.0,
                    pass_vote: 1.0,
                    fail_vote: -1.0,
                }],
            }],
        };
        Arc::new(CascadeModel::from_descriptor(descriptor).unwrap())
    }

    /// 64x64 dark field with a bright 8x8 block at (16, 16).
    fn block_frame() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            if (16..24).contains(&x) && (16..24).contains(&y) {
                Luma([220])
            } else {
                Luma([20])
            }
        })
    }

    fn params(min_neighbors: u32) -> DetectionParams {
        DetectionParams {
            scale_step: 1.1,
            min_neighbors,
            min_size: (4, 4),
        }
    }

    #[test]
    fn zero_dimension_frame_is_invalid_input() {
        let detector = Detector::new(contrast_model());
        let empty = GrayImage::new(0, 0);
        let err = detector.detect(&empty, &params(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn frame_smaller_than_window_yields_nothing() {
        let detector = Detector::new(contrast_model());
        let tiny = GrayImage::from_pixel(4, 4, Luma([128]));
        assert!(detector.detect(&tiny, &params(1)).unwrap().is_empty());
    }

    #[test]
    fn regions_stay_inside_frame_and_above_min_size() {
        let detector = Detector::new(contrast_model());
        let frame = block_frame();
        for min_neighbors in [0, 1, 3] {
            let mut p = params(min_neighbors);
            p.min_size = (6, 6);
            for region in detector.detect(&frame, &p).unwrap() {
                assert!(region.within(64, 64));
                assert!(region.width >= 6 && region.height >= 6);
            }
        }
    }

    #[test]
    fn flat_frame_yields_nothing() {
        let detector = Detector::new(contrast_model());
        let flat = GrayImage::from_pixel(64, 64, Luma([128]));
        assert!(detector.detect(&flat, &params(1)).unwrap().is_empty());
    }

    #[test]
    fn raising_min_neighbors_never_adds_regions() {
        let detector = Detector::new(contrast_model());
        let frame = block_frame();
        let mut previous = usize::MAX;
        for min_neighbors in 0..=8 {
            let count = detector.detect(&frame, &params(min_neighbors)).unwrap().len();
            assert!(
                count <= previous,
                "min_neighbors {min_neighbors} grew the result set ({count} > {previous})"
            );
            previous = count;
        }
    }

    #[test]
    fn detection_finds_the_bright_block() {
        let detector = Detector::new(contrast_model());
        let frame = block_frame();
        let regions = detector.detect(&frame, &params(2)).unwrap();
        assert!(!regions.is_empty());
        let block = Rect::new(16, 16, 8, 8);
        assert!(regions.iter().any(|r| r.iou(&block) > 0.3));
    }

    #[test]
    fn clamping_snaps_out_of_range_values() {
        let p = DetectionParams {
            scale_step: 0.3,
            min_neighbors: 500,
            min_size: (0, 0),
        }
        .clamped();
        assert_eq!(p.scale_step, SCALE_STEP_MIN);
        assert_eq!(p.min_neighbors, MIN_NEIGHBORS_MAX);
        assert_eq!(p.min_size, (1, 1));

        let p = DetectionParams {
            scale_step: 9.0,
            ..DetectionParams::default()
        }
        .clamped();
        assert_eq!(p.scale_step, SCALE_STEP_MAX);
    }

    #[test]
    fn grouping_merges_near_identical_rects() {
        let rects = vec![
            Rect::new(10, 10, 40, 20),
            Rect::new(11, 10, 40, 20),
            Rect::new(10, 11, 41, 20),
            Rect::new(200, 100, 40, 20),
        ];
        let clusters = group_rectangles(&rects, 0.2);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].count, 3);
        assert_eq!(clusters[1].count, 1);
    }
}
