//! Pixel-space rectangles and detection regions.

/// Axis-aligned rectangle in frame-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Area of the overlap between two rectangles, zero when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> u64 {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }
        (x1 - x0) as u64 * (y1 - y0) as u64
    }

    /// Intersection-over-union overlap ratio in [0, 1].
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = self.intersection_area(other);
        if inter == 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        inter as f32 / union as f32
    }

    /// True when the rectangle lies fully inside a `width` x `height` frame.
    pub fn within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// A detected region together with the frame it came from.
///
/// Immutable once created; the frame index is the source's own frame
/// numbering (not the sampled ordinal), so regions stay meaningful for
/// review after a strided scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectionRegion {
    pub rect: Rect,
    pub frame_index: u64,
}

impl DetectionRegion {
    pub fn new(rect: Rect, frame_index: u64) -> Self {
        Self { rect, frame_index }
    }
}
