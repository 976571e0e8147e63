//! Video frame sources.
//!
//! A `VideoSource` yields frames until end-of-stream. Three backends:
//!
//! - `synthetic://<name>[?frames=N]` — a deterministic generated clip with a
//!   plate pattern in one spot for the first half and a second pattern
//!   elsewhere for the second half. No media files needed; used by tests
//!   and demos.
//! - A directory path — an image sequence, frames sorted by file name.
//! - Any other path — a container file decoded through ffmpeg, available
//!   with the `video-ffmpeg` feature.
//!
//! Sources are read-only; the input is never modified. A finite stream
//! ending is the normal terminal state and is reported as `Ok(None)`.

#[cfg(feature = "video-ffmpeg")]
mod ffmpeg;

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use crate::detect::region::Rect;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Background intensity of synthetic frames.
const SYNTHETIC_BACKGROUND: u8 = 170;
/// Plate border / character intensity.
const SYNTHETIC_DARK: u8 = 10;
/// Plate field intensity.
const SYNTHETIC_BRIGHT: u8 = 240;

const SYNTHETIC_WIDTH: u32 = 320;
const SYNTHETIC_HEIGHT: u32 = 240;
const SYNTHETIC_DEFAULT_FRAMES: u64 = 40;

/// First-half and second-half plate placements in synthetic clips.
pub const SYNTHETIC_PLATE_A: Rect = Rect {
    x: 100,
    y: 80,
    width: 48,
    height: 24,
};
pub const SYNTHETIC_PLATE_B: Rect = Rect {
    x: 190,
    y: 150,
    width: 48,
    height: 24,
};

/// A readable video source.
pub struct VideoSource {
    name: String,
    backend: SourceBackend,
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.backend {
            SourceBackend::Synthetic(_) => "synthetic",
            SourceBackend::ImageDir(_) => "image-dir",
            #[cfg(feature = "video-ffmpeg")]
            SourceBackend::Ffmpeg(_) => "ffmpeg",
        };
        f.debug_struct("VideoSource")
            .field("name", &self.name)
            .field("backend", &kind)
            .finish()
    }
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    ImageDir(ImageDirSource),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(ffmpeg::FfmpegSource),
}

impl VideoSource {
    /// Open a source by spec string. See the module docs for the accepted
    /// forms. Fails with `SourceRead` when the source cannot be opened.
    pub fn open(spec: &str) -> Result<Self> {
        if let Some(rest) = spec.strip_prefix("synthetic://") {
            let source = SyntheticSource::parse(spec, rest)?;
            log::info!(
                "opened synthetic source '{}' ({} frames)",
                spec,
                source.total_frames
            );
            return Ok(Self {
                name: spec.to_string(),
                backend: SourceBackend::Synthetic(source),
            });
        }

        let path = Path::new(spec);
        if path.is_dir() {
            let source = ImageDirSource::open(spec, path)?;
            log::info!(
                "opened image sequence {} ({} frames)",
                spec,
                source.files.len()
            );
            return Ok(Self {
                name: spec.to_string(),
                backend: SourceBackend::ImageDir(source),
            });
        }

        #[cfg(feature = "video-ffmpeg")]
        {
            let source = ffmpeg::FfmpegSource::open(spec)?;
            log::info!("opened video file {} (ffmpeg)", spec);
            Ok(Self {
                name: spec.to_string(),
                backend: SourceBackend::Ffmpeg(source),
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(Error::source_read(
                spec,
                "decoding container formats requires the video-ffmpeg feature",
            ))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next frame, or `Ok(None)` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => Ok(source.next_frame()),
            SourceBackend::ImageDir(source) => source.next_frame(),
            #[cfg(feature = "video-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.next_frame(),
        }
    }
}

/// Draw the synthetic plate pattern: a dark surround with a bright field
/// inset by a quarter of the height — the high-contrast rectangle the
/// bundled test cascade is tuned to.
pub fn draw_plate_pattern(image: &mut RgbImage, rect: &Rect) {
    let border = (rect.height / 4).max(1);
    for y in rect.y..rect.bottom().min(image.height()) {
        for x in rect.x..rect.right().min(image.width()) {
            let inside_field = x >= rect.x + border
                && x < rect.right().saturating_sub(border)
                && y >= rect.y + border
                && y < rect.bottom().saturating_sub(border);
            let v = if inside_field {
                SYNTHETIC_BRIGHT
            } else {
                SYNTHETIC_DARK
            };
            image.put_pixel(x, y, Rgb([v, v, v]));
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (synthetic://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticSource {
    total_frames: u64,
    next_index: u64,
}

impl SyntheticSource {
    fn parse(spec: &str, rest: &str) -> Result<Self> {
        let total_frames = match rest.split_once('?') {
            None => SYNTHETIC_DEFAULT_FRAMES,
            Some((_, query)) => {
                let frames = query
                    .split('&')
                    .find_map(|kv| kv.strip_prefix("frames="))
                    .unwrap_or("");
                frames.parse().map_err(|_| {
                    Error::source_read(spec, "synthetic source wants ?frames=<count>")
                })?
            }
        };
        Ok(Self {
            total_frames,
            next_index: 0,
        })
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.next_index >= self.total_frames {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;

        let bg = SYNTHETIC_BACKGROUND;
        let mut image =
            RgbImage::from_pixel(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, Rgb([bg, bg, bg]));
        let plate = if index < self.total_frames / 2 {
            SYNTHETIC_PLATE_A
        } else {
            SYNTHETIC_PLATE_B
        };
        draw_plate_pattern(&mut image, &plate);
        Some(Frame::new(image, index))
    }
}

// ----------------------------------------------------------------------------
// Image sequence directory source
// ----------------------------------------------------------------------------

struct ImageDirSource {
    files: Vec<PathBuf>,
    next_index: u64,
}

impl ImageDirSource {
    fn open(spec: &str, dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::source_read(spec, format!("cannot list directory: {e}")))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_frame_file(p))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(Error::source_read(spec, "directory holds no image frames"));
        }
        Ok(Self {
            files,
            next_index: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next_index as usize) else {
            return Ok(None);
        };
        let image = image::open(path)
            .map_err(|e| {
                Error::source_read(
                    path.display().to_string(),
                    format!("cannot decode frame: {e}"),
                )
            })?
            .to_rgb8();
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame::new(image, index)))
    }
}

fn is_frame_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "jpg" | "jpeg" | "png"
    )
}
