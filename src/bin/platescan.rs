//! platescan - license-plate detection CLI
//!
//! Drives the detection pipeline over a still image or a video source and
//! exports the accepted plate crops:
//!
//! 1. Load the cascade model (fatal if it cannot be loaded)
//! 2. `image`: one FrameProcessor pass, every candidate becomes a crop
//! 3. `video`: strided scan with cross-frame deduplication; Ctrl-C cancels
//! 4. Save crops (and the annotated still) into the output directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use platescan::{
    draw_regions, CancelToken, CascadeModel, DetectionParams, Detector, Frame, FrameProcessor,
    PlatescanConfig, ResultStore, VideoScanner, VideoSource,
};

#[derive(Parser, Debug)]
#[command(name = "platescan", version, about = "Detect license-plate regions in images and video")]
struct Cli {
    /// Cascade model file (JSON descriptor).
    #[arg(long, env = "PLATESCAN_MODEL")]
    model: Option<PathBuf>,

    /// Directory for saved crops.
    #[arg(long, env = "PLATESCAN_OUT_DIR")]
    out_dir: Option<PathBuf>,

    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Tuning {
    /// Geometric step between scan scales (1.01-2.0).
    #[arg(long)]
    scale_step: Option<f32>,

    /// Overlapping raw hits required to accept a region (0-20).
    #[arg(long)]
    min_neighbors: Option<u32>,

    /// Discard regions narrower than this.
    #[arg(long)]
    min_width: Option<u32>,

    /// Discard regions shorter than this.
    #[arg(long)]
    min_height: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect plates in a still image.
    Image {
        /// Image file to process.
        path: PathBuf,
    },
    /// Scan a video source (synthetic://, a frame directory, or a container
    /// file with the video-ffmpeg feature).
    Video {
        /// Source specification.
        source: String,

        /// Process every Nth frame.
        #[arg(long, env = "PLATESCAN_STRIDE")]
        stride: Option<u32>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = PlatescanConfig::load()?;
    apply_overrides(&mut cfg, &cli);

    let model = CascadeModel::load(&cfg.model_path)?;
    log::info!(
        "loaded cascade '{}' ({} stage(s), {}x{} window)",
        model.name(),
        model.stage_count(),
        model.window().0,
        model.window().1
    );
    let processor = FrameProcessor::new(Detector::new(Arc::new(model)));
    let store = Arc::new(ResultStore::new());

    match &cli.command {
        Command::Image { path } => {
            run_image(path, &processor, &store, &cfg.detection, &cfg.out_dir)
        }
        Command::Video { source, stride } => {
            if let Some(stride) = stride {
                cfg.video.stride = (*stride).max(1);
            }
            run_video(source, processor, store, &cfg)
        }
    }
}

fn apply_overrides(cfg: &mut PlatescanConfig, cli: &Cli) {
    if let Some(model) = &cli.model {
        cfg.model_path = model.clone();
    }
    if let Some(out_dir) = &cli.out_dir {
        cfg.out_dir = out_dir.clone();
    }
    if let Some(step) = cli.tuning.scale_step {
        cfg.detection.scale_step = step;
    }
    if let Some(neighbors) = cli.tuning.min_neighbors {
        cfg.detection.min_neighbors = neighbors;
    }
    if let Some(w) = cli.tuning.min_width {
        cfg.detection.min_size.0 = w;
    }
    if let Some(h) = cli.tuning.min_height {
        cfg.detection.min_size.1 = h;
    }
    // Interactive surfaces may hand us anything; snap into range up front.
    cfg.detection = cfg.detection.clamped();
}

fn run_image(
    path: &Path,
    processor: &FrameProcessor,
    store: &ResultStore,
    params: &DetectionParams,
    out_dir: &Path,
) -> Result<()> {
    let image = image::open(path)
        .with_context(|| format!("failed to load image {}", path.display()))?
        .to_rgb8();
    let frame = Frame::new(image, 0);

    let candidates = processor.process(&frame, params)?;
    log::info!("detected {} license plate(s)", candidates.len());

    let regions: Vec<_> = candidates.iter().map(|c| c.region.rect).collect();
    for candidate in candidates {
        store.add(candidate);
    }

    let report = store.save_all(out_dir)?;
    for (id, reason) in &report.failed {
        log::warn!("crop {id} was not written: {reason}");
    }

    // Annotated copy of the input, for review.
    let mut annotated = frame.image.clone();
    draw_regions(&mut annotated, &regions, image::Rgb([0, 255, 0]));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let annotated_path = out_dir.join(format!("{stem}_detected.jpg"));
    annotated
        .save(&annotated_path)
        .with_context(|| format!("failed to write {}", annotated_path.display()))?;

    println!(
        "{} plate(s), {} crop(s) written to {}, annotated image at {}",
        regions.len(),
        report.written,
        out_dir.display(),
        annotated_path.display()
    );
    Ok(())
}

fn run_video(
    source: &str,
    processor: FrameProcessor,
    store: Arc<ResultStore>,
    cfg: &PlatescanConfig,
) -> Result<()> {
    let source = VideoSource::open(source)?;
    let scanner = VideoScanner::new(processor, store.clone());

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, cancelling scan");
        handler_cancel.cancel();
    })
    .context("failed to install interrupt handler")?;

    let stream = scanner.scan(source, cfg.scan_options(), cancel);
    let mut scan_failed = false;
    for item in stream {
        match item {
            Ok(crop) => println!(
                "plate #{} frame {} at ({}, {}) {}x{}",
                crop.id,
                crop.region.frame_index,
                crop.region.rect.x,
                crop.region.rect.y,
                crop.region.rect.width,
                crop.region.rect.height
            ),
            Err(e) => {
                log::error!("scan aborted: {e}");
                scan_failed = true;
            }
        }
    }

    let report = store.save_all(&cfg.out_dir)?;
    println!(
        "{} crop(s) written to {} ({} failed)",
        report.written,
        cfg.out_dir.display(),
        report.failed.len()
    );
    if scan_failed {
        anyhow::bail!("scan did not reach the end of the source");
    }
    Ok(())
}
