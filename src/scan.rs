//! Video scanning pipeline.
//!
//! Reading compressed video is I/O-bound while detection is compute-bound,
//! so a scan runs as two cooperating stages: a decode thread samples frames
//! at the configured stride and feeds a bounded queue (backpressure blocks
//! the decoder when detection falls behind); detection, deduplication and
//! store commits happen on the consuming side as the stream is pulled, so a
//! caller can render progress without waiting for the scan to finish.
//!
//! Cancellation is cooperative: both stages check the token between frames
//! and stop promptly, leaving queued frames unprocessed. Starting a new scan
//! through the same scanner revokes the in-flight one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::dedup::{DedupConfig, Deduplicator};
use crate::detect::detector::DetectionParams;
use crate::error::Result;
use crate::frame::Frame;
use crate::processor::FrameProcessor;
use crate::source::VideoSource;
use crate::store::{PlateCrop, ResultStore};

/// Cooperative cancellation handle. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-scan options.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub params: DetectionParams,
    /// Process every Nth frame. Trades latency for throughput on long
    /// videos.
    pub stride: u32,
    /// Bound of the decode-to-detect queue.
    pub queue_depth: usize,
    pub dedup: DedupConfig,
    /// Downscale decoded frames to at most this width before detection.
    pub max_width: Option<u32>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            params: DetectionParams::default(),
            stride: 2,
            queue_depth: 8,
            dedup: DedupConfig::default(),
            max_width: Some(640),
        }
    }
}

/// Drives scans over video sources, feeding the shared result store.
pub struct VideoScanner {
    processor: Arc<FrameProcessor>,
    store: Arc<ResultStore>,
    active: Mutex<Option<CancelToken>>,
}

impl VideoScanner {
    pub fn new(processor: FrameProcessor, store: Arc<ResultStore>) -> Self {
        Self {
            processor: Arc::new(processor),
            store,
            active: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Start scanning a source. Any in-flight scan on this scanner is
    /// cancelled first. The returned stream yields each accepted crop as it
    /// is committed; end-of-stream ends the iteration normally, a source
    /// failure surfaces once as `Err` and ends it.
    pub fn scan(&self, source: VideoSource, opts: ScanOptions, cancel: CancelToken) -> ScanStream {
        {
            let mut active = match self.active.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(previous) = active.replace(cancel.clone()) {
                previous.cancel();
            }
        }
        log::info!("scan starting: {} (stride {})", source.name(), opts.stride.max(1));
        ScanStream::start(
            self.processor.clone(),
            self.store.clone(),
            source,
            opts,
            cancel,
        )
    }
}

/// Lazy sequence of accepted plate crops for one scan.
pub struct ScanStream {
    rx: Receiver<Result<Frame>>,
    processor: Arc<FrameProcessor>,
    store: Arc<ResultStore>,
    dedup: Deduplicator,
    params: DetectionParams,
    max_width: Option<u32>,
    pending: VecDeque<PlateCrop>,
    cancel: CancelToken,
    accepted: u64,
    done: bool,
    decode_join: Option<JoinHandle<()>>,
}

impl ScanStream {
    fn start(
        processor: Arc<FrameProcessor>,
        store: Arc<ResultStore>,
        mut source: VideoSource,
        opts: ScanOptions,
        cancel: CancelToken,
    ) -> Self {
        let stride = opts.stride.max(1) as u64;
        let (tx, rx) = sync_channel::<Result<Frame>>(opts.queue_depth.max(1));

        let decode_cancel = cancel.clone();
        let decode_join = std::thread::spawn(move || {
            let mut decoded: u64 = 0;
            loop {
                if decode_cancel.is_cancelled() {
                    break;
                }
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        let sampled = decoded % stride == 0;
                        decoded += 1;
                        if !sampled {
                            continue;
                        }
                        // Blocks when the queue is full; a dropped receiver
                        // ends the stage.
                        if tx.send(Ok(frame)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        log::debug!("source drained after {decoded} frame(s)");
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Self {
            rx,
            processor,
            store,
            dedup: Deduplicator::new(opts.dedup.clone().with_stride(opts.stride.max(1))),
            params: opts.params,
            max_width: opts.max_width,
            pending: VecDeque::new(),
            cancel,
            accepted: 0,
            done: false,
            decode_join: Some(decode_join),
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        let frame = match self.max_width {
            Some(w) => frame.shrink_to_width(w),
            None => frame,
        };
        let candidates = self.processor.process(&frame, &self.params)?;
        for candidate in candidates {
            if !self.dedup.is_novel(&candidate.region) {
                continue;
            }
            let region = candidate.region;
            let id = self.store.add(candidate);
            self.accepted += 1;
            log::info!(
                "plate #{id}: frame {} rect ({}, {}, {}, {})",
                region.frame_index,
                region.rect.x,
                region.rect.y,
                region.rect.width,
                region.rect.height
            );
            if let Some(crop) = self.store.get(id) {
                self.pending.push_back(crop);
            }
        }
        Ok(())
    }
}

impl Iterator for ScanStream {
    type Item = Result<PlateCrop>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(crop) = self.pending.pop_front() {
                return Some(Ok(crop));
            }
            if self.done {
                return None;
            }
            if self.cancel.is_cancelled() {
                // Prompt termination: queued frames stay unprocessed.
                self.done = true;
                log::info!("scan cancelled after {} accepted crop(s)", self.accepted);
                return None;
            }
            match self.rx.recv() {
                Err(_) => {
                    self.done = true;
                    log::info!("scan complete: {} accepted crop(s)", self.accepted);
                    return None;
                }
                Ok(Err(e)) => {
                    // Crops accepted so far stay in the store; the caller
                    // may start a fresh scan.
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(Ok(frame)) => {
                    if let Err(e) = self.handle_frame(frame) {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        // Free the queue so a decoder blocked on a full channel can finish
        // its send and observe the cancellation.
        while self.rx.try_recv().is_ok() {}
        if let Some(join) = self.decode_join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detector::Detector;
    use crate::detect::model::CascadeModel;
    use crate::error::Error;
    use crate::source::{SYNTHETIC_PLATE_A, SYNTHETIC_PLATE_B};
    use std::path::Path;
    use std::sync::Arc;

    fn plate_cascade() -> Arc<CascadeModel> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/plate_cascade.json");
        Arc::new(CascadeModel::load(path).unwrap())
    }

    fn scanner() -> VideoScanner {
        let processor = FrameProcessor::new(Detector::new(plate_cascade()));
        VideoScanner::new(processor, Arc::new(ResultStore::new()))
    }

    fn options() -> ScanOptions {
        ScanOptions {
            params: DetectionParams {
                scale_step: 1.1,
                min_neighbors: 3,
                min_size: (20, 10),
            },
            stride: 1,
            queue_depth: 4,
            dedup: DedupConfig::default(),
            max_width: None,
        }
    }

    #[test]
    fn two_plate_clip_yields_two_crops() {
        let scanner = scanner();
        let source = VideoSource::open("synthetic://clip?frames=10").unwrap();
        let crops: Vec<PlateCrop> = scanner
            .scan(source, options(), CancelToken::new())
            .map(|item| item.unwrap())
            .collect();

        assert_eq!(crops.len(), 2);
        assert_eq!(scanner.store().len(), 2);
        assert!(crops[0].region.rect.iou(&SYNTHETIC_PLATE_A) > 0.5);
        assert!(crops[1].region.rect.iou(&SYNTHETIC_PLATE_B) > 0.5);
        assert!(crops[0].region.frame_index < crops[1].region.frame_index);
    }

    #[test]
    fn stride_still_finds_both_plates() {
        let scanner = scanner();
        let source = VideoSource::open("synthetic://clip?frames=20").unwrap();
        let mut opts = options();
        opts.stride = 3;
        let crops: Vec<PlateCrop> = scanner
            .scan(source, opts, CancelToken::new())
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(crops.len(), 2);
    }

    #[test]
    fn pre_cancelled_scan_yields_nothing() {
        let scanner = scanner();
        let source = VideoSource::open("synthetic://clip?frames=50").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let crops: Vec<_> = scanner.scan(source, options(), cancel).collect();
        assert!(crops.is_empty());
        assert_eq!(scanner.store().len(), 0);
    }

    #[test]
    fn cancelling_mid_scan_terminates_promptly() {
        let scanner = scanner();
        let source = VideoSource::open("synthetic://clip?frames=200").unwrap();
        let cancel = CancelToken::new();
        let mut stream = scanner.scan(source, options(), cancel.clone());

        let first = stream.next().unwrap().unwrap();
        assert!(first.region.rect.iou(&SYNTHETIC_PLATE_A) > 0.5);

        cancel.cancel();
        assert!(stream.next().is_none());
        // The plate accepted before cancellation stays in the store.
        assert_eq!(scanner.store().len(), 1);
    }

    #[test]
    fn starting_a_new_scan_cancels_the_previous_one() {
        let scanner = scanner();
        let first_cancel = CancelToken::new();
        let first = scanner.scan(
            VideoSource::open("synthetic://clip?frames=100").unwrap(),
            options(),
            first_cancel.clone(),
        );

        let second = scanner.scan(
            VideoSource::open("synthetic://clip?frames=10").unwrap(),
            options(),
            CancelToken::new(),
        );
        assert!(first_cancel.is_cancelled());

        drop(first);
        let crops: Vec<_> = second.map(|item| item.unwrap()).collect();
        assert_eq!(crops.len(), 2);
    }

    #[test]
    fn dropping_an_unconsumed_stream_does_not_hang() {
        let scanner = scanner();
        let source = VideoSource::open("synthetic://clip?frames=500").unwrap();
        let mut opts = options();
        opts.queue_depth = 1;
        let stream = scanner.scan(source, opts, CancelToken::new());
        drop(stream);
    }

    #[test]
    fn source_failure_ends_the_scan_but_keeps_prior_crops() {
        let dir = tempfile::tempdir().unwrap();
        // One good frame with a plate, then an undecodable one.
        let mut image = image::RgbImage::from_pixel(320, 240, image::Rgb([170, 170, 170]));
        crate::source::draw_plate_pattern(&mut image, &SYNTHETIC_PLATE_A);
        image.save(dir.path().join("frame_000.png")).unwrap();
        std::fs::write(dir.path().join("frame_001.png"), b"garbage").unwrap();

        let scanner = scanner();
        let source = VideoSource::open(dir.path().to_str().unwrap()).unwrap();
        let mut stream = scanner.scan(source, options(), CancelToken::new());

        let first = stream.next().unwrap();
        assert!(first.is_ok());
        let second = stream.next().unwrap();
        assert!(matches!(second, Err(Error::SourceRead { .. })));
        assert!(stream.next().is_none());
        assert_eq!(scanner.store().len(), 1);
    }
}
