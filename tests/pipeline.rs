//! End-to-end pipeline properties, driven through the public API only.

mod common;

use std::sync::Arc;

use platescan::source::{draw_plate_pattern, SYNTHETIC_PLATE_A, SYNTHETIC_PLATE_B};
use platescan::{
    CancelToken, DedupConfig, Detector, Frame, FrameProcessor, PlateCrop, Rect, ResultStore,
    ScanOptions, VideoScanner, VideoSource,
};

use common::{background, test_model, test_params};

fn scan_options() -> ScanOptions {
    ScanOptions {
        params: test_params(),
        stride: 1,
        queue_depth: 4,
        dedup: DedupConfig::default(),
        max_width: None,
    }
}

#[test]
fn still_image_with_one_pattern_yields_exactly_one_crop() {
    let plate = Rect::new(100, 80, 48, 24);
    let mut image = background(320, 240);
    draw_plate_pattern(&mut image, &plate);
    let frame = Frame::new(image, 0);

    let processor = FrameProcessor::new(Detector::new(test_model()));
    let candidates = processor.process(&frame, &test_params()).unwrap();

    assert_eq!(candidates.len(), 1, "expected exactly one detection");
    let region = candidates[0].region.rect;
    assert!((region.x as i64 - plate.x as i64).abs() <= 4);
    assert!((region.y as i64 - plate.y as i64).abs() <= 4);
    assert!((region.width as i64 - plate.width as i64).abs() <= 6);
    assert!((region.height as i64 - plate.height as i64).abs() <= 6);
    assert_eq!(
        candidates[0].image.dimensions(),
        (region.width, region.height)
    );
}

#[test]
fn plain_background_yields_no_crops() {
    let frame = Frame::new(background(320, 240), 0);
    let processor = FrameProcessor::new(Detector::new(test_model()));
    assert!(processor.process(&frame, &test_params()).unwrap().is_empty());
}

#[test]
fn ten_frame_sequence_with_two_plates_yields_two_crops() {
    // Frames 0-4 hold one plate unmoved, frames 5-9 a second one elsewhere.
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10u32 {
        let mut image = background(320, 240);
        let plate = if i < 5 {
            SYNTHETIC_PLATE_A
        } else {
            SYNTHETIC_PLATE_B
        };
        draw_plate_pattern(&mut image, &plate);
        image
            .save(dir.path().join(format!("frame_{i:03}.png")))
            .unwrap();
    }

    let store = Arc::new(ResultStore::new());
    let scanner = VideoScanner::new(
        FrameProcessor::new(Detector::new(test_model())),
        store.clone(),
    );
    let source = VideoSource::open(dir.path().to_str().unwrap()).unwrap();

    let crops: Vec<PlateCrop> = scanner
        .scan(source, scan_options(), CancelToken::new())
        .map(|item| item.unwrap())
        .collect();

    assert_eq!(crops.len(), 2);
    assert_eq!(store.len(), 2);
    assert!(crops[0].region.rect.iou(&SYNTHETIC_PLATE_A) > 0.5);
    assert!(crops[1].region.rect.iou(&SYNTHETIC_PLATE_B) > 0.5);
    assert!(crops[0].id < crops[1].id);

    // The store snapshot enumerates in detection order.
    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].id, crops[0].id);
    assert_eq!(snapshot[1].id, crops[1].id);

    // Bulk export writes one file per accepted crop.
    let out = dir.path().join("crops");
    let report = store.save_all(&out).unwrap();
    assert_eq!(report.written, 2);
    assert!(report.failed.is_empty());
}

#[test]
fn identifiers_survive_clear_across_scans() {
    let store = Arc::new(ResultStore::new());
    let scanner = VideoScanner::new(
        FrameProcessor::new(Detector::new(test_model())),
        store.clone(),
    );

    let first: Vec<u64> = scanner
        .scan(
            VideoSource::open("synthetic://first?frames=10").unwrap(),
            scan_options(),
            CancelToken::new(),
        )
        .map(|item| item.unwrap().id)
        .collect();
    assert_eq!(first.len(), 2);

    store.clear();
    assert!(store.is_empty());

    let second: Vec<u64> = scanner
        .scan(
            VideoSource::open("synthetic://second?frames=10").unwrap(),
            scan_options(),
            CancelToken::new(),
        )
        .map(|item| item.unwrap().id)
        .collect();
    assert_eq!(second.len(), 2);

    // No identifier issued before the clear is ever reused.
    for id in &second {
        assert!(first.iter().all(|old| id > old));
    }
}
