//! End-to-end tests through the public library API

use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use image_optimizer::{
    BatchCoordinator, BatchEvent, BatchStatus, BatchSummary, CancelFlag, FileManager, OptimizationConfig,
    Optimizer, PostProcessOutcome, PostProcessor, ProcessResult, TargetFormat,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Post-processor that leaves every file alone, so results do not depend on installed tools
struct Untouched;

impl PostProcessor for Untouched {
    fn apply(&self, _path: &Path, _config: &OptimizationConfig) -> PostProcessOutcome {
        PostProcessOutcome::Unavailable
    }
}

fn optimizer() -> Arc<Optimizer> {
    Arc::new(Optimizer::with_post_processor(Arc::new(Untouched), None))
}

fn photo(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x / 16) as u8, (y / 16) as u8, ((x + y) / 32) as u8])
    }))
}

fn run_batch(
    files: Vec<PathBuf>,
    config: OptimizationConfig,
    workers: usize,
    cancel: CancelFlag,
) -> (BatchSummary, Vec<ProcessResult>) {
    let coordinator = BatchCoordinator::new(optimizer(), config, workers, cancel);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let summary = tokio_test::block_on(coordinator.run(files, tx));

    let mut results = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let BatchEvent::FileFinished { result, .. } = event {
            results.push(result);
        }
    }
    (summary, results)
}

#[test]
fn test_large_jpeg_is_bounded() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("large.jpg");
    photo(4000, 3000).save_with_format(&input, ImageFormat::Jpeg).unwrap();

    let config = OptimizationConfig {
        max_size: Some(1024),
        quality: 80,
        ..Default::default()
    };
    let result = optimizer().process(&input, &config);

    assert!(result.success, "{}", result.message);
    let output = result.output_path.clone().unwrap();
    let decoded = image::open(&output).unwrap();
    assert_eq!(decoded.dimensions(), (1024, 768));
    assert_eq!(image::ImageFormat::from_path(&output).unwrap(), ImageFormat::Jpeg);
    assert_eq!(result.new_size, fs::metadata(&output).unwrap().len());
    assert!(result.new_size < result.original_size);
}

#[test]
fn test_png_converted_to_webp() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("chart.png");
    DynamicImage::ImageRgba8(RgbaImage::from_fn(120, 80, |x, _| Rgba([x as u8, 40, 90, 255])))
        .save_with_format(&input, ImageFormat::Png)
        .unwrap();

    let config = OptimizationConfig {
        target_format: Some(TargetFormat::WebP),
        quality: 90,
        ..Default::default()
    };
    let result = optimizer().process(&input, &config);

    assert!(result.success, "{}", result.message);
    let output = result.output_path.clone().unwrap();
    assert_eq!(output, temp_dir.path().join("optimized").join("chart.webp"));
    let bytes = fs::read(&output).unwrap();
    let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP).unwrap();
    assert_eq!(decoded.dimensions(), (120, 80));
}

#[test]
fn test_resize_keeps_aspect_ratio() {
    let temp_dir = TempDir::new().unwrap();
    let cases = [((1000, 3000), 1000, (333, 1000)), ((640, 480), 100, (100, 75)), ((300, 301), 299, (298, 299))];

    for (index, ((width, height), bound, expected)) in cases.into_iter().enumerate() {
        let input = temp_dir.path().join(format!("case_{}.png", index));
        photo(width, height).save_with_format(&input, ImageFormat::Png).unwrap();

        let config = OptimizationConfig {
            max_size: Some(bound),
            output_dir: Some(temp_dir.path().join("out")),
            ..Default::default()
        };
        let result = optimizer().process(&input, &config);
        assert!(result.success, "{}", result.message);
        let output = image::open(result.output_path.unwrap()).unwrap();
        assert_eq!(output.dimensions(), expected);
    }
}

#[test]
fn test_directory_with_corrupt_file() {
    let temp_dir = TempDir::new().unwrap();
    let album = temp_dir.path().join("album");
    fs::create_dir(&album).unwrap();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        photo(64, 48).save_with_format(album.join(name), ImageFormat::Jpeg).unwrap();
    }
    fs::write(album.join("broken.png"), b"\x89PNG but then nothing useful").unwrap();

    let files = FileManager::collect_inputs(&[album.clone()], true);
    assert_eq!(files.len(), 4);

    let (summary, results) = run_batch(files, OptimizationConfig::default(), 2, CancelFlag::new());

    assert_eq!(summary.status, BatchStatus::Completed);
    assert_eq!(summary.completed, 4);
    assert_eq!(results.len(), 4);
    assert_eq!(results.iter().filter(|r| r.success).count(), 3);

    let failure = results.iter().find(|r| !r.success).unwrap();
    assert_eq!(failure.path, album.join("broken.png"));
    assert!(failure.message.starts_with("Cannot decode broken.png"), "{}", failure.message);
    assert_eq!(failure.new_size, 0);

    for result in results.iter().filter(|r| r.success) {
        let output = result.output_path.as_ref().unwrap();
        assert_eq!(result.new_size, fs::metadata(output).unwrap().len());
    }
}

#[test]
fn test_cancel_before_start() {
    let temp_dir = TempDir::new().unwrap();
    let files: Vec<PathBuf> = (0..10)
        .map(|i| {
            let path = temp_dir.path().join(format!("{}.jpg", i));
            photo(16, 16).save_with_format(&path, ImageFormat::Jpeg).unwrap();
            path
        })
        .collect();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let (summary, results) = run_batch(files, OptimizationConfig::default(), 4, cancel);

    assert_eq!(summary.status, BatchStatus::Cancelled);
    assert_eq!(summary.submitted, 0);
    assert_eq!(summary.skipped, 10);
    assert!(results.is_empty());
}

#[test]
fn test_missing_input_reported_not_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let present = temp_dir.path().join("here.jpg");
    photo(16, 16).save_with_format(&present, ImageFormat::Jpeg).unwrap();
    let missing = temp_dir.path().join("gone.jpg");

    let files = FileManager::collect_inputs(&[present, missing.clone()], true);
    let (summary, results) = run_batch(files, OptimizationConfig::default(), 2, CancelFlag::new());

    assert_eq!(summary.completed, 2);
    let failure = results.iter().find(|r| !r.success).unwrap();
    assert_eq!(failure.message, format!("File not found: {}", missing.display()));
}

#[test]
fn test_in_place_without_changes_is_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("keep.jpg");
    photo(50, 50).save_with_format(&input, ImageFormat::Jpeg).unwrap();
    let before = fs::read(&input).unwrap();

    let config = OptimizationConfig {
        overwrite: true,
        target_format: Some(TargetFormat::Jpeg),
        ..Default::default()
    };
    let (summary, results) = run_batch(vec![input.clone()], config, 1, CancelFlag::new());

    assert_eq!(summary.stats.files_succeeded, 1);
    assert_eq!(results[0].output_path.as_deref(), Some(input.as_path()));
    assert_eq!(fs::read(&input).unwrap(), before);
    assert_eq!(summary.stats.total_bytes_saved, 0);
}
