use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use image::{GrayImage, ImageBuffer, Luma};
use section_batch::{
    BatchError, BatchPaths, BatchRunner, RunnerOptions, SectionJob, ValidationRules,
};
use section_mask::{MaskSource, Pipeline, SectionImage, SectionMask};
use tempfile::TempDir;

type Gray16 = ImageBuffer<Luma<u16>, Vec<u16>>;

fn write_section(dir: &Path, name: &str) {
    let img = Gray16::from_fn(400, 300, |x, y| {
        if (175..225).contains(&x) && (125..175).contains(&y) {
            Luma([30000u16])
        } else {
            Luma([100u16])
        }
    });
    img.save(dir.join(name)).expect("Should save section");
}

fn write_blank(dir: &Path, name: &str) {
    Gray16::new(400, 300)
        .save(dir.join(name))
        .expect("Should save blank section");
}

struct Workspace {
    _root: TempDir,
    paths: BatchPaths,
}

fn workspace(names: &[&str]) -> Workspace {
    let root = tempfile::tempdir().expect("Should create temp dir");
    let paths = BatchPaths {
        input_dir: root.path().join("CH1/thumbnail"),
        mask_dir: root.path().join("masks/thumbnail_masked"),
        output_dir: root.path().join("CH1/thumbnail_cleaned"),
    };
    std::fs::create_dir_all(&paths.input_dir).expect("Should create input dir");
    for name in names {
        write_section(&paths.input_dir, name);
    }
    Workspace { _root: root, paths }
}

fn runner(pipeline: Pipeline) -> BatchRunner {
    BatchRunner::new(
        pipeline,
        RunnerOptions {
            workers: 2,
            timeout: Duration::from_secs(60),
            validation: None,
        },
    )
}

#[tokio::test]
async fn test_mask_then_clean() {
    let ws = workspace(&["001.png", "002.png", "003.png"]);
    let runner = runner(Pipeline::builder().build());

    let summary = runner
        .run(SectionJob::Mask, ws.paths.clone())
        .await
        .expect("Mask batch should run");
    assert_eq!(summary.processed, 3, "{summary}");
    assert!(summary.is_success());

    let mask = image::open(ws.paths.mask_dir.join("002.png"))
        .expect("Mask should be written")
        .to_luma8();
    assert_eq!(mask.dimensions(), (400, 300));
    assert_eq!(mask.get_pixel(200, 150)[0], 255);
    assert_eq!(mask.get_pixel(10, 10)[0], 0);

    let summary = runner
        .run(SectionJob::Clean, ws.paths.clone())
        .await
        .expect("Clean batch should run");
    assert_eq!(summary.processed, 3, "{summary}");

    let cleaned = SectionImage::open(ws.paths.output_dir.join("001.png"))
        .expect("Cleaned section should be written");
    let SectionImage::Gray16(cleaned) = cleaned else {
        panic!("Cleaned section should stay 16-bit");
    };
    assert_eq!(cleaned.get_pixel(200, 150)[0], 30000);
    assert_eq!(cleaned.get_pixel(10, 10)[0], 0);
}

#[tokio::test]
async fn test_full_job_writes_both_outputs() {
    let ws = workspace(&["001.png"]);
    let summary = runner(Pipeline::builder().build())
        .run(SectionJob::Full, ws.paths.clone())
        .await
        .expect("Batch should run");

    assert_eq!(summary.processed, 1, "{summary}");
    assert!(ws.paths.mask_dir.join("001.png").is_file());
    assert!(ws.paths.output_dir.join("001.png").is_file());
}

#[tokio::test]
async fn test_rerun_skips_existing_outputs() {
    let ws = workspace(&["001.png", "002.png"]);
    let runner = runner(Pipeline::builder().build());

    runner
        .run(SectionJob::Mask, ws.paths.clone())
        .await
        .expect("First run should succeed");
    let second = runner
        .run(SectionJob::Mask, ws.paths.clone())
        .await
        .expect("Second run should succeed");

    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 2);
}

#[tokio::test]
async fn test_clean_without_masks() {
    let ws = workspace(&["001.png", "002.png"]);
    let summary = runner(Pipeline::builder().build())
        .run(SectionJob::Clean, ws.paths.clone())
        .await
        .expect("Batch should run despite failures");

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failures.len(), 2);
    assert!(summary.failures.iter().all(|f| f.kind == "missing_mask"));
    assert!(!ws.paths.output_dir.join("001.png").exists());
}

#[tokio::test]
async fn test_clean_with_wrong_mask_shape() {
    let ws = workspace(&["001.png"]);
    std::fs::create_dir_all(&ws.paths.mask_dir).expect("Should create mask dir");
    GrayImage::from_pixel(100, 100, Luma([255u8]))
        .save(ws.paths.mask_dir.join("001.png"))
        .expect("Should save mask");

    let summary = runner(Pipeline::builder().build())
        .run(SectionJob::Clean, ws.paths.clone())
        .await
        .expect("Batch should run");

    let failure = summary.failure("001.png").expect("Section should fail");
    assert_eq!(failure.kind, "shape_mismatch");
}

#[tokio::test]
async fn test_failure_is_isolated() {
    let ws = workspace(&["001.png", "003.png"]);
    write_blank(&ws.paths.input_dir, "002.png");

    let summary = runner(Pipeline::builder().build())
        .run(SectionJob::Mask, ws.paths.clone())
        .await
        .expect("Batch should run");

    assert_eq!(summary.processed, 2, "{summary}");
    let failure = summary.failure("002.png").expect("Blank section should fail");
    assert_eq!(failure.kind, "no_blob_found");
    assert!(ws.paths.mask_dir.join("001.png").is_file());
    assert!(!ws.paths.mask_dir.join("002.png").exists());
}

#[tokio::test]
async fn test_validation_blocks_batch() {
    let ws = workspace(&["001.png", "002.png"]);
    let runner = BatchRunner::new(
        Pipeline::builder().build(),
        RunnerOptions {
            validation: Some(ValidationRules::default().with_expected_count(5)),
            ..RunnerOptions::default()
        },
    );

    let error = runner
        .run(SectionJob::Mask, ws.paths.clone())
        .await
        .expect_err("Validation should fail");
    let BatchError::Validation(report) = error else {
        panic!("Expected a validation error, got {error}");
    };
    assert_eq!(report.files_checked, 2);
    assert!(!ws.paths.mask_dir.exists());
}

struct SlowSource;

impl MaskSource for SlowSource {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn extract_mask(&self, _name: &str, image: &SectionImage) -> section_mask::Result<SectionMask> {
        std::thread::sleep(Duration::from_millis(1500));
        let (width, height) = image.dimensions();
        Ok(SectionMask::new(GrayImage::new(width, height)))
    }
}

#[tokio::test]
async fn test_slow_section_times_out() {
    let ws = workspace(&["001.png"]);
    let runner = BatchRunner::new(
        Pipeline::builder().mask_source(SlowSource).build(),
        RunnerOptions {
            timeout: Duration::from_millis(100),
            ..RunnerOptions::default()
        },
    );

    let summary = runner
        .run(SectionJob::Mask, ws.paths.clone())
        .await
        .expect("Batch should run");
    let failure = summary.failure("001.png").expect("Section should time out");
    assert_eq!(failure.kind, "timeout");
}

/// Slow source that records how many extractions overlap
#[derive(Clone, Default)]
struct CountingSource {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MaskSource for CountingSource {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn extract_mask(&self, _name: &str, image: &SectionImage) -> section_mask::Result<SectionMask> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(400));
        self.active.fetch_sub(1, Ordering::SeqCst);
        let (width, height) = image.dimensions();
        Ok(SectionMask::new(GrayImage::new(width, height)))
    }
}

#[tokio::test]
async fn test_timed_out_work_keeps_its_worker() {
    let ws = workspace(&["001.png", "002.png", "003.png"]);
    let source = CountingSource::default();
    let runner = BatchRunner::new(
        Pipeline::builder().mask_source(source.clone()).build(),
        RunnerOptions {
            workers: 1,
            timeout: Duration::from_millis(50),
            validation: None,
        },
    );

    let summary = runner
        .run(SectionJob::Mask, ws.paths.clone())
        .await
        .expect("Batch should run");
    assert_eq!(summary.failures.len(), 3, "{summary}");
    assert!(summary.failures.iter().all(|f| f.kind == "timeout"));
    assert_eq!(source.peak.load(Ordering::SeqCst), 1);
}

struct PanickingSource;

impl MaskSource for PanickingSource {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn extract_mask(&self, name: &str, image: &SectionImage) -> section_mask::Result<SectionMask> {
        if name == "002.png" {
            panic!("corrupt section {name}");
        }
        let (width, height) = image.dimensions();
        Ok(SectionMask::new(GrayImage::from_pixel(width, height, Luma([255u8]))))
    }
}

#[tokio::test]
async fn test_panic_is_captured() {
    let ws = workspace(&["001.png", "002.png", "003.png"]);
    let summary = runner(Pipeline::builder().mask_source(PanickingSource).build())
        .run(SectionJob::Mask, ws.paths.clone())
        .await
        .expect("Batch should run");

    assert_eq!(summary.processed, 2);
    let failure = summary.failure("002.png").expect("Section should fail");
    assert_eq!(failure.kind, "task_panicked");
    assert!(failure.message.contains("corrupt section 002.png"));
}

#[tokio::test]
async fn test_full_job_cleans_siblings_of_a_failed_section() {
    let ws = workspace(&["001.png", "003.png"]);
    write_blank(&ws.paths.input_dir, "002.png");

    let summary = runner(Pipeline::builder().build())
        .run(SectionJob::Full, ws.paths.clone())
        .await
        .expect("Batch should run");

    assert_eq!(summary.processed, 2, "{summary}");
    assert_eq!(
        summary.failure("002.png").map(|f| f.kind.as_str()),
        Some("no_blob_found")
    );
    for name in ["001.png", "003.png"] {
        assert!(ws.paths.mask_dir.join(name).is_file());
        assert!(ws.paths.output_dir.join(name).is_file());
    }
    assert!(!ws.paths.output_dir.join("002.png").exists());
}
