//! # Batch Coordinator
//!
//! Runs many files through one shared `Optimizer` with bounded concurrency.
//!
//! ## Dispatch:
//! - A `Semaphore` with one permit per worker bounds the files in flight
//! - The cancellation flag is checked after a permit is obtained and
//!   immediately before each submission; once set, nothing else is submitted
//! - Each file's pipeline runs on `spawn_blocking`; a panicking pipeline is
//!   turned into a failed result
//! - Results flow through an `mpsc` channel to a single consumer loop that
//!   owns the completed counter and the statistics
//!
//! ## Events (in order):
//! `Started`, one `FileFinished` per submitted file in completion order,
//! `Cancelled` when the flag was set, then `Done`.

pub mod progress_tracker;

pub use progress_tracker::ProgressTracker;

use crate::config::OptimizationConfig;
use crate::optimizer::Optimizer;
use crate::progress::BatchStats;
use crate::result::ProcessResult;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

/// One input file and the configuration it runs with
#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    pub config: Arc<OptimizationConfig>,
}

impl FileTask {
    fn run(&self, optimizer: &Optimizer) -> ProcessResult {
        optimizer.process(&self.path, &self.config)
    }
}

/// Shared cancellation request. Setting it only stops new submissions.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Completed,
    Cancelled,
}

/// Terminal report of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub status: BatchStatus,
    pub total: usize,
    pub submitted: usize,
    pub completed: usize,
    /// Files never submitted because of cancellation
    pub skipped: usize,
    pub stats: BatchStats,
    pub elapsed_seconds: f64,
}

/// Progress notifications delivered to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    FileFinished {
        completed: usize,
        total: usize,
        result: ProcessResult,
    },
    Cancelled {
        skipped: usize,
    },
    Done(BatchSummary),
}

/// Fans files out over a bounded pool of blocking workers
pub struct BatchCoordinator {
    optimizer: Arc<Optimizer>,
    config: Arc<OptimizationConfig>,
    workers: usize,
    cancel: CancelFlag,
}

impl BatchCoordinator {
    pub fn new(optimizer: Arc<Optimizer>, config: OptimizationConfig, workers: usize, cancel: CancelFlag) -> Self {
        Self {
            optimizer,
            config: Arc::new(config),
            workers: workers.max(1),
            cancel,
        }
    }

    /// Process `files`, reporting through `events`, and return the final summary.
    ///
    /// Every submitted file yields exactly one `FileFinished`. Events are
    /// dropped silently if the receiver is gone.
    pub async fn run(&self, files: Vec<PathBuf>, events: mpsc::UnboundedSender<BatchEvent>) -> BatchSummary {
        let start_time = Instant::now();
        let total = files.len();
        let _ = events.send(BatchEvent::Started { total });
        info!("Processing {} files with {} workers", total, self.workers);

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ProcessResult>();
        let dispatcher = tokio::spawn(dispatch(
            files,
            Arc::clone(&self.optimizer),
            Arc::clone(&self.config),
            Arc::new(Semaphore::new(self.workers)),
            self.cancel.clone(),
            result_tx,
        ));

        let mut completed = 0;
        let mut stats = BatchStats::new();
        while let Some(result) = result_rx.recv().await {
            completed += 1;
            stats.record(&result);
            let _ = events.send(BatchEvent::FileFinished {
                completed,
                total,
                result,
            });
        }

        let submitted = match dispatcher.await {
            Ok(submitted) => submitted,
            Err(e) => {
                error!("Dispatcher task failed: {}", e);
                completed
            }
        };

        let skipped = total - submitted;
        let status = if self.cancel.is_cancelled() {
            info!("Batch cancelled: {} files not submitted", skipped);
            let _ = events.send(BatchEvent::Cancelled { skipped });
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };

        let summary = BatchSummary {
            status,
            total,
            submitted,
            completed,
            skipped,
            stats,
            elapsed_seconds: start_time.elapsed().as_secs_f64(),
        };
        debug!("Batch summary: {:?}", summary);
        let _ = events.send(BatchEvent::Done(summary.clone()));
        summary
    }
}

/// Submit files in order until done or cancelled; returns how many were submitted
async fn dispatch(
    files: Vec<PathBuf>,
    optimizer: Arc<Optimizer>,
    config: Arc<OptimizationConfig>,
    semaphore: Arc<Semaphore>,
    cancel: CancelFlag,
    results: mpsc::UnboundedSender<ProcessResult>,
) -> usize {
    let mut submitted = 0;

    for path in files {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        if cancel.is_cancelled() {
            debug!("Cancellation observed before {}", path.display());
            break;
        }

        let task = FileTask {
            path,
            config: Arc::clone(&config),
        };
        let optimizer = Arc::clone(&optimizer);
        let results = results.clone();
        submitted += 1;

        tokio::spawn(async move {
            let path = task.path.clone();
            let handle = tokio::task::spawn_blocking(move || task.run(&optimizer));
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Worker failed on {}: {}", path.display(), e);
                    let original_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    ProcessResult::failed(&path, original_size, format!("Unexpected worker failure: {}", e))
                }
            };
            drop(permit);
            let _ = results.send(result);
        });
    }

    submitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post_process::{NoPostProcess, PostProcessOutcome, PostProcessor};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_jpeg(path: &Path) {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([120, 60, 30])))
            .save_with_format(path, ImageFormat::Jpeg)
            .unwrap();
    }

    fn images(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("img_{}.jpg", i));
                write_jpeg(&path);
                path
            })
            .collect()
    }

    fn coordinator(post: Arc<dyn PostProcessor>, workers: usize, cancel: CancelFlag) -> BatchCoordinator {
        let optimizer = Arc::new(Optimizer::with_post_processor(post, None));
        BatchCoordinator::new(optimizer, OptimizationConfig::default(), workers, cancel)
    }

    async fn run_collect(coordinator: &BatchCoordinator, files: Vec<PathBuf>) -> (BatchSummary, Vec<BatchEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = coordinator.run(files, tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (summary, events)
    }

    fn finished(events: &[BatchEvent]) -> Vec<(usize, usize, &ProcessResult)> {
        events
            .iter()
            .filter_map(|event| match event {
                BatchEvent::FileFinished {
                    completed,
                    total,
                    result,
                } => Some((*completed, *total, result)),
                _ => None,
            })
            .collect()
    }

    /// Cancels the batch the first time it runs
    struct CancelOnFirst(CancelFlag);

    impl PostProcessor for CancelOnFirst {
        fn apply(&self, _path: &Path, _config: &OptimizationConfig) -> PostProcessOutcome {
            self.0.cancel();
            PostProcessOutcome::NotApplicable
        }
    }

    /// Records the highest number of concurrent calls
    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PostProcessor for InFlight {
        fn apply(&self, _path: &Path, _config: &OptimizationConfig) -> PostProcessOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            self.current.fetch_sub(1, Ordering::SeqCst);
            PostProcessOutcome::NotApplicable
        }
    }

    struct Explodes;

    impl PostProcessor for Explodes {
        fn apply(&self, path: &Path, _config: &OptimizationConfig) -> PostProcessOutcome {
            if path.to_string_lossy().contains("img_1") {
                panic!("tool crashed");
            }
            PostProcessOutcome::NotApplicable
        }
    }

    #[tokio::test]
    async fn test_one_bad_file_does_not_affect_others() {
        let temp_dir = TempDir::new().unwrap();
        let mut files = images(temp_dir.path(), 3);
        let corrupt = temp_dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"not really a png").unwrap();
        files.insert(1, corrupt.clone());

        let coordinator = coordinator(Arc::new(NoPostProcess), 2, CancelFlag::new());
        let (summary, events) = run_collect(&coordinator, files).await;

        assert_eq!(summary.status, BatchStatus::Completed);
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.stats.files_succeeded, 3);
        assert_eq!(summary.stats.errors, 1);

        let finished = finished(&events);
        assert_eq!(finished.len(), 4);
        let failures: Vec<_> = finished.iter().filter(|(_, _, r)| !r.success).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].2.path, corrupt);
        assert!(failures[0].2.message.contains("corrupt.png"));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let files = images(temp_dir.path(), 6);

        let coordinator = coordinator(Arc::new(NoPostProcess), 3, CancelFlag::new());
        let (_, events) = run_collect(&coordinator, files).await;

        assert_eq!(events.first(), Some(&BatchEvent::Started { total: 6 }));
        assert!(matches!(events.last(), Some(BatchEvent::Done(_))));

        let counts: Vec<usize> = finished(&events).iter().map(|(c, _, _)| *c).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 6]);
        assert!(finished(&events).iter().all(|(_, total, _)| *total == 6));
    }

    #[tokio::test]
    async fn test_cancel_before_start_submits_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let files = images(temp_dir.path(), 10);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let coordinator = coordinator(Arc::new(NoPostProcess), 4, cancel);
        let (summary, events) = run_collect(&coordinator, files).await;

        assert_eq!(summary.status, BatchStatus::Cancelled);
        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.skipped, 10);
        assert!(finished(&events).is_empty());
        assert!(events.contains(&BatchEvent::Cancelled { skipped: 10 }));
        assert!(!temp_dir.path().join("optimized").exists());
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_lets_submitted_files_finish() {
        let temp_dir = TempDir::new().unwrap();
        let files = images(temp_dir.path(), 5);
        let cancel = CancelFlag::new();

        let coordinator = coordinator(Arc::new(CancelOnFirst(cancel.clone())), 1, cancel);
        let (summary, events) = run_collect(&coordinator, files).await;

        assert_eq!(summary.status, BatchStatus::Cancelled);
        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped, 4);
        assert_eq!(finished(&events).len(), 1);
        assert!(finished(&events)[0].2.success);
    }

    #[tokio::test]
    async fn test_cancel_after_everything_submitted() {
        let temp_dir = TempDir::new().unwrap();
        let files = images(temp_dir.path(), 1);
        let cancel = CancelFlag::new();

        let coordinator = coordinator(Arc::new(CancelOnFirst(cancel.clone())), 4, cancel);
        let (summary, events) = run_collect(&coordinator, files).await;

        assert_eq!(summary.status, BatchStatus::Cancelled);
        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(finished(&events).len(), 1);
        assert!(events.contains(&BatchEvent::Cancelled { skipped: 0 }));
    }

    #[tokio::test]
    async fn test_never_more_than_workers_in_flight() {
        let temp_dir = TempDir::new().unwrap();
        let files = images(temp_dir.path(), 8);
        let probe = Arc::new(InFlight::default());

        let coordinator = coordinator(probe.clone(), 2, CancelFlag::new());
        let (summary, _) = run_collect(&coordinator, files).await;

        assert_eq!(summary.completed, 8);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 2, "peak in flight: {}", peak);
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_failed_result() {
        let temp_dir = TempDir::new().unwrap();
        let files = images(temp_dir.path(), 3);

        let coordinator = coordinator(Arc::new(Explodes), 2, CancelFlag::new());
        let (summary, events) = run_collect(&coordinator, files).await;

        assert_eq!(summary.completed, 3);
        assert_eq!(summary.stats.errors, 1);
        let failed: Vec<_> = finished(&events).into_iter().filter(|(_, _, r)| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].2.message.starts_with("Unexpected worker failure"));
        assert_eq!(
            failed[0].2.original_size,
            std::fs::metadata(&failed[0].2.path).unwrap().len()
        );
        assert!(failed[0].2.original_size > 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let coordinator = coordinator(Arc::new(NoPostProcess), 4, CancelFlag::new());
        let (summary, events) = run_collect(&coordinator, Vec::new()).await;

        assert_eq!(summary.status, BatchStatus::Completed);
        assert_eq!(summary.total, 0);
        assert_eq!(events.len(), 2);
    }
}
