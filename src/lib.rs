//! # Image Optimizer Library
//!
//! Batch image optimization: resize, convert and re-encode images, then
//! squeeze them further with external command-line tools.
//!
//! ## Module layout:
//! - `config`: persisted settings, validation, per-run configuration
//! - `error`: custom error types
//! - `file_manager`: input discovery, atomic writes, size helpers
//! - `optimizer`: the single-file pipeline
//! - `post_process`: external tool capability (jpegoptim, pngquant, svgo, scour)
//! - `tool_resolver`: where those tools are found
//! - `batch`: bounded-concurrency coordinator with cancellation
//! - `result`: per-file result object
//! - `progress`, `json_output`: presentation helpers
//!
//! ## Usage:
//! ```rust,no_run
//! use image_optimizer::{BatchCoordinator, CancelFlag, FileManager, Optimizer, Settings};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let run = Settings::default().validate()?;
//! let files = FileManager::collect_inputs(&[PathBuf::from("/photos")], run.include_svg);
//! let coordinator = BatchCoordinator::new(
//!     Arc::new(Optimizer::new()),
//!     run.optimization,
//!     run.workers,
//!     CancelFlag::new(),
//! );
//! let (events, _receiver) = tokio::sync::mpsc::unbounded_channel();
//! let summary = coordinator.run(files, events).await;
//! println!("{}", summary.stats.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod post_process;
pub mod progress;
pub mod result;
pub mod tool_resolver;

pub use batch::{BatchCoordinator, BatchEvent, BatchStatus, BatchSummary, CancelFlag, FileTask};
pub use config::{OptimizationConfig, RunConfig, Settings, TargetFormat};
pub use error::{ConfigError, OptimizeError};
pub use file_manager::FileManager;
pub use optimizer::Optimizer;
pub use post_process::{ExternalTools, PostProcessOutcome, PostProcessor};
pub use progress::BatchStats;
pub use result::ProcessResult;
pub use tool_resolver::ToolResolver;
