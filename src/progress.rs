//! # Progress Tracking and Statistics Module
//!
//! Progress bar and batch statistics.
//!
//! ## Components:
//! - `ProgressManager`: the `indicatif` bar shown in human mode
//! - `BatchStats`: running totals over delivered `ProcessResult`s
//!
//! ## Tracked statistics:
//! - **files_processed**: results received so far
//! - **files_succeeded** / **errors**: split of the above
//! - **post_process_failures**: successes whose external tool failed
//! - **total_original_size**: bytes of all inputs with a known size
//! - **total_bytes_saved**: sum of strictly positive savings only
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:15] [========================>---------------] 90/150 (60%) [OK] photo.jpg: 45.2% saved
//! ```

use crate::file_manager::FileManager;
use crate::result::{display_name, ProcessResult};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Manages the progress bar for a batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Manager whose bar never draws
    pub fn hidden(total_files: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total_files);
        Self { bar }
    }

    /// Move to `completed` and show a message
    pub fn update(&self, completed: u64, message: &str) {
        self.bar.set_position(completed);
        self.bar.set_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop the bar where it is, keeping the message
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

/// Statistics over the results of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub files_processed: usize,
    pub files_succeeded: usize,
    pub errors: usize,
    pub post_process_failures: usize,
    pub total_original_size: u64,
    pub total_bytes_saved: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one delivered result
    pub fn record(&mut self, result: &ProcessResult) {
        self.files_processed += 1;
        self.total_original_size += result.original_size;

        if result.success {
            self.files_succeeded += 1;
            self.total_bytes_saved += result.bytes_saved();
            if result.post_process.is_failure() {
                self.post_process_failures += 1;
            }
        } else {
            self.errors += 1;
        }
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Processed: {} files | Succeeded: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.files_processed,
            self.files_succeeded,
            self.errors,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        );
        if self.post_process_failures > 0 {
            summary.push_str(&format!(" | Post-process failures: {}", self.post_process_failures));
        }
        summary
    }
}

/// One-line outcome for the progress bar
pub fn describe_result(result: &ProcessResult) -> String {
    if result.success {
        format!("[OK] {}: {:.1}% saved", display_name(&result.path), result.reduction_percent())
    } else {
        format!("[ERROR] {}", result.message)
    }
}
