//! Per-file result object: the contract between the core and any
//! presentation layer (progress bar, JSON lines, log).

use crate::file_manager::FileManager;
use crate::post_process::PostProcessOutcome;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Outcome of one file through the optimizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessResult {
    /// Input path as submitted
    pub path: PathBuf,
    pub success: bool,
    /// Input byte length before any modification (0 if unknown)
    pub original_size: u64,
    /// Output byte length at completion (0 on failure)
    pub new_size: u64,
    pub message: String,
    /// Where the output was written, when processing succeeded
    pub output_path: Option<PathBuf>,
    pub post_process: PostProcessOutcome,
}

impl ProcessResult {
    /// Successful result; the message summarizes the size change
    pub fn succeeded(
        path: &Path,
        output_path: &Path,
        original_size: u64,
        new_size: u64,
        post_process: PostProcessOutcome,
    ) -> Self {
        let mut message = format!(
            "{}: {} -> {} ({:.1}% saved)",
            display_name(path),
            FileManager::format_size(original_size),
            FileManager::format_size(new_size),
            FileManager::calculate_reduction(original_size, new_size),
        );
        if post_process.is_failure() {
            message.push_str(&format!(" [{}]", post_process.describe()));
        }

        Self {
            path: path.to_path_buf(),
            success: true,
            original_size,
            new_size,
            message,
            output_path: Some(output_path.to_path_buf()),
            post_process,
        }
    }

    /// Failed result carrying the rendered error
    pub fn failed(path: &Path, original_size: u64, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            original_size,
            new_size: 0,
            message: message.into(),
            output_path: None,
            post_process: PostProcessOutcome::NotApplicable,
        }
    }

    /// Bytes saved by this file; zero for failures and for files that grew
    pub fn bytes_saved(&self) -> u64 {
        if self.success {
            self.original_size.saturating_sub(self.new_size)
        } else {
            0
        }
    }

    /// `new_size / original_size`, when both are meaningful
    pub fn compression_ratio(&self) -> Option<f64> {
        (self.success && self.original_size > 0)
            .then(|| self.new_size as f64 / self.original_size as f64)
    }

    /// Percentage reduction (negative when the output grew)
    pub fn reduction_percent(&self) -> f64 {
        if self.success {
            FileManager::calculate_reduction(self.original_size, self.new_size)
        } else {
            0.0
        }
    }
}

/// File name for messages, falling back to the full path
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
