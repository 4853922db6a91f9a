//! # JSON Output Module
//!
//! Line-delimited JSON on stdout, for front ends driving the binary as a
//! subprocess. One object per line, tagged by `type`.
//!
//! ## Message types:
//! - `start`: inputs, output directory, file count and effective settings
//! - `file_complete`: the per-file result object
//! - `progress`: completed/total and running totals
//! - `cancelled`: how many files were never submitted
//! - `complete`: terminal summary
//! - `error`: the run could not start (for example, invalid settings)

use crate::batch::{BatchStatus, BatchSummary};
use crate::config::RunConfig;
use crate::progress::BatchStats;
use crate::result::ProcessResult;
use serde::Serialize;
use std::path::PathBuf;

/// JSON message type
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        inputs: Vec<PathBuf>,
        output_dir: Option<PathBuf>,
        total_files: usize,
        config: JsonConfig,
    },

    FileComplete(ProcessResult),

    Progress {
        current: usize,
        total: usize,
        percentage: f64,
        files_succeeded: usize,
        errors: usize,
        bytes_saved: u64,
    },

    Cancelled {
        skipped: usize,
    },

    Complete {
        status: BatchStatus,
        total: usize,
        submitted: usize,
        completed: usize,
        skipped: usize,
        files_succeeded: usize,
        errors: usize,
        post_process_failures: usize,
        total_bytes_saved: u64,
        average_reduction: f64,
        duration_seconds: f64,
    },

    Error {
        message: String,
        details: Option<String>,
    },
}

/// Effective settings echoed in the `start` message
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub quality: u8,
    pub max_size: Option<u32>,
    pub format: Option<&'static str>,
    pub overwrite: bool,
    pub keep_metadata: bool,
    pub workers: usize,
}

impl JsonMessage {
    /// Write the message as one line on stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(inputs: Vec<PathBuf>, total_files: usize, run: &RunConfig) -> Self {
        Self::Start {
            inputs,
            output_dir: run.optimization.output_dir.clone(),
            total_files,
            config: JsonConfig::from(run),
        }
    }

    pub fn file_complete(result: ProcessResult) -> Self {
        Self::FileComplete(result)
    }

    pub fn progress(current: usize, total: usize, stats: &BatchStats) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Self::Progress {
            current,
            total,
            percentage,
            files_succeeded: stats.files_succeeded,
            errors: stats.errors,
            bytes_saved: stats.total_bytes_saved,
        }
    }

    pub fn complete(summary: &BatchSummary) -> Self {
        Self::Complete {
            status: summary.status,
            total: summary.total,
            submitted: summary.submitted,
            completed: summary.completed,
            skipped: summary.skipped,
            files_succeeded: summary.stats.files_succeeded,
            errors: summary.stats.errors,
            post_process_failures: summary.stats.post_process_failures,
            total_bytes_saved: summary.stats.total_bytes_saved,
            average_reduction: summary.stats.overall_reduction_percent(),
            duration_seconds: summary.elapsed_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

impl From<&RunConfig> for JsonConfig {
    fn from(run: &RunConfig) -> Self {
        Self {
            quality: run.optimization.quality,
            max_size: run.optimization.max_size,
            format: run.optimization.target_format.map(|format| format.extension()),
            overwrite: run.optimization.overwrite,
            keep_metadata: run.optimization.keep_metadata,
            workers: run.workers,
        }
    }
}
