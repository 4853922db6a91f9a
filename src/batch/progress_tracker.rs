//! # Progress Tracking Module
//!
//! Turns batch events into user feedback: an `indicatif` bar in human
//! mode, JSON lines in machine mode.

use crate::batch::{BatchEvent, BatchStatus};
use crate::json_output::JsonMessage;
use crate::progress::{describe_result, BatchStats, ProgressManager};
use tracing::{info, warn};

/// Consumes `BatchEvent`s on the presentation side
pub struct ProgressTracker {
    json_output: bool,
    stats: BatchStats,
    bar: Option<ProgressManager>,
}

impl ProgressTracker {
    pub fn new(json_output: bool) -> Self {
        Self {
            json_output,
            stats: BatchStats::new(),
            bar: None,
        }
    }

    /// Tracker that never draws a bar
    pub fn hidden() -> Self {
        Self {
            json_output: false,
            stats: BatchStats::new(),
            bar: Some(ProgressManager::hidden(0)),
        }
    }

    /// React to one event
    pub fn handle(&mut self, event: BatchEvent) {
        if self.json_output {
            for message in self.json_messages(event) {
                message.emit();
            }
        } else {
            self.update_bar(event);
        }
    }

    /// Running statistics over the results seen so far
    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// JSON lines for an event. `Started` has none: the caller emits `start`
    /// itself because it knows the inputs and settings.
    pub fn json_messages(&mut self, event: BatchEvent) -> Vec<JsonMessage> {
        match event {
            BatchEvent::Started { .. } => Vec::new(),
            BatchEvent::FileFinished {
                completed,
                total,
                result,
            } => {
                self.stats.record(&result);
                vec![
                    JsonMessage::file_complete(result),
                    JsonMessage::progress(completed, total, &self.stats),
                ]
            }
            BatchEvent::Cancelled { skipped } => vec![JsonMessage::Cancelled { skipped }],
            BatchEvent::Done(summary) => vec![JsonMessage::complete(&summary)],
        }
    }

    fn update_bar(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::Started { total } => {
                if self.bar.is_none() {
                    self.bar = Some(ProgressManager::new(total as u64));
                }
            }
            BatchEvent::FileFinished { completed, result, .. } => {
                self.stats.record(&result);
                if !result.success {
                    warn!("{}", result.message);
                }
                if let Some(ref bar) = self.bar {
                    bar.update(completed as u64, &describe_result(&result));
                }
            }
            BatchEvent::Cancelled { skipped } => {
                info!("Cancelled: {} files were not processed", skipped);
            }
            BatchEvent::Done(summary) => {
                let line = summary.stats.format_summary();
                if let Some(ref bar) = self.bar {
                    match summary.status {
                        BatchStatus::Completed => bar.finish(&line),
                        BatchStatus::Cancelled => bar.abandon(&line),
                    }
                }
                info!(
                    "{} in {:.1}s: {}",
                    match summary.status {
                        BatchStatus::Completed => "Completed",
                        BatchStatus::Cancelled => "Cancelled",
                    },
                    summary.elapsed_seconds,
                    line
                );
            }
        }
    }
}
