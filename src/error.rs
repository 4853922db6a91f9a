//! # Error Types Module
//!
//! Custom error types for the optimization pipeline.
//!
//! ## Categories:
//! - `OptimizeError`: per-file failures. They never leave the `Optimizer`;
//!   each one is rendered into the `message` of a failed `ProcessResult`.
//! - `ConfigError`: invalid settings coming from the presentation layer.
//!   A batch is never started with an invalid configuration.
//!
//! ## Example:
//! ```rust,ignore
//! if !path.exists() {
//!     return Err(OptimizeError::NotFound(path.to_path_buf()));
//! }
//! ```

use std::path::PathBuf;

/// Failures of the single-file pipeline
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Cannot encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Invalid file name: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}

impl OptimizeError {
    /// Attach a path and the attempted action to an I/O error
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Configuration rejected before a batch starts
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Quality must be between 1 and 100 (got {0})")]
    Quality(u8),

    #[error("Number of workers must be between 1 and 32 (got {0})")]
    Workers(usize),

    #[error("Invalid max size '{0}': expected a pixel count like 1920 or WxH like 1920x1080")]
    MaxSize(String),

    #[error("Unknown output format '{0}': expected jpg, png, webp or Keep Original")]
    Format(String),

    #[error("Unknown mode '{0}': expected Lossy or Lossless")]
    Mode(String),

    #[error("Output path is not a directory: {}", .0.display())]
    OutputNotDirectory(PathBuf),
}
