//! # Path Resolution Module
//!
//! Output path rules, in one place:
//! - explicit output directory: `<output_dir>/<file name>` (flattened)
//! - overwrite: the input path itself
//! - otherwise: `<input parent>/optimized/<file name>`
//!
//! A configured target format then replaces the extension, whatever the
//! branch above. Output directories are created lazily, once per distinct
//! directory, through `DirectoryCache`.

use crate::config::OptimizationConfig;
use crate::error::OptimizeError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Name of the sibling directory used when neither output dir nor overwrite is set
pub const OPTIMIZED_DIR: &str = "optimized";

/// Utility to compute output locations
pub struct PathResolver;

impl PathResolver {
    /// Output location before any extension change
    pub fn base_output_path(input_path: &Path, config: &OptimizationConfig) -> Result<PathBuf, OptimizeError> {
        let file_name = input_path
            .file_name()
            .ok_or_else(|| OptimizeError::InvalidPath(input_path.to_path_buf()))?;

        let output = if let Some(ref output_dir) = config.output_dir {
            output_dir.join(file_name)
        } else if config.overwrite {
            input_path.to_path_buf()
        } else {
            Self::parent_of(input_path).join(OPTIMIZED_DIR).join(file_name)
        };
        Ok(output)
    }

    /// Final output location: base location with the target format's extension
    pub fn output_path(input_path: &Path, config: &OptimizationConfig) -> Result<PathBuf, OptimizeError> {
        let mut output = Self::base_output_path(input_path, config)?;
        if let Some(format) = config.target_format {
            output.set_extension(format.extension());
        }
        debug!("Resolved output path: {} -> {}", input_path.display(), output.display());
        Ok(output)
    }

    /// Directory that must exist before writing `output_path`, if any.
    ///
    /// In-place output needs nothing: the input's directory already exists.
    pub fn required_dir(input_path: &Path, config: &OptimizationConfig) -> Option<PathBuf> {
        if let Some(ref output_dir) = config.output_dir {
            Some(output_dir.clone())
        } else if config.overwrite {
            None
        } else {
            Some(Self::parent_of(input_path).join(OPTIMIZED_DIR))
        }
    }

    fn parent_of(path: &Path) -> &Path {
        path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Creates each output directory at most once per optimizer
#[derive(Debug, Default)]
pub struct DirectoryCache {
    created: Mutex<HashSet<PathBuf>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `dir` exists, creating it (and its parents) on first request
    pub fn ensure(&self, dir: &Path) -> Result<(), OptimizeError> {
        let mut created = self
            .created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if created.contains(dir) {
            return Ok(());
        }

        std::fs::create_dir_all(dir)
            .map_err(|e| OptimizeError::io("Cannot create directory", dir, e))?;
        debug!("Created output directory {}", dir.display());
        created.insert(dir.to_path_buf());
        Ok(())
    }

    /// Number of directories created so far
    pub fn len(&self) -> usize {
        self.created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
