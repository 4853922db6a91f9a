//! # File Management Module
//!
//! Input discovery and small file-size helpers.
//!
//! ## Responsibilities:
//! - Turn the paths chosen by the user into the ordered list of files to process
//! - Recursive directory scan restricted to supported image extensions
//! - Atomic replacement of output files
//! - Human-readable byte sizes and reduction percentages
//!
//! ## Supported formats (case-insensitive):
//! - **Raster**: JPG, JPEG, PNG, WebP
//! - **Vector**: SVG (only when `include_svg` is set)
//!
//! ## Example:
//! ```rust,ignore
//! let files = FileManager::collect_inputs(&[PathBuf::from("/photos")], true);
//! for file in files {
//!     if FileManager::is_svg(&file) {
//!         // vector branch
//!     }
//! }
//! ```

use crate::error::OptimizeError;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Manages input discovery and file size reporting
pub struct FileManager;

impl FileManager {
    /// Expand the user's selection into files, in a stable order.
    ///
    /// Directories are walked recursively and filtered by extension; any
    /// other path is kept as given, so a missing file still produces a
    /// per-file "not found" result instead of vanishing. Duplicates are
    /// dropped, keeping the first occurrence.
    pub fn collect_inputs(paths: &[PathBuf], include_svg: bool) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for path in paths {
            if path.is_dir() {
                for file in Self::find_image_files(path, include_svg) {
                    if seen.insert(file.clone()) {
                        files.push(file);
                    }
                }
            } else if seen.insert(path.clone()) {
                files.push(path.clone());
            }
        }

        debug!("Collected {} input files from {} paths", files.len(), paths.len());
        files
    }

    /// Find all supported image files below a directory, sorted by path
    pub fn find_image_files(dir: &Path, include_svg: bool) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                    continue;
                }
            };
            if entry.file_type().is_file() && Self::is_supported_format(entry.path(), include_svg) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        files
    }

    /// Check if a file extension is one we process
    pub fn is_supported_format(path: &Path, include_svg: bool) -> bool {
        match Self::lowercase_extension(path) {
            Some(ext) => {
                RASTER_EXTENSIONS.contains(&ext.as_str()) || (include_svg && ext == "svg")
            }
            None => false,
        }
    }

    /// Check if a file is an SVG document
    pub fn is_svg(path: &Path) -> bool {
        Self::lowercase_extension(path).as_deref() == Some("svg")
    }

    /// Lowercased extension of a path, if it has one
    pub fn lowercase_extension(path: &Path) -> Option<String> {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Replace `dest` with `bytes` through a temporary file in the same directory.
    ///
    /// `dest` is either untouched or fully written. The new file takes the
    /// permissions of `permissions_from` when that file can be read.
    pub fn write_atomic(dest: &Path, bytes: &[u8], permissions_from: &Path) -> Result<(), OptimizeError> {
        let dir = dest
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp = tempfile::Builder::new()
            .prefix(".optimizing-")
            .tempfile_in(dir)
            .map_err(|e| OptimizeError::io("Cannot create temporary file in", dir, e))?;
        temp.write_all(bytes)
            .map_err(|e| OptimizeError::io("Cannot write", dest, e))?;

        if let Ok(metadata) = std::fs::metadata(permissions_from) {
            if let Err(e) = temp.as_file().set_permissions(metadata.permissions()) {
                debug!("Cannot copy permissions to {}: {}", dest.display(), e);
            }
        }

        temp.persist(dest)
            .map_err(|e| OptimizeError::io("Cannot write", dest, e.error))?;
        Ok(())
    }

    /// Calculate percentage reduction (negative when the file grew)
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
