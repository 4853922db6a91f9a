//! # Optimizer Module
//!
//! The single-file pipeline, split into submodules:
//! - `path_resolver`: output location rules and lazy directory creation
//! - `resize`: bound-driven geometry and filter choice
//! - `encoder`: format-specific encoding
//! - `metadata`: EXIF carry-over
//!
//! `Optimizer::process` is synchronous and never fails: every error ends up
//! in the message of a failed `ProcessResult`. It is called from blocking
//! worker threads by the batch coordinator, so one `Optimizer` is shared by
//! all workers.
//!
//! ## Raster pipeline:
//! 1. Existence check and original size
//! 2. Decode, reading the orientation the container declares
//! 3. Canonicalize alpha-bearing pixel modes to RGBA8
//! 4. Resolve the output path (and create its directory)
//! 5. Auto-orient
//! 6. Resize when the larger side exceeds the bound
//! 7. Re-encode, byte copy, or leave the file alone
//! 8. Post-process the output with an external tool (best-effort)
//! 9. Measure the output
//!
//! SVG files skip decoding: they are copied to the output location and
//! handed to the post-processor.

pub mod encoder;
pub mod metadata;
pub mod path_resolver;
pub mod resize;

pub use encoder::Encoder;
pub use path_resolver::{DirectoryCache, PathResolver};
pub use resize::ResizePlan;

use crate::config::{OptimizationConfig, TargetFormat};
use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::post_process::{ExternalTools, PostProcessOutcome, PostProcessor};
use crate::result::{display_name, ProcessResult};
use image::metadata::Orientation;
use image::{ColorType, DynamicImage, ImageDecoder, ImageError, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies the per-file transformation sequence
pub struct Optimizer {
    post_processor: Arc<dyn PostProcessor>,
    webp_tool: Option<PathBuf>,
    directories: DirectoryCache,
}

impl Optimizer {
    /// Optimizer using whatever external tools are installed
    pub fn new() -> Self {
        Self::with_tools(ExternalTools::detect())
    }

    pub fn with_tools(tools: ExternalTools) -> Self {
        let webp_tool = tools.cwebp().map(Path::to_path_buf);
        Self::with_post_processor(Arc::new(tools), webp_tool)
    }

    /// Optimizer with an explicit post-processor and WebP encoder binary
    pub fn with_post_processor(post_processor: Arc<dyn PostProcessor>, webp_tool: Option<PathBuf>) -> Self {
        Self {
            post_processor,
            webp_tool,
            directories: DirectoryCache::new(),
        }
    }

    /// Run one file through the pipeline
    pub fn process(&self, path: &Path, config: &OptimizationConfig) -> ProcessResult {
        debug!("Processing {}", path.display());

        match self.run_pipeline(path, config) {
            Ok(result) => {
                debug!("{}", result.message);
                result
            }
            Err(e) => {
                warn!("Failed to optimize {}: {}", path.display(), e);
                let original_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                ProcessResult::failed(path, original_size, e.to_string())
            }
        }
    }

    fn run_pipeline(&self, path: &Path, config: &OptimizationConfig) -> Result<ProcessResult, OptimizeError> {
        if !path.exists() {
            return Err(OptimizeError::NotFound(path.to_path_buf()));
        }
        let original_size = std::fs::metadata(path)
            .map_err(|e| OptimizeError::io("Cannot read", path, e))?
            .len();

        if FileManager::is_svg(path) {
            return self.process_svg(path, config, original_size);
        }

        let source = std::fs::read(path).map_err(|e| OptimizeError::io("Cannot read", path, e))?;
        let (image, orientation) = decode(path, &source)?;
        let mut image = canonicalize(image);

        let output_path = PathResolver::output_path(path, config)?;
        self.ensure_output_dir(path, config)?;

        if orientation != Orientation::NoTransforms {
            debug!("Applying orientation {:?} to {}", orientation, path.display());
            image.apply_orientation(orientation);
        }

        let resize = ResizePlan::for_bound(image.width(), image.height(), config.max_size);
        if let Some(plan) = resize {
            image = plan.apply(&image);
        }

        let format_changed = config
            .target_format
            .is_some_and(|target| TargetFormat::of_path(path) != Some(target));
        let fresh_output = output_path != path && !output_path.exists();

        if resize.is_some() || format_changed || fresh_output {
            let encoder = Encoder::for_output(&output_path, config, self.webp_tool.as_deref())?;
            let mut encoded = encoder.encode(&image, &output_path)?;
            if config.keep_metadata {
                encoded = attach_exif(&source, encoded, &output_path);
            }
            FileManager::write_atomic(&output_path, &encoded, path)?;
            debug!("Re-encoded {} with {:?}", output_path.display(), encoder);
        } else if output_path != path {
            FileManager::write_atomic(&output_path, &source, path)?;
            debug!("Copied {} unchanged to {}", path.display(), output_path.display());
        } else {
            debug!("Nothing to rewrite for {}", path.display());
        }

        self.finish(path, &output_path, config, original_size)
    }

    /// SVG files keep their extension whatever the target format
    fn process_svg(
        &self,
        path: &Path,
        config: &OptimizationConfig,
        original_size: u64,
    ) -> Result<ProcessResult, OptimizeError> {
        let output_path = PathResolver::base_output_path(path, config)?;
        self.ensure_output_dir(path, config)?;

        if output_path != path {
            let source = std::fs::read(path).map_err(|e| OptimizeError::io("Cannot read", path, e))?;
            FileManager::write_atomic(&output_path, &source, path)?;
        }

        self.finish(path, &output_path, config, original_size)
    }

    fn ensure_output_dir(&self, path: &Path, config: &OptimizationConfig) -> Result<(), OptimizeError> {
        match PathResolver::required_dir(path, config) {
            Some(dir) => self.directories.ensure(&dir),
            None => Ok(()),
        }
    }

    /// Post-process the written output and build the result
    fn finish(
        &self,
        path: &Path,
        output_path: &Path,
        config: &OptimizationConfig,
        original_size: u64,
    ) -> Result<ProcessResult, OptimizeError> {
        let post_process = if output_path.exists() {
            self.post_processor.apply(output_path, config)
        } else {
            PostProcessOutcome::NotApplicable
        };

        let new_size = std::fs::metadata(output_path)
            .map_err(|e| OptimizeError::io("Cannot read", output_path, e))?
            .len();

        Ok(ProcessResult::succeeded(
            path,
            output_path,
            original_size,
            new_size,
            post_process,
        ))
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode from memory, guessing the format from content
fn decode(path: &Path, bytes: &[u8]) -> Result<(DynamicImage, Orientation), OptimizeError> {
    let decode_error = |source: ImageError| OptimizeError::Decode {
        name: display_name(path),
        source,
    };

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_error(ImageError::IoError(e)))?;
    let mut decoder = reader.into_decoder().map_err(decode_error)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let image = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    Ok((image, orientation))
}

/// Alpha-bearing modes become RGBA8 before any resize or encode.
/// Palettes are already expanded by the decoders.
fn canonicalize(image: DynamicImage) -> DynamicImage {
    if image.color().has_alpha() && image.color() != ColorType::Rgba8 {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        image
    }
}

/// Re-attach the source EXIF block, dropping it if the output container refuses it
fn attach_exif(source: &[u8], encoded: Vec<u8>, output_path: &Path) -> Vec<u8> {
    let Some(exif) = metadata::read_exif(source) else {
        return encoded;
    };

    match metadata::embed_exif(&encoded, metadata::reset_orientation(&exif)) {
        Ok(with_exif) => with_exif,
        Err(e) => {
            warn!("Dropping metadata for {}: {}", output_path.display(), e);
            encoded
        }
    }
}
