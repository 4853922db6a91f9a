//! # Configuration Management Module
//!
//! Two layers of configuration live here:
//!
//! - `Settings`: the flat key/value surface shared with every front end and
//!   persisted as JSON (`mode`, `keep_metadata`, `quality`, `workers`,
//!   `max_size`, `format`, `overwrite`, `output_dir`, `include_svg`).
//!   Values are kept in their user-facing form (`"1920x1080"`,
//!   `"Keep Original"`), and unknown keys written by other front ends
//!   survive a load/save round trip.
//! - `OptimizationConfig`: the validated, immutable per-run settings handed
//!   to the `Optimizer`. It is built once by `Settings::validate()` at the
//!   batch-start boundary and never read back from the presentation layer.
//!
//! ## Validation:
//! - `quality` must be 1-100 (Lossless mode pins it to 100)
//! - `workers` must be 1-32
//! - `max_size` is empty, a pixel count, or `WxH` (the larger side wins)
//! - `format` is `Keep Original`, `jpg`, `png` or `webp`
//!
//! ## Example:
//! ```rust,ignore
//! let settings = Settings { quality: 80, max_size: "1024".into(), ..Default::default() };
//! let run = settings.validate()?;
//! assert_eq!(run.optimization.max_size, Some(1024));
//! ```

use crate::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 32;
pub const LOSSLESS_QUALITY: u8 = 100;
pub const KEEP_ORIGINAL: &str = "Keep Original";

/// Encoded output format requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Jpeg,
    Png,
    WebP,
}

impl TargetFormat {
    /// Canonical file extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "jpg",
            TargetFormat::Png => "png",
            TargetFormat::WebP => "webp",
        }
    }

    /// Case-insensitive lookup; `jpg` and `jpeg` are the same format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(TargetFormat::Jpeg),
            "png" => Some(TargetFormat::Png),
            "webp" => Some(TargetFormat::WebP),
            _ => None,
        }
    }

    /// Format of a path, judged by its extension
    pub fn of_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse the persisted `format` value. `None` means keep the original format.
    pub fn parse_setting(value: &str) -> Result<Option<Self>, ConfigError> {
        let trimmed = value.trim();
        let lower = trimmed.to_ascii_lowercase();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case(KEEP_ORIGINAL)
            || lower == "keep-original"
            || lower == "none"
        {
            return Ok(None);
        }
        Self::from_extension(&lower)
            .map(Some)
            .ok_or_else(|| ConfigError::Format(trimmed.to_string()))
    }
}

/// Compression mode. Lossless is a UI alias pinning quality to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Lossy,
    Lossless,
}

impl std::str::FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lossy" => Ok(Mode::Lossy),
            "lossless" => Ok(Mode::Lossless),
            _ => Err(ConfigError::Mode(s.to_string())),
        }
    }
}

/// Immutable per-run settings consumed by the `Optimizer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationConfig {
    /// Flat output directory (None = in place or sibling `optimized/`)
    pub output_dir: Option<PathBuf>,
    /// Bound on the larger image side, in pixels
    pub max_size: Option<u32>,
    /// Output format (None = keep the input format)
    pub target_format: Option<TargetFormat>,
    /// Replace inputs in place when no output directory is given
    pub overwrite: bool,
    /// Encoder quality, 1-100
    pub quality: u8,
    /// Re-attach the original EXIF block on save
    pub keep_metadata: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            max_size: None,
            target_format: None,
            overwrite: false,
            quality: 85,
            keep_metadata: false,
        }
    }
}

/// Validated settings for one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub optimization: OptimizationConfig,
    pub workers: usize,
    pub include_svg: bool,
}

/// Persisted key/value settings, in the form the front ends edit them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: Mode,
    pub keep_metadata: bool,
    pub quality: u8,
    pub workers: usize,
    pub max_size: String,
    pub format: String,
    pub overwrite: bool,
    pub output_dir: Option<PathBuf>,
    pub include_svg: bool,
    /// Keys owned by other front ends (language, theme, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Lossy,
            keep_metadata: false,
            quality: 85,
            workers: 4,
            max_size: String::new(),
            format: KEEP_ORIGINAL.to_string(),
            overwrite: false,
            output_dir: None,
            include_svg: true,
            extra: serde_json::Map::new(),
        }
    }
}

impl Settings {
    /// Default settings file location (`<config dir>/image-optimizer/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("image-optimizer").join("config.json"))
    }

    /// Quality actually used for encoding
    pub fn effective_quality(&self) -> u8 {
        match self.mode {
            Mode::Lossless => LOSSLESS_QUALITY,
            Mode::Lossy => self.quality,
        }
    }

    /// Validate every field and build the per-run configuration
    pub fn validate(&self) -> Result<RunConfig, ConfigError> {
        let quality = self.effective_quality();
        if !(1..=100).contains(&quality) {
            return Err(ConfigError::Quality(quality));
        }

        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(ConfigError::Workers(self.workers));
        }

        let max_size = parse_max_size(&self.max_size)?;
        let target_format = TargetFormat::parse_setting(&self.format)?;

        if let Some(ref output_dir) = self.output_dir {
            if output_dir.exists() && !output_dir.is_dir() {
                return Err(ConfigError::OutputNotDirectory(output_dir.clone()));
            }
        }

        Ok(RunConfig {
            optimization: OptimizationConfig {
                output_dir: self.output_dir.clone(),
                max_size,
                target_format,
                overwrite: self.overwrite,
                quality,
                keep_metadata: self.keep_metadata,
            },
            workers: self.workers,
            include_svg: self.include_svg,
        })
    }

    /// Load settings from file; a missing file yields the defaults
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to file, creating the parent directory if needed
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Parse a max-size value: empty, `N`, or `WxH` (larger side is the bound)
pub fn parse_max_size(value: &str) -> Result<Option<u32>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let invalid = || ConfigError::MaxSize(trimmed.to_string());
    let parse = |part: &str| part.trim().parse::<u32>().map_err(|_| invalid());

    let bound = match trimmed.split_once(&['x', 'X'][..]) {
        Some((width, height)) => parse(width)?.max(parse(height)?),
        None => parse(trimmed)?,
    };

    if bound == 0 {
        return Err(invalid());
    }
    Ok(Some(bound))
}
