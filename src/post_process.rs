//! # Post-Processing Module
//!
//! Best-effort external optimizers applied to a finished output file.
//!
//! The `PostProcessor` trait is the seam between the pipeline and the
//! command-line tools. Every call reports one `PostProcessOutcome`; none of
//! them can fail the file, but the outcome travels with the file's result so
//! a skipped or failed tool is never reported as a plain success.
//!
//! | Extension    | Tool                | Arguments                                                 |
//! |--------------|---------------------|-----------------------------------------------------------|
//! | `jpg`/`jpeg` | jpegoptim           | `[--strip-all] -m <quality> <file>`                       |
//! | `png`        | pngquant            | `--force --ext .png --quality 65-<quality> [--strip] <file>` |
//! | `svg`        | svgo, else scour    | `<file> -o <file>` / `-i <file> -o <tmp> [--remove-metadata]` |
//!
//! Tools mutate the file in place. None of them has a timeout: a hung tool
//! blocks its worker until it exits.

use crate::config::OptimizationConfig;
use crate::file_manager::FileManager;
use crate::tool_resolver::ToolResolver;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// pngquant exit code when the result would fall below the minimum quality
const PNGQUANT_QUALITY_TOO_LOW: i32 = 99;
const PNGQUANT_MIN_QUALITY: u8 = 65;

/// What happened during post-processing of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PostProcessOutcome {
    /// The tool ran and exited successfully
    Applied { tool: String },
    /// The tool ran but chose to leave the file untouched
    Declined { tool: String, reason: String },
    /// No tool for this format is installed
    Unavailable,
    /// No post-processor exists for this extension
    NotApplicable,
    /// The tool could not be spawned or exited with an error
    Failed { tool: String, reason: String },
}

impl PostProcessOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PostProcessOutcome::Failed { .. })
    }

    /// Short human description, used in result messages
    pub fn describe(&self) -> String {
        match self {
            PostProcessOutcome::Applied { tool } => format!("post-processed with {}", tool),
            PostProcessOutcome::Declined { tool, reason } => format!("{} skipped: {}", tool, reason),
            PostProcessOutcome::Unavailable => "post-process skipped: tool unavailable".to_string(),
            PostProcessOutcome::NotApplicable => "no post-process for this format".to_string(),
            PostProcessOutcome::Failed { tool, reason } => {
                format!("post-process failed: {}: {}", tool, reason)
            }
        }
    }
}

/// Capability: optimize an already written output file in place
pub trait PostProcessor: Send + Sync {
    fn apply(&self, path: &Path, config: &OptimizationConfig) -> PostProcessOutcome;
}

/// Post-processor that never touches the file
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPostProcess;

impl PostProcessor for NoPostProcess {
    fn apply(&self, _path: &Path, _config: &OptimizationConfig) -> PostProcessOutcome {
        PostProcessOutcome::NotApplicable
    }
}

/// External command-line optimizers, resolved once at construction
#[derive(Debug, Clone, Default)]
pub struct ExternalTools {
    jpegoptim: Option<PathBuf>,
    pngquant: Option<PathBuf>,
    cwebp: Option<PathBuf>,
    svgo: Option<PathBuf>,
    scour: Option<PathBuf>,
}

impl ExternalTools {
    /// Resolve every tool from the process environment
    pub fn detect() -> Self {
        Self::from_resolver(&ToolResolver::new())
    }

    pub fn from_resolver(resolver: &ToolResolver) -> Self {
        let tools = Self {
            jpegoptim: resolver.resolve_tool("jpegoptim"),
            pngquant: resolver.resolve_tool("pngquant"),
            cwebp: resolver.resolve_tool("cwebp"),
            svgo: resolver.resolve_tool("svgo"),
            scour: resolver.resolve_tool("scour"),
        };
        debug!("External tools: {:?}", tools);
        tools
    }

    /// No external tools at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Path of the WebP encoder, used by the encode step rather than post-processing
    pub fn cwebp(&self) -> Option<&Path> {
        self.cwebp.as_deref()
    }

    fn jpeg(&self, tool: &Path, path: &Path, config: &OptimizationConfig) -> PostProcessOutcome {
        let mut args: Vec<OsString> = Vec::new();
        if !config.keep_metadata {
            args.push("--strip-all".into());
        }
        args.push("-m".into());
        args.push(config.quality.to_string().into());
        args.push(path.into());

        run_tool("jpegoptim", tool, &args)
    }

    fn png(&self, tool: &Path, path: &Path, config: &OptimizationConfig) -> PostProcessOutcome {
        let min_quality = PNGQUANT_MIN_QUALITY.min(config.quality);
        let mut args: Vec<OsString> = vec![
            "--force".into(),
            "--ext".into(),
            ".png".into(),
            "--quality".into(),
            format!("{}-{}", min_quality, config.quality).into(),
        ];
        if !config.keep_metadata {
            args.push("--strip".into());
        }
        args.push(path.into());

        run_tool("pngquant", tool, &args)
    }

    fn svg(&self, path: &Path, config: &OptimizationConfig) -> PostProcessOutcome {
        if let Some(ref svgo) = self.svgo {
            let args: Vec<OsString> = vec![path.into(), "-o".into(), path.into()];
            return run_tool("svgo", svgo, &args);
        }

        if let Some(ref scour) = self.scour {
            return scour_in_place(scour, path, config);
        }

        PostProcessOutcome::Unavailable
    }
}

impl PostProcessor for ExternalTools {
    fn apply(&self, path: &Path, config: &OptimizationConfig) -> PostProcessOutcome {
        let outcome = match FileManager::lowercase_extension(path).as_deref() {
            Some("jpg") | Some("jpeg") => match self.jpegoptim {
                Some(ref tool) => self.jpeg(tool, path, config),
                None => PostProcessOutcome::Unavailable,
            },
            Some("png") => match self.pngquant {
                Some(ref tool) => self.png(tool, path, config),
                None => PostProcessOutcome::Unavailable,
            },
            Some("svg") => self.svg(path, config),
            _ => PostProcessOutcome::NotApplicable,
        };

        match outcome {
            PostProcessOutcome::Failed { ref tool, ref reason } => {
                warn!("{} failed on {}: {}", tool, path.display(), reason)
            }
            ref other => debug!("Post-process {}: {}", path.display(), other.describe()),
        }
        outcome
    }
}

/// Run scour into a temporary file next to `path`, then rename it over `path`
fn scour_in_place(tool: &Path, path: &Path, config: &OptimizationConfig) -> PostProcessOutcome {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = match tempfile::Builder::new()
        .prefix(".scour-")
        .suffix(".svg")
        .tempfile_in(dir)
    {
        Ok(file) => file.into_temp_path(),
        Err(e) => {
            return PostProcessOutcome::Failed {
                tool: "scour".to_string(),
                reason: format!("cannot create temporary file: {}", e),
            }
        }
    };

    let mut args: Vec<OsString> = vec!["-i".into(), path.into(), "-o".into(), temp.to_path_buf().into()];
    if !config.keep_metadata {
        args.push("--remove-metadata".into());
    }

    match run_tool("scour", tool, &args) {
        PostProcessOutcome::Applied { tool } => match temp.persist(path) {
            Ok(()) => PostProcessOutcome::Applied { tool },
            Err(e) => PostProcessOutcome::Failed {
                tool,
                reason: format!("cannot replace {}: {}", path.display(), e.error),
            },
        },
        other => other,
    }
}

/// Spawn a tool, wait for it, and classify its exit
pub fn run_tool(name: &str, program: &Path, args: &[OsString]) -> PostProcessOutcome {
    debug!("Running {} {:?}", name, args);
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output();

    match output {
        Ok(output) if output.status.success() => PostProcessOutcome::Applied {
            tool: name.to_string(),
        },
        Ok(output) if name == "pngquant" && output.status.code() == Some(PNGQUANT_QUALITY_TOO_LOW) => {
            PostProcessOutcome::Declined {
                tool: name.to_string(),
                reason: "quality target not reachable, file left unchanged".to_string(),
            }
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().next().unwrap_or("").trim();
            let reason = if first_line.is_empty() {
                output.status.to_string()
            } else {
                format!("{} ({})", output.status, first_line)
            };
            PostProcessOutcome::Failed {
                tool: name.to_string(),
                reason,
            }
        }
        Err(e) => PostProcessOutcome::Failed {
            tool: name.to_string(),
            reason: format!("cannot spawn: {}", e),
        },
    }
}
