//! # Image Optimizer - Main Entry Point
//!
//! ## Responsibilities:
//! - Parse command line arguments with `clap`
//! - Initialize logging with `tracing`
//! - Merge the persisted settings with the command line and validate them
//! - Run the batch and report progress (progress bar or JSON lines)
//!
//! ## Execution flow:
//! 1. Parse CLI arguments
//! 2. Configure logging (INFO, DEBUG with `--verbose`, `RUST_LOG` wins)
//! 3. Load settings, apply CLI overrides, validate (invalid settings never start a batch)
//! 4. Collect input files
//! 5. Run the coordinator; Ctrl-C stops new submissions
//!
//! ## Example:
//! ```bash
//! image-optimizer ~/Pictures --max-size 1920x1080 --format webp --quality 80 --workers 8
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use image_optimizer::batch::ProgressTracker;
use image_optimizer::config::Mode;
use image_optimizer::json_output::JsonMessage;
use image_optimizer::{
    BatchCoordinator, BatchStatus, CancelFlag, ConfigError, FileManager, Optimizer, Settings, ToolResolver,
};

#[derive(Parser)]
#[command(name = "image-optimizer")]
#[command(about = "Resize, convert and compress images in parallel")]
struct Args {
    /// Image files or directories (scanned recursively)
    #[arg(required_unless_present = "list_tools")]
    inputs: Vec<PathBuf>,

    /// Flat output directory (default: an `optimized/` folder next to each input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Bound on the larger side: a pixel count like 1920, or WxH like 1920x1080
    #[arg(short = 's', long)]
    max_size: Option<String>,

    /// Output format: jpg, png, webp or "Keep Original"
    #[arg(short, long)]
    format: Option<String>,

    /// Encoder quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Compression mode: Lossy or Lossless (Lossless pins quality to 100)
    #[arg(long)]
    mode: Option<String>,

    /// Shorthand for --mode Lossless
    #[arg(long)]
    lossless: bool,

    /// Keep EXIF metadata
    #[arg(long)]
    keep_metadata: bool,

    /// Replace inputs in place when no output directory is given
    #[arg(long)]
    overwrite: bool,

    /// Number of parallel workers (1-32)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Skip SVG files when scanning directories
    #[arg(long)]
    no_svg: bool,

    /// Settings file (default: the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Store the merged settings back to the settings file
    #[arg(long)]
    save_config: bool,

    /// Emit JSON lines on stdout instead of a progress bar
    #[arg(long)]
    json: bool,

    /// Show which external tools were found, then exit
    #[arg(long)]
    list_tools: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Command line values take precedence over persisted settings
    fn apply_to(&self, settings: &mut Settings) -> Result<(), ConfigError> {
        if let Some(ref output) = self.output {
            settings.output_dir = Some(output.clone());
        }
        if let Some(ref max_size) = self.max_size {
            settings.max_size = max_size.clone();
        }
        if let Some(ref format) = self.format {
            settings.format = format.clone();
        }
        if let Some(quality) = self.quality {
            settings.quality = quality;
        }
        if let Some(ref mode) = self.mode {
            settings.mode = mode.parse::<Mode>()?;
        }
        if self.lossless {
            settings.mode = Mode::Lossless;
        }
        if self.keep_metadata {
            settings.keep_metadata = true;
        }
        if self.overwrite {
            settings.overwrite = true;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if self.no_svg {
            settings.include_svg = false;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for JSON lines
    let default_level = if args.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if args.list_tools {
        print!("{}", ToolResolver::new().tools_report());
        return Ok(());
    }

    let settings_path = args.config.clone().or_else(Settings::default_path);
    let mut settings = match settings_path {
        Some(ref path) => Settings::load(path).await?,
        None => Settings::default(),
    };

    let run = match args.apply_to(&mut settings).and_then(|_| settings.validate()) {
        Ok(run) => run,
        Err(e) => {
            if args.json {
                JsonMessage::error("Invalid configuration".to_string(), Some(e.to_string())).emit();
            }
            return Err(e.into());
        }
    };

    if args.save_config {
        match settings_path {
            Some(ref path) => {
                settings.save(path).await?;
                info!("Saved settings to {}", path.display());
            }
            None => warn!("No settings location available, not saving"),
        }
    }

    let files = FileManager::collect_inputs(&args.inputs, run.include_svg);

    if args.json {
        JsonMessage::start(args.inputs.clone(), files.len(), &run).emit();
    } else {
        info!("Found {} images to process", files.len());
        match run.optimization.output_dir {
            Some(ref dir) => info!("Output directory: {}", dir.display()),
            None if run.optimization.overwrite => info!("Mode: replace files in place"),
            None => info!("Output: optimized/ next to each input"),
        }
    }

    let cancel = CancelFlag::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing files in progress, no new files will start");
            interrupt.cancel();
        }
    });

    let coordinator = BatchCoordinator::new(Arc::new(Optimizer::new()), run.optimization, run.workers, cancel);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let json_output = args.json;
    let reporter = tokio::spawn(async move {
        let mut tracker = ProgressTracker::new(json_output);
        while let Some(event) = events_rx.recv().await {
            tracker.handle(event);
        }
    });

    let summary = coordinator.run(files, events_tx).await;
    reporter.await?;

    if summary.stats.errors > 0 {
        return Err(anyhow::anyhow!("{} of {} files failed", summary.stats.errors, summary.completed));
    }
    if summary.status == BatchStatus::Cancelled {
        return Err(anyhow::anyhow!("Cancelled with {} files not processed", summary.skipped));
    }

    Ok(())
}
