//! # Tool Path Resolver
//!
//! Finds the external optimizer binaries in the different environments the
//! tool ships in:
//! - A tools directory set through `IMAGE_OPTIMIZER_TOOLS_DIR`
//! - A `tools/` directory bundled next to the executable
//! - The system `PATH`

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable pointing at a directory of bundled tools
pub const TOOLS_DIR_ENV: &str = "IMAGE_OPTIMIZER_TOOLS_DIR";

/// Every external tool the pipeline knows how to drive, with its format
pub const KNOWN_TOOLS: &[(&str, &str)] = &[
    ("jpegoptim", "JPEG"),
    ("pngquant", "PNG"),
    ("cwebp", "WebP"),
    ("svgo", "SVG"),
    ("scour", "SVG"),
];

/// Tool path resolver for bundled and system-installed binaries
#[derive(Debug, Clone)]
pub struct ToolResolver {
    /// Directory where tools are bundled, searched before `PATH`
    tools_dir: Option<PathBuf>,
    /// Value of `PATH` captured at construction
    search_path: Option<OsString>,
}

impl ToolResolver {
    /// Create a resolver from the process environment
    pub fn new() -> Self {
        Self {
            tools_dir: Self::detect_bundled_tools_dir(),
            search_path: env::var_os("PATH"),
        }
    }

    /// Create a resolver with explicit search locations
    pub fn with_search_paths(tools_dir: Option<PathBuf>, search_path: Option<OsString>) -> Self {
        Self {
            tools_dir,
            search_path,
        }
    }

    /// Detect the bundled tools directory
    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        if let Some(dir) = env::var_os(TOOLS_DIR_ENV) {
            let tools_path = PathBuf::from(dir);
            debug!("Checking {}: {:?}", TOOLS_DIR_ENV, tools_path);
            if tools_path.is_dir() {
                return Some(tools_path);
            }
        }

        let exe_path = env::current_exe().ok()?;
        let bundled = exe_path.parent()?.join("tools");
        debug!("Checking bundled tools path: {:?}", bundled);
        bundled.is_dir().then_some(bundled)
    }

    /// Platform-specific executable file name
    fn executable_name(tool_name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", tool_name)
        } else {
            tool_name.to_string()
        }
    }

    /// Resolve the path to a specific tool, bundled tools first
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        let file_name = Self::executable_name(tool_name);

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = tools_dir.join(&file_name);
            if bundled_path.is_file() {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled_path);
                return Some(bundled_path);
            }
        }

        if let Some(system_path) = self.find_in_system_path(&file_name) {
            debug!("Using system tool: {} -> {:?}", tool_name, system_path);
            return Some(system_path);
        }

        debug!("Tool not found: {}", tool_name);
        None
    }

    /// Find tool in system PATH
    fn find_in_system_path(&self, file_name: &str) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        env::split_paths(search_path)
            .map(|dir| dir.join(file_name))
            .find(|path| path.is_file())
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Get a report of tool availability
    pub fn tools_report(&self) -> String {
        let mut report = String::from("External tool availability\n");
        if let Some(ref dir) = self.tools_dir {
            report.push_str(&format!("Bundled tools dir: {}\n", dir.display()));
        }

        for (tool, format) in KNOWN_TOOLS {
            match self.resolve_tool(tool) {
                Some(path) => {
                    report.push_str(&format!("  ✅ {:<10} {:<5} -> {}\n", tool, format, path.display()));
                }
                None => {
                    report.push_str(&format!(
                        "  ❌ {:<10} {:<5} (install with: {})\n",
                        tool,
                        format,
                        install_hint(tool)
                    ));
                }
            }
        }

        report
    }
}

impl Default for ToolResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Installation instructions for a tool on Debian-like systems
fn install_hint(tool_name: &str) -> String {
    match tool_name {
        "cwebp" => "sudo apt-get install webp".to_string(),
        "svgo" => "npm install -g svgo".to_string(),
        "scour" => "pip install scour".to_string(),
        other => format!("sudo apt-get install {}", other),
    }
}
