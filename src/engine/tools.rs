//! Locating and identifying the ffmpeg / ffprobe executables.

use crate::config::ToolsConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const FFMPEG_ENV: &str = "VIDEOCOMPRESS_FFMPEG";
pub const FFPROBE_ENV: &str = "VIDEOCOMPRESS_FFPROBE";

/// Resolved paths of the external tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl ToolPaths {
    /// Resolve both tools: config path, then env var, then a copy bundled
    /// next to our own executable, then the bare name on PATH.
    pub fn resolve(config: &ToolsConfig) -> Self {
        let bundle_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        Self {
            ffmpeg: resolve_tool(
                "ffmpeg",
                config.ffmpeg.as_deref(),
                std::env::var_os(FFMPEG_ENV).map(PathBuf::from),
                bundle_dir.as_deref(),
            ),
            ffprobe: resolve_tool(
                "ffprobe",
                config.ffprobe.as_deref(),
                std::env::var_os(FFPROBE_ENV).map(PathBuf::from),
                bundle_dir.as_deref(),
            ),
        }
    }
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) && !name.to_ascii_lowercase().ends_with(".exe") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Pick the executable for `name` in priority order
pub fn resolve_tool(
    name: &str,
    configured: Option<&Path>,
    from_env: Option<PathBuf>,
    bundle_dir: Option<&Path>,
) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    if let Some(path) = from_env.filter(|p| !p.as_os_str().is_empty()) {
        return path;
    }
    if let Some(dir) = bundle_dir {
        let bundled = dir.join(executable_name(name));
        if bundled.is_file() {
            return bundled;
        }
    }
    PathBuf::from(name)
}

fn tool_version(exe: &Path, label: &str) -> Result<String> {
    let output = Command::new(exe)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {}. Is {} installed and in PATH?", exe.display(), label))?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", label, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version line
pub fn ffmpeg_version(tools: &ToolPaths) -> Result<String> {
    tool_version(&tools.ffmpeg, "ffmpeg")
}

/// Check if ffprobe is available and return its version line
pub fn ffprobe_version(tools: &ToolPaths) -> Result<String> {
    tool_version(&tools.ffprobe, "ffprobe")
}
