// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "VIDEOCOMPRESS_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Target output size in megabytes (1 MB = 1024 * 1024 bytes)
    #[serde(default = "default_target_size_mb")]
    pub target_size_mb: u32,

    /// Fraction of the size budget actually handed to the encoder.
    /// Encoders overshoot; the rest is headroom for container overhead.
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,

    /// Audio bitrate assumed when the input's audio bitrate can't be probed
    #[serde(default = "default_audio_kbps")]
    pub default_audio_kbps: u32,

    /// Encoder to try before the platform priority chain (e.g. "hevc_qsv")
    #[serde(default)]
    pub preferred_encoder: Option<String>,

    /// Move on to the next encoder when an encode fails (instead of failing fast)
    #[serde(default = "default_true_config")]
    pub fallback_on_failure: bool,

    /// Extra ffmpeg arguments appended before the output path (shell-style quoting)
    #[serde(default)]
    pub extra_args: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Explicit path to ffmpeg
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,

    /// Explicit path to ffprobe
    #[serde(default)]
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter; RUST_LOG takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_target_size_mb() -> u32 {
    100
}

fn default_safety_factor() -> f64 {
    0.95
}

fn default_audio_kbps() -> u32 {
    128
}

fn default_true_config() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            target_size_mb: default_target_size_mb(),
            safety_factor: default_safety_factor(),
            default_audio_kbps: default_audio_kbps(),
            preferred_encoder: None,
            fallback_on_failure: true,
            extra_args: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        default_config_path()
    }

    /// Load config from disk, falling back to built-in defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    /// Parse config from TOML text and check value ranges
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;

        if !(config.defaults.safety_factor > 0.0 && config.defaults.safety_factor <= 1.0) {
            anyhow::bail!(
                "defaults.safety_factor must be in (0, 1], got {}",
                config.defaults.safety_factor
            );
        }
        if config.defaults.target_size_mb == 0 {
            anyhow::bail!("defaults.target_size_mb must be at least 1");
        }

        Ok(config)
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }
}

/// `<platform config dir>/videocompress/config.toml`, the same rule on every OS
fn default_config_path() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Could not determine config directory")?
        .join("videocompress")
        .join("config.toml"))
}
