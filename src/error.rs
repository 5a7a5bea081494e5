//! Error types for the compression engine.
//!
//! The engine reports failures through these enums; the CLI layer wraps them
//! in `anyhow` and decides on the exit code.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the target-bitrate arithmetic
#[derive(Debug, Error, PartialEq)]
pub enum BitrateError {
    #[error("invalid duration {0}s (must be a positive, finite number)")]
    InvalidDuration(f64),

    #[error("target size {target_mb:.2} MB is too small: audio alone needs {audio_kbps}k over {duration_s:.1}s")]
    BudgetExhausted {
        target_mb: f64,
        audio_kbps: u32,
        duration_s: f64,
    },
}

/// Failures while probing the input with ffprobe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[source] io::Error),

    #[error("ffprobe failed: {0}")]
    Failed(String),

    #[error("failed to parse ffprobe output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no video stream found")]
    NoVideoStream,

    #[error("no usable duration in ffprobe output")]
    MissingDuration,

    #[error("failed to parse frame rate '{0}'")]
    BadFrameRate(String),

    #[error("failed to read input size: {0}")]
    Metadata(#[source] io::Error),
}

/// Top-level failures of a compression run
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("failed to extract video info from {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },

    #[error(transparent)]
    Bitrate(#[from] BitrateError),

    #[error("output would overwrite the input: {}", .0.display())]
    OutputIsInput(PathBuf),

    #[error("encoding cancelled by user ({encoder}), partial output kept at {}", partial.display())]
    Cancelled { encoder: String, partial: PathBuf },

    #[error("all encoders failed:\n{}", format_attempts(.attempts))]
    AllEncodersFailed { attempts: Vec<EncodeAttempt> },

    #[error("encoder reported success but output is missing: {}", .0.display())]
    OutputMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One failed encoder attempt, kept for the final error report
#[derive(Debug, Clone)]
pub struct EncodeAttempt {
    pub encoder: String,
    pub error: String,
}

fn format_attempts(attempts: &[EncodeAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("  {}: {}", a.encoder, a.error))
        .collect::<Vec<_>>()
        .join("\n")
}
