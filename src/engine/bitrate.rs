//! Target bitrate arithmetic.
//!
//! Turns a size budget into a video bitrate: the whole budget (scaled down by a
//! safety factor) minus what the audio track will consume, spread over the
//! duration.

use crate::error::BitrateError;
use serde::Serialize;

pub const MB_TO_BYTES: u64 = 1024 * 1024;

/// Lowest video bitrate worth handing to an encoder
pub const MIN_VIDEO_KBPS: u32 = 1;

/// Bitrates for one encode, in kbps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetBitrate {
    pub video_kbps: u32,
    pub audio_kbps: u32,
}

impl TargetBitrate {
    /// `-b:v` / `-maxrate:v` / `-bufsize:v` for a capped, constrained-VBR encode
    pub fn rate_args(&self) -> Vec<String> {
        let k = self.video_kbps;
        vec![
            "-b:v".to_string(),
            format!("{}k", k),
            "-maxrate:v".to_string(),
            format!("{}k", k),
            "-bufsize:v".to_string(),
            format!("{}k", u64::from(k) * 2),
        ]
    }
}

/// Video bits per second that fit `target_bytes` once audio is paid for.
///
/// `(target_bytes * 8 * safety - audio_bps * duration) / duration`
///
/// May be zero or negative when the audio alone eats the budget; callers that
/// need a usable value go through [`target_bitrate`].
pub fn video_bitrate_bps(
    target_bytes: u64,
    duration_s: f64,
    audio_bps: u64,
    safety: f64,
) -> Result<f64, BitrateError> {
    if !duration_s.is_finite() || duration_s <= 0.0 {
        return Err(BitrateError::InvalidDuration(duration_s));
    }

    let budget_bits = target_bytes as f64 * 8.0 * safety;
    let audio_bits = audio_bps as f64 * duration_s;
    Ok((budget_bits - audio_bits) / duration_s)
}

/// Compute the video bitrate for a target size in MB
pub fn target_bitrate(
    target_mb: u32,
    duration_s: f64,
    audio_kbps: u32,
    safety: f64,
) -> Result<TargetBitrate, BitrateError> {
    let target_bytes = u64::from(target_mb) * MB_TO_BYTES;
    let bps = video_bitrate_bps(target_bytes, duration_s, u64::from(audio_kbps) * 1000, safety)?;

    let video_kbps = (bps / 1000.0).floor();
    if video_kbps < f64::from(MIN_VIDEO_KBPS) {
        return Err(BitrateError::BudgetExhausted {
            target_mb: f64::from(target_mb),
            audio_kbps,
            duration_s,
        });
    }

    Ok(TargetBitrate {
        // Saturate rather than wrap for absurdly short clips
        video_kbps: video_kbps.min(f64::from(u32::MAX)) as u32,
        audio_kbps,
    })
}

/// Format a byte count as B / KB / MB
pub fn format_size(size_bytes: u64) -> String {
    if size_bytes < 1024 {
        format!("{} B", size_bytes)
    } else if size_bytes < MB_TO_BYTES {
        format!("{:.2} KB", size_bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", size_bytes as f64 / MB_TO_BYTES as f64)
    }
}

/// Size reduction in percent (negative when the output grew)
pub fn reduction_pct(original_bytes: u64, final_bytes: u64) -> f64 {
    if original_bytes == 0 {
        return 0.0;
    }
    (1.0 - final_bytes as f64 / original_bytes as f64) * 100.0
}
