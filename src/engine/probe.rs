// Input probing using ffprobe

use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Metadata needed to plan an encode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration_s: f64,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_audio: bool,
    /// Audio bitrate as reported by ffprobe, if it reported one
    pub audio_bps: Option<u64>,
}

impl MediaInfo {
    /// Audio bitrate to reserve in the size budget, in kbps (rounded up).
    ///
    /// Falls back to `default_kbps` when the stream exists but carries no
    /// bitrate; no audio stream means nothing to reserve.
    pub fn audio_kbps(&self, default_kbps: u32) -> u32 {
        if !self.has_audio {
            return 0;
        }
        match self.audio_bps {
            Some(bps) => bps.div_ceil(1000).min(u64::from(u32::MAX)) as u32,
            None => default_kbps,
        }
    }
}

/// Probe input file using ffprobe to get video metadata
pub fn probe_media(ffprobe: &Path, input_path: &Path) -> Result<MediaInfo, ProbeError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(input_path)
        .output()
        .map_err(ProbeError::Spawn)?;

    if !output.status.success() {
        return Err(ProbeError::Failed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let size_bytes = std::fs::metadata(input_path)
        .map_err(ProbeError::Metadata)?
        .len();

    parse_probe_json(&String::from_utf8_lossy(&output.stdout), size_bytes)
}

/// Parse ffprobe `-show_format -show_streams` JSON into [`MediaInfo`]
pub fn parse_probe_json(json: &str, size_bytes: u64) -> Result<MediaInfo, ProbeError> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    // Prefer the container duration; some demuxers only report it per stream
    let duration_s = probe
        .format
        .as_ref()
        .and_then(|f| parse_positive(f.duration.as_deref()))
        .or_else(|| parse_positive(video.duration.as_deref()))
        .ok_or(ProbeError::MissingDuration)?;

    // avg_frame_rate is "0/0" for some streams; fall back to r_frame_rate
    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_fraction)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_fraction))
        .ok_or_else(|| {
            ProbeError::BadFrameRate(
                video
                    .avg_frame_rate
                    .clone()
                    .or_else(|| video.r_frame_rate.clone())
                    .unwrap_or_default(),
            )
        })?;

    let audio_bps = audio
        .and_then(|a| a.bit_rate.as_deref())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|bps| *bps > 0);

    Ok(MediaInfo {
        duration_s,
        size_bytes,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        fps,
        has_audio: audio.is_some(),
        audio_bps,
    })
}

fn parse_positive(s: Option<&str>) -> Option<f64> {
    s.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Parse a fraction string like "30000/1001" to f64
pub fn parse_fraction(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;

    let numerator: f64 = num.trim().parse().ok()?;
    let denominator: f64 = den.trim().parse().ok()?;

    if denominator == 0.0 || numerator <= 0.0 {
        return None;
    }

    Some(numerator / denominator)
}
