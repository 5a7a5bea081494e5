//! HEVC encoder catalogue, platform priority chains and availability probing

use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;

use super::command::build_availability_cmd;

// ============================================================================
// Video Encoder Selection
// ============================================================================

/// Supported video encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum VideoEncoder {
    HevcNvenc,        // NVIDIA NVENC
    HevcVaapi,        // VAAPI (Intel/AMD on Linux)
    HevcVideotoolbox, // Apple VideoToolbox
    HevcAmf,          // AMD AMF
    HevcQsv,          // Intel Quick Sync
    Libx265,          // Software, always last
}

impl VideoEncoder {
    pub const ALL: [VideoEncoder; 6] = [
        Self::HevcNvenc,
        Self::HevcVaapi,
        Self::HevcVideotoolbox,
        Self::HevcAmf,
        Self::HevcQsv,
        Self::Libx265,
    ];

    /// Get the FFmpeg encoder name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::HevcNvenc => "hevc_nvenc",
            Self::HevcVaapi => "hevc_vaapi",
            Self::HevcVideotoolbox => "hevc_videotoolbox",
            Self::HevcAmf => "hevc_amf",
            Self::HevcQsv => "hevc_qsv",
            Self::Libx265 => "libx265",
        }
    }

    /// Get user-friendly display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::HevcNvenc => "HEVC NVENC (NVIDIA)",
            Self::HevcVaapi => "HEVC VAAPI (Hardware)",
            Self::HevcVideotoolbox => "HEVC VideoToolbox (Apple)",
            Self::HevcAmf => "HEVC AMF (AMD)",
            Self::HevcQsv => "HEVC Quick Sync (Intel)",
            Self::Libx265 => "x265 (Software)",
        }
    }

    /// Check if this is a hardware encoder
    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Libx265)
    }

    /// NVENC gets a two-pass encode; everything else is single pass
    pub fn uses_two_pass(&self) -> bool {
        matches!(self, Self::HevcNvenc)
    }
}

impl fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

impl From<VideoEncoder> for &'static str {
    fn from(enc: VideoEncoder) -> Self {
        enc.ffmpeg_name()
    }
}

impl FromStr for VideoEncoder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.ffmpeg_name() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|e| e.ffmpeg_name()).collect();
                format!("unknown encoder '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Operating system family, which decides the hardware priority chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Other
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Other => "other",
        }
    }
}

/// Hardware encoders worth checking on a platform, best first.
///
/// The software fallback is not part of the chain; [`candidate_chain`] always
/// appends it.
pub fn priority_chain(platform: Platform) -> &'static [VideoEncoder] {
    use VideoEncoder::*;
    match platform {
        // Nvidia, then VAAPI (Intel/AMD)
        Platform::Linux => &[HevcNvenc, HevcVaapi],
        Platform::MacOs => &[HevcVideotoolbox],
        // Nvidia -> AMD -> Intel
        Platform::Windows => &[HevcNvenc, HevcAmf, HevcQsv],
        Platform::Other => &[HevcNvenc, HevcVaapi, HevcVideotoolbox, HevcAmf, HevcQsv],
    }
}

/// Answers whether an encoder actually works on this machine
pub trait EncoderProbe {
    fn is_available(&self, encoder: VideoEncoder) -> bool;
}

/// Probes encoders by running a tiny test encode through ffmpeg.
///
/// Results are cached per instance, so each encoder is tried at most once.
pub struct FfmpegProbe {
    ffmpeg: PathBuf,
    compiled_in: RefCell<Option<String>>,
    cache: RefCell<HashMap<VideoEncoder, bool>>,
}

impl FfmpegProbe {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            compiled_in: RefCell::new(None),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// False only when `ffmpeg -encoders` ran and doesn't list the encoder
    fn listed(&self, encoder: VideoEncoder) -> bool {
        let mut listing = self.compiled_in.borrow_mut();
        let encoders_output = listing.get_or_insert_with(|| {
            Command::new(&self.ffmpeg)
                .args(["-hide_banner", "-encoders"])
                .stdin(Stdio::null())
                .output()
                .ok()
                .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
                .unwrap_or_default()
        });

        encoders_output.is_empty() || encoders_output.contains(encoder.ffmpeg_name())
    }

    fn test_encode(&self, encoder: VideoEncoder) -> bool {
        let mut cmd = build_availability_cmd(&self.ffmpeg, encoder);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        match cmd.output() {
            Ok(out) if out.status.success() => true,
            Ok(out) => {
                tracing::debug!(
                    encoder = %encoder,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "test encode failed"
                );
                false
            }
            Err(e) => {
                tracing::debug!(encoder = %encoder, error = %e, "could not run ffmpeg");
                false
            }
        }
    }
}

impl EncoderProbe for FfmpegProbe {
    fn is_available(&self, encoder: VideoEncoder) -> bool {
        if let Some(&known) = self.cache.borrow().get(&encoder) {
            return known;
        }

        let available = self.listed(encoder) && self.test_encode(encoder);
        self.cache.borrow_mut().insert(encoder, available);
        available
    }
}

/// Ordered list of encoders to attempt.
///
/// A working `preferred` encoder goes first, then the available members of the
/// platform chain in priority order, and `libx265` always closes the list.
/// Preferring `libx265` itself means software only.
pub fn candidate_chain(
    platform: Platform,
    preferred: Option<VideoEncoder>,
    probe: &dyn EncoderProbe,
) -> Vec<VideoEncoder> {
    let mut candidates = Vec::new();

    if let Some(pref) = preferred {
        if !pref.is_hardware() {
            tracing::info!("software encoding requested, skipping hardware checks");
            return vec![VideoEncoder::Libx265];
        }
        if probe.is_available(pref) {
            tracing::info!("preferred encoder {} available", pref);
            candidates.push(pref);
        } else {
            tracing::warn!("preferred encoder {} not available, using priority chain", pref);
        }
    }

    let chain = priority_chain(platform);
    tracing::info!(
        "platform {}: checking encoders {}",
        platform.name(),
        chain
            .iter()
            .map(|e| e.ffmpeg_name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    for &enc in chain {
        if candidates.contains(&enc) {
            continue;
        }
        let available = probe.is_available(enc);
        tracing::info!(
            "  {}: {}",
            enc,
            if available { "available" } else { "unavailable" }
        );
        if available {
            candidates.push(enc);
        }
    }

    if !candidates.contains(&VideoEncoder::Libx265) {
        if candidates.is_empty() {
            tracing::info!("no hardware encoder found, falling back to CPU");
        }
        candidates.push(VideoEncoder::Libx265);
    }

    candidates
}

/// Availability of every encoder in the platform chain (for diagnostics)
pub fn chain_report(platform: Platform, probe: &dyn EncoderProbe) -> Vec<(VideoEncoder, bool)> {
    priority_chain(platform)
        .iter()
        .map(|&enc| (enc, probe.is_available(enc)))
        .chain(std::iter::once((VideoEncoder::Libx265, true)))
        .collect()
}
