use super::bitrate::TargetBitrate;
use super::encoder::VideoEncoder;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One encode of one input with one encoder
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub encoder: VideoEncoder,
    pub bitrate: TargetBitrate,
    pub fps: f64,
    pub duration_s: f64,

    /// Extra ffmpeg arguments, shell-quoted
    pub extra_args: String,
}

impl EncodeJob {
    pub fn new(
        input_path: PathBuf,
        output_path: PathBuf,
        encoder: VideoEncoder,
        bitrate: TargetBitrate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            input_path,
            output_path,
            encoder,
            bitrate,
            fps: 0.0,
            duration_s: 0.0,
            extra_args: String::new(),
        }
    }

    /// Directory holding this job's two-pass statistics files
    pub fn two_pass_dir(&self) -> PathBuf {
        std::env::temp_dir()
            .join("videocompress_2pass")
            .join(self.id.to_string())
    }

    /// `-passlogfile` prefix shared by both passes
    pub fn two_pass_log_prefix(&self) -> PathBuf {
        self.two_pass_dir().join("ffmpeg2pass")
    }
}

/// Default output path: `<dir>/<stem>_<MB>MB<ext>` next to the input
pub fn derive_output_path(input: &Path, target_size_mb: u32) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());

    let file_name = match input.extension() {
        Some(ext) => format!("{}_{}MB.{}", stem, target_size_mb, ext.to_string_lossy()),
        None => format!("{}_{}MB", stem, target_size_mb),
    };

    input.with_file_name(file_name)
}

/// Hidden sibling of `output` that ffmpeg writes to until the encode succeeds.
///
/// The extension stays last so ffmpeg still picks the muxer from it.
pub fn partial_output_path(output: &Path, id: Uuid) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let tag = id.simple().to_string();
    let tag = &tag[..8];

    let file_name = match output.extension() {
        Some(ext) => format!(".{}.videocompress-{}.{}", stem, tag, ext.to_string_lossy()),
        None => format!(".{}.videocompress-{}", stem, tag),
    };

    output.with_file_name(file_name)
}
