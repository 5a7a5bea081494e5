// Compression engine - independent of the CLI

pub mod bitrate;
pub mod command;
pub mod compress;
pub mod encoder;
pub mod job;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod tools;

pub use bitrate::{TargetBitrate, format_size, reduction_pct, target_bitrate};
pub use command::{build_encode_cmds, format_command};
pub use compress::{CompressEvent, CompressRequest, Outcome, compress_video};
pub use encoder::{
    EncoderProbe, FfmpegProbe, Platform, VideoEncoder, candidate_chain, chain_report,
    priority_chain,
};
pub use job::{EncodeJob, derive_output_path, partial_output_path};
pub use probe::{MediaInfo, probe_media};
pub use progress::{ProgressParser, format_eta};
pub use runner::ProgressUpdate;
pub use tools::{ToolPaths, ffmpeg_version, ffprobe_version};
