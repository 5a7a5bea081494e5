//! ffmpeg command construction.
//!
//! Nothing here runs a process; callers decide how to spawn the commands.

use super::encoder::VideoEncoder;
use super::job::EncodeJob;
use std::path::Path;
use std::process::Command;

/// Synthetic source used to check that an encoder initialises at all
const TEST_SOURCE: &str = "color=c=black:s=1280x720:r=1:d=0.1";

pub fn null_output_target() -> &'static str {
    if cfg!(windows) { "NUL" } else { "/dev/null" }
}

/// One-frame test encode to the null muxer; exit status tells whether the
/// encoder works on this machine.
pub fn build_availability_cmd(ffmpeg: &Path, encoder: VideoEncoder) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-v", "error"]);

    // VAAPI needs a device and an upload for software frames
    if encoder == VideoEncoder::HevcVaapi {
        cmd.args(["-init_hw_device", "vaapi"]);
    }

    cmd.args(["-f", "lavfi", "-i", TEST_SOURCE, "-vframes", "1"])
        .arg("-c:v")
        .arg(encoder.ffmpeg_name());

    if encoder == VideoEncoder::HevcVaapi {
        cmd.args(["-vf", "format=nv12,hwupload"]);
    }

    cmd.args(["-f", "null", "-"]);
    cmd
}

/// Apply additional user-provided FFmpeg arguments to the command.
/// Uses shell-style parsing so quoted strings with spaces are preserved.
fn apply_additional_args(cmd: &mut Command, additional_args: &str) {
    if additional_args.trim().is_empty() {
        return;
    }

    if let Some(args) = shlex::split(additional_args) {
        cmd.args(args);
    } else {
        // Unbalanced quotes: fall back to a plain whitespace split
        cmd.args(additional_args.split_whitespace());
    }
}

/// Flags shared by every encode: overwrite, quiet log, machine-readable progress
fn base_cmd(ffmpeg: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args([
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-progress",
        "pipe:1",
        "-nostats",
    ]);
    cmd
}

fn apply_hw_decode(cmd: &mut Command, encoder: VideoEncoder) {
    match encoder {
        VideoEncoder::HevcVaapi => {
            cmd.args(["-init_hw_device", "vaapi", "-hwaccel", "vaapi"]);
        }
        VideoEncoder::HevcAmf => {
            cmd.args(["-hwaccel", "d3d11va", "-hwaccel_output_format", "d3d11"]);
        }
        VideoEncoder::HevcQsv => {
            cmd.args(["-hwaccel", "qsv", "-hwaccel_output_format", "qsv"]);
        }
        VideoEncoder::HevcNvenc => {
            cmd.args(["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]);
        }
        VideoEncoder::HevcVideotoolbox | VideoEncoder::Libx265 => {}
    }
}

fn apply_encoder_tuning(cmd: &mut Command, encoder: VideoEncoder, fps: f64) {
    match encoder {
        VideoEncoder::HevcAmf => {
            cmd.args(["-usage", "transcoding", "-quality", "balanced", "-rc", "cbr"]);
        }
        VideoEncoder::HevcQsv => {
            cmd.args(["-load_plugin", "hevc_hw", "-preset", "medium"]);
        }
        VideoEncoder::HevcVaapi => {
            cmd.args(["-vf", "format=nv12,hwupload"]);
        }
        VideoEncoder::HevcVideotoolbox => {
            cmd.args(["-allow_sw", "1", "-realtime", "0"]);
        }
        VideoEncoder::HevcNvenc => {
            cmd.args(["-preset", "p5"]);
        }
        VideoEncoder::Libx265 => {
            cmd.args(["-preset", "medium", "-tag:v", "hvc1"]);
            // Pin the output rate so VFR sources don't balloon the frame count
            if fps > 0.0 {
                cmd.arg("-filter:v").arg(format!("fps={}", fps));
            }
        }
    }
}

/// Everything up to (not including) the pass flags and the output
fn video_cmd(ffmpeg: &Path, job: &EncodeJob) -> Command {
    let mut cmd = base_cmd(ffmpeg);
    apply_hw_decode(&mut cmd, job.encoder);
    cmd.arg("-i").arg(&job.input_path);
    cmd.arg("-c:v").arg(job.encoder.ffmpeg_name());
    apply_encoder_tuning(&mut cmd, job.encoder, job.fps);
    cmd.args(job.bitrate.rate_args());
    cmd
}

/// Single-pass encode straight to the output file
pub fn build_single_pass_cmd(ffmpeg: &Path, job: &EncodeJob) -> Command {
    let mut cmd = video_cmd(ffmpeg, job);
    cmd.args(["-c:a", "copy"]);
    apply_additional_args(&mut cmd, &job.extra_args);
    cmd.arg(&job.output_path);
    cmd
}

/// One pass of a two-pass encode. Pass 1 only gathers statistics and writes
/// to the null target; pass 2 writes the real output.
pub fn build_two_pass_cmd(ffmpeg: &Path, job: &EncodeJob, pass: u8) -> Command {
    let mut cmd = video_cmd(ffmpeg, job);
    cmd.arg("-pass").arg(pass.to_string());
    cmd.arg("-passlogfile").arg(job.two_pass_log_prefix());

    if pass == 1 {
        cmd.args(["-an", "-f", "null", null_output_target()]);
    } else {
        cmd.args(["-c:a", "copy"]);
        apply_additional_args(&mut cmd, &job.extra_args);
        cmd.arg(&job.output_path);
    }
    cmd
}

/// All commands needed to encode `job`, in execution order
pub fn build_encode_cmds(ffmpeg: &Path, job: &EncodeJob) -> Vec<Command> {
    if job.encoder.uses_two_pass() {
        vec![
            build_two_pass_cmd(ffmpeg, job, 1),
            build_two_pass_cmd(ffmpeg, job, 2),
        ]
    } else {
        vec![build_single_pass_cmd(ffmpeg, job)]
    }
}

/// Render a command as a shell-quoted, copy-pasteable string
pub fn format_command(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| {
            let s = part.to_string_lossy();
            shlex::try_quote(&s)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
