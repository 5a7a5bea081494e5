//! The compression pipeline: probe, budget, pick encoders, encode with fallback.

use super::bitrate::{MB_TO_BYTES, TargetBitrate, reduction_pct, target_bitrate};
use super::command::{build_encode_cmds, format_command};
use super::encoder::{EncoderProbe, Platform, VideoEncoder, candidate_chain};
use super::job::{EncodeJob, derive_output_path, partial_output_path};
use super::probe::{MediaInfo, probe_media};
use super::runner::{ProgressUpdate, run_passes, stderr_tail, was_user_cancelled};
use super::tools::ToolPaths;
use crate::config::Config;
use crate::error::{CompressError, EncodeAttempt};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// Lines of ffmpeg stderr kept per failed attempt
const ERROR_TAIL_LINES: usize = 5;

/// What the caller asked for. `None` fields fall back to the config.
#[derive(Debug, Clone, Default)]
pub struct CompressRequest {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub target_size_mb: Option<u32>,
    pub preferred_encoder: Option<VideoEncoder>,
    /// Audio bitrate to reserve instead of the probed one
    pub audio_kbps: Option<u32>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Compressed {
        encoder: VideoEncoder,
        output: PathBuf,
        original_bytes: u64,
        final_bytes: u64,
        reduction_pct: f64,
        elapsed_s: f64,
    },
    /// Input already fits; nothing was written
    AlreadySmaller { size_bytes: u64, target_bytes: u64 },
    DryRun {
        encoder: VideoEncoder,
        output: PathBuf,
        bitrate: TargetBitrate,
        commands: Vec<String>,
    },
}

/// Things worth telling the user while a compression runs
#[derive(Debug, Clone)]
pub enum CompressEvent {
    Probed(MediaInfo),
    Planned {
        bitrate: TargetBitrate,
        candidates: Vec<VideoEncoder>,
    },
    AttemptStarted {
        encoder: VideoEncoder,
        attempt: usize,
        of: usize,
    },
    Progress(ProgressUpdate),
    AttemptFailed {
        encoder: VideoEncoder,
        error: String,
    },
}

enum AttemptResult {
    Done,
    Failed(String),
    Cancelled,
}

/// Compress `request.input` so the output lands under the target size
pub fn compress_video(
    request: &CompressRequest,
    config: &Config,
    tools: &ToolPaths,
    probe: &dyn EncoderProbe,
    on_event: &mut dyn FnMut(&CompressEvent),
) -> Result<Outcome, CompressError> {
    let input = &request.input;
    if !input.is_file() {
        return Err(CompressError::InputNotFound(input.clone()));
    }

    let info = probe_media(&tools.ffprobe, input).map_err(|source| CompressError::Probe {
        path: input.clone(),
        source,
    })?;
    tracing::info!(
        "input {}: {:.2}s, {}x{} @ {:.3} fps, {} bytes",
        input.display(),
        info.duration_s,
        info.width,
        info.height,
        info.fps,
        info.size_bytes
    );
    on_event(&CompressEvent::Probed(info.clone()));

    let target_mb = request
        .target_size_mb
        .unwrap_or(config.defaults.target_size_mb);
    let target_bytes = u64::from(target_mb) * MB_TO_BYTES;
    if info.size_bytes <= target_bytes {
        tracing::info!("input already fits in {} MB, nothing to do", target_mb);
        return Ok(Outcome::AlreadySmaller {
            size_bytes: info.size_bytes,
            target_bytes,
        });
    }

    let output = request
        .output
        .clone()
        .unwrap_or_else(|| derive_output_path(input, target_mb));
    if is_same_file(input, &output) {
        return Err(CompressError::OutputIsInput(output));
    }

    let audio_kbps = request
        .audio_kbps
        .unwrap_or_else(|| info.audio_kbps(config.defaults.default_audio_kbps));
    let bitrate = target_bitrate(
        target_mb,
        info.duration_s,
        audio_kbps,
        config.defaults.safety_factor,
    )?;
    tracing::info!(
        "target {} MB: video {}k, audio {}k",
        target_mb,
        bitrate.video_kbps,
        bitrate.audio_kbps
    );

    let preferred = request
        .preferred_encoder
        .or_else(|| configured_encoder(config));
    let candidates = candidate_chain(Platform::current(), preferred, probe);
    on_event(&CompressEvent::Planned {
        bitrate,
        candidates: candidates.clone(),
    });

    let new_job = |encoder: VideoEncoder, target: &Path| {
        let mut job = EncodeJob::new(input.clone(), target.to_path_buf(), encoder, bitrate);
        job.fps = info.fps;
        job.duration_s = info.duration_s;
        job.extra_args = config.defaults.extra_args.clone();
        job
    };

    if request.dry_run {
        // The chain always ends with libx265, so it is never empty
        let encoder = candidates.first().copied().unwrap_or(VideoEncoder::Libx265);
        let job = new_job(encoder, &output);
        let commands = build_encode_cmds(&tools.ffmpeg, &job)
            .iter()
            .map(format_command)
            .collect();
        return Ok(Outcome::DryRun {
            encoder,
            output,
            bitrate,
            commands,
        });
    }

    // ffmpeg only ever writes here; `output` is replaced once an encode succeeds
    let partial = partial_output_path(&output, Uuid::new_v4());
    let started = Instant::now();
    let mut attempts = Vec::new();
    let mut used = None;

    for (idx, &encoder) in candidates.iter().enumerate() {
        on_event(&CompressEvent::AttemptStarted {
            encoder,
            attempt: idx + 1,
            of: candidates.len(),
        });
        tracing::info!("encoding with {} ({}/{})", encoder, idx + 1, candidates.len());

        let job = new_job(encoder, &partial);
        match run_attempt(&tools.ffmpeg, &job, on_event) {
            AttemptResult::Done => {
                used = Some(encoder);
                break;
            }
            AttemptResult::Cancelled => {
                tracing::warn!("{} cancelled by user", encoder);
                return Err(CompressError::Cancelled {
                    encoder: encoder.to_string(),
                    partial: keep_partial(&partial, &output),
                });
            }
            AttemptResult::Failed(error) => {
                tracing::warn!("{} failed: {}", encoder, error);
                remove_partial(&partial);
                on_event(&CompressEvent::AttemptFailed {
                    encoder,
                    error: error.clone(),
                });
                attempts.push(EncodeAttempt {
                    encoder: encoder.to_string(),
                    error,
                });

                if !config.defaults.fallback_on_failure {
                    break;
                }
            }
        }
    }

    let Some(encoder) = used else {
        return Err(CompressError::AllEncodersFailed { attempts });
    };

    if !partial.is_file() {
        return Err(CompressError::OutputMissing(output));
    }
    fs::rename(&partial, &output)?;
    let final_bytes = fs::metadata(&output)?.len();

    Ok(Outcome::Compressed {
        encoder,
        output,
        original_bytes: info.size_bytes,
        final_bytes,
        reduction_pct: reduction_pct(info.size_bytes, final_bytes),
        elapsed_s: started.elapsed().as_secs_f64(),
    })
}

/// `defaults.preferred_encoder` from the config, ignored with a warning if unknown
fn configured_encoder(config: &Config) -> Option<VideoEncoder> {
    let name = config.defaults.preferred_encoder.as_deref()?;
    match name.parse() {
        Ok(enc) => Some(enc),
        Err(e) => {
            tracing::warn!("ignoring preferred_encoder in config: {}", e);
            None
        }
    }
}

fn run_attempt(
    ffmpeg: &Path,
    job: &EncodeJob,
    on_event: &mut dyn FnMut(&CompressEvent),
) -> AttemptResult {
    let two_pass = job.encoder.uses_two_pass();
    if two_pass {
        if let Err(e) = fs::create_dir_all(job.two_pass_dir()) {
            return AttemptResult::Failed(format!("failed to create two-pass log dir: {}", e));
        }
    }

    let cmds = build_encode_cmds(ffmpeg, job);
    for cmd in &cmds {
        tracing::debug!("ffmpeg command: {}", format_command(cmd));
    }

    let mut forward = |update: &ProgressUpdate| on_event(&CompressEvent::Progress(update.clone()));
    let result = run_passes(cmds, job.duration_s, &mut forward);

    if two_pass {
        // Stats files are useless once the encode is over, whatever happened
        if let Err(e) = fs::remove_dir_all(job.two_pass_dir()) {
            tracing::debug!("could not remove two-pass dir: {}", e);
        }
    }

    match result {
        Err(e) => AttemptResult::Failed(format!("failed to run ffmpeg: {}", e)),
        Ok(run) if run.success() => AttemptResult::Done,
        Ok(run) if was_user_cancelled(&run.status, &run.stderr) => AttemptResult::Cancelled,
        Ok(run) => {
            let tail = stderr_tail(&run.stderr, ERROR_TAIL_LINES);
            let mut msg = match run.failed_pass {
                Some(pass) if job.encoder.uses_two_pass() => {
                    format!("pass {} exited with {}", pass, run.status)
                }
                _ => format!("ffmpeg exited with {}", run.status),
            };
            if !tail.is_empty() {
                msg.push_str(": ");
                msg.push_str(&tail);
            }
            AttemptResult::Failed(msg)
        }
    }
}

/// True when `output` already exists and is the same file as `input`
fn is_same_file(input: &Path, output: &Path) -> bool {
    match (fs::canonicalize(input), fs::canonicalize(output)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn remove_partial(partial: &Path) {
    if partial.exists() {
        match fs::remove_file(partial) {
            Ok(()) => tracing::debug!("removed partial output {}", partial.display()),
            Err(e) => tracing::warn!("could not remove partial output {}: {}", partial.display(), e),
        }
    }
}

/// Move a cancelled encode's partial file to `output` unless that would
/// replace an existing file. Returns where the partial file ended up.
fn keep_partial(partial: &Path, output: &Path) -> PathBuf {
    if partial.exists() && !output.exists() {
        match fs::rename(partial, output) {
            Ok(()) => return output.to_path_buf(),
            Err(e) => tracing::warn!("could not move partial output into place: {}", e),
        }
    }
    partial.to_path_buf()
}
