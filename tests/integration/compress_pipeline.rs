// Drives compress_video end to end against fake ffmpeg/ffprobe scripts
//
// Covers encoder fallback, two-pass NVENC, cancellation and the early exits
// without needing real hardware.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use videocompress::config::Config;
use videocompress::engine::{
    CompressEvent, CompressRequest, EncoderProbe, Outcome, ToolPaths, VideoEncoder,
    compress_video,
};
use videocompress::error::{BitrateError, CompressError};

use crate::common::fake_tools::*;
use crate::common::helpers::write_input;

/// Two MiB, comfortably over a 1 MB target
const BIG_INPUT: usize = 2 * 1024 * 1024;

struct Available(HashSet<VideoEncoder>);

impl Available {
    fn only(encoders: &[VideoEncoder]) -> Self {
        Self(encoders.iter().copied().collect())
    }
}

impl EncoderProbe for Available {
    fn is_available(&self, encoder: VideoEncoder) -> bool {
        self.0.contains(&encoder)
    }
}

struct Fixture {
    dir: TempDir,
    tools: ToolPaths,
    input: PathBuf,
}

impl Fixture {
    fn new(input_len: usize, behaviors: &[(&str, Behavior)]) -> Self {
        Self::with_probe(input_len, &probe_json(10.0, Some(128_000)), behaviors)
    }

    fn with_probe(input_len: usize, json: &str, behaviors: &[(&str, Behavior)]) -> Self {
        let dir = TempDir::new().unwrap();
        let tools = ToolPaths {
            ffmpeg: fake_ffmpeg(dir.path(), behaviors),
            ffprobe: fake_ffprobe(dir.path(), json),
        };
        let input = write_input(dir.path(), "clip.mp4", input_len);
        Self { dir, tools, input }
    }

    fn request(&self, preferred: Option<VideoEncoder>) -> CompressRequest {
        CompressRequest {
            input: self.input.clone(),
            output: Some(self.dir.path().join("out.mp4")),
            target_size_mb: Some(1),
            preferred_encoder: preferred,
            ..Default::default()
        }
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out.mp4")
    }

    /// Leftover in-progress files next to the output
    fn partials(&self) -> Vec<String> {
        fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.contains(".videocompress-"))
            .collect()
    }

    fn run(
        &self,
        request: &CompressRequest,
        config: &Config,
        available: &[VideoEncoder],
    ) -> (Result<Outcome, CompressError>, Vec<CompressEvent>) {
        let mut events = Vec::new();
        let result = compress_video(
            request,
            config,
            &self.tools,
            &Available::only(available),
            &mut |e| events.push(e.clone()),
        );
        (result, events)
    }
}

#[test]
fn falls_back_to_software_when_hardware_fails() {
    let fx = Fixture::new(
        BIG_INPUT,
        &[(
            "hevc_vaapi",
            Behavior::Fail("Failed to initialise VAAPI connection"),
        )],
    );

    let (result, events) = fx.run(
        &fx.request(Some(VideoEncoder::HevcVaapi)),
        &Config::default(),
        &[VideoEncoder::HevcVaapi],
    );

    match result.unwrap() {
        Outcome::Compressed {
            encoder,
            output,
            original_bytes,
            final_bytes,
            ..
        } => {
            assert_eq!(encoder, VideoEncoder::Libx265);
            assert_eq!(output, fx.output());
            assert_eq!(original_bytes, BIG_INPUT as u64);
            assert_eq!(final_bytes, "encoded".len() as u64);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let calls = invocations(fx.dir.path());
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("-c:v hevc_vaapi"));
    assert!(calls[1].contains("-c:v libx265"));

    let failure = events.iter().find_map(|e| match e {
        CompressEvent::AttemptFailed { encoder, error } => Some((*encoder, error.clone())),
        _ => None,
    });
    let (encoder, error) = failure.expect("vaapi failure reported");
    assert_eq!(encoder, VideoEncoder::HevcVaapi);
    assert!(error.contains("Failed to initialise VAAPI connection"), "{}", error);
}

#[test]
fn progress_events_reach_the_caller() {
    let fx = Fixture::new(BIG_INPUT, &[]);
    let (result, events) = fx.run(
        &fx.request(Some(VideoEncoder::Libx265)),
        &Config::default(),
        &[],
    );
    assert!(result.is_ok());

    let pcts: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            CompressEvent::Progress(u) => Some(u.overall_pct),
            _ => None,
        })
        .collect();
    assert_eq!(pcts, vec![50.0, 100.0]);

    assert!(matches!(
        events.first(),
        Some(CompressEvent::Probed(info)) if info.duration_s == 10.0
    ));
}

#[test]
fn nvenc_runs_two_sequential_passes() {
    let fx = Fixture::new(BIG_INPUT, &[]);
    let (result, _) = fx.run(
        &fx.request(Some(VideoEncoder::HevcNvenc)),
        &Config::default(),
        &[VideoEncoder::HevcNvenc],
    );

    match result.unwrap() {
        Outcome::Compressed { encoder, .. } => assert_eq!(encoder, VideoEncoder::HevcNvenc),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let calls = invocations(fx.dir.path());
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("-pass 1"));
    assert!(calls[0].contains("-an"));
    assert!(calls[1].contains("-pass 2"));
    assert!(calls[1].contains(".out.videocompress-"));
    assert!(calls[1].ends_with(".mp4"));
    assert_eq!(fs::read_to_string(fx.output()).unwrap(), "encoded");
    assert!(fx.partials().is_empty());

    let passlog = |line: &str| {
        line.split_whitespace()
            .skip_while(|a| *a != "-passlogfile")
            .nth(1)
            .map(PathBuf::from)
    };
    let prefix = passlog(&calls[0]).expect("pass 1 has a passlogfile");
    assert_eq!(passlog(&calls[1]).as_ref(), Some(&prefix));
    let stats_dir = prefix.parent().unwrap();
    assert!(!stats_dir.exists(), "two-pass stats dir should be cleaned up");
}

#[test]
fn all_failures_are_reported_together() {
    let fx = Fixture::new(
        BIG_INPUT,
        &[
            ("hevc_nvenc", Behavior::Fail("No NVENC capable devices found")),
            ("libx265", Behavior::Fail("x265 exploded")),
        ],
    );

    let (result, _) = fx.run(
        &fx.request(Some(VideoEncoder::HevcNvenc)),
        &Config::default(),
        &[VideoEncoder::HevcNvenc],
    );

    match result.unwrap_err() {
        CompressError::AllEncodersFailed { attempts } => {
            let names: Vec<_> = attempts.iter().map(|a| a.encoder.as_str()).collect();
            assert_eq!(names, ["hevc_nvenc", "libx265"]);
            assert!(attempts[0].error.contains("pass 1"));
            assert!(attempts[0].error.contains("No NVENC capable devices found"));
            assert!(attempts[1].error.contains("x265 exploded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(!fx.output().exists(), "partial output should be removed");
    assert!(fx.partials().is_empty(), "{:?}", fx.partials());
}

#[test]
fn no_fallback_when_disabled() {
    let fx = Fixture::new(
        BIG_INPUT,
        &[("hevc_vaapi", Behavior::Fail("vaapi init failed"))],
    );
    let mut config = Config::default();
    config.defaults.fallback_on_failure = false;

    let (result, _) = fx.run(
        &fx.request(Some(VideoEncoder::HevcVaapi)),
        &config,
        &[VideoEncoder::HevcVaapi],
    );

    match result.unwrap_err() {
        CompressError::AllEncodersFailed { attempts } => {
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].encoder, "hevc_vaapi");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(invocations(fx.dir.path()).len(), 1);
}

#[test]
fn cancellation_stops_the_chain_and_keeps_output() {
    let fx = Fixture::new(BIG_INPUT, &[("hevc_vaapi", Behavior::Cancel)]);

    let (result, _) = fx.run(
        &fx.request(Some(VideoEncoder::HevcVaapi)),
        &Config::default(),
        &[VideoEncoder::HevcVaapi],
    );

    match result.unwrap_err() {
        CompressError::Cancelled { encoder, partial } => {
            assert_eq!(encoder, "hevc_vaapi");
            assert_eq!(partial, fx.output());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(invocations(fx.dir.path()).len(), 1, "libx265 must not run");
    assert_eq!(fs::read_to_string(fx.output()).unwrap(), "partial");
}

#[test]
fn cancellation_does_not_replace_an_existing_output() {
    let fx = Fixture::new(BIG_INPUT, &[("hevc_vaapi", Behavior::Cancel)]);
    fs::write(fx.output(), "keep me").unwrap();

    let (result, _) = fx.run(
        &fx.request(Some(VideoEncoder::HevcVaapi)),
        &Config::default(),
        &[VideoEncoder::HevcVaapi],
    );

    let partial = match result.unwrap_err() {
        CompressError::Cancelled { partial, .. } => partial,
        other => panic!("unexpected error: {:?}", other),
    };
    assert_ne!(partial, fx.output());
    assert_eq!(fs::read_to_string(&partial).unwrap(), "partial");
    assert_eq!(fs::read_to_string(fx.output()).unwrap(), "keep me");
}

#[test]
fn output_pointing_at_the_input_is_rejected() {
    let fx = Fixture::new(BIG_INPUT, &[("libx265", Behavior::Reject("Output same as Input"))]);
    let mut request = fx.request(Some(VideoEncoder::Libx265));
    // Same file, spelled differently
    request.output = Some(fx.dir.path().join(".").join("clip.mp4"));

    let (result, _) = fx.run(&request, &Config::default(), &[]);

    match result.unwrap_err() {
        CompressError::OutputIsInput(path) => assert!(path.ends_with("clip.mp4")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(invocations(fx.dir.path()).is_empty());
    assert_eq!(fs::metadata(&fx.input).unwrap().len(), BIG_INPUT as u64);
}

#[test]
fn existing_output_survives_a_failed_encode() {
    let fx = Fixture::new(
        BIG_INPUT,
        &[
            ("hevc_vaapi", Behavior::Fail("vaapi init failed")),
            ("libx265", Behavior::Reject("Unknown encoder 'libx265'")),
        ],
    );
    fs::write(fx.output(), "keep me").unwrap();

    let (result, _) = fx.run(
        &fx.request(Some(VideoEncoder::HevcVaapi)),
        &Config::default(),
        &[VideoEncoder::HevcVaapi],
    );

    assert!(matches!(
        result,
        Err(CompressError::AllEncodersFailed { .. })
    ));
    assert_eq!(fs::read_to_string(fx.output()).unwrap(), "keep me");
    assert!(fx.partials().is_empty(), "{:?}", fx.partials());
}

#[test]
fn successful_encode_replaces_existing_output() {
    let fx = Fixture::new(BIG_INPUT, &[]);
    fs::write(fx.output(), "stale").unwrap();

    let (result, _) = fx.run(
        &fx.request(Some(VideoEncoder::Libx265)),
        &Config::default(),
        &[],
    );

    assert!(matches!(result, Ok(Outcome::Compressed { .. })));
    assert_eq!(fs::read_to_string(fx.output()).unwrap(), "encoded");
    assert!(fx.partials().is_empty());
}

#[test]
fn small_input_is_left_alone() {
    let fx = Fixture::new(1024, &[]);
    let (result, _) = fx.run(&fx.request(None), &Config::default(), &[]);

    match result.unwrap() {
        Outcome::AlreadySmaller {
            size_bytes,
            target_bytes,
        } => {
            assert_eq!(size_bytes, 1024);
            assert_eq!(target_bytes, 1024 * 1024);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(invocations(fx.dir.path()).is_empty());
    assert!(!fx.output().exists());
}

#[test]
fn input_exactly_at_target_is_left_alone() {
    let fx = Fixture::new(1024 * 1024, &[]);
    let (result, _) = fx.run(&fx.request(None), &Config::default(), &[]);
    assert!(matches!(result, Ok(Outcome::AlreadySmaller { .. })));
}

#[test]
fn dry_run_builds_commands_without_encoding() {
    let fx = Fixture::new(BIG_INPUT, &[]);
    let mut request = fx.request(None);
    request.dry_run = true;
    request.output = None;

    let (result, _) = fx.run(&request, &Config::default(), &[]);

    match result.unwrap() {
        Outcome::DryRun {
            encoder,
            output,
            bitrate,
            commands,
        } => {
            assert_eq!(encoder, VideoEncoder::Libx265);
            assert_eq!(output, fx.dir.path().join("clip_1MB.mp4"));
            // (1 MiB * 8 * 0.95 - 128k * 10s) / 10s
            assert_eq!(bitrate.video_kbps, 668);
            assert_eq!(bitrate.audio_kbps, 128);
            assert_eq!(commands.len(), 1);
            assert!(commands[0].contains("668k"));
            assert!(commands[0].contains("libx265"));
            assert!(commands[0].contains("clip_1MB.mp4"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(invocations(fx.dir.path()).is_empty());
}

#[test]
fn audio_override_changes_the_budget() {
    let fx = Fixture::new(BIG_INPUT, &[]);
    let mut request = fx.request(None);
    request.dry_run = true;
    request.audio_kbps = Some(64);

    let (result, _) = fx.run(&request, &Config::default(), &[]);
    match result.unwrap() {
        Outcome::DryRun { bitrate, .. } => {
            assert_eq!(bitrate.audio_kbps, 64);
            // (7969177.6 - 640000) / 10 = 732917.76 bps
            assert_eq!(bitrate.video_kbps, 732);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn silent_input_reserves_no_audio() {
    let fx = Fixture::with_probe(BIG_INPUT, &probe_json(10.0, None), &[]);
    let mut request = fx.request(None);
    request.dry_run = true;

    let (result, _) = fx.run(&request, &Config::default(), &[]);
    match result.unwrap() {
        Outcome::DryRun { bitrate, .. } => {
            assert_eq!(bitrate.audio_kbps, 0);
            assert_eq!(bitrate.video_kbps, 796);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn budget_too_small_for_audio_is_an_error() {
    let fx = Fixture::with_probe(BIG_INPUT, &probe_json(100_000.0, Some(128_000)), &[]);
    let (result, _) = fx.run(&fx.request(None), &Config::default(), &[]);

    assert!(matches!(
        result,
        Err(CompressError::Bitrate(BitrateError::BudgetExhausted { .. }))
    ));
    assert!(invocations(fx.dir.path()).is_empty());
}

#[test]
fn probe_failure_names_the_input() {
    let fx = Fixture::with_probe(BIG_INPUT, "not json", &[]);
    let (result, _) = fx.run(&fx.request(None), &Config::default(), &[]);

    let err = result.unwrap_err();
    assert!(matches!(err, CompressError::Probe { .. }));
    assert!(err.to_string().contains("clip.mp4"));
}
