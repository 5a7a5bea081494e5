use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use videocompress::engine::VideoEncoder;

#[derive(Parser)]
#[command(name = "videocompress")]
#[command(about = "Compress a video to a target file size using the best available HEVC encoder", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Video file to compress. A file named like a subcommand needs a path
    /// prefix, e.g. `./probe`
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Output path and/or target size in MB, in any order (e.g. `out.mp4 50`)
    #[arg(value_name = "OUTPUT|SIZE_MB", num_args = 0..=2)]
    pub rest: Vec<String>,

    /// Encoder to try first, e.g. hevc_nvenc or libx265 (software only)
    #[arg(long, value_name = "NAME")]
    pub encoder: Option<VideoEncoder>,

    /// Print the chosen encoder, bitrate and ffmpeg commands without encoding
    #[arg(long)]
    pub dry_run: bool,

    /// Audio bitrate to reserve instead of the probed one
    #[arg(long, value_name = "KBPS")]
    pub audio_kbps: Option<u32>,

    /// Verbose logging (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Show the encoder priority chain for this platform and what works
    Encoders,

    /// Probe a video file and print its metadata
    Probe {
        /// Path to the video file
        file: PathBuf,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

impl Cli {
    /// Split the trailing positionals into output path and target size.
    ///
    /// An all-digit argument is a size, anything else is a path; when the same
    /// kind appears twice the later one wins.
    pub fn positionals(&self) -> Result<(Option<PathBuf>, Option<u32>), String> {
        parse_positionals(&self.rest)
    }
}

pub fn parse_positionals(args: &[String]) -> Result<(Option<PathBuf>, Option<u32>), String> {
    let mut output = None;
    let mut size = None;

    for arg in args {
        if !arg.is_empty() && arg.bytes().all(|b| b.is_ascii_digit()) {
            let mb: u32 = arg
                .parse()
                .map_err(|_| format!("target size '{}' is out of range", arg))?;
            if mb == 0 {
                return Err("target size must be at least 1 MB".to_string());
            }
            size = Some(mb);
        } else {
            output = Some(PathBuf::from(arg));
        }
    }

    Ok((output, size))
}

/// Exit with a clap-formatted usage error (status 2)
pub fn usage_error(kind: ErrorKind, message: impl std::fmt::Display) -> ! {
    Cli::command().error(kind, message).exit()
}

pub fn parse() -> Cli {
    Cli::parse()
}
