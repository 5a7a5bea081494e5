use crate::cli::{self, Cli, Commands};
use anyhow::{Context, Result};
use clap::error::ErrorKind;
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::process;
use videocompress::config::Config;
use videocompress::engine::{
    self, CompressEvent, CompressRequest, FfmpegProbe, Outcome, Platform, ToolPaths,
    format_eta, format_size,
};
use videocompress::logging;

pub fn run(cli: Cli) {
    let (config, config_warning) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    logging::init_logging(&config.logging, cli.verbose);

    // init-config reports a broken file itself
    if let Some(e) = &config_warning {
        if !matches!(cli.command, Some(Commands::InitConfig)) {
            tracing::warn!("{:#}; using built-in defaults", e);
        }
    }

    let tools = ToolPaths::resolve(&config.tools);
    tracing::debug!(ffmpeg = %tools.ffmpeg.display(), ffprobe = %tools.ffprobe.display(), "resolved tools");

    let result = match cli.command {
        Some(Commands::CheckFfmpeg) => handle_check_ffmpeg(&tools),
        Some(Commands::Encoders) => handle_encoders(&tools),
        Some(Commands::Probe { ref file, json }) => handle_probe(&tools, file, json),
        Some(Commands::InitConfig) => handle_init_config(config_warning),
        None => handle_compress(&cli, &config, &tools),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn handle_check_ffmpeg(tools: &ToolPaths) -> Result<()> {
    let version = engine::ffmpeg_version(tools)?;
    println!("ffmpeg found: {}", version);
    let probe_version = engine::ffprobe_version(tools)?;
    println!("ffprobe found: {}", probe_version);
    Ok(())
}

fn handle_encoders(tools: &ToolPaths) -> Result<()> {
    let platform = Platform::current();
    let probe = FfmpegProbe::new(&tools.ffmpeg);

    println!("Platform: {}", platform.name());
    println!("Encoders in priority order:");
    for (encoder, available) in engine::chain_report(platform, &probe) {
        println!(
            "  {:<18} {:<28} {}",
            encoder.ffmpeg_name(),
            encoder.display_name(),
            if available { "available" } else { "unavailable" }
        );
    }
    Ok(())
}

fn handle_probe(tools: &ToolPaths, file: &Path, json: bool) -> Result<()> {
    let info = engine::probe_media(&tools.ffprobe, file)
        .with_context(|| format!("Failed to probe {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File:       {}", file.display());
    println!("Duration:   {:.2} seconds", info.duration_s);
    println!("Resolution: {}x{}", info.width, info.height);
    println!("Frame rate: {:.3} fps", info.fps);
    println!("Size:       {}", format_size(info.size_bytes));
    match (info.has_audio, info.audio_bps) {
        (false, _) => println!("Audio:      none"),
        (true, Some(bps)) => println!("Audio:      {} kbps", bps.div_ceil(1000)),
        (true, None) => println!("Audio:      present (bitrate unknown)"),
    }
    Ok(())
}

fn handle_init_config(load_error: Option<anyhow::Error>) -> Result<()> {
    let path = Config::config_path()?;

    if Config::exists() {
        if let Some(e) = load_error {
            anyhow::bail!(
                "config at {} is invalid ({:#}); fix or delete it, then run init-config again",
                path.display(),
                e
            );
        }
        let cfg = Config::load()?;
        println!("Config loaded successfully from {}", path.display());
        print!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    println!("No config at {}", path.display());
    println!("Creating default config...");
    Config::default()
        .save()
        .context("Failed to save default config")?;
    println!("Default config saved to {}", path.display());
    Ok(())
}

fn handle_compress(cli: &Cli, config: &Config, tools: &ToolPaths) -> Result<()> {
    let Some(input) = cli.input.clone() else {
        cli::usage_error(
            ErrorKind::MissingRequiredArgument,
            "the following required arguments were not provided:\n  <INPUT>",
        );
    };
    let (output, target_size_mb) = cli
        .positionals()
        .unwrap_or_else(|msg| cli::usage_error(ErrorKind::InvalidValue, msg));

    let request = CompressRequest {
        input,
        output,
        target_size_mb,
        preferred_encoder: cli.encoder,
        audio_kbps: cli.audio_kbps,
        dry_run: cli.dry_run,
    };

    let probe = FfmpegProbe::new(&tools.ffmpeg);
    let mut status = StatusLine::new();
    let outcome = engine::compress_video(&request, config, tools, &probe, &mut |event| {
        status.handle(event)
    });
    status.finish();

    let outcome = outcome?;
    report(&outcome);

    // Nothing was produced, so scripts must not treat this as a compressed file
    if matches!(outcome, Outcome::AlreadySmaller { .. }) {
        process::exit(1);
    }
    Ok(())
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::AlreadySmaller {
            size_bytes,
            target_bytes,
        } => {
            println!(
                "Input is already {} (target {}), nothing to do.",
                format_size(*size_bytes),
                format_size(*target_bytes)
            );
        }
        Outcome::DryRun {
            encoder,
            output,
            bitrate,
            commands,
        } => {
            println!("Encoder: {} ({})", encoder, encoder.display_name());
            println!("Output:  {}", output.display());
            println!(
                "Bitrate: video {}k, audio {}k",
                bitrate.video_kbps, bitrate.audio_kbps
            );
            for cmd in commands {
                println!("{}", cmd);
            }
        }
        Outcome::Compressed {
            encoder,
            output,
            original_bytes,
            final_bytes,
            reduction_pct,
            elapsed_s,
        } => {
            println!("Compressed with {} ({})", encoder, encoder.display_name());
            println!("  Output:    {}", output.display());
            println!("  Original:  {}", format_size(*original_bytes));
            println!("  Final:     {}", format_size(*final_bytes));
            println!("  Reduction: {:.1}%", reduction_pct);
            println!("  Time:      {}", format_eta(*elapsed_s));
        }
    }
}

/// Single-line progress display on stderr, redrawn with `\r`
struct StatusLine {
    tty: bool,
    encoder: String,
    dirty: bool,
}

impl StatusLine {
    fn new() -> Self {
        Self {
            tty: std::io::stderr().is_terminal(),
            encoder: String::new(),
            dirty: false,
        }
    }

    fn handle(&mut self, event: &CompressEvent) {
        match event {
            CompressEvent::Probed(_) => {}
            CompressEvent::Planned {
                bitrate,
                candidates,
            } => {
                let names: Vec<_> = candidates.iter().map(|e| e.ffmpeg_name()).collect();
                eprintln!(
                    "Target bitrate: video {}k, audio {}k; encoders: {}",
                    bitrate.video_kbps,
                    bitrate.audio_kbps,
                    names.join(" -> ")
                );
            }
            CompressEvent::AttemptStarted {
                encoder,
                attempt,
                of,
            } => {
                self.finish();
                self.encoder = encoder.to_string();
                eprintln!("Encoding with {} ({}/{})", encoder.display_name(), attempt, of);
            }
            CompressEvent::Progress(update) => {
                if !self.tty {
                    return;
                }
                let mut line = format!("  [{}]", self.encoder);
                if update.total_passes > 1 {
                    line.push_str(&format!(
                        " pass {}/{}",
                        update.pass_idx + 1,
                        update.total_passes
                    ));
                }
                line.push_str(&format!(" {:5.1}%", update.overall_pct));
                if let Some(fps) = update.fps {
                    line.push_str(&format!("  {:.0} fps", fps));
                }
                if let Some(speed) = update.speed {
                    line.push_str(&format!("  {:.2}x", speed));
                }
                if let Some(eta) = update.eta_secs {
                    line.push_str(&format!("  ETA {}", format_eta(eta)));
                }
                eprint!("\r{:<72}", line);
                let _ = std::io::stderr().flush();
                self.dirty = true;
            }
            CompressEvent::AttemptFailed { encoder, error } => {
                self.finish();
                eprintln!("{} failed: {}", encoder, error);
            }
        }
    }

    /// End the progress line so later output starts on a fresh line
    fn finish(&mut self) {
        if self.dirty {
            eprintln!();
            self.dirty = false;
        }
    }
}
