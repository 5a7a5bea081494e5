//! Running ffmpeg and following its progress.
//!
//! One process at a time: passes run back to back, never concurrently.

use super::progress::{ProgressParser, overall_pct};
use std::io::{self, BufRead, BufReader};
use std::process::{Command, ExitStatus, Stdio};

/// Snapshot handed to the progress callback after every progress line
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Zero-based pass index
    pub pass_idx: usize,
    pub total_passes: usize,
    /// Progress over all passes, 0..100
    pub overall_pct: f64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    /// Seconds left over all remaining passes, when speed is known
    pub eta_secs: Option<f64>,
}

/// Outcome of running every pass of an encode
#[derive(Debug)]
pub struct RunResult {
    pub status: ExitStatus,
    pub stderr: String,
    /// 1-based index of the pass that failed, if any
    pub failed_pass: Option<usize>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.failed_pass.is_none() && self.status.success()
    }
}

/// Check if FFmpeg was cancelled by user signal (SIGTERM, SIGINT, SIGQUIT).
///
/// FFmpeg catches signals and exits gracefully, printing "Exiting normally,
/// received signal X", so both the exit status and stderr are checked.
#[cfg(unix)]
pub fn was_user_cancelled(status: &ExitStatus, stderr: &str) -> bool {
    use std::os::unix::process::ExitStatusExt;

    if let Some(signal) = status.signal() {
        if matches!(signal, 2 | 3 | 15) {
            return true;
        }
    }

    stderr.contains("received signal 2")
        || stderr.contains("received signal 3")
        || stderr.contains("received signal 15")
}

#[cfg(not(unix))]
pub fn was_user_cancelled(_status: &ExitStatus, stderr: &str) -> bool {
    stderr.contains("received signal")
}

/// Last `max_lines` non-empty lines of captured stderr
pub fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Run one ffmpeg process, feeding its `-progress` stdout to the callback.
/// Returns the exit status and everything it wrote to stderr.
pub fn run_ffmpeg_once(
    mut cmd: Command,
    pass_idx: usize,
    total_passes: usize,
    duration_s: f64,
    callback: &mut dyn FnMut(&ProgressUpdate),
) -> io::Result<(ExitStatus, String)> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    tracing::debug!(program = ?cmd.get_program(), "spawning ffmpeg pass {}/{}", pass_idx + 1, total_passes);
    let mut child = cmd.spawn()?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("Failed to capture stderr"))?;
    let stderr_thread = std::thread::spawn(move || {
        let mut stderr_output = String::new();
        let reader = BufReader::new(stderr);
        for line in reader.lines().map_while(Result::ok) {
            stderr_output.push_str(&line);
            stderr_output.push('\n');
        }
        stderr_output
    });

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;
    let reader = BufReader::new(stdout);
    let mut parser = ProgressParser::new();
    let remaining_passes = total_passes.saturating_sub(pass_idx + 1) as f64;

    for line in reader.lines().map_while(Result::ok) {
        parser.parse_line(&line);

        // ffmpeg emits a block of keys per report, terminated by "progress="
        if !line.starts_with("progress=") {
            continue;
        }

        let pass_pct = parser.progress_pct(Some(duration_s));
        let eta_secs = parser
            .eta_secs(duration_s)
            .zip(parser.speed.filter(|s| *s > 0.0))
            .map(|(eta, speed)| eta + remaining_passes * duration_s / speed);

        callback(&ProgressUpdate {
            pass_idx,
            total_passes,
            overall_pct: overall_pct(pass_idx, total_passes, pass_pct),
            fps: parser.fps,
            speed: parser.speed,
            eta_secs,
        });
    }

    let status = child.wait()?;
    let stderr_output = stderr_thread
        .join()
        .unwrap_or_else(|_| "Failed to capture stderr".to_string());

    Ok((status, stderr_output))
}

/// Run passes in order, stopping at the first one that fails
pub fn run_passes(
    cmds: Vec<Command>,
    duration_s: f64,
    callback: &mut dyn FnMut(&ProgressUpdate),
) -> io::Result<RunResult> {
    let total = cmds.len();
    let mut last = None;

    for (idx, cmd) in cmds.into_iter().enumerate() {
        let (status, stderr) = run_ffmpeg_once(cmd, idx, total, duration_s, callback)?;
        if !status.success() {
            return Ok(RunResult {
                status,
                stderr,
                failed_pass: Some(idx + 1),
            });
        }
        last = Some((status, stderr));
    }

    let (status, stderr) =
        last.ok_or_else(|| io::Error::other("FFmpeg did not produce an exit status"))?;
    Ok(RunResult {
        status,
        stderr,
        failed_pass: None,
    })
}
