/// Parser for ffmpeg `-progress` output (key=value lines)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub total_size: Option<u64>,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of ffmpeg progress output
    pub fn parse_line(&mut self, line: &str) {
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let value = value.trim();

        match key.trim() {
            // out_time_ms is microseconds too (long-standing ffmpeg quirk)
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time_us = us;
                }
            }
            "out_time" => {
                if let Some(secs) = parse_clock(value) {
                    self.out_time_us = (secs * 1_000_000.0) as u64;
                }
            }
            "fps" => {
                if let Ok(f) = value.parse::<f64>() {
                    self.fps = Some(f);
                }
            }
            "speed" => {
                // "1.23x", or "N/A" before the first frame
                if let Ok(s) = value.trim_end_matches('x').parse::<f64>() {
                    self.speed = Some(s);
                }
            }
            "bitrate" => {
                if let Ok(b) = value.trim_end_matches("kbits/s").parse::<f64>() {
                    self.bitrate_kbps = Some(b);
                }
            }
            "total_size" => {
                if let Ok(size) = value.parse::<u64>() {
                    self.total_size = Some(size);
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
            }
            _ => {}
        }
    }

    /// Get output time in seconds
    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Calculate progress percentage given total duration
    pub fn progress_pct(&self, duration_s: Option<f64>) -> f64 {
        if let Some(dur) = duration_s {
            if dur > 0.0 {
                return (self.out_time_s() / dur * 100.0).min(100.0);
            }
        }
        0.0
    }

    /// Seconds left in this pass, from the current speed
    pub fn eta_secs(&self, duration_s: f64) -> Option<f64> {
        let speed = self.speed.filter(|s| *s > 0.0)?;
        Some((duration_s - self.out_time_s()).max(0.0) / speed)
    }
}

/// Progress of a multi-pass encode mapped onto one 0..100 scale.
///
/// With two passes, pass 1 covers 0..50 and pass 2 covers 50..100.
pub fn overall_pct(pass_idx: usize, total_passes: usize, pass_pct: f64) -> f64 {
    if total_passes <= 1 {
        return pass_pct;
    }
    let share = 100.0 / total_passes as f64;
    (pass_idx as f64 * share + pass_pct * share / 100.0).min(100.0)
}

/// Parse `HH:MM:SS.micro` into seconds
fn parse_clock(s: &str) -> Option<f64> {
    let mut parts = s.split(':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let sec: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || h < 0.0 {
        return None;
    }
    Some(h * 3600.0 + m * 60.0 + sec)
}

/// `4m05s` under an hour, `1h02m` above
pub fn format_eta(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}
