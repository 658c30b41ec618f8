// Source probing using ffprobe

use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;
use tracing::debug;

use super::core::run_captured;
use super::error::JobError;
use super::resolution::Resolution;

/// Metadata read from a media file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration: Option<f64>,
    /// Bits per second
    pub bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
    pub has_video: bool,
}

impl MediaInfo {
    pub fn resolution(&self) -> Option<Resolution> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(Resolution::new(w, h)),
            _ => None,
        }
    }
}

/// Reads media metadata. Implemented by ffprobe in production and by mocks in tests.
pub trait SourceProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaInfo, JobError>;
}

/// Per-run limit unless configured otherwise
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_KILL_GRACE: Duration = Duration::from_secs(1);

/// `ffprobe -show_format -show_streams` with JSON output
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: String,
    timeout: Duration,
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeProber {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Kill ffprobe runs that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl SourceProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo, JobError> {
        if !path.exists() {
            return Err(JobError::Probe(format!("{} does not exist", path.display())));
        }

        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path);
        let output = run_captured(&mut cmd, self.timeout, PROBE_KILL_GRACE)
            .map_err(|e| JobError::Probe(format!("failed to run {}: {}", self.ffprobe, e)))?;

        let Some(status) = output.status else {
            return Err(JobError::Probe(format!(
                "ffprobe timed out after {:.1}s on {}",
                self.timeout.as_secs_f64(),
                path.display()
            )));
        };
        if !status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(JobError::Probe(if detail.is_empty() {
                format!("ffprobe exited with {}", status)
            } else {
                format!("ffprobe failed: {}", detail)
            }));
        }

        parse_media_info(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Probe with a fixed backoff between attempts. `attempts` of 0 is treated as 1.
pub fn probe_with_retry(
    prober: &dyn SourceProber,
    path: &Path,
    attempts: u32,
    backoff: Duration,
) -> Result<MediaInfo, JobError> {
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match prober.probe(path) {
            Ok(info) => return Ok(info),
            Err(e) => {
                debug!(path = %path.display(), attempt, error = %e, "probe attempt failed");
                last_err = Some(e);
                if attempt < attempts {
                    thread::sleep(backoff);
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| JobError::Probe("probe was not attempted".to_string())))
}

/// Parse ffprobe JSON into `MediaInfo`.
///
/// Duration falls back from the stream, to the container, to the Matroska
/// `DURATION` tag, to `nb_frames / r_frame_rate`. Bitrate falls back from the
/// stream to the container.
pub fn parse_media_info(json_str: &str) -> Result<MediaInfo, JobError> {
    let json: Value = serde_json::from_str(json_str)
        .map_err(|e| JobError::Probe(format!("failed to parse ffprobe JSON: {}", e)))?;

    let format = &json["format"];
    let streams = json["streams"].as_array().cloned().unwrap_or_default();
    let video = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"));

    let Some(video) = video else {
        return Ok(MediaInfo {
            duration: number(&format["duration"]).filter(|d| *d > 0.0),
            bitrate: number(&format["bit_rate"]).map(|b| b as u64),
            ..Default::default()
        });
    };

    let duration = [
        number(&video["duration"]),
        number(&format["duration"]),
        video["tags"]["DURATION"].as_str().and_then(parse_clock),
    ]
    .into_iter()
    .flatten()
    .find(|d| *d > 0.0)
    .or_else(|| {
        let frames = number(&video["nb_frames"])?;
        let fps = video["r_frame_rate"].as_str().and_then(parse_fraction)?;
        (fps > 0.0).then(|| frames / fps)
    });

    let bitrate = number(&video["bit_rate"])
        .or_else(|| number(&format["bit_rate"]))
        .filter(|b| *b > 0.0)
        .map(|b| b as u64);

    Ok(MediaInfo {
        duration,
        bitrate,
        width: video["width"].as_u64().map(|w| w as u32),
        height: video["height"].as_u64().map(|h| h as u32),
        codec: video["codec_name"].as_str().map(str::to_string),
        has_video: true,
    })
}

/// ffprobe emits most numbers as strings
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parse `HH:MM:SS.fff` (or plain seconds) into seconds
pub fn parse_clock(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    match parts.as_slice() {
        [h, m, sec] => {
            let h: f64 = h.parse().ok()?;
            let m: f64 = m.parse().ok()?;
            let sec: f64 = sec.parse().ok()?;
            Some(h * 3600.0 + m * 60.0 + sec)
        }
        [sec] => sec.parse().ok(),
        _ => None,
    }
}

/// Parse a fraction string like "30000/1001" to f64
pub fn parse_fraction(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let numerator: f64 = num.parse().ok()?;
    let denominator: f64 = den.parse().ok()?;

    if denominator == 0.0 {
        return None;
    }

    Some(numerator / denominator)
}
