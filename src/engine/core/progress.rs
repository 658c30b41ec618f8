// Progress extraction from ffmpeg status lines

use regex::Regex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Normalised progress for one job
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Completion in [0, 100]
    Percent(f64),
    /// Duration unknown; work is happening but cannot be measured
    Indeterminate,
}

impl Progress {
    /// `elapsed / duration * 100`, clamped. Unknown or zero duration is indeterminate.
    pub fn from_elapsed(elapsed: f64, duration: Option<f64>) -> Self {
        match duration {
            Some(d) if d > 0.0 => Self::Percent((elapsed / d * 100.0).clamp(0.0, 100.0)),
            _ => Self::Indeterminate,
        }
    }

    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Percent(p) => Some(*p),
            Self::Indeterminate => None,
        }
    }
}

/// Extracts elapsed media time (seconds) from one status line
pub type Recognizer = fn(&str) -> Option<f64>;

/// Tried in order; the first recognizer that yields a value wins.
pub const RECOGNIZERS: &[Recognizer] = &[
    out_time_us,
    out_time_clock,
    stats_time_clock,
    stats_time_seconds,
];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("bad pattern {pattern}: {e}")))
}

/// `out_time_us=12345678` from `-progress`
pub fn out_time_us(line: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = regex(&RE, r"^out_time_us=(\d+)\s*$").captures(line.trim())?;
    let micros: u64 = caps[1].parse().ok()?;
    Some(micros as f64 / 1_000_000.0)
}

/// `out_time=00:01:02.500000` from `-progress`
pub fn out_time_clock(line: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = regex(&RE, r"^out_time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").captures(line.trim())?;
    clock_seconds(&caps[1], &caps[2], &caps[3])
}

/// `frame=  240 fps= 48 ... time=00:00:10.00 bitrate=...` from the stats line
pub fn stats_time_clock(line: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = regex(&RE, r"\btime=\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").captures(line)?;
    clock_seconds(&caps[1], &caps[2], &caps[3])
}

/// `time=10.5` as plain seconds
pub fn stats_time_seconds(line: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = regex(&RE, r"\btime=\s*(\d+(?:\.\d+)?)(?:\s|$)").captures(line)?;
    caps[1].parse().ok()
}

fn clock_seconds(h: &str, m: &str, s: &str) -> Option<f64> {
    let h: f64 = h.parse().ok()?;
    let m: f64 = m.parse().ok()?;
    let s: f64 = s.parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// Run the recognizers over a line
pub fn recognize(line: &str) -> Option<f64> {
    RECOGNIZERS.iter().find_map(|r| r(line))
}

/// `key=value` lines of the `-progress` block carry no diagnostic value
pub fn is_progress_key_line(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^[a-z][a-z0-9_]*=\S*$").is_match(line.trim())
}

/// Rate limiter for progress events: at most one event per interval
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether an event at `now` may be emitted; records it if so
    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    /// Time until the window reopens
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

/// Turns status lines into throttled `Progress` events for one job.
///
/// An update that lands inside the window replaces any earlier pending one;
/// the newest pending value goes out once the window reopens.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    duration: Option<f64>,
    throttle: Throttle,
    elapsed: Option<f64>,
    pending: Option<Progress>,
}

impl ProgressTracker {
    pub fn new(duration: Option<f64>, interval: Duration) -> Self {
        Self {
            duration,
            throttle: Throttle::new(interval),
            elapsed: None,
            pending: None,
        }
    }

    /// Feed one line; returns an event when the line carried progress and the
    /// throttle window allows it
    pub fn observe(&mut self, line: &str, now: Instant) -> Option<Progress> {
        let elapsed = recognize(line)?;
        self.elapsed = Some(elapsed);
        let progress = Progress::from_elapsed(elapsed, self.duration);
        if self.throttle.ready_at(now) {
            self.pending = None;
            Some(progress)
        } else {
            self.pending = Some(progress);
            None
        }
    }

    /// The held-back update, once its window has reopened
    pub fn flush_due(&mut self, now: Instant) -> Option<Progress> {
        if self.pending.is_some() && self.throttle.ready_at(now) {
            self.pending.take()
        } else {
            None
        }
    }

    /// How long until a held-back update is due
    pub fn pending_due_in(&self, now: Instant) -> Option<Duration> {
        self.pending.map(|_| self.throttle.remaining_at(now))
    }

    /// Whatever update is still held back, regardless of the window
    pub fn take_pending(&mut self) -> Option<Progress> {
        self.pending.take()
    }

    /// Last elapsed media time seen, in seconds
    pub fn elapsed(&self) -> Option<f64> {
        self.elapsed
    }
}
