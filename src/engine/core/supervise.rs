// Subprocess supervision: stderr pump, exit polling, timeout, termination

use std::collections::VecDeque;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::progress::{Progress, ProgressTracker, is_progress_key_line};

/// Lines of stderr kept for failure diagnostics
const TAIL_LINES: usize = 64;
/// Maximum characters used when no error line is found
const TAIL_REASON_CHARS: usize = 200;
/// Sleep between exit polls once the stream has closed
const EXIT_POLL: Duration = Duration::from_millis(50);
/// How long captured pipes may stay open after a helper process ends
const CAPTURE_DRAIN: Duration = Duration::from_millis(500);

const ERROR_KEYWORDS: &[&str] = &["error", "failed", "invalid", "unsupported"];

/// Timing knobs for one supervised run
#[derive(Debug, Clone)]
pub struct SuperviseOptions {
    /// Wall-clock ceiling for the whole encode
    pub timeout: Duration,
    /// Wait between SIGTERM and SIGKILL
    pub kill_grace: Duration,
    /// Longest single wait on the status channel
    pub liveness_interval: Duration,
    /// How long to keep reading status lines after the process exits
    pub drain_window: Duration,
    /// Minimum spacing between progress events
    pub progress_interval: Duration,
}

impl Default for SuperviseOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            kill_grace: Duration::from_secs(2),
            liveness_interval: Duration::from_secs(1),
            drain_window: Duration::from_millis(500),
            progress_interval: Duration::from_millis(100),
        }
    }
}

/// How the process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(ExitStatus),
    TimedOut,
}

/// Everything observed while supervising a process
#[derive(Debug, Clone)]
pub struct Supervised {
    pub outcome: ExitOutcome,
    pub tail: Vec<String>,
    /// Last elapsed media time reported, in seconds
    pub last_elapsed: Option<f64>,
    pub wall_time: Duration,
}

impl Supervised {
    pub fn failure_reason(&self) -> String {
        failure_reason(&self.tail)
    }
}

/// Bounded ring of recent diagnostic lines
#[derive(Debug, Default)]
struct Tail {
    lines: VecDeque<String>,
}

impl Tail {
    fn push(&mut self, line: String) {
        if is_progress_key_line(&line) {
            return;
        }
        if self.lines.len() == TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Supervise a spawned child until it exits or the timeout fires.
///
/// The child's stderr (if piped) is pumped by a reader thread; every status
/// line goes through the progress tracker and the tail buffer. `on_progress`
/// only sees throttled events.
pub fn supervise(
    mut child: Child,
    duration: Option<f64>,
    opts: &SuperviseOptions,
    on_progress: &mut dyn FnMut(Progress),
) -> io::Result<Supervised> {
    let started = Instant::now();
    let (tx, rx) = mpsc::channel::<String>();

    if let Some(stderr) = child.stderr.take() {
        let spawned = thread::Builder::new()
            .name("ffmpeg-stderr".to_string())
            .spawn(move || pump_status_lines(stderr, tx));
        if let Err(e) = spawned {
            kill_and_reap(&mut child);
            return Err(e);
        }
    } else {
        drop(tx);
    }

    let mut tracker = ProgressTracker::new(duration, opts.progress_interval);
    let mut tail = Tail::default();
    let mut stream_open = true;

    let outcome = loop {
        match child.try_wait() {
            Ok(Some(status)) => break ExitOutcome::Exited(status),
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(e);
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= opts.timeout {
            warn!(
                pid = child.id(),
                limit_secs = opts.timeout.as_secs(),
                "encoder exceeded time limit, terminating"
            );
            terminate(&mut child, opts.kill_grace);
            break ExitOutcome::TimedOut;
        }

        if let Some(progress) = tracker.flush_due(Instant::now()) {
            on_progress(progress);
        }

        let mut wait = opts.liveness_interval.min(opts.timeout - elapsed);
        if let Some(due) = tracker.pending_due_in(Instant::now()) {
            wait = wait.min(due);
        }
        if stream_open {
            match rx.recv_timeout(wait) {
                Ok(line) => observe_line(line, &mut tracker, &mut tail, on_progress),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => stream_open = false,
            }
        } else {
            thread::sleep(wait.min(EXIT_POLL));
        }
    };

    // Bounded drain: a grandchild holding the pipe must not stall us
    if stream_open {
        let deadline = Instant::now() + opts.drain_window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("status stream still open after drain window, detaching reader");
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(line) => observe_line(line, &mut tracker, &mut tail, on_progress),
                Err(_) => break,
            }
        }
    }
    if let Some(progress) = tracker.take_pending() {
        on_progress(progress);
    }

    Ok(Supervised {
        outcome,
        tail: tail.into_vec(),
        last_elapsed: tracker.elapsed(),
        wall_time: started.elapsed(),
    })
}

fn observe_line(
    line: String,
    tracker: &mut ProgressTracker,
    tail: &mut Tail,
    on_progress: &mut dyn FnMut(Progress),
) {
    if let Some(progress) = tracker.observe(&line, Instant::now()) {
        on_progress(progress);
    }
    tail.push(line);
}

/// Read `reader` to EOF, sending each `\n`- or `\r`-terminated line.
/// Stops early when the receiver is gone.
pub fn pump_status_lines<R: Read>(mut reader: R, tx: Sender<String>) {
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    let mut chunk = [0u8; 4096];

    let flush = |buf: &mut Vec<u8>| -> bool {
        if buf.is_empty() {
            return true;
        }
        let line = String::from_utf8_lossy(buf).trim().to_string();
        buf.clear();
        line.is_empty() || tx.send(line).is_ok()
    };

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                for &b in &chunk[..n] {
                    if b == b'\n' || b == b'\r' {
                        if !flush(&mut buf) {
                            return;
                        }
                    } else {
                        buf.push(b);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    flush(&mut buf);
}

/// Graceful stop: SIGTERM, wait out the grace period, then SIGKILL
pub fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        // SAFETY: kill(2) on a pid we own and have not yet reaped
        let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                if let Ok(Some(status)) = child.try_wait() {
                    debug!(?status, "encoder exited after SIGTERM");
                    return;
                }
                thread::sleep(EXIT_POLL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill() {
        debug!(error = %e, "kill failed, process likely already gone");
    }
    let _ = child.wait();
}

/// Output of a short-lived helper process run under a deadline
#[derive(Debug, Clone)]
pub struct Captured {
    /// `None` when the deadline fired and the process was terminated
    pub status: Option<ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Captured {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }
}

/// Run `cmd` to completion with stdout and stderr captured, terminating it
/// once `timeout` has passed. Both pipes are read on background threads so a
/// chatty process cannot block on a full pipe.
pub fn run_captured(cmd: &mut Command, timeout: Duration, kill_grace: Duration) -> io::Result<Captured> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = match child.stdout.take().map(collect_in_background).transpose() {
        Ok(rx) => rx,
        Err(e) => {
            kill_and_reap(&mut child);
            return Err(e);
        }
    };
    let stderr = match child.stderr.take().map(collect_in_background).transpose() {
        Ok(rx) => rx,
        Err(e) => {
            kill_and_reap(&mut child);
            return Err(e);
        }
    };

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(e);
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(
                pid = child.id(),
                limit_ms = timeout.as_millis() as u64,
                "helper process exceeded time limit, terminating"
            );
            terminate(&mut child, kill_grace);
            break None;
        }
        thread::sleep(remaining.min(EXIT_POLL));
    };

    let collect = |rx: Option<Receiver<Vec<u8>>>| {
        rx.and_then(|rx| rx.recv_timeout(CAPTURE_DRAIN).ok())
            .unwrap_or_default()
    };
    Ok(Captured {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn collect_in_background<R: Read + Send + 'static>(mut reader: R) -> io::Result<Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            let _ = tx.send(buf);
        })?;
    Ok(rx)
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn is_error_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Human-readable cause of a failed encode: the last line mentioning an
/// error keyword, else the tail of the stream
pub fn failure_reason(tail: &[String]) -> String {
    if let Some(line) = tail.iter().rev().find(|l| is_error_line(l)) {
        return line.clone();
    }

    let joined = tail.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return "encoder produced no diagnostic output".to_string();
    }

    let count = trimmed.chars().count();
    if count <= TAIL_REASON_CHARS {
        trimmed.to_string()
    } else {
        let tail: String = trimmed.chars().skip(count - TAIL_REASON_CHARS).collect();
        format!("...{}", tail)
    }
}
