// Plain console rendering of batch progress

use anyhow::Result;
use std::io::{self, Write};

use crate::engine::{JobDescriptor, JobResult, Progress, ProgressSink};
use crate::stats::{SessionStats, format_duration, format_mb, format_summary};

/// Lines end in CRLF so output stays aligned while the key listener holds
/// the terminal in raw mode.
const EOL: &str = "\r\n";

/// Writes human-readable progress to a terminal (or any writer)
pub struct ConsoleSink<W: Write> {
    out: W,
    /// Last percentage printed, in tenths
    last_tenths: Option<i64>,
    progress_shown: bool,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_tenths: None,
            progress_shown: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Finish an in-place progress line before printing anything else
    fn end_progress_line(&mut self) -> io::Result<()> {
        if self.progress_shown {
            self.progress_shown = false;
            write!(self.out, "{}", EOL)?;
        }
        Ok(())
    }
}

impl<W: Write> ProgressSink for ConsoleSink<W> {
    fn on_start(&mut self, job: &JobDescriptor, index: usize, total: usize) -> Result<()> {
        self.last_tenths = None;
        self.end_progress_line()?;
        write!(
            self.out,
            "[{}/{}] Processing: {} ({}){}",
            index,
            total,
            job.file_name(),
            format_mb(job.size_mb()),
            EOL
        )?;
        if let Some(res) = job.source_resolution {
            write!(self.out, "  Source: {}", res)?;
            if let Some(codec) = &job.source_codec {
                write!(self.out, " {}", codec)?;
            }
            if let Some(d) = job.duration_seconds {
                write!(self.out, ", {}", format_duration(d))?;
            }
            write!(self.out, "{}", EOL)?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn on_progress(&mut self, progress: Progress) -> Result<()> {
        match progress {
            Progress::Percent(pct) => {
                let tenths = (pct * 10.0).round() as i64;
                if self.last_tenths == Some(tenths) {
                    return Ok(());
                }
                self.last_tenths = Some(tenths);
                write!(self.out, "\r  Progress: {:5.1}%", pct)?;
            }
            Progress::Indeterminate => {
                if self.progress_shown {
                    return Ok(());
                }
                write!(self.out, "\r  Progress: encoding (duration unknown)")?;
            }
        }
        self.progress_shown = true;
        self.out.flush()?;
        Ok(())
    }

    fn on_complete(&mut self, result: &JobResult) -> Result<()> {
        self.end_progress_line()?;
        if result.success {
            write!(
                self.out,
                "  Done: {} -> {} ({:.1}% of original) in {}{}",
                format_mb(result.original_size_mb),
                format_mb(result.encoded_size_mb),
                result.compression_ratio,
                format_duration(result.elapsed_seconds),
                EOL
            )?;
        } else {
            let reason = result
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            write!(self.out, "  Failed: {}{}", reason, EOL)?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn on_cancel_requested(&mut self) -> Result<()> {
        self.end_progress_line()?;
        write!(
            self.out,
            "Stop requested: finishing the current file, then stopping{}",
            EOL
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn on_session_end(&mut self, stats: &SessionStats) -> Result<()> {
        self.end_progress_line()?;
        write!(self.out, "{}", EOL)?;
        for line in format_summary(stats) {
            write!(self.out, "{}{}", line, EOL)?;
        }
        self.out.flush()?;
        Ok(())
    }
}
