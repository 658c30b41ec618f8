//! Sequential batch coordinator: runs jobs through the engine, applies
//! cancellation between files, and cleans up after failures.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::cancel::CancellationSource;
use super::core::{EncodeEngine, JobDescriptor, JobResult, Progress};
use super::sink::{ProgressSink, report_sink_error};
use crate::stats::SessionStats;

/// Outputs smaller than this are treated as aborted writes
pub const MIN_VALID_OUTPUT_BYTES: u64 = 1024;

/// What the cleanup pass removed and what it could not
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.errors.is_empty()
    }

    fn remove(&mut self, path: PathBuf) {
        if self.removed.contains(&path) {
            return;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "removed leftover output");
                self.removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => self.errors.push((path, e.to_string())),
        }
    }
}

pub struct BatchCoordinator {
    engine: EncodeEngine,
    cancel: Arc<dyn CancellationSource>,
    delete_source_on_success: bool,
}

impl BatchCoordinator {
    pub fn new(engine: EncodeEngine, cancel: Arc<dyn CancellationSource>) -> Self {
        Self {
            engine,
            cancel,
            delete_source_on_success: false,
        }
    }

    /// Remove each source after its encode succeeds
    pub fn delete_source_on_success(mut self, enabled: bool) -> Self {
        self.delete_source_on_success = enabled;
        self
    }

    pub fn engine(&self) -> &EncodeEngine {
        &self.engine
    }

    /// Run every job in order. Job failures are recorded, not returned; the
    /// loop stops early only on cancellation or a fatal launch error.
    pub fn run(&self, jobs: &[JobDescriptor], sink: &mut dyn ProgressSink) -> SessionStats {
        let started = Instant::now();
        let total = jobs.len();
        let mut stats = SessionStats::new(total);
        let mut sink = CancelNotice::new(sink, self.cancel.as_ref());

        for (index, job) in jobs.iter().enumerate() {
            sink.check();
            if self.cancel.is_cancel_requested() {
                info!(
                    remaining = total - index,
                    "cancellation requested, stopping before next file"
                );
                stats.cancelled = true;
                break;
            }

            report_sink_error("start", sink.on_start(job, index + 1, total));
            let result = self.engine.encode(job, &mut sink);
            let fatal = result
                .error
                .as_ref()
                .filter(|e| e.is_fatal())
                .map(|e| e.to_string());

            if result.success && self.delete_source_on_success {
                match fs::remove_file(&job.path) {
                    Ok(()) => info!(path = %job.path.display(), "deleted source"),
                    Err(e) => warn!(path = %job.path.display(), error = %e, "failed to delete source"),
                }
            }

            report_sink_error("complete", sink.on_complete(&result));
            stats.record(result);

            if let Some(reason) = fatal {
                warn!(%reason, "aborting batch, encoder cannot be launched");
                stats.aborted = Some(reason);
                break;
            }
        }

        stats.elapsed_seconds = started.elapsed().as_secs_f64();
        report_sink_error("session_end", sink.on_session_end(&stats));
        stats
    }
}

/// Forwards events to the caller's sink and announces a pending cancel once,
/// at the first event after the flag is raised
struct CancelNotice<'a> {
    inner: &'a mut dyn ProgressSink,
    cancel: &'a dyn CancellationSource,
    announced: bool,
}

impl<'a> CancelNotice<'a> {
    fn new(inner: &'a mut dyn ProgressSink, cancel: &'a dyn CancellationSource) -> Self {
        Self {
            inner,
            cancel,
            announced: false,
        }
    }

    fn check(&mut self) {
        if !self.announced && self.cancel.is_cancel_requested() {
            self.announced = true;
            info!("cancellation requested, finishing current file");
            report_sink_error("cancel_requested", self.inner.on_cancel_requested());
        }
    }
}

impl ProgressSink for CancelNotice<'_> {
    fn on_start(&mut self, job: &JobDescriptor, index: usize, total: usize) -> Result<()> {
        self.inner.on_start(job, index, total)
    }

    fn on_progress(&mut self, progress: Progress) -> Result<()> {
        self.check();
        self.inner.on_progress(progress)
    }

    fn on_complete(&mut self, result: &JobResult) -> Result<()> {
        let forwarded = self.inner.on_complete(result);
        self.check();
        forwarded
    }

    fn on_cancel_requested(&mut self) -> Result<()> {
        self.inner.on_cancel_requested()
    }

    fn on_session_end(&mut self, stats: &SessionStats) -> Result<()> {
        self.check();
        self.inner.on_session_end(stats)
    }
}

/// Remove outputs of failed jobs and any undersized output of a known job
pub fn cleanup(stats: &SessionStats, jobs: &[JobDescriptor], output_suffix: &str) -> CleanupReport {
    let mut report = CleanupReport::default();

    for failed in &stats.failed_paths {
        let output = super::core::output_path_for(failed, output_suffix);
        if output.exists() {
            report.remove(output);
        }
    }

    for job in jobs {
        let output = job.output_path(output_suffix);
        let undersized = fs::metadata(&output)
            .map(|m| m.is_file() && m.len() < MIN_VALID_OUTPUT_BYTES)
            .unwrap_or(false);
        if undersized {
            report.remove(output);
        }
    }

    report
}
