//! Progress sink: where the engine and coordinator report what they are doing.

use anyhow::Result;
use tracing::warn;

use super::core::{JobDescriptor, JobResult, Progress};
use crate::stats::SessionStats;

/// Receives job lifecycle events. One `on_start` and one `on_complete` per
/// attempted job; `on_progress` is best-effort and throttled upstream.
/// `on_cancel_requested` fires at most once per session, as soon as the
/// coordinator sees the cancel flag.
///
/// Errors are logged by the caller and otherwise ignored; a broken display
/// never fails an encode.
pub trait ProgressSink {
    fn on_start(&mut self, job: &JobDescriptor, index: usize, total: usize) -> Result<()>;
    fn on_progress(&mut self, progress: Progress) -> Result<()>;
    fn on_complete(&mut self, result: &JobResult) -> Result<()>;
    fn on_cancel_requested(&mut self) -> Result<()>;
    fn on_session_end(&mut self, stats: &SessionStats) -> Result<()>;
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_start(&mut self, _job: &JobDescriptor, _index: usize, _total: usize) -> Result<()> {
        Ok(())
    }

    fn on_progress(&mut self, _progress: Progress) -> Result<()> {
        Ok(())
    }

    fn on_complete(&mut self, _result: &JobResult) -> Result<()> {
        Ok(())
    }

    fn on_cancel_requested(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_session_end(&mut self, _stats: &SessionStats) -> Result<()> {
        Ok(())
    }
}

/// Log a sink failure and carry on
pub(crate) fn report_sink_error(event: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(event, error = %format!("{:#}", e), "progress sink failed");
    }
}
