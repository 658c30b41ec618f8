// Per-job encode: prepare, launch, supervise, validate, clean up

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::ffmpeg_cmd::build_encode_cmd;
use super::log::write_debug_log;
use super::progress::Progress;
use super::supervise::{ExitOutcome, SuperviseOptions, supervise};
use super::types::{DEFAULT_OUTPUT_SUFFIX, JobDescriptor, JobResult, JobState};
use crate::engine::error::JobError;
use crate::engine::params::{EncodeParameters, EncodingPolicy, build_params};
use crate::engine::probe::{SourceProber, probe_with_retry};
use crate::engine::resolution::ResolutionPolicy;
use crate::engine::sink::{ProgressSink, report_sink_error};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Runtime settings for the encode engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub ffmpeg_path: String,
    pub output_suffix: String,
    pub supervise: SuperviseOptions,
    pub probe_attempts: u32,
    pub probe_backoff: Duration,
    /// Append failed-encode diagnostics here; `None` disables the log
    pub debug_log: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            supervise: SuperviseOptions::default(),
            probe_attempts: 3,
            probe_backoff: Duration::from_millis(500),
            debug_log: None,
        }
    }
}

/// Everything resolved before launch
struct Prepared {
    params: EncodeParameters,
    duration: Option<f64>,
}

/// Runs one job at a time through ffmpeg. Holds only batch-wide, read-only
/// configuration; each `encode` call is independent.
pub struct EncodeEngine {
    policy: EncodingPolicy,
    resolution: ResolutionPolicy,
    prober: Arc<dyn SourceProber>,
    options: EngineOptions,
}

impl EncodeEngine {
    pub fn new(
        policy: EncodingPolicy,
        resolution: ResolutionPolicy,
        prober: Arc<dyn SourceProber>,
        options: EngineOptions,
    ) -> Self {
        Self {
            policy,
            resolution,
            prober,
            options,
        }
    }

    pub fn policy(&self) -> &EncodingPolicy {
        &self.policy
    }

    pub fn resolution(&self) -> &ResolutionPolicy {
        &self.resolution
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn output_path(&self, job: &JobDescriptor) -> PathBuf {
        job.output_path(&self.options.output_suffix)
    }

    /// Parameters this job would be encoded with, without launching anything
    pub fn plan_params(&self, job: &JobDescriptor) -> Result<EncodeParameters, JobError> {
        self.prepare(job).map(|p| p.params)
    }

    /// Encode one job to its terminal state. Never panics on job failure and
    /// never returns without a result; errors live in `JobResult::error`.
    pub fn encode(&self, job: &JobDescriptor, sink: &mut dyn ProgressSink) -> JobResult {
        let started = Instant::now();
        let output = self.output_path(job);
        let original_mb = job.size_mb();
        debug!(path = %job.path.display(), state = ?JobState::Pending, "job state");

        let fail = |error: JobError| {
            debug!(path = %job.path.display(), state = ?JobState::Failed, %error, "job state");
            JobResult::failed(
                job.path.clone(),
                output.clone(),
                original_mb,
                started.elapsed().as_secs_f64(),
                error,
            )
        };

        let prepared = match self.prepare(job) {
            Ok(p) => p,
            Err(e) => return fail(e),
        };

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                return fail(JobError::Launch {
                    message: format!("failed to create {}: {}", parent.display(), e),
                    fatal: false,
                });
            }
        }

        let mut cmd = build_encode_cmd(
            &self.options.ffmpeg_path,
            &job.path,
            &output,
            &prepared.params,
        );
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return fail(JobError::from_spawn(&e)),
        };
        debug!(pid = child.id(), state = ?JobState::Launched, "job state");

        let mut on_progress = |progress: Progress| {
            report_sink_error("progress", sink.on_progress(progress));
        };
        debug!(state = ?JobState::Running, "job state");
        let supervised = match supervise(
            child,
            prepared.duration,
            &self.options.supervise,
            &mut on_progress,
        ) {
            Ok(s) => s,
            Err(e) => {
                remove_output(&output);
                return fail(JobError::EncodeFailure {
                    exit_code: None,
                    reason: format!("lost track of encoder process: {}", e),
                });
            }
        };

        let status = match supervised.outcome {
            ExitOutcome::TimedOut => {
                remove_output(&output);
                let error = JobError::Timeout {
                    limit_secs: self.options.supervise.timeout.as_secs(),
                };
                self.log_failure(job, &error, &supervised.tail);
                debug!(path = %job.path.display(), state = ?JobState::TimedOut, "job state");
                return JobResult::failed(
                    job.path.clone(),
                    output.clone(),
                    original_mb,
                    started.elapsed().as_secs_f64(),
                    error,
                );
            }
            ExitOutcome::Exited(status) => status,
        };

        if !status.success() {
            remove_output(&output);
            let error = JobError::EncodeFailure {
                exit_code: status.code(),
                reason: supervised.failure_reason(),
            };
            self.log_failure(job, &error, &supervised.tail);
            return fail(error);
        }

        let encoded_bytes = match self.validate_output(&output) {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_output(&output);
                return fail(e);
            }
        };

        report_sink_error("progress", sink.on_progress(Progress::Percent(100.0)));
        let result = JobResult::succeeded(
            job.path.clone(),
            output.clone(),
            original_mb,
            encoded_bytes as f64 / BYTES_PER_MB,
            started.elapsed().as_secs_f64(),
        );
        info!(
            path = %job.path.display(),
            ratio = %format!("{:.1}%", result.compression_ratio),
            "encode completed"
        );
        debug!(state = ?JobState::Completed, "job state");
        result
    }

    fn prepare(&self, job: &JobDescriptor) -> Result<Prepared, JobError> {
        if let Some(reason) = &job.probe_error {
            return Err(JobError::Probe(reason.clone()));
        }
        if !job.path.exists() {
            return Err(JobError::Probe(format!(
                "{} no longer exists",
                job.path.display()
            )));
        }
        if self.output_path(job) == job.path {
            return Err(JobError::Configuration(format!(
                "output path {} is the source itself (output suffix {:?})",
                job.path.display(),
                self.options.output_suffix
            )));
        }

        let mut resolution = job.source_resolution;
        let mut bitrate = job.source_bitrate;
        let mut duration = job.duration_seconds;

        if resolution.is_none() {
            let info = probe_with_retry(
                self.prober.as_ref(),
                &job.path,
                self.options.probe_attempts,
                self.options.probe_backoff,
            )?;
            if !info.has_video {
                return Err(JobError::Probe("no video stream found".to_string()));
            }
            resolution = info.resolution();
            bitrate = bitrate.or(info.bitrate);
            duration = duration.or(info.duration);
        }

        let plan = self.resolution.plan(resolution)?;
        let params = build_params(&self.policy, &plan, bitrate)?;
        Ok(Prepared { params, duration })
    }

    /// Exists, non-empty, and still a video according to the prober
    fn validate_output(&self, output: &Path) -> Result<u64, JobError> {
        let meta = fs::metadata(output).map_err(|_| {
            JobError::OutputValidation(format!("{} was not created", output.display()))
        })?;
        if meta.len() == 0 {
            return Err(JobError::OutputValidation(format!(
                "{} is empty",
                output.display()
            )));
        }

        let info = self
            .prober
            .probe(output)
            .map_err(|e| JobError::OutputValidation(format!("output unreadable: {}", e)))?;
        if !info.has_video {
            return Err(JobError::OutputValidation(
                "output has no video stream".to_string(),
            ));
        }
        Ok(meta.len())
    }

    fn log_failure(&self, job: &JobDescriptor, error: &JobError, tail: &[String]) {
        warn!(path = %job.path.display(), %error, "encode failed");
        let Some(log_path) = &self.options.debug_log else {
            return;
        };
        let message = format!(
            "{}: {}\n{}",
            job.path.display(),
            error,
            tail.join("\n")
        );
        if let Err(e) = write_debug_log(log_path, &message) {
            warn!(error = %format!("{:#}", e), "could not write debug log");
        }
    }
}

fn remove_output(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => debug!(path = %output.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %output.display(), error = %e, "failed to remove partial output"),
    }
}
