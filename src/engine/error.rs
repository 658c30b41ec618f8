//! Per-job error taxonomy.
//!
//! Every variant is scoped to a single job and is captured into the job's
//! result; only a fatal launch error is allowed to stop the surrounding batch.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    /// Source unreadable or its metadata unparseable
    #[error("probe failed: {0}")]
    Probe(String),

    /// Policy needs data the job does not have (e.g. bitrate for VBR)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Encoder process could not be started
    #[error("failed to launch encoder: {message}")]
    Launch { message: String, fatal: bool },

    /// Encoder exited with a non-zero status
    #[error("encoding failed{}: {reason}", .exit_code.map(|c| format!(" (exit {c})")).unwrap_or_default())]
    EncodeFailure {
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("encoding timed out after {limit_secs}s")]
    Timeout { limit_secs: u64 },

    /// Output missing, empty, or not a playable video
    #[error("output validation failed: {0}")]
    OutputValidation(String),
}

/// Copyable discriminant of [`JobError`] for matching and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Probe,
    Configuration,
    Launch,
    EncodeFailure,
    Timeout,
    OutputValidation,
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Probe(_) => ErrorKind::Probe,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Launch { .. } => ErrorKind::Launch,
            Self::EncodeFailure { .. } => ErrorKind::EncodeFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::OutputValidation(_) => ErrorKind::OutputValidation,
        }
    }

    /// Whether this error means no encode can succeed for any job in the batch
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Launch { fatal: true, .. })
    }

    /// Classify a spawn failure. A missing or non-executable binary, or the
    /// OS refusing to create processes, will fail every remaining job too.
    pub fn from_spawn(err: &std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let fatal = matches!(err.kind(), Io::NotFound | Io::PermissionDenied | Io::OutOfMemory)
            || is_process_limit(err);

        Self::Launch {
            message: err.to_string(),
            fatal,
        }
    }
}

#[cfg(unix)]
fn is_process_limit(err: &std::io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EAGAIN) | Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_process_limit(_err: &std::io::Error) -> bool {
    false
}
