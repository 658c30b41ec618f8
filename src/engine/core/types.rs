use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::engine::error::{ErrorKind, JobError};
use crate::engine::probe::MediaInfo;
use crate::engine::resolution::Resolution;

/// Suffix appended to the file stem of every encoded output
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_encoded";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Lifecycle of a single encode
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Launched,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// One discovered input file plus its probed metadata. Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobDescriptor {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_seconds: Option<f64>,
    /// Bits per second
    pub source_bitrate: Option<u64>,
    pub source_resolution: Option<Resolution>,
    pub source_codec: Option<String>,
    pub probe_error: Option<String>,
}

impl JobDescriptor {
    /// Descriptor with no metadata yet; the engine probes on demand
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        Self {
            path,
            size_bytes,
            duration_seconds: None,
            source_bitrate: None,
            source_resolution: None,
            source_codec: None,
            probe_error: None,
        }
    }

    /// Build from a probe outcome. A file without a video stream counts as a probe failure.
    pub fn from_probe(path: PathBuf, size_bytes: u64, probed: Result<MediaInfo, JobError>) -> Self {
        let mut job = Self::new(path, size_bytes);
        match probed {
            Ok(info) if !info.has_video => {
                job.probe_error = Some("no video stream found".to_string());
            }
            Ok(info) => {
                job.duration_seconds = info.duration;
                job.source_bitrate = info.bitrate;
                job.source_resolution = info.resolution();
                job.source_codec = info.codec;
            }
            Err(e) => job.probe_error = Some(e.to_string()),
        }
        job
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }

    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }

    /// `<parent>/<stem><suffix>.<ext>`, keeping the source container
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        output_path_for(&self.path, suffix)
    }
}

pub fn output_path_for(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Terminal outcome of one job. Built once and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub success: bool,
    pub original_size_mb: f64,
    pub encoded_size_mb: f64,
    pub elapsed_seconds: f64,
    /// Output size as a percentage of the source
    pub compression_ratio: f64,
    pub error: Option<JobError>,
}

impl JobResult {
    pub fn succeeded(
        input_path: PathBuf,
        output_path: PathBuf,
        original_size_mb: f64,
        encoded_size_mb: f64,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            input_path,
            output_path,
            success: true,
            original_size_mb,
            encoded_size_mb,
            elapsed_seconds,
            compression_ratio: compression_ratio(original_size_mb, encoded_size_mb),
            error: None,
        }
    }

    pub fn failed(
        input_path: PathBuf,
        output_path: PathBuf,
        original_size_mb: f64,
        elapsed_seconds: f64,
        error: JobError,
    ) -> Self {
        Self {
            input_path,
            output_path,
            success: false,
            original_size_mb,
            encoded_size_mb: 0.0,
            elapsed_seconds,
            compression_ratio: 0.0,
            error: Some(error),
        }
    }

    pub fn state(&self) -> JobState {
        match &self.error {
            None if self.success => JobState::Completed,
            Some(e) if e.kind() == ErrorKind::Timeout => JobState::TimedOut,
            _ => JobState::Failed,
        }
    }

    /// Bytes saved as a percentage of the source (negative when the output grew)
    pub fn space_saved_pct(&self) -> f64 {
        if self.success && self.original_size_mb > 0.0 {
            100.0 - self.compression_ratio
        } else {
            0.0
        }
    }
}

/// `encoded / original * 100`, or 0 for an empty source
pub fn compression_ratio(original_mb: f64, encoded_mb: f64) -> f64 {
    if original_mb > 0.0 {
        encoded_mb / original_mb * 100.0
    } else {
        0.0
    }
}
