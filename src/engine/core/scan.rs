use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::types::JobDescriptor;
use crate::engine::probe::{SourceProber, probe_with_retry};

/// Default video file extensions to scan for
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v"];

/// Name fragments marking files this tool (or a sibling) already produced
const PROCESSED_MARKERS: &[&str] = &["_encoded.", "_modified."];

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Whether the file name carries an output marker, including the configured suffix
pub fn is_processed_output(path: &Path, output_suffix: &str) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    let custom = format!("{}.", output_suffix.to_lowercase());
    PROCESSED_MARKERS.iter().any(|m| name.contains(m))
        || (!output_suffix.is_empty() && name.contains(&custom))
}

/// List candidate videos under `root`, sorted. Symlinks are not followed.
pub fn scan(root: &Path, recursive: bool, output_suffix: &str) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        anyhow::bail!("{} does not exist", root.display());
    }

    let mut walker = WalkDir::new(root).follow_links(false);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_file()
            && is_video_file(path)
            && !is_processed_output(path, output_suffix)
        {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// How discovery names outputs and probes candidates
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub recursive: bool,
    pub output_suffix: String,
    pub probe_attempts: u32,
    pub probe_backoff: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            output_suffix: super::types::DEFAULT_OUTPUT_SUFFIX.to_string(),
            probe_attempts: 3,
            probe_backoff: Duration::from_millis(500),
        }
    }
}

/// Probed candidates, split into encodable jobs and files that failed probing
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub jobs: Vec<JobDescriptor>,
    pub skipped: Vec<JobDescriptor>,
}

impl Discovery {
    pub fn total_size_mb(&self) -> f64 {
        self.jobs.iter().map(JobDescriptor::size_mb).sum()
    }
}

/// Scan `root` and probe every candidate into a descriptor
pub fn discover(
    root: &Path,
    prober: &dyn SourceProber,
    options: &DiscoveryOptions,
) -> Result<Discovery> {
    let files = scan(root, options.recursive, &options.output_suffix)
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    let mut discovery = Discovery::default();
    for path in files {
        let size_bytes = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata for {}", path.display()))?
            .len();
        let probed = probe_with_retry(
            prober,
            &path,
            options.probe_attempts,
            options.probe_backoff,
        );
        let job = JobDescriptor::from_probe(path, size_bytes, probed);

        match &job.probe_error {
            Some(reason) => {
                info!(path = %job.path.display(), %reason, "skipping unreadable video");
                discovery.skipped.push(job);
            }
            None => discovery.jobs.push(job),
        }
    }

    debug!(
        jobs = discovery.jobs.len(),
        skipped = discovery.skipped.len(),
        "discovery finished"
    );
    Ok(discovery)
}
