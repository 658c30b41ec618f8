// Session statistics and human-readable formatting

use serde::Serialize;
use std::path::PathBuf;

use crate::engine::{JobError, JobResult};

/// Aggregate outcome of one batch run. Mutated only through [`SessionStats::record`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Jobs handed to the batch
    pub total: usize,
    pub completed: usize,
    pub failed: usize,

    /// Source size of successful jobs only, so the overall ratio compares like with like
    pub total_original_mb: f64,
    pub total_encoded_mb: f64,

    /// Failed inputs in the order they failed
    pub failed_paths: Vec<PathBuf>,
    pub results: Vec<JobResult>,

    /// Stopped early at the user's request
    pub cancelled: bool,
    /// Stopped early because no further encode could succeed
    pub aborted: Option<String>,

    pub elapsed_seconds: f64,
}

impl SessionStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Fold one job result into the totals
    pub fn record(&mut self, result: JobResult) {
        if result.success {
            self.completed += 1;
            self.total_original_mb += result.original_size_mb;
            self.total_encoded_mb += result.encoded_size_mb;
        } else {
            self.failed += 1;
            self.failed_paths.push(result.input_path.clone());
        }
        self.results.push(result);
    }

    pub fn attempted(&self) -> usize {
        self.completed + self.failed
    }

    /// Jobs never started because the batch stopped early
    pub fn not_attempted(&self) -> usize {
        self.total.saturating_sub(self.attempted())
    }

    pub fn space_saved_mb(&self) -> f64 {
        self.total_original_mb - self.total_encoded_mb
    }

    /// Encoded size as a percentage of the original, over successful jobs
    pub fn overall_ratio(&self) -> f64 {
        crate::engine::compression_ratio(self.total_original_mb, self.total_encoded_mb)
    }

    /// Failed jobs paired with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, Option<&JobError>)> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| (&r.input_path, r.error.as_ref()))
    }

    pub fn summary(&self) -> SummaryView {
        SummaryView {
            total: self.total,
            completed: self.completed,
            failed: self.failed,
            not_attempted: self.not_attempted(),
            total_original_mb: round2(self.total_original_mb),
            total_encoded_mb: round2(self.total_encoded_mb),
            overall_ratio_pct: round2(self.overall_ratio()),
            elapsed_seconds: round2(self.elapsed_seconds),
            cancelled: self.cancelled,
            aborted: self.aborted.clone(),
        }
    }
}

/// Serializable snapshot of the headline numbers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryView {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub total_original_mb: f64,
    pub total_encoded_mb: f64,
    pub overall_ratio_pct: f64,
    pub elapsed_seconds: f64,
    pub cancelled: bool,
    pub aborted: Option<String>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Multi-line end-of-session report
pub fn format_summary(stats: &SessionStats) -> Vec<String> {
    let mut lines = vec![
        "Encoding summary".to_string(),
        format!("  Files:      {}", stats.total),
        format!("  Completed:  {}", stats.completed),
        format!("  Failed:     {}", stats.failed),
    ];

    if stats.not_attempted() > 0 {
        lines.push(format!("  Skipped:    {}", stats.not_attempted()));
    }

    if stats.completed > 0 {
        let saved = stats.space_saved_mb();
        lines.push(format!(
            "  Size:       {} -> {} ({:.1}% of original)",
            format_mb(stats.total_original_mb),
            format_mb(stats.total_encoded_mb),
            stats.overall_ratio()
        ));
        if saved >= 0.0 {
            lines.push(format!("  Saved:      {}", format_mb(saved)));
        } else {
            lines.push(format!("  Grew by:    {}", format_mb(-saved)));
        }
    }

    lines.push(format!(
        "  Time:       {}",
        format_duration(stats.elapsed_seconds)
    ));

    if stats.cancelled {
        lines.push("  Cancelled by user; remaining files were not processed".to_string());
    }
    if let Some(reason) = &stats.aborted {
        lines.push(format!("  Aborted: {}", reason));
    }

    if stats.failed > 0 {
        lines.push("Failed files:".to_string());
        for (path, error) in stats.failures() {
            match error {
                Some(e) => lines.push(format!("  - {}: {}", path.display(), e)),
                None => lines.push(format!("  - {}", path.display())),
            }
        }
    }

    lines
}

/// Format a size given in MiB
pub fn format_mb(mb: f64) -> String {
    format_bytes((mb.max(0.0) * 1024.0 * 1024.0).round() as u64)
}

/// Format bytes as human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in seconds as human-readable time
pub fn format_duration(seconds: f64) -> String {
    let total_secs = seconds.max(0.0) as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
