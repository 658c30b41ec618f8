#![allow(dead_code)]

use anyhow::Result;
use ffbatch::engine::{
    CancelFlag, CancellationSource, EncodeEngine, EncodingPolicy, EngineOptions, JobDescriptor,
    JobError, JobResult, MediaInfo, Progress, ProgressSink, ResolutionPolicy, SourceProber,
};
use ffbatch::stats::SessionStats;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Probe result for a typical source file
pub fn video_info(width: u32, height: u32, duration: f64, bitrate: u64) -> MediaInfo {
    MediaInfo {
        duration: Some(duration),
        bitrate: Some(bitrate),
        width: Some(width),
        height: Some(height),
        codec: Some("h264".to_string()),
        has_video: true,
    }
}

/// Prober with canned answers. Sources answer from the table; any other file
/// that exists on disk is treated as an encoder output.
#[derive(Default)]
pub struct MockProber {
    sources: HashMap<PathBuf, MediaInfo>,
    broken: Vec<PathBuf>,
    pub outputs_have_video: bool,
    calls: AtomicUsize,
}

impl MockProber {
    pub fn new() -> Self {
        Self {
            outputs_have_video: true,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>, info: MediaInfo) -> Self {
        self.sources.insert(path.into(), info);
        self
    }

    /// Probing this path always fails
    pub fn with_broken(mut self, path: impl Into<PathBuf>) -> Self {
        self.broken.push(path.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceProber for MockProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.iter().any(|p| p == path) {
            return Err(JobError::Probe(
                "Invalid data found when processing input".to_string(),
            ));
        }
        if let Some(info) = self.sources.get(path) {
            return Ok(info.clone());
        }
        if path.exists() {
            return Ok(MediaInfo {
                has_video: self.outputs_have_video,
                width: Some(1280),
                height: Some(720),
                ..Default::default()
            });
        }
        Err(JobError::Probe(format!("{}: no such file", path.display())))
    }
}

/// Options for a fake encoder with short timeouts and no debug log
pub fn test_options(ffmpeg: &Path, timeout: Duration) -> EngineOptions {
    let mut options = EngineOptions {
        ffmpeg_path: ffmpeg.to_string_lossy().to_string(),
        probe_attempts: 1,
        probe_backoff: Duration::ZERO,
        debug_log: None,
        ..Default::default()
    };
    options.supervise.timeout = timeout;
    options.supervise.kill_grace = Duration::from_millis(200);
    options.supervise.progress_interval = Duration::ZERO;
    options
}

pub fn test_engine(ffmpeg: &Path, prober: Arc<dyn SourceProber>, timeout: Duration) -> EncodeEngine {
    engine_with(test_options(ffmpeg, timeout), prober)
}

pub fn engine_with(options: EngineOptions, prober: Arc<dyn SourceProber>) -> EncodeEngine {
    EncodeEngine::new(
        EncodingPolicy::default(),
        ResolutionPolicy::default(),
        prober,
        options,
    )
}

/// Write a source file and return a descriptor for it
pub fn make_source(dir: &Path, name: &str, info: &MediaInfo) -> JobDescriptor {
    let path = dir.join(name);
    std::fs::write(&path, vec![7u8; 64 * 1024]).unwrap();
    JobDescriptor::from_probe(path, 64 * 1024, Ok(info.clone()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start { name: String, index: usize, total: usize },
    Progress(Progress),
    Complete { name: String, success: bool },
    CancelRequested,
    SessionEnd { completed: usize, failed: usize },
}

/// Sink that remembers every event, optionally raising a cancel flag after N
/// completions or on the first progress event
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<Event>,
    cancel_after: Option<(usize, CancelFlag)>,
    cancel_on_progress: Option<CancelFlag>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(completions: usize, flag: CancelFlag) -> Self {
        Self {
            cancel_after: Some((completions, flag)),
            ..Default::default()
        }
    }

    pub fn cancelling_mid_encode(flag: CancelFlag) -> Self {
        Self {
            cancel_on_progress: Some(flag),
            ..Default::default()
        }
    }

    pub fn cancel_notices(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::CancelRequested))
            .count()
    }

    pub fn starts(&self) -> Vec<(String, usize, usize)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Start { name, index, total } => Some((name.clone(), *index, *total)),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<(String, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Complete { name, success } => Some((name.clone(), *success)),
                _ => None,
            })
            .collect()
    }

    pub fn percents(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Progress(Progress::Percent(p)) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn session_ends(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::SessionEnd { .. }))
            .count()
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl ProgressSink for RecordingSink {
    fn on_start(&mut self, job: &JobDescriptor, index: usize, total: usize) -> Result<()> {
        self.events.push(Event::Start {
            name: name_of(&job.path),
            index,
            total,
        });
        Ok(())
    }

    fn on_progress(&mut self, progress: Progress) -> Result<()> {
        self.events.push(Event::Progress(progress));
        if let Some(flag) = &self.cancel_on_progress {
            flag.request_cancel();
        }
        Ok(())
    }

    fn on_complete(&mut self, result: &JobResult) -> Result<()> {
        self.events.push(Event::Complete {
            name: name_of(&result.input_path),
            success: result.success,
        });
        if let Some((after, flag)) = &self.cancel_after {
            if self.completions().len() >= *after {
                flag.request_cancel();
            }
        }
        Ok(())
    }

    fn on_cancel_requested(&mut self) -> Result<()> {
        self.events.push(Event::CancelRequested);
        Ok(())
    }

    fn on_session_end(&mut self, stats: &SessionStats) -> Result<()> {
        self.events.push(Event::SessionEnd {
            completed: stats.completed,
            failed: stats.failed,
        });
        Ok(())
    }
}
