// ffprobe runs against fake binaries: parsing through the subprocess and
// the per-run time limit.
#![cfg(unix)]

use ffbatch::engine::{FfprobeProber, JobError, Resolution, SourceProber, probe_with_retry};
use std::time::{Duration, Instant};

use crate::common::fake_ffmpeg::{self, PROBE_JSON, STALLS};

#[test]
fn test_ffprobe_output_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let ffprobe = fake_ffmpeg::install(dir.path(), "ffprobe", PROBE_JSON);
    let video = dir.path().join("clip.mp4");
    std::fs::write(&video, b"data").unwrap();

    let info = FfprobeProber::new(ffprobe.to_string_lossy())
        .probe(&video)
        .unwrap();
    assert!(info.has_video);
    assert_eq!(info.resolution(), Some(Resolution::new(1920, 1080)));
    assert_eq!(info.duration, Some(10.0));
    assert_eq!(info.bitrate, Some(4_000_000));
}

#[test]
fn test_stalled_ffprobe_is_killed_at_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let ffprobe = fake_ffmpeg::install(dir.path(), "ffprobe", STALLS);
    let video = dir.path().join("network.mkv");
    std::fs::write(&video, b"data").unwrap();

    let prober = FfprobeProber::new(ffprobe.to_string_lossy())
        .with_timeout(Duration::from_millis(300));
    let started = Instant::now();
    let err = prober.probe(&video).unwrap_err();

    match err {
        JobError::Probe(reason) => assert!(reason.contains("timed out"), "{}", reason),
        other => panic!("expected probe error, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_retry_bound_applies_to_stalled_ffprobe() {
    let dir = tempfile::tempdir().unwrap();
    let ffprobe = fake_ffmpeg::install(dir.path(), "ffprobe", STALLS);
    let video = dir.path().join("network.mkv");
    std::fs::write(&video, b"data").unwrap();

    let prober = FfprobeProber::new(ffprobe.to_string_lossy())
        .with_timeout(Duration::from_millis(200));
    let started = Instant::now();
    let result = probe_with_retry(&prober, &video, 2, Duration::from_millis(10));

    assert!(matches!(result, Err(JobError::Probe(_))));
    assert!(started.elapsed() < Duration::from_secs(15));
}
