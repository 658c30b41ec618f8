// Batch coordinator sessions: ordering, failure isolation, cancellation,
// fatal aborts, source deletion, and cleanup.
#![cfg(unix)]

use ffbatch::engine::{
    BatchCoordinator, CancelFlag, CancellationSource, ErrorKind, JobDescriptor, cleanup,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::common::fake_ffmpeg::{self, SAME_AS_INPUT, SIZED_OUTPUTS, WRITES_OUTPUT};
use crate::common::helpers::*;

fn coordinator(ffmpeg: &std::path::Path, cancel: &CancelFlag) -> BatchCoordinator {
    let engine = test_engine(ffmpeg, Arc::new(MockProber::new()), Duration::from_secs(30));
    let source: Arc<dyn CancellationSource> = Arc::new(cancel.clone());
    BatchCoordinator::new(engine, source)
}

const MIB: u64 = 1024 * 1024;

#[test]
fn test_three_job_session_with_failing_last_job() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg::install(dir.path(), "ffmpeg", SIZED_OUTPUTS);
    let sources = [
        ("job_1.mp4", 100, 10.0),
        ("job_2.mp4", 200, 20.0),
        ("job_3.mp4", 300, 30.0),
    ];
    let jobs: Vec<JobDescriptor> = sources
        .into_iter()
        .map(|(name, mb, duration)| {
            let path = dir.path().join(name);
            std::fs::write(&path, b"source").unwrap();
            let info = video_info(1920, 1080, duration, 8_000_000);
            JobDescriptor::from_probe(path, mb * MIB, Ok(info))
        })
        .collect();

    let cancel = CancelFlag::new();
    let mut sink = RecordingSink::new();
    let stats = coordinator(&ffmpeg, &cancel).run(&jobs, &mut sink);

    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
    assert!((stats.total_original_mb - 300.0).abs() < 1e-9);
    assert!((stats.total_encoded_mb - 180.0).abs() < 1e-9);
    assert!((stats.overall_ratio() - 60.0).abs() < 1e-9);
    assert_eq!(stats.failed_paths, vec![dir.path().join("job_3.mp4")]);
    assert!(!stats.cancelled);
    assert!(stats.aborted.is_none());

    assert_eq!(
        stats.results[2].error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::EncodeFailure)
    );
    assert!(dir.path().join("job_1_encoded.mp4").exists());
    assert!(dir.path().join("job_2_encoded.mp4").exists());
    assert!(!dir.path().join("job_3_encoded.mp4").exists());
    assert_eq!(
        sink.events.last(),
        Some(&Event::SessionEnd {
            completed: 2,
            failed: 1
        })
    );
}

#[test]
fn test_failure_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg::install(dir.path(), "ffmpeg", WRITES_OUTPUT);
    let info = video_info(1920, 1080, 10.0, 4_000_000);
    let jobs = vec![
        make_source(dir.path(), "a.mp4", &info),
        make_source(dir.path(), "FAILME.mp4", &info),
        make_source(dir.path(), "c.mp4", &info),
    ];

    let cancel = CancelFlag::new();
    let mut sink = RecordingSink::new();
    let stats = coordinator(&ffmpeg, &cancel).run(&jobs, &mut sink);

    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failed_paths, vec![dir.path().join("FAILME.mp4")]);
    assert!(!stats.cancelled);
    assert!(stats.aborted.is_none());
    assert!((stats.total_original_mb - 0.125).abs() < 1e-9);

    assert_eq!(
        sink.starts(),
        vec![
            ("a.mp4".to_string(), 1, 3),
            ("FAILME.mp4".to_string(), 2, 3),
            ("c.mp4".to_string(), 3, 3),
        ]
    );
    assert_eq!(
        sink.completions(),
        vec![
            ("a.mp4".to_string(), true),
            ("FAILME.mp4".to_string(), false),
            ("c.mp4".to_string(), true),
        ]
    );
    assert_eq!(sink.session_ends(), 1);
    assert_eq!(
        sink.events.last(),
        Some(&Event::SessionEnd {
            completed: 2,
            failed: 1
        })
    );

    assert!(dir.path().join("a_encoded.mp4").exists());
    assert!(!dir.path().join("FAILME_encoded.mp4").exists());
    assert!(dir.path().join("c_encoded.mp4").exists());
}

#[test]
fn test_cancel_stops_before_next_file() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg::install(dir.path(), "ffmpeg", WRITES_OUTPUT);
    let info = video_info(1280, 720, 10.0, 4_000_000);
    let jobs: Vec<_> = ["one.mkv", "two.mkv", "three.mkv"]
        .iter()
        .map(|name| make_source(dir.path(), name, &info))
        .collect();

    let cancel = CancelFlag::new();
    let mut sink = RecordingSink::cancelling_after(1, cancel.clone());
    let stats = coordinator(&ffmpeg, &cancel).run(&jobs, &mut sink);

    assert!(stats.cancelled);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.attempted(), 1);
    assert_eq!(stats.not_attempted(), 2);
    assert_eq!(sink.starts().len(), 1);
    assert_eq!(sink.session_ends(), 1);
    assert_eq!(sink.cancel_notices(), 1);
    assert!(!dir.path().join("two_encoded.mkv").exists());
}

#[test]
fn test_cancel_during_encode_is_announced_before_completion() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg::install(dir.path(), "ffmpeg", WRITES_OUTPUT);
    let info = video_info(1280, 720, 10.0, 4_000_000);
    let jobs: Vec<_> = ["one.mkv", "two.mkv"]
        .iter()
        .map(|name| make_source(dir.path(), name, &info))
        .collect();

    let cancel = CancelFlag::new();
    let mut sink = RecordingSink::cancelling_mid_encode(cancel.clone());
    let stats = coordinator(&ffmpeg, &cancel).run(&jobs, &mut sink);

    // The running file still finishes
    assert!(stats.cancelled);
    assert_eq!(stats.completed, 1);
    assert_eq!(sink.cancel_notices(), 1);

    let notice = sink
        .events
        .iter()
        .position(|e| *e == Event::CancelRequested)
        .unwrap();
    let complete = sink
        .events
        .iter()
        .position(|e| matches!(e, Event::Complete { .. }))
        .unwrap();
    assert!(notice < complete, "{:?}", sink.events);
    assert!(dir.path().join("one_encoded.mkv").exists());
    assert!(!dir.path().join("two_encoded.mkv").exists());
}

#[test]
fn test_cancel_before_start_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg::install(dir.path(), "ffmpeg", WRITES_OUTPUT);
    let jobs = vec![make_source(dir.path(), "a.mp4", &video_info(640, 480, 1.0, 1_000))];

    let cancel = CancelFlag::new();
    cancel.request_cancel();
    let mut sink = RecordingSink::new();
    let stats = coordinator(&ffmpeg, &cancel).run(&jobs, &mut sink);

    assert!(stats.cancelled);
    assert_eq!(stats.attempted(), 0);
    assert!(sink.starts().is_empty());
    assert_eq!(sink.session_ends(), 1);
    assert_eq!(sink.events.first(), Some(&Event::CancelRequested));
}

#[test]
fn test_missing_encoder_aborts_after_first_job() {
    let dir = tempfile::tempdir().unwrap();
    let info = video_info(1280, 720, 10.0, 4_000_000);
    let jobs = vec![
        make_source(dir.path(), "a.mp4", &info),
        make_source(dir.path(), "b.mp4", &info),
    ];

    let cancel = CancelFlag::new();
    let mut sink = RecordingSink::new();
    let stats = coordinator(&dir.path().join("missing-ffmpeg"), &cancel).run(&jobs, &mut sink);

    assert!(stats.aborted.is_some());
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.not_attempted(), 1);
    assert_eq!(
        stats.results[0].error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::Launch)
    );
    assert_eq!(sink.starts().len(), 1);
}

#[test]
fn test_delete_source_only_after_success() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg::install(dir.path(), "ffmpeg", WRITES_OUTPUT);
    let info = video_info(1280, 720, 10.0, 4_000_000);
    let jobs = vec![
        make_source(dir.path(), "keep_FAILME.mp4", &info),
        make_source(dir.path(), "drop.mp4", &info),
    ];

    let cancel = CancelFlag::new();
    let stats = coordinator(&ffmpeg, &cancel)
        .delete_source_on_success(true)
        .run(&jobs, &mut RecordingSink::new());

    assert_eq!(stats.completed, 1);
    assert!(dir.path().join("keep_FAILME.mp4").exists());
    assert!(!dir.path().join("drop.mp4").exists());
    assert!(dir.path().join("drop_encoded.mp4").exists());
}

#[test]
fn test_empty_batch() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();
    let mut sink = RecordingSink::new();
    let stats = coordinator(&dir.path().join("ffmpeg"), &cancel).run(&[], &mut sink);

    assert_eq!(stats.total, 0);
    assert_eq!(stats.attempted(), 0);
    assert_eq!(stats.overall_ratio(), 0.0);
    assert_eq!(sink.session_ends(), 1);
}

#[test]
fn test_cleanup_after_session_removes_stale_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg::install(dir.path(), "ffmpeg", WRITES_OUTPUT);
    let info = video_info(1280, 720, 10.0, 4_000_000);
    let jobs = vec![
        make_source(dir.path(), "ok.mp4", &info),
        make_source(dir.path(), "FAILME.mp4", &info),
    ];

    let cancel = CancelFlag::new();
    let stats = coordinator(&ffmpeg, &cancel).run(&jobs, &mut RecordingSink::new());

    // Leftover from an earlier interrupted run
    let stale: PathBuf = dir.path().join("FAILME_encoded.mp4");
    std::fs::write(&stale, b"x").unwrap();

    let report = cleanup(&stats, &jobs, "_encoded");
    assert_eq!(report.removed, vec![stale.clone()]);
    assert!(!stale.exists());
    // 4 KiB is above the undersized threshold
    assert!(dir.path().join("ok_encoded.mp4").exists());
}

#[test]
fn test_blank_suffix_never_deletes_sources() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg::install(dir.path(), "ffmpeg", SAME_AS_INPUT);
    let jobs = vec![make_source(dir.path(), "precious.mp4", &video_info(1280, 720, 5.0, 1_000_000))];

    let mut options = test_options(&ffmpeg, Duration::from_secs(30));
    options.output_suffix = String::new();
    let engine = engine_with(options, Arc::new(MockProber::new()));
    let stats = BatchCoordinator::new(engine, Arc::new(CancelFlag::new()))
        .delete_source_on_success(true)
        .run(&jobs, &mut RecordingSink::new());

    assert_eq!(stats.failed, 1);
    assert!(dir.path().join("precious.mp4").exists());
}
