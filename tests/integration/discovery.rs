// Directory scanning and probe-backed discovery

use ffbatch::engine::{DiscoveryOptions, discover, scan};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::helpers::*;

fn touch(root: &Path, rel: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, vec![0u8; 2048]).unwrap();
    path
}

fn library() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for rel in [
        "a.mp4",
        "B.MKV",
        "notes.txt",
        "a_encoded.mp4",
        "c_modified.mov",
        "d_small.mp4",
        "sub/e.webm",
        "sub/deeper/f.avi",
        "sub/cover.jpg",
    ] {
        touch(dir.path(), rel);
    }
    dir
}

fn relative(root: &Path, files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .map(|f| {
            f.strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[test]
fn test_recursive_scan_filters_and_sorts() {
    let dir = library();
    let files = scan(dir.path(), true, "_encoded").unwrap();
    assert_eq!(
        relative(dir.path(), &files),
        vec!["B.MKV", "a.mp4", "d_small.mp4", "sub/deeper/f.avi", "sub/e.webm"]
    );
}

#[test]
fn test_flat_scan_stays_in_root() {
    let dir = library();
    let files = scan(dir.path(), false, "_encoded").unwrap();
    assert_eq!(relative(dir.path(), &files), vec!["B.MKV", "a.mp4", "d_small.mp4"]);
}

#[test]
fn test_custom_suffix_is_excluded_too() {
    let dir = library();
    let files = scan(dir.path(), false, "_small").unwrap();
    assert_eq!(relative(dir.path(), &files), vec!["B.MKV", "a.mp4"]);
}

#[test]
fn test_missing_root_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(scan(&dir.path().join("nope"), true, "_encoded").is_err());
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    let real = touch(dir.path(), "real.mp4");
    let elsewhere = tempfile::tempdir().unwrap();
    touch(elsewhere.path(), "outside.mkv");

    std::os::unix::fs::symlink(&real, dir.path().join("alias.mp4")).unwrap();
    std::os::unix::fs::symlink(elsewhere.path(), dir.path().join("linked")).unwrap();

    let files = scan(dir.path(), true, "_encoded").unwrap();
    assert_eq!(relative(dir.path(), &files), vec!["real.mp4"]);
}

#[test]
fn test_discover_splits_jobs_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let good = touch(dir.path(), "good.mp4");
    let audio = touch(dir.path(), "audio_only.mkv");
    let broken = touch(dir.path(), "broken.avi");
    touch(dir.path(), "good_encoded.mp4");

    let mut no_video = video_info(0, 0, 30.0, 128_000);
    no_video.has_video = false;
    let prober = MockProber::new()
        .with_source(&good, video_info(3840, 2160, 60.0, 20_000_000))
        .with_source(&audio, no_video)
        .with_broken(&broken);

    let options = DiscoveryOptions {
        probe_attempts: 2,
        probe_backoff: Duration::ZERO,
        ..Default::default()
    };
    let discovery = discover(dir.path(), &prober, &options).unwrap();

    assert_eq!(discovery.jobs.len(), 1);
    let job = &discovery.jobs[0];
    assert_eq!(job.path, good);
    assert_eq!(job.size_bytes, 2048);
    assert_eq!(job.duration_seconds, Some(60.0));
    assert_eq!(job.source_bitrate, Some(20_000_000));
    assert_eq!(job.source_resolution.map(|r| r.to_string()), Some("3840x2160".into()));

    let skipped: Vec<_> = discovery
        .skipped
        .iter()
        .map(|j| (j.path.clone(), j.probe_error.clone().unwrap()))
        .collect();
    assert_eq!(skipped.len(), 2);
    assert!(skipped.contains(&(audio, "no video stream found".to_string())));
    assert!(
        skipped
            .iter()
            .any(|(p, e)| p == &broken && e.contains("Invalid data"))
    );

    // good.mp4 once, audio_only.mkv once, broken.avi retried
    assert_eq!(prober.calls(), 4);
    assert!((discovery.total_size_mb() - 2048.0 / 1048576.0).abs() < 1e-12);
}
