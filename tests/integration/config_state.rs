// Config file round trips and conversion into engine settings

use ffbatch::config::Config;
use ffbatch::engine::{
    CodecFamily, EncodingMethod, HardwareChoice, HwAccel, ResolutionPreset, VideoEncoder,
};
use std::time::Duration;

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.defaults.codec = CodecFamily::H264;
    config.defaults.method = EncodingMethod::Bitrate;
    config.defaults.bitrate_multiplier = 0.5;
    config.defaults.hardware_accel = HardwareChoice::Auto;
    config.defaults.max_resolution = ResolutionPreset::Qhd;
    config.engine.timeout_secs = 120;
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_file_uses_preset_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[defaults]
codec = "hevc"
method = "crf"
quality = 30
max_resolution = "4k"
output_suffix = "_small"

[engine]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.defaults.codec, CodecFamily::H265);
    assert_eq!(config.defaults.method, EncodingMethod::Quality);
    assert_eq!(config.defaults.quality, 30.0);
    assert_eq!(config.defaults.max_resolution, ResolutionPreset::Uhd);
    assert_eq!(config.engine.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
    assert_eq!(config.engine.ffprobe_path, "ffprobe");

    assert_eq!(config.discovery_options().unwrap().output_suffix, "_small");
    assert_eq!(config.engine_options().unwrap().output_suffix, "_small");
    assert_eq!(config.resolution_policy().max_long_edge(), 3840);
}

#[test]
fn test_invalid_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[defaults]\ncodec = \"av1\"\n").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("config.toml"));
}

#[test]
fn test_missing_file_is_an_error_for_explicit_paths() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_policy_from_config() {
    let mut config = Config::default();
    config.defaults.codec = CodecFamily::H265;
    config.defaults.quality = -4.0;
    config.defaults.preset = "slow".to_string();

    let policy = config.to_policy(Some(HwAccel::Nvenc));
    assert_eq!(policy.codec_id(), VideoEncoder::HevcNvenc);
    assert_eq!(policy.value(), 0.0);
    assert_eq!(policy.preset(), "slow");

    config.defaults.method = EncodingMethod::Bitrate;
    config.defaults.bitrate_multiplier = 50.0;
    assert_eq!(config.to_policy(None).value(), 10.0);
}

#[test]
fn test_engine_options_from_config() {
    let mut config = Config::default();
    config.engine.timeout_secs = 0;
    config.engine.kill_grace_secs = 5;
    config.engine.probe_backoff_ms = 250;

    let options = config.engine_options().unwrap();
    assert_eq!(options.supervise.timeout, Duration::from_secs(1));
    assert_eq!(options.supervise.kill_grace, Duration::from_secs(5));
    assert_eq!(options.probe_backoff, Duration::from_millis(250));
    assert!(options.debug_log.is_some());
}

#[test]
fn test_empty_suffix_in_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[defaults]\noutput_suffix = \"\"\n").unwrap();

    let config = Config::load_from(&path).unwrap();
    let err = config.engine_options().unwrap_err();
    assert!(format!("{:#}", err).contains("output_suffix"));
    assert!(config.discovery_options().is_err());
}

#[test]
fn test_probe_timeout_from_config() {
    let config: Config = toml::from_str("[engine]\nprobe_timeout_secs = 5\n").unwrap();
    assert_eq!(config.engine.probe_timeout_secs, 5);
    assert_eq!(Config::default().engine.probe_timeout_secs, 30);
}
