// Global configuration management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::hardware::{CodecFamily, HardwareChoice, HwAccel};
use crate::engine::params::{EncodingMethod, EncodingPolicy};
use crate::engine::probe::FfprobeProber;
use crate::engine::resolution::{ResolutionPolicy, ResolutionPreset};
use crate::engine::{DEFAULT_DEBUG_LOG, DEFAULT_OUTPUT_SUFFIX, DiscoveryOptions, EngineOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub codec: CodecFamily,

    /// "quality" (CRF/QP) or "bitrate" (multiple of source bitrate)
    pub method: EncodingMethod,

    /// CRF/QP for quality mode, clamped to 0-51
    pub quality: f64,

    /// Source bitrate multiplier for bitrate mode, clamped to 0.1-10
    pub bitrate_multiplier: f64,

    /// Encoder speed preset (software and NVENC only)
    pub preset: String,

    /// "none", "auto", or a vendor ("nvenc", "amf", "qsv")
    pub hardware_accel: HardwareChoice,

    /// Downscale anything larger than this
    pub max_resolution: ResolutionPreset,

    pub recursive: bool,

    /// Delete each source after a successful encode
    pub delete_originals: bool,

    /// Appended to the file stem of encoded outputs
    pub output_suffix: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            codec: CodecFamily::H265,
            method: EncodingMethod::Quality,
            quality: 23.0,
            bitrate_multiplier: 0.75,
            preset: "medium".to_string(),
            hardware_accel: HardwareChoice::None,
            max_resolution: ResolutionPreset::Fhd,
            recursive: true,
            delete_originals: false,
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,

    /// Wall-clock limit per file
    pub timeout_secs: u64,

    /// Wait between SIGTERM and SIGKILL on timeout
    pub kill_grace_secs: u64,

    pub probe_attempts: u32,
    pub probe_backoff_ms: u64,

    /// Wall-clock limit for a single ffprobe run
    pub probe_timeout_secs: u64,

    /// Failed-encode log file; empty string disables it
    pub debug_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            timeout_secs: 3600,
            kill_grace_secs: 2,
            probe_attempts: 3,
            probe_backoff_ms: 500,
            probe_timeout_secs: 30,
            debug_log: Some(PathBuf::from(DEFAULT_DEBUG_LOG)),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("ffbatch")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("ffbatch")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the default location, or built-in defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Batch encoding policy. `hw` is the accel already resolved against the
    /// capability report.
    pub fn to_policy(&self, hw: Option<HwAccel>) -> EncodingPolicy {
        let d = &self.defaults;
        let mut policy = EncodingPolicy::default();
        policy.set_codec_family(d.codec);
        policy.set_hardware_accel(hw);
        match d.method {
            EncodingMethod::Quality => policy.set_quality(d.quality, &d.preset),
            EncodingMethod::Bitrate => policy.set_bitrate_multiplier(d.bitrate_multiplier, &d.preset),
        }
        policy
    }

    pub fn resolution_policy(&self) -> ResolutionPolicy {
        ResolutionPolicy::new(self.defaults.max_resolution)
    }

    /// Suffix for encoded outputs. Empty or blank suffixes are rejected:
    /// the output would land on the source path.
    pub fn output_suffix(&self) -> Result<&str> {
        let suffix = self.defaults.output_suffix.as_str();
        if suffix.trim().is_empty() {
            bail!(
                "Invalid output_suffix {:?}: encoded files would replace their sources",
                suffix
            );
        }
        Ok(suffix)
    }

    pub fn engine_options(&self) -> Result<EngineOptions> {
        let e = &self.engine;
        let mut options = EngineOptions {
            ffmpeg_path: e.ffmpeg_path.clone(),
            output_suffix: self.output_suffix()?.to_string(),
            probe_attempts: e.probe_attempts,
            probe_backoff: Duration::from_millis(e.probe_backoff_ms),
            debug_log: e
                .debug_log
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
            ..Default::default()
        };
        options.supervise.timeout = Duration::from_secs(e.timeout_secs.max(1));
        options.supervise.kill_grace = Duration::from_secs(e.kill_grace_secs);
        Ok(options)
    }

    pub fn discovery_options(&self) -> Result<DiscoveryOptions> {
        Ok(DiscoveryOptions {
            recursive: self.defaults.recursive,
            output_suffix: self.output_suffix()?.to_string(),
            probe_attempts: self.engine.probe_attempts,
            probe_backoff: Duration::from_millis(self.engine.probe_backoff_ms),
        })
    }

    pub fn prober(&self) -> FfprobeProber {
        FfprobeProber::new(self.engine.ffprobe_path.clone())
            .with_timeout(Duration::from_secs(self.engine.probe_timeout_secs.max(1)))
    }
}
