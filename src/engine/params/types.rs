/// Encoding policy types: rate-control method, named presets, and the
/// parameter bag handed to the encoder.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::engine::hardware::{CodecFamily, EncoderVariant, HwAccel, VideoEncoder};

pub const QUALITY_MIN: f64 = 0.0;
pub const QUALITY_MAX: f64 = 51.0;
pub const MULTIPLIER_MIN: f64 = 0.1;
pub const MULTIPLIER_MAX: f64 = 10.0;

/// How the encoder's output size is controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMethod {
    /// Constant quality (CRF / QP)
    #[default]
    #[serde(alias = "crf")]
    Quality,
    /// Target bitrate as a multiple of the source bitrate
    #[serde(alias = "vbr")]
    Bitrate,
}

impl fmt::Display for EncodingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quality => write!(f, "quality"),
            Self::Bitrate => write!(f, "bitrate"),
        }
    }
}

/// Named constant-quality levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPreset {
    UltraHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 5] = [
        Self::UltraHigh,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::VeryLow,
    ];

    pub fn value(&self) -> f64 {
        match self {
            Self::UltraHigh => 18.0,
            Self::High => 23.0,
            Self::Medium => 28.0,
            Self::Low => 33.0,
            Self::VeryLow => 38.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UltraHigh => "ultra_high",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very_low",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|p| p.name() == normalized)
    }
}

/// Named bitrate multipliers relative to the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitratePreset {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

impl BitratePreset {
    pub const ALL: [BitratePreset; 5] = [
        Self::Highest,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Lowest,
    ];

    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Highest => 1.2,
            Self::High => 1.0,
            Self::Medium => 0.75,
            Self::Low => 0.5,
            Self::Lowest => 0.25,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Lowest => "lowest",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|p| p.name() == normalized)
    }
}

/// Describe a CRF/QP value in words
pub fn quality_description(value: f64) -> &'static str {
    if value <= 18.0 {
        "Ultra High Quality (Near Lossless)"
    } else if value <= 23.0 {
        "High Quality"
    } else if value <= 28.0 {
        "Medium Quality (Balanced)"
    } else if value <= 33.0 {
        "Low Quality"
    } else {
        "Very Low Quality"
    }
}

/// Describe a bitrate multiplier in words
pub fn bitrate_description(multiplier: f64) -> &'static str {
    if multiplier >= 1.0 {
        "High Quality (Preserve/Increase Bitrate)"
    } else if multiplier >= 0.75 {
        "Medium Quality (Moderate Compression)"
    } else if multiplier >= 0.5 {
        "Low Quality (High Compression)"
    } else {
        "Very Low Quality (Maximum Compression)"
    }
}

/// Batch-wide encoding policy.
///
/// Fields are private so the clamping setters are the only way in; `codec_id`
/// always matches `(codec_family, hardware_accel)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingPolicy {
    method: EncodingMethod,
    value: f64,
    codec_family: CodecFamily,
    preset: String,
    hardware_accel: Option<HwAccel>,
    codec_id: VideoEncoder,
}

impl Default for EncodingPolicy {
    fn default() -> Self {
        Self {
            method: EncodingMethod::Quality,
            value: 23.0,
            codec_family: CodecFamily::H265,
            preset: "medium".to_string(),
            hardware_accel: None,
            codec_id: VideoEncoder::Libx265,
        }
    }
}

impl EncodingPolicy {
    /// Constant-quality mode; value clamped to [0, 51]
    pub fn set_quality(&mut self, value: f64, preset: &str) {
        self.method = EncodingMethod::Quality;
        self.value = clamp_or(value, QUALITY_MIN, QUALITY_MAX);
        self.preset = preset.to_string();
    }

    /// Bitrate mode; multiplier clamped to [0.1, 10]
    pub fn set_bitrate_multiplier(&mut self, value: f64, preset: &str) {
        self.method = EncodingMethod::Bitrate;
        self.value = clamp_or(value, MULTIPLIER_MIN, MULTIPLIER_MAX);
        self.preset = preset.to_string();
    }

    pub fn set_codec_family(&mut self, family: CodecFamily) {
        self.codec_family = family;
        self.rederive_codec();
    }

    pub fn set_hardware_accel(&mut self, hw: Option<HwAccel>) {
        self.hardware_accel = hw;
        self.rederive_codec();
    }

    fn rederive_codec(&mut self) {
        self.codec_id = VideoEncoder::from_parts(
            self.codec_family,
            EncoderVariant::select(self.hardware_accel),
        );
    }

    pub fn method(&self) -> EncodingMethod {
        self.method
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn codec_family(&self) -> CodecFamily {
        self.codec_family
    }

    pub fn preset(&self) -> &str {
        &self.preset
    }

    pub fn hardware_accel(&self) -> Option<HwAccel> {
        self.hardware_accel
    }

    pub fn codec_id(&self) -> VideoEncoder {
        self.codec_id
    }

    pub fn variant(&self) -> EncoderVariant {
        self.codec_id.variant()
    }

    /// One-line human summary, e.g. "H.265/HEVC (libx265), quality 23 - High Quality"
    pub fn describe(&self) -> String {
        let rate = match self.method {
            EncodingMethod::Quality => format!(
                "quality {} - {}",
                self.value,
                quality_description(self.value)
            ),
            EncodingMethod::Bitrate => format!(
                "{}x source bitrate - {}",
                self.value,
                bitrate_description(self.value)
            ),
        };
        format!(
            "{} ({}), {}, preset {}",
            self.codec_family.display_name(),
            self.codec_id,
            rate,
            self.preset
        )
    }
}

// NaN would slip through f64::clamp; treat it as the lower bound
fn clamp_or(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Concrete per-job encoder parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeParameters {
    pub hwaccel: Option<HwAccel>,
    /// ffmpeg output options without the leading dash, e.g. `c:v` -> `libx265`
    pub options: BTreeMap<String, String>,
}

impl EncodeParameters {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    /// Options rendered as ffmpeg arguments, in key order
    pub fn to_args(&self) -> Vec<String> {
        self.options
            .iter()
            .flat_map(|(k, v)| [format!("-{}", k), v.clone()])
            .collect()
    }
}
