//! Hardware encoder detection and selection (NVENC, AMF, Quick Sync)
//!
//! The capability report is a snapshot taken once at startup. Encoding never
//! queries hardware itself; it only consumes the `HwAccel` chosen from the
//! report (or from explicit configuration).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;
use std::sync::OnceLock;
use sysinfo::System;
use tracing::{debug, info, warn};

// ============================================================================
// Encoder identity
// ============================================================================

/// Codec family of the produced stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    #[serde(alias = "avc", alias = "h.264")]
    H264,
    #[default]
    #[serde(alias = "hevc", alias = "h.265")]
    H265,
}

impl CodecFamily {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::H264 => "H.264/AVC",
            Self::H265 => "H.265/HEVC",
        }
    }
}

/// Hardware acceleration path explicitly opted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    Nvenc,
    Amf,
    Qsv,
}

impl HwAccel {
    /// Value passed to ffmpeg's `-hwaccel` flag
    pub fn ffmpeg_hwaccel(&self) -> &'static str {
        match self {
            Self::Nvenc => "cuda",
            Self::Amf => "auto",
            Self::Qsv => "qsv",
        }
    }

    pub fn vendor(&self) -> GpuVendor {
        match self {
            Self::Nvenc => GpuVendor::Nvidia,
            Self::Amf => GpuVendor::Amd,
            Self::Qsv => GpuVendor::Intel,
        }
    }

    /// Accepts the vendor name, the API name, or the ffmpeg hwaccel token
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "nvenc" | "cuda" | "nvidia" => Some(Self::Nvenc),
            "amf" | "vce" | "amd" => Some(Self::Amf),
            "qsv" | "quicksync" | "intel" => Some(Self::Qsv),
            _ => None,
        }
    }
}

/// Encoder back-end, selected once from the configured `HwAccel`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderVariant {
    Software,
    NvidiaNvenc,
    AmdAmf,
    IntelQsv,
}

impl EncoderVariant {
    /// Hardware use is opt-in: no accel configured means software, whatever
    /// the capability report suggests.
    pub fn select(hw_accel: Option<HwAccel>) -> Self {
        match hw_accel {
            None => Self::Software,
            Some(HwAccel::Nvenc) => Self::NvidiaNvenc,
            Some(HwAccel::Amf) => Self::AmdAmf,
            Some(HwAccel::Qsv) => Self::IntelQsv,
        }
    }
}

/// Concrete ffmpeg video encoders this tool can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoEncoder {
    Libx264,
    Libx265,
    H264Nvenc,
    HevcNvenc,
    H264Amf,
    HevcAmf,
    H264Qsv,
    HevcQsv,
}

impl VideoEncoder {
    pub const ALL: [VideoEncoder; 8] = [
        Self::Libx264,
        Self::Libx265,
        Self::H264Nvenc,
        Self::HevcNvenc,
        Self::H264Amf,
        Self::HevcAmf,
        Self::H264Qsv,
        Self::HevcQsv,
    ];

    pub fn from_parts(family: CodecFamily, variant: EncoderVariant) -> Self {
        match (family, variant) {
            (CodecFamily::H264, EncoderVariant::Software) => Self::Libx264,
            (CodecFamily::H265, EncoderVariant::Software) => Self::Libx265,
            (CodecFamily::H264, EncoderVariant::NvidiaNvenc) => Self::H264Nvenc,
            (CodecFamily::H265, EncoderVariant::NvidiaNvenc) => Self::HevcNvenc,
            (CodecFamily::H264, EncoderVariant::AmdAmf) => Self::H264Amf,
            (CodecFamily::H265, EncoderVariant::AmdAmf) => Self::HevcAmf,
            (CodecFamily::H264, EncoderVariant::IntelQsv) => Self::H264Qsv,
            (CodecFamily::H265, EncoderVariant::IntelQsv) => Self::HevcQsv,
        }
    }

    /// Get the FFmpeg encoder name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::Libx265 => "libx265",
            Self::H264Nvenc => "h264_nvenc",
            Self::HevcNvenc => "hevc_nvenc",
            Self::H264Amf => "h264_amf",
            Self::HevcAmf => "hevc_amf",
            Self::H264Qsv => "h264_qsv",
            Self::HevcQsv => "hevc_qsv",
        }
    }

    pub fn from_ffmpeg_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.ffmpeg_name() == name)
    }

    pub fn family(&self) -> CodecFamily {
        match self {
            Self::Libx264 | Self::H264Nvenc | Self::H264Amf | Self::H264Qsv => CodecFamily::H264,
            Self::Libx265 | Self::HevcNvenc | Self::HevcAmf | Self::HevcQsv => CodecFamily::H265,
        }
    }

    pub fn variant(&self) -> EncoderVariant {
        match self {
            Self::Libx264 | Self::Libx265 => EncoderVariant::Software,
            Self::H264Nvenc | Self::HevcNvenc => EncoderVariant::NvidiaNvenc,
            Self::H264Amf | Self::HevcAmf => EncoderVariant::AmdAmf,
            Self::H264Qsv | Self::HevcQsv => EncoderVariant::IntelQsv,
        }
    }

    /// Check if this is a hardware encoder
    pub fn is_hardware(&self) -> bool {
        self.variant() != EncoderVariant::Software
    }
}

impl fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

// ============================================================================
// Capability report
// ============================================================================

/// Detected GPU vendor for hardware encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GpuVendor {
    #[default]
    Unknown,
    Intel,
    Nvidia,
    Amd,
}

impl GpuVendor {
    /// Guess the vendor from a marketing name ("NVIDIA GeForce RTX 3080", ...)
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if ["nvidia", "geforce", "quadro", "tesla"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Self::Nvidia
        } else if ["amd", "radeon", "advanced micro devices"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Self::Amd
        } else if lower.contains("intel") {
            Self::Intel
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Intel => "Intel",
            Self::Nvidia => "NVIDIA",
            Self::Amd => "AMD",
        };
        f.write_str(name)
    }
}

/// One hardware encode path and whether it can be used on this machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityEntry {
    pub vendor: GpuVendor,
    pub encoder_id: String,
    pub usable: bool,
}

/// Suggested default encoder for this machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub hw_accel: Option<HwAccel>,
    pub encoder_id: String,
    pub description: String,
}

impl Default for Recommendation {
    fn default() -> Self {
        Self {
            hw_accel: None,
            encoder_id: VideoEncoder::Libx265.ffmpeg_name().to_string(),
            description: "Software encoding (CPU only)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapabilityReport {
    pub entries: Vec<CapabilityEntry>,
    pub recommended: Recommendation,
    /// GPU names found on the system
    pub gpus: Vec<String>,
    /// CPU brand string
    pub cpu: Option<String>,
}

/// User-facing hardware selection, resolved against the report at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareChoice {
    /// Software only
    #[default]
    None,
    /// Use the report's recommendation
    Auto,
    Nvenc,
    Amf,
    Qsv,
}

impl HardwareChoice {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "none" | "off" | "software" | "cpu" => Some(Self::None),
            "auto" => Some(Self::Auto),
            other => HwAccel::from_token(other).map(|hw| match hw {
                HwAccel::Nvenc => Self::Nvenc,
                HwAccel::Amf => Self::Amf,
                HwAccel::Qsv => Self::Qsv,
            }),
        }
    }

    fn explicit(&self) -> Option<HwAccel> {
        match self {
            Self::Nvenc => Some(HwAccel::Nvenc),
            Self::Amf => Some(HwAccel::Amf),
            Self::Qsv => Some(HwAccel::Qsv),
            Self::None | Self::Auto => None,
        }
    }
}

/// Outcome of resolving a `HardwareChoice`, including why software was used
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareResolution {
    pub hw_accel: Option<HwAccel>,
    pub warning: Option<String>,
}

impl CapabilityReport {
    /// Build a report from an `ffmpeg -encoders` listing and detected GPU names.
    /// Vendor priority for the recommendation is NVIDIA, then AMD, then Intel.
    pub fn from_parts(encoders_output: &str, gpus: Vec<String>, cpu: Option<String>) -> Self {
        let mut vendors: Vec<GpuVendor> = gpus.iter().map(|g| GpuVendor::from_name(g)).collect();

        // Quick Sync lives on the iGPU, which lspci may not list separately
        if cpu
            .as_deref()
            .is_some_and(|c| GpuVendor::from_name(c) == GpuVendor::Intel)
        {
            vendors.push(GpuVendor::Intel);
        }

        let mut entries = Vec::new();
        for encoder in VideoEncoder::ALL.iter().filter(|e| e.is_hardware()) {
            let vendor = match encoder.variant() {
                EncoderVariant::NvidiaNvenc => GpuVendor::Nvidia,
                EncoderVariant::AmdAmf => GpuVendor::Amd,
                EncoderVariant::IntelQsv => GpuVendor::Intel,
                EncoderVariant::Software => continue,
            };
            let usable = vendors.contains(&vendor) && encoders_output.contains(encoder.ffmpeg_name());
            entries.push(CapabilityEntry {
                vendor,
                encoder_id: encoder.ffmpeg_name().to_string(),
                usable,
            });
        }

        let gpu_named = |vendor: GpuVendor| {
            gpus.iter()
                .find(|g| GpuVendor::from_name(g) == vendor)
                .cloned()
                .or_else(|| cpu.clone())
                .unwrap_or_else(|| vendor.to_string())
        };

        let mut recommended = Recommendation::default();
        for (hw, encoder, label) in [
            (HwAccel::Nvenc, VideoEncoder::HevcNvenc, "NVIDIA NVENC"),
            (HwAccel::Amf, VideoEncoder::HevcAmf, "AMD AMF"),
            (HwAccel::Qsv, VideoEncoder::HevcQsv, "Intel QuickSync"),
        ] {
            let usable = entries
                .iter()
                .any(|e| e.encoder_id == encoder.ffmpeg_name() && e.usable);
            if usable {
                recommended = Recommendation {
                    hw_accel: Some(hw),
                    encoder_id: encoder.ffmpeg_name().to_string(),
                    description: format!("{} on {}", label, gpu_named(hw.vendor())),
                };
                break;
            }
        }

        Self {
            entries,
            recommended,
            gpus,
            cpu,
        }
    }

    /// Whether any encoder of this vendor family is usable
    pub fn is_usable(&self, hw: HwAccel) -> bool {
        self.entries
            .iter()
            .any(|e| e.vendor == hw.vendor() && e.usable)
    }

    pub fn any_usable(&self) -> bool {
        self.entries.iter().any(|e| e.usable)
    }

    /// Resolve the configured choice into the accel actually used.
    ///
    /// An explicit vendor that the report marks unusable falls back to
    /// software with a warning. `Auto` with no usable hardware is not a
    /// warning; it is the normal software path.
    pub fn resolve(&self, choice: HardwareChoice) -> HardwareResolution {
        match choice {
            HardwareChoice::None => HardwareResolution {
                hw_accel: None,
                warning: None,
            },
            HardwareChoice::Auto => {
                if self.recommended.hw_accel.is_none() {
                    info!("No usable hardware encoder detected, using software encoding");
                }
                HardwareResolution {
                    hw_accel: self.recommended.hw_accel,
                    warning: None,
                }
            }
            explicit => {
                let Some(hw) = explicit.explicit() else {
                    return HardwareResolution {
                        hw_accel: None,
                        warning: None,
                    };
                };
                if self.is_usable(hw) {
                    HardwareResolution {
                        hw_accel: Some(hw),
                        warning: None,
                    }
                } else {
                    let msg = format!(
                        "{} hardware encoding requested but not available on this machine; falling back to software",
                        hw.vendor()
                    );
                    warn!("{}", msg);
                    HardwareResolution {
                        hw_accel: None,
                        warning: Some(msg),
                    }
                }
            }
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

/// Cache for the output of `ffmpeg -encoders`.
static FFMPEG_ENCODERS_OUTPUT_CACHE: OnceLock<String> = OnceLock::new();

fn ffmpeg_encoders_output(ffmpeg: &str) -> &'static str {
    FFMPEG_ENCODERS_OUTPUT_CACHE.get_or_init(|| {
        Command::new(ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
            .unwrap_or_default()
    })
}

/// Detect NVIDIA GPU using nvidia-smi
pub fn detect_nvidia_gpu() -> Option<String> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let name = stdout.lines().next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Display adapters listed by lspci (Linux only; empty elsewhere)
fn detect_pci_gpus() -> Vec<String> {
    let Ok(output) = Command::new("lspci").output() else {
        return Vec::new();
    };
    parse_lspci_gpus(&String::from_utf8_lossy(&output.stdout))
}

/// Extract display controller names from `lspci` output
pub fn parse_lspci_gpus(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("vga compatible controller")
                || lower.contains("3d controller")
                || lower.contains("display controller")
        })
        .filter_map(|line| {
            // "00:02.0 VGA compatible controller: Intel Corporation ..." -> after first ": "
            line.split_once(": ").map(|(_, name)| name.trim().to_string())
        })
        .collect()
}

fn detect_cpu_brand() -> Option<String> {
    let mut sys = System::new();
    sys.refresh_cpu();
    sys.cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
}

/// Probe this machine and produce a capability report
pub fn detect(ffmpeg: &str) -> CapabilityReport {
    let mut gpus = Vec::new();
    if let Some(nvidia) = detect_nvidia_gpu() {
        gpus.push(nvidia);
    }
    for gpu in detect_pci_gpus() {
        // nvidia-smi already named it more precisely
        if !(GpuVendor::from_name(&gpu) == GpuVendor::Nvidia
            && gpus.iter().any(|g| GpuVendor::from_name(g) == GpuVendor::Nvidia))
        {
            gpus.push(gpu);
        }
    }

    let cpu = detect_cpu_brand();
    let report = CapabilityReport::from_parts(ffmpeg_encoders_output(ffmpeg), gpus, cpu);
    debug!(
        recommended = %report.recommended.encoder_id,
        gpus = report.gpus.len(),
        "hardware detection finished"
    );
    report
}
