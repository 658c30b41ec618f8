// Target resolution ceilings and aspect-preserving downscale planning

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::JobError;

/// Pixel dimensions of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The larger of width and height
    pub fn long_edge(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Supported maximum-size presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreset {
    #[serde(alias = "720p")]
    Hd,
    #[default]
    #[serde(alias = "1080p")]
    Fhd,
    #[serde(alias = "1440p")]
    Qhd,
    #[serde(alias = "2160p", alias = "4k")]
    Uhd,
}

impl ResolutionPreset {
    pub const ALL: [ResolutionPreset; 4] = [Self::Hd, Self::Fhd, Self::Qhd, Self::Uhd];

    pub fn dimensions(&self) -> Resolution {
        match self {
            Self::Hd => Resolution::new(1280, 720),
            Self::Fhd => Resolution::new(1920, 1080),
            Self::Qhd => Resolution::new(2560, 1440),
            Self::Uhd => Resolution::new(3840, 2160),
        }
    }

    pub fn long_edge(&self) -> u32 {
        self.dimensions().long_edge()
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Hd => "HD (720p) - 1280x720",
            Self::Fhd => "Full HD (1080p) - 1920x1080",
            Self::Qhd => "Quad HD (1440p) - 2560x1440",
            Self::Uhd => "Ultra HD (4K) - 3840x2160",
        }
    }

    /// Parse a preset from user input ("1080p", "fhd", "4k", ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "720" | "720p" | "hd" => Some(Self::Hd),
            "1080" | "1080p" | "fhd" => Some(Self::Fhd),
            "1440" | "1440p" | "qhd" => Some(Self::Qhd),
            "2160" | "2160p" | "4k" | "uhd" => Some(Self::Uhd),
            _ => None,
        }
    }
}

/// Outcome of planning a resize for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalePlan {
    pub source: Resolution,
    pub target: Resolution,
    pub needs_resize: bool,
}

impl ScalePlan {
    /// ffmpeg scale filter, present only when the source is downscaled
    pub fn scale_filter(&self) -> Option<String> {
        self.needs_resize
            .then(|| format!("scale={}:{}", self.target.width, self.target.height))
    }

    pub fn scale_factor(&self) -> f64 {
        if self.needs_resize && self.source.long_edge() > 0 {
            self.target.long_edge() as f64 / self.source.long_edge() as f64
        } else {
            1.0
        }
    }
}

/// Maximum long-edge policy applied to every job in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionPolicy {
    preset: ResolutionPreset,
}

impl ResolutionPolicy {
    pub fn new(preset: ResolutionPreset) -> Self {
        Self { preset }
    }

    pub fn preset(&self) -> ResolutionPreset {
        self.preset
    }

    pub fn max_long_edge(&self) -> u32 {
        self.preset.long_edge()
    }

    pub fn needs_resize(&self, source: Resolution) -> bool {
        source.long_edge() > self.max_long_edge()
    }

    /// Target dimensions for `source`. Both edges are floored after scaling and
    /// then forced even, since H.264/H.265 reject odd dimensions.
    pub fn target_for(&self, source: Resolution) -> Resolution {
        if !self.needs_resize(source) {
            return source;
        }

        // floor(edge * max / long) in integer space; f64 can land a hair under
        let max = self.max_long_edge() as u64;
        let long = source.long_edge() as u64;
        let width = (source.width as u64 * max / long) as u32;
        let height = (source.height as u64 * max / long) as u32;

        Resolution::new(width - width % 2, height - height % 2)
    }

    /// Plan the resize for a probed source. Unknown dimensions are a probe
    /// failure; they are never defaulted.
    pub fn plan(&self, source: Option<Resolution>) -> Result<ScalePlan, JobError> {
        let source = source
            .filter(|r| r.width > 0 && r.height > 0)
            .ok_or_else(|| JobError::Probe("could not determine video resolution".to_string()))?;

        Ok(ScalePlan {
            source,
            target: self.target_for(source),
            needs_resize: self.needs_resize(source),
        })
    }
}
