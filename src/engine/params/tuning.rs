// Per-encoder tuning bundles, applied after the builder defaults

use crate::engine::hardware::{EncoderVariant, VideoEncoder};

const X265: &[(&str, &str)] = &[
    ("profile:v", "main"),
    ("level", "4.1"),
    ("x265-params", "aq-mode=3:aq-strength=0.8:deblock=1,1"),
];

const NVENC: &[(&str, &str)] = &[
    ("profile:v", "main"),
    ("level", "4.1"),
    ("b_ref_mode", "middle"),
    ("spatial_aq", "1"),
    ("temporal_aq", "1"),
];

const AMF: &[(&str, &str)] = &[
    ("profile:v", "main"),
    ("level", "4.1"),
    ("quality", "balanced"),
];

const QSV: &[(&str, &str)] = &[
    ("profile:v", "main"),
    ("level", "4.1"),
    ("look_ahead", "1"),
    ("look_ahead_depth", "40"),
];

/// Static tuning table lookup. libx264 has no bundle.
pub fn tuning_for(encoder: VideoEncoder) -> &'static [(&'static str, &'static str)] {
    match encoder.variant() {
        EncoderVariant::Software => match encoder {
            VideoEncoder::Libx265 => X265,
            _ => &[],
        },
        EncoderVariant::NvidiaNvenc => NVENC,
        EncoderVariant::AmdAmf => AMF,
        EncoderVariant::IntelQsv => QSV,
    }
}
