/// Encoding parameter builder.
///
/// Turns the batch-wide `EncodingPolicy`, a per-job `ScalePlan`, and the
/// source bitrate into the concrete option bag passed to ffmpeg. Pure: no I/O,
/// no hardware queries, same inputs give the same bag.
pub mod tuning;
pub mod types;

pub use tuning::tuning_for;
pub use types::{
    BitratePreset, EncodeParameters, EncodingMethod, EncodingPolicy, MULTIPLIER_MAX,
    MULTIPLIER_MIN, QUALITY_MAX, QUALITY_MIN, QualityPreset, bitrate_description,
    quality_description,
};

use crate::engine::error::JobError;
use crate::engine::hardware::{CodecFamily, EncoderVariant};
use crate::engine::resolution::ScalePlan;

/// Build the parameter bag for one job
pub fn build_params(
    policy: &EncodingPolicy,
    plan: &ScalePlan,
    source_bitrate: Option<u64>,
) -> Result<EncodeParameters, JobError> {
    let encoder = policy.codec_id();
    let variant = encoder.variant();

    let mut params = EncodeParameters {
        hwaccel: policy.hardware_accel(),
        ..Default::default()
    };

    params.set("c:v", encoder.ffmpeg_name());
    params.set(
        "profile:v",
        match policy.codec_family() {
            CodecFamily::H264 => "high",
            CodecFamily::H265 => "main",
        },
    );

    // AMF and QSV take no -preset
    if matches!(
        variant,
        EncoderVariant::Software | EncoderVariant::NvidiaNvenc
    ) {
        params.set("preset", policy.preset());
    }

    match policy.method() {
        EncodingMethod::Quality => {
            let q = (policy.value().round() as i64).to_string();
            match variant {
                EncoderVariant::Software => params.set("crf", q),
                EncoderVariant::NvidiaNvenc => {
                    params.set("rc", "constqp");
                    params.set("qp", q);
                }
                EncoderVariant::AmdAmf => {
                    params.set("rc", "cqp");
                    params.set("qp_i", q.clone());
                    params.set("qp_p", q);
                }
                EncoderVariant::IntelQsv => params.set("global_quality", q),
            }
        }
        EncodingMethod::Bitrate => {
            let source = source_bitrate.ok_or_else(|| {
                JobError::Configuration(
                    "bitrate required for bitrate-based encoding, but the source bitrate is unknown"
                        .to_string(),
                )
            })?;
            let target = target_bitrate(source, policy.value());
            params.set("b:v", target.to_string());
            match variant {
                EncoderVariant::NvidiaNvenc => params.set("rc", "vbr"),
                EncoderVariant::AmdAmf => params.set("rc", "vbr_peak"),
                EncoderVariant::Software | EncoderVariant::IntelQsv => {}
            }
        }
    }

    if let Some(filter) = plan.scale_filter() {
        params.set("vf", filter);
    }

    for (key, value) in tuning_for(encoder) {
        params.set(*key, *value);
    }

    Ok(params)
}

/// `round(source * multiplier)` in bits per second
pub fn target_bitrate(source_bitrate: u64, multiplier: f64) -> u64 {
    (source_bitrate as f64 * multiplier).round() as u64
}
