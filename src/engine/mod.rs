// Encoding orchestration engine - independent of the CLI

pub mod batch;
pub mod cancel;
pub mod core;
pub mod error;
pub mod hardware;
pub mod params;
pub mod probe;
pub mod resolution;
pub mod sink;

pub use batch::{BatchCoordinator, CleanupReport, MIN_VALID_OUTPUT_BYTES, cleanup};
pub use cancel::{CancelFlag, CancellationSource, KeyCancelListener};
pub use self::core::*;
pub use error::{ErrorKind, JobError};
pub use hardware::{
    CapabilityEntry, CapabilityReport, CodecFamily, EncoderVariant, GpuVendor, HardwareChoice,
    HardwareResolution, HwAccel, Recommendation, VideoEncoder,
};
pub use params::{
    BitratePreset, EncodeParameters, EncodingMethod, EncodingPolicy, QualityPreset, build_params,
};
pub use probe::{
    DEFAULT_PROBE_TIMEOUT, FfprobeProber, MediaInfo, SourceProber, parse_media_info,
    probe_with_retry,
};
pub use resolution::{Resolution, ResolutionPolicy, ResolutionPreset, ScalePlan};
pub use sink::{NullSink, ProgressSink};
