mod encode;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod log;
mod progress;
mod scan;
mod supervise;
mod types;

pub use encode::{EncodeEngine, EngineOptions};
pub use ffmpeg_cmd::{build_encode_cmd, encode_args, format_ffmpeg_cmd};
pub use ffmpeg_info::{ffmpeg_version, ffprobe_version};
pub use log::{DEFAULT_DEBUG_LOG, write_debug_log};
pub use progress::{
    Progress, ProgressTracker, RECOGNIZERS, Recognizer, Throttle, is_progress_key_line, recognize,
};
pub use scan::{
    Discovery, DiscoveryOptions, VIDEO_EXTENSIONS, discover, is_processed_output, is_video_file,
    scan,
};
pub use supervise::{
    Captured, ExitOutcome, SuperviseOptions, Supervised, failure_reason, pump_status_lines,
    run_captured, supervise, terminate,
};
pub use types::{
    DEFAULT_OUTPUT_SUFFIX, JobDescriptor, JobResult, JobState, compression_ratio, output_path_for,
};
