use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use ffbatch::engine::{CodecFamily, HardwareChoice, ResolutionPreset};

#[derive(Parser)]
#[command(name = "ffbatch", version)]
#[command(
    about = "Batch H.264/H.265 transcoder driving ffmpeg",
    long_about = "Walks a directory, re-encodes every video through ffmpeg with \
                  hardware-aware parameters, and cleans up after failures. \
                  Press 'q' during a run to stop after the current file."
)]
pub struct Cli {
    /// Root directory to scan for video files (defaults to current directory)
    #[arg(value_name = "DIRECTORY")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub encode: EncodeArgs,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug); FFBATCH_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CodecArg {
    H264,
    H265,
}

impl From<CodecArg> for CodecFamily {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::H264 => CodecFamily::H264,
            CodecArg::H265 => CodecFamily::H265,
        }
    }
}

/// Encoding overrides layered on top of the config file
#[derive(Args, Debug, Default, Clone)]
pub struct EncodeArgs {
    /// Output codec
    #[arg(long, value_enum)]
    pub codec: Option<CodecArg>,

    /// Constant quality value (0-51, lower is better)
    #[arg(long, conflicts_with_all = ["quality_preset", "vbr", "bitrate_preset"])]
    pub crf: Option<f64>,

    /// Named quality level: ultra_high, high, medium, low, very_low
    #[arg(long, conflicts_with_all = ["vbr", "bitrate_preset"])]
    pub quality_preset: Option<String>,

    /// Target bitrate as a multiple of the source bitrate (0.1-10)
    #[arg(long, conflicts_with = "bitrate_preset")]
    pub vbr: Option<f64>,

    /// Named bitrate level: highest, high, medium, low, lowest
    #[arg(long)]
    pub bitrate_preset: Option<String>,

    /// Maximum output resolution: 720p, 1080p, 1440p, 2160p
    #[arg(long, value_parser = parse_resolution)]
    pub max_res: Option<ResolutionPreset>,

    /// Encoder speed preset (e.g. medium, slow, p5)
    #[arg(long)]
    pub preset: Option<String>,

    /// Hardware encoder: none, auto, nvenc, amf, qsv
    #[arg(long, value_parser = parse_hardware)]
    pub hwaccel: Option<HardwareChoice>,

    /// Only process files directly inside the directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Delete each source file after it encodes successfully
    #[arg(long)]
    pub delete_originals: bool,

    /// Remove failed and partial outputs after the batch without asking
    #[arg(long)]
    pub cleanup: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

fn parse_resolution(s: &str) -> Result<ResolutionPreset, String> {
    ResolutionPreset::from_name(s)
        .ok_or_else(|| format!("unknown resolution '{}' (use 720p, 1080p, 1440p or 2160p)", s))
}

fn parse_hardware(s: &str) -> Result<HardwareChoice, String> {
    HardwareChoice::from_name(s)
        .ok_or_else(|| format!("unknown hardware '{}' (use none, auto, nvenc, amf or qsv)", s))
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Show detected GPUs and usable hardware encoders
    Detect,

    /// Probe a video file and print its metadata
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Scan directory and list the files that would be encoded
    Scan {
        /// Directory to scan (defaults to current directory)
        directory: Option<PathBuf>,

        /// Only look directly inside the directory
        #[arg(long)]
        no_recursive: bool,
    },

    /// Show ffmpeg commands without executing (dry run)
    DryRun {
        /// Directory to scan (defaults to current directory)
        directory: Option<PathBuf>,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// List named quality, bitrate and resolution presets
    Presets,

    /// Show config status and location, or create default config if missing
    InitConfig {
        /// Overwrite an existing config with defaults
        #[arg(long)]
        force: bool,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
