pub mod fake_ffmpeg;
pub mod helpers;
