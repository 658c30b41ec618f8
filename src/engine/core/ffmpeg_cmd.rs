use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::engine::params::EncodeParameters;

/// Full ffmpeg argument list for one encode, program name excluded.
///
/// Layout: `-hide_banner [-hwaccel X] -i <input> -<key> <value>... -y -nostdin
/// -progress pipe:2 -nostats <output>`. Options come out in key order, so the
/// same parameters always give the same command.
pub fn encode_args(input: &Path, output: &Path, params: &EncodeParameters) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into()];

    // Decoder acceleration is an input option and must precede -i
    if let Some(hw) = params.hwaccel {
        args.push("-hwaccel".into());
        args.push(hw.ffmpeg_hwaccel().into());
    }

    args.push("-i".into());
    args.push(input.as_os_str().to_owned());

    args.extend(params.to_args().into_iter().map(OsString::from));

    for flag in ["-y", "-nostdin", "-progress", "pipe:2", "-nostats"] {
        args.push(flag.into());
    }
    args.push(output.as_os_str().to_owned());
    args
}

/// Build the encode command with stdin/stdout closed and stderr piped for progress
pub fn build_encode_cmd(
    ffmpeg: &str,
    input: &Path,
    output: &Path,
    params: &EncodeParameters,
) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(encode_args(input, output, params))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    cmd
}

/// Format the encode command as a shell-safe string for display
pub fn format_ffmpeg_cmd(
    ffmpeg: &str,
    input: &Path,
    output: &Path,
    params: &EncodeParameters,
) -> String {
    let words: Vec<String> = std::iter::once(ffmpeg.to_string())
        .chain(
            encode_args(input, output, params)
                .iter()
                .map(|a| a.to_string_lossy().to_string()),
        )
        .collect();

    // try_join only fails on interior NUL bytes
    shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
}
