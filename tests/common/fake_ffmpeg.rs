#![allow(dead_code)]
#![cfg(unix)]

//! Shell scripts that stand in for ffmpeg. Each one receives the real
//! argument list; the output path is always the last argument.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Reports progress for a 10 second source, writes 4 KiB, exits 0.
/// Inputs whose path contains `FAILME` fail with an ffmpeg-style error.
pub const WRITES_OUTPUT: &str = r#"
case "$*" in
  *FAILME*)
    echo "Input #0, matroska, from 'in.mkv':" >&2
    echo "Error while opening encoder for output stream #0:0" >&2
    for last; do :; done
    echo partial > "$last"
    exit 1
    ;;
esac
for last; do :; done
printf 'frame=10\nout_time_us=2500000\nprogress=continue\n' >&2
printf 'out_time_us=5000000\nprogress=continue\n' >&2
dd if=/dev/zero of="$last" bs=1024 count=4 2>/dev/null
printf 'out_time_us=10000000\nprogress=end\n' >&2
exit 0
"#;

/// Three-job session: `job_1.*` encodes to 60 MiB, `job_2.*` to 120 MiB
/// (sparse files), `job_3.*` fails after writing a partial output.
pub const SIZED_OUTPUTS: &str = r#"
for last; do :; done
case "$*" in
  *job_3.*)
    echo "Error while decoding stream #0:0" >&2
    echo partial > "$last"
    exit 1
    ;;
  *job_1.*) mb=60 ;;
  *) mb=120 ;;
esac
printf 'out_time_us=5000000\nprogress=continue\n' >&2
dd if=/dev/zero of="$last" bs=1048576 count=0 seek=$mb 2>/dev/null
exit 0
"#;

/// Exits 0 but leaves an empty output file
pub const EMPTY_OUTPUT: &str = r#"
for last; do :; done
: > "$last"
exit 0
"#;

/// Never finishes on its own
pub const HANGS: &str = r#"
for last; do :; done
echo partial > "$last"
exec sleep 30
"#;

/// Refuses to run because the output would overwrite the input. Leaves a
/// `launched` marker next to itself.
pub const SAME_AS_INPUT: &str = r#"
touch "$(dirname "$0")/launched"
echo "Output same as Input #0 - exiting" >&2
exit 1
"#;

/// Stands in for ffprobe: prints a 1080p, 10 second stream as JSON
pub const PROBE_JSON: &str = r#"
printf '{"streams":[{"codec_type":"video","codec_name":"h264","width":1920,"height":1080,"bit_rate":"4000000"}],"format":{"duration":"10.0"}}'
exit 0
"#;

/// Stalls without producing output
pub const STALLS: &str = r#"
exec sleep 30
"#;

/// Write `body` as an executable script named `name` inside `dir`.
///
/// The script exits 0 when called without arguments; that call is used here
/// to wait out ETXTBSY from forks in concurrently running tests.
pub fn install(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!("#!/bin/sh\n[ $# -eq 0 ] && exit 0\n{}", body);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    for _ in 0..100 {
        match Command::new(&path).status() {
            Ok(_) => return path,
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("fake encoder {} is not runnable: {}", path.display(), e),
        }
    }
    panic!("fake encoder {} stayed busy", path.display());
}
