//! Fixed encoding profile for conversion jobs.
//!
//! Every job is converted to H.264 + AAC in an MP4 container. The settings
//! are not configurable.

use std::ffi::OsString;
use std::path::Path;

/// Video encoder passed to `-c:v`.
pub const VIDEO_CODEC: &str = "libx264";
/// Target video bitrate passed to `-b:v`.
pub const VIDEO_BITRATE: &str = "1000k";
/// Audio encoder passed to `-c:a`.
pub const AUDIO_CODEC: &str = "aac";
/// Output container passed to `-f`.
pub const CONTAINER: &str = "mp4";

/// Build the ffmpeg argument list for converting `input` into `output`.
///
/// The output file is overwritten if it already exists.
pub fn conversion_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(12);
    args.push("-i".into());
    args.push(input.as_os_str().to_os_string());
    args.extend(
        [
            "-c:v",
            VIDEO_CODEC,
            "-b:v",
            VIDEO_BITRATE,
            "-c:a",
            AUDIO_CODEC,
            "-f",
            CONTAINER,
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_os_string());
    args.push("-y".into());
    args
}
