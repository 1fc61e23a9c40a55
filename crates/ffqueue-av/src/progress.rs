//! Progress estimation from ffmpeg's diagnostic output.
//!
//! ffmpeg does not report a percentage. It prints the input duration and frame
//! rate in its banner and then a running `frame=` counter, so the estimator
//! derives an approximate total frame count from the banner and divides.
//!
//! The estimator is fed one whitespace-delimited token at a time:
//!
//! ```text
//! Input #0, matroska,webm, from 'in.mkv':
//!   Duration: 00:01:00.00, start: 0.000000, bitrate: 1205 kb/s
//!     Stream #0:0: Video: h264, yuv420p, 1920x1080, 25 fps, 25 tbr
//! ...
//! frame=  250 fps= 75 q=28.0 size=    1024kB time=00:00:10.00
//! ```
//!
//! The frame rate precedes its unit label, so the token before `fps,` is kept
//! in a one-token buffer until the label shows up.
//!
//! # Example
//!
//! ```
//! use ffqueue_av::ProgressEstimator;
//!
//! let mut estimator = ProgressEstimator::new();
//! let banner = "Input #0 Duration: 00:00:10.00, start: 0.0 Video: h264, 25 fps, 25 tbr";
//! for token in banner.split_whitespace() {
//!     assert!(estimator.feed(token).is_none());
//! }
//! assert_eq!(estimator.total_frames(), Some(250));
//!
//! let progress = estimator.feed("frame=125").unwrap();
//! assert_eq!(progress.percent, 50);
//! ```

use crate::{Error, Result};
use std::path::Path;
use std::time::Duration;

/// Banner word that opens the input section.
pub const INPUT_MARKER: &str = "Input";
/// Label preceding the media duration.
pub const DURATION_MARKER: &str = "Duration:";
/// Unit label following the frame rate value.
pub const FPS_MARKER: &str = "fps,";
/// Label of the running frame counter.
pub const FRAME_MARKER: &str = "frame=";

/// One progress sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Frame number reported by ffmpeg.
    pub frame: u64,
    /// Estimated total frame count.
    pub total_frames: u64,
    /// Percentage complete, never above 100.
    pub percent: u64,
}

impl Progress {
    /// Operator-facing status line for the given input.
    pub fn line(&self, input: &Path) -> String {
        format!(
            "Converting {}: {}% done ({} frame of {})",
            input.display(),
            self.percent,
            self.frame,
            self.total_frames
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    SeekingInput,
    SeekingDurationLabel,
    CapturingDuration,
    SeekingFps { duration: String },
    Tracking { total_frames: u64, awaiting_frame: bool },
    Disabled,
}

/// Token-driven, one-way state machine turning diagnostic output into
/// [`Progress`] samples.
///
/// Once the total frame count is known the banner state is never consulted
/// again. If the duration or frame rate cannot be parsed the estimator
/// disables itself for good and every further token is ignored.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    phase: Phase,
    previous: Option<String>,
    duration: Option<Duration>,
    fps: Option<f64>,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self {
            phase: Phase::SeekingInput,
            previous: None,
            duration: None,
            fps: None,
        }
    }

    /// Consume one token, returning a sample when a frame counter was read.
    pub fn feed(&mut self, token: &str) -> Option<Progress> {
        if token.is_empty() {
            return None;
        }

        match self.phase {
            Phase::Disabled => None,
            Phase::Tracking {
                total_frames,
                ref mut awaiting_frame,
            } => track_frame(token, total_frames, awaiting_frame),
            _ => {
                self.scan_banner(token);
                None
            }
        }
    }

    /// Estimated total frame count, once known.
    pub fn total_frames(&self) -> Option<u64> {
        match self.phase {
            Phase::Tracking { total_frames, .. } => Some(total_frames),
            _ => None,
        }
    }

    /// Whether parsing failed and progress reporting is off for good.
    pub fn is_disabled(&self) -> bool {
        self.phase == Phase::Disabled
    }

    /// Parsed media duration, once known.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Parsed frame rate, once known.
    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn scan_banner(&mut self, token: &str) {
        let phase = std::mem::replace(&mut self.phase, Phase::Disabled);
        self.phase = match phase {
            Phase::SeekingInput if token == INPUT_MARKER => Phase::SeekingDurationLabel,
            Phase::SeekingDurationLabel if token == DURATION_MARKER => Phase::CapturingDuration,
            Phase::CapturingDuration => {
                #[cfg(feature = "tracing")]
                tracing::debug!("File duration: {}", token);
                Phase::SeekingFps {
                    duration: token.to_string(),
                }
            }
            Phase::SeekingFps { duration } if token == FPS_MARKER => self.estimate_total(&duration),
            other => {
                self.previous = Some(token.to_string());
                other
            }
        };
    }

    fn estimate_total(&mut self, duration_text: &str) -> Phase {
        let duration = match parse_duration(duration_text) {
            Ok(d) => d,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("{}; no progress output will be produced", _e);
                return Phase::Disabled;
            }
        };

        let fps_text = self.previous.take().unwrap_or_default();
        let fps = match parse_fps(&fps_text) {
            Ok(fps) => fps,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("{}; no progress output will be produced", _e);
                return Phase::Disabled;
            }
        };

        // Approximate: a reported 29.97 fps may really be 29.9718...
        let total_frames = (duration.as_secs_f64() * fps).floor() as u64;
        if total_frames == 0 {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Estimated zero frames for {:?} at {} fps; no progress output will be produced",
                duration,
                fps
            );
            return Phase::Disabled;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            fps,
            seconds = duration.as_secs_f64(),
            total_frames,
            "Total frames calculated"
        );

        self.duration = Some(duration);
        self.fps = Some(fps);
        Phase::Tracking {
            total_frames,
            awaiting_frame: false,
        }
    }
}

fn track_frame(token: &str, total_frames: u64, awaiting_frame: &mut bool) -> Option<Progress> {
    let value = match token.split_once(FRAME_MARKER) {
        // `frame=` with the number in the following token.
        Some((_, "")) => {
            *awaiting_frame = true;
            return None;
        }
        Some((_, value)) => value,
        None if *awaiting_frame => token,
        None => return None,
    };
    *awaiting_frame = false;

    let frame: u64 = match value.parse() {
        Ok(frame) => frame,
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Failed to parse current frame {:?}: {}", value, _e);
            return None;
        }
    };

    let percent = (frame.saturating_mul(100) / total_frames).min(100);
    Some(Progress {
        frame,
        total_frames,
        percent,
    })
}

/// Parse an ffmpeg banner duration such as `01:23:45.67,`.
///
/// A trailing comma is ignored. Hours, minutes and seconds are decimal
/// integers, and the optional part after `.` is a whole number of
/// milliseconds, so `00:00:10.50` is ten seconds and fifty milliseconds.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let trimmed = text.strip_suffix(',').unwrap_or(text);
    let invalid = || Error::parse_error("duration", format!("{text:?} is not HH:MM:SS.ff"));

    let mut parts = trimmed.splitn(3, ':');
    let (Some(hours), Some(minutes), Some(rest)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    let (seconds, fraction) = match rest.split_once('.') {
        Some((seconds, fraction)) => (seconds, Some(fraction)),
        None => (rest, None),
    };

    let is_number = |v: &str| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit());
    if !is_number(hours) || !is_number(minutes) || !is_number(seconds) {
        return Err(invalid());
    }
    if fraction.is_some_and(|f| !is_number(f)) {
        return Err(invalid());
    }

    let hours: u64 = hours.parse().map_err(|_| invalid())?;
    let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
    let seconds: u64 = seconds.parse().map_err(|_| invalid())?;
    let whole = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes.checked_mul(60)?))
        .and_then(|hm| hm.checked_add(seconds))
        .ok_or_else(invalid)?;
    let millis: u64 = match fraction {
        Some(f) => f.parse().map_err(|_| invalid())?,
        None => 0,
    };

    Duration::from_secs(whole)
        .checked_add(Duration::from_millis(millis))
        .ok_or_else(invalid)
}

fn parse_fps(text: &str) -> Result<f64> {
    match text.parse::<f64>() {
        Ok(fps) if fps.is_finite() && fps > 0.0 => Ok(fps),
        _ => Err(Error::parse_error(
            "frame rate",
            format!("{text:?} is not a positive number"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &str = "ffmpeg version 6.1 Copyright (c) 2000-2023 \
        Input #0, matroska,webm, from '/media/in.mkv': \
        Metadata: ENCODER : Lavf60.3.100 \
        Duration: 00:01:00.00, start: 0.000000, bitrate: 1205 kb/s \
        Stream #0:0: Video: h264 (High), yuv420p(progressive), 1920x1080, 25 fps, 25 tbr, 1k tbn \
        Stream #0:1: Audio: aac (LC), 48000 Hz, stereo, fltp";

    fn fed(banner: &str) -> ProgressEstimator {
        let mut estimator = ProgressEstimator::new();
        for token in banner.split_whitespace() {
            assert!(estimator.feed(token).is_none());
        }
        estimator
    }

    #[test]
    fn test_banner_yields_total_frames() {
        let estimator = fed(BANNER);
        assert_eq!(estimator.total_frames(), Some(1500));
        assert_eq!(estimator.duration(), Some(Duration::from_secs(60)));
        assert_eq!(estimator.fps(), Some(25.0));
        assert!(!estimator.is_disabled());
    }

    #[test]
    fn test_percentages_are_monotonic_and_capped() {
        let mut estimator = fed(BANNER);
        let mut last = 0;
        let mut samples = Vec::new();
        for frame in (25..=1500).step_by(25) {
            let progress = estimator.feed(&format!("frame={frame}")).unwrap();
            assert!(progress.percent >= last);
            assert!(progress.percent <= 100);
            last = progress.percent;
            samples.push(progress.percent);
        }
        assert_eq!(samples.first(), Some(&1));
        assert_eq!(samples.last(), Some(&100));
    }

    #[test]
    fn test_frame_value_in_following_token() {
        let mut estimator = fed(BANNER);
        assert!(estimator.feed("frame=").is_none());
        let progress = estimator.feed("750").unwrap();
        assert_eq!(
            progress,
            Progress {
                frame: 750,
                total_frames: 1500,
                percent: 50
            }
        );
        // The number was consumed; a bare number afterwards is ignored.
        assert!(estimator.feed("900").is_none());
    }

    #[test]
    fn test_overshoot_is_clamped() {
        let mut estimator = fed(BANNER);
        let progress = estimator.feed("frame=1612").unwrap();
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.frame, 1612);
    }

    #[test]
    fn test_bad_frame_value_skips_one_update() {
        let mut estimator = fed(BANNER);
        assert!(estimator.feed("frame=").is_none());
        assert!(estimator.feed("N/A").is_none());
        assert!(estimator.feed("frame=abc").is_none());
        assert_eq!(estimator.feed("frame=300").unwrap().percent, 20);
    }

    #[test]
    fn test_malformed_duration_disables_estimator() {
        let banner = BANNER.replace("00:01:00.00,", "garbage");
        let mut estimator = fed(&banner);
        assert!(estimator.is_disabled());
        assert_eq!(estimator.total_frames(), None);
        assert!(estimator.feed("frame=25").is_none());
        assert!(estimator.feed("frame=").is_none());
        assert!(estimator.feed("50").is_none());
    }

    #[test]
    fn test_unparseable_fps_disables_estimator() {
        let banner = BANNER.replace("25 fps,", "many fps,");
        let mut estimator = fed(&banner);
        assert!(estimator.is_disabled());
        assert!(estimator.feed("frame=25").is_none());
    }

    #[test]
    fn test_zero_duration_disables_estimator() {
        let banner = BANNER.replace("00:01:00.00,", "00:00:00.00,");
        assert!(fed(&banner).is_disabled());
    }

    #[test]
    fn test_frames_before_banner_are_ignored() {
        let mut estimator = ProgressEstimator::new();
        assert!(estimator.feed("frame=100").is_none());
        assert!(estimator.feed("frame=").is_none());
        assert!(estimator.feed("100").is_none());
        assert_eq!(estimator.total_frames(), None);
        assert!(!estimator.is_disabled());
    }

    #[test]
    fn test_duration_label_requires_input_section() {
        let mut estimator = ProgressEstimator::new();
        for token in "Duration: 00:01:00.00, 25 fps,".split_whitespace() {
            estimator.feed(token);
        }
        assert_eq!(estimator.total_frames(), None);
    }

    #[test]
    fn test_fractional_fps_floors_total() {
        let banner = "Input #0 Duration: 00:00:10.00, Video: 29.97 fps, 29.97 tbr";
        let estimator = fed(banner);
        assert_eq!(estimator.total_frames(), Some(299));
    }

    #[test]
    fn test_output_section_fps_does_not_reset() {
        let mut estimator = fed(BANNER);
        for token in "Output #0, mp4, to '/out.mp4': Stream #0:0: Video: h264, 50 fps,".split_whitespace() {
            estimator.feed(token);
        }
        assert_eq!(estimator.total_frames(), Some(1500));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("00:01:00.00,").unwrap(), Duration::from_secs(60));
        assert_eq!(
            parse_duration("01:02:03.5").unwrap(),
            Duration::from_millis(3_723_005)
        );
        assert_eq!(parse_duration("00:00:07").unwrap(), Duration::from_secs(7));
        assert_eq!(
            parse_duration("00:00:00.1234").unwrap(),
            Duration::from_millis(1_234)
        );
    }

    #[test]
    fn test_parse_duration_fraction_is_milliseconds() {
        assert_eq!(
            parse_duration("00:00:10.50,").unwrap(),
            Duration::from_millis(10_050)
        );
        assert_eq!(
            parse_duration("00:00:10.050,").unwrap(),
            Duration::from_millis(10_050)
        );
    }

    #[test]
    fn test_millisecond_fraction_drives_total_frames() {
        let estimator = fed("Input #0, from 'a.mkv': Duration: 00:00:10.50, start: 0.0 25 fps");
        assert_eq!(estimator.duration(), Some(Duration::from_millis(10_050)));
        assert_eq!(estimator.total_frames(), Some(251));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for text in ["garbage", "N/A,", "00:01", "00:01:xx.00", "00:01:00.", ":01:00.00", "-1:00:00"] {
            assert!(
                matches!(parse_duration(text), Err(Error::ParseError { .. })),
                "{text} should not parse"
            );
        }
    }

    #[test]
    fn test_progress_line() {
        let progress = Progress {
            frame: 750,
            total_frames: 1500,
            percent: 50,
        };
        assert_eq!(
            progress.line(Path::new("/media/in.mkv")),
            "Converting /media/in.mkv: 50% done (750 frame of 1500)"
        );
    }
}
