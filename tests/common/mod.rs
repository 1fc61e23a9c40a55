//! Shared test harness for integration tests.
//!
//! Provides [`FakeFfmpeg`], a shell script installed in a temp directory that
//! answers `-version`, prints an ffmpeg-like banner and frame counters on
//! stderr, and records every conversion it was asked to run. Its behavior is
//! picked by the input file name:
//!
//! - `*slow*` prints the banner and then sleeps until killed
//! - `*fail*` prints the banner and exits with status 1
//! - anything else reports 4 frame updates over 100 frames and exits 0

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ffqueue::converter::{DispatcherSettings, JobEvent, JobEventKind};
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(15);

const SCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "ffmpeg version 6.1-fake Copyright (c) 2000-2023 the FFmpeg developers"
    exit 0
fi
input="$2"
echo "$input" >> "$(dirname "$0")/runs.log"
printf "Input #0, matroska,webm, from '%s':\n" "$input" >&2
printf "  Duration: 00:00:04.00, start: 0.000000, bitrate: 1000 kb/s\n" >&2
printf "    Stream #0:0: Video: h264, yuv420p, 1920x1080, 25 fps, 25 tbr, 1k tbn\n" >&2
case "$(basename "$input")" in
    *slow*) exec sleep 30 ;;
    *fail*) exit 1 ;;
esac
for frame in 25 50 75 100; do
    printf 'frame=%5d fps=0.0 q=0.0 size=0kB\r' "$frame" >&2
    sleep 0.05
done
exit 0
"#;

/// A stand-in for the ffmpeg binary.
pub struct FakeFfmpeg {
    dir: TempDir,
    path: PathBuf,
}

impl FakeFfmpeg {
    pub fn install() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("ffmpeg");
        let fake = Self { dir, path };
        fake.write_script();
        fake
    }

    /// (Re)write the script, e.g. after a test removed it.
    pub fn write_script(&self) {
        fs::write(&self.path, SCRIPT).expect("failed to write fake ffmpeg");
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o755))
            .expect("failed to make fake ffmpeg executable");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Input paths of every conversion started so far, in start order.
    pub fn runs(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("runs.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Settings with short intervals pointing at this binary.
    pub fn settings(&self, max_concurrency: usize) -> DispatcherSettings {
        DispatcherSettings {
            max_concurrency,
            poll_interval: Duration::from_millis(50),
            drain_interval: Duration::from_millis(20),
            ffmpeg_path: Some(self.path.clone()),
            show_progress: false,
        }
    }
}

/// Receive events until `count` jobs have finished.
pub async fn collect_until_finished(
    rx: &mut broadcast::Receiver<JobEvent>,
    count: usize,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let mut finished = 0;
    tokio::time::timeout(TIMEOUT, async {
        while finished < count {
            let event = rx.recv().await.expect("event stream closed");
            if matches!(event.kind, JobEventKind::Finished { .. }) {
                finished += 1;
            }
            events.push(event);
        }
    })
    .await
    .expect("timed out waiting for jobs to finish");
    events
}

/// Receive events until one matches `pred`.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<JobEvent>, mut pred: F) -> JobEvent
where
    F: FnMut(&JobEvent) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
