//! A single ffmpeg conversion.
//!
//! A job owns one child process. Two concurrent halves run while it lives:
//! the reader drains stderr token by token into a [`ProgressEstimator`], and
//! the supervisor waits for the process to exit or kills it once shutdown
//! is requested.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ffqueue_av::{conversion_args, Progress, ProgressEstimator, TokenReader, FFMPEG};
use ffqueue_common::{Error, JobId, JobOutcome, JobRequest, Result};
use tokio::process::{Child, ChildStderr, Command};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::events::{EventSender, JobEventKind};

/// Number of launched jobs that have not finished yet.
///
/// The launcher increments it before spawning a job, so a job counts as
/// running even before its task is first polled. Every increment is paired
/// with exactly one decrement through [`RunningGuard`], whichever way the
/// job ends.
#[derive(Debug, Clone, Default)]
pub struct RunningCounter(Arc<AtomicUsize>);

impl RunningCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more running job until the returned guard is dropped.
    pub fn enter(&self) -> RunningGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        RunningGuard(Arc::clone(&self.0))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decrements the [`RunningCounter`] it came from on drop.
#[derive(Debug)]
#[must_use = "the job stops counting as running when the guard is dropped"]
pub struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a job needs from the dispatcher that launched it.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub ffmpeg: Arc<Path>,
    pub running: RunningCounter,
    pub cancel: CancellationToken,
    pub events: EventSender,
    pub show_progress: bool,
}

/// A queued conversion request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub request: JobRequest,
    pub queued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: JobId::new(),
            request,
            queued_at: Utc::now(),
        }
    }

    /// Run the conversion to completion.
    ///
    /// `guard` is the running slot taken by the launcher; it is released
    /// before the `Finished` event is sent. Never fails: launch and
    /// supervision errors are logged and reported as [`JobOutcome::Failed`]
    /// so they stay contained to this job.
    pub async fn run(self, ctx: JobContext, guard: RunningGuard) -> JobOutcome {
        let span = tracing::info_span!("job", job_id = %self.id);
        async move {
            let waited_ms = (Utc::now() - self.queued_at).num_milliseconds();
            tracing::info!(
                name = %self.request.display_name(),
                input = %self.request.input_file.display(),
                output = %self.request.output_file.display(),
                waited_ms,
                "Starting conversion"
            );
            ctx.events.emit(self.id, JobEventKind::Started);

            let outcome = match self.convert(&ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Conversion could not run: {}", e);
                    JobOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            drop(guard);

            if outcome.is_success() {
                tracing::info!(%outcome, "Conversion finished");
            } else {
                tracing::warn!(%outcome, "Conversion did not complete");
            }
            ctx.events.emit(
                self.id,
                JobEventKind::Finished {
                    outcome: outcome.clone(),
                },
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn convert(&self, ctx: &JobContext) -> Result<JobOutcome> {
        if ctx.cancel.is_cancelled() {
            tracing::info!("Shutdown already requested, not starting ffmpeg");
            return Ok(JobOutcome::Killed);
        }

        let args = conversion_args(&self.request.input_file, &self.request.output_file);
        let mut child = Command::new(&*ctx.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(FFMPEG, format!("failed to start: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::internal("ffmpeg stderr was not captured"))?;
        tracing::debug!(pid = ?child.id(), "ffmpeg started");

        let mut estimator = ProgressEstimator::new();
        let (_, outcome) = tokio::join!(
            self.read_output(stderr, &mut estimator, ctx),
            supervise(&mut child, &ctx.cancel),
        );

        if estimator.is_disabled() {
            tracing::debug!("Progress reporting was disabled for this input");
        }
        outcome
    }

    /// Feed stderr tokens to the estimator until the stream closes or
    /// shutdown is requested.
    async fn read_output(
        &self,
        stderr: ChildStderr,
        estimator: &mut ProgressEstimator,
        ctx: &JobContext,
    ) {
        let mut tokens = TokenReader::new(stderr);
        let mut reported = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break,
                next = tokens.next_token() => next,
            };

            match next {
                Ok(Some(token)) => {
                    if let Some(progress) = estimator.feed(&token) {
                        self.report(progress, ctx);
                        reported = true;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read ffmpeg output: {}", e);
                    break;
                }
            }
        }
        if reported && ctx.show_progress {
            println!();
        }
        tracing::trace!("Stopped reading ffmpeg output");
    }

    fn report(&self, progress: Progress, ctx: &JobContext) {
        if ctx.show_progress {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "\r{}", progress.line(&self.request.input_file));
            let _ = stdout.flush();
        }
        ctx.events.emit(
            self.id,
            JobEventKind::Progress {
                frame: progress.frame,
                total_frames: progress.total_frames,
                percent: progress.percent,
            },
        );
    }
}

/// Wait for ffmpeg to exit, killing it first if shutdown is requested.
async fn supervise(child: &mut Child, cancel: &CancellationToken) -> Result<JobOutcome> {
    tokio::select! {
        status = child.wait() => {
            let status = status?;
            Ok(JobOutcome::Exited {
                code: status.code(),
                success: status.success(),
            })
        }
        _ = cancel.cancelled() => {
            tracing::info!("Shutdown requested, killing ffmpeg");
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill ffmpeg: {}", e);
            }
            Ok(JobOutcome::Killed)
        }
    }
}
