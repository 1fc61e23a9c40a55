//! Bounded-concurrency job dispatcher.
//!
//! Requests are queued in FIFO order and launched by a control loop that
//! wakes once per poll interval. At most `max_concurrency` jobs are ever
//! running at the same time.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ffqueue_av::{ffmpeg_version, get_tool_path, FFMPEG};
use ffqueue_common::{Error, JobId, JobOutcome, JobRequest, Result};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::events::{EventSender, JobEvent, JobEventKind};
use super::job::{Job, JobContext, RunningCounter};
use crate::config::ConverterConfig;

/// Tuning for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Maximum number of simultaneously running conversions.
    pub max_concurrency: usize,
    /// How often the control loop looks for work.
    pub poll_interval: Duration,
    /// How often the drain phase re-checks the running count.
    pub drain_interval: Duration,
    /// Explicit ffmpeg binary, otherwise looked up on PATH.
    pub ffmpeg_path: Option<PathBuf>,
    /// Print a progress line to stdout while converting.
    pub show_progress: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            poll_interval: Duration::from_secs(1),
            drain_interval: Duration::from_millis(500),
            ffmpeg_path: None,
            show_progress: true,
        }
    }
}

impl From<&ConverterConfig> for DispatcherSettings {
    fn from(config: &ConverterConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            poll_interval: config.poll_interval(),
            drain_interval: config.drain_interval(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            show_progress: config.show_progress,
        }
    }
}

/// Lifecycle of the control loop.
enum Control {
    Idle,
    Running(JoinHandle<()>),
    /// Shutdown has begun; the first caller owns the join handle.
    Stopping,
}

struct Shared {
    settings: DispatcherSettings,
    queue: Mutex<VecDeque<Job>>,
    running: RunningCounter,
    cancel: CancellationToken,
    /// Fired once the control loop and every job it launched have stopped.
    stopped: CancellationToken,
    events: EventSender,
    control: Mutex<Control>,
}

impl Shared {
    /// Remove up to `n` jobs from the front of the queue in one step.
    fn take_batch(&self, n: usize) -> Vec<Job> {
        let mut queue = self.queue.lock();
        let n = n.min(queue.len());
        queue.drain(..n).collect()
    }
}

/// Handle to the converter. Cloning is cheap and every clone drives the
/// same queue.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("capacity", &self.capacity())
            .field("running", &self.running())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(mut settings: DispatcherSettings) -> Self {
        if settings.max_concurrency == 0 {
            tracing::warn!("max_concurrency must be at least 1, using 1");
            settings.max_concurrency = 1;
        }
        let defaults = DispatcherSettings::default();
        if settings.poll_interval.is_zero() {
            tracing::warn!("poll_interval cannot be zero, using {:?}", defaults.poll_interval);
            settings.poll_interval = defaults.poll_interval;
        }
        if settings.drain_interval.is_zero() {
            tracing::warn!("drain_interval cannot be zero, using {:?}", defaults.drain_interval);
            settings.drain_interval = defaults.drain_interval;
        }

        Self {
            shared: Arc::new(Shared {
                settings,
                queue: Mutex::new(VecDeque::new()),
                running: RunningCounter::new(),
                cancel: CancellationToken::new(),
                stopped: CancellationToken::new(),
                events: EventSender::default(),
                control: Mutex::new(Control::Idle),
            }),
        }
    }

    /// Append a request to the back of the queue.
    ///
    /// Safe to call from any thread, before or after [`start`](Self::start).
    pub fn add_task(&self, request: JobRequest) -> JobId {
        let job = Job::new(request);
        let id = job.id;
        let name = job.request.display_name();
        tracing::info!(
            job_id = %id,
            name = %name,
            input = %job.request.input_file.display(),
            "Task queued"
        );

        self.shared.queue.lock().push_back(job);
        self.shared.events.emit(id, JobEventKind::Queued { name });
        id
    }

    /// Verify ffmpeg and spawn the control loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if ffmpeg cannot be found or does not report a version, or if
    /// the dispatcher was already started or shut down.
    pub async fn start(&self) -> Result<()> {
        let settings = &self.shared.settings;
        tracing::info!(
            max_concurrency = settings.max_concurrency,
            "Starting converter"
        );

        let ffmpeg = get_tool_path(FFMPEG, settings.ffmpeg_path.as_deref())
            .map_err(|e| Error::tool(FFMPEG, e.to_string()))?;
        let version = ffmpeg_version(&ffmpeg)
            .await
            .map_err(|e| Error::tool(FFMPEG, e.to_string()))?;
        tracing::info!(
            "Found ffmpeg at {} with version {}",
            ffmpeg.display(),
            version
        );

        let mut control = self.shared.control.lock();
        match *control {
            Control::Idle => {}
            Control::Running(_) => return Err(Error::internal("converter is already running")),
            Control::Stopping => return Err(Error::internal("converter has been shut down")),
        }
        *control = Control::Running(tokio::spawn(control_loop(
            Arc::clone(&self.shared),
            ffmpeg,
        )));
        Ok(())
    }

    /// Stop launching jobs, kill the running ones and wait for them to exit.
    ///
    /// Jobs still waiting in the queue are dropped. Every caller, including
    /// concurrent ones on other clones, returns only after all launched jobs
    /// have stopped. Calling this on a dispatcher that was never started
    /// only marks it as shut down.
    pub async fn shutdown(&self) {
        tracing::info!("Starting converter shutdown");
        self.shared.cancel.cancel();

        let control = std::mem::replace(&mut *self.shared.control.lock(), Control::Stopping);
        match control {
            Control::Running(handle) => {
                if let Err(e) = handle.await {
                    tracing::error!("Converter control loop failed: {}", e);
                }
                self.shared.stopped.cancel();
            }
            Control::Idle => {
                tracing::debug!("Converter was not running");
                self.shared.stopped.cancel();
            }
            Control::Stopping => tracing::debug!("Shutdown already in progress, waiting"),
        }

        self.shared.stopped.cancelled().await;
        tracing::info!("Converter shutdown complete");
    }

    /// Number of jobs currently running.
    pub fn running(&self) -> usize {
        self.shared.running.get()
    }

    /// Number of jobs waiting to be launched.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.settings.max_concurrency
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }
}

async fn control_loop(shared: Arc<Shared>, ffmpeg: PathBuf) {
    let ctx = JobContext {
        ffmpeg: Arc::from(ffmpeg),
        running: shared.running.clone(),
        cancel: shared.cancel.clone(),
        events: shared.events.clone(),
        show_progress: shared.settings.show_progress,
    };
    let capacity = shared.settings.max_concurrency;
    let mut workers = JoinSet::new();
    let mut tick = tokio::time::interval(shared.settings.poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Converter control loop started");

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        reap(&mut workers);

        let running = shared.running.get();
        if running >= capacity {
            tracing::trace!(running, "All conversion slots busy");
            continue;
        }

        let batch = shared.take_batch(capacity - running);
        if batch.is_empty() {
            tracing::trace!("No tasks to launch");
            continue;
        }

        tracing::debug!(
            count = batch.len(),
            running,
            "Launching tasks"
        );
        for job in batch {
            let guard = ctx.running.enter();
            workers.spawn(job.run(ctx.clone(), guard));
        }
    }

    tracing::info!("Stopped launching tasks");
    drain(&shared, &mut workers).await;
    shared.stopped.cancel();
}

/// Wait until every launched job has released its running slot.
async fn drain(shared: &Shared, workers: &mut JoinSet<JobOutcome>) {
    let abandoned = {
        let mut queue = shared.queue.lock();
        let abandoned = queue.len();
        queue.clear();
        abandoned
    };
    if abandoned > 0 {
        tracing::warn!(abandoned, "Dropping queued tasks that never started");
    }

    let mut tick = tokio::time::interval(shared.settings.drain_interval);
    loop {
        tick.tick().await;
        reap(workers);

        let running = shared.running.get();
        if running == 0 {
            break;
        }
        tracing::info!(running, "Waiting for running conversions to stop");
    }

    while let Some(result) = workers.join_next().await {
        log_join(result);
    }
    tracing::info!("All conversions stopped");
}

fn reap(workers: &mut JoinSet<JobOutcome>) {
    while let Some(result) = workers.try_join_next() {
        log_join(result);
    }
}

fn log_join(result: std::result::Result<JobOutcome, JoinError>) {
    match result {
        Ok(outcome) => tracing::trace!(%outcome, "Reaped conversion task"),
        Err(e) => tracing::error!("Conversion task panicked: {}", e),
    }
}
