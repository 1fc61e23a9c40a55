//! Job lifecycle events.
//!
//! The dispatcher broadcasts a [`JobEvent`] whenever a job is queued,
//! launched, reports progress, or finishes. Nothing inside the converter
//! depends on anyone listening.

use chrono::{DateTime, Utc};
use ffqueue_common::{JobId, JobOutcome, JobStatus};
use serde::Serialize;
use tokio::sync::broadcast;

/// Buffer size of the broadcast channel. Slow subscribers lag, they never block jobs.
pub const EVENT_CAPACITY: usize = 256;

/// What happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    Queued { name: String },
    Started,
    Progress {
        frame: u64,
        total_frames: u64,
        percent: u64,
    },
    Finished { outcome: JobOutcome },
}

/// A timestamped lifecycle event for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn new(job_id: JobId, kind: JobEventKind) -> Self {
        Self {
            job_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Status of the job right after this event.
    pub fn status(&self) -> JobStatus {
        match self.kind {
            JobEventKind::Queued { .. } => JobStatus::Queued,
            JobEventKind::Started | JobEventKind::Progress { .. } => JobStatus::Running,
            JobEventKind::Finished { .. } => JobStatus::Finished,
        }
    }
}

/// Sending half shared by the dispatcher and its jobs.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: broadcast::Sender<JobEvent>,
}

impl EventSender {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, job_id: JobId, kind: JobEventKind) {
        // Ignore send errors (no subscribers).
        let _ = self.tx.send(JobEvent::new(job_id, kind));
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}
