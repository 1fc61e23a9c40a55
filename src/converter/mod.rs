//! ffmpeg conversion service.
//!
//! [`Dispatcher`] owns the queue and the control loop, [`Job`] owns one
//! ffmpeg process, and [`ingest_handler`] feeds bus messages into the queue.

mod dispatcher;
mod events;
mod ingest;
mod job;

pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use events::{EventSender, JobEvent, JobEventKind, EVENT_CAPACITY};
pub use ingest::{decode_job, ingest_handler, HANDLER_NAME};
pub use job::{Job, JobContext, RunningCounter, RunningGuard};
