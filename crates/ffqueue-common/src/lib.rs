//! ffqueue-common: shared types, IDs, and errors.
//!
//! This crate provides the pieces every other ffqueue crate agrees on:
//!
//! - **Typed IDs**: [`JobId`], a UUID wrapper used to correlate log lines
//! - **Wire Types**: [`JobRequest`] as it travels over the message bus
//! - **Lifecycle**: [`JobStatus`] and [`JobOutcome`]
//! - **Error Handling**: the [`Error`] enum and [`Result`] alias
//!
//! # Examples
//!
//! ```
//! use ffqueue_common::{JobId, JobRequest};
//!
//! let id = JobId::new();
//! let request = JobRequest::new("/media/in.mkv", "/media/out.mp4").with_name("trailer");
//! assert_eq!(request.name, "trailer");
//! assert!(!id.to_string().is_empty());
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
