//! # ffqueue-av
//!
//! The media-tool side of ffqueue.
//!
//! This crate provides functionality for:
//! - Locating ffmpeg and reading its version
//! - Building the fixed conversion argument list
//! - Tokenizing ffmpeg's diagnostic (stderr) stream
//! - Estimating conversion progress from that stream
//!
//! ## Features
//!
//! - `async` (default) - [`TokenReader`] over tokio readers and the
//!   `tokio::process` based [`ffmpeg_version`]
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use ffqueue_av::{ffmpeg_version, require_tool, FFMPEG};
//!
//! # async fn run() -> ffqueue_av::Result<()> {
//! let path = require_tool(FFMPEG)?;
//! println!("ffmpeg {} at {}", ffmpeg_version(&path).await?, path.display());
//! # Ok(())
//! # }
//! ```

pub mod encode;
mod error;
pub mod progress;
#[cfg(feature = "async")]
pub mod tokens;
pub mod tools;

// Re-exports
pub use encode::conversion_args;
pub use error::{Error, Result};
pub use progress::{parse_duration, Progress, ProgressEstimator};
#[cfg(feature = "async")]
pub use tokens::TokenReader;
#[cfg(feature = "async")]
pub use tools::ffmpeg_version;
pub use tools::{
    check_tool_with_arg, check_tools, get_tool_path, require_tool, ToolInfo, FFMPEG,
};
