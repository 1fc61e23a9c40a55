//! Job wire format and lifecycle types.
//!
//! [`JobRequest`] is what producers publish on the message bus. Field names
//! are PascalCase on the wire (`Name`, `InputFile`, `OutputFile`) and every
//! field is optional at decode time; an empty path only fails once the
//! transcoder is invoked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One requested input → output conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Free-form name used for logging and correlation.
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Source media path, absolute by convention.
    #[serde(rename = "InputFile", default)]
    pub input_file: PathBuf,
    /// Destination path, absolute by convention. Overwritten if present.
    #[serde(rename = "OutputFile", default)]
    pub output_file: PathBuf,
}

impl JobRequest {
    pub fn new(input_file: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            name: String::new(),
            input_file: input_file.into(),
            output_file: output_file.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name for log output, falling back to the input file name.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        self.input_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Lifecycle state of a job. There is no separate failed state: a job that
/// could not be launched is still `Finished`, with a failed [`JobOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// How a running job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The transcoder exited on its own.
    Exited {
        /// Exit code, absent when the process was terminated by a signal.
        code: Option<i32>,
        success: bool,
    },
    /// The transcoder was force-killed during shutdown.
    Killed,
    /// The job could not be launched or supervised.
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited { success: true, .. })
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code: Some(code), .. } => write!(f, "exited with code {code}"),
            Self::Exited { code: None, .. } => write!(f, "terminated by signal"),
            Self::Killed => write!(f, "killed"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_request_wire_names() {
        let request = JobRequest::new("/in/a.mkv", "/out/a.mp4").with_name("a");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["Name"], "a");
        assert_eq!(json["InputFile"], "/in/a.mkv");
        assert_eq!(json["OutputFile"], "/out/a.mp4");
    }

    #[test]
    fn test_job_request_missing_fields_default_to_empty() {
        let request: JobRequest = serde_json::from_str(r#"{"InputFile":"/in/b.mkv"}"#).unwrap();
        assert_eq!(request.input_file, PathBuf::from("/in/b.mkv"));
        assert!(request.name.is_empty());
        assert!(request.output_file.as_os_str().is_empty());
    }

    #[test]
    fn test_display_name_falls_back_to_file_name() {
        let request = JobRequest::new("/media/movie.mkv", "/out/movie.mp4");
        assert_eq!(request.display_name(), "movie.mkv");

        let named = request.with_name("feature");
        assert_eq!(named.display_name(), "feature");
    }

    #[test]
    fn test_outcome_display() {
        let ok = JobOutcome::Exited {
            code: Some(0),
            success: true,
        };
        assert!(ok.is_success());
        assert_eq!(ok.to_string(), "exited with code 0");
        assert!(!JobOutcome::Killed.is_success());
        assert_eq!(
            JobOutcome::Failed {
                error: "no such file".into()
            }
            .to_string(),
            "failed: no such file"
        );
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
