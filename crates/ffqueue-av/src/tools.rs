//! External tool detection and management.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Name of the transcoder binary on the search path.
pub const FFMPEG: &str = "ffmpeg";

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available by running it with `version_arg`.
///
/// # Example
///
/// ```no_run
/// use ffqueue_av::check_tool_with_arg;
///
/// let info = check_tool_with_arg("ffmpeg", "-version");
/// if info.available {
///     println!("ffmpeg version: {:?}", info.version);
/// }
/// ```
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let result = Command::new(name).arg(version_arg).output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = which::which(name).ok();

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check every tool the converter depends on.
pub fn check_tools() -> Vec<ToolInfo> {
    vec![check_tool_with_arg(FFMPEG, "-version")]
}

/// Require that a tool is available, returning its path.
///
/// # Errors
///
/// Returns an error if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
pub fn get_tool_path(name: &str, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Configured {} path {:?} does not exist, searching PATH",
            name,
            path
        );
    }

    require_tool(name)
}

/// Run `<ffmpeg> -version` and return the version token.
///
/// ffmpeg prints its version on the first line as
/// `ffmpeg version <version> Copyright ...`.
///
/// Runs through `tokio::process`, so it does not block a runtime thread.
///
/// # Errors
///
/// Fails if the binary cannot be run, exits unsuccessfully, or prints nothing.
#[cfg(feature = "async")]
pub async fn ffmpeg_version(path: &Path) -> Result<String> {
    let output = tokio::process::Command::new(path)
        .arg("-version")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::tool_failed(FFMPEG, format!("failed to run -version: {e}")))?;

    if !output.status.success() {
        return Err(Error::tool_failed(
            FFMPEG,
            format!("-version exited with {}", output.status),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version_banner(&stdout)
}

#[cfg(feature = "async")]
fn parse_version_banner(banner: &str) -> Result<String> {
    if banner.trim().is_empty() {
        return Err(Error::tool_failed(
            FFMPEG,
            "-version printed nothing, check the ffmpeg installation",
        ));
    }

    let first_line = banner.lines().next().unwrap_or_default();
    first_line
        .split(' ')
        .nth(2)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::parse_error("ffmpeg version", first_line.to_string()))
}
