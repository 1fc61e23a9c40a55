use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub nats: NatsConfig,

    #[serde(default)]
    pub converter: ConverterConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NatsConfig {
    /// Server URL, e.g. `nats://127.0.0.1:4222`
    #[serde(default = "default_connection_string")]
    pub connection_string: String,
}

fn default_connection_string() -> String {
    "nats://127.0.0.1:4222".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConverterConfig {
    /// Maximum conversions running at once (default: 1)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// How often the dispatcher looks for free slots (default: 1000)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How often the running count is sampled while draining (default: 500)
    #[serde(default = "default_drain_interval")]
    pub drain_interval_ms: u64,

    /// Explicit ffmpeg binary; PATH is searched when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Print a progress line to stdout per frame update (default: true)
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_max_concurrency() -> usize {
    1
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_drain_interval() -> u64 {
    500
}
fn default_show_progress() -> bool {
    true
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            poll_interval_ms: default_poll_interval(),
            drain_interval_ms: default_drain_interval(),
            ffmpeg_path: None,
            show_progress: default_show_progress(),
        }
    }
}

impl ConverterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}
