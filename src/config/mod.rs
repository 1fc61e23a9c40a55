mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default config locations, searched in order.
const DEFAULT_PATHS: &[&str] = &[
    "./ffqueue.toml",
    "./config.toml",
    "~/.config/ffqueue/config.toml",
    "/etc/ffqueue/config.toml",
];

/// Load configuration from a TOML file. A leading `~` is expanded.
pub fn load_config(path: &Path) -> Result<Config> {
    let path = expand_path(path);
    let path = std::path::absolute(&path)
        .with_context(|| format!("Failed to resolve config path: {:?}", path))?;

    tracing::info!("Loading configuration from {:?}", path);

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    tracing::debug!("Configuration parsed: {:?}", config);
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.nats.connection_string.trim().is_empty() {
        anyhow::bail!("nats.connection_string cannot be empty");
    }

    if config.converter.max_concurrency == 0 {
        anyhow::bail!("converter.max_concurrency must be at least 1");
    }

    if config.converter.poll_interval_ms == 0 {
        anyhow::bail!("converter.poll_interval_ms cannot be 0");
    }

    if config.converter.drain_interval_ms == 0 {
        anyhow::bail!("converter.drain_interval_ms cannot be 0");
    }

    if let Some(ref path) = config.converter.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
        }
    }

    Ok(())
}
