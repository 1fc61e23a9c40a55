use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffqueue")]
#[command(author, version, about = "Queue-driven ffmpeg conversion service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Subscribe to the task topic and run conversions
    Start {
        /// Maximum conversions running at once (overrides the config file)
        #[arg(short, long)]
        max_concurrency: Option<usize>,
    },

    /// Publish a single conversion task
    Send {
        /// Source media file
        #[arg(short, long)]
        input: PathBuf,

        /// Destination file, overwritten if it exists
        #[arg(short, long)]
        output: PathBuf,

        /// Name used in logs
        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config or the defaults if not specified)
        #[arg(value_name = "CONFIG")]
        file: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
