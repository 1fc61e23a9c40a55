mod cli;

use ffqueue::{
    bus::{self, MessageBus},
    config,
    converter::{ingest_handler, Dispatcher, DispatcherSettings},
};
use ffqueue_common::JobRequest;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use tokio::signal;

async fn start_service(config_path: Option<&Path>, max_concurrency: Option<usize>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override concurrency from CLI if specified
    if let Some(max_concurrency) = max_concurrency {
        config.converter.max_concurrency = max_concurrency;
        config::validate_config(&config)?;
    }

    tracing::info!("Starting ffqueue");
    tracing::info!(
        "Converting up to {} files at once",
        config.converter.max_concurrency
    );

    let dispatcher = Dispatcher::new(DispatcherSettings::from(&config.converter));

    let mut bus = MessageBus::new();
    bus.add_handler(ingest_handler(dispatcher.clone()));
    bus.start_listening(&config.nats.connection_string).await?;

    if let Err(e) = dispatcher.start().await {
        if let Err(bus_err) = bus.shutdown().await {
            tracing::warn!("Failed to close NATS connection: {:#}", bus_err);
        }
        return Err(e).context("Failed to start converter");
    }

    tracing::info!("Waiting for tasks on {}", bus::TOPIC);
    shutdown_signal().await;

    // Cleanup
    tracing::info!("Shutting down...");
    if let Err(e) = bus.shutdown().await {
        tracing::error!("Failed to shut down message bus: {:#}", e);
    }
    dispatcher.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "ffqueue=trace,ffqueue_av=trace,ffqueue_common=debug,async_nats=debug".to_string()
        } else {
            "ffqueue=info,ffqueue_av=info,async_nats=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { max_concurrency } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_service(cli.config.as_deref(), max_concurrency))
        }
        Commands::Send {
            input,
            output,
            name,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(send_task(cli.config.as_deref(), &input, &output, name))
        }
        Commands::CheckTools => check_tools(),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("ffqueue {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn send_task(
    config_path: Option<&Path>,
    input: &Path,
    output: &Path,
    name: String,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let request = JobRequest::new(absolute(input)?, absolute(output)?).with_name(name);
    bus::publish(&config.nats.connection_string, &request).await?;

    println!(
        "Published {} -> {} to {}",
        request.input_file.display(),
        request.output_file.display(),
        bus::TOPIC
    );
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Failed to resolve path: {:?}", path))
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ffqueue_av::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg before starting the service.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  NATS: {}", config.nats.connection_string);
    println!("  Topic: {}", bus::TOPIC);
    println!("  Max concurrency: {}", config.converter.max_concurrency);
    println!("  Poll interval: {}ms", config.converter.poll_interval_ms);
    println!("  Drain interval: {}ms", config.converter.drain_interval_ms);
    match config.converter.ffmpeg_path {
        Some(ref ffmpeg) => println!("  ffmpeg: {}", ffmpeg.display()),
        None => println!("  ffmpeg: search PATH"),
    }

    Ok(())
}
