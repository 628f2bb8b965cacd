//! WiiM Server - headless playback orchestrator for WiiM players.
//!
//! Serves the control API and media files, keeps every assigned player
//! looping its media and restores the fleet after a restart.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use wiim_core::{bootstrap_services, start_server, AppState, LocalIpDetector, NetworkContext};

use crate::config::ServerConfig;

/// WiiM Server - keeps WiiM players looping their assigned media.
#[derive(Parser, Debug)]
#[command(name = "wiim-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "WIIM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Preferred HTTP port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// IP address advertised to players in media URLs (overrides config file).
    #[arg(short = 'a', long)]
    advertise_ip: Option<std::net::IpAddr>,

    /// Directory for persisted JSON documents.
    #[arg(short = 'd', long, env = "WIIM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Directory for uploaded media.
    #[arg(short = 'm', long, env = "WIIM_MEDIA_DIR")]
    media_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("WiiM Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(media_dir) = args.media_dir {
        config.media_dir = media_dir;
    }

    // Resolve advertise IP: use explicit config, or fall back to auto-detection
    let network = if let Some(ip) = config.advertise_ip {
        log::info!("Configuration: port={}, advertise_ip={}", config.port, ip);
        NetworkContext::explicit(config.port, ip)
    } else {
        log::info!("Configuration: port={}, advertise_ip=auto", config.port);
        NetworkContext::auto_detect(config.port, LocalIpDetector::arc()).context(
            "Failed to auto-detect local IP address. \
             Please specify --advertise-ip or set WIIM_ADVERTISE_IP to an \
             address the players can reach.",
        )?
    };

    let core_config = config.to_core_config();
    log::info!(
        "Using data directory {} and media directory {}",
        core_config.data_dir.display(),
        core_config.media_dir.display()
    );

    let services =
        bootstrap_services(&core_config, network).context("Failed to bootstrap services")?;
    log::info!("Services bootstrapped successfully");

    // Restore, watchdog and reconciliation loops
    services.start_background_tasks();
    log::info!("Background tasks started");

    let app_state = AppState::from(&services);
    let result = start_server(app_state, shutdown_signal()).await;

    log::info!("Shutting down...");
    services.shutdown();

    result.context("HTTP server failed")?;
    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
