//! tsmux-server - standalone server hosting the live broadcast stream
//! multiplexer.
//!
//! This binary wires the core's collaborators (channel metadata, recorded-
//! file registry, tuner) and exposes the thin status/control HTTP surface.
//! The database layer holding channel/program metadata is deliberately out
//! of scope for this crate; [`NoChannelMetadata`] is a placeholder that
//! always reports no channel, suitable only until a real metadata
//! collaborator is wired in.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::signal;
use tsmux_core::{bootstrap_services, start_server, AppState, Channel, ChannelMetadata, Program};

use crate::config::ServerConfig;

/// Placeholder channel metadata collaborator that reports no channels.
///
/// The real implementation lives in the database layer this crate does not
/// own (spec §1); swap this out before relying on recording filenames that
/// include the channel name or current program title.
struct NoChannelMetadata;

#[async_trait]
impl ChannelMetadata for NoChannelMetadata {
    async fn get(&self, _display_channel_id: &str) -> Option<Channel> {
        None
    }

    async fn get_current_and_next_program(
        &self,
        _channel: &Channel,
    ) -> (Option<Program>, Option<Program>) {
        (None, None)
    }
}

/// tsmux-server - headless live broadcast stream multiplexer.
#[derive(Parser, Debug)]
#[command(name = "tsmux-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "TSMUX_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "TSMUX_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("tsmux-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config, Arc::new(NoChannelMetadata), None)
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let app_state = AppState::builder().registry(services.registry.clone()).build();

    let bind_port = config.bind_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, bind_port).await {
            log::error!("Server error: {e}");
        }
    });

    log::info!("HTTP server started on port {bind_port}");

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown().await;
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
