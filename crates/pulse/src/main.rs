//! # pulse
//!
//! Server binary: loads settings, installs logging and metrics, builds the
//! hub and serves it until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_core::Hub;
use pulse_server::config::{ServerConfig, hub_config};
use pulse_server::logging::init_subscriber;
use pulse_server::server::PulseServer;
use pulse_settings::PulseSettings;
use pulse_settings::loader::{load_with, settings_path};
use tracing::info;

/// Real-time ITSM event distribution server.
#[derive(Parser, Debug)]
#[command(name = "pulse", about = "Real-time ITSM event distribution server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.pulse/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Defaults, then the settings file, then `PULSE_*` variables, then flags.
fn resolve_settings<F>(cli: &Cli, lookup: F) -> Result<PulseSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_with(&path, lookup)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli, |name| std::env::var(name).ok())?;
    init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics = pulse_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let hub = Arc::new(Hub::new(hub_config(&settings.realtime)));
    let mut server = PulseServer::new(ServerConfig::from_settings(&settings.server), hub);
    server.set_metrics(metrics);

    let bridge = server.start_bridge().await;
    server.start_supervisor();
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(%addr, ?bridge, "pulse ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutdown signal received");

    let timeout = server.config().shutdown_timeout;
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(timeout))
        .await;
    info!("pulse stopped");
    Ok(())
}
