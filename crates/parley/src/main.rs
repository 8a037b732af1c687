//! # parley
//!
//! Relay server binary: loads settings, starts the HTTP/WebSocket server and
//! runs until Ctrl-C.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parley_server::config::ServerConfig;
use parley_server::server::RelayServer;
use parley_settings::ParleySettings;

/// Presence, signaling and snapshot relay.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Presence, signaling and snapshot relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.parley/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to serve static files from (overrides settings).
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

impl Cli {
    /// Load settings from the chosen file and environment, then apply flags.
    fn settings(&self) -> Result<ParleySettings> {
        let mut settings = match &self.config {
            Some(path) => parley_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => parley_settings::load_settings().with_context(|| {
                format!(
                    "Failed to load settings from {}",
                    parley_settings::settings_path().display()
                )
            })?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir = Some(dir.to_string_lossy().into_owned());
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = logging::with_startup_logging(|| args.settings())?;

    logging::init_subscriber(&settings.logging);

    let metrics_handle = parley_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings.server);
    let server = RelayServer::new(config, metrics_handle);
    let (addr, server_task) = server.listen().await.context("Failed to start server")?;

    tracing::info!(%addr, "websocket: ws://{addr}/ws");
    tracing::info!(%addr, "snapshot endpoint: POST http://{addr}/minecraft-data");

    server.shutdown().wait_for_signal().await;
    server.drain(server_task).await;
    tracing::info!("parley stopped");
    Ok(())
}
