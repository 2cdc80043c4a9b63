//! Peril Client
//!
//! Interactive client for one player. Connects to the bus server at
//! `PERIL_BUS_URL`, which every player of a game shares.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use peril::{
    client::{client_welcome, Console, StdoutConsole},
    BusConnection, ClientConfig, PerilClient, VERSION,
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_LOG_FILTER: &str = "debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_LOG_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    info!("Peril Client v{}", VERSION);

    let config = ClientConfig::from_env()?;
    info!(bus_url = %config.bus_url, confirm_timeout = ?config.confirm_timeout, "loaded configuration");

    let connection = BusConnection::open(&config.bus_url, config.confirm_timeout)
        .await
        .with_context(|| format!("failed to connect to {}", config.bus_url))?;
    info!(connection = %connection.id(), "connected to bus");

    let console: Arc<dyn Console> = Arc::new(StdoutConsole::new(config.prompt_enabled));
    let mut lines = BufReader::new(io::stdin()).lines();

    let username = match config.username {
        Some(name) => name,
        None => client_welcome(&mut lines, console.as_ref()).await?,
    };

    let client = PerilClient::start(&connection, &username, console.clone())
        .await
        .context("failed to start client")?;
    let commands = client.command_loop();

    tokio::select! {
        result = commands.run(&mut lines) => {
            if let Err(e) = result {
                warn!(error = %e, "command loop ended with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    client.shutdown();
    connection.close().await;
    info!("connection closed");
    Ok(())
}
