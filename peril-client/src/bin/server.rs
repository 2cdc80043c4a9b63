//! Peril Bus Server
//!
//! Hosts the broker every player connects to over WebSocket, and gives the
//! operator pause/resume and the game log.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use peril::{
    client::{Console, StdoutConsole},
    declare_peril_topology,
    server::{subscribe_game_logs, ServerConsole},
    BusServer, MemoryBroker, Publisher, ServerConfig, VERSION,
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

    info!("Peril Server v{}", VERSION);

    let config = ServerConfig::from_env()?;
    info!(bind_addr = %config.bind_addr, confirm_timeout = ?config.confirm_timeout, "loaded configuration");

    let broker = MemoryBroker::new();
    declare_peril_topology(&broker)
        .await
        .context("failed to declare exchanges")?;

    let server = Arc::new(
        BusServer::bind(broker.clone(), config.bind_addr, config.confirm_timeout)
            .await
            .with_context(|| format!("failed to bind {}", config.bind_addr))?,
    );
    info!(url = %server.url()?, "players connect with PERIL_BUS_URL");
    let running = server.clone();
    let accept_task = tokio::spawn(async move { running.run().await });

    let connection = broker.connect(config.confirm_timeout);
    let console: Arc<dyn Console> = Arc::new(StdoutConsole::new(true));
    let game_logs = subscribe_game_logs(&connection, console.clone())
        .await
        .context("failed to subscribe to game logs")?;

    let publisher: Arc<dyn Publisher> = Arc::new(connection.create_channel());
    let operator = ServerConsole::new(publisher, console);
    let mut lines = BufReader::new(io::stdin()).lines();

    tokio::select! {
        result = operator.run(&mut lines) => {
            if let Err(e) = result {
                warn!(error = %e, "operator input ended with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    game_logs.abort();
    server.shutdown();
    let _ = accept_task.await;
    connection.close().await;
    info!("server stopped");
    Ok(())
}
