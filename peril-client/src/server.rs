//! Server Operator
//!
//! What the person running the bus server can do: broadcast pause and
//! resume to every player, and read the game logs the clients publish.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, error, info, instrument};

use crate::bus::routing::{game_log_wildcard, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, PAUSE_KEY};
use crate::bus::{publish_json, subscribe_bincode, AckType, BusConnection, BusError, Publisher, QueueDurability, Subscription};
use crate::client::Console;
use crate::game::{GameLog, PlayingState};

const HELP: &str = "\
Possible commands:
* pause
* resume
* help
* quit";

/// What the operator loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    /// Keep reading.
    Continue,
    /// Operator asked to stop the server.
    Quit,
}

/// Operator input on the server side.
pub struct ServerConsole {
    publisher: Arc<dyn Publisher>,
    console: Arc<dyn Console>,
}

impl ServerConsole {
    /// Publish pause signals through `publisher`.
    pub fn new(publisher: Arc<dyn Publisher>, console: Arc<dyn Console>) -> Self {
        Self { publisher, console }
    }

    /// Execute one input line.
    pub async fn execute(&self, line: &str) -> ServerCommand {
        let Some(command) = line.split_whitespace().next() else {
            return ServerCommand::Continue;
        };

        match command {
            "pause" => {
                self.console.print("Sending pause message");
                self.broadcast(PlayingState::paused()).await;
            }
            "resume" => {
                self.console.print("Sending resume message");
                self.broadcast(PlayingState::resumed()).await;
            }
            "help" => self.console.print(HELP),
            "quit" => {
                self.console.print("Exiting");
                return ServerCommand::Quit;
            }
            other => self.console.print(&format!("Error: unknown command '{}'", other)),
        }

        ServerCommand::Continue
    }

    async fn broadcast(&self, ps: PlayingState) {
        match publish_json(self.publisher.as_ref(), EXCHANGE_PERIL_DIRECT, PAUSE_KEY, &ps).await {
            Ok(()) => info!(is_paused = ps.is_paused, "broadcast playing state"),
            Err(e) => {
                error!(error = %e, "error publishing playing state");
                self.console.print(&format!("Error: {}", e));
            }
        }
    }

    /// Read lines until `quit` or end of input.
    #[instrument(skip_all)]
    pub async fn run<R>(&self, lines: &mut Lines<R>) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.console.print(HELP);
        loop {
            self.console.refresh_prompt();
            let Some(line) = lines.next_line().await? else {
                debug!("input closed");
                return Ok(());
            };
            if self.execute(&line).await == ServerCommand::Quit {
                return Ok(());
            }
        }
    }
}

/// Consume the durable game log queue, writing each record to the log and
/// the console.
pub async fn subscribe_game_logs(
    connection: &BusConnection,
    console: Arc<dyn Console>,
) -> Result<Subscription, BusError> {
    subscribe_bincode(
        connection,
        EXCHANGE_PERIL_TOPIC,
        GAME_LOG_SLUG,
        &game_log_wildcard(),
        QueueDurability::Durable,
        move |gl: GameLog| {
            let console = console.clone();
            async move {
                info!(username = %gl.username, at = %gl.current_time, "{}", gl.message);
                console.print(&format!("{} {}: {}", gl.current_time.to_rfc3339(), gl.username, gl.message));
                console.refresh_prompt();
                AckType::Ack
            }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::bus::{declare_peril_topology, publish_bincode, MemoryBroker};
    use crate::bus::routing::game_log_key;
    use crate::client::testing::{RecordingConsole, RecordingPublisher};

    #[tokio::test]
    async fn test_pause_and_resume_broadcast() {
        let publisher = Arc::new(RecordingPublisher::default());
        let console = Arc::new(RecordingConsole::default());
        let server = ServerConsole::new(publisher.clone(), console.clone());

        assert_eq!(server.execute("pause").await, ServerCommand::Continue);
        assert_eq!(server.execute("resume").await, ServerCommand::Continue);
        assert_eq!(server.execute("quit").await, ServerCommand::Quit);

        let sent = publisher.published();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|p| p.exchange == EXCHANGE_PERIL_DIRECT && p.routing_key == PAUSE_KEY));
        assert_eq!(sent[0].decode::<PlayingState>(), PlayingState::paused());
        assert_eq!(sent[1].decode::<PlayingState>(), PlayingState::resumed());
    }

    #[tokio::test]
    async fn test_failed_broadcast_is_reported() {
        let console = Arc::new(RecordingConsole::default());
        let server = ServerConsole::new(Arc::new(RecordingPublisher::failing()), console.clone());

        server.execute("pause").await;
        assert!(console.output().contains("Error:"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let publisher = Arc::new(RecordingPublisher::default());
        let console = Arc::new(RecordingConsole::default());
        let server = ServerConsole::new(publisher.clone(), console.clone());

        assert_eq!(server.execute("nuke").await, ServerCommand::Continue);
        assert!(publisher.published().is_empty());
        assert!(console.output().contains("unknown command 'nuke'"));
    }

    #[tokio::test]
    async fn test_game_logs_are_consumed_and_acked() {
        let broker = MemoryBroker::new();
        declare_peril_topology(&broker).await.unwrap();
        let conn = broker.connect(Duration::from_secs(1));
        let console = Arc::new(RecordingConsole::default());

        let sub = subscribe_game_logs(&conn, console.clone()).await.unwrap();
        let ch = conn.create_channel();
        publish_bincode(&ch, EXCHANGE_PERIL_TOPIC, &game_log_key("alice"), &GameLog::new("alice", "alice won"))
            .await
            .unwrap();

        for _ in 0..200 {
            if !console.output().is_empty() && broker.unacked_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(console.output().contains("alice: alice won"));
        assert_eq!(broker.unacked_count().await, 0);
        sub.abort();
    }
}
