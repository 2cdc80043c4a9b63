//! Peril Client
//!
//! Wires one player's game state to the bus:
//!
//! ```text
//! peril_direct  --pause-------------> pause.<username>        --> on_pause
//! peril_topic   --army_moves.*------> army_moves.<username>   --> on_army_move --war.<username>--> peril_topic
//! peril_topic   --war.<username>----> war (shared, durable)   --> on_recognition_of_war --game_logs.<username>--> peril_topic
//! ```
//!
//! The command loop shares the same state and publishes the player's own
//! moves.

pub mod commands;
pub mod console;
pub mod handlers;
pub mod outbound;

#[cfg(test)]
pub(crate) mod testing;

use std::io;
use std::sync::Arc;

use tracing::info;

use crate::bus::routing::{
    army_moves_key, army_moves_wildcard, pause_queue, war_key, EXCHANGE_PERIL_DIRECT,
    EXCHANGE_PERIL_TOPIC, PAUSE_KEY, WAR_RECOGNITIONS_PREFIX,
};
use crate::bus::{subscribe_json, BusConnection, BusError, Publisher, QueueDurability, Subscription};
use crate::game::state::validate_username;
use crate::game::{GameError, GameState, SharedGameState};
use handlers::{handler_move, handler_pause, handler_war, HandlerContext};

pub use commands::{client_welcome, CommandLoop, CommandOutcome};
pub use console::{Console, SilentConsole, StdoutConsole};

/// Client setup and input errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Declaring or subscribing failed.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Bad username or other rule failure at setup.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Reading operator input failed.
    #[error("input error: {0}")]
    Input(#[from] io::Error),

    /// Input ended before a username was given.
    #[error("input closed before a username was entered")]
    InputClosed,
}

/// A connected player.
pub struct PerilClient {
    username: String,
    state: SharedGameState,
    publisher: Arc<dyn Publisher>,
    console: Arc<dyn Console>,
    subscriptions: Vec<Subscription>,
}

impl PerilClient {
    /// Declare this player's queues and start consuming.
    pub async fn start(
        connection: &BusConnection,
        username: &str,
        console: Arc<dyn Console>,
    ) -> Result<Self, ClientError> {
        let username = validate_username(username)?.to_string();
        let state = GameState::new(username.clone()).shared();
        let publisher: Arc<dyn Publisher> = Arc::new(connection.create_channel());
        let ctx = HandlerContext::new(state.clone(), publisher.clone(), console.clone());

        let pause = subscribe_json(
            connection,
            EXCHANGE_PERIL_DIRECT,
            &pause_queue(&username),
            PAUSE_KEY,
            QueueDurability::Transient,
            handler_pause(ctx.clone()),
        )
        .await?;

        let moves = subscribe_json(
            connection,
            EXCHANGE_PERIL_TOPIC,
            &army_moves_key(&username),
            &army_moves_wildcard(),
            QueueDurability::Transient,
            handler_move(ctx.clone()),
        )
        .await?;

        let wars = subscribe_json(
            connection,
            EXCHANGE_PERIL_TOPIC,
            WAR_RECOGNITIONS_PREFIX,
            &war_key(&username),
            QueueDurability::Durable,
            handler_war(ctx),
        )
        .await?;

        info!(username = %username, "client started");

        Ok(Self {
            username,
            state,
            publisher,
            console,
            subscriptions: vec![pause, moves, wars],
        })
    }

    /// This player's username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Shared game state.
    pub fn state(&self) -> &SharedGameState {
        &self.state
    }

    /// Command loop over this client's state.
    pub fn command_loop(&self) -> CommandLoop {
        CommandLoop::new(self.state.clone(), self.publisher.clone(), self.console.clone())
    }

    /// Stop consuming. The connection stays open for the caller to close.
    pub fn shutdown(&self) {
        for subscription in &self.subscriptions {
            subscription.abort();
        }
        info!(username = %self.username, "client stopped");
    }
}
