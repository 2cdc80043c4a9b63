//! Command Loop
//!
//! Reads operator lines, applies `spawn`/`move` to the local army and
//! publishes moves to the other players.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, error, info, instrument};

use crate::bus::Publisher;
use crate::client::console::Console;
use crate::client::outbound::publish_army_move;
use crate::client::ClientError;
use crate::game::moves::command_move;
use crate::game::spawn::command_spawn;
use crate::game::state::validate_username;
use crate::game::{GameState, SharedGameState};

const FAREWELL: &str = "I hate this game! (╯°□°)╯︵ ┻━┻";

const HELP: &str = "\
Possible commands:
* move <location> <unitID> <unitID> <unitID>...
    example:
    move asia 1
* spawn <location> <rank>
    example:
    spawn europe infantry
* status
* help
* quit";

/// What the loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Keep reading.
    Continue,
    /// Operator asked to leave.
    Quit,
}

/// Operator input against the local game.
pub struct CommandLoop {
    state: SharedGameState,
    publisher: Arc<dyn Publisher>,
    console: Arc<dyn Console>,
}

impl CommandLoop {
    /// Loop over `state`, publishing moves through `publisher`.
    pub fn new(state: SharedGameState, publisher: Arc<dyn Publisher>, console: Arc<dyn Console>) -> Self {
        Self {
            state,
            publisher,
            console,
        }
    }

    /// Execute one input line.
    pub async fn execute(&self, line: &str) -> CommandOutcome {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = words.first() else {
            return CommandOutcome::Continue;
        };

        match command {
            "spawn" => {
                let spawned = {
                    let mut state = self.state.write().await;
                    command_spawn(&mut state, &words)
                };
                match spawned {
                    Ok(unit) => self.console.print(&format!(
                        "Spawned a(n) {} in {} with id {}",
                        unit.rank, unit.location, unit.id
                    )),
                    Err(e) => self.console.print(&format!("Error: {}", e)),
                }
            }
            "move" => {
                let moved = {
                    let mut state = self.state.write().await;
                    command_move(&mut state, &words)
                };
                match moved {
                    Ok(mv) => {
                        self.console.print(&format!(
                            "Moved {} unit(s) to {}",
                            mv.units.len(),
                            mv.to_location
                        ));
                        match publish_army_move(self.publisher.as_ref(), &mv).await {
                            Ok(()) => info!(to = %mv.to_location, units = mv.units.len(), "published move"),
                            Err(e) => {
                                error!(error = %e, "error publishing move");
                                self.console.print(&format!("Error: {}", e));
                            }
                        }
                    }
                    Err(e) => self.console.print(&format!("Error: {}", e)),
                }
            }
            "status" => {
                let report = status_report(&*self.state.read().await);
                self.console.print(&report);
            }
            "help" => self.console.print(HELP),
            "quit" => {
                self.console.print(FAREWELL);
                return CommandOutcome::Quit;
            }
            other => self.console.print(&format!("Error: unknown command '{}'", other)),
        }

        CommandOutcome::Continue
    }

    /// Read lines until `quit` or end of input.
    #[instrument(skip_all)]
    pub async fn run<R>(&self, lines: &mut Lines<R>) -> Result<(), ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            self.console.refresh_prompt();
            let Some(line) = lines.next_line().await? else {
                debug!("input closed");
                return Ok(());
            };
            if self.execute(&line).await == CommandOutcome::Quit {
                return Ok(());
            }
        }
    }
}

/// Ask for a username until a valid one is entered.
pub async fn client_welcome<R>(lines: &mut Lines<R>, console: &dyn Console) -> Result<String, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    console.print("Welcome to the Peril client!\nPlease enter your username:");
    loop {
        console.refresh_prompt();
        let Some(line) = lines.next_line().await? else {
            return Err(ClientError::InputClosed);
        };
        match validate_username(&line) {
            Ok(name) => {
                console.print(&format!("Welcome, {}!", name));
                return Ok(name.to_string());
            }
            Err(e) => console.print(&format!("Error: {}", e)),
        }
    }
}

/// Human-readable army summary.
pub fn status_report(state: &GameState) -> String {
    let mut text = String::new();
    if state.is_paused() {
        text.push_str("The game state is paused.\n");
    }
    text.push_str(&format!("You are {}, and you have these units:", state.username()));
    for unit in state.player().units.values() {
        text.push_str(&format!("\n* {}: {}, {}", unit.id, unit.location, unit.rank));
    }
    text
}
