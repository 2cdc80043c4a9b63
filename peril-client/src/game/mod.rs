//! Game Logic Module
//!
//! Rule evaluators and the per-player game state. Nothing in here touches
//! the bus; handlers in `client/` feed events through these functions.
//!
//! ## Module Structure
//!
//! - `state`: Game state, player snapshot, units and locations
//! - `spawn`: Unit spawning
//! - `moves`: Army moves (local command and remote evaluation)
//! - `war`: War resolution
//! - `pause`: Pause signals
//! - `gamelog`: Game log records

pub mod state;
pub mod spawn;
pub mod moves;
pub mod war;
pub mod pause;
pub mod gamelog;

// Re-export key types
pub use state::{GameState, GameError, Location, PlayerSnapshot, SharedGameState, Unit, UnitRank};
pub use moves::{ArmyMove, MoveOutcome};
pub use war::{RecognitionOfWar, WarOutcome, WarResolution};
pub use pause::PlayingState;
pub use gamelog::GameLog;
