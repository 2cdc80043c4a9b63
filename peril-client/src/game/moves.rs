//! Army Moves
//!
//! Building a move from operator input, and evaluating a move received
//! from another player against the local army.

use serde::{Deserialize, Serialize};

use crate::game::state::{GameError, GameState, Location, PlayerSnapshot, Unit};

const MOVE_USAGE: &str = "move <location> <unitID> <unitID> ...";

/// A move published by one player to everyone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyMove {
    /// The mover's army after the move was applied.
    pub player: PlayerSnapshot,
    /// Units that moved.
    pub units: Vec<Unit>,
    /// Destination.
    pub to_location: Location,
}

/// Result of evaluating someone's move against our army.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move came from this player.
    SamePlayer,
    /// No shared territory.
    Safe,
    /// Our units share a location with the mover: war.
    MakeWar,
}

/// Apply `["move", location, id, id, ...]` to our own army.
pub fn command_move(state: &mut GameState, words: &[&str]) -> Result<ArmyMove, GameError> {
    if state.is_paused() {
        return Err(GameError::Paused);
    }

    let [_, location, ids @ ..] = words else {
        return Err(GameError::Usage(MOVE_USAGE));
    };
    if ids.is_empty() {
        return Err(GameError::Usage(MOVE_USAGE));
    }

    let to_location: Location = location.parse()?;
    let ids = ids
        .iter()
        .map(|raw| raw.parse::<u32>().map_err(|_| GameError::InvalidUnitId(raw.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    let units = state.move_units(&ids, to_location)?;

    Ok(ArmyMove {
        player: state.player_snapshot(),
        units,
        to_location,
    })
}

/// Evaluate an incoming move against this player's army.
///
/// Pure with respect to `state`; a move never changes the receiver's army.
pub fn handle_move(state: &GameState, mv: &ArmyMove) -> Result<MoveOutcome, GameError> {
    if mv.units.is_empty() {
        return Err(GameError::EmptyMove(mv.player.username.clone()));
    }

    if mv.player.username == state.username() {
        return Ok(MoveOutcome::SamePlayer);
    }

    match state.player().overlapping_location(&mv.player) {
        Some(_) => Ok(MoveOutcome::MakeWar),
        None => Ok(MoveOutcome::Safe),
    }
}
