//! Unit Spawning
//!
//! `spawn <location> <rank>` from the command loop.

use crate::game::state::{GameError, GameState, Location, Unit, UnitRank};

const SPAWN_USAGE: &str = "spawn <location> <rank>";

/// Spawn a unit from the tokenized command `["spawn", location, rank]`.
pub fn command_spawn(state: &mut GameState, words: &[&str]) -> Result<Unit, GameError> {
    let [_, location, rank] = words else {
        return Err(GameError::Usage(SPAWN_USAGE));
    };

    let location: Location = location.parse()?;
    let rank: UnitRank = rank.parse()?;

    Ok(state.add_unit(rank, location))
}
