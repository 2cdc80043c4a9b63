//! Game State Definitions
//!
//! One player's view of the world: who they are, where their units stand,
//! and whether the game is paused. Uses BTreeMap so unit listings and
//! overlap checks iterate in id order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Handle to the game state shared between the command loop and the
/// bus handlers of a single client process.
pub type SharedGameState = Arc<RwLock<GameState>>;

// =============================================================================
// LOCATIONS
// =============================================================================

/// A territory on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// North and South America.
    Americas,
    /// Europe.
    Europe,
    /// Africa.
    Africa,
    /// Asia.
    Asia,
    /// Antarctica.
    Antarctica,
    /// Australia.
    Australia,
}

impl Location {
    /// Every location, in board order.
    pub const ALL: [Location; 6] = [
        Location::Americas,
        Location::Europe,
        Location::Africa,
        Location::Asia,
        Location::Antarctica,
        Location::Australia,
    ];

    /// Lowercase name as typed by the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Location::Americas => "americas",
            Location::Europe => "europe",
            Location::Africa => "africa",
            Location::Asia => "asia",
            Location::Antarctica => "antarctica",
            Location::Australia => "australia",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GameError::UnknownLocation(s.to_string()))
    }
}

// =============================================================================
// UNITS
// =============================================================================

/// Unit rank. Determines how much a unit contributes to a war.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRank {
    /// Cheap, weak.
    Infantry,
    /// Mid tier.
    Cavalry,
    /// Strongest.
    Artillery,
}

impl UnitRank {
    /// Every rank.
    pub const ALL: [UnitRank; 3] = [UnitRank::Infantry, UnitRank::Cavalry, UnitRank::Artillery];

    /// Power this rank adds to its side of a war.
    #[inline]
    pub fn power(self) -> u32 {
        match self {
            UnitRank::Infantry => 1,
            UnitRank::Cavalry => 5,
            UnitRank::Artillery => 10,
        }
    }

    /// Lowercase name as typed by the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            UnitRank::Infantry => "infantry",
            UnitRank::Cavalry => "cavalry",
            UnitRank::Artillery => "artillery",
        }
    }
}

impl fmt::Display for UnitRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitRank {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitRank::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GameError::UnknownRank(s.to_string()))
    }
}

/// A single unit on the board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Id, unique per owning player.
    pub id: u32,
    /// Rank.
    pub rank: UnitRank,
    /// Where the unit currently stands.
    pub location: Location,
}

/// Sum the power of a set of units.
pub fn power_level<'a>(units: impl IntoIterator<Item = &'a Unit>) -> u32 {
    units.into_iter().map(|u| u.rank.power()).sum()
}

// =============================================================================
// PLAYER SNAPSHOT
// =============================================================================

/// Serializable copy of one player's army. This is what crosses the bus.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Owning player.
    pub username: String,
    /// Units keyed by id.
    pub units: BTreeMap<u32, Unit>,
}

impl PlayerSnapshot {
    /// Empty army for `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            units: BTreeMap::new(),
        }
    }

    /// Units standing in `location`.
    pub fn units_in(&self, location: Location) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.location == location)
    }

    /// First location (in unit id order of `self`) where both armies have units.
    pub fn overlapping_location(&self, other: &PlayerSnapshot) -> Option<Location> {
        self.units
            .values()
            .map(|u| u.location)
            .find(|loc| other.units.values().any(|o| o.location == *loc))
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Everything a single client knows about the game.
#[derive(Clone, Debug)]
pub struct GameState {
    username: String,
    player: PlayerSnapshot,
    paused: bool,
    next_unit_id: u32,
}

impl GameState {
    /// Fresh state for `username`: no units, not paused.
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            player: PlayerSnapshot::new(username.clone()),
            username,
            paused: false,
            next_unit_id: 1,
        }
    }

    /// Wrap into the shared handle used by handlers and the command loop.
    pub fn shared(self) -> SharedGameState {
        Arc::new(RwLock::new(self))
    }

    /// This player's name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Copy of this player's army, suitable for publishing.
    pub fn player_snapshot(&self) -> PlayerSnapshot {
        self.player.clone()
    }

    /// Borrow this player's army.
    pub fn player(&self) -> &PlayerSnapshot {
        &self.player
    }

    /// Whether the game is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Set the pause flag.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Look up a unit by id.
    pub fn unit(&self, id: u32) -> Option<&Unit> {
        self.player.units.get(&id)
    }

    /// Add a unit and return it. Ids are never reused.
    pub fn add_unit(&mut self, rank: UnitRank, location: Location) -> Unit {
        let unit = Unit {
            id: self.next_unit_id,
            rank,
            location,
        };
        self.next_unit_id += 1;
        self.player.units.insert(unit.id, unit.clone());
        unit
    }

    /// Relocate the given units. Fails without changing anything if any id is unknown.
    pub fn move_units(&mut self, ids: &[u32], to: Location) -> Result<Vec<Unit>, GameError> {
        if let Some(missing) = ids.iter().find(|id| !self.player.units.contains_key(id)) {
            return Err(GameError::UnitNotFound(*missing));
        }

        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(unit) = self.player.units.get_mut(id) {
                unit.location = to;
                moved.push(unit.clone());
            }
        }
        Ok(moved)
    }

    /// Remove every unit standing in `location`. Returns how many were lost.
    pub fn remove_units_in(&mut self, location: Location) -> usize {
        let before = self.player.units.len();
        self.player.units.retain(|_, u| u.location != location);
        before - self.player.units.len()
    }
}

/// Validate a name for use as a player username.
///
/// Usernames end up inside routing keys, so the topic separators and
/// wildcards are refused.
pub fn validate_username(name: &str) -> Result<&str, GameError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GameError::InvalidUsername("username must not be empty".to_string()));
    }
    if name.chars().any(|c| c.is_whitespace() || matches!(c, '.' | '*' | '#')) {
        return Err(GameError::InvalidUsername(format!(
            "'{}' may not contain whitespace, '.', '*' or '#'",
            name
        )));
    }
    Ok(name)
}

/// Rule evaluator and command errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Location name not recognised.
    #[error("unknown location: {0}")]
    UnknownLocation(String),

    /// Rank name not recognised.
    #[error("unknown unit rank: {0}")]
    UnknownRank(String),

    /// Unit id did not parse.
    #[error("invalid unit id: {0}")]
    InvalidUnitId(String),

    /// No unit with this id.
    #[error("unit {0} not found")]
    UnitNotFound(u32),

    /// Command used with the wrong arguments.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Moves are refused while paused.
    #[error("the game is paused, you can not move units")]
    Paused,

    /// An army move carried no units.
    #[error("move from {0} carries no units")]
    EmptyMove(String),

    /// A war where one player fights themselves.
    #[error("{0} cannot declare war on themselves")]
    SelfWar(String),

    /// Bad username.
    #[error("invalid username: {0}")]
    InvalidUsername(String),
}
