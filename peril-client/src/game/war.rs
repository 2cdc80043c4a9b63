//! War Resolution
//!
//! A war is declared by the defender once it sees an enemy move into a
//! location it holds. Whoever consumes the declaration resolves it against
//! its own army.

use serde::{Deserialize, Serialize};

use crate::game::state::{power_level, GameError, GameState, Location, PlayerSnapshot};

/// Declaration that two players are at war.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOfWar {
    /// The player whose move started the war.
    pub attacker: PlayerSnapshot,
    /// The player who recognised the war.
    pub defender: PlayerSnapshot,
}

/// How a war turned out from this player's point of view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WarOutcome {
    /// This player is neither attacker nor defender.
    NotInvolved {
        /// Attacker name.
        attacker: String,
        /// Defender name.
        defender: String,
    },
    /// The two armies share no location.
    NoUnits {
        /// Attacker name.
        attacker: String,
        /// Defender name.
        defender: String,
    },
    /// The other side won; this player's units in the contested location are gone.
    OpponentWon {
        /// Winner name.
        winner: String,
        /// Loser name.
        loser: String,
    },
    /// This player won.
    YouWon {
        /// Winner name.
        winner: String,
        /// Loser name.
        loser: String,
    },
    /// Equal power; this player's units in the contested location are gone.
    Draw {
        /// Attacker name.
        attacker: String,
        /// Defender name.
        defender: String,
    },
}

/// Full result of a war evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarResolution {
    /// Outcome for this player.
    pub outcome: WarOutcome,
    /// Where the fight happened, if it happened.
    pub location: Option<Location>,
    /// Units this player lost.
    pub units_lost: usize,
}

impl WarResolution {
    fn without_battle(outcome: WarOutcome) -> Self {
        Self {
            outcome,
            location: None,
            units_lost: 0,
        }
    }
}

/// Resolve a war against this player's army.
///
/// Losses are applied to `state` inside this call, so a caller holding the
/// write lock sees the whole war as one step.
pub fn handle_war(state: &mut GameState, rw: &RecognitionOfWar) -> Result<WarResolution, GameError> {
    let attacker = rw.attacker.username.clone();
    let defender = rw.defender.username.clone();

    if attacker == defender {
        return Err(GameError::SelfWar(attacker));
    }

    let me = state.username().to_string();
    if me != attacker && me != defender {
        return Ok(WarResolution::without_battle(WarOutcome::NotInvolved { attacker, defender }));
    }

    let Some(location) = rw.attacker.overlapping_location(&rw.defender) else {
        return Ok(WarResolution::without_battle(WarOutcome::NoUnits { attacker, defender }));
    };

    let attacker_power = power_level(rw.attacker.units_in(location));
    let defender_power = power_level(rw.defender.units_in(location));

    let (outcome, this_player_lost) = if attacker_power > defender_power {
        if me == defender {
            (WarOutcome::OpponentWon { winner: attacker, loser: defender }, true)
        } else {
            (WarOutcome::YouWon { winner: attacker, loser: defender }, false)
        }
    } else if defender_power > attacker_power {
        if me == attacker {
            (WarOutcome::OpponentWon { winner: defender, loser: attacker }, true)
        } else {
            (WarOutcome::YouWon { winner: defender, loser: attacker }, false)
        }
    } else {
        (WarOutcome::Draw { attacker, defender }, true)
    };

    let units_lost = if this_player_lost {
        state.remove_units_in(location)
    } else {
        0
    };

    Ok(WarResolution {
        outcome,
        location: Some(location),
        units_lost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::UnitRank;

    fn army(username: &str, units: &[(UnitRank, Location)]) -> GameState {
        let mut gs = GameState::new(username);
        for (rank, loc) in units {
            gs.add_unit(*rank, *loc);
        }
        gs
    }

    fn war(attacker: &GameState, defender: &GameState) -> RecognitionOfWar {
        RecognitionOfWar {
            attacker: attacker.player_snapshot(),
            defender: defender.player_snapshot(),
        }
    }

    #[test]
    fn test_not_involved() {
        let alice = army("alice", &[(UnitRank::Infantry, Location::Europe)]);
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let mut carol = army("carol", &[(UnitRank::Infantry, Location::Europe)]);

        let res = handle_war(&mut carol, &war(&alice, &bob)).unwrap();
        assert!(matches!(res.outcome, WarOutcome::NotInvolved { .. }));
        assert_eq!(carol.player().units.len(), 1);
    }

    #[test]
    fn test_no_units() {
        let alice = army("alice", &[(UnitRank::Infantry, Location::Asia)]);
        let mut bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let rw = war(&alice, &bob);

        let res = handle_war(&mut bob, &rw).unwrap();
        assert_eq!(
            res.outcome,
            WarOutcome::NoUnits {
                attacker: "alice".into(),
                defender: "bob".into()
            }
        );
        assert_eq!(res.location, None);
    }

    #[test]
    fn test_attacker_wins_seen_by_defender() {
        let alice = army("alice", &[(UnitRank::Artillery, Location::Europe)]);
        let mut bob = army(
            "bob",
            &[(UnitRank::Infantry, Location::Europe), (UnitRank::Cavalry, Location::Asia)],
        );
        let rw = war(&alice, &bob);

        let res = handle_war(&mut bob, &rw).unwrap();
        assert_eq!(
            res.outcome,
            WarOutcome::OpponentWon {
                winner: "alice".into(),
                loser: "bob".into()
            }
        );
        assert_eq!(res.units_lost, 1);
        assert_eq!(bob.player().units.len(), 1);
    }

    #[test]
    fn test_attacker_wins_seen_by_attacker() {
        let mut alice = army("alice", &[(UnitRank::Artillery, Location::Europe)]);
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let rw = war(&alice, &bob);

        let res = handle_war(&mut alice, &rw).unwrap();
        assert_eq!(
            res.outcome,
            WarOutcome::YouWon {
                winner: "alice".into(),
                loser: "bob".into()
            }
        );
        assert_eq!(res.units_lost, 0);
        assert_eq!(alice.player().units.len(), 1);
    }

    #[test]
    fn test_defender_wins_seen_by_attacker() {
        let mut alice = army("alice", &[(UnitRank::Infantry, Location::Africa)]);
        let bob = army("bob", &[(UnitRank::Cavalry, Location::Africa)]);
        let rw = war(&alice, &bob);

        let res = handle_war(&mut alice, &rw).unwrap();
        assert_eq!(
            res.outcome,
            WarOutcome::OpponentWon {
                winner: "bob".into(),
                loser: "alice".into()
            }
        );
        assert!(alice.player().units.is_empty());
    }

    #[test]
    fn test_draw_removes_own_units() {
        let alice = army("alice", &[(UnitRank::Cavalry, Location::Asia)]);
        let mut bob = army("bob", &[(UnitRank::Cavalry, Location::Asia)]);
        let rw = war(&alice, &bob);

        let res = handle_war(&mut bob, &rw).unwrap();
        assert_eq!(
            res.outcome,
            WarOutcome::Draw {
                attacker: "alice".into(),
                defender: "bob".into()
            }
        );
        assert_eq!(res.location, Some(Location::Asia));
        assert!(bob.player().units.is_empty());
    }

    #[test]
    fn test_self_war_is_invalid() {
        let mut alice = army("alice", &[(UnitRank::Cavalry, Location::Asia)]);
        let rw = war(&alice, &alice);

        assert!(matches!(handle_war(&mut alice, &rw), Err(GameError::SelfWar(_))));
    }
}
