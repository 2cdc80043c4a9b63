//! Pause Signals

use serde::{Deserialize, Serialize};

use crate::game::state::GameState;

/// Broadcast pause/resume signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingState {
    /// `true` pauses, `false` resumes.
    pub is_paused: bool,
}

impl PlayingState {
    /// Pause signal.
    pub const fn paused() -> Self {
        Self { is_paused: true }
    }

    /// Resume signal.
    pub const fn resumed() -> Self {
        Self { is_paused: false }
    }
}

/// Apply a pause signal. Idempotent.
pub fn handle_pause(state: &mut GameState, ps: PlayingState) {
    state.set_paused(ps.is_paused);
}
