//! Game Log Records
//!
//! Append-only facts published for whoever is collecting logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One log line attributed to a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLog {
    /// Player that produced the record.
    pub username: String,
    /// Free text; may be empty.
    pub message: String,
    /// When the record was produced.
    pub current_time: DateTime<Utc>,
}

impl GameLog {
    /// New record stamped with the current time.
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
            current_time: Utc::now(),
        }
    }
}
