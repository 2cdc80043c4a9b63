//! Outbound Messages
//!
//! The three things this client ever publishes, each with its exchange,
//! routing key and encoding fixed in one place.

use crate::bus::routing::{army_moves_key, game_log_key, war_key, EXCHANGE_PERIL_TOPIC};
use crate::bus::{publish_bincode, publish_json, PublishError, Publisher};
use crate::game::{ArmyMove, GameLog, RecognitionOfWar};

/// Publish our own move to every player: `army_moves.<mover>`, JSON.
pub async fn publish_army_move(publisher: &dyn Publisher, mv: &ArmyMove) -> Result<(), PublishError> {
    let key = army_moves_key(&mv.player.username);
    publish_json(publisher, EXCHANGE_PERIL_TOPIC, &key, mv).await
}

/// Publish a war recognition keyed by the recognising player: `war.<username>`, JSON.
pub async fn publish_war_recognition(
    publisher: &dyn Publisher,
    username: &str,
    rw: &RecognitionOfWar,
) -> Result<(), PublishError> {
    publish_json(publisher, EXCHANGE_PERIL_TOPIC, &war_key(username), rw).await
}

/// Publish a game log record: `game_logs.<username>`, bincode.
pub async fn publish_game_log(publisher: &dyn Publisher, log: &GameLog) -> Result<(), PublishError> {
    let key = game_log_key(&log.username);
    publish_bincode(publisher, EXCHANGE_PERIL_TOPIC, &key, log).await
}
