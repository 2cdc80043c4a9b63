//! Routing Names
//!
//! Exchange names, routing key prefixes and topic pattern matching.

/// Direct exchange used for pause broadcasts.
pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";
/// Topic exchange used for moves, wars and game logs.
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";
/// Fanout exchange receiving discarded messages.
pub const EXCHANGE_PERIL_DLX: &str = "peril_dlx";

/// Routing key for pause broadcasts.
pub const PAUSE_KEY: &str = "pause";
/// Prefix for army move keys.
pub const ARMY_MOVES_PREFIX: &str = "army_moves";
/// Prefix for war recognition keys, also the shared war queue name.
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";
/// Prefix for game log keys, also the game log queue name.
pub const GAME_LOG_SLUG: &str = "game_logs";
/// Queue collecting dead letters.
pub const DEAD_LETTER_QUEUE: &str = "peril_dlq";

/// `pause.<username>`
pub fn pause_queue(username: &str) -> String {
    format!("{}.{}", PAUSE_KEY, username)
}

/// `army_moves.<username>`
pub fn army_moves_key(username: &str) -> String {
    format!("{}.{}", ARMY_MOVES_PREFIX, username)
}

/// `army_moves.*`
pub fn army_moves_wildcard() -> String {
    format!("{}.*", ARMY_MOVES_PREFIX)
}

/// `war.<username>`
pub fn war_key(username: &str) -> String {
    format!("{}.{}", WAR_RECOGNITIONS_PREFIX, username)
}

/// `game_logs.<username>`
pub fn game_log_key(username: &str) -> String {
    format!("{}.{}", GAME_LOG_SLUG, username)
}

/// `game_logs.*`
pub fn game_log_wildcard() -> String {
    format!("{}.*", GAME_LOG_SLUG)
}

/// Match a routing key against a topic binding pattern.
///
/// Words are separated by `.`; `*` matches exactly one word, `#` matches
/// zero or more words.
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&k, key_rest)) if word == "*" || word == k => matches_words(rest, key_rest),
            _ => false,
        },
    }
}
