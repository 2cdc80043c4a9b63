//! Bus Event Handlers
//!
//! One handler per inbound event type. Each handler:
//! 1. runs the rule evaluator for the event under a single state lock,
//! 2. optionally publishes a follow-up event,
//! 3. returns an [`AckType`] computed by one of the pure decision functions
//!    below from the rule outcome and the follow-up publish status.
//!
//! Handlers never fail: rule rejections, misrouted wars and publish
//! failures are logged and folded into the disposition.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::bus::{AckType, PublishError, Publisher};
use crate::client::console::{Console, PromptOnExit};
use crate::client::outbound::{publish_game_log, publish_war_recognition};
use crate::game::moves::handle_move;
use crate::game::pause::handle_pause;
use crate::game::war::handle_war;
use crate::game::{
    ArmyMove, GameError, GameLog, MoveOutcome, PlayingState, RecognitionOfWar, SharedGameState,
    WarOutcome, WarResolution,
};

/// Everything a handler needs, passed in explicitly.
pub struct HandlerContext {
    /// This client's game state.
    pub state: SharedGameState,
    /// Channel for follow-up publishes.
    pub publisher: Arc<dyn Publisher>,
    /// Operator console.
    pub console: Arc<dyn Console>,
}

impl HandlerContext {
    /// Bundle the handler dependencies.
    pub fn new(
        state: SharedGameState,
        publisher: Arc<dyn Publisher>,
        console: Arc<dyn Console>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            publisher,
            console,
        })
    }
}

/// Handler failures. Logged, never propagated past the handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The rule evaluator found the event inapplicable.
    #[error("event rejected by game rules: {0}")]
    Rule(#[from] GameError),

    /// A follow-up publish failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The event reached a client it does not concern.
    #[error("war between {attacker} and {defender} does not involve {username}")]
    Misrouted {
        /// This client.
        username: String,
        /// Attacker named in the event.
        attacker: String,
        /// Defender named in the event.
        defender: String,
    },
}

// =============================================================================
// DISPOSITION DECISIONS
// =============================================================================

/// Result of the follow-up publish a handler may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Nothing needed publishing.
    NotAttempted,
    /// Bus confirmed the publish.
    Confirmed,
    /// Encode failure, rejection or confirm timeout.
    Failed,
}

impl PublishStatus {
    fn of<E>(result: &Result<(), E>) -> Self {
        match result {
            Ok(()) => PublishStatus::Confirmed,
            Err(_) => PublishStatus::Failed,
        }
    }
}

/// Disposition of an army move.
///
/// `None` means the evaluator rejected the move. A failed war recognition
/// does not requeue the move: the move has already been evaluated here and
/// would only produce the same recognition again.
///
/// `recognition` never changes the result; a publish failure is logged by
/// the caller and the move keeps its disposition.
pub fn move_disposition(outcome: Option<MoveOutcome>, recognition: PublishStatus) -> AckType {
    match (outcome, recognition) {
        (None, _) => AckType::NackDiscard,
        (Some(MoveOutcome::Safe | MoveOutcome::SamePlayer), _) => AckType::Ack,
        (Some(MoveOutcome::MakeWar), _) => AckType::Ack,
    }
}

/// Disposition and log message for a war outcome, before the log publish.
///
/// `None` means the evaluator rejected the war.
pub fn war_disposition(outcome: Option<&WarOutcome>) -> (AckType, String) {
    match outcome {
        Some(WarOutcome::NotInvolved { .. }) => (AckType::NackRequeue, String::new()),
        Some(WarOutcome::NoUnits { .. }) => (AckType::NackDiscard, String::new()),
        Some(
            WarOutcome::OpponentWon { winner, loser } | WarOutcome::YouWon { winner, loser },
        ) => (AckType::Ack, format!("{} won a war against {}", winner, loser)),
        Some(WarOutcome::Draw { attacker, defender }) => (
            AckType::Ack,
            format!("A war between {} and {} resulted in a draw", attacker, defender),
        ),
        None => (AckType::NackDiscard, String::new()),
    }
}

/// A failed game log overrides whatever the war decided: the war is retried
/// until its log record is delivered too.
pub fn with_log_delivery(ack: AckType, log: PublishStatus) -> AckType {
    match log {
        PublishStatus::Failed => AckType::NackRequeue,
        PublishStatus::Confirmed | PublishStatus::NotAttempted => ack,
    }
}

// =============================================================================
// PAUSE
// =============================================================================

/// Apply a pause signal. Always acknowledged.
pub async fn on_pause(ctx: &HandlerContext, ps: PlayingState) -> AckType {
    {
        let mut state = ctx.state.write().await;
        handle_pause(&mut state, ps);
        debug!(username = state.username(), paused = ps.is_paused, "applied pause signal");
    }

    ctx.console.print(if ps.is_paused {
        "==> Pausing game"
    } else {
        "==> Resuming game"
    });
    ctx.console.refresh_prompt();
    AckType::Ack
}

// =============================================================================
// ARMY MOVE
// =============================================================================

/// Evaluate another player's move; declare war when armies meet.
pub async fn on_army_move(ctx: &HandlerContext, mv: ArmyMove) -> AckType {
    let _prompt = PromptOnExit::new(ctx.console.as_ref());

    let evaluated = {
        let state = ctx.state.read().await;
        handle_move(&state, &mv)
            .map(|outcome| (outcome, state.username().to_string(), state.player_snapshot()))
    };

    let (outcome, username, defender) = match evaluated {
        Ok(evaluated) => evaluated,
        Err(e) => {
            let err = HandlerError::from(e);
            warn!(from = %mv.player.username, error = %err, "discarding army move");
            return move_disposition(None, PublishStatus::NotAttempted);
        }
    };

    ctx.console.print(&describe_move(&mv, outcome));

    let recognition = match outcome {
        MoveOutcome::MakeWar => {
            let rw = RecognitionOfWar {
                attacker: mv.player,
                defender,
            };
            let result = publish_war_recognition(ctx.publisher.as_ref(), &username, &rw).await;
            let status = PublishStatus::of(&result);
            match result {
                Ok(()) => info!(attacker = %rw.attacker.username, defender = %username, "declared war"),
                Err(e) => error!(error = %HandlerError::from(e), "error publishing war recognition"),
            }
            status
        }
        MoveOutcome::Safe | MoveOutcome::SamePlayer => PublishStatus::NotAttempted,
    };

    move_disposition(Some(outcome), recognition)
}

fn describe_move(mv: &ArmyMove, outcome: MoveOutcome) -> String {
    let mover = &mv.player.username;
    let mut text = format!(
        "\n==== Move Detected ====\n{} is moving {} unit(s) to {}",
        mover,
        mv.units.len(),
        mv.to_location
    );
    for unit in &mv.units {
        text.push_str(&format!("\n* {}", unit.rank));
    }
    match outcome {
        MoveOutcome::MakeWar => text.push_str(&format!(
            "\nYou have units in {}! You are at war with {}!",
            mv.to_location, mover
        )),
        MoveOutcome::Safe => text.push_str(&format!("\nYou are safe from {}'s units.", mover)),
        MoveOutcome::SamePlayer => {}
    }
    text.push_str("\n------------------------");
    text
}

// =============================================================================
// WAR
// =============================================================================

/// Resolve a war, then record the result in the game log.
pub async fn on_recognition_of_war(ctx: &HandlerContext, rw: RecognitionOfWar) -> AckType {
    let (resolution, username) = {
        let mut state = ctx.state.write().await;
        (handle_war(&mut state, &rw), state.username().to_string())
    };

    let outcome = match &resolution {
        Ok(res) => {
            if let WarOutcome::NotInvolved { attacker, defender } = &res.outcome {
                let err = HandlerError::Misrouted {
                    username: username.clone(),
                    attacker: attacker.clone(),
                    defender: defender.clone(),
                };
                debug!(error = %err, "requeueing war for its participants");
            } else {
                ctx.console.print(&describe_war(&rw, res));
            }
            Some(&res.outcome)
        }
        Err(e) => {
            warn!(attacker = %rw.attacker.username, defender = %rw.defender.username, error = %e, "discarding war recognition");
            None
        }
    };
    ctx.console.refresh_prompt();

    let (ack, message) = war_disposition(outcome);

    let log = GameLog::new(username, message);
    let result = publish_game_log(ctx.publisher.as_ref(), &log).await;
    let status = PublishStatus::of(&result);
    if let Err(e) = result {
        error!(error = %HandlerError::from(e), ?ack, "error publishing game log, requeueing war");
    }

    with_log_delivery(ack, status)
}

fn describe_war(rw: &RecognitionOfWar, res: &WarResolution) -> String {
    let mut text = format!(
        "\n==== War Declared ====\n{} has declared war on {}!",
        rw.attacker.username, rw.defender.username
    );
    match (&res.outcome, res.location) {
        (WarOutcome::NoUnits { .. }, _) => {
            text.push_str("\nError! No units are in the same location. No war will be fought.")
        }
        (WarOutcome::OpponentWon { winner, .. }, Some(location)) => text.push_str(&format!(
            "\n{} has won the war!\nYou have lost the war! Your {} unit(s) in {} have been killed.",
            winner, res.units_lost, location
        )),
        (WarOutcome::YouWon { winner, .. }, _) => {
            text.push_str(&format!("\n{} has won the war!\nYou have won the war!", winner))
        }
        (WarOutcome::Draw { .. }, Some(location)) => text.push_str(&format!(
            "\nThe war ended in a draw!\nYour {} unit(s) in {} have been killed.",
            res.units_lost, location
        )),
        _ => {}
    }
    text.push_str("\n------------------------");
    text
}

// =============================================================================
// SUBSCRIPTION ADAPTERS
// =============================================================================

/// Pause handler in the shape `subscribe` expects.
pub fn handler_pause(
    ctx: Arc<HandlerContext>,
) -> impl Fn(PlayingState) -> BoxFuture<'static, AckType> + Send + Sync + 'static {
    move |ps| {
        let ctx = ctx.clone();
        Box::pin(async move { on_pause(&ctx, ps).await })
    }
}

/// Move handler in the shape `subscribe` expects.
pub fn handler_move(
    ctx: Arc<HandlerContext>,
) -> impl Fn(ArmyMove) -> BoxFuture<'static, AckType> + Send + Sync + 'static {
    move |mv| {
        let ctx = ctx.clone();
        Box::pin(async move { on_army_move(&ctx, mv).await })
    }
}

/// War handler in the shape `subscribe` expects.
pub fn handler_war(
    ctx: Arc<HandlerContext>,
) -> impl Fn(RecognitionOfWar) -> BoxFuture<'static, AckType> + Send + Sync + 'static {
    move |rw| {
        let ctx = ctx.clone();
        Box::pin(async move { on_recognition_of_war(&ctx, rw).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::routing::EXCHANGE_PERIL_TOPIC;
    use crate::client::testing::{RecordingConsole, RecordingPublisher};
    use crate::game::{GameState, Location, UnitRank};

    use proptest::prelude::*;

    struct Harness {
        ctx: Arc<HandlerContext>,
        publisher: Arc<RecordingPublisher>,
        console: Arc<RecordingConsole>,
    }

    fn harness(state: GameState, publisher: RecordingPublisher) -> Harness {
        let publisher = Arc::new(publisher);
        let console = Arc::new(RecordingConsole::default());
        let ctx = HandlerContext::new(state.shared(), publisher.clone(), console.clone());
        Harness {
            ctx,
            publisher,
            console,
        }
    }

    fn army(username: &str, units: &[(UnitRank, Location)]) -> GameState {
        let mut gs = GameState::new(username);
        for (rank, loc) in units {
            gs.add_unit(*rank, *loc);
        }
        gs
    }

    fn move_of(gs: &GameState, to_location: Location) -> ArmyMove {
        ArmyMove {
            player: gs.player_snapshot(),
            units: gs.player().units.values().cloned().collect(),
            to_location,
        }
    }

    // -------------------------------------------------------------------------
    // decisions
    // -------------------------------------------------------------------------

    #[test]
    fn test_move_disposition_table() {
        use PublishStatus::*;
        for status in [NotAttempted, Confirmed, Failed] {
            assert_eq!(move_disposition(Some(MoveOutcome::Safe), status), AckType::Ack);
            assert_eq!(move_disposition(Some(MoveOutcome::SamePlayer), status), AckType::Ack);
            assert_eq!(move_disposition(Some(MoveOutcome::MakeWar), status), AckType::Ack);
            assert_eq!(move_disposition(None, status), AckType::NackDiscard);
        }
    }

    #[test]
    fn test_war_disposition_table() {
        let names = |a: &str, b: &str| (a.to_string(), b.to_string());
        let (a, d) = names("alice", "bob");

        assert_eq!(
            war_disposition(Some(&WarOutcome::NotInvolved { attacker: a.clone(), defender: d.clone() })),
            (AckType::NackRequeue, String::new())
        );
        assert_eq!(
            war_disposition(Some(&WarOutcome::NoUnits { attacker: a.clone(), defender: d.clone() })),
            (AckType::NackDiscard, String::new())
        );
        assert_eq!(
            war_disposition(Some(&WarOutcome::OpponentWon { winner: a.clone(), loser: d.clone() })),
            (AckType::Ack, "alice won a war against bob".to_string())
        );
        assert_eq!(
            war_disposition(Some(&WarOutcome::YouWon { winner: d.clone(), loser: a.clone() })),
            (AckType::Ack, "bob won a war against alice".to_string())
        );
        assert_eq!(
            war_disposition(Some(&WarOutcome::Draw { attacker: a, defender: d })),
            (
                AckType::Ack,
                "A war between alice and bob resulted in a draw".to_string()
            )
        );
        assert_eq!(war_disposition(None), (AckType::NackDiscard, String::new()));
    }

    #[test]
    fn test_failed_log_always_requeues() {
        for ack in [AckType::Ack, AckType::NackRequeue, AckType::NackDiscard] {
            assert_eq!(with_log_delivery(ack, PublishStatus::Failed), AckType::NackRequeue);
            assert_eq!(with_log_delivery(ack, PublishStatus::Confirmed), ack);
        }
    }

    // -------------------------------------------------------------------------
    // pause
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_pause_twice_is_idempotent() {
        let h = harness(GameState::new("alice"), RecordingPublisher::default());

        assert_eq!(on_pause(&h.ctx, PlayingState::paused()).await, AckType::Ack);
        assert_eq!(on_pause(&h.ctx, PlayingState::paused()).await, AckType::Ack);

        assert!(h.ctx.state.read().await.is_paused());
        assert!(h.publisher.published().is_empty());
        assert_eq!(h.console.refreshes(), 2);
    }

    proptest! {
        #[test]
        fn prop_pause_flag_follows_last_signal(signals in prop::collection::vec(any::<bool>(), 1..16)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let h = harness(GameState::new("alice"), RecordingPublisher::default());

            for &is_paused in &signals {
                let ack = rt.block_on(on_pause(&h.ctx, PlayingState { is_paused }));
                prop_assert_eq!(ack, AckType::Ack);
                // Applying the same signal again changes nothing.
                let once = rt.block_on(async { h.ctx.state.read().await.is_paused() });
                rt.block_on(on_pause(&h.ctx, PlayingState { is_paused }));
                let twice = rt.block_on(async { h.ctx.state.read().await.is_paused() });
                prop_assert_eq!(once, twice);
            }

            let last = *signals.last().unwrap();
            prop_assert_eq!(rt.block_on(async { h.ctx.state.read().await.is_paused() }), last);
        }
    }

    // -------------------------------------------------------------------------
    // army moves
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_safe_move_acks_without_publishing() {
        let alice = army("alice", &[(UnitRank::Infantry, Location::Asia)]);
        let h = harness(
            army("bob", &[(UnitRank::Infantry, Location::Europe)]),
            RecordingPublisher::default(),
        );

        assert_eq!(on_army_move(&h.ctx, move_of(&alice, Location::Asia)).await, AckType::Ack);
        assert!(h.publisher.published().is_empty());
        assert!(h.console.output().contains("You are safe from alice's units."));
        assert_eq!(h.console.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_own_move_acks_without_publishing() {
        let alice = army("alice", &[(UnitRank::Infantry, Location::Europe)]);
        let h = harness(alice.clone(), RecordingPublisher::default());

        assert_eq!(on_army_move(&h.ctx, move_of(&alice, Location::Europe)).await, AckType::Ack);
        assert!(h.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_move_into_our_territory_declares_war() {
        let alice = army("alice", &[(UnitRank::Cavalry, Location::Europe)]);
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let h = harness(bob.clone(), RecordingPublisher::default());

        let ack = on_army_move(&h.ctx, move_of(&alice, Location::Europe)).await;
        assert_eq!(ack, AckType::Ack);

        let sent = h.publisher.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].exchange, EXCHANGE_PERIL_TOPIC);
        assert_eq!(sent[0].routing_key, "war.bob");

        let rw: RecognitionOfWar = sent[0].decode();
        assert_eq!(rw.attacker, alice.player_snapshot());
        assert_eq!(rw.defender, bob.player_snapshot());
        assert_eq!(h.console.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_war_declaration_failure_still_acks() {
        let alice = army("alice", &[(UnitRank::Cavalry, Location::Europe)]);
        let h = harness(
            army("bob", &[(UnitRank::Infantry, Location::Europe)]),
            RecordingPublisher::failing(),
        );

        let ack = on_army_move(&h.ctx, move_of(&alice, Location::Europe)).await;
        assert_eq!(ack, AckType::Ack);
        assert_eq!(h.publisher.published().len(), 1);
        assert_eq!(h.console.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_empty_move_is_discarded() {
        let h = harness(GameState::new("bob"), RecordingPublisher::default());
        let mv = ArmyMove {
            player: GameState::new("alice").player_snapshot(),
            units: vec![],
            to_location: Location::Europe,
        };

        assert_eq!(on_army_move(&h.ctx, mv).await, AckType::NackDiscard);
        assert!(h.publisher.published().is_empty());
        assert_eq!(h.console.refreshes(), 1);
    }

    // -------------------------------------------------------------------------
    // wars
    // -------------------------------------------------------------------------

    fn recognition(attacker: &GameState, defender: &GameState) -> RecognitionOfWar {
        RecognitionOfWar {
            attacker: attacker.player_snapshot(),
            defender: defender.player_snapshot(),
        }
    }

    #[tokio::test]
    async fn test_war_won_is_logged_and_acked() {
        let alice = army("alice", &[(UnitRank::Artillery, Location::Europe)]);
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let h = harness(bob.clone(), RecordingPublisher::default());

        let ack = on_recognition_of_war(&h.ctx, recognition(&alice, &bob)).await;
        assert_eq!(ack, AckType::Ack);

        let sent = h.publisher.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].routing_key, "game_logs.bob");
        let log: GameLog = sent[0].decode();
        assert_eq!(log.username, "bob");
        assert_eq!(log.message, "alice won a war against bob");

        // Defender lost: its units in europe are gone.
        assert!(h.ctx.state.read().await.player().units.is_empty());
        assert_eq!(h.console.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_war_not_involving_us_is_requeued() {
        let alice = army("alice", &[(UnitRank::Artillery, Location::Europe)]);
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let h = harness(
            army("carol", &[(UnitRank::Infantry, Location::Europe)]),
            RecordingPublisher::default(),
        );

        let ack = on_recognition_of_war(&h.ctx, recognition(&alice, &bob)).await;
        assert_eq!(ack, AckType::NackRequeue);

        let log: GameLog = h.publisher.published()[0].decode();
        assert_eq!(log.message, "");
        assert_eq!(h.ctx.state.read().await.player().units.len(), 1);
    }

    #[tokio::test]
    async fn test_war_without_shared_location_is_discarded() {
        let alice = army("alice", &[(UnitRank::Artillery, Location::Asia)]);
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let h = harness(bob.clone(), RecordingPublisher::default());

        let ack = on_recognition_of_war(&h.ctx, recognition(&alice, &bob)).await;
        assert_eq!(ack, AckType::NackDiscard);

        // The log is still published, with no message.
        let sent = h.publisher.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].decode::<GameLog>().message, "");
    }

    #[tokio::test]
    async fn test_draw_with_failed_log_is_requeued() {
        let alice = army("alice", &[(UnitRank::Cavalry, Location::Asia)]);
        let bob = army("bob", &[(UnitRank::Cavalry, Location::Asia)]);
        let h = harness(bob.clone(), RecordingPublisher::failing());

        let ack = on_recognition_of_war(&h.ctx, recognition(&alice, &bob)).await;
        assert_eq!(ack, AckType::NackRequeue);

        let log: GameLog = h.publisher.published()[0].decode();
        assert_eq!(log.message, "A war between alice and bob resulted in a draw");
        // The draw itself was applied before the log failed.
        assert!(h.ctx.state.read().await.player().units.is_empty());
    }

    #[tokio::test]
    async fn test_failed_log_requeues_every_outcome() {
        let alice = army("alice", &[(UnitRank::Artillery, Location::Europe)]);
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let far_away = army("bob", &[(UnitRank::Infantry, Location::Australia)]);

        let cases = [
            (alice.clone(), recognition(&alice, &bob)),
            (army("carol", &[]), recognition(&alice, &bob)),
            (far_away.clone(), recognition(&alice, &far_away)),
            (alice.clone(), recognition(&alice, &alice)),
        ];

        for (me, rw) in cases {
            let h = harness(me, RecordingPublisher::failing());
            assert_eq!(on_recognition_of_war(&h.ctx, rw).await, AckType::NackRequeue);
        }
    }

    #[tokio::test]
    async fn test_self_war_is_discarded() {
        let alice = army("alice", &[(UnitRank::Artillery, Location::Europe)]);
        let h = harness(alice.clone(), RecordingPublisher::default());

        let ack = on_recognition_of_war(&h.ctx, recognition(&alice, &alice)).await;
        assert_eq!(ack, AckType::NackDiscard);
    }

    /// Notes how many prompt redraws the console had seen at each publish.
    struct PromptAtPublish {
        console: Arc<RecordingConsole>,
        seen: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl Publisher for PromptAtPublish {
        async fn publish(&self, _: &str, _: &str, _: &str, _: Vec<u8>) -> Result<(), crate::bus::BusError> {
            self.seen.lock().unwrap().push(self.console.refreshes());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_war_prompt_is_redrawn_before_log_publish() {
        let alice = army("alice", &[(UnitRank::Artillery, Location::Europe)]);
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let console = Arc::new(RecordingConsole::default());
        let publisher = Arc::new(PromptAtPublish {
            console: console.clone(),
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let ctx = HandlerContext::new(bob.clone().shared(), publisher.clone(), console.clone());

        assert_eq!(on_recognition_of_war(&ctx, recognition(&alice, &bob)).await, AckType::Ack);
        assert_eq!(*publisher.seen.lock().unwrap(), vec![1]);
        assert_eq!(console.refreshes(), 1);
    }

    struct ExplodingPublisher;

    #[async_trait::async_trait]
    impl Publisher for ExplodingPublisher {
        async fn publish(&self, _: &str, _: &str, _: &str, _: Vec<u8>) -> Result<(), crate::bus::BusError> {
            panic!("publisher exploded");
        }
    }

    #[tokio::test]
    async fn test_move_prompt_survives_panicking_publisher() {
        use crate::bus::routing::{army_moves_key, army_moves_wildcard, DEAD_LETTER_QUEUE};
        use crate::bus::{declare_peril_topology, publish_json, subscribe_json, MemoryBroker, QueueDurability};
        use std::time::Duration;

        let broker = MemoryBroker::new();
        declare_peril_topology(&broker).await.unwrap();
        let conn = broker.connect(Duration::from_secs(1));

        let console = Arc::new(RecordingConsole::default());
        let bob = army("bob", &[(UnitRank::Infantry, Location::Europe)]);
        let ctx = HandlerContext::new(bob.shared(), Arc::new(ExplodingPublisher), console.clone());
        let sub = subscribe_json(
            &conn,
            EXCHANGE_PERIL_TOPIC,
            "army_moves.bob",
            &army_moves_wildcard(),
            QueueDurability::Transient,
            handler_move(ctx),
        )
        .await
        .unwrap();

        let alice = army("alice", &[(UnitRank::Cavalry, Location::Europe)]);
        let ch = conn.create_channel();
        publish_json(&ch, EXCHANGE_PERIL_TOPIC, &army_moves_key("alice"), &move_of(&alice, Location::Europe))
            .await
            .unwrap();

        for _ in 0..200 {
            if broker.queue_depth(DEAD_LETTER_QUEUE).await == Some(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broker.queue_depth(DEAD_LETTER_QUEUE).await, Some(1));
        assert_eq!(console.refreshes(), 1);
        assert!(!sub.is_finished());

        // The consumer keeps going after the panic.
        publish_json(&ch, EXCHANGE_PERIL_TOPIC, &army_moves_key("alice"), &move_of(&alice, Location::Asia))
            .await
            .unwrap();
        for _ in 0..200 {
            if console.refreshes() == 2 && broker.unacked_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(console.refreshes(), 2);
        assert_eq!(broker.queue_depth("army_moves.bob").await, Some(0));
        assert_eq!(broker.unacked_count().await, 0);
        sub.abort();
    }

    #[tokio::test]
    async fn test_adapters_drive_the_same_handlers() {
        let alice = army("alice", &[(UnitRank::Cavalry, Location::Europe)]);
        let h = harness(
            army("bob", &[(UnitRank::Infantry, Location::Europe)]),
            RecordingPublisher::default(),
        );

        let pause = handler_pause(h.ctx.clone());
        let moves = handler_move(h.ctx.clone());
        let wars = handler_war(h.ctx.clone());

        assert_eq!(pause(PlayingState::paused()).await, AckType::Ack);
        assert_eq!(moves(move_of(&alice, Location::Europe)).await, AckType::Ack);
        let rw: RecognitionOfWar = h.publisher.published()[0].decode();
        assert_eq!(wars(rw).await, AckType::Ack);
    }
}
