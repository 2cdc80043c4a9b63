//! Bus Layer
//!
//! Everything between the handlers and the message bus: routing names, the
//! broker, connections/channels, the WebSocket link that lets processes
//! share one broker, and typed publish/subscribe. Handlers depend on the
//! [`Publisher`] trait and [`AckType`] only.

pub mod routing;
pub mod broker;
pub mod channel;
pub mod wire;
pub mod link;
mod remote;
pub mod pubsub;

pub use broker::{BusError, ExchangeKind, MemoryBroker, Message, QueueDurability, QueueOptions};
pub use channel::{BusChannel, BusConnection, Consumer, Delivery, Publisher};
pub use link::BusServer;
pub use pubsub::{
    declare_and_bind, publish_bincode, publish_json, subscribe, subscribe_bincode, subscribe_json,
    AckType, CodecError, Encoding, PublishError, Subscription,
};

use crate::bus::routing::{
    game_log_wildcard, DEAD_LETTER_QUEUE, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_DLX,
    EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG,
};

/// Declare the exchanges every client expects, plus the durable queues whose
/// consumers live outside this client (game logs, dead letters).
pub async fn declare_peril_topology(broker: &MemoryBroker) -> Result<(), BusError> {
    broker.declare_exchange(EXCHANGE_PERIL_DIRECT, ExchangeKind::Direct).await?;
    broker.declare_exchange(EXCHANGE_PERIL_TOPIC, ExchangeKind::Topic).await?;
    broker.declare_exchange(EXCHANGE_PERIL_DLX, ExchangeKind::Fanout).await?;

    broker
        .declare_durable_queue(DEAD_LETTER_QUEUE, QueueOptions::new(QueueDurability::Durable))
        .await?;
    broker.bind_queue(DEAD_LETTER_QUEUE, EXCHANGE_PERIL_DLX, "").await?;

    broker
        .declare_durable_queue(
            GAME_LOG_SLUG,
            QueueOptions::new(QueueDurability::Durable).with_dead_letter_exchange(EXCHANGE_PERIL_DLX),
        )
        .await?;
    broker
        .bind_queue(GAME_LOG_SLUG, EXCHANGE_PERIL_TOPIC, &game_log_wildcard())
        .await?;

    Ok(())
}
