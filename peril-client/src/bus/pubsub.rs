//! Publish and Subscribe Helpers
//!
//! Typed publishing (JSON or bincode) and typed subscriptions that turn a
//! handler's [`AckType`] into the matching ack/nack on the bus.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::bus::broker::{BusError, QueueDurability, QueueOptions};
use crate::bus::channel::{BusChannel, BusConnection, Consumer, Delivery, Publisher};
use crate::bus::routing::EXCHANGE_PERIL_DLX;

/// What to do with a consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckType {
    /// Processed; remove from the queue.
    Ack,
    /// Not processed here; put it back for another attempt.
    NackRequeue,
    /// Never going to succeed; drop (or dead-letter) it.
    NackDiscard,
}

// =============================================================================
// ENCODING
// =============================================================================

/// Wire encoding for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Structured text.
    Json,
    /// Compact binary.
    Bincode,
}

impl Encoding {
    /// MIME type sent alongside the payload.
    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::Json => "application/json",
            Encoding::Bincode => "application/x-bincode",
        }
    }

    /// Serialize a value.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(match self {
            Encoding::Json => serde_json::to_vec(value)?,
            Encoding::Bincode => bincode::serialize(value)?,
        })
    }

    /// Deserialize a value.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(match self {
            Encoding::Json => serde_json::from_slice(bytes)?,
            Encoding::Bincode => bincode::deserialize(bytes)?,
        })
    }
}

/// Encode/decode failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode error.
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
}

// =============================================================================
// PUBLISHING
// =============================================================================

/// A publish that did not go through.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The value could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] CodecError),

    /// The bus rejected the message or did not confirm it.
    #[error("publish to {exchange} with key {routing_key} failed: {source}")]
    Transport {
        /// Target exchange.
        exchange: String,
        /// Routing key used.
        routing_key: String,
        /// Underlying transport error.
        #[source]
        source: BusError,
    },
}

/// Publish `value` as JSON and wait for confirmation.
pub async fn publish_json<T>(
    publisher: &dyn Publisher,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PublishError>
where
    T: Serialize + ?Sized,
{
    publish_encoded(publisher, exchange, routing_key, Encoding::Json, value).await
}

/// Publish `value` as bincode and wait for confirmation.
pub async fn publish_bincode<T>(
    publisher: &dyn Publisher,
    exchange: &str,
    routing_key: &str,
    value: &T,
) -> Result<(), PublishError>
where
    T: Serialize + ?Sized,
{
    publish_encoded(publisher, exchange, routing_key, Encoding::Bincode, value).await
}

async fn publish_encoded<T>(
    publisher: &dyn Publisher,
    exchange: &str,
    routing_key: &str,
    encoding: Encoding,
    value: &T,
) -> Result<(), PublishError>
where
    T: Serialize + ?Sized,
{
    let payload = encoding.encode(value)?;
    publisher
        .publish(exchange, routing_key, encoding.content_type(), payload)
        .await
        .map_err(|source| PublishError::Transport {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            source,
        })
}

// =============================================================================
// SUBSCRIBING
// =============================================================================

/// Declare `queue_name`, bind it to `exchange` with `key`, and return the
/// channel used. Every queue dead-letters to the shared DLX.
pub async fn declare_and_bind(
    connection: &BusConnection,
    exchange: &str,
    queue_name: &str,
    key: &str,
    durability: QueueDurability,
) -> Result<BusChannel, BusError> {
    let channel = connection.create_channel();
    let options = QueueOptions::new(durability).with_dead_letter_exchange(EXCHANGE_PERIL_DLX);
    channel.declare_queue(queue_name, options).await?;
    channel.bind_queue(queue_name, exchange, key).await?;
    Ok(channel)
}

/// A running consumer task.
pub struct Subscription {
    queue: String,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Queue consumed.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Whether the consumer loop has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop consuming. Any delivery in flight stays unacked until the
    /// connection closes.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Subscribe `handler` to JSON messages.
pub async fn subscribe_json<T, F, Fut>(
    connection: &BusConnection,
    exchange: &str,
    queue_name: &str,
    key: &str,
    durability: QueueDurability,
    handler: F,
) -> Result<Subscription, BusError>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    subscribe(connection, exchange, queue_name, key, durability, Encoding::Json, handler).await
}

/// Subscribe `handler` to bincode messages.
pub async fn subscribe_bincode<T, F, Fut>(
    connection: &BusConnection,
    exchange: &str,
    queue_name: &str,
    key: &str,
    durability: QueueDurability,
    handler: F,
) -> Result<Subscription, BusError>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    subscribe(connection, exchange, queue_name, key, durability, Encoding::Bincode, handler).await
}

/// Declare, bind and start a consumer task feeding decoded messages to `handler`.
///
/// Deliveries on one subscription are handled one at a time, in queue order.
pub async fn subscribe<T, F, Fut>(
    connection: &BusConnection,
    exchange: &str,
    queue_name: &str,
    key: &str,
    durability: QueueDurability,
    encoding: Encoding,
    handler: F,
) -> Result<Subscription, BusError>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    let channel = declare_and_bind(connection, exchange, queue_name, key, durability).await?;
    let consumer = channel.consume(queue_name).await?;

    let task = tokio::spawn(run_consumer(consumer, encoding, handler));

    Ok(Subscription {
        queue: queue_name.to_string(),
        task,
    })
}

#[instrument(skip_all, fields(queue = %consumer.queue()))]
async fn run_consumer<T, F, Fut>(mut consumer: Consumer, encoding: Encoding, handler: F)
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    while let Some(delivery) = consumer.next().await {
        let decoded = encoding.decode::<T>(delivery.payload());
        let ack = match decoded {
            Ok(event) => {
                let invocation = handler(event);
                dispatch(invocation).await
            }
            Err(e) => {
                warn!(routing_key = delivery.routing_key(), error = %e, "could not decode message");
                AckType::NackDiscard
            }
        };

        let tag = delivery.tag();
        if let Err(e) = settle(delivery, ack).await {
            warn!(tag, error = %e, "failed to settle delivery");
        }
    }
    debug!("consumer stopped");
}

/// Run one handler invocation in its own task so a panic only costs this delivery.
async fn dispatch<Fut>(invocation: Fut) -> AckType
where
    Fut: Future<Output = AckType> + Send + 'static,
{
    match tokio::spawn(invocation).await {
        Ok(ack) => ack,
        Err(e) => {
            error!(error = %e, "handler failed, discarding delivery");
            AckType::NackDiscard
        }
    }
}

/// Translate a disposition into the bus acknowledgment.
pub async fn settle(delivery: Delivery, ack: AckType) -> Result<(), BusError> {
    match ack {
        AckType::Ack => {
            debug!(tag = delivery.tag(), "ack");
            delivery.ack().await
        }
        AckType::NackRequeue => {
            debug!(tag = delivery.tag(), "nack, requeue");
            delivery.nack(true).await
        }
        AckType::NackDiscard => {
            debug!(tag = delivery.tag(), "nack, discard");
            delivery.nack(false).await
        }
    }
}
