//! In-Process Message Broker
//!
//! Exchange/queue/binding model with at-least-once delivery:
//! - direct, topic and fanout exchanges
//! - durable queues, and transient queues owned by (and deleted with) one connection
//! - ack, nack with requeue, nack without requeue (dead-lettered when configured)
//! - unacknowledged deliveries go back to their queue when the connection closes
//!
//! All clients of one game share a single `MemoryBroker`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::bus::routing::topic_matches;

/// Identifies one connection to the broker.
pub type ConnectionId = Uuid;

/// Exchange routing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Binding key must equal the routing key.
    Direct,
    /// Binding key is a pattern (`*`, `#`).
    Topic,
    /// Every bound queue gets every message.
    Fanout,
}

/// Queue lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueDurability {
    /// Survives its declaring connection; shareable by many consumers.
    Durable,
    /// Exclusive to the declaring connection and deleted when it closes.
    Transient,
}

/// Options for declaring a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Lifetime.
    pub durability: QueueDurability,
    /// Exchange receiving messages rejected without requeue.
    pub dead_letter_exchange: Option<String>,
}

impl QueueOptions {
    /// Options with no dead-letter exchange.
    pub fn new(durability: QueueDurability) -> Self {
        Self {
            durability,
            dead_letter_exchange: None,
        }
    }

    /// Route discarded messages to `exchange`.
    pub fn with_dead_letter_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self
    }
}

/// A message as stored in a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Broker-assigned id.
    pub id: Uuid,
    /// Exchange it was published to.
    pub exchange: String,
    /// Routing key it was published with.
    pub routing_key: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// Encoded body.
    pub payload: Vec<u8>,
    /// Set once the message has been delivered and requeued.
    pub redelivered: bool,
}

/// Broker errors, mirroring the channel-level failures of a real bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BusError {
    /// Exchange was never declared.
    #[error("exchange not found: {0}")]
    ExchangeNotFound(String),

    /// Queue was never declared or has been deleted.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// Redeclaration with different properties.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Transient queue owned by another connection.
    #[error("queue {0} is exclusive to another connection")]
    ResourceLocked(String),

    /// Operation on a closed connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Publish not confirmed in time.
    #[error("publish not confirmed within {0:?}")]
    ConfirmTimeout(Duration),

    /// Ack/nack for a delivery that is not outstanding.
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    /// The link to a remote bus failed or sent something unreadable.
    #[error("bus link error: {0}")]
    Link(String),
}

struct Binding {
    queue: String,
    key: String,
}

struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<Binding>,
}

impl Exchange {
    fn routes_to(&self, key: &str) -> BTreeSet<String> {
        self.bindings
            .iter()
            .filter(|b| match self.kind {
                ExchangeKind::Direct => b.key == key,
                ExchangeKind::Topic => topic_matches(&b.key, key),
                ExchangeKind::Fanout => true,
            })
            .map(|b| b.queue.clone())
            .collect()
    }
}

struct Queue {
    options: QueueOptions,
    owner: Option<ConnectionId>,
    ready: VecDeque<Message>,
    notify: Arc<Notify>,
}

impl Queue {
    fn push(&mut self, message: Message) {
        self.ready.push_back(message);
        self.notify.notify_one();
    }
}

struct Unacked {
    queue: String,
    connection: ConnectionId,
    message: Message,
}

#[derive(Default)]
struct BrokerState {
    exchanges: BTreeMap<String, Exchange>,
    queues: BTreeMap<String, Queue>,
    unacked: BTreeMap<u64, Unacked>,
    closed: BTreeSet<ConnectionId>,
    next_delivery_tag: u64,
}

impl BrokerState {
    fn ensure_open(&self, connection: ConnectionId) -> Result<(), BusError> {
        if self.closed.contains(&connection) {
            Err(BusError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Copy `message` into every queue bound to `exchange` for its key.
    fn route(&mut self, exchange: &str, message: Message) -> Result<usize, BusError> {
        let targets = self
            .exchanges
            .get(exchange)
            .ok_or_else(|| BusError::ExchangeNotFound(exchange.to_string()))?
            .routes_to(&message.routing_key);

        let mut routed = 0;
        for name in targets {
            if let Some(queue) = self.queues.get_mut(&name) {
                queue.push(message.clone());
                routed += 1;
            }
        }
        Ok(routed)
    }

    fn dead_letter(&mut self, queue: &str, message: Message) {
        let dlx = self
            .queues
            .get(queue)
            .and_then(|q| q.options.dead_letter_exchange.clone());

        let Some(dlx) = dlx else {
            debug!(queue, message_id = %message.id, "dropping rejected message");
            return;
        };

        match self.route(&dlx, message) {
            Ok(routed) => debug!(queue, exchange = %dlx, routed, "dead-lettered message"),
            Err(e) => warn!(queue, error = %e, "dead-letter exchange unavailable, dropping message"),
        }
    }
}

/// A delivery taken from a queue, awaiting ack or nack.
pub(crate) struct Taken {
    pub(crate) tag: u64,
    pub(crate) message: Message,
}

/// Shared in-process broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an exchange. Redeclaring with the same kind is a no-op.
    pub async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        match state.exchanges.get(name) {
            Some(existing) if existing.kind != kind => Err(BusError::PreconditionFailed(format!(
                "exchange {} already declared as {:?}",
                name, existing.kind
            ))),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                debug!(exchange = name, ?kind, "declared exchange");
                Ok(())
            }
        }
    }

    /// Declare a queue on behalf of `connection`.
    pub(crate) async fn declare_queue(
        &self,
        connection: ConnectionId,
        name: &str,
        options: QueueOptions,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        state.ensure_open(connection)?;

        if let Some(existing) = state.queues.get(name) {
            if existing.options.durability != options.durability {
                return Err(BusError::PreconditionFailed(format!(
                    "queue {} already declared as {:?}",
                    name, existing.options.durability
                )));
            }
            if existing.owner.is_some_and(|owner| owner != connection) {
                return Err(BusError::ResourceLocked(name.to_string()));
            }
            return Ok(());
        }

        let owner = match options.durability {
            QueueDurability::Durable => None,
            QueueDurability::Transient => Some(connection),
        };
        state.queues.insert(
            name.to_string(),
            Queue {
                options,
                owner,
                ready: VecDeque::new(),
                notify: Arc::new(Notify::new()),
            },
        );
        debug!(queue = name, "declared queue");
        Ok(())
    }

    /// Declare a queue that is not tied to any client connection.
    pub async fn declare_durable_queue(&self, name: &str, options: QueueOptions) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        if state.queues.contains_key(name) {
            return Ok(());
        }
        state.queues.insert(
            name.to_string(),
            Queue {
                options: QueueOptions {
                    durability: QueueDurability::Durable,
                    ..options
                },
                owner: None,
                ready: VecDeque::new(),
                notify: Arc::new(Notify::new()),
            },
        );
        Ok(())
    }

    /// Bind `queue` to `exchange` with `key`. Duplicate bindings are ignored.
    pub async fn bind_queue(&self, queue: &str, exchange: &str, key: &str) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        if !state.queues.contains_key(queue) {
            return Err(BusError::QueueNotFound(queue.to_string()));
        }
        let exchange_entry = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BusError::ExchangeNotFound(exchange.to_string()))?;

        if !exchange_entry
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.key == key)
        {
            exchange_entry.bindings.push(Binding {
                queue: queue.to_string(),
                key: key.to_string(),
            });
            debug!(queue, exchange, key, "bound queue");
        }
        Ok(())
    }

    /// Publish and return how many queues received the message.
    ///
    /// Unroutable messages are confirmed and dropped.
    pub(crate) async fn publish(
        &self,
        connection: ConnectionId,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        payload: Vec<u8>,
    ) -> Result<usize, BusError> {
        let mut state = self.state.lock().await;
        state.ensure_open(connection)?;

        let message = Message {
            id: Uuid::new_v4(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type: content_type.to_string(),
            payload,
            redelivered: false,
        };
        let routed = state.route(exchange, message)?;
        trace!(exchange, routing_key, routed, "published");
        Ok(routed)
    }

    /// Check that `connection` may consume from `queue`.
    pub(crate) async fn check_consumable(&self, connection: ConnectionId, queue: &str) -> Result<(), BusError> {
        let state = self.state.lock().await;
        state.ensure_open(connection)?;
        match state.queues.get(queue) {
            None => Err(BusError::QueueNotFound(queue.to_string())),
            Some(q) if q.owner.is_some_and(|owner| owner != connection) => {
                Err(BusError::ResourceLocked(queue.to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Wait for the next message on `queue`.
    ///
    /// Returns `None` once the connection is closed or the queue is deleted.
    pub(crate) async fn take(&self, connection: ConnectionId, queue: &str) -> Option<Taken> {
        loop {
            let mut state = self.state.lock().await;
            if state.closed.contains(&connection) {
                return None;
            }
            let entry = state.queues.get_mut(queue)?;

            if let Some(message) = entry.ready.pop_front() {
                state.next_delivery_tag += 1;
                let tag = state.next_delivery_tag;
                state.unacked.insert(
                    tag,
                    Unacked {
                        queue: queue.to_string(),
                        connection,
                        message: message.clone(),
                    },
                );
                return Some(Taken { tag, message });
            }

            // Register interest before releasing the lock so a close or
            // publish in between still wakes us.
            let notify = entry.notify.clone();
            let mut notified = pin!(notify.notified());
            notified.as_mut().enable();
            drop(state);
            notified.await;
        }
    }

    /// Acknowledge a delivery.
    pub(crate) async fn ack(&self, tag: u64) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        state
            .unacked
            .remove(&tag)
            .map(|_| ())
            .ok_or(BusError::UnknownDeliveryTag(tag))
    }

    /// Reject a delivery, either back onto its queue or to the dead-letter exchange.
    pub(crate) async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        let Unacked { queue, mut message, .. } = state
            .unacked
            .remove(&tag)
            .ok_or(BusError::UnknownDeliveryTag(tag))?;

        if requeue {
            message.redelivered = true;
            match state.queues.get_mut(&queue) {
                Some(q) => q.push(message),
                None => debug!(queue = %queue, "queue gone, dropping requeued message"),
            }
        } else {
            state.dead_letter(&queue, message);
        }
        Ok(())
    }

    /// Close a connection: requeue its outstanding deliveries, then drop the
    /// transient queues it owns. Idempotent.
    pub(crate) async fn close_connection(&self, connection: ConnectionId) {
        let mut state = self.state.lock().await;
        if !state.closed.insert(connection) {
            return;
        }

        let tags: Vec<u64> = state
            .unacked
            .iter()
            .filter(|(_, u)| u.connection == connection)
            .map(|(tag, _)| *tag)
            .collect();
        for tag in tags {
            if let Some(Unacked { queue, mut message, .. }) = state.unacked.remove(&tag) {
                message.redelivered = true;
                if let Some(q) = state.queues.get_mut(&queue) {
                    q.ready.push_front(message);
                    q.notify.notify_one();
                }
            }
        }

        let owned: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, q)| q.owner == Some(connection))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &owned {
            state.queues.remove(name);
        }
        for exchange in state.exchanges.values_mut() {
            exchange.bindings.retain(|b| !owned.contains(&b.queue));
        }

        for queue in state.queues.values() {
            queue.notify.notify_waiters();
        }
        debug!(%connection, deleted_queues = owned.len(), "closed connection");
    }

    /// Whether `connection` has been closed.
    pub async fn is_closed(&self, connection: ConnectionId) -> bool {
        self.state.lock().await.closed.contains(&connection)
    }

    /// Messages waiting in `queue`, or `None` if it does not exist.
    pub async fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.state.lock().await.queues.get(queue).map(|q| q.ready.len())
    }

    /// Deliveries handed out but not yet settled.
    pub async fn unacked_count(&self) -> usize {
        self.state.lock().await.unacked.len()
    }
}
