//! Connections, Channels and Deliveries
//!
//! The client-facing side of the bus: a connection owns its transient
//! queues, a channel publishes with confirmation and consumes, and every
//! consumed message comes back as a [`Delivery`] that must be settled.
//!
//! A connection either talks to a [`MemoryBroker`] in this process or to a
//! bus server over WebSocket. Everything above this module sees the same
//! types either way.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::bus::broker::{BusError, ConnectionId, MemoryBroker, Message, QueueOptions};
use crate::bus::remote::{RemoteInbox, RemoteLink};

/// Publish-with-confirmation capability.
///
/// Handlers only ever see this trait, so tests can substitute a recorder
/// or a publisher that always fails.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` and wait for the bus to confirm it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        payload: Vec<u8>,
    ) -> Result<(), BusError>;
}

impl MemoryBroker {
    /// Open a connection whose publishes must confirm within `confirm_timeout`.
    pub fn connect(&self, confirm_timeout: Duration) -> BusConnection {
        let id = Uuid::new_v4();
        debug!(connection = %id, "opened connection");
        BusConnection {
            id,
            link: Link::Memory {
                broker: self.clone(),
                connection: id,
            },
            confirm_timeout,
        }
    }
}

#[derive(Clone)]
enum Link {
    Memory {
        broker: MemoryBroker,
        connection: ConnectionId,
    },
    Remote(Arc<RemoteLink>),
}

impl Link {
    async fn ack(&self, tag: u64) -> Result<(), BusError> {
        match self {
            Link::Memory { broker, .. } => broker.ack(tag).await,
            Link::Remote(remote) => remote.ack(tag).await,
        }
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BusError> {
        match self {
            Link::Memory { broker, .. } => broker.nack(tag, requeue).await,
            Link::Remote(remote) => remote.nack(tag, requeue).await,
        }
    }
}

/// One client's connection to the bus.
pub struct BusConnection {
    id: ConnectionId,
    link: Link,
    confirm_timeout: Duration,
}

impl BusConnection {
    /// Connect to a bus server at `url` (`ws://host:port`).
    pub async fn open(url: &str, confirm_timeout: Duration) -> Result<Self, BusError> {
        let remote = RemoteLink::connect(url).await?;
        let id = Uuid::new_v4();
        debug!(connection = %id, url, "opened remote connection");
        Ok(Self {
            id,
            link: Link::Remote(Arc::new(remote)),
            confirm_timeout,
        })
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Open a channel on this connection.
    pub fn create_channel(&self) -> BusChannel {
        BusChannel {
            link: self.link.clone(),
            confirm_timeout: self.confirm_timeout,
        }
    }

    /// Close the connection. Outstanding deliveries are requeued and
    /// transient queues are deleted.
    pub async fn close(&self) {
        match &self.link {
            Link::Memory { broker, connection } => broker.close_connection(*connection).await,
            Link::Remote(remote) => remote.close().await,
        }
    }

    /// Whether [`close`](Self::close) has run or the link dropped.
    pub async fn is_closed(&self) -> bool {
        match &self.link {
            Link::Memory { broker, connection } => broker.is_closed(*connection).await,
            Link::Remote(remote) => remote.is_closed().await,
        }
    }
}

/// A channel: queue declaration, publishing and consuming.
#[derive(Clone)]
pub struct BusChannel {
    link: Link,
    confirm_timeout: Duration,
}

impl BusChannel {
    /// Declare a queue.
    pub async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<(), BusError> {
        match &self.link {
            Link::Memory { broker, connection } => broker.declare_queue(*connection, name, options).await,
            Link::Remote(remote) => remote.declare_queue(name, options).await,
        }
    }

    /// Bind a queue to an exchange.
    pub async fn bind_queue(&self, queue: &str, exchange: &str, key: &str) -> Result<(), BusError> {
        match &self.link {
            Link::Memory { broker, .. } => broker.bind_queue(queue, exchange, key).await,
            Link::Remote(remote) => remote.bind_queue(queue, exchange, key).await,
        }
    }

    /// Start consuming from `queue`.
    pub async fn consume(&self, queue: &str) -> Result<Consumer, BusError> {
        let source = match &self.link {
            Link::Memory { broker, connection } => {
                broker.check_consumable(*connection, queue).await?;
                Source::Memory {
                    broker: broker.clone(),
                    connection: *connection,
                }
            }
            Link::Remote(remote) => Source::Remote(remote.consume(queue).await?),
        };
        Ok(Consumer {
            link: self.link.clone(),
            queue: queue.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Publisher for BusChannel {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        let confirm = async {
            match &self.link {
                Link::Memory { broker, connection } => broker
                    .publish(*connection, exchange, routing_key, content_type, payload)
                    .await
                    .map(|_| ()),
                Link::Remote(remote) => remote.publish(exchange, routing_key, content_type, payload).await,
            }
        };

        match tokio::time::timeout(self.confirm_timeout, confirm).await {
            Ok(result) => result,
            Err(_) => Err(BusError::ConfirmTimeout(self.confirm_timeout)),
        }
    }
}

enum Source {
    Memory {
        broker: MemoryBroker,
        connection: ConnectionId,
    },
    Remote(RemoteInbox),
}

/// Stream of deliveries from one queue.
pub struct Consumer {
    link: Link,
    queue: String,
    source: Source,
}

impl Consumer {
    /// Queue being consumed.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Wait for the next delivery. `None` once the connection is closed.
    pub async fn next(&mut self) -> Option<Delivery> {
        let (tag, message) = match &mut self.source {
            Source::Memory { broker, connection } => {
                let taken = broker.take(*connection, &self.queue).await?;
                (taken.tag, taken.message)
            }
            Source::Remote(inbox) => inbox.recv().await?,
        };
        Some(Delivery {
            link: self.link.clone(),
            tag,
            message,
        })
    }
}

/// A consumed message awaiting ack or nack.
pub struct Delivery {
    link: Link,
    tag: u64,
    message: Message,
}

impl Delivery {
    /// Delivery tag.
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// The message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Encoded body.
    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    /// Routing key the message was published with.
    pub fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    /// Whether this message was delivered before.
    pub fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    /// Acknowledge.
    pub async fn ack(self) -> Result<(), BusError> {
        self.link.ack(self.tag).await
    }

    /// Reject; `requeue` puts the message back, otherwise it is dead-lettered.
    pub async fn nack(self, requeue: bool) -> Result<(), BusError> {
        self.link.nack(self.tag, requeue).await
    }
}
