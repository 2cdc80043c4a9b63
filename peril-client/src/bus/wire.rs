//! Bus Link Frames
//!
//! Wire format between a remote client and the bus server over WebSocket.
//! Every frame is one JSON text message. Requests carry an `id` that the
//! server echoes in its `done`/`failed` reply; deliveries are unsolicited.

use serde::{Deserialize, Serialize};

use crate::bus::broker::{BusError, Message, QueueOptions};

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Requests sent from a client to the bus server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkRequest {
    /// Declare a queue owned by this link's connection.
    DeclareQueue {
        /// Request id.
        id: u64,
        /// Queue name.
        queue: String,
        /// Queue options.
        options: QueueOptions,
    },

    /// Bind a queue to an exchange.
    BindQueue {
        /// Request id.
        id: u64,
        /// Queue name.
        queue: String,
        /// Exchange name.
        exchange: String,
        /// Binding key.
        key: String,
    },

    /// Publish a message; `done` is the confirmation.
    Publish {
        /// Request id.
        id: u64,
        /// Exchange name.
        exchange: String,
        /// Routing key.
        routing_key: String,
        /// MIME type of the payload.
        content_type: String,
        /// Encoded body.
        payload: Vec<u8>,
    },

    /// Start receiving deliveries from a queue.
    Consume {
        /// Request id.
        id: u64,
        /// Queue name.
        queue: String,
    },

    /// Acknowledge a delivery.
    Ack {
        /// Request id.
        id: u64,
        /// Delivery tag.
        tag: u64,
    },

    /// Reject a delivery.
    Nack {
        /// Request id.
        id: u64,
        /// Delivery tag.
        tag: u64,
        /// Put the message back instead of dead-lettering it.
        requeue: bool,
    },
}

impl LinkRequest {
    /// Request id.
    pub fn id(&self) -> u64 {
        match self {
            LinkRequest::DeclareQueue { id, .. }
            | LinkRequest::BindQueue { id, .. }
            | LinkRequest::Publish { id, .. }
            | LinkRequest::Consume { id, .. }
            | LinkRequest::Ack { id, .. }
            | LinkRequest::Nack { id, .. } => *id,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Frames sent from the bus server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkReply {
    /// Request succeeded.
    Done {
        /// Request id.
        id: u64,
    },

    /// Request failed.
    Failed {
        /// Request id.
        id: u64,
        /// What went wrong.
        error: BusError,
    },

    /// A message from a queue this client consumes.
    Delivery {
        /// Queue it came from.
        queue: String,
        /// Tag to ack or nack with.
        tag: u64,
        /// The message.
        message: Message,
    },
}

impl LinkReply {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
