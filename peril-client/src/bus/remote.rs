//! Remote Bus Link
//!
//! Client side of the WebSocket link to a [`BusServer`](crate::bus::link::BusServer).
//! One writer task drains outgoing requests, one reader task resolves
//! pending requests and routes deliveries to their consumer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

use crate::bus::broker::{BusError, Message, QueueOptions};
use crate::bus::wire::{LinkReply, LinkRequest};

type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Inbox of one remote consumer.
pub(crate) type RemoteInbox = mpsc::UnboundedReceiver<(u64, Message)>;

#[derive(Default)]
struct LinkState {
    pending: BTreeMap<u64, oneshot::Sender<Result<(), BusError>>>,
    consumers: BTreeMap<String, mpsc::UnboundedSender<(u64, Message)>>,
    closed: bool,
}

impl LinkState {
    /// Fail everything outstanding. Pending requests see their sender
    /// dropped; consumers see their inbox end.
    fn shut(&mut self) {
        self.closed = true;
        self.pending.clear();
        self.consumers.clear();
    }
}

/// An open link to a bus server.
pub(crate) struct RemoteLink {
    outbound: mpsc::UnboundedSender<LinkRequest>,
    state: Arc<Mutex<LinkState>>,
    next_id: AtomicU64,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl RemoteLink {
    /// Connect to `url` (`ws://host:port`).
    pub(crate) async fn connect(url: &str) -> Result<Self, BusError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| BusError::Link(format!("connect to {}: {}", url, e)))?;
        let (mut ws_sender, ws_receiver) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<LinkRequest>();
        let state = Arc::new(Mutex::new(LinkState::default()));

        let writer = tokio::spawn(async move {
            while let Some(request) = outbound_rx.recv().await {
                let text = match request.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!(error = %e, "failed to serialize link request");
                        continue;
                    }
                };
                if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        let reader = tokio::spawn(read_replies(ws_receiver, state.clone()));

        debug!(url, "bus link established");
        Ok(Self {
            outbound,
            state,
            next_id: AtomicU64::new(1),
            writer,
            reader,
        })
    }

    /// Send a request and wait for the server's answer.
    async fn request(&self, build: impl FnOnce(u64) -> LinkRequest) -> Result<(), BusError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(BusError::ConnectionClosed);
            }
            state.pending.insert(id, tx);
        }

        if self.outbound.send(build(id)).is_err() {
            self.state.lock().await.pending.remove(&id);
            return Err(BusError::ConnectionClosed);
        }

        rx.await.map_err(|_| BusError::ConnectionClosed)?
    }

    pub(crate) async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<(), BusError> {
        self.request(|id| LinkRequest::DeclareQueue {
            id,
            queue: queue.to_string(),
            options,
        })
        .await
    }

    pub(crate) async fn bind_queue(&self, queue: &str, exchange: &str, key: &str) -> Result<(), BusError> {
        self.request(|id| LinkRequest::BindQueue {
            id,
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            key: key.to_string(),
        })
        .await
    }

    pub(crate) async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        self.request(|id| LinkRequest::Publish {
            id,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type: content_type.to_string(),
            payload,
        })
        .await
    }

    /// Register an inbox for `queue`, then ask the server to start delivering.
    pub(crate) async fn consume(&self, queue: &str) -> Result<RemoteInbox, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(BusError::ConnectionClosed);
            }
            state.consumers.insert(queue.to_string(), tx);
        }

        let started = self
            .request(|id| LinkRequest::Consume {
                id,
                queue: queue.to_string(),
            })
            .await;
        if started.is_err() {
            self.state.lock().await.consumers.remove(queue);
        }
        started.map(|()| rx)
    }

    pub(crate) async fn ack(&self, tag: u64) -> Result<(), BusError> {
        self.request(|id| LinkRequest::Ack { id, tag }).await
    }

    pub(crate) async fn nack(&self, tag: u64, requeue: bool) -> Result<(), BusError> {
        self.request(|id| LinkRequest::Nack { id, tag, requeue }).await
    }

    /// Drop the link. The server requeues whatever was still unacked.
    pub(crate) async fn close(&self) {
        self.state.lock().await.shut();
        self.writer.abort();
        self.reader.abort();
    }

    pub(crate) async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

impl Drop for RemoteLink {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

async fn read_replies(mut ws_receiver: WsReader, state: Arc<Mutex<LinkState>>) {
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match LinkReply::from_json(&text) {
                Ok(reply) => route_reply(&state, reply).await,
                Err(e) => warn!(error = %e, "unreadable frame from bus server"),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "bus link failed");
                break;
            }
        }
    }
    debug!("bus link closed by server");
    state.lock().await.shut();
}

async fn route_reply(state: &Mutex<LinkState>, reply: LinkReply) {
    let mut state = state.lock().await;
    match reply {
        LinkReply::Done { id } => {
            if let Some(tx) = state.pending.remove(&id) {
                let _ = tx.send(Ok(()));
            }
        }
        LinkReply::Failed { id, error } => {
            if let Some(tx) = state.pending.remove(&id) {
                let _ = tx.send(Err(error));
            }
        }
        LinkReply::Delivery { queue, tag, message } => match state.consumers.get(&queue) {
            Some(inbox) => {
                let _ = inbox.send((tag, message));
            }
            None => warn!(queue = %queue, tag, "delivery for a queue nobody consumes"),
        },
    }
}
