//! Bus Server
//!
//! Serves one [`MemoryBroker`] to clients in other processes over
//! WebSocket. Each accepted socket gets its own broker connection, so a
//! dropped client loses its transient queues and its unacked deliveries go
//! back to their queues, exactly as for an in-process connection.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, instrument, warn};

use crate::bus::broker::{BusError, MemoryBroker};
use crate::bus::channel::{BusChannel, BusConnection, Delivery, Publisher};
use crate::bus::wire::{LinkReply, LinkRequest};

/// Deliveries a remote consumer may hold unsettled at once.
const PREFETCH: usize = 1;

/// WebSocket front for a broker.
pub struct BusServer {
    broker: MemoryBroker,
    listener: TcpListener,
    confirm_timeout: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl BusServer {
    /// Bind `addr`. Port 0 picks a free port; see [`local_addr`](Self::local_addr).
    pub async fn bind(broker: MemoryBroker, addr: SocketAddr, confirm_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            broker,
            listener,
            confirm_timeout,
            shutdown_tx,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// `ws://` URL clients connect to.
    pub fn url(&self) -> io::Result<String> {
        Ok(format!("ws://{}", self.local_addr()?))
    }

    /// Stop accepting and disconnect every client.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Accept clients until [`shutdown`](Self::shutdown).
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(addr = ?self.listener.local_addr().ok(), "bus server listening");
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!("New bus client from {}", addr);
                            tokio::spawn(serve_client(
                                stream,
                                addr,
                                self.broker.connect(self.confirm_timeout),
                                self.shutdown_tx.subscribe(),
                            ));
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    addr: SocketAddr,
    connection: BusConnection,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            connection.close().await;
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<LinkReply>();

    let sender_task = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            let text = match reply.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize reply: {}", e);
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session = LinkSession::new(connection, reply_tx);

    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => match LinkRequest::from_json(&text) {
                        Ok(request) => session.handle(request).await,
                        Err(e) => debug!("Invalid frame from {}: {}", addr, e),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("Bus client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", addr, e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    session.close().await;
    sender_task.abort();
    info!("Bus client {} cleaned up", addr);
}

type Unsettled = Arc<Mutex<BTreeMap<u64, (Delivery, OwnedSemaphorePermit)>>>;

/// Broker-side state of one remote client.
struct LinkSession {
    connection: BusConnection,
    channel: BusChannel,
    replies: mpsc::UnboundedSender<LinkReply>,
    unsettled: Unsettled,
    consumers: Vec<JoinHandle<()>>,
}

impl LinkSession {
    fn new(connection: BusConnection, replies: mpsc::UnboundedSender<LinkReply>) -> Self {
        let channel = connection.create_channel();
        Self {
            connection,
            channel,
            replies,
            unsettled: Arc::new(Mutex::new(BTreeMap::new())),
            consumers: Vec::new(),
        }
    }

    async fn handle(&mut self, request: LinkRequest) {
        let id = request.id();
        let result = match request {
            LinkRequest::DeclareQueue { queue, options, .. } => self.channel.declare_queue(&queue, options).await,
            LinkRequest::BindQueue { queue, exchange, key, .. } => {
                self.channel.bind_queue(&queue, &exchange, &key).await
            }
            LinkRequest::Publish {
                exchange,
                routing_key,
                content_type,
                payload,
                ..
            } => {
                self.channel
                    .publish(&exchange, &routing_key, &content_type, payload)
                    .await
            }
            LinkRequest::Consume { queue, .. } => self.consume(queue).await,
            LinkRequest::Ack { tag, .. } => self.settle(tag, None).await,
            LinkRequest::Nack { tag, requeue, .. } => self.settle(tag, Some(requeue)).await,
        };

        let reply = match result {
            Ok(()) => LinkReply::Done { id },
            Err(error) => LinkReply::Failed { id, error },
        };
        let _ = self.replies.send(reply);
    }

    /// Forward deliveries from `queue`, at most [`PREFETCH`] unsettled at a time.
    async fn consume(&mut self, queue: String) -> Result<(), BusError> {
        let mut consumer = self.channel.consume(&queue).await?;
        let replies = self.replies.clone();
        let unsettled = self.unsettled.clone();
        let window = Arc::new(Semaphore::new(PREFETCH));

        self.consumers.push(tokio::spawn(async move {
            loop {
                let Ok(permit) = window.clone().acquire_owned().await else {
                    break;
                };
                let Some(delivery) = consumer.next().await else {
                    break;
                };
                let tag = delivery.tag();
                let message = delivery.message().clone();
                unsettled.lock().await.insert(tag, (delivery, permit));

                let forwarded = LinkReply::Delivery {
                    queue: queue.clone(),
                    tag,
                    message,
                };
                if replies.send(forwarded).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    /// `None` acks, `Some(requeue)` nacks.
    async fn settle(&self, tag: u64, nack: Option<bool>) -> Result<(), BusError> {
        let Some((delivery, _permit)) = self.unsettled.lock().await.remove(&tag) else {
            return Err(BusError::UnknownDeliveryTag(tag));
        };
        match nack {
            None => delivery.ack().await,
            Some(requeue) => delivery.nack(requeue).await,
        }
    }

    /// Closing the broker connection requeues whatever is still unsettled.
    async fn close(self) {
        for consumer in &self.consumers {
            consumer.abort();
        }
        self.connection.close().await;
    }
}
