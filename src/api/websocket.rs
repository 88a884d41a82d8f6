use axum::{
    extract::ws::{WebSocket, WebSocketUpgrade, Message},
    response::Response,
    extract::State,
};
use async_trait::async_trait;
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use crate::api::rest::ApiState;
use crate::broadcast::SubscriberTransport;
use crate::broadcast::events::{StreamEvent, StreamMessage};
use crate::error::{Error, Result};

/// Outbound messages buffered per connection before sends start to wait.
pub const CONNECTION_QUEUE_CAPACITY: usize = 64;

/// Broadcaster-facing half of one socket. Events are queued here and written
/// by the connection's own writer task. Closing it tells the connection to
/// hang up.
pub struct WsTransport {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    closed: watch::Sender<bool>,
}

impl WsTransport {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        let (closed, _) = watch::channel(false);
        WsTransport {
            sender: Mutex::new(Some(sender)),
            closed,
        }
    }

    /// Flips to `true` once the transport is closed.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

#[async_trait]
impl SubscriberTransport for WsTransport {
    async fn send(&self, event: &StreamEvent) -> Result<()> {
        let text = event.to_message()?.to_json()?;
        let sender = self.sender.lock().await.clone();
        match sender {
            Some(sender) => sender.send(text).await
                .map_err(|_| Error::delivery("websocket", "connection writer is gone")),
            None => Err(Error::delivery("websocket", "connection closed")),
        }
    }

    async fn close(&self) {
        self.sender.lock().await.take();
        self.closed.send_replace(true);
    }
}

#[derive(Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub async fn price_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(CONNECTION_QUEUE_CAPACITY);

    // Spawn task to write queued messages to the client
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let transport = Arc::new(WsTransport::new(tx.clone()));
    let mut closed = transport.closed();
    let handle = match state.monitor.subscribe(transport).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!("WebSocket subscription rejected: {}", e);
            writer.abort();
            return;
        }
    };

    // Handle incoming messages until the client leaves or the broadcaster drops us
    let mut dropped = false;
    loop {
        tokio::select! {
            biased;
            _ = closed.changed() => {
                tracing::info!("Closing WebSocket for dropped subscriber {}", handle.id());
                dropped = true;
                break;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(reply) = handle_client_message(&state, &text).await else {
                        continue;
                    };
                    if tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.monitor.unsubscribe(handle).await;
    drop(tx);
    if dropped {
        // The writer may be stuck on a stalled client
        writer.abort();
    } else if let Err(e) = writer.await {
        tracing::debug!("WebSocket writer ended: {}", e);
    }
}

/// Answers one client request. `None` means nothing to send back.
async fn handle_client_message(state: &ApiState, text: &str) -> Option<String> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(_) => {
            tracing::warn!("Invalid JSON received from client: {}", text);
            return None;
        }
    };

    let reply = match message.kind.as_str() {
        "ping" => StreamMessage::new("pong", json!({ "timestamp": chrono::Utc::now() })),
        "get_current_price" => {
            let point = state.monitor.current_price().await?;
            StreamMessage::new("current_price_response", serde_json::to_value(point).ok()?)
        }
        "get_statistics" => {
            let hours = message.data.get("hours").and_then(|h| h.as_u64()).unwrap_or(24);
            let hours = u32::try_from(hours).unwrap_or(u32::MAX);
            let stats = match state.monitor.statistics(hours).await {
                Ok(stats) => stats?,
                Err(e) => {
                    tracing::warn!("Rejected statistics request: {}", e);
                    return None;
                }
            };
            StreamMessage::new("statistics_response", serde_json::to_value(stats).ok()?)
        }
        other => {
            tracing::warn!("Unknown message type from client: {}", other);
            return None;
        }
    };

    match reply.to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to encode {} reply: {}", reply.kind, e);
            None
        }
    }
}
