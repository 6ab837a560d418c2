// [libs/infra/broadcast/src/handler.rs]
//! Per-connection WebSocket session: a triple-task arrangement (internal
//! worker, downstream sender, upstream receiver) where whichever task
//! exits first tears down the other two. Adapted from this codebase's
//! existing socket handler pattern — same shape, carrying cluster-state
//! frames instead of command/telemetry traffic, and the command worker
//! is trimmed down to a single supported inbound message (client ack)
//! instead of a full directive router.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, instrument, warn};

use crate::frame::Frame;
use crate::hub::BroadcastHub;

const PING_INTERVAL: Duration = Duration::from_secs(20);
const INBOUND_BUFFER_CAPACITY: usize = 32;

#[instrument(skip(socket, hub, initial_snapshot))]
pub async fn handle_connection(socket: WebSocket, hub: BroadcastHub, initial_snapshot: Frame) {
    let (mut sink, mut stream) = socket.split();
    let (client_id, queue) = hub.register();
    queue.push(initial_snapshot);

    info!(%client_id, "websocket client connected");

    let (inbound_sender, mut inbound_receiver) = mpsc::channel::<String>(INBOUND_BUFFER_CAPACITY);

    // Task 1: internal worker. The only inbound message currently
    // supported is a plain "ack" used for client-side latency probes;
    // anything else is logged and dropped rather than rejected, so a
    // newer client sending an unrecognized message does not kill an
    // older server's connection.
    let worker_client_id = client_id;
    let mut worker_task = tokio::spawn(async move {
        while let Some(message) = inbound_receiver.recv().await {
            if message != "ack" {
                debug!(client_id = %worker_client_id, %message, "ignoring unrecognized inbound message");
            }
        }
    });

    // Task 2: downstream sender. Drains the per-client queue and keeps
    // the connection alive with periodic pings; closes with 1011 if the
    // queue's drop policy decides this client has fallen too far behind.
    let sender_client_id = client_id;
    let sender_queue = queue.clone();
    let mut sender_task = tokio::spawn(async move {
        let mut keepalive = interval(PING_INTERVAL);
        loop {
            if sender_queue.should_close() {
                warn!(client_id = %sender_client_id, "client dropped too many frames, closing connection");
                let _ = sink
                    .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                        code: 1011,
                        reason: "too many dropped frames".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                _ = keepalive.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                frame = sender_queue.next() => {
                    match serde_json::to_string(&frame) {
                        Ok(text) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => warn!(client_id = %sender_client_id, %error, "failed to serialize outbound frame"),
                    }
                }
            }
        }
    });

    // Task 3: upstream receiver.
    let receiver_client_id = client_id;
    let mut receiver_task = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if inbound_sender.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(error) => {
                    debug!(client_id = %receiver_client_id, %error, "websocket read error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut sender_task => {
            receiver_task.abort();
            worker_task.abort();
        }
        _ = &mut receiver_task => {
            sender_task.abort();
            worker_task.abort();
        }
        _ = &mut worker_task => {
            sender_task.abort();
            receiver_task.abort();
        }
    }

    hub.unregister(client_id);
    info!(%client_id, "websocket client disconnected");
}
