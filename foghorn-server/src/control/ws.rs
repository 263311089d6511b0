//! The control-plane WebSocket endpoint edge nodes dial into (C5, §4.5).
//! One socket per node, split into an outbound forwarding task and an
//! inbound decode loop. Inbound
//! frames are either a `Trigger` (routed to the trigger processor; a
//! blocking trigger's reply is written straight back) or a `Reply` to a
//! previously dispatched `Command` (routed to the connection's pending
//! reply slot).

use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use foghorn_model::ids::NodeId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::control::connection::Connection;
use crate::control::wire::{WireReply, WireTrigger, WireTriggerReply};
use crate::state::AppState;

const OUTBOUND_BUFFER: usize = 256;

pub async fn control_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    // The first frame a node sends identifies it; until then there is
    // nowhere to route a `Command` back to, so it isn't registered yet.
    let mut connection: Option<Arc<Connection>> = None;

    let outbound_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(Utf8Bytes::from(frame))).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                warn!(error = %err, "control stream read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if connection.is_none() {
                    match node_id_from_frame(text.as_str()) {
                        Some(node_id) => {
                            let conn = Arc::new(Connection::new(node_id.clone(), tx.clone()));
                            state.control_registry.add(conn.clone());
                            info!(node_id = %node_id, "control stream connected");
                            connection = Some(conn);
                        }
                        None => {
                            warn!("first control-stream frame did not carry a node_id, dropping socket");
                            break;
                        }
                    }
                }
                let Some(conn) = connection.as_ref() else { continue };
                handle_text_frame(&state, conn, text.as_str()).await;
            }
            Message::Binary(_) => {
                warn!("control stream received unexpected binary frame, ignoring");
            }
            Message::Ping(_) => {
                if let Some(conn) = connection.as_ref() {
                    conn.update_ping();
                }
            }
            Message::Pong(_) => {
                if let Some(conn) = connection.as_ref() {
                    conn.update_ping();
                }
            }
            Message::Close(_) => break,
        }
    }

    outbound_task.abort();
    if let Some(conn) = connection {
        state.control_registry.remove(&conn.node_id);
        info!(node_id = %conn.node_id, "control stream disconnected");
    }
}

/// Peek a raw JSON text frame for `node_id` without fully decoding it, so
/// the very first frame can register the connection before being handled
/// as either a trigger or a reply.
fn node_id_from_frame(text: &str) -> Option<NodeId> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("node_id").and_then(|v| v.as_str()).map(NodeId::from)
}

async fn handle_text_frame(state: &AppState, conn: &Arc<Connection>, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "malformed control stream frame");
            return;
        }
    };

    // A reply to a previously dispatched `Command` carries its
    // `request_id` but no `trigger_type`; a trigger always carries
    // `trigger_type`.
    if value.get("trigger_type").is_none() && value.get("request_id").is_some() {
        handle_reply_frame(conn, value);
        return;
    }

    handle_trigger_frame(state, conn, value).await;
}

fn handle_reply_frame(conn: &Arc<Connection>, value: serde_json::Value) {
    let wire: WireReply = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(err) => {
            warn!(error = %err, "malformed reply frame");
            return;
        }
    };
    let request_id = wire.request_id.clone();
    match wire.into_reply() {
        Ok(reply) => conn.resolve_reply(&request_id, reply),
        Err(err) => warn!(error = %err, "reply frame had an unrecognized payload"),
    }
}

async fn handle_trigger_frame(state: &AppState, conn: &Arc<Connection>, value: serde_json::Value) {
    let wire: WireTrigger = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(err) => {
            warn!(error = %err, "malformed trigger frame");
            return;
        }
    };

    let blocking = wire.request_id.clone();
    let trigger = match wire.into_trigger() {
        Ok(trigger) => trigger,
        Err(err) => {
            warn!(error = %err, "trigger frame failed to decode");
            return;
        }
    };
    let is_blocking = trigger.blocking();

    match state.processor.handle(trigger).await {
        Ok(reply) => {
            if is_blocking {
                if let Some(request_id) = blocking {
                    send_trigger_reply(conn, request_id, WireTriggerReply::from(reply)).await;
                }
            }
        }
        Err(err) => {
            error!(error = %err, "trigger processing failed");
            if is_blocking {
                if let Some(request_id) = blocking {
                    send_trigger_reply(conn, request_id, WireTriggerReply::Text(String::new())).await;
                }
            }
        }
    }
}

async fn send_trigger_reply(conn: &Arc<Connection>, request_id: String, reply: WireTriggerReply) {
    let envelope = serde_json::json!({ "request_id": request_id, "reply": reply });
    match serde_json::to_string(&envelope) {
        Ok(frame) => {
            if conn.send_frame(frame).await.is_err() {
                warn!(node_id = %conn.node_id, "failed to send trigger reply, stream closed");
            }
        }
        Err(err) => error!(error = %err, "failed to encode trigger reply"),
    }
}
