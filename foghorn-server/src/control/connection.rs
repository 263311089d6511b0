//! One open control-stream socket to one edge node (C5, §4.5). Alongside a
//! single outbound message channel, this also tracks in-flight `Command`s
//! so a `Reply` frame coming back in the *same* inbound loop can be routed
//! to the `dispatch()` call that is awaiting it, by `request_id`.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use foghorn_contracts::dispatch::Reply;
use foghorn_model::ids::NodeId;
use tokio::sync::{mpsc, oneshot};

/// Outbound control-stream frame, already encoded to the text the socket
/// sends. Kept as a plain string rather than an enum: `ws.rs` is the only
/// writer, and it already knows whether it's forwarding a `Command` or a
/// blocking trigger reply.
pub type OutboundFrame = String;

pub struct Connection {
    pub node_id: NodeId,
    sender: mpsc::Sender<OutboundFrame>,
    last_ping: AtomicI64,
    pending: DashMap<String, oneshot::Sender<Reply>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("node_id", &self.node_id)
            .field("channel_closed", &self.sender.is_closed())
            .field("last_ping", &self.last_ping.load(Ordering::Relaxed))
            .field("pending_replies", &self.pending.len())
            .finish()
    }
}

impl Connection {
    pub fn new(node_id: NodeId, sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            node_id,
            sender,
            last_ping: AtomicI64::new(Utc::now().timestamp()),
            pending: DashMap::new(),
        }
    }

    pub async fn send_frame(&self, frame: OutboundFrame) -> Result<(), ()> {
        self.sender.send(frame).await.map_err(|_| ())
    }

    /// Register a waiting reply slot for `request_id`, returning the
    /// receiver half for the caller (`dispatcher.rs`) to await with a
    /// timeout. If the node never replies, the caller's timeout fires and
    /// it is the caller's job to deregister via `cancel`.
    pub fn register_reply(&self, request_id: String) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);
        rx
    }

    /// Route an inbound `Reply` frame to its waiting slot, if any is still
    /// registered (it may have already timed out and been cancelled).
    pub fn resolve_reply(&self, request_id: &str, reply: Reply) {
        if let Some((_, tx)) = self.pending.remove(request_id) {
            let _ = tx.send(reply);
        }
    }

    /// Drop a reply slot without resolving it, e.g. after a dispatch
    /// timeout so a late reply doesn't leak a stale sender forever.
    pub fn cancel_reply(&self, request_id: &str) {
        self.pending.remove(request_id);
    }

    pub fn update_ping(&self) {
        self.last_ping.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// Healthy if pinged (or otherwise heard from) within the last 60s.
    pub fn is_healthy(&self) -> bool {
        Utc::now().timestamp() - self.last_ping.load(Ordering::Relaxed) < 60
    }
}

pub type SharedConnection = Arc<Connection>;
