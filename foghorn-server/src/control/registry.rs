//! Connection-per-node registry for the control stream (C5), keyed by
//! `NodeId` instead of a random connection id — a node has at most one
//! live control-stream socket at a time, and a fresh connect simply
//! replaces whatever was registered before.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use foghorn_model::ids::NodeId;

use crate::control::connection::Connection;

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<NodeId, Arc<Connection>>>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection`, replacing any prior socket for the same
    /// node (a reconnect supersedes the stale one; the old socket's
    /// inbound loop will exit on its own once the edge closes it).
    pub fn add(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.node_id.clone(), connection);
    }

    pub fn remove(&self, node_id: &NodeId) {
        self.connections.remove(node_id);
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Arc<Connection>> {
        self.connections.get(node_id).map(|c| c.clone())
    }

    pub fn is_connected(&self, node_id: &NodeId) -> bool {
        self.connections.contains_key(node_id)
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }
}
