use std::net::IpAddr;

use chrono::{DateTime, Utc};

use crate::ids::{CorrelationId, InternalName, NodeId};

/// §3: `PENDING → ACTIVE → DISCONNECTED`, with a timeout state `ABANDONED`
/// for a `PENDING` viewer that never confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VirtualViewerState {
    Pending,
    Active,
    Disconnected,
    Abandoned,
}

/// Key for a pre-confirmed routing decision (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualViewerKey {
    pub correlation_id: CorrelationId,
    pub node_id: NodeId,
    pub internal_name: InternalName,
    pub client_ip: IpAddr,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualViewer {
    pub correlation_id: CorrelationId,
    pub node_id: NodeId,
    pub internal_name: InternalName,
    pub client_ip: IpAddr,
    pub state: VirtualViewerState,
    pub registered_at: DateTime<Utc>,
    /// Set once a `ViewerConnect` confirms this reservation, so a later
    /// `ViewerDisconnect` can downgrade the right session (§4.4).
    pub session_id: Option<String>,
}

impl VirtualViewer {
    pub fn new(
        correlation_id: CorrelationId,
        node_id: NodeId,
        internal_name: InternalName,
        client_ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_id,
            node_id,
            internal_name,
            client_ip,
            state: VirtualViewerState::Pending,
            registered_at: now,
            session_id: None,
        }
    }

    pub fn key(&self) -> VirtualViewerKey {
        VirtualViewerKey {
            correlation_id: self.correlation_id.clone(),
            node_id: self.node_id.clone(),
            internal_name: self.internal_name.clone(),
            client_ip: self.client_ip,
        }
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        self.state == VirtualViewerState::Pending && now - self.registered_at > timeout
    }
}
