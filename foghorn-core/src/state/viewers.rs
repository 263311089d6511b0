use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use foghorn_model::ids::{CorrelationId, InternalName, NodeId};
use foghorn_model::viewer::{VirtualViewer, VirtualViewerKey, VirtualViewerState};
use parking_lot::RwLock;

/// Outcome of reconciling a node's virtual viewers against its reported
/// connection count (§4.2/§4.7). The caller applies `pending_delta` and
/// `active_trimmed` to the node's own bookkeeping (`pending_redirects`,
/// `add_bandwidth`) since that lives in `NodeStore`, a separate lock group.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOutcome {
    pub abandoned: u64,
    pub active_trimmed: u64,
}

/// Virtual-viewer bookkeeping (C7): in-memory only, never write-through
/// (§3 ownership). One lock for the key->viewer map, one for the
/// session-id index used by disconnect.
#[derive(Default)]
pub struct ViewerStore {
    viewers: RwLock<HashMap<VirtualViewerKey, VirtualViewer>>,
    by_session: RwLock<HashMap<String, VirtualViewerKey>>,
}

impl ViewerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `RegisterPendingViewer` (§4.7): caller is responsible for also
    /// incrementing the node's `pending_redirects` via `NodeStore`.
    pub fn register_pending(
        &self,
        correlation_id: CorrelationId,
        node_id: NodeId,
        internal_name: InternalName,
        client_ip: IpAddr,
        now: DateTime<Utc>,
    ) -> VirtualViewer {
        let viewer = VirtualViewer::new(correlation_id, node_id, internal_name, client_ip, now);
        let key = viewer.key();
        self.viewers.write().insert(key, viewer.clone());
        viewer
    }

    /// `ConfirmVirtualViewerByID`: PENDING -> ACTIVE, idempotent (§3, §8
    /// invariant 7). Returns `true` the first time this correlation id is
    /// confirmed (the caller decrements `pending_redirects` only then);
    /// a repeat confirmation, or one for an unknown/non-pending key, is a
    /// no-op returning `false`.
    pub fn confirm_by_id(&self, key: &VirtualViewerKey, session_id: String, now: DateTime<Utc>) -> bool {
        let mut guard = self.viewers.write();
        let Some(viewer) = guard.get_mut(key) else {
            return false;
        };
        if viewer.state != VirtualViewerState::Pending {
            return false;
        }
        viewer.state = VirtualViewerState::Active;
        viewer.session_id = Some(session_id.clone());
        viewer.registered_at = now;
        drop(guard);
        self.by_session.write().insert(session_id, key.clone());
        true
    }

    /// `DisconnectVirtualViewerBySessionID`: ACTIVE -> DISCONNECTED.
    /// Returns `true` if a matching active viewer was found.
    pub fn disconnect_by_session(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        let key = { self.by_session.read().get(session_id).cloned() };
        let Some(key) = key else { return false };
        let mut guard = self.viewers.write();
        let Some(viewer) = guard.get_mut(&key) else {
            return false;
        };
        if viewer.state != VirtualViewerState::Active {
            return false;
        }
        viewer.state = VirtualViewerState::Disconnected;
        viewer.registered_at = now;
        true
    }

    /// `ReconcileVirtualViewers`'s viewer-state half (§4.2): time out
    /// PENDING entries older than `timeout`, and trim ACTIVE entries for
    /// `node_id` down to `reported_total_connections` (oldest first).
    pub fn reconcile(
        &self,
        node_id: &NodeId,
        reported_total_connections: u64,
        timeout: ChronoDuration,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let mut guard = self.viewers.write();

        for viewer in guard.values_mut().filter(|v| &v.node_id == node_id) {
            if viewer.is_timed_out(now, timeout) {
                viewer.state = VirtualViewerState::Abandoned;
                outcome.abandoned += 1;
            }
        }

        let mut active: Vec<&mut VirtualViewer> = guard
            .values_mut()
            .filter(|v| &v.node_id == node_id && v.state == VirtualViewerState::Active)
            .collect();
        if (active.len() as u64) > reported_total_connections {
            active.sort_by_key(|v| v.registered_at);
            let excess = active.len() as u64 - reported_total_connections;
            for viewer in active.into_iter().take(excess as usize) {
                viewer.state = VirtualViewerState::Disconnected;
                outcome.active_trimmed += 1;
            }
        }

        outcome
    }

    pub fn get(&self, key: &VirtualViewerKey) -> Option<VirtualViewer> {
        self.viewers.read().get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<VirtualViewer> {
        self.viewers.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))
    }

    #[test]
    fn confirm_transitions_pending_to_active_and_is_idempotent() {
        let store = ViewerStore::new();
        let now = Utc::now();
        let viewer = store.register_pending(
            CorrelationId::new(),
            NodeId::from("n1"),
            InternalName::from("s1"),
            ip(),
            now,
        );
        let key = viewer.key();

        assert!(store.confirm_by_id(&key, "sess-1".into(), now));
        assert_eq!(store.get(&key).unwrap().state, VirtualViewerState::Active);

        // §8 invariant 7: double-confirmation is a no-op.
        assert!(!store.confirm_by_id(&key, "sess-1".into(), now));
    }

    #[test]
    fn confirm_unknown_key_is_a_no_op() {
        let store = ViewerStore::new();
        let key = VirtualViewerKey {
            correlation_id: CorrelationId::new(),
            node_id: NodeId::from("n1"),
            internal_name: InternalName::from("s1"),
            client_ip: ip(),
        };
        assert!(!store.confirm_by_id(&key, "sess-1".into(), Utc::now()));
    }

    #[test]
    fn disconnect_downgrades_active_session() {
        let store = ViewerStore::new();
        let now = Utc::now();
        let viewer = store.register_pending(
            CorrelationId::new(),
            NodeId::from("n1"),
            InternalName::from("s1"),
            ip(),
            now,
        );
        let key = viewer.key();
        store.confirm_by_id(&key, "sess-1".into(), now);

        assert!(store.disconnect_by_session("sess-1", now));
        assert_eq!(store.get(&key).unwrap().state, VirtualViewerState::Disconnected);

        // Disconnecting an already-disconnected session is a no-op.
        assert!(!store.disconnect_by_session("sess-1", now));
    }

    #[test]
    fn reconcile_abandons_expired_pending_viewers() {
        let store = ViewerStore::new();
        let t0 = Utc::now();
        store.register_pending(CorrelationId::new(), NodeId::from("n1"), InternalName::from("s1"), ip(), t0);

        let later = t0 + ChronoDuration::seconds(120);
        let outcome = store.reconcile(&NodeId::from("n1"), 0, ChronoDuration::seconds(60), later);
        assert_eq!(outcome.abandoned, 1);

        let viewers = store.snapshot();
        assert_eq!(viewers[0].state, VirtualViewerState::Abandoned);
    }

    #[test]
    fn reconcile_trims_active_ghosts_to_reported_total_oldest_first() {
        let store = ViewerStore::new();
        let t0 = Utc::now();
        let node = NodeId::from("n1");
        let stream = InternalName::from("s1");

        let v1 = store.register_pending(CorrelationId::new(), node.clone(), stream.clone(), ip(), t0);
        let t1 = t0 + ChronoDuration::seconds(1);
        let v2 = store.register_pending(CorrelationId::new(), node.clone(), stream.clone(), ip(), t1);

        store.confirm_by_id(&v1.key(), "sess-1".into(), t0);
        store.confirm_by_id(&v2.key(), "sess-2".into(), t1);

        let outcome = store.reconcile(&node, 1, ChronoDuration::seconds(60), t0 + ChronoDuration::seconds(2));
        assert_eq!(outcome.active_trimmed, 1);

        // The oldest (v1) was trimmed; v2 stays active.
        assert_eq!(store.get(&v1.key()).unwrap().state, VirtualViewerState::Disconnected);
        assert_eq!(store.get(&v2.key()).unwrap().state, VirtualViewerState::Active);
    }
}
