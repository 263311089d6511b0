use std::collections::HashMap;

use chrono::{DateTime, Utc};
use foghorn_model::geo::GeoPoint;
use foghorn_model::ids::NodeId;
use foghorn_model::node::{Node, NodeArtifactEntry, NodeCapabilities, NodeCapacity, NodeMetrics, NodeMode};
use parking_lot::RwLock;

/// Node map, one `RwLock` for the whole group (§5). Every method takes the
/// lock for the minimum scope needed and returns owned clones, never a
/// reference into the map, so callers never hold a lock across I/O.
#[derive(Default)]
pub struct NodeStore {
    nodes: RwLock<HashMap<NodeId, Node>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SetNodeInfo`: upsert identity/geo, and treat `healthy` as the
    /// heartbeat's own attestation of liveness. A healthy report refreshes
    /// `last_update`, so `is_active` (a derived property, §3) becomes true
    /// on the next read; an unhealthy report is recorded but does not
    /// refresh the timestamp, letting the node age out through the normal
    /// heartbeat-window path rather than flipping a separate stored flag.
    pub fn set_node_info(
        &self,
        node_id: NodeId,
        base_url: String,
        healthy: bool,
        geo: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Node {
        let mut guard = self.nodes.write();
        let node = guard
            .entry(node_id.clone())
            .or_insert_with(|| Node::new(node_id, base_url.clone(), now));
        node.base_url = base_url;
        node.geo = geo;
        if healthy {
            node.last_update = now;
        }
        node.clone()
    }

    /// `UpdateNodeMetrics`: last writer wins (§5) on the metrics/capacity
    /// fields, plus the artifact inventory and reported mode carried on the
    /// same heartbeat.
    pub fn update_node_metrics(
        &self,
        node_id: &NodeId,
        capacity: NodeCapacity,
        metrics: NodeMetrics,
        reported_mode: Option<NodeMode>,
        artifacts: Vec<NodeArtifactEntry>,
        now: DateTime<Utc>,
    ) -> Option<Node> {
        let mut guard = self.nodes.write();
        let node = guard.get_mut(node_id)?;
        node.capacity = capacity;
        node.metrics = metrics;
        node.reported_mode = reported_mode;
        node.artifacts = artifacts;
        node.last_update = now;
        Some(node.clone())
    }

    pub fn set_node_artifacts(&self, node_id: &NodeId, artifacts: Vec<NodeArtifactEntry>) -> Option<Node> {
        let mut guard = self.nodes.write();
        let node = guard.get_mut(node_id)?;
        node.artifacts = artifacts;
        Some(node.clone())
    }

    /// Advertised capability flags/role tags, carried on a heartbeat
    /// separately from the metrics last-writer-wins fields (§4.3 capability
    /// filter depends on these staying accurate even between heartbeats).
    pub fn set_capabilities(&self, node_id: &NodeId, capabilities: NodeCapabilities) -> Option<Node> {
        let mut guard = self.nodes.write();
        let node = guard.get_mut(node_id)?;
        node.capabilities = capabilities;
        Some(node.clone())
    }

    pub fn set_mode(&self, node_id: &NodeId, mode: NodeMode) -> Option<Node> {
        let mut guard = self.nodes.write();
        let node = guard.get_mut(node_id)?;
        node.mode = mode;
        Some(node.clone())
    }

    /// §4.7/§8 invariant 2: `add_bandwidth = pending_redirects *
    /// est_bandwidth_per_user`, recomputed whenever either factor changes.
    pub fn adjust_pending_redirects(&self, node_id: &NodeId, delta: i64) -> Option<Node> {
        let mut guard = self.nodes.write();
        let node = guard.get_mut(node_id)?;
        node.pending_redirects = if delta.is_negative() {
            node.pending_redirects.saturating_sub(delta.unsigned_abs())
        } else {
            node.pending_redirects.saturating_add(delta as u64)
        };
        node.add_bandwidth = node.pending_redirects.saturating_mul(node.est_bandwidth_per_user);
        Some(node.clone())
    }

    /// `ReconcileVirtualViewers`'s bandwidth half: refresh
    /// `est_bandwidth_per_user` from `up_speed / max(1, real_total)` (§4.7).
    pub fn refresh_bandwidth_estimate(&self, node_id: &NodeId, up_speed: u64, real_total: u64) -> Option<Node> {
        let mut guard = self.nodes.write();
        let node = guard.get_mut(node_id)?;
        node.est_bandwidth_per_user = up_speed / real_total.max(1);
        node.add_bandwidth = node.pending_redirects.saturating_mul(node.est_bandwidth_per_user);
        Some(node.clone())
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Node> {
        self.nodes.read().get(node_id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    /// Replace the whole map, used by boot rehydration (§4.2).
    pub fn replace_all(&self, nodes: Vec<Node>) {
        let mut guard = self.nodes.write();
        guard.clear();
        for node in nodes {
            guard.insert(node.node_id.clone(), node);
        }
    }

    /// Overwrite one node wholesale with a peer instance's copy (§4.2
    /// cross-instance sync). Unlike every other mutator here this takes a
    /// fully-formed `Node` rather than a field subset, since the delta
    /// already carries the peer's complete last-writer-wins state.
    pub fn apply_remote(&self, node: Node) {
        self.nodes.write().insert(node.node_id.clone(), node);
    }

    pub fn remove(&self, node_id: &NodeId) {
        self.nodes.write().remove(node_id);
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use foghorn_model::node::NodeCapacity;

    use super::*;

    fn node_id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    #[test]
    fn set_node_info_creates_and_refreshes_on_healthy() {
        let store = NodeStore::new();
        let t0 = Utc::now();
        store.set_node_info(node_id("n1"), "http://n1:8080".into(), true, None, t0);

        let t1 = t0 + chrono::Duration::seconds(10);
        let node = store.set_node_info(node_id("n1"), "http://n1:9090".into(), true, None, t1);
        assert_eq!(node.base_url, "http://n1:9090");
        assert_eq!(node.last_update, t1);
    }

    #[test]
    fn set_node_info_unhealthy_does_not_refresh_last_update() {
        let store = NodeStore::new();
        let t0 = Utc::now();
        store.set_node_info(node_id("n1"), "http://n1".into(), true, None, t0);

        let t1 = t0 + chrono::Duration::seconds(10);
        let node = store.set_node_info(node_id("n1"), "http://n1".into(), false, None, t1);
        assert_eq!(node.last_update, t0);
    }

    #[test]
    fn adjust_pending_redirects_recomputes_add_bandwidth() {
        let store = NodeStore::new();
        let t0 = Utc::now();
        store.set_node_info(node_id("n1"), "http://n1".into(), true, None, t0);
        store.refresh_bandwidth_estimate(&node_id("n1"), 1000, 10);

        let node = store.adjust_pending_redirects(&node_id("n1"), 3).unwrap();
        assert_eq!(node.pending_redirects, 3);
        assert_eq!(node.add_bandwidth, 3 * node.est_bandwidth_per_user);

        let node = store.adjust_pending_redirects(&node_id("n1"), -2).unwrap();
        assert_eq!(node.pending_redirects, 1);
        assert_eq!(node.add_bandwidth, node.est_bandwidth_per_user);
    }

    #[test]
    fn adjust_pending_redirects_saturates_at_zero() {
        let store = NodeStore::new();
        let t0 = Utc::now();
        store.set_node_info(node_id("n1"), "http://n1".into(), true, None, t0);

        let node = store.adjust_pending_redirects(&node_id("n1"), -5).unwrap();
        assert_eq!(node.pending_redirects, 0);
    }

    #[test]
    fn update_node_metrics_returns_none_for_unknown_node() {
        let store = NodeStore::new();
        let result = store.update_node_metrics(&node_id("ghost"), NodeCapacity::default(), Default::default(), None, Vec::new(), Utc::now());
        assert!(result.is_none());
    }

    #[test]
    fn replace_all_clears_existing_entries() {
        let store = NodeStore::new();
        let t0 = Utc::now();
        store.set_node_info(node_id("n1"), "http://n1".into(), true, None, t0);
        assert_eq!(store.len(), 1);

        store.replace_all(vec![Node::new(node_id("n2"), "http://n2".into(), t0)]);
        assert_eq!(store.len(), 1);
        assert!(store.get(&node_id("n1")).is_none());
        assert!(store.get(&node_id("n2")).is_some());
    }

    #[test]
    fn apply_remote_overwrites_whole_node() {
        let store = NodeStore::new();
        let t0 = Utc::now();
        store.set_node_info(node_id("n1"), "http://old".into(), true, None, t0);

        let mut remote = Node::new(node_id("n1"), "http://new".into(), t0);
        remote.pending_redirects = 7;
        store.apply_remote(remote);

        let node = store.get(&node_id("n1")).unwrap();
        assert_eq!(node.base_url, "http://new");
        assert_eq!(node.pending_redirects, 7);
    }

    #[test]
    fn remove_drops_node() {
        let store = NodeStore::new();
        store.set_node_info(node_id("n1"), "http://n1".into(), true, None, Utc::now());
        assert!(!store.is_empty());
        store.remove(&node_id("n1"));
        assert!(store.is_empty());
    }
}
