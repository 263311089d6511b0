//! Node selection (C3, §4.3): orchestrates C1 over a C2 snapshot, applying
//! capability filters, same-host exclusion, and the source-vs-viewer
//! replicated-instance policy.

use std::collections::HashMap;
use std::net::IpAddr;

use foghorn_model::geo::GeoPoint;
use foghorn_model::ids::{InternalName, NodeId};
use foghorn_model::node::Node;
use foghorn_model::weights::Weights;
use parking_lot::RwLock;

use crate::error::{FoghornError, Result};
use crate::scoring::{score, ScoringContext};
use crate::state::BalancerSnapshot;

/// One scored candidate, as returned by `GetTopNodesWithScores` (§4.3).
#[derive(Debug, Clone)]
pub struct NodeScore {
    pub node_id: NodeId,
    pub base_url: String,
    pub score: u64,
    pub geo: Option<GeoPoint>,
}

/// Selection request context: the request's own location, required
/// capability tags, per-tag score adjustments, the client's IP (for
/// same-host exclusion), and whether this is a source (publish) or viewer
/// (playback) selection.
pub struct SelectionRequest<'a> {
    pub internal_name: Option<&'a InternalName>,
    pub request_geo: Option<GeoPoint>,
    pub required_capabilities: &'a [String],
    pub tag_adjust: &'a HashMap<String, i64>,
    pub client_ip: Option<IpAddr>,
    pub is_source_selection: bool,
}

/// Holds the mutable, process-wide scoring weights (§3) and implements the
/// selection policy (§4.3) over a `BalancerSnapshot`.
pub struct Balancer {
    weights: RwLock<Weights>,
}

impl Default for Balancer {
    fn default() -> Self {
        Self::new()
    }
}

impl Balancer {
    pub fn new() -> Self {
        Self {
            weights: RwLock::new(Weights::default()),
        }
    }

    pub fn weights(&self) -> Weights {
        *self.weights.read()
    }

    /// `SetWeights` (§4.3, §8 boundary behavior): any zero argument makes
    /// this a no-op, the existing weights are left untouched.
    pub fn set_weights(&self, cpu: u64, ram: u64, bw: u64, geo: u64, stream_bonus: u64) -> Result<()> {
        let weights = Weights::new(cpu, ram, bw, geo, stream_bonus)?;
        *self.weights.write() = weights;
        Ok(())
    }

    fn eligible<'a>(
        &self,
        snapshot: &'a BalancerSnapshot,
        req: &SelectionRequest<'_>,
        now: chrono::DateTime<chrono::Utc>,
        heartbeat_window: chrono::Duration,
    ) -> Vec<&'a Node> {
        snapshot
            .nodes
            .iter()
            .filter(|node| node.is_active(now, heartbeat_window))
            .filter(|node| node.capabilities.satisfies_all(req.required_capabilities))
            .filter(|node| !Self::is_same_host(node, req.client_ip))
            .filter(|node| {
                if !req.is_source_selection {
                    return true;
                }
                match req.internal_name {
                    Some(name) => !snapshot.is_replicated(name, &node.node_id),
                    None => true,
                }
            })
            .collect()
    }

    fn is_same_host(node: &Node, client_ip: Option<IpAddr>) -> bool {
        match client_ip {
            Some(ip) => node.base_url.contains(&ip.to_string()),
            None => false,
        }
    }

    fn scored<'a>(
        &self,
        candidates: Vec<&'a Node>,
        snapshot: &BalancerSnapshot,
        req: &SelectionRequest<'_>,
        weights: Weights,
    ) -> Vec<(&'a Node, u64)> {
        candidates
            .into_iter()
            .filter_map(|node| {
                let stream_present = req.internal_name.is_some_and(|name| {
                    if req.is_source_selection {
                        snapshot.present_as_source(name, &node.node_id)
                    } else {
                        snapshot.present_as_viewer_target(name, &node.node_id)
                    }
                });
                let ctx = ScoringContext {
                    request_geo: req.request_geo,
                    tag_adjust: req.tag_adjust,
                    stream_present,
                    node_active: true,
                };
                let s = score(node, &ctx, &weights);
                (s > 0).then_some((node, s))
            })
            .collect()
    }

    /// `GetBestNodeWithScore` (§4.3).
    pub fn get_best_node_with_score(
        &self,
        snapshot: &BalancerSnapshot,
        req: &SelectionRequest<'_>,
        now: chrono::DateTime<chrono::Utc>,
        heartbeat_window: chrono::Duration,
    ) -> Result<NodeScore> {
        let weights = self.weights();
        let candidates = self.eligible(snapshot, req, now, heartbeat_window);
        let mut scored = self.scored(candidates, snapshot, req, weights);
        // Deterministic tiebreak: highest score first, then node_id order (§4.1).
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.node_id.cmp(&b.0.node_id)));
        scored
            .into_iter()
            .next()
            .map(|(node, s)| NodeScore {
                node_id: node.node_id.clone(),
                base_url: node.base_url.clone(),
                score: s,
                geo: node.geo,
            })
            .ok_or(FoghornError::NoCapacity)
    }

    /// `GetTopNodesWithScores` (§4.3).
    pub fn get_top_nodes_with_scores(
        &self,
        snapshot: &BalancerSnapshot,
        req: &SelectionRequest<'_>,
        k: usize,
        now: chrono::DateTime<chrono::Utc>,
        heartbeat_window: chrono::Duration,
    ) -> Vec<NodeScore> {
        let weights = self.weights();
        let candidates = self.eligible(snapshot, req, now, heartbeat_window);
        let mut scored = self.scored(candidates, snapshot, req, weights);
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.node_id.cmp(&b.0.node_id)));
        scored
            .into_iter()
            .take(k)
            .map(|(node, s)| NodeScore {
                node_id: node.node_id.clone(),
                base_url: node.base_url.clone(),
                score: s,
                geo: node.geo,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use foghorn_model::node::{NodeCapabilities, NodeCapacity, NodeMetrics};
    use foghorn_model::stream::StreamInstance;
    use foghorn_model::ids::TenantId;

    fn active_node(id: &str, base_url: &str) -> Node {
        let now = Utc::now();
        let mut node = Node::new(NodeId::from(id), base_url.to_string(), now);
        node.capacity = NodeCapacity {
            ram_max: 100,
            bw_limit: 100,
            storage_capacity_bytes: 0,
            max_transcodes: 0,
        };
        node.metrics = NodeMetrics::default();
        node
    }

    #[test]
    fn no_candidates_yields_no_capacity() {
        let balancer = Balancer::new();
        let snapshot = BalancerSnapshot::new(vec![], vec![]);
        let req = SelectionRequest {
            internal_name: None,
            request_geo: None,
            required_capabilities: &[],
            tag_adjust: &HashMap::new(),
            client_ip: None,
            is_source_selection: false,
        };
        let result = balancer.get_best_node_with_score(&snapshot, &req, Utc::now(), chrono::Duration::seconds(15));
        assert!(matches!(result, Err(FoghornError::NoCapacity)));
    }

    #[test]
    fn capability_filter_excludes_nodes_missing_a_required_tag() {
        let balancer = Balancer::new();
        let mut edge_only = active_node("edge-only", "http://edge");
        edge_only.capabilities = NodeCapabilities {
            edge: true,
            ..Default::default()
        };
        let mut storage_and_edge = active_node("both", "http://both");
        storage_and_edge.capabilities = NodeCapabilities {
            edge: true,
            storage: true,
            ..Default::default()
        };
        let snapshot = BalancerSnapshot::new(vec![edge_only, storage_and_edge], vec![]);
        let required = vec!["storage".to_string(), "edge".to_string()];
        let req = SelectionRequest {
            internal_name: None,
            request_geo: None,
            required_capabilities: &required,
            tag_adjust: &HashMap::new(),
            client_ip: None,
            is_source_selection: false,
        };
        let best = balancer
            .get_best_node_with_score(&snapshot, &req, Utc::now(), chrono::Duration::seconds(15))
            .unwrap();
        assert_eq!(best.node_id, NodeId::from("both"));
    }

    #[test]
    fn source_selection_excludes_replicated_instances() {
        let balancer = Balancer::new();
        let origin = active_node("origin", "http://origin");
        let edge = active_node("edge", "http://edge");
        let now = Utc::now();
        let internal_name = InternalName::from("stream-1");
        let tenant = TenantId::new();
        let mut origin_instance =
            StreamInstance::new(internal_name.clone(), origin.node_id.clone(), tenant.clone(), false, now);
        origin_instance.inputs = 1;
        let mut replicated_instance =
            StreamInstance::new(internal_name.clone(), edge.node_id.clone(), tenant, true, now);
        replicated_instance.inputs = 0;

        let snapshot = BalancerSnapshot::new(vec![origin.clone(), edge.clone()], vec![origin_instance, replicated_instance]);
        let req = SelectionRequest {
            internal_name: Some(&internal_name),
            request_geo: None,
            required_capabilities: &[],
            tag_adjust: &HashMap::new(),
            client_ip: None,
            is_source_selection: true,
        };
        let top = balancer.get_top_nodes_with_scores(&snapshot, &req, 10, now, chrono::Duration::seconds(15));
        assert!(top.iter().any(|n| n.node_id == origin.node_id));
        assert!(!top.iter().any(|n| n.node_id == edge.node_id));
    }

    #[test]
    fn set_weights_rejects_any_zero_argument() {
        let balancer = Balancer::new();
        let before = balancer.weights();
        assert!(balancer.set_weights(0, 1, 1, 1, 1).is_err());
        assert_eq!(balancer.weights(), before);
    }
}
