use std::collections::HashMap;

use foghorn_model::ids::{InternalName, NodeId};
use foghorn_model::node::Node;
use foghorn_model::stream::StreamInstance;

/// `GetBalancerSnapshotAtomic` (§4.2): an immutable copy of every node plus
/// enough stream-instance data to answer presence queries (§3), so the
/// balancer's hot path (§4.3) never touches a lock again once it has this.
#[derive(Debug, Clone)]
pub struct BalancerSnapshot {
    pub nodes: Vec<Node>,
    instances: HashMap<(InternalName, NodeId), StreamInstance>,
}

impl BalancerSnapshot {
    pub fn new(nodes: Vec<Node>, instances: Vec<StreamInstance>) -> Self {
        let instances = instances
            .into_iter()
            .map(|i| ((i.internal_name.clone(), i.node_id.clone()), i))
            .collect();
        Self { nodes, instances }
    }

    /// §3: present as a source iff a non-offline, non-replicated instance
    /// with `inputs > 0` exists.
    pub fn present_as_source(&self, internal_name: &InternalName, node_id: &NodeId) -> bool {
        self.instances
            .get(&(internal_name.clone(), node_id.clone()))
            .is_some_and(StreamInstance::present_as_source)
    }

    /// §3: present as a viewer target iff any non-offline instance exists,
    /// replicated or not.
    pub fn present_as_viewer_target(&self, internal_name: &InternalName, node_id: &NodeId) -> bool {
        self.instances
            .get(&(internal_name.clone(), node_id.clone()))
            .is_some_and(StreamInstance::present_as_viewer_target)
    }

    /// §4.3 step 2: whether this node's copy of the stream, if any, is a
    /// replicated instance (excluded from source selection). A node with no
    /// instance row at all is not replicated — it simply has no copy yet.
    pub fn is_replicated(&self, internal_name: &InternalName, node_id: &NodeId) -> bool {
        self.instances
            .get(&(internal_name.clone(), node_id.clone()))
            .is_some_and(|i| i.replicated)
    }
}
