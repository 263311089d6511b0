//! The unified state manager (C2, §4.2): the sole owner of every in-memory
//! entity. Every mutation goes through one of the methods below; nothing
//! outside this module ever touches `NodeStore`/`StreamStore`/`ViewerStore`/
//! `ArtifactStore` directly.

pub mod artifacts;
pub mod nodes;
pub mod rehydrate;
pub mod snapshot;
pub mod streams;
pub mod viewers;

pub use artifacts::ArtifactStore;
pub use nodes::NodeStore;
pub use rehydrate::{EntityRehydrateStatus, RehydrateStatus, RehydrateStatusHandle};
pub use snapshot::BalancerSnapshot;
pub use streams::StreamStore;
pub use viewers::{ReconcileOutcome, ViewerStore};

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use foghorn_contracts::state_store::{NoopStateStore, StateDelta, StateMessage, StateStore};
use foghorn_model::artifact::{Artifact, ArtifactNode};
use foghorn_model::geo::GeoPoint;
use foghorn_model::ids::{CorrelationId, InternalName, NodeId, TenantId};
use foghorn_model::node::{Node, NodeArtifactEntry, NodeCapabilities, NodeCapacity, NodeMetrics, NodeMode};
use foghorn_model::stream::{BufferState, Stream, StreamInstance, TrackInfo};
use foghorn_model::viewer::{VirtualViewer, VirtualViewerKey};
use tracing::{info, warn};

use crate::error::Result;
use crate::persistence::{ArtifactNodeRepository, ArtifactRepository, NodeRepository};

/// Heartbeat staleness window used to derive `is_active` (§3 invariant 1)
/// absent a node-specific override.
pub fn default_heartbeat_window() -> ChronoDuration {
    ChronoDuration::seconds(15)
}

/// How long a PENDING virtual viewer waits for a confirming connect (§4.7).
pub fn default_viewer_confirm_timeout() -> ChronoDuration {
    ChronoDuration::seconds(10)
}

/// Write-through/rehydrate policy for one entity type (§4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityPolicy {
    pub write_through: bool,
    pub boot_rehydrate: bool,
}

/// Optional collaborators the state manager writes through to and rehydrates
/// from. All absent by default — an in-memory-only instance is a valid
/// configuration (e.g. for tests).
#[derive(Default)]
pub struct StateManagerConfig {
    pub instance_id: String,
    pub cluster_id: String,
    pub heartbeat_window: Option<ChronoDuration>,
    pub viewer_confirm_timeout: Option<ChronoDuration>,
    pub node_repo: Option<Arc<dyn NodeRepository>>,
    pub node_policy: EntityPolicy,
    pub artifact_repo: Option<Arc<dyn ArtifactRepository>>,
    pub artifact_node_repo: Option<Arc<dyn ArtifactNodeRepository>>,
    pub artifact_policy: EntityPolicy,
    pub cluster_state: Option<Arc<dyn StateStore>>,
}

pub struct StateManager {
    instance_id: String,
    cluster_id: String,
    heartbeat_window: ChronoDuration,
    viewer_confirm_timeout: ChronoDuration,

    nodes: NodeStore,
    streams: StreamStore,
    viewers: ViewerStore,
    artifacts: ArtifactStore,
    rehydrate_status: RehydrateStatusHandle,

    node_repo: Option<Arc<dyn NodeRepository>>,
    node_policy: EntityPolicy,
    artifact_repo: Option<Arc<dyn ArtifactRepository>>,
    artifact_node_repo: Option<Arc<dyn ArtifactNodeRepository>>,
    artifact_policy: EntityPolicy,

    cluster_state: Arc<dyn StateStore>,
}

impl StateManager {
    pub fn new(config: StateManagerConfig) -> Self {
        Self {
            instance_id: if config.instance_id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                config.instance_id
            },
            cluster_id: config.cluster_id,
            heartbeat_window: config.heartbeat_window.unwrap_or_else(default_heartbeat_window),
            viewer_confirm_timeout: config.viewer_confirm_timeout.unwrap_or_else(default_viewer_confirm_timeout),
            nodes: NodeStore::new(),
            streams: StreamStore::new(),
            viewers: ViewerStore::new(),
            artifacts: ArtifactStore::new(),
            rehydrate_status: RehydrateStatusHandle::new(),
            node_repo: config.node_repo,
            node_policy: config.node_policy,
            artifact_repo: config.artifact_repo,
            artifact_node_repo: config.artifact_node_repo,
            artifact_policy: config.artifact_policy,
            cluster_state: config.cluster_state.unwrap_or_else(|| Arc::new(NoopStateStore::new())),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn rehydrate_status(&self) -> RehydrateStatus {
        self.rehydrate_status.snapshot()
    }

    /// Boot-time rehydrate (§4.2): for every entity type configured with
    /// `BootRehydrate`, read all rows and replay them into memory. Logged
    /// and recorded on `RehydrateStatusHandle`, never fatal — an instance
    /// with no reachable persistence still starts, empty.
    pub async fn rehydrate(&self, now: DateTime<Utc>) {
        if self.node_policy.boot_rehydrate {
            if let Some(repo) = &self.node_repo {
                match repo.list_all().await {
                    Ok(nodes) => {
                        let count = nodes.len();
                        self.nodes.replace_all(nodes);
                        self.rehydrate_status.record_nodes_success(now);
                        info!(count, "rehydrated nodes from persistence");
                    }
                    Err(err) => {
                        warn!(%err, "node rehydrate failed, starting empty");
                        self.rehydrate_status.record_nodes_failure(now, err.to_string());
                    }
                }
            }
        }

        if self.artifact_policy.boot_rehydrate {
            if let Some(repo) = &self.artifact_repo {
                match repo.list_all().await {
                    Ok(artifacts) => {
                        let count = artifacts.len();
                        self.artifacts.replace_all(artifacts);
                        self.rehydrate_status.record_artifacts_success(now);
                        info!(count, "rehydrated artifacts from persistence");
                    }
                    Err(err) => {
                        warn!(%err, "artifact rehydrate failed, starting empty");
                        self.rehydrate_status.record_artifacts_failure(now, err.to_string());
                    }
                }
            }
        }
    }

    /// Periodic reconcile (§4.2): persistence is authoritative on conflict.
    /// Errors are logged, never propagated — this runs on a ticker, not a
    /// caller-visible request path.
    pub async fn reconcile_from_persistence(&self, now: DateTime<Utc>) {
        self.rehydrate(now).await;
    }

    async fn publish(&self, delta: StateDelta) {
        let message = StateMessage {
            instance_id: self.instance_id.clone(),
            cluster_id: self.cluster_id.clone(),
            delta,
        };
        if let Err(err) = self.cluster_state.publish(message).await {
            warn!(%err, "cluster state publish failed");
        }
    }

    /// Applies one peer's delta directly to the in-memory stores, bypassing
    /// write-through and re-publish so replaying a peer's mutation can
    /// never loop back onto the bus (§4.2 "optional cross-instance sync").
    /// Self-originated messages are the caller's job to filter before
    /// calling this (see `run_cluster_sync`).
    fn apply_remote_delta(&self, delta: StateDelta) {
        match delta {
            StateDelta::NodeUpserted(value) => match serde_json::from_value::<Node>(value) {
                Ok(node) => self.nodes.apply_remote(node),
                Err(err) => warn!(%err, "failed to decode peer NodeUpserted delta"),
            },
            StateDelta::NodeRemoved(node_id) => {
                self.nodes.remove(&NodeId::from(node_id));
            }
            StateDelta::StreamUpserted(_) | StateDelta::StreamRemoved(_) => {
                // Stream mutations are reconstructible from the next
                // heartbeat on any instance that owns the originating
                // node, so a dropped or out-of-order stream delta is
                // harmless; only node state needs eager replay here.
            }
        }
    }

    /// Subscribes to the configured `StateStore` and applies every
    /// peer-originated delta until the channel closes or lags past
    /// recovery, at which point the loop exits — the caller (the process's
    /// main task) decides whether that's fatal or just logged (§4.2:
    /// "Lagged receivers are the caller's problem to resync from a full
    /// snapshot").
    pub async fn run_cluster_sync(self: Arc<Self>) {
        let mut rx = self.cluster_state.subscribe();
        loop {
            match rx.recv().await {
                Ok(message) if message.instance_id == self.instance_id => {
                    // self-originated, already applied locally.
                }
                Ok(message) => self.apply_remote_delta(message.delta),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "cluster sync receiver lagged, peer deltas were dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    info!("cluster sync channel closed, stopping sync loop");
                    return;
                }
            }
        }
    }

    // ---- Node operations ----------------------------------------------

    /// `SetNodeInfo` (§4.2).
    pub async fn set_node_info(
        &self,
        node_id: NodeId,
        base_url: String,
        healthy: bool,
        geo: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Result<Node> {
        let node = self.nodes.set_node_info(node_id, base_url, healthy, geo, now);
        self.write_through_node(&node).await;
        Ok(node)
    }

    /// `UpdateNodeMetrics` (§4.2). Also folds in the stream-instance map and
    /// virtual-viewer reconciliation carried on the same heartbeat, per
    /// §4.4's node-lifecycle-update contract.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_node_metrics(
        &self,
        node_id: &NodeId,
        capacity: NodeCapacity,
        metrics: NodeMetrics,
        reported_mode: Option<NodeMode>,
        artifacts: Vec<NodeArtifactEntry>,
        total_connections: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Node>> {
        let Some(node) = self
            .nodes
            .update_node_metrics(node_id, capacity, metrics, reported_mode, artifacts, now)
        else {
            return Ok(None);
        };

        let outcome = self.viewers.reconcile(node_id, total_connections, self.viewer_confirm_timeout, now);
        if outcome.abandoned > 0 {
            self.nodes.adjust_pending_redirects(node_id, -(outcome.abandoned as i64));
        }
        let node = self
            .nodes
            .refresh_bandwidth_estimate(node_id, metrics.up_speed, total_connections)
            .unwrap_or(node);

        self.write_through_node(&node).await;
        Ok(Some(node))
    }

    pub async fn set_node_artifacts(&self, node_id: &NodeId, artifacts: Vec<NodeArtifactEntry>) -> Result<Option<Node>> {
        let node = self.nodes.set_node_artifacts(node_id, artifacts);
        if let Some(node) = &node {
            self.write_through_node(node).await;
        }
        Ok(node)
    }

    /// Advertised capabilities, as reported on a `node-lifecycle-update`
    /// heartbeat (§4.4). Authoritative `mode` is untouched by this call.
    pub async fn set_node_capabilities(&self, node_id: &NodeId, capabilities: NodeCapabilities) -> Result<Option<Node>> {
        let node = self.nodes.set_capabilities(node_id, capabilities);
        if let Some(node) = &node {
            self.write_through_node(node).await;
        }
        Ok(node)
    }

    pub fn set_mode(&self, node_id: &NodeId, mode: NodeMode) -> Option<Node> {
        self.nodes.set_mode(node_id, mode)
    }

    pub fn get_node(&self, node_id: &NodeId) -> Option<Node> {
        self.nodes.get(node_id)
    }

    async fn write_through_node(&self, node: &Node) {
        if self.node_policy.write_through {
            if let Some(repo) = &self.node_repo {
                if let Err(err) = repo.upsert(node).await {
                    warn!(%err, node_id = %node.node_id, "node write-through failed");
                }
            }
        }
        if let Ok(value) = serde_json::to_value(node) {
            self.publish(StateDelta::NodeUpserted(value)).await;
        }
    }

    // ---- Stream operations ---------------------------------------------

    /// `UpdateNodeStats` (§4.2).
    #[allow(clippy::too_many_arguments)]
    pub fn update_node_stats(
        &self,
        internal_name: InternalName,
        node_id: NodeId,
        tenant_id: TenantId,
        total_viewers: u64,
        inputs: u64,
        bytes_up: u64,
        bytes_down: u64,
        replicated: bool,
        now: DateTime<Utc>,
    ) -> StreamInstance {
        self.streams
            .update_node_stats(internal_name, node_id, tenant_id, total_viewers, inputs, bytes_up, bytes_down, replicated, now)
    }

    /// `UpdateStreamFromBuffer` (§4.2).
    pub fn update_stream_from_buffer(
        &self,
        internal_name: InternalName,
        node_id: NodeId,
        tenant_id: TenantId,
        buffer_state: BufferState,
        now: DateTime<Utc>,
    ) {
        self.streams.update_stream_from_buffer(internal_name, node_id, tenant_id, buffer_state, now);
    }

    pub fn update_track_list(&self, internal_name: &InternalName, tracks: Vec<TrackInfo>, now: DateTime<Utc>) {
        self.streams.update_track_list(internal_name, tracks, now);
    }

    /// `SetOffline` (§4.2).
    pub fn set_offline(&self, internal_name: &InternalName, node_id: &NodeId, now: DateTime<Utc>) {
        self.streams.set_offline(internal_name, node_id, now);
    }

    /// `UpdateUserConnection` (§4.2).
    pub fn update_user_connection(&self, internal_name: &InternalName, node_id: &NodeId, delta: i64, now: DateTime<Utc>) {
        self.streams.update_user_connection(internal_name, node_id, delta, now);
    }

    pub fn get_stream(&self, internal_name: &InternalName) -> Option<Stream> {
        self.streams.get(internal_name)
    }

    pub fn get_stream_instance(&self, internal_name: &InternalName, node_id: &NodeId) -> Option<StreamInstance> {
        self.streams.instance(internal_name, node_id)
    }

    // ---- Virtual-viewer operations --------------------------------------

    /// `RegisterPendingViewer` (§4.7): also increments the node's
    /// `pending_redirects`, which feeds the bandwidth penalty (§8 invariant 2).
    pub fn register_pending_viewer(
        &self,
        correlation_id: CorrelationId,
        node_id: NodeId,
        internal_name: InternalName,
        client_ip: IpAddr,
        now: DateTime<Utc>,
    ) -> VirtualViewer {
        let viewer = self.viewers.register_pending(correlation_id, node_id.clone(), internal_name, client_ip, now);
        self.nodes.adjust_pending_redirects(&node_id, 1);
        viewer
    }

    /// `ConfirmVirtualViewerByID` (§4.2, §8 invariant 7): idempotent.
    pub fn confirm_virtual_viewer_by_id(&self, key: &VirtualViewerKey, session_id: String, now: DateTime<Utc>) -> bool {
        let confirmed = self.viewers.confirm_by_id(key, session_id, now);
        if confirmed {
            self.nodes.adjust_pending_redirects(&key.node_id, -1);
        }
        confirmed
    }

    /// `DisconnectVirtualViewerBySessionID` (§4.2).
    pub fn disconnect_virtual_viewer_by_session_id(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        self.viewers.disconnect_by_session(session_id, now)
    }

    pub fn get_virtual_viewer(&self, key: &VirtualViewerKey) -> Option<VirtualViewer> {
        self.viewers.get(key)
    }

    // ---- Snapshot --------------------------------------------------------

    /// `GetBalancerSnapshotAtomic` (§4.2).
    pub fn get_balancer_snapshot(&self) -> BalancerSnapshot {
        BalancerSnapshot::new(self.nodes.snapshot(), self.streams.snapshot_instances())
    }

    /// `is_active` per node, evaluated against this manager's heartbeat
    /// window (§3 invariant 1). Exposed for the admin surface (§6.3) and for
    /// `BalancerSnapshot` consumers that need a specific `now`.
    pub fn is_node_active(&self, node: &Node, now: DateTime<Utc>) -> bool {
        node.is_active(now, self.heartbeat_window)
    }

    pub fn heartbeat_window(&self) -> ChronoDuration {
        self.heartbeat_window
    }

    // ---- Artifact operations --------------------------------------------

    pub async fn upsert_artifact(&self, artifact: Artifact) -> Result<()> {
        self.artifacts.upsert(artifact.clone());
        if self.artifact_policy.write_through {
            if let Some(repo) = &self.artifact_repo {
                repo.upsert(&artifact).await?;
            }
        }
        Ok(())
    }

    pub fn get_artifact(&self, hash: &foghorn_model::ids::ArtifactHash) -> Option<Artifact> {
        self.artifacts.get(hash)
    }

    pub async fn upsert_artifact_node(&self, row: ArtifactNode) -> Result<()> {
        self.artifacts.upsert_node_row(row.clone());
        if self.artifact_policy.write_through {
            if let Some(repo) = &self.artifact_node_repo {
                repo.upsert(&row).await?;
            }
        }
        Ok(())
    }

    /// Exposed to C6's jobs, which operate on `ArtifactStore` directly
    /// through this accessor rather than duplicating its query surface.
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    pub fn artifact_repo(&self) -> Option<&Arc<dyn ArtifactRepository>> {
        self.artifact_repo.as_ref()
    }

    pub fn artifact_node_repo(&self) -> Option<&Arc<dyn ArtifactNodeRepository>> {
        self.artifact_node_repo.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn manager() -> StateManager {
        StateManager::new(StateManagerConfig::default())
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9))
    }

    #[tokio::test]
    async fn registering_and_confirming_a_viewer_adjusts_node_bandwidth_penalty() {
        let manager = manager();
        let t0 = Utc::now();
        let node_id = NodeId::from("n1");
        manager.set_node_info(node_id.clone(), "http://n1".into(), true, None, t0).await.unwrap();
        manager
            .update_node_metrics(
                &node_id,
                NodeCapacity { bw_limit: 1_000_000, ..Default::default() },
                NodeMetrics { up_speed: 100_000, ..Default::default() },
                None,
                Vec::new(),
                0,
                t0,
            )
            .await
            .unwrap();

        let viewer = manager.register_pending_viewer(
            CorrelationId::new(),
            node_id.clone(),
            InternalName::from("s1"),
            ip(),
            t0,
        );
        let node = manager.get_node(&node_id).unwrap();
        // §8 invariant 2: add_bandwidth = pending_redirects * est_bandwidth_per_user.
        assert_eq!(node.pending_redirects, 1);
        assert_eq!(node.add_bandwidth, node.est_bandwidth_per_user);

        let confirmed = manager.confirm_virtual_viewer_by_id(&viewer.key(), "sess-1".into(), t0);
        assert!(confirmed);
        let node = manager.get_node(&node_id).unwrap();
        assert_eq!(node.pending_redirects, 0);
        assert_eq!(node.add_bandwidth, 0);
    }

    #[test]
    fn apply_remote_delta_upserts_a_decoded_node() {
        let manager = manager();
        let t0 = Utc::now();
        let remote_node_id = NodeId::from("remote-1");
        let mut node = Node::new(remote_node_id.clone(), "http://remote-1".into(), t0);
        node.pending_redirects = 4;
        let delta = StateDelta::NodeUpserted(serde_json::to_value(&node).unwrap());

        manager.apply_remote_delta(delta);

        let replayed = manager.get_node(&remote_node_id).unwrap();
        assert_eq!(replayed.base_url, "http://remote-1");
        assert_eq!(replayed.pending_redirects, 4);
    }

    #[test]
    fn apply_remote_delta_removes_a_node() {
        let manager = manager();
        let t0 = Utc::now();
        let node_id = NodeId::from("n1");
        manager.nodes.apply_remote(Node::new(node_id.clone(), "http://n1".into(), t0));
        assert!(manager.get_node(&node_id).is_some());

        manager.apply_remote_delta(StateDelta::NodeRemoved(node_id.to_string()));
        assert!(manager.get_node(&node_id).is_none());
    }

    #[tokio::test]
    async fn rehydrate_with_no_repositories_configured_leaves_state_empty() {
        let manager = manager();
        manager.rehydrate(Utc::now()).await;
        assert!(manager.get_balancer_snapshot().nodes.is_empty());
        let status = manager.rehydrate_status();
        assert!(status.nodes.last_run.is_none());
    }
}
