//! The tagged-union trigger envelope (§4.4, §6.1, §9 "tagged-union triggers"
//! redesign note): a sealed sum type, one variant per message kind, so a
//! handler either gets the payload it expects or a typed
//! `PayloadTypeMismatch` — never a dynamic cast that panics on a
//! mis-routed message.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use foghorn_model::geo::GeoPoint;
use foghorn_model::ids::{ArtifactHash, CorrelationId, InternalName, NodeId, StreamRegistryId, TenantId, UserId};
use foghorn_model::node::{NodeArtifactEntry, NodeCapabilities, NodeCapacity, NodeMetrics, NodeMode};
use foghorn_model::stream::{BufferState, TrackInfo};

/// One message kind, matching §6.1's envelope `trigger_type` tag. Carried
/// alongside `TriggerPayload` so a handler can check its own kind without
/// matching the payload twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    PushRewrite,
    PlayRewrite,
    StreamSource,
    PushEnd,
    PushOutStart,
    ViewerConnect,
    ViewerDisconnect,
    StreamBuffer,
    StreamEnd,
    TrackList,
    RecordingComplete,
    RecordingSegment,
    StreamLifecycleUpdate,
    ClientLifecycleUpdate,
    NodeLifecycleUpdate,
    ProcessBilling,
    StorageLifecycleUpdate,
    StorageSnapshot,
}

impl TriggerType {
    /// Whether this kind's reply is waited on synchronously by the edge
    /// node (§6.1).
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            TriggerType::PushRewrite
                | TriggerType::PlayRewrite
                | TriggerType::StreamSource
                | TriggerType::PushOutStart
                | TriggerType::ViewerConnect
        )
    }
}

/// Per-stream stats embedded in a `node-lifecycle-update` heartbeat (§4.4):
/// the balancer only considers a stream present at a node once that node
/// reports `inputs>0` for it, so these ride the same message as the node's
/// own metrics rather than arriving as separate triggers.
#[derive(Debug, Clone)]
pub struct EmbeddedStreamStats {
    pub internal_name: InternalName,
    pub tenant_id: TenantId,
    pub total_viewers: u64,
    pub inputs: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub replicated: bool,
}

#[derive(Debug, Clone)]
pub enum TriggerPayload {
    PushRewrite {
        stream_key: String,
        push_url: String,
        publisher_hostname: String,
    },
    PlayRewrite {
        requested_id: String,
        client_ip: Option<IpAddr>,
    },
    StreamSource {
        stream_name: String,
    },
    PushEnd {
        internal_name: InternalName,
    },
    PushOutStart {
        internal_name: InternalName,
    },
    ViewerConnect {
        internal_name: InternalName,
        request_url: String,
        session_id: String,
        client_ip: Option<IpAddr>,
    },
    ViewerDisconnect {
        internal_name: InternalName,
        session_id: String,
    },
    StreamBuffer {
        internal_name: InternalName,
        buffer_state: BufferState,
        issues: Vec<String>,
    },
    StreamEnd {
        internal_name: InternalName,
    },
    TrackList {
        internal_name: InternalName,
        tracks: Vec<TrackInfo>,
    },
    RecordingComplete {
        artifact_hash: ArtifactHash,
        size_bytes: u64,
    },
    RecordingSegment {
        artifact_hash: ArtifactHash,
        segment_index: u32,
    },
    StreamLifecycleUpdate {
        internal_name: InternalName,
        detail: serde_json::Value,
    },
    ClientLifecycleUpdate {
        session_id: String,
        detail: serde_json::Value,
    },
    NodeLifecycleUpdate {
        base_url: String,
        healthy: bool,
        geo: Option<GeoPoint>,
        capabilities: NodeCapabilities,
        capacity: NodeCapacity,
        metrics: NodeMetrics,
        reported_mode: Option<NodeMode>,
        artifacts: Vec<NodeArtifactEntry>,
        total_connections: u64,
        streams: Vec<EmbeddedStreamStats>,
    },
    ProcessBilling {
        tenant_id: TenantId,
    },
    StorageLifecycleUpdate {
        artifact_hash: ArtifactHash,
        detail: serde_json::Value,
    },
    StorageSnapshot {
        detail: serde_json::Value,
    },
}

impl TriggerPayload {
    pub fn kind(&self) -> TriggerType {
        match self {
            TriggerPayload::PushRewrite { .. } => TriggerType::PushRewrite,
            TriggerPayload::PlayRewrite { .. } => TriggerType::PlayRewrite,
            TriggerPayload::StreamSource { .. } => TriggerType::StreamSource,
            TriggerPayload::PushEnd { .. } => TriggerType::PushEnd,
            TriggerPayload::PushOutStart { .. } => TriggerType::PushOutStart,
            TriggerPayload::ViewerConnect { .. } => TriggerType::ViewerConnect,
            TriggerPayload::ViewerDisconnect { .. } => TriggerType::ViewerDisconnect,
            TriggerPayload::StreamBuffer { .. } => TriggerType::StreamBuffer,
            TriggerPayload::StreamEnd { .. } => TriggerType::StreamEnd,
            TriggerPayload::TrackList { .. } => TriggerType::TrackList,
            TriggerPayload::RecordingComplete { .. } => TriggerType::RecordingComplete,
            TriggerPayload::RecordingSegment { .. } => TriggerType::RecordingSegment,
            TriggerPayload::StreamLifecycleUpdate { .. } => TriggerType::StreamLifecycleUpdate,
            TriggerPayload::ClientLifecycleUpdate { .. } => TriggerType::ClientLifecycleUpdate,
            TriggerPayload::NodeLifecycleUpdate { .. } => TriggerType::NodeLifecycleUpdate,
            TriggerPayload::ProcessBilling { .. } => TriggerType::ProcessBilling,
            TriggerPayload::StorageLifecycleUpdate { .. } => TriggerType::StorageLifecycleUpdate,
            TriggerPayload::StorageSnapshot { .. } => TriggerType::StorageSnapshot,
        }
    }
}

/// The full wire envelope (§6.1). `trigger_type` is carried independently
/// of the payload so a handler can detect a mis-routed message
/// (`trigger_type` says one thing, `payload` holds another) rather than
/// trusting the payload's own tag.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub node_id: NodeId,
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub stream_id: Option<StreamRegistryId>,
    pub user_id: Option<UserId>,
    pub cluster_id: Option<String>,
    pub payload: TriggerPayload,
}

impl Trigger {
    pub fn blocking(&self) -> bool {
        self.trigger_type.is_blocking()
    }
}

/// Synchronous reply body for a blocking trigger (§6.1): the rewritten
/// stream name, a target URL, or the literal "true"/empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReply {
    StreamName(String),
    Path { value: String, abort: bool },
    Ack,
}
