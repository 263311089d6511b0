//! The shape C4 (trigger processor) and C6 (artifact jobs) see of C5 (the
//! control-plane RPC server): a request/reply call keyed by node id, with
//! request-id correlation handled inside the implementation (§4.5).

use std::time::Duration;

use async_trait::async_trait;
use foghorn_model::ids::{ArtifactHash, InternalName, NodeId, TenantId};

use crate::error::Result;

#[derive(Debug, Clone)]
pub enum Command {
    ClipCreate {
        artifact_hash: ArtifactHash,
        source_stream: InternalName,
        tenant_id: TenantId,
    },
    ClipDelete {
        artifact_hash: ArtifactHash,
    },
    DvrStart {
        internal_name: InternalName,
        tenant_id: TenantId,
    },
    DvrStop {
        internal_name: InternalName,
    },
    ConfigSeed {
        config: serde_json::Value,
    },
    ArtifactDelete {
        artifact_hash: ArtifactHash,
    },
}

#[derive(Debug, Clone)]
pub enum Reply {
    Progress { percent: u8 },
    Done,
    DeleteAck,
    Error { message: String },
}

/// Default timeout for a dispatched command when the caller doesn't name
/// one explicitly (§5: 10-30s typical for RPCs to edge nodes).
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(20);

#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Send `command` to `node_id` and wait (bounded by `timeout`) for its
    /// correlated reply. Returns `ContractError::Unavailable` if the node
    /// has no open control stream, and `ContractError::Internal` on
    /// timeout.
    async fn dispatch(
        &self,
        node_id: &NodeId,
        command: Command,
        timeout: Duration,
    ) -> Result<Reply>;
}
