//! Repository ports for the state manager's write-through/rehydrate
//! policies (§4.2, §6.6). Grouped by entity the same way the state maps
//! are: one port per write-through-able entity type.
//!
//! Clips and DVR requests are represented as `Artifact` rows distinguished
//! by `ArtifactType` (§3's "artifacts (clip/dvr/vod with type tag)"),
//! rather than separate tables — `ArtifactRepository` covers all three via
//! its `artifact_type` filter. Recorded as an Open Question decision.

use async_trait::async_trait;
use foghorn_model::artifact::{Artifact, ArtifactNode, ArtifactType};
use foghorn_model::ids::{ArtifactHash, NodeId};
use foghorn_model::node::Node;

use crate::error::Result;

#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn upsert(&self, node: &Node) -> Result<()>;
    async fn delete(&self, node_id: &NodeId) -> Result<()>;
    async fn list_all(&self) -> Result<Vec<Node>>;
}

#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn upsert(&self, artifact: &Artifact) -> Result<()>;
    async fn delete(&self, hash: &ArtifactHash) -> Result<()>;
    async fn list_all(&self) -> Result<Vec<Artifact>>;
    async fn list_by_type(&self, artifact_type: ArtifactType) -> Result<Vec<Artifact>>;
}

#[async_trait]
pub trait ArtifactNodeRepository: Send + Sync {
    async fn upsert(&self, row: &ArtifactNode) -> Result<()>;
    async fn delete(&self, hash: &ArtifactHash, node_id: &NodeId) -> Result<()>;
    async fn list_all(&self) -> Result<Vec<ArtifactNode>>;
}
