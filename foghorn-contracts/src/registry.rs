//! The tenant/stream-key registry service ("Commodore"), consumed only
//! through this trait (spec §1: explicitly out of scope as an
//! implementation, but its contract is load-bearing for C4).

use async_trait::async_trait;
use foghorn_model::ids::{InternalName, StreamRegistryId, TenantId, UserId};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BillingModel {
    Postpaid,
    Prepaid,
}

/// Result of validating a publisher's stream key (§4.4 push-rewrite).
#[derive(Debug, Clone)]
pub struct StreamKeyValidation {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub internal_name: InternalName,
    pub stream_id: StreamRegistryId,
    pub billing_model: BillingModel,
    pub is_suspended: bool,
    pub is_balance_negative: bool,
    pub is_recording_enabled: bool,
}

/// What kind of public identifier `resolve` was given (§4.4 play-rewrite /
/// stream-source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    InternalName,
    PlaybackId,
    ClipHash,
    DvrHash,
    VodHash,
}

/// A resolved viewer-facing reference, independent of whether it turned out
/// to be a live stream or a stored artifact.
#[derive(Debug, Clone)]
pub enum ResolvedTarget {
    Live {
        internal_name: InternalName,
        tenant_id: TenantId,
    },
    Artifact {
        artifact_hash: foghorn_model::ids::ArtifactHash,
        tenant_id: TenantId,
    },
}

impl ResolvedTarget {
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            ResolvedTarget::Live { tenant_id, .. } => tenant_id,
            ResolvedTarget::Artifact { tenant_id, .. } => tenant_id,
        }
    }
}

#[async_trait]
pub trait RegistryResolver: Send + Sync {
    /// §4.4 push-rewrite: validate a publisher's stream key.
    async fn validate_stream_key(&self, stream_key: &str) -> Result<StreamKeyValidation>;

    /// §4.4 play-rewrite / stream-source: resolve any viewer-facing
    /// identifier (internal name, playback id, clip/DVR/VOD hash) to its
    /// canonical target.
    async fn resolve(&self, kind: ResolveKind, id: &str) -> Result<ResolvedTarget>;
}
