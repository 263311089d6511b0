use chrono::{DateTime, Utc};

use crate::ids::{ArtifactHash, InternalName, NodeId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArtifactType {
    Clip,
    Dvr,
    Vod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArtifactStatus {
    Recording,
    Processing,
    Ready,
    Failed,
    /// Logically deleted; physical cleanup happens via the orphan/purge
    /// jobs (§3 invariant).
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageLocation {
    Local,
    S3,
    Defrosting,
    Freezing,
}

/// A clip, DVR recording, or uploaded VOD asset (§3), identified by its
/// content-addressed hash.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Artifact {
    pub artifact_hash: ArtifactHash,
    pub artifact_type: ArtifactType,
    pub tenant_id: TenantId,
    pub source_stream: InternalName,
    pub format: String,
    pub size_bytes: u64,
    pub status: ArtifactStatus,
    pub storage_location: StorageLocation,
    pub sync_status: String,
    pub retention_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when `storage_location == Defrosting`; used by the stale-defrost
    /// reset job (§4.6) to detect a stuck transition.
    pub defrost_started_at: Option<DateTime<Utc>>,
}

impl Artifact {
    pub fn new(
        artifact_hash: ArtifactHash,
        artifact_type: ArtifactType,
        tenant_id: TenantId,
        source_stream: InternalName,
        format: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            artifact_hash,
            artifact_type,
            tenant_id,
            source_stream,
            format,
            size_bytes: 0,
            status: ArtifactStatus::Recording,
            storage_location: StorageLocation::Local,
            sync_status: "pending".to_string(),
            retention_until: None,
            created_at: now,
            updated_at: now,
            defrost_started_at: None,
        }
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.status = ArtifactStatus::Deleted;
        self.updated_at = now;
    }

    /// §3 invariant: a `defrosting` artifact whose `defrost_started_at` is
    /// older than `threshold` is stuck and should be reset to `s3`.
    pub fn is_stuck_defrosting(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.storage_location == StorageLocation::Defrosting
            && self
                .defrost_started_at
                .is_some_and(|started| now - started > threshold)
    }
}

/// A row in the `artifact_nodes` relation: which nodes hold a copy of an
/// artifact, and whether that copy is orphaned (§3).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArtifactNode {
    pub artifact_hash: ArtifactHash,
    pub node_id: NodeId,
    pub orphaned: bool,
    pub orphaned_at: Option<DateTime<Utc>>,
    pub last_seen_at: DateTime<Utc>,
}

impl ArtifactNode {
    pub fn new(artifact_hash: ArtifactHash, node_id: NodeId, now: DateTime<Utc>) -> Self {
        Self {
            artifact_hash,
            node_id,
            orphaned: false,
            orphaned_at: None,
            last_seen_at: now,
        }
    }

    pub fn mark_orphaned(&mut self, now: DateTime<Utc>) {
        if !self.orphaned {
            self.orphaned = true;
            self.orphaned_at = Some(now);
        }
    }

    pub fn orphaned_longer_than(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.orphaned
            && self
                .orphaned_at
                .is_some_and(|at| now - at > threshold)
    }
}
