use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use foghorn_model::artifact::{Artifact, ArtifactNode, ArtifactStatus, StorageLocation};
use foghorn_model::ids::{ArtifactHash, NodeId};
use parking_lot::RwLock;

/// Artifacts and the `artifact_nodes` membership relation (§3). Node-local
/// artifact inventories (used to resolve VOD file paths) live on `Node`
/// itself in `NodeStore`; this store is the global lifecycle view consumed
/// by the retention/orphan/purge jobs (§4.6).
#[derive(Default)]
pub struct ArtifactStore {
    artifacts: RwLock<HashMap<ArtifactHash, Artifact>>,
    artifact_nodes: RwLock<HashMap<(ArtifactHash, NodeId), ArtifactNode>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, artifact: Artifact) {
        self.artifacts.write().insert(artifact.artifact_hash.clone(), artifact);
    }

    pub fn get(&self, hash: &ArtifactHash) -> Option<Artifact> {
        self.artifacts.read().get(hash).cloned()
    }

    pub fn snapshot(&self) -> Vec<Artifact> {
        self.artifacts.read().values().cloned().collect()
    }

    pub fn replace_all(&self, artifacts: Vec<Artifact>) {
        let mut guard = self.artifacts.write();
        guard.clear();
        for artifact in artifacts {
            guard.insert(artifact.artifact_hash.clone(), artifact);
        }
    }

    /// §4.6 retention job: mark artifacts whose `retention_until` has
    /// passed as soft-deleted, returning the hashes touched.
    pub fn mark_expired_deleted(&self, now: DateTime<Utc>) -> Vec<ArtifactHash> {
        let mut guard = self.artifacts.write();
        let mut touched = Vec::new();
        for artifact in guard.values_mut() {
            if artifact.status != ArtifactStatus::Deleted
                && artifact.retention_until.is_some_and(|until| until < now)
            {
                artifact.mark_deleted(now);
                touched.push(artifact.artifact_hash.clone());
            }
        }
        touched
    }

    pub fn mark_deleted(&self, hash: &ArtifactHash, now: DateTime<Utc>) -> bool {
        let mut guard = self.artifacts.write();
        match guard.get_mut(hash) {
            Some(artifact) => {
                artifact.mark_deleted(now);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, hash: &ArtifactHash) {
        self.artifacts.write().remove(hash);
        self.artifact_nodes.write().retain(|(h, _), _| h != hash);
    }

    /// §4.6 stale-defrost job: artifacts stuck in `Defrosting` longer than
    /// `threshold`, reset to `S3`.
    pub fn reset_stuck_defrosting(&self, now: DateTime<Utc>, threshold: ChronoDuration) -> Vec<ArtifactHash> {
        let mut guard = self.artifacts.write();
        let mut touched = Vec::new();
        for artifact in guard.values_mut() {
            if artifact.is_stuck_defrosting(now, threshold) {
                artifact.storage_location = StorageLocation::S3;
                artifact.defrost_started_at = None;
                artifact.updated_at = now;
                touched.push(artifact.artifact_hash.clone());
            }
        }
        touched
    }

    /// §4.6 purge job: `deleted` artifacts older than `max_age` with no
    /// non-orphaned node copy remaining (§8 invariant 10).
    pub fn deleted_and_unreferenced(&self, now: DateTime<Utc>, max_age: ChronoDuration) -> Vec<Artifact> {
        let artifacts = self.artifacts.read();
        let nodes = self.artifact_nodes.read();
        artifacts
            .values()
            .filter(|a| {
                a.status == ArtifactStatus::Deleted && now - a.updated_at > max_age
            })
            .filter(|a| {
                !nodes
                    .values()
                    .any(|n| n.artifact_hash == a.artifact_hash && !n.orphaned)
            })
            .cloned()
            .collect()
    }

    /// §4.6 orphan-reconciliation job: `deleted` artifacts older than
    /// `min_age` that still have a non-orphaned node row (a delete command
    /// needs to be resent).
    pub fn deleted_with_live_node_copies(&self, now: DateTime<Utc>, min_age: ChronoDuration) -> Vec<(Artifact, Vec<ArtifactNode>)> {
        let artifacts = self.artifacts.read();
        let nodes = self.artifact_nodes.read();
        artifacts
            .values()
            .filter(|a| a.status == ArtifactStatus::Deleted && now - a.updated_at > min_age)
            .filter_map(|a| {
                let live: Vec<ArtifactNode> = nodes
                    .values()
                    .filter(|n| n.artifact_hash == a.artifact_hash && !n.orphaned)
                    .cloned()
                    .collect();
                (!live.is_empty()).then(|| (a.clone(), live))
            })
            .collect()
    }

    pub fn upsert_node_row(&self, row: ArtifactNode) {
        self.artifact_nodes
            .write()
            .insert((row.artifact_hash.clone(), row.node_id.clone()), row);
    }

    pub fn mark_node_orphaned(&self, hash: &ArtifactHash, node_id: &NodeId, now: DateTime<Utc>) {
        if let Some(row) = self.artifact_nodes.write().get_mut(&(hash.clone(), node_id.clone())) {
            row.mark_orphaned(now);
        }
    }

    pub fn remove_node_row(&self, hash: &ArtifactHash, node_id: &NodeId) {
        self.artifact_nodes.write().remove(&(hash.clone(), node_id.clone()));
    }

    /// Node rows orphaned for longer than `threshold` (dropped by the
    /// orphan job; hard-purged by the purge job at a longer threshold).
    pub fn orphaned_node_rows_older_than(&self, now: DateTime<Utc>, threshold: ChronoDuration) -> Vec<ArtifactNode> {
        self.artifact_nodes
            .read()
            .values()
            .filter(|n| n.orphaned_longer_than(now, threshold))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use foghorn_model::artifact::ArtifactType;
    use foghorn_model::ids::{InternalName, TenantId};

    use super::*;

    fn hash(s: &str) -> ArtifactHash {
        ArtifactHash::from(s)
    }

    fn new_artifact(now: DateTime<Utc>) -> Artifact {
        Artifact::new(
            hash("h1"),
            ArtifactType::Clip,
            TenantId::new(),
            InternalName::from("s1"),
            "mp4".into(),
            now,
        )
    }

    #[test]
    fn retention_marks_only_expired_artifacts_deleted() {
        let store = ArtifactStore::new();
        let t0 = Utc::now();
        let mut expired = new_artifact(t0);
        expired.retention_until = Some(t0 - ChronoDuration::seconds(1));
        let mut fresh = new_artifact(t0);
        fresh.artifact_hash = hash("h2");
        fresh.retention_until = Some(t0 + ChronoDuration::hours(1));
        store.upsert(expired);
        store.upsert(fresh);

        let touched = store.mark_expired_deleted(t0);
        assert_eq!(touched, vec![hash("h1")]);
        assert_eq!(store.get(&hash("h1")).unwrap().status, ArtifactStatus::Deleted);
        assert_eq!(store.get(&hash("h2")).unwrap().status, ArtifactStatus::Recording);
    }

    #[test]
    fn stale_defrost_reset_to_s3() {
        let store = ArtifactStore::new();
        let t0 = Utc::now();
        let mut artifact = new_artifact(t0);
        artifact.storage_location = StorageLocation::Defrosting;
        artifact.defrost_started_at = Some(t0 - ChronoDuration::minutes(15));
        store.upsert(artifact);

        let touched = store.reset_stuck_defrosting(t0, ChronoDuration::minutes(10));
        assert_eq!(touched, vec![hash("h1")]);
        let reloaded = store.get(&hash("h1")).unwrap();
        assert_eq!(reloaded.storage_location, StorageLocation::S3);
        assert!(reloaded.defrost_started_at.is_none());
    }

    #[test]
    fn purge_never_selects_artifact_with_non_orphaned_node_copy() {
        let store = ArtifactStore::new();
        let t0 = Utc::now();
        let mut deleted = new_artifact(t0 - ChronoDuration::days(40));
        deleted.status = ArtifactStatus::Deleted;
        deleted.updated_at = t0 - ChronoDuration::days(40);
        store.upsert(deleted);
        store.upsert_node_row(ArtifactNode::new(hash("h1"), NodeId::from("n1"), t0));

        // §8 invariant 10: a non-orphaned node row blocks purge eligibility.
        assert!(store.deleted_and_unreferenced(t0, ChronoDuration::days(30)).is_empty());

        store.mark_node_orphaned(&hash("h1"), &NodeId::from("n1"), t0);
        let eligible = store.deleted_and_unreferenced(t0, ChronoDuration::days(30));
        assert_eq!(eligible.len(), 1);
    }

    #[test]
    fn orphan_job_finds_deleted_artifacts_with_live_node_copies() {
        let store = ArtifactStore::new();
        let t0 = Utc::now();
        let mut deleted = new_artifact(t0 - ChronoDuration::minutes(40));
        deleted.status = ArtifactStatus::Deleted;
        deleted.updated_at = t0 - ChronoDuration::minutes(40);
        store.upsert(deleted);
        store.upsert_node_row(ArtifactNode::new(hash("h1"), NodeId::from("n1"), t0));

        let pending = store.deleted_with_live_node_copies(t0, ChronoDuration::minutes(30));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.len(), 1);
    }
}
