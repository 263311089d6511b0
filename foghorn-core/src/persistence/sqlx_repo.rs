//! Postgres-backed implementations of the repository ports, used for
//! write-through and boot rehydrate (§4.2, §6.6). Nested structures
//! (capabilities, capacity, metrics, the artifact inventory) are stored as
//! `jsonb` columns rather than normalized out, since nothing ever queries
//! into them relationally — only the top-level identity/status columns do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use foghorn_model::artifact::{Artifact, ArtifactNode, ArtifactStatus, ArtifactType, StorageLocation};
use foghorn_model::geo::GeoPoint;
use foghorn_model::ids::{ArtifactHash, InternalName, NodeId, TenantId};
use foghorn_model::node::{Node, NodeArtifactEntry, NodeCapabilities, NodeCapacity, NodeMetrics, NodeMode};

use crate::error::{FoghornError, Result};
use crate::persistence::ports::{ArtifactNodeRepository, ArtifactRepository, NodeRepository};

fn mode_str(mode: NodeMode) -> &'static str {
    match mode {
        NodeMode::Normal => "normal",
        NodeMode::Draining => "draining",
        NodeMode::Maintenance => "maintenance",
    }
}

fn parse_mode(s: &str) -> NodeMode {
    match s {
        "draining" => NodeMode::Draining,
        "maintenance" => NodeMode::Maintenance,
        _ => NodeMode::Normal,
    }
}

fn artifact_type_str(t: ArtifactType) -> &'static str {
    match t {
        ArtifactType::Clip => "clip",
        ArtifactType::Dvr => "dvr",
        ArtifactType::Vod => "vod",
    }
}

fn parse_artifact_type(s: &str) -> ArtifactType {
    match s {
        "dvr" => ArtifactType::Dvr,
        "vod" => ArtifactType::Vod,
        _ => ArtifactType::Clip,
    }
}

fn artifact_status_str(s: ArtifactStatus) -> &'static str {
    match s {
        ArtifactStatus::Recording => "recording",
        ArtifactStatus::Processing => "processing",
        ArtifactStatus::Ready => "ready",
        ArtifactStatus::Failed => "failed",
        ArtifactStatus::Deleted => "deleted",
    }
}

fn parse_artifact_status(s: &str) -> ArtifactStatus {
    match s {
        "processing" => ArtifactStatus::Processing,
        "ready" => ArtifactStatus::Ready,
        "failed" => ArtifactStatus::Failed,
        "deleted" => ArtifactStatus::Deleted,
        _ => ArtifactStatus::Recording,
    }
}

fn storage_location_str(l: StorageLocation) -> &'static str {
    match l {
        StorageLocation::Local => "local",
        StorageLocation::S3 => "s3",
        StorageLocation::Defrosting => "defrosting",
        StorageLocation::Freezing => "freezing",
    }
}

fn parse_storage_location(s: &str) -> StorageLocation {
    match s {
        "s3" => StorageLocation::S3,
        "defrosting" => StorageLocation::Defrosting,
        "freezing" => StorageLocation::Freezing,
        _ => StorageLocation::Local,
    }
}

#[derive(Clone, Debug)]
pub struct PostgresNodeRepository {
    pool: PgPool,
}

impl PostgresNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeRepository for PostgresNodeRepository {
    async fn upsert(&self, node: &Node) -> Result<()> {
        let lat = node.geo.map(GeoPoint::lat);
        let lon = node.geo.map(GeoPoint::lon);
        let capabilities = serde_json::to_value(&node.capabilities)
            .map_err(FoghornError::Serialization)?;
        let capacity = serde_json::to_value(node.capacity)
            .map_err(FoghornError::Serialization)?;
        let artifacts = serde_json::to_value(&node.artifacts)
            .map_err(FoghornError::Serialization)?;

        sqlx::query!(
            r#"
            INSERT INTO nodes (
                node_id, base_url, geo_lat, geo_lon, capabilities, capacity,
                mode, reported_mode, last_update, heartbeat_interval_secs,
                artifacts, pending_redirects, add_bandwidth, est_bandwidth_per_user
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (node_id) DO UPDATE SET
                base_url = EXCLUDED.base_url,
                geo_lat = EXCLUDED.geo_lat,
                geo_lon = EXCLUDED.geo_lon,
                capabilities = EXCLUDED.capabilities,
                capacity = EXCLUDED.capacity,
                mode = EXCLUDED.mode,
                reported_mode = EXCLUDED.reported_mode,
                last_update = EXCLUDED.last_update,
                heartbeat_interval_secs = EXCLUDED.heartbeat_interval_secs,
                artifacts = EXCLUDED.artifacts,
                pending_redirects = EXCLUDED.pending_redirects,
                add_bandwidth = EXCLUDED.add_bandwidth,
                est_bandwidth_per_user = EXCLUDED.est_bandwidth_per_user
            "#,
            node.node_id.as_str(),
            node.base_url,
            lat,
            lon,
            capabilities,
            capacity,
            mode_str(node.mode),
            node.reported_mode.map(mode_str),
            node.last_update,
            node.heartbeat_interval.num_seconds(),
            artifacts,
            node.pending_redirects as i64,
            node.add_bandwidth as i64,
            node.est_bandwidth_per_user as i64,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FoghornError::Internal(format!("failed to upsert node: {e}")))?;

        Ok(())
    }

    async fn delete(&self, node_id: &NodeId) -> Result<()> {
        sqlx::query!("DELETE FROM nodes WHERE node_id = $1", node_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| FoghornError::Internal(format!("failed to delete node: {e}")))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Node>> {
        let rows = sqlx::query!(
            r#"
            SELECT
                node_id, base_url, geo_lat, geo_lon, capabilities, capacity,
                mode, reported_mode, last_update, heartbeat_interval_secs,
                artifacts, pending_redirects, add_bandwidth, est_bandwidth_per_user
            FROM nodes
            "#
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FoghornError::Internal(format!("failed to list nodes: {e}")))?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            let geo = match (row.geo_lat, row.geo_lon) {
                (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).ok(),
                _ => None,
            };
            let capabilities: NodeCapabilities = serde_json::from_value(row.capabilities)
                .map_err(FoghornError::Serialization)?;
            let capacity: NodeCapacity = serde_json::from_value(row.capacity)
                .map_err(FoghornError::Serialization)?;
            let artifacts: Vec<NodeArtifactEntry> = serde_json::from_value(row.artifacts)
                .map_err(FoghornError::Serialization)?;

            nodes.push(Node {
                node_id: NodeId::from(row.node_id),
                base_url: row.base_url,
                geo,
                capabilities,
                capacity,
                metrics: NodeMetrics::default(),
                mode: parse_mode(&row.mode),
                reported_mode: row.reported_mode.as_deref().map(parse_mode),
                last_update: row.last_update,
                heartbeat_interval: chrono::Duration::seconds(row.heartbeat_interval_secs),
                artifacts,
                pending_redirects: row.pending_redirects as u64,
                add_bandwidth: row.add_bandwidth as u64,
                est_bandwidth_per_user: row.est_bandwidth_per_user as u64,
            });
        }
        Ok(nodes)
    }
}

#[derive(Clone, Debug)]
pub struct PostgresArtifactRepository {
    pool: PgPool,
}

impl PostgresArtifactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_artifact(
        artifact_hash: String,
        artifact_type: String,
        tenant_id: uuid::Uuid,
        source_stream: String,
        format: String,
        size_bytes: i64,
        status: String,
        storage_location: String,
        sync_status: String,
        retention_until: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        defrost_started_at: Option<DateTime<Utc>>,
    ) -> Artifact {
        Artifact {
            artifact_hash: ArtifactHash::from(artifact_hash),
            artifact_type: parse_artifact_type(&artifact_type),
            tenant_id: TenantId::from(tenant_id),
            source_stream: InternalName::from(source_stream),
            format,
            size_bytes: size_bytes as u64,
            status: parse_artifact_status(&status),
            storage_location: parse_storage_location(&storage_location),
            sync_status,
            retention_until,
            created_at,
            updated_at,
            defrost_started_at,
        }
    }
}

#[async_trait]
impl ArtifactRepository for PostgresArtifactRepository {
    async fn upsert(&self, artifact: &Artifact) -> Result<()> {
        sqlx::query!(
            r#"
            INSERT INTO artifacts (
                artifact_hash, artifact_type, tenant_id, source_stream, format,
                size_bytes, status, storage_location, sync_status,
                retention_until, created_at, updated_at, defrost_started_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (artifact_hash) DO UPDATE SET
                status = EXCLUDED.status,
                storage_location = EXCLUDED.storage_location,
                sync_status = EXCLUDED.sync_status,
                size_bytes = EXCLUDED.size_bytes,
                retention_until = EXCLUDED.retention_until,
                updated_at = EXCLUDED.updated_at,
                defrost_started_at = EXCLUDED.defrost_started_at
            "#,
            artifact.artifact_hash.as_str(),
            artifact_type_str(artifact.artifact_type),
            artifact.tenant_id.as_uuid(),
            artifact.source_stream.as_str(),
            artifact.format,
            artifact.size_bytes as i64,
            artifact_status_str(artifact.status),
            storage_location_str(artifact.storage_location),
            artifact.sync_status,
            artifact.retention_until,
            artifact.created_at,
            artifact.updated_at,
            artifact.defrost_started_at,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FoghornError::Internal(format!("failed to upsert artifact: {e}")))?;

        Ok(())
    }

    async fn delete(&self, hash: &ArtifactHash) -> Result<()> {
        sqlx::query!("DELETE FROM artifacts WHERE artifact_hash = $1", hash.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| FoghornError::Internal(format!("failed to delete artifact: {e}")))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Artifact>> {
        let rows = sqlx::query!(
            r#"
            SELECT
                artifact_hash, artifact_type, tenant_id, source_stream, format,
                size_bytes, status, storage_location, sync_status,
                retention_until, created_at, updated_at, defrost_started_at
            FROM artifacts
            "#
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FoghornError::Internal(format!("failed to list artifacts: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| {
                Self::row_to_artifact(
                    r.artifact_hash,
                    r.artifact_type,
                    r.tenant_id,
                    r.source_stream,
                    r.format,
                    r.size_bytes,
                    r.status,
                    r.storage_location,
                    r.sync_status,
                    r.retention_until,
                    r.created_at,
                    r.updated_at,
                    r.defrost_started_at,
                )
            })
            .collect())
    }

    async fn list_by_type(&self, artifact_type: ArtifactType) -> Result<Vec<Artifact>> {
        let type_str = artifact_type_str(artifact_type);
        let rows = sqlx::query!(
            r#"
            SELECT
                artifact_hash, artifact_type, tenant_id, source_stream, format,
                size_bytes, status, storage_location, sync_status,
                retention_until, created_at, updated_at, defrost_started_at
            FROM artifacts
            WHERE artifact_type = $1
            "#,
            type_str
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FoghornError::Internal(format!("failed to list artifacts by type: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| {
                Self::row_to_artifact(
                    r.artifact_hash,
                    r.artifact_type,
                    r.tenant_id,
                    r.source_stream,
                    r.format,
                    r.size_bytes,
                    r.status,
                    r.storage_location,
                    r.sync_status,
                    r.retention_until,
                    r.created_at,
                    r.updated_at,
                    r.defrost_started_at,
                )
            })
            .collect())
    }
}

#[derive(Clone, Debug)]
pub struct PostgresArtifactNodeRepository {
    pool: PgPool,
}

impl PostgresArtifactNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactNodeRepository for PostgresArtifactNodeRepository {
    async fn upsert(&self, row: &ArtifactNode) -> Result<()> {
        sqlx::query!(
            r#"
            INSERT INTO artifact_nodes (artifact_hash, node_id, orphaned, orphaned_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (artifact_hash, node_id) DO UPDATE SET
                orphaned = EXCLUDED.orphaned,
                orphaned_at = EXCLUDED.orphaned_at,
                last_seen_at = EXCLUDED.last_seen_at
            "#,
            row.artifact_hash.as_str(),
            row.node_id.as_str(),
            row.orphaned,
            row.orphaned_at,
            row.last_seen_at,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FoghornError::Internal(format!("failed to upsert artifact_node: {e}")))?;

        Ok(())
    }

    async fn delete(&self, hash: &ArtifactHash, node_id: &NodeId) -> Result<()> {
        sqlx::query!(
            "DELETE FROM artifact_nodes WHERE artifact_hash = $1 AND node_id = $2",
            hash.as_str(),
            node_id.as_str()
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FoghornError::Internal(format!("failed to delete artifact_node: {e}")))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ArtifactNode>> {
        let rows = sqlx::query!(
            r#"
            SELECT artifact_hash, node_id, orphaned, orphaned_at, last_seen_at
            FROM artifact_nodes
            "#
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FoghornError::Internal(format!("failed to list artifact_nodes: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| ArtifactNode {
                artifact_hash: ArtifactHash::from(r.artifact_hash),
                node_id: NodeId::from(r.node_id),
                orphaned: r.orphaned,
                orphaned_at: r.orphaned_at,
                last_seen_at: r.last_seen_at,
            })
            .collect())
    }
}
