//! Purge job (§4.6): daily, hard-deletes `deleted` artifacts older than 30
//! days with no non-orphaned node copy (S3 object/prefix first, then the DB
//! row), and hard-deletes `artifact_nodes` rows orphaned for more than 7
//! days. The dispatcher is unused here but kept alongside the cold-storage
//! handle for symmetry with the other jobs that talk to edge nodes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use foghorn_contracts::dispatch::CommandDispatcher;
use foghorn_contracts::storage::ColdStorage;
use tracing::{info, warn};

use crate::jobs::worker::Worker;
use crate::persistence::ArtifactRepository;
use crate::state::StateManager;

pub const INTERVAL: Duration = Duration::from_secs(86_400);
const PURGE_AFTER: ChronoDuration = ChronoDuration::days(30);
const HARD_DELETE_ORPHANED_NODE_ROWS_AFTER: ChronoDuration = ChronoDuration::days(7);

pub fn spawn(state: Arc<StateManager>, _dispatcher: Arc<dyn CommandDispatcher>, cold_storage: Arc<dyn ColdStorage>) -> Worker {
    Worker::spawn("purge", INTERVAL, move || {
        let state = Arc::clone(&state);
        let cold_storage = Arc::clone(&cold_storage);
        async move {
            let now = chrono::Utc::now();

            let unreferenced = state.artifacts().deleted_and_unreferenced(now, PURGE_AFTER);
            if !unreferenced.is_empty() {
                info!(count = unreferenced.len(), "hard-deleting purge-eligible artifacts");
            }
            for artifact in unreferenced {
                let prefix = artifact.artifact_hash.to_string();
                if let Err(err) = cold_storage.delete_prefix(&prefix).await {
                    warn!(%err, artifact_hash = %artifact.artifact_hash, "s3 cleanup failed, skipping db delete this tick");
                    continue;
                }
                if let Some(repo) = state.artifact_repo() {
                    if let Err(err) = repo.delete(&artifact.artifact_hash).await {
                        warn!(%err, artifact_hash = %artifact.artifact_hash, "db delete failed after s3 cleanup, will retry next tick");
                        continue;
                    }
                }
                state.artifacts().remove(&artifact.artifact_hash);
            }

            let stale_rows = state.artifacts().orphaned_node_rows_older_than(now, HARD_DELETE_ORPHANED_NODE_ROWS_AFTER);
            if stale_rows.is_empty() {
                return;
            }
            info!(count = stale_rows.len(), "hard-deleting artifact_nodes rows orphaned over 7d");
            for row in stale_rows {
                if let Some(repo) = state.artifact_node_repo() {
                    if let Err(err) = repo.delete(&row.artifact_hash, &row.node_id).await {
                        warn!(%err, artifact_hash = %row.artifact_hash, node_id = %row.node_id, "orphaned row hard-delete write-through failed");
                        continue;
                    }
                }
                state.artifacts().remove_node_row(&row.artifact_hash, &row.node_id);
            }
        }
    })
}
