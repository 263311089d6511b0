//! Retention job (§4.6): hourly, soft-deletes artifacts whose
//! `retention_until` has passed.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::jobs::worker::Worker;
use crate::persistence::ArtifactRepository;
use crate::state::StateManager;

pub const INTERVAL: Duration = Duration::from_secs(3600);

pub fn spawn(state: Arc<StateManager>) -> Worker {
    Worker::spawn("retention", INTERVAL, move || {
        let state = Arc::clone(&state);
        async move {
            let now = chrono::Utc::now();
            let touched = state.artifacts().mark_expired_deleted(now);
            if touched.is_empty() {
                return;
            }
            info!(count = touched.len(), "marked artifacts deleted on retention expiry");
            if let Some(repo) = state.artifact_repo() {
                for hash in &touched {
                    let Some(artifact) = state.artifacts().get(hash) else { continue };
                    if let Err(err) = repo.upsert(&artifact).await {
                        tracing::warn!(%err, artifact_hash = %hash, "retention write-through failed, will retry next tick");
                    }
                }
            }
        }
    })
}
