//! Stale-defrost reset job (§4.6): every minute, any artifact stuck in
//! `defrosting` for more than 10 minutes is reset to `s3`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::info;

use crate::jobs::worker::Worker;
use crate::persistence::ArtifactRepository;
use crate::state::StateManager;

pub const INTERVAL: Duration = Duration::from_secs(60);
const STUCK_THRESHOLD: ChronoDuration = ChronoDuration::minutes(10);

pub fn spawn(state: Arc<StateManager>) -> Worker {
    Worker::spawn("stale-defrost", INTERVAL, move || {
        let state = Arc::clone(&state);
        async move {
            let now = chrono::Utc::now();
            let touched = state.artifacts().reset_stuck_defrosting(now, STUCK_THRESHOLD);
            if touched.is_empty() {
                return;
            }
            info!(count = touched.len(), "reset stuck defrosting artifacts to s3");
            if let Some(repo) = state.artifact_repo() {
                for hash in &touched {
                    let Some(artifact) = state.artifacts().get(hash) else { continue };
                    if let Err(err) = repo.upsert(&artifact).await {
                        tracing::warn!(%err, artifact_hash = %hash, "stale-defrost write-through failed, will retry next tick");
                    }
                }
            }
        }
    })
}
