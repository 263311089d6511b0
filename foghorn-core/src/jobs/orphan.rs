//! Orphan reconciliation job (§4.6, scenario 5): every 5 minutes, resend
//! the delete command for `deleted` artifacts that still have a
//! non-orphaned node copy, and drop `artifact_nodes` rows that have been
//! orphaned for more than 24h.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use foghorn_contracts::dispatch::{Command, CommandDispatcher, Reply, DEFAULT_DISPATCH_TIMEOUT};
use tracing::{info, warn};

use crate::jobs::worker::Worker;
use crate::state::StateManager;

pub const INTERVAL: Duration = Duration::from_secs(300);
/// "Older than max-age" (§4.6): scenario 5 shows a resend still pending at
/// 35 minutes, so the resend window opens well before that.
const RESEND_MIN_AGE: ChronoDuration = ChronoDuration::minutes(30);
const DROP_ORPHANED_AFTER: ChronoDuration = ChronoDuration::hours(24);

pub fn spawn(state: Arc<StateManager>, dispatcher: Arc<dyn CommandDispatcher>) -> Worker {
    Worker::spawn("orphan-reconciliation", INTERVAL, move || {
        let state = Arc::clone(&state);
        let dispatcher = Arc::clone(&dispatcher);
        async move {
            let now = chrono::Utc::now();

            for (artifact, live_rows) in state.artifacts().deleted_with_live_node_copies(now, RESEND_MIN_AGE) {
                for row in live_rows {
                    let command = Command::ArtifactDelete {
                        artifact_hash: artifact.artifact_hash.clone(),
                    };
                    match dispatcher.dispatch(&row.node_id, command, DEFAULT_DISPATCH_TIMEOUT).await {
                        Ok(Reply::DeleteAck) => {
                            state.artifacts().remove_node_row(&artifact.artifact_hash, &row.node_id);
                            if let Some(repo) = state.artifact_node_repo() {
                                if let Err(err) = repo.delete(&artifact.artifact_hash, &row.node_id).await {
                                    warn!(%err, artifact_hash = %artifact.artifact_hash, node_id = %row.node_id, "orphan delete-ack write-through failed");
                                }
                            }
                            info!(artifact_hash = %artifact.artifact_hash, node_id = %row.node_id, "orphan delete acked, row removed");
                        }
                        Ok(other) => {
                            warn!(artifact_hash = %artifact.artifact_hash, node_id = %row.node_id, reply = ?other, "unexpected reply to resent delete, will retry next tick");
                        }
                        Err(err) => {
                            warn!(%err, artifact_hash = %artifact.artifact_hash, node_id = %row.node_id, "resend delete failed, will retry next tick");
                        }
                    }
                }
            }

            let stale_rows = state.artifacts().orphaned_node_rows_older_than(now, DROP_ORPHANED_AFTER);
            if stale_rows.is_empty() {
                return;
            }
            info!(count = stale_rows.len(), "dropping artifact_nodes rows orphaned over 24h");
            for row in stale_rows {
                state.artifacts().remove_node_row(&row.artifact_hash, &row.node_id);
                if let Some(repo) = state.artifact_node_repo() {
                    if let Err(err) = repo.delete(&row.artifact_hash, &row.node_id).await {
                        warn!(%err, artifact_hash = %row.artifact_hash, node_id = %row.node_id, "stale orphan row delete write-through failed");
                    }
                }
            }
        }
    })
}
