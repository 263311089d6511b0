//! Artifact lifecycle background jobs (C6, §4.6): retention, orphan
//! reconciliation, stale-defrost reset, purge. Each is a [`Worker`] spawned
//! against a shared `Arc<StateManager>`; `spawn_all` wires up the full set
//! with the dispatcher/cold-storage collaborators purge and orphan need.

pub mod orphan;
pub mod purge;
pub mod retention;
pub mod stale_defrost;
pub mod worker;

pub use worker::Worker;

use std::sync::Arc;

use foghorn_contracts::dispatch::CommandDispatcher;
use foghorn_contracts::storage::ColdStorage;

use crate::state::StateManager;

/// The four §4.6 jobs, started together and stopped together.
pub struct LifecycleJobs {
    retention: Worker,
    orphan: Worker,
    stale_defrost: Worker,
    purge: Worker,
}

impl LifecycleJobs {
    pub fn spawn(
        state: Arc<StateManager>,
        dispatcher: Arc<dyn CommandDispatcher>,
        cold_storage: Arc<dyn ColdStorage>,
    ) -> Self {
        Self {
            retention: retention::spawn(Arc::clone(&state)),
            orphan: orphan::spawn(Arc::clone(&state), Arc::clone(&dispatcher)),
            stale_defrost: stale_defrost::spawn(Arc::clone(&state)),
            purge: purge::spawn(state, dispatcher, cold_storage),
        }
    }

    pub async fn stop(self) {
        self.retention.stop().await;
        self.orphan.stop().await;
        self.stale_defrost.stop().await;
        self.purge.stop().await;
    }
}
