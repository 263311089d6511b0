use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Last-run time and last error for one entity type's rehydrate/reconcile
/// cycle, surfaced through `RehydrateStatus()` for health checks (§4.2).
#[derive(Debug, Clone, Default)]
pub struct EntityRehydrateStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl EntityRehydrateStatus {
    fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.last_error = None;
    }

    fn record_failure(&mut self, now: DateTime<Utc>, error: String) {
        self.last_run = Some(now);
        self.last_error = Some(error);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RehydrateStatus {
    pub nodes: EntityRehydrateStatus,
    pub artifacts: EntityRehydrateStatus,
}

/// Shared handle the periodic reconcile loop and boot rehydrate both write
/// through; `StateManager::rehydrate_status()` reads a clone.
#[derive(Default)]
pub struct RehydrateStatusHandle(RwLock<RehydrateStatus>);

impl RehydrateStatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RehydrateStatus {
        self.0.read().clone()
    }

    pub fn record_nodes_success(&self, now: DateTime<Utc>) {
        self.0.write().nodes.record_success(now);
    }

    pub fn record_nodes_failure(&self, now: DateTime<Utc>, error: String) {
        self.0.write().nodes.record_failure(now, error);
    }

    pub fn record_artifacts_success(&self, now: DateTime<Utc>) {
        self.0.write().artifacts.record_success(now);
    }

    pub fn record_artifacts_failure(&self, now: DateTime<Utc>, error: String) {
        self.0.write().artifacts.record_failure(now, error);
    }
}
