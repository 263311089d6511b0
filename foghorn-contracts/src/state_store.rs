//! Cross-instance state sync (§4.2, §9): when more than one Foghorn
//! instance shares a fleet, node/stream/viewer mutations on one instance
//! need to reach the others. A `StateStore` publishes deltas and hands back
//! a broadcast subscription; an instance with no peers uses `NoopStateStore`
//! and never leaves single-process mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateDelta {
    NodeUpserted(serde_json::Value),
    NodeRemoved(String),
    StreamUpserted(serde_json::Value),
    StreamRemoved(String),
}

/// A delta tagged with the publishing instance (§4.2: "the manager records
/// its `instance_id` to avoid processing self-originated updates"). The
/// `cluster_id` is the pub/sub namespace a concrete `StateStore` publishes
/// under; a store with only one configured namespace may ignore it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMessage {
    pub instance_id: String,
    pub cluster_id: String,
    pub delta: StateDelta,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn publish(&self, message: StateMessage) -> Result<()>;

    /// A fresh subscription; each instance holds one for its whole
    /// lifetime. Lagged receivers (per `broadcast::error::RecvError::Lagged`)
    /// are the caller's problem to resync from a full snapshot.
    fn subscribe(&self) -> broadcast::Receiver<StateMessage>;
}

/// Single-instance default: publishes go nowhere, subscribers never see a
/// delta.
pub struct NoopStateStore {
    sender: broadcast::Sender<StateMessage>,
}

impl NoopStateStore {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(1);
        Self { sender }
    }
}

impl Default for NoopStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for NoopStateStore {
    async fn publish(&self, _message: StateMessage) -> Result<()> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StateMessage> {
        self.sender.subscribe()
    }
}
