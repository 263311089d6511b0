//! `CommandDispatcher` (§4.5, §5) backed by the live control-stream
//! registry: looks up the node's connection, sends a `Command` frame
//! tagged with a fresh `request_id`, and awaits the correlated `Reply`
//! with a bounded timeout.

use async_trait::async_trait;
use foghorn_contracts::dispatch::{Command, CommandDispatcher, Reply};
use foghorn_contracts::error::{ContractError, Result};
use foghorn_model::ids::{CorrelationId, NodeId};
use std::time::Duration;
use tracing::warn;

use crate::control::registry::ConnectionRegistry;
use crate::control::wire::WireCommand;

#[derive(Clone)]
pub struct ControlDispatcher {
    registry: ConnectionRegistry,
}

impl ControlDispatcher {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandDispatcher for ControlDispatcher {
    async fn dispatch(&self, node_id: &NodeId, command: Command, timeout: Duration) -> Result<Reply> {
        let connection = self
            .registry
            .get(node_id)
            .ok_or_else(|| ContractError::Unavailable(format!("no open control stream for node {node_id}")))?;

        let request_id = CorrelationId::new();
        let wire = WireCommand::new(request_id, &connection.node_id, &command);
        let frame = serde_json::to_string(&wire)
            .map_err(|err| ContractError::Internal(format!("failed to encode command: {err}")))?;

        let rx = connection.register_reply(wire.request_id.clone());

        if connection.send_frame(frame).await.is_err() {
            connection.cancel_reply(&wire.request_id);
            return Err(ContractError::Unavailable(format!("control stream to node {node_id} closed")));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ContractError::Internal("control stream closed before reply arrived".into())),
            Err(_) => {
                connection.cancel_reply(&wire.request_id);
                warn!(node_id = %node_id, request_id = %wire.request_id, "command dispatch timed out");
                Err(ContractError::Internal("command dispatch timed out".into()))
            }
        }
    }
}
