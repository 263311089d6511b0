//! Redis pub/sub-backed `StateStore` (§4.2, §9 "cross-instance sync"):
//! publishes under a `foghorn:state:{cluster_id}` channel and re-broadcasts
//! whatever it receives on that channel to every local subscriber (i.e.
//! `StateManager::run_cluster_sync`). Used only when `REDIS_URL` is
//! configured; a single-instance deployment runs on `NoopStateStore`
//! instead.

use async_trait::async_trait;
use foghorn_contracts::error::{ContractError, Result};
use foghorn_contracts::state_store::{StateMessage, StateStore};
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tracing::warn;

const CHANNEL_PREFIX: &str = "foghorn:state:";

pub struct RedisStateStore {
    client: redis::Client,
    cluster_id: String,
    local: broadcast::Sender<StateMessage>,
}

impl RedisStateStore {
    /// Connects and spawns the background subscription loop that feeds
    /// `local`. Returns an error only if the initial connection attempt
    /// fails; once running, a lost connection is logged and the loop
    /// simply stops delivering until the process restarts (the reconnect
    /// supervisor, C8, covers registry/billing, not this optional sync
    /// path).
    pub async fn connect(redis_url: &str, cluster_id: String) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let (local, _rx) = broadcast::channel(1024);

        let channel = format!("{CHANNEL_PREFIX}{cluster_id}");
        let sub_client = client.clone();
        let sub_tx = local.clone();
        tokio::spawn(async move {
            loop {
                match subscribe_loop(&sub_client, &channel, &sub_tx).await {
                    Ok(()) => break,
                    Err(err) => {
                        warn!(%err, "redis state sync subscription dropped, retrying in 5s");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Ok(Self { client, cluster_id, local })
    }
}

async fn subscribe_loop(client: &redis::Client, channel: &str, tx: &broadcast::Sender<StateMessage>) -> anyhow::Result<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = msg.get_payload()?;
        match serde_json::from_str::<StateMessage>(&payload) {
            Ok(message) => {
                let _ = tx.send(message);
            }
            Err(err) => warn!(%err, "malformed state sync message, dropping"),
        }
    }
    Ok(())
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn publish(&self, message: StateMessage) -> Result<()> {
        let payload = serde_json::to_string(&message).map_err(|err| ContractError::Internal(err.to_string()))?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| ContractError::Unavailable(err.to_string()))?;
        let channel = format!("{CHANNEL_PREFIX}{}", self.cluster_id);
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|err| ContractError::Unavailable(err.to_string()))?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StateMessage> {
        self.local.subscribe()
    }
}
