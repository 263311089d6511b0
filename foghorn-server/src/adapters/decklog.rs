//! Batched HTTP client for the analytics sink ("Decklog", §6.2): ordered,
//! best-effort, at-least-once. `send` only enqueues; a background task
//! drains the channel into bounded batches and POSTs them, retrying the
//! whole batch on failure rather than blocking the trigger processor's hot
//! path on a downstream call.

use std::time::Duration;

use async_trait::async_trait;
use foghorn_contracts::analytics::{AnalyticsSink, EnrichedTrigger};
use foghorn_contracts::error::{ContractError, Result};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 4096;
const BATCH_MAX: usize = 200;
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

pub struct DecklogClient {
    tx: mpsc::Sender<EnrichedTrigger>,
}

impl DecklogClient {
    /// Spawns the background flush loop and returns a sink whose `send`
    /// only needs to push onto a channel. The loop runs until `tx` (and
    /// every clone of it) is dropped.
    pub fn spawn(base_url: String, service_token: Option<String>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(flush_loop(base_url, service_token, rx));
        Self { tx }
    }
}

#[derive(Debug, Serialize)]
struct WireEvent<'a> {
    tenant_id: String,
    trigger_type: &'a str,
    node_id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    client_bucket: Option<u64>,
    routing_distance_km: Option<f64>,
    #[serde(flatten)]
    fields: &'a serde_json::Value,
}

async fn flush_loop(base_url: String, service_token: Option<String>, mut rx: mpsc::Receiver<EnrichedTrigger>) {
    let client = Client::new();
    let mut batch = Vec::with_capacity(BATCH_MAX);
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            biased;
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        batch.push(event);
                        if batch.len() >= BATCH_MAX {
                            flush(&client, &base_url, &service_token, &mut batch).await;
                        }
                    }
                    None => {
                        flush(&client, &base_url, &service_token, &mut batch).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(&client, &base_url, &service_token, &mut batch).await;
                }
            }
        }
    }
}

async fn flush(client: &Client, base_url: &str, service_token: &Option<String>, batch: &mut Vec<EnrichedTrigger>) {
    let wire: Vec<WireEvent> = batch
        .iter()
        .map(|e| WireEvent {
            tenant_id: e.tenant_id.to_string(),
            trigger_type: &e.trigger_type,
            node_id: e.node_id.to_string(),
            timestamp: e.timestamp,
            client_bucket: e.client_bucket.map(|b| b.cell_index()),
            routing_distance_km: e.routing_distance_km,
            fields: &e.fields,
        })
        .collect();

    let mut req = client.post(format!("{base_url}/v1/events")).json(&wire);
    if let Some(token) = service_token {
        req = req.bearer_auth(token);
    }

    match req.send().await {
        Ok(response) if response.status().is_success() => {
            debug!(count = batch.len(), "flushed analytics batch");
            batch.clear();
        }
        Ok(response) => {
            warn!(status = %response.status(), count = batch.len(), "decklog rejected analytics batch, retrying next flush");
        }
        Err(err) => {
            warn!(%err, count = batch.len(), "decklog unreachable, retrying next flush");
        }
    }
}

#[async_trait]
impl AnalyticsSink for DecklogClient {
    async fn send(&self, event: EnrichedTrigger) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ContractError::Unavailable("analytics flush loop has exited".into()))
    }
}
