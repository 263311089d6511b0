//! Reconnect supervisor (C8, §4.8): downstream registry/billing RPCs may be
//! unavailable at boot. Rather than blocking startup, the process wires in
//! an `Unavailable`-returning stub, starts in degraded mode, and retries in
//! the background until a real client connects — at which point it is
//! swapped in atomically, with no handler ever seeing a `None`/`nil` client
//! slot (§9 "duck-typed client slots" redesign note).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use foghorn_contracts::billing::{BillingChecker, BillingStatus};
use foghorn_contracts::error::{ContractError, Result as ContractResult};
use foghorn_contracts::registry::{RegistryResolver, ResolveKind, ResolvedTarget, StreamKeyValidation};
use foghorn_model::ids::TenantId;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::jobs::worker::Worker;

/// Default re-dial cadence (§4.8: "a background retry loop (30s ticker)").
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// Holds the current implementation of a capability trait, swappable
/// without any handler observing a gap: readers always get *some* `Arc<T>`
/// (either the real client or the `Unavailable` stub), never a `None`.
pub struct Switchable<T: ?Sized> {
    current: RwLock<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Switchable<T> {
    pub fn new(initial: Arc<T>) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> Arc<T> {
        self.current.read().clone()
    }

    pub fn swap(&self, new: Arc<T>) {
        *self.current.write() = new;
    }
}

/// Health surface for a degraded capability (§4.8: "a `client_status` gauge
/// is set to 0"/"set the gauge to 1"). `RehydrateStatus` covers persistence
/// health; this covers RPC-collaborator health.
#[derive(Default)]
pub struct ClientStatusGauge(AtomicBool);

impl ClientStatusGauge {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn is_healthy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.0.store(healthy, Ordering::SeqCst);
    }

    /// `0`/`1` as named in §4.8, for a metrics exporter to read directly.
    pub fn as_gauge_value(&self) -> u8 {
        self.is_healthy() as u8
    }
}

/// Spawn the background re-dial loop for one capability. `connect` is
/// retried every `interval` while the gauge reports unhealthy; a caller
/// that observes an RPC failure against the current client should call
/// `gauge.set_healthy(false)` so the very next tick attempts to redial
/// rather than waiting for it to notice on its own.
pub fn spawn_reconnect<T, F, Fut>(
    name: &'static str,
    switchable: Arc<Switchable<T>>,
    gauge: Arc<ClientStatusGauge>,
    interval: Duration,
    mut connect: F,
) -> Worker
where
    T: ?Sized + Send + Sync + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Option<Arc<T>>> + Send,
{
    Worker::spawn(name, interval, move || {
        let switchable = Arc::clone(&switchable);
        let gauge = Arc::clone(&gauge);
        let attempt = connect();
        async move {
            if gauge.is_healthy() {
                return;
            }
            match attempt.await {
                Some(client) => {
                    switchable.swap(client);
                    gauge.set_healthy(true);
                    info!(worker = name, "downstream reconnected, leaving degraded mode");
                }
                None => {
                    debug!(worker = name, "reconnect attempt failed, remaining degraded");
                }
            }
        }
    })
}

/// Stub `RegistryResolver` wired in before the first successful connect, or
/// after a connection is lost (§4.8 degraded mode). Every call fails with
/// `Unavailable` so callers hit the same `DownstreamUnavailable` path they
/// would for a live client that happened to time out.
#[derive(Default)]
pub struct UnavailableRegistry;

#[async_trait]
impl RegistryResolver for UnavailableRegistry {
    async fn validate_stream_key(&self, _stream_key: &str) -> ContractResult<StreamKeyValidation> {
        Err(ContractError::Unavailable("registry resolver not connected".into()))
    }

    async fn resolve(&self, _kind: ResolveKind, _id: &str) -> ContractResult<ResolvedTarget> {
        Err(ContractError::Unavailable("registry resolver not connected".into()))
    }
}

/// Stub `BillingChecker`, same role as `UnavailableRegistry` (§4.8).
#[derive(Default)]
pub struct UnavailableBilling;

#[async_trait]
impl BillingChecker for UnavailableBilling {
    async fn check_owner_billing(&self, _tenant_id: &TenantId) -> ContractResult<BillingStatus> {
        Err(ContractError::Unavailable("billing checker not connected".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn swap_is_visible_to_subsequent_reads() {
        let switchable: Switchable<dyn RegistryResolver> = Switchable::new(Arc::new(UnavailableRegistry));
        assert!(switchable.get().validate_stream_key("k").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_stops_attempting_once_healthy() {
        let switchable = Arc::new(Switchable::<dyn RegistryResolver>::new(Arc::new(UnavailableRegistry)));
        let gauge = Arc::new(ClientStatusGauge::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let worker = spawn_reconnect(
            "test-registry",
            Arc::clone(&switchable),
            Arc::clone(&gauge),
            Duration::from_millis(10),
            move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Some(Arc::new(UnavailableRegistry) as Arc<dyn RegistryResolver>)
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.stop().await;

        assert!(gauge.is_healthy());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
