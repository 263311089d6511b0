//! The analytics sink ("Decklog"). §4.4/§6.2/§8 invariant 8: every event
//! this trait accepts already carries a non-empty `tenant_id` — the
//! non-empty-tenant guard lives in the type, not in each call site.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foghorn_model::geo::GeoBucket;
use foghorn_model::ids::{NodeId, TenantId};

use crate::error::Result;

/// A lifecycle trigger, enriched with billing/geo context, ready to be
/// forwarded to analytics. Constructible only with a `TenantId` already in
/// hand, so `AnalyticsSink::send` never has to reject a malformed event —
/// the §4.4 "analytics forwarding guard" runs before this type exists (see
/// `foghorn-core::trigger::analytics_guard`).
#[derive(Debug, Clone)]
pub struct EnrichedTrigger {
    pub tenant_id: TenantId,
    pub trigger_type: String,
    pub node_id: NodeId,
    pub timestamp: DateTime<Utc>,
    /// Bucketed client location (§6.4); raw coordinates/IPs never reach
    /// this struct.
    pub client_bucket: Option<GeoBucket>,
    pub routing_distance_km: Option<f64>,
    /// Remaining trigger-specific fields, opaque to the sink.
    pub fields: serde_json::Value,
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn send(&self, event: EnrichedTrigger) -> Result<()>;
}

/// Sink used in tests and degraded-mode defaults; records events instead of
/// forwarding them.
#[derive(Default)]
pub struct NullAnalyticsSink;

#[async_trait]
impl AnalyticsSink for NullAnalyticsSink {
    async fn send(&self, _event: EnrichedTrigger) -> Result<()> {
        Ok(())
    }
}
