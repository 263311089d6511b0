//! The billing cache (§4.4): keyed `tenant_id + ":" + internal_name` on
//! both writes and reads, per §9's Open Question resolution (the source's
//! bare-name lookup path is forbidden here except for cross-tenant admin
//! tooling, which this cache is never used for). TTL splits postpaid
//! (10 min) from prepaid (1 min) tenants.

use std::time::Duration;

use foghorn_contracts::registry::BillingModel;
use foghorn_model::ids::{InternalName, TenantId};

use crate::cache::{CacheConfig, SwrCache};

pub const POSTPAID_TTL: Duration = Duration::from_secs(600);
pub const PREPAID_TTL: Duration = Duration::from_secs(60);
const STALE_TTL: Duration = Duration::from_secs(30);
const NEGATIVE_TTL: Duration = Duration::from_secs(5);
const MAX_CAPACITY: u64 = 50_000;

#[derive(Debug, Clone, Copy)]
pub struct BillingCacheEntry {
    pub billing_model: BillingModel,
    pub is_suspended: bool,
    pub is_balance_negative: bool,
}

impl BillingCacheEntry {
    pub fn ttl(&self) -> Duration {
        match self.billing_model {
            BillingModel::Postpaid => POSTPAID_TTL,
            BillingModel::Prepaid => PREPAID_TTL,
        }
    }

    /// §7 rejection taxonomy: suspended accounts are rejected outright;
    /// prepaid accounts with a negative balance are rejected; postpaid
    /// accounts with a negative balance are not (they're billed in
    /// arrears).
    pub fn is_rejected(&self) -> bool {
        self.is_suspended || (self.billing_model == BillingModel::Prepaid && self.is_balance_negative)
    }
}

fn key(tenant_id: &TenantId, internal_name: &InternalName) -> String {
    format!("{tenant_id}:{internal_name}")
}

/// Tenant-scoped billing cache. The generic cache's own `fresh_ttl` only
/// bounds how long an entry survives in storage (set to the longer of the
/// two model TTLs so neither is evicted early); `get` classifies freshness
/// itself against the entry's own `ttl()` (postpaid 10 min vs prepaid 1
/// min), since the generic cache has no billing-model awareness.
pub struct BillingCache {
    inner: SwrCache<String, BillingCacheEntry>,
}

impl Default for BillingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingCache {
    pub fn new() -> Self {
        Self {
            inner: SwrCache::new(CacheConfig::new(POSTPAID_TTL, STALE_TTL, NEGATIVE_TTL, MAX_CAPACITY)),
        }
    }

    pub async fn get(&self, tenant_id: &TenantId, internal_name: &InternalName) -> Option<BillingCacheEntry> {
        let (entry, age) = self.inner.peek_raw(&key(tenant_id, internal_name)).await?;
        if age <= entry.ttl() + STALE_TTL {
            Some(entry)
        } else {
            None
        }
    }

    pub async fn put(&self, tenant_id: &TenantId, internal_name: &InternalName, entry: BillingCacheEntry) {
        self.inner.put(key(tenant_id, internal_name), entry).await;
    }

    /// Whether a prior billing lookup for this tenant+stream failed recently
    /// enough that a fresh RPC isn't worth attempting yet.
    pub async fn is_negatively_cached(&self, tenant_id: &TenantId, internal_name: &InternalName) -> bool {
        self.inner.is_negatively_cached(&key(tenant_id, internal_name)).await
    }

    /// Record a failed billing lookup so the negative TTL window suppresses
    /// repeat RPCs against a flaky downstream (§7 fail-open still applies;
    /// this only throttles the retry, it doesn't change the outcome).
    pub async fn put_negative(&self, tenant_id: &TenantId, internal_name: &InternalName) {
        self.inner.put_negative(key(tenant_id, internal_name)).await;
    }

    /// `InvalidateTenantCache` (§4.4, §8 invariant 9): drop every entry
    /// whose key is prefixed `tenant_id:`.
    pub async fn invalidate_tenant(&self, tenant_id: &TenantId) {
        let prefix = format!("{tenant_id}:");
        self.inner.retain(|k| !k.starts_with(&prefix)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foghorn_model::ids::TenantId;

    #[tokio::test]
    async fn invalidate_tenant_drops_only_that_tenants_entries() {
        let cache = BillingCache::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        let name = InternalName::from("stream-a");
        let entry = BillingCacheEntry {
            billing_model: BillingModel::Postpaid,
            is_suspended: false,
            is_balance_negative: false,
        };
        cache.put(&t1, &name, entry).await;
        cache.put(&t2, &name, entry).await;

        cache.invalidate_tenant(&t1).await;

        assert!(cache.get(&t1, &name).await.is_none());
        assert!(cache.get(&t2, &name).await.is_some());
    }

    #[test]
    fn ttl_differs_by_billing_model() {
        let postpaid = BillingCacheEntry {
            billing_model: BillingModel::Postpaid,
            is_suspended: false,
            is_balance_negative: false,
        };
        let prepaid = BillingCacheEntry {
            billing_model: BillingModel::Prepaid,
            is_suspended: false,
            is_balance_negative: false,
        };
        assert_eq!(postpaid.ttl(), POSTPAID_TTL);
        assert_eq!(prepaid.ttl(), PREPAID_TTL);
        assert!(prepaid.ttl() < postpaid.ttl());
    }

    #[tokio::test]
    async fn negative_cache_tracks_put_and_lookup() {
        let cache = BillingCache::new();
        let tenant_id = TenantId::new();
        let name = InternalName::from("stream-a");

        assert!(!cache.is_negatively_cached(&tenant_id, &name).await);
        cache.put_negative(&tenant_id, &name).await;
        assert!(cache.is_negatively_cached(&tenant_id, &name).await);
    }
}
