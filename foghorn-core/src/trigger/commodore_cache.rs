//! The Commodore resolve cache (§4.4, §9): a negative-TTL stale-while-
//! revalidate cache in front of `RegistryResolver::resolve`, keyed by the
//! raw identifier a viewer requested (playback id, clip/DVR/VOD hash, or
//! internal name). A burst of viewers hitting the same popular stream
//! shouldn't turn into a burst of registry RPCs.

use std::time::Duration;

use foghorn_contracts::registry::ResolvedTarget;

use crate::cache::{CacheConfig, Lookup, SwrCache};

pub const DEFAULT_FRESH_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CAPACITY: u64 = 50_000;

pub struct ResolveCache {
    inner: SwrCache<String, ResolvedTarget>,
}

impl Default for ResolveCache {
    fn default() -> Self {
        Self::new(CacheConfig::new(
            DEFAULT_FRESH_TTL,
            DEFAULT_STALE_TTL,
            DEFAULT_NEGATIVE_TTL,
            DEFAULT_MAX_CAPACITY,
        ))
    }
}

impl ResolveCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { inner: SwrCache::new(config) }
    }

    pub async fn get(&self, requested_id: &str) -> Option<ResolvedTarget> {
        match self.inner.peek(&requested_id.to_string()).await {
            Lookup::Fresh(v) | Lookup::Stale(v) => Some(v),
            Lookup::Miss => None,
        }
    }

    pub async fn is_negatively_cached(&self, requested_id: &str) -> bool {
        self.inner.is_negatively_cached(&requested_id.to_string()).await
    }

    pub async fn put(&self, requested_id: &str, target: ResolvedTarget) {
        self.inner.put(requested_id.to_string(), target).await;
    }

    pub async fn put_negative(&self, requested_id: &str) {
        self.inner.put_negative(requested_id.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foghorn_model::ids::{InternalName, TenantId};

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = ResolveCache::default();
        let target = ResolvedTarget::Live {
            internal_name: InternalName::from("abc"),
            tenant_id: TenantId::new(),
        };
        cache.put("req-1", target.clone()).await;
        let got = cache.get("req-1").await;
        assert!(matches!(got, Some(ResolvedTarget::Live { internal_name, .. }) if internal_name.as_str() == "abc"));
    }

    #[tokio::test]
    async fn negative_put_is_observable() {
        let cache = ResolveCache::default();
        cache.put_negative("missing").await;
        assert!(cache.is_negatively_cached("missing").await);
        assert!(cache.get("missing").await.is_none());
    }
}
