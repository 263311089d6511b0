//! GeoIP lookup cache (§4.1, §6.4): a negative-TTL stale-while-revalidate
//! cache in front of `GeoIpResolver::lookup`, keyed by the host/IP string.
//! The cache's own hit/miss is distinct from the resolver's `Option`: a
//! cached `None` means "looked up, no location in the database" and is
//! still a cache hit, not a reason to re-query.

use std::time::Duration;

use foghorn_model::geo::GeoPoint;

use crate::cache::{CacheConfig, Lookup, SwrCache};

pub const DEFAULT_FRESH_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(900);
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CAPACITY: u64 = 100_000;

pub struct GeoIpCache {
    inner: SwrCache<String, Option<GeoPoint>>,
}

impl Default for GeoIpCache {
    fn default() -> Self {
        Self::new(CacheConfig::new(
            DEFAULT_FRESH_TTL,
            DEFAULT_STALE_TTL,
            DEFAULT_NEGATIVE_TTL,
            DEFAULT_MAX_CAPACITY,
        ))
    }
}

impl GeoIpCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { inner: SwrCache::new(config) }
    }

    /// `Some(point_or_none)` on cache hit (fresh or stale), `None` on miss.
    pub async fn get(&self, host_or_ip: &str) -> Option<Option<GeoPoint>> {
        match self.inner.peek(&host_or_ip.to_string()).await {
            Lookup::Fresh(v) | Lookup::Stale(v) => Some(v),
            Lookup::Miss => None,
        }
    }

    pub async fn is_negatively_cached(&self, host_or_ip: &str) -> bool {
        self.inner.is_negatively_cached(&host_or_ip.to_string()).await
    }

    pub async fn put(&self, host_or_ip: &str, point: Option<GeoPoint>) {
        self.inner.put(host_or_ip.to_string(), point).await;
    }

    pub async fn put_negative(&self, host_or_ip: &str) {
        self.inner.put_negative(host_or_ip.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caches_a_resolved_point() {
        let cache = GeoIpCache::default();
        let point = GeoPoint::new(52.37, 4.90).unwrap();
        cache.put("1.2.3.4", Some(point)).await;
        assert_eq!(cache.get("1.2.3.4").await, Some(Some(point)));
    }

    #[tokio::test]
    async fn caches_a_successful_no_location_result_as_a_hit() {
        let cache = GeoIpCache::default();
        cache.put("10.0.0.1", None).await;
        assert_eq!(cache.get("10.0.0.1").await, Some(None));
    }

    #[tokio::test]
    async fn lookup_failure_is_negatively_cached() {
        let cache = GeoIpCache::default();
        cache.put_negative("unreachable").await;
        assert!(cache.is_negatively_cached("unreachable").await);
        assert_eq!(cache.get("unreachable").await, None);
    }
}
