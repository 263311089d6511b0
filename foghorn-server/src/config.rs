//! Process configuration, loaded from the environment (§6.5's enumerated
//! envelope): parse everything once at startup in `Settings::from_env`,
//! fail fast on anything malformed, never re-read the environment
//! afterward.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context};

/// Scoring weights read at boot (§3, §6.5). Any weight left at `0` is
/// rejected by `Weights::new`/`Balancer::set_weights` later, not here —
/// this struct only carries what the environment said.
#[derive(Debug, Clone, Copy)]
pub struct WeightsConfig {
    pub cpu: u64,
    pub ram: u64,
    pub bw: u64,
    pub geo: u64,
    pub stream_bonus: u64,
}

/// TTL/capacity sizing for one of the stale-while-revalidate caches
/// (Commodore resolve, GeoIP) per §6.5 `*_TTL`/`*_SWR`/`*_NEG`/`*_MAX`.
#[derive(Debug, Clone, Copy)]
pub struct CacheSizing {
    pub fresh_ttl: Duration,
    pub stale_ttl: Duration,
    pub negative_ttl: Duration,
    pub max_capacity: u64,
}

/// `STORAGE_S3_*` (§6.5): presence of bucket+region enables cold-storage
/// operations; endpoint/key/secret are optional (default AWS endpoint and
/// ambient credentials otherwise).
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cluster_id: String,
    pub instance_id: String,

    pub weights: WeightsConfig,

    pub commodore_cache: CacheSizing,
    pub geoip_cache: CacheSizing,

    pub storage_s3: Option<S3Config>,

    pub control_bind_addr: String,
    pub admin_bind_addr: String,

    pub service_token: Option<String>,

    pub geoip_mmdb_path: Option<String>,

    pub commodore_base_url: Option<String>,
    pub purser_base_url: Option<String>,
    pub decklog_base_url: Option<String>,

    pub heartbeat_window: Duration,
    pub viewer_confirm_timeout: Duration,

    pub fallback_host: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let weights = WeightsConfig {
            cpu: env_u64("CPU", 1)?,
            ram: env_u64("RAM", 1)?,
            bw: env_u64("BW", 1)?,
            geo: env_u64("GEO", 0)?,
            stream_bonus: env_u64("STREAM_BONUS", 0)?,
        };

        let commodore_cache = CacheSizing {
            fresh_ttl: env_duration_secs("COMMODORE_CACHE_TTL", 30)?,
            stale_ttl: env_duration_secs("COMMODORE_CACHE_SWR", 60)?,
            negative_ttl: env_duration_secs("COMMODORE_CACHE_NEG", 5)?,
            max_capacity: env_u64("COMMODORE_CACHE_MAX", 50_000)?,
        };

        let geoip_cache = CacheSizing {
            fresh_ttl: env_duration_secs("GEOIP_CACHE_TTL", 300)?,
            stale_ttl: env_duration_secs("GEOIP_CACHE_SWR", 900)?,
            negative_ttl: env_duration_secs("GEOIP_CACHE_NEG", 30)?,
            max_capacity: env_u64("GEOIP_CACHE_MAX", 100_000)?,
        };

        let storage_s3 = match (env::var("STORAGE_S3_BUCKET").ok(), env::var("STORAGE_S3_REGION").ok()) {
            (Some(bucket), Some(region)) if !bucket.is_empty() => Some(S3Config {
                bucket,
                prefix: env::var("STORAGE_S3_PREFIX").unwrap_or_default(),
                region,
                endpoint: env::var("STORAGE_S3_ENDPOINT").ok(),
                access_key: env::var("STORAGE_S3_KEY").ok(),
                secret_key: env::var("STORAGE_S3_SECRET").ok(),
            }),
            _ => None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            redis_url: env::var("REDIS_URL").ok(),
            cluster_id: env::var("FOGHORN_CLUSTER_ID").unwrap_or_else(|_| "default".into()),
            instance_id: env::var("FOGHORN_INSTANCE_ID").unwrap_or_default(),
            weights,
            commodore_cache,
            geoip_cache,
            storage_s3,
            control_bind_addr: env::var("FOGHORN_CONTROL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4242".into()),
            admin_bind_addr: env::var("FOGHORN_ADMIN_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            service_token: env::var("SERVICE_TOKEN").ok().filter(|s| !s.is_empty()),
            geoip_mmdb_path: env::var("GEOIP_MMDB_PATH").ok().filter(|s| !s.is_empty()),
            commodore_base_url: env::var("COMMODORE_BASE_URL").ok(),
            purser_base_url: env::var("PURSER_BASE_URL").ok(),
            decklog_base_url: env::var("DECKLOG_BASE_URL").ok(),
            heartbeat_window: env_duration_secs("HEARTBEAT_WINDOW_SECS", 15)?,
            viewer_confirm_timeout: env_duration_secs("VIEWER_CONFIRM_TIMEOUT_SECS", 10)?,
            fallback_host: env::var("FALLBACK_HOST").ok(),
        })
    }
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn env_duration_secs(key: &str, default_secs: u64) -> anyhow::Result<Duration> {
    match env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw.parse().map_err(|_| anyhow!("{key} must be an integer number of seconds, got {raw:?}"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}
