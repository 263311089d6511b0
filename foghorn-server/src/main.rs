//! Process bootstrap: load `Settings`, wire every collaborator (database,
//! cache sizing, cold storage, GeoIP, the Commodore/Purser/Decklog clients,
//! the reconnect supervisor), spawn the artifact lifecycle jobs, and serve
//! the control-plane WebSocket and the admin HTTP surface until told to
//! stop, each bound to its own listener.

mod adapters;
mod admin;
mod config;
mod control;
mod error;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use foghorn_contracts::analytics::{AnalyticsSink, NullAnalyticsSink};
use foghorn_contracts::billing::BillingChecker;
use foghorn_contracts::dispatch::CommandDispatcher;
use foghorn_contracts::geoip::GeoIpResolver;
use foghorn_contracts::registry::RegistryResolver;
use foghorn_contracts::state_store::StateStore;
use foghorn_contracts::storage::ColdStorage;
use foghorn_core::balancer::Balancer;
use foghorn_core::cache::CacheConfig;
use foghorn_core::jobs::LifecycleJobs;
use foghorn_core::persistence::{PostgresArtifactNodeRepository, PostgresArtifactRepository, PostgresNodeRepository};
use foghorn_core::state::{EntityPolicy, StateManager, StateManagerConfig};
use foghorn_core::supervisor::{
    spawn_reconnect, ClientStatusGauge, Switchable, UnavailableBilling, UnavailableRegistry, RECONNECT_INTERVAL,
};
use foghorn_core::trigger::TriggerProcessor;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use adapters::commodore::CommodoreClient;
use adapters::decklog::DecklogClient;
use adapters::geoip::MaxmindGeoIp;
use adapters::purser::PurserClient;
use adapters::s3::{NoopColdStorage, S3ColdStorage};
use adapters::state_store::RedisStateStore;
use config::Settings;
use control::dispatcher::ControlDispatcher;
use control::registry::ConnectionRegistry;
use control::ws::control_handler;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Arc::new(Settings::from_env()?);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "foghorn_server=info,foghorn_core=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(cluster_id = %settings.cluster_id, "foghorn starting");

    let db_pool = match &settings.database_url {
        Some(url) => {
            info!("connecting to persistence database");
            Some(sqlx::postgres::PgPoolOptions::new().max_connections(10).connect(url).await?)
        }
        None => {
            warn!("no DATABASE_URL configured, running with in-memory state only");
            None
        }
    };

    let persistence_policy = EntityPolicy {
        write_through: true,
        boot_rehydrate: true,
    };

    let (node_repo, artifact_repo, artifact_node_repo) = match &db_pool {
        Some(pool) => (
            Some(Arc::new(PostgresNodeRepository::new(pool.clone())) as Arc<dyn foghorn_core::persistence::NodeRepository>),
            Some(Arc::new(PostgresArtifactRepository::new(pool.clone())) as Arc<dyn foghorn_core::persistence::ArtifactRepository>),
            Some(Arc::new(PostgresArtifactNodeRepository::new(pool.clone())) as Arc<dyn foghorn_core::persistence::ArtifactNodeRepository>),
        ),
        None => (None, None, None),
    };

    let cluster_state: Option<Arc<dyn StateStore>> = match &settings.redis_url {
        Some(url) => {
            info!("connecting to redis for cross-instance state sync");
            Some(Arc::new(RedisStateStore::connect(url, settings.cluster_id.clone()).await?))
        }
        None => None,
    };
    let cluster_sync_enabled = cluster_state.is_some();

    let state_manager = Arc::new(StateManager::new(StateManagerConfig {
        instance_id: settings.instance_id.clone(),
        cluster_id: settings.cluster_id.clone(),
        heartbeat_window: Some(chrono::Duration::from_std(settings.heartbeat_window)?),
        viewer_confirm_timeout: Some(chrono::Duration::from_std(settings.viewer_confirm_timeout)?),
        node_repo,
        node_policy: if db_pool.is_some() { persistence_policy } else { EntityPolicy::default() },
        artifact_repo,
        artifact_node_repo,
        artifact_policy: if db_pool.is_some() { persistence_policy } else { EntityPolicy::default() },
        cluster_state,
    }));

    state_manager.rehydrate(chrono::Utc::now()).await;

    if cluster_sync_enabled {
        tokio::spawn(Arc::clone(&state_manager).run_cluster_sync());
    }

    let balancer = Arc::new(Balancer::new());
    balancer.set_weights(
        settings.weights.cpu,
        settings.weights.ram,
        settings.weights.bw,
        settings.weights.geo,
        settings.weights.stream_bonus,
    )?;

    let control_registry = ConnectionRegistry::new();
    let dispatcher: Arc<dyn CommandDispatcher> = Arc::new(ControlDispatcher::new(control_registry.clone()));

    let registry_status = Arc::new(ClientStatusGauge::new());
    let registry_client: Arc<Switchable<dyn RegistryResolver>> = Arc::new(Switchable::new(Arc::new(UnavailableRegistry)));
    if let Some(base_url) = settings.commodore_base_url.clone() {
        let token = settings.service_token.clone();
        // Dropping the returned `Worker` handle doesn't stop it: `Worker`
        // carries only a `JoinHandle` (detaches on drop) and a shutdown
        // sender, and this loop is meant to run for the life of the process.
        spawn_reconnect(
            "commodore",
            Arc::clone(&registry_client),
            Arc::clone(&registry_status),
            RECONNECT_INTERVAL,
            move || {
                let base_url = base_url.clone();
                let token = token.clone();
                async move { Some(Arc::new(CommodoreClient::new(base_url, token)) as Arc<dyn RegistryResolver>) }
            },
        );
    } else {
        warn!("no COMMODORE_BASE_URL configured, registry resolver stays in degraded mode");
    }

    let billing_status = Arc::new(ClientStatusGauge::new());
    let billing_client: Arc<Switchable<dyn BillingChecker>> = Arc::new(Switchable::new(Arc::new(UnavailableBilling)));
    if let Some(base_url) = settings.purser_base_url.clone() {
        let token = settings.service_token.clone();
        spawn_reconnect(
            "purser",
            Arc::clone(&billing_client),
            Arc::clone(&billing_status),
            RECONNECT_INTERVAL,
            move || {
                let base_url = base_url.clone();
                let token = token.clone();
                async move { Some(Arc::new(PurserClient::new(base_url, token)) as Arc<dyn BillingChecker>) }
            },
        );
    } else {
        warn!("no PURSER_BASE_URL configured, billing checker stays in degraded mode");
    }

    let geoip: Option<Arc<dyn GeoIpResolver>> = match &settings.geoip_mmdb_path {
        Some(path) => {
            info!(path, "loading GeoIP database");
            Some(Arc::new(MaxmindGeoIp::open(path)?))
        }
        None => {
            warn!("no GEOIP_MMDB_PATH configured, geo scoring term and bucketing are disabled");
            None
        }
    };

    let analytics: Arc<dyn AnalyticsSink> = match settings.decklog_base_url.clone() {
        Some(base_url) => Arc::new(DecklogClient::spawn(base_url, settings.service_token.clone())),
        None => {
            warn!("no DECKLOG_BASE_URL configured, analytics events are dropped");
            Arc::new(NullAnalyticsSink)
        }
    };

    let processor = Arc::new(
        TriggerProcessor::new(
            Arc::clone(&state_manager),
            Arc::clone(&registry_client),
            Arc::clone(&billing_client),
            Arc::clone(&analytics),
            geoip,
            Arc::clone(&dispatcher),
        )
        .with_cache_configs(
            CacheConfig::new(
                settings.commodore_cache.fresh_ttl,
                settings.commodore_cache.stale_ttl,
                settings.commodore_cache.negative_ttl,
                settings.commodore_cache.max_capacity,
            ),
            CacheConfig::new(
                settings.geoip_cache.fresh_ttl,
                settings.geoip_cache.stale_ttl,
                settings.geoip_cache.negative_ttl,
                settings.geoip_cache.max_capacity,
            ),
        ),
    );

    let cold_storage: Arc<dyn ColdStorage> = match &settings.storage_s3 {
        Some(s3_config) => {
            info!(bucket = %s3_config.bucket, "cold storage enabled");
            Arc::new(S3ColdStorage::new(s3_config).await)
        }
        None => {
            warn!("no STORAGE_S3_BUCKET configured, purge job will not reach cold storage");
            Arc::new(NoopColdStorage)
        }
    };

    let jobs = LifecycleJobs::spawn(Arc::clone(&state_manager), Arc::clone(&dispatcher), cold_storage);

    let app_state = AppState {
        settings: Arc::clone(&settings),
        state_manager: Arc::clone(&state_manager),
        balancer,
        processor,
        control_registry,
        registry_client,
        billing_client,
        analytics,
        registry_status,
        billing_status,
    };

    let control_router = Router::new()
        .route("/ws", get(control_handler))
        .layer(middleware::from_fn_with_state(app_state.clone(), control::auth::require_service_token))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state.clone());

    let admin_router = admin::router().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(app_state.clone());

    let control_addr: SocketAddr = settings.control_bind_addr.parse()?;
    let admin_addr: SocketAddr = settings.admin_bind_addr.parse()?;

    info!(%control_addr, "control-plane listener bound");
    info!(%admin_addr, "admin listener bound");

    let control_listener = tokio::net::TcpListener::bind(control_addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr).await?;

    let control_server = axum::serve(control_listener, control_router.into_make_service_with_connect_info::<SocketAddr>()).with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service_with_connect_info::<SocketAddr>()).with_graceful_shutdown(shutdown_signal());

    let (control_result, admin_result) = tokio::join!(control_server, admin_server);
    control_result?;
    admin_result?;

    info!("shutdown signal received, stopping lifecycle jobs");
    jobs.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
