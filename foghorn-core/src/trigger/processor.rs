//! The trigger processor (C4, §4.4): the control-plane business logic.
//! Consumes one `Trigger` at a time, mutates C2, enforces the billing
//! gates, and enriches + forwards to analytics. Holds no transport state —
//! `foghorn-server`'s control-plane RPC server (C5) decodes wire frames
//! into `Trigger`s and calls these handlers directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use foghorn_contracts::analytics::{AnalyticsSink, EnrichedTrigger};
use foghorn_contracts::billing::BillingChecker;
use foghorn_contracts::dispatch::{Command, CommandDispatcher, Reply, DEFAULT_DISPATCH_TIMEOUT};
use foghorn_contracts::error::ContractError;
use foghorn_contracts::geoip::GeoIpResolver;
use foghorn_contracts::registry::{BillingModel, RegistryResolver, ResolveKind, ResolvedTarget};
use foghorn_model::geo::GeoPoint;
use foghorn_model::ids::{CorrelationId, InternalName, NodeId, TenantId};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::cache::CacheConfig;
use crate::error::{FoghornError, RejectionCode, Result};
use crate::state::StateManager;
use crate::supervisor::Switchable;
use crate::trigger::billing_cache::{BillingCache, BillingCacheEntry};
use crate::trigger::commodore_cache::ResolveCache;
use crate::trigger::geoip_cache::GeoIpCache;
use crate::trigger::types::{Trigger, TriggerPayload, TriggerReply, TriggerType};

/// Stable request-deadline defaults (§5): registry calls 2s, billing quick
/// checks 500ms, general RPC dispatch 10-30s (`DEFAULT_DISPATCH_TIMEOUT`).
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(2);
pub const BILLING_TIMEOUT: Duration = Duration::from_millis(500);

pub struct TriggerProcessor {
    state: Arc<StateManager>,
    registry: Arc<Switchable<dyn RegistryResolver>>,
    billing: Arc<Switchable<dyn BillingChecker>>,
    analytics: Arc<dyn AnalyticsSink>,
    geoip: Option<Arc<dyn GeoIpResolver>>,
    dispatcher: Arc<dyn CommandDispatcher>,
    billing_cache: BillingCache,
    resolve_cache: ResolveCache,
    geoip_cache: GeoIpCache,
    /// Keeps track of which node is recording a DVR for a given stream, so
    /// `stream-end` can stop it (§4.4: "stream-end also stops any running
    /// DVR on its storage node by looking up the internal name in a
    /// registry kept by the DVR service").
    dvr_by_stream: Mutex<HashMap<InternalName, NodeId>>,
    analytics_refused: AtomicU64,
}

impl TriggerProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<StateManager>,
        registry: Arc<Switchable<dyn RegistryResolver>>,
        billing: Arc<Switchable<dyn BillingChecker>>,
        analytics: Arc<dyn AnalyticsSink>,
        geoip: Option<Arc<dyn GeoIpResolver>>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Self {
        Self {
            state,
            registry,
            billing,
            analytics,
            geoip,
            dispatcher,
            billing_cache: BillingCache::new(),
            resolve_cache: ResolveCache::default(),
            geoip_cache: GeoIpCache::default(),
            dvr_by_stream: Mutex::new(HashMap::new()),
            analytics_refused: AtomicU64::new(0),
        }
    }

    /// Overrides the default TTL/capacity settings of the Commodore resolve
    /// and GeoIP caches (§6.5 `COMMODORE_*`/`GEOIP_*` config knobs).
    pub fn with_cache_configs(mut self, resolve_cache: CacheConfig, geoip_cache: CacheConfig) -> Self {
        self.resolve_cache = ResolveCache::new(resolve_cache);
        self.geoip_cache = GeoIpCache::new(geoip_cache);
        self
    }

    pub fn analytics_refused_count(&self) -> u64 {
        self.analytics_refused.load(Ordering::Relaxed)
    }

    /// Single entry point: dispatches on `trigger.trigger_type`, returning
    /// a synchronous reply for blocking triggers. Payload/type mismatches
    /// are rejected before any handler runs (§4.4 "payload type safety").
    pub async fn handle(&self, trigger: Trigger) -> Result<TriggerReply> {
        if trigger.trigger_type != trigger.payload.kind() {
            return Err(FoghornError::PayloadTypeMismatch {
                expected: type_name(trigger.trigger_type),
                actual: type_name(trigger.payload.kind()),
            });
        }

        match trigger.trigger_type {
            TriggerType::PushRewrite => self.handle_push_rewrite(trigger).await,
            TriggerType::PlayRewrite => self.handle_play_rewrite(trigger).await,
            TriggerType::StreamSource => self.handle_stream_source(trigger).await,
            TriggerType::ViewerConnect => self.handle_viewer_connect(trigger).await,
            TriggerType::ViewerDisconnect => self.handle_viewer_disconnect(trigger).await,
            TriggerType::StreamBuffer => self.handle_stream_buffer(trigger).await,
            TriggerType::StreamEnd => self.handle_stream_end(trigger).await,
            TriggerType::TrackList => self.handle_track_list(trigger).await,
            TriggerType::NodeLifecycleUpdate => self.handle_node_lifecycle_update(trigger).await,
            TriggerType::ProcessBilling => self.handle_process_billing(trigger).await,
            TriggerType::PushEnd
            | TriggerType::PushOutStart
            | TriggerType::RecordingComplete
            | TriggerType::RecordingSegment
            | TriggerType::StreamLifecycleUpdate
            | TriggerType::ClientLifecycleUpdate
            | TriggerType::StorageLifecycleUpdate
            | TriggerType::StorageSnapshot => self.handle_passthrough(trigger).await,
        }
    }

    // ---- push-rewrite ----------------------------------------------------

    async fn handle_push_rewrite(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::PushRewrite {
            stream_key,
            push_url,
            publisher_hostname,
        } = &trigger.payload
        else {
            unreachable!("kind checked in handle()");
        };

        let validation = self
            .registry
            .get()
            .validate_stream_key(stream_key)
            .await
            .map_err(|err| match err {
                ContractError::NotFound(_) | ContractError::Invalid(_) => {
                    FoghornError::IngestRejected(RejectionCode::InvalidStreamKey)
                }
                ContractError::Unavailable(msg) => FoghornError::DownstreamUnavailable(msg),
                ContractError::Internal(msg) => FoghornError::Internal(msg),
            })?;

        if validation.is_suspended {
            return Err(FoghornError::IngestRejected(RejectionCode::AccountSuspended));
        }
        if validation.billing_model == BillingModel::Prepaid && validation.is_balance_negative {
            return Err(FoghornError::IngestRejected(RejectionCode::PaymentRequired));
        }

        let entry = BillingCacheEntry {
            billing_model: validation.billing_model,
            is_suspended: validation.is_suspended,
            is_balance_negative: validation.is_balance_negative,
        };
        self.billing_cache
            .put(&validation.tenant_id, &validation.internal_name, entry)
            .await;

        let node_geo = self.state.get_node(&trigger.node_id).and_then(|n| n.geo);
        let publisher_geo = self.lookup_geo(publisher_hostname).await;
        let protocol = detect_protocol(push_url);

        self.forward_enriched(
            &trigger,
            Some(validation.tenant_id.clone()),
            publisher_geo,
            node_geo,
            serde_json::json!({
                "event": "push_rewrite",
                "internal_name": validation.internal_name.as_str(),
                "user_id": validation.user_id.to_string(),
                "stream_id": validation.stream_id.to_string(),
                "protocol": protocol,
            }),
        )
        .await;

        if validation.is_recording_enabled {
            let dispatcher = Arc::clone(&self.dispatcher);
            let node_id = trigger.node_id.clone();
            let internal_name = validation.internal_name.clone();
            let tenant_id = validation.tenant_id.clone();
            self.dvr_by_stream.lock().insert(internal_name.clone(), node_id.clone());
            tokio::spawn(async move {
                let command = Command::DvrStart {
                    internal_name: internal_name.clone(),
                    tenant_id,
                };
                if let Err(err) = dispatcher.dispatch(&node_id, command, DEFAULT_DISPATCH_TIMEOUT).await {
                    warn!(%err, internal_name = %internal_name, "DVR start dispatch failed");
                }
            });
        }

        Ok(TriggerReply::StreamName(format!("live+{}", validation.internal_name)))
    }

    // ---- play-rewrite ------------------------------------------------------

    async fn handle_play_rewrite(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::PlayRewrite { requested_id, client_ip } = &trigger.payload else {
            unreachable!("kind checked in handle()");
        };

        let resolved = self.resolve_playback_id(requested_id).await?;
        let tenant_id = resolved.tenant_id().clone();

        let cache_key_name = match &resolved {
            ResolvedTarget::Live { internal_name, .. } => internal_name.clone(),
            ResolvedTarget::Artifact { artifact_hash, .. } => InternalName::from(artifact_hash.as_str()),
        };

        if let Some(status) = self.billing_status(&tenant_id, &cache_key_name).await {
            if status.is_rejected() {
                return Err(FoghornError::IngestRejected(if status.is_suspended {
                    RejectionCode::AccountSuspended
                } else {
                    RejectionCode::PaymentRequired
                }));
            }
        }
        // §7 "fail-open on viewer playback" when billing is unresolvable:
        // absence of a status (lookup failed and is logged inside
        // `billing_status`) falls through to acceptance.

        let viewer_geo = match client_ip {
            Some(ip) => self.lookup_geo(&ip.to_string()).await,
            None => None,
        };
        let node_geo = self.state.get_node(&trigger.node_id).and_then(|n| n.geo);

        let (stream_name, event_fields) = match &resolved {
            ResolvedTarget::Live { internal_name, .. } => (
                format!("live+{internal_name}"),
                serde_json::json!({"event": "play_rewrite", "internal_name": internal_name.as_str()}),
            ),
            ResolvedTarget::Artifact { artifact_hash, .. } => (
                format!("vod+{artifact_hash}"),
                serde_json::json!({"event": "play_rewrite", "artifact_hash": artifact_hash.as_str()}),
            ),
        };

        self.forward_enriched(&trigger, Some(tenant_id), viewer_geo, node_geo, event_fields).await;

        Ok(TriggerReply::StreamName(stream_name))
    }

    async fn resolve_playback_id(&self, requested_id: &str) -> Result<ResolvedTarget> {
        // Try every resolution kind the registry understands; the wire
        // format doesn't disambiguate up front (§4.4: "unified registry
        // lookup"). A real Commodore client would infer the kind from the
        // id's shape; this crate treats that inference as part of the
        // registry contract itself and simply tries `InternalName` first.
        for kind in [
            ResolveKind::InternalName,
            ResolveKind::PlaybackId,
            ResolveKind::ClipHash,
            ResolveKind::DvrHash,
            ResolveKind::VodHash,
        ] {
            match self.registry.get().resolve(kind, requested_id).await {
                Ok(target) => return Ok(target),
                Err(ContractError::NotFound(_)) => continue,
                Err(ContractError::Unavailable(msg)) => return Err(FoghornError::DownstreamUnavailable(msg)),
                Err(ContractError::Invalid(msg)) => return Err(FoghornError::InvalidArgument(msg)),
                Err(ContractError::Internal(msg)) => return Err(FoghornError::Internal(msg)),
            }
        }
        Err(FoghornError::NotFound(requested_id.to_string()))
    }

    /// Cache-first billing lookup (§4.4 play-rewrite). `None` means the
    /// lookup could not be resolved (cache miss and registry/billing both
    /// unreachable); the caller fails open.
    async fn billing_status(&self, tenant_id: &TenantId, internal_name: &InternalName) -> Option<BillingCacheEntry> {
        if let Some(entry) = self.billing_cache.get(tenant_id, internal_name).await {
            return Some(entry);
        }
        if self.billing_cache.is_negatively_cached(tenant_id, internal_name).await {
            return None;
        }
        match tokio::time::timeout(BILLING_TIMEOUT, self.billing.get().check_owner_billing(tenant_id)).await {
            Ok(Ok(status)) => {
                let entry = BillingCacheEntry {
                    billing_model: status.billing_model,
                    is_suspended: status.is_suspended,
                    is_balance_negative: status.is_balance_negative,
                };
                self.billing_cache.put(tenant_id, internal_name, entry).await;
                Some(entry)
            }
            Ok(Err(err)) => {
                warn!(%err, %tenant_id, "billing lookup failed, failing open for playback");
                self.billing_cache.put_negative(tenant_id, internal_name).await;
                None
            }
            Err(_) => {
                warn!(%tenant_id, "billing lookup timed out, failing open for playback");
                self.billing_cache.put_negative(tenant_id, internal_name).await;
                None
            }
        }
    }

    // ---- stream-source -----------------------------------------------------

    async fn handle_stream_source(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::StreamSource { stream_name } = &trigger.payload else {
            unreachable!("kind checked in handle()");
        };

        if stream_name.starts_with("live+") {
            // §4.4: "only applicable to non-live stream names". A live
            // request reaching this handler is a caller error upstream,
            // not ours to resolve; abort rather than fabricate a path.
            return Ok(TriggerReply::Path {
                value: String::new(),
                abort: true,
            });
        }

        let hash = stream_name
            .rsplit_once('+')
            .map(|(_, hash)| hash)
            .unwrap_or(stream_name.as_str());

        let resolved = match self.registry.get().resolve(ResolveKind::VodHash, hash).await {
            Ok(resolved) => resolved,
            Err(_) => return Ok(TriggerReply::Path { value: String::new(), abort: true }),
        };
        let ResolvedTarget::Artifact { artifact_hash, .. } = resolved else {
            return Ok(TriggerReply::Path { value: String::new(), abort: true });
        };

        let node = self.state.get_node(&trigger.node_id);
        let path = node
            .and_then(|n| n.artifacts.into_iter().find(|a| a.artifact_hash == artifact_hash))
            .map(|a| a.local_path);

        match path {
            Some(value) => Ok(TriggerReply::Path { value, abort: false }),
            None => Ok(TriggerReply::Path { value: String::new(), abort: true }),
        }
    }

    // ---- viewer connect / disconnect --------------------------------------

    async fn handle_viewer_connect(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::ViewerConnect {
            internal_name,
            request_url,
            session_id,
            client_ip,
        } = &trigger.payload
        else {
            unreachable!("kind checked in handle()");
        };
        let now = trigger.timestamp;

        if let Some(correlation_id) = parse_correlation_id(request_url) {
            let key = foghorn_model::viewer::VirtualViewerKey {
                correlation_id,
                node_id: trigger.node_id.clone(),
                internal_name: internal_name.clone(),
                client_ip: client_ip.unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)),
            };
            self.state.confirm_virtual_viewer_by_id(&key, session_id.clone(), now);
        }

        self.state.update_user_connection(internal_name, &trigger.node_id, 1, now);

        let viewer_geo = match client_ip {
            Some(ip) => self.lookup_geo(&ip.to_string()).await,
            None => None,
        };
        let node_geo = self.state.get_node(&trigger.node_id).and_then(|n| n.geo);
        let tenant_id = trigger.tenant_id.clone().or_else(|| self.state.get_stream(internal_name).map(|s| s.tenant_id));

        self.forward_enriched(
            &trigger,
            tenant_id,
            viewer_geo,
            node_geo,
            serde_json::json!({"event": "viewer_connect", "internal_name": internal_name.as_str(), "session_id": session_id}),
        )
        .await;

        Ok(TriggerReply::Ack)
    }

    async fn handle_viewer_disconnect(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::ViewerDisconnect { internal_name, session_id } = &trigger.payload else {
            unreachable!("kind checked in handle()");
        };
        let now = trigger.timestamp;

        self.state.disconnect_virtual_viewer_by_session_id(session_id, now);
        self.state.update_user_connection(internal_name, &trigger.node_id, -1, now);

        Ok(TriggerReply::Ack)
    }

    // ---- stream-buffer / stream-end / track-list --------------------------

    async fn handle_stream_buffer(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::StreamBuffer { internal_name, buffer_state, .. } = &trigger.payload else {
            unreachable!("kind checked in handle()");
        };
        let tenant_id = trigger
            .tenant_id
            .clone()
            .or_else(|| self.state.get_stream(internal_name).map(|s| s.tenant_id))
            .unwrap_or_else(TenantId::new);
        self.state
            .update_stream_from_buffer(internal_name.clone(), trigger.node_id.clone(), tenant_id, *buffer_state, trigger.timestamp);
        Ok(TriggerReply::Ack)
    }

    async fn handle_stream_end(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::StreamEnd { internal_name } = &trigger.payload else {
            unreachable!("kind checked in handle()");
        };
        self.state.set_offline(internal_name, &trigger.node_id, trigger.timestamp);

        let dvr_node = self.dvr_by_stream.lock().remove(internal_name);
        if let Some(node_id) = dvr_node {
            let dispatcher = Arc::clone(&self.dispatcher);
            let internal_name = internal_name.clone();
            tokio::spawn(async move {
                let command = Command::DvrStop { internal_name: internal_name.clone() };
                if let Err(err) = dispatcher.dispatch(&node_id, command, DEFAULT_DISPATCH_TIMEOUT).await {
                    warn!(%err, internal_name = %internal_name, "DVR stop dispatch failed");
                }
            });
        }
        Ok(TriggerReply::Ack)
    }

    async fn handle_track_list(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::TrackList { internal_name, tracks } = &trigger.payload else {
            unreachable!("kind checked in handle()");
        };
        self.state.update_track_list(internal_name, tracks.clone(), trigger.timestamp);
        Ok(TriggerReply::Ack)
    }

    // ---- node-lifecycle-update (heartbeat) --------------------------------

    async fn handle_node_lifecycle_update(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::NodeLifecycleUpdate {
            base_url,
            healthy,
            geo,
            capabilities,
            capacity,
            metrics,
            reported_mode,
            artifacts,
            total_connections,
            streams,
        } = &trigger.payload
        else {
            unreachable!("kind checked in handle()");
        };
        let now = trigger.timestamp;

        self.state
            .set_node_info(trigger.node_id.clone(), base_url.clone(), *healthy, *geo, now)
            .await?;
        if let Some(node) = self.state.get_node(&trigger.node_id) {
            if let Some(reported) = reported_mode {
                if *reported != node.mode {
                    warn!(node_id = %trigger.node_id, reported = ?reported, authoritative = ?node.mode, "edge-reported mode disagrees with authoritative mode");
                }
            }
        }

        self.state
            .update_node_metrics(
                &trigger.node_id,
                *capacity,
                *metrics,
                *reported_mode,
                artifacts.clone(),
                *total_connections,
                now,
            )
            .await?;

        self.state.set_node_capabilities(&trigger.node_id, capabilities.clone()).await?;

        for stream in streams {
            self.state.update_node_stats(
                stream.internal_name.clone(),
                trigger.node_id.clone(),
                stream.tenant_id.clone(),
                stream.total_viewers,
                stream.inputs,
                stream.bytes_up,
                stream.bytes_down,
                stream.replicated,
                now,
            );
        }

        Ok(TriggerReply::Ack)
    }

    // ---- process-billing (cache invalidation) -----------------------------

    async fn handle_process_billing(&self, trigger: Trigger) -> Result<TriggerReply> {
        let TriggerPayload::ProcessBilling { tenant_id } = &trigger.payload else {
            unreachable!("kind checked in handle()");
        };
        self.billing_cache.invalidate_tenant(tenant_id).await;
        info!(%tenant_id, "billing cache invalidated");
        Ok(TriggerReply::Ack)
    }

    async fn handle_passthrough(&self, trigger: Trigger) -> Result<TriggerReply> {
        // These variants (push-end, push-out-start, recording
        // progress/completion, lifecycle updates, storage snapshot) have no
        // state-manager mutation specified beyond forwarding an enriched
        // analytics event (§4.4). Type safety is already enforced by
        // `handle()`; there is nothing further to validate here.
        let tenant_id = trigger.tenant_id.clone();
        self.forward_enriched(
            &trigger,
            tenant_id,
            None,
            None,
            serde_json::json!({"event": format!("{:?}", trigger.trigger_type)}),
        )
        .await;
        Ok(TriggerReply::Ack)
    }

    // ---- shared helpers ----------------------------------------------------

    async fn lookup_geo(&self, host_or_ip: &str) -> Option<GeoPoint> {
        let geoip = self.geoip.as_ref()?;
        match geoip.lookup(host_or_ip).await {
            Ok(point) => point,
            Err(err) => {
                warn!(%err, host_or_ip, "geoip lookup failed");
                None
            }
        }
    }

    /// §4.4 "analytics forwarding guard" / §8 invariant 8: refuses (and
    /// meters) any send whose `tenant_id` would be empty. Geo fields are
    /// bucketed here, at the boundary into `EnrichedTrigger`, never passed
    /// through raw (§6.4).
    async fn forward_enriched(
        &self,
        trigger: &Trigger,
        tenant_id: Option<TenantId>,
        from_geo: Option<GeoPoint>,
        node_geo: Option<GeoPoint>,
        fields: serde_json::Value,
    ) {
        let Some(tenant_id) = tenant_id else {
            self.analytics_refused.fetch_add(1, Ordering::Relaxed);
            warn!(trigger_type = ?trigger.trigger_type, "analytics send refused: tenant_id missing");
            return;
        };

        let client_bucket = from_geo.and_then(|g| g.bucket());
        let routing_distance_km = match (from_geo, node_geo) {
            (Some(a), Some(b)) => Some(a.great_circle_km(&b)),
            _ => None,
        };

        let event = EnrichedTrigger {
            tenant_id,
            trigger_type: format!("{:?}", trigger.trigger_type),
            node_id: trigger.node_id.clone(),
            timestamp: trigger.timestamp,
            client_bucket,
            routing_distance_km,
            fields,
        };

        if let Err(err) = self.analytics.send(event).await {
            warn!(%err, "analytics forwarding failed");
        }
    }
}

fn type_name(kind: TriggerType) -> &'static str {
    match kind {
        TriggerType::PushRewrite => "push_rewrite",
        TriggerType::PlayRewrite => "play_rewrite",
        TriggerType::StreamSource => "stream_source",
        TriggerType::PushEnd => "push_end",
        TriggerType::PushOutStart => "push_out_start",
        TriggerType::ViewerConnect => "viewer_connect",
        TriggerType::ViewerDisconnect => "viewer_disconnect",
        TriggerType::StreamBuffer => "stream_buffer",
        TriggerType::StreamEnd => "stream_end",
        TriggerType::TrackList => "track_list",
        TriggerType::RecordingComplete => "recording_complete",
        TriggerType::RecordingSegment => "recording_segment",
        TriggerType::StreamLifecycleUpdate => "stream_lifecycle_update",
        TriggerType::ClientLifecycleUpdate => "client_lifecycle_update",
        TriggerType::NodeLifecycleUpdate => "node_lifecycle_update",
        TriggerType::ProcessBilling => "process_billing",
        TriggerType::StorageLifecycleUpdate => "storage_lifecycle_update",
        TriggerType::StorageSnapshot => "storage_snapshot",
    }
}

/// Pull the `fwcid` query parameter (§4.7/§6.1) out of a viewer-connect
/// request URL, if present.
fn parse_correlation_id(request_url: &str) -> Option<CorrelationId> {
    let url = url::Url::parse(request_url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "fwcid")
        .and_then(|(_, v)| uuid::Uuid::parse_str(&v).ok())
        .map(CorrelationId::from)
}

/// Detected publish protocol from the push URL's scheme (§4.4).
fn detect_protocol(push_url: &str) -> &'static str {
    match url::Url::parse(push_url).ok().map(|u| u.scheme().to_string()) {
        Some(scheme) if scheme == "rtmp" => "rtmp",
        Some(scheme) if scheme == "srt" => "srt",
        Some(scheme) if scheme == "whip" => "whip",
        Some(scheme) if scheme.starts_with("http") => "http",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use foghorn_contracts::analytics::NullAnalyticsSink;
    use foghorn_contracts::registry::{BillingModel, StreamKeyValidation};
    use foghorn_model::ids::{StreamRegistryId, UserId};
    use foghorn_model::node::NodeMetrics;
    use std::net::{IpAddr, Ipv4Addr};

    struct FakeRegistry {
        suspended: bool,
        balance_negative: bool,
        model: BillingModel,
    }

    #[async_trait]
    impl RegistryResolver for FakeRegistry {
        async fn validate_stream_key(&self, _stream_key: &str) -> foghorn_contracts::error::Result<StreamKeyValidation> {
            Ok(StreamKeyValidation {
                tenant_id: TenantId::new(),
                user_id: UserId::new(),
                internal_name: InternalName::from("abcd-1234"),
                stream_id: StreamRegistryId::new(),
                billing_model: self.model,
                is_suspended: self.suspended,
                is_balance_negative: self.balance_negative,
                is_recording_enabled: false,
            })
        }

        async fn resolve(&self, _kind: ResolveKind, _id: &str) -> foghorn_contracts::error::Result<ResolvedTarget> {
            Err(ContractError::NotFound("not wired in this fake".into()))
        }
    }

    struct FakeDispatcher;

    #[async_trait]
    impl CommandDispatcher for FakeDispatcher {
        async fn dispatch(&self, _node_id: &NodeId, _command: Command, _timeout: Duration) -> foghorn_contracts::error::Result<Reply> {
            Ok(Reply::Done)
        }
    }

    fn processor(registry: FakeRegistry) -> TriggerProcessor {
        TriggerProcessor::new(
            Arc::new(StateManager::new(crate::state::StateManagerConfig::default())),
            Arc::new(Switchable::new(Arc::new(registry))),
            Arc::new(Switchable::new(Arc::new(crate::supervisor::UnavailableBilling))),
            Arc::new(NullAnalyticsSink),
            None,
            Arc::new(FakeDispatcher),
        )
    }

    fn push_trigger() -> Trigger {
        Trigger {
            trigger_type: TriggerType::PushRewrite,
            node_id: NodeId::from("node-a"),
            timestamp: Utc::now(),
            request_id: None,
            tenant_id: None,
            stream_id: None,
            user_id: None,
            cluster_id: None,
            payload: TriggerPayload::PushRewrite {
                stream_key: "abcd-efgh-ijkl-mnop".into(),
                push_url: "rtmp://ingest.example/live".into(),
                publisher_hostname: "198.51.100.7".into(),
            },
        }
    }

    #[tokio::test]
    async fn accepted_ingest_returns_live_prefixed_name() {
        let processor = processor(FakeRegistry {
            suspended: false,
            balance_negative: false,
            model: BillingModel::Postpaid,
        });
        let reply = processor.handle(push_trigger()).await.unwrap();
        assert_eq!(reply, TriggerReply::StreamName("live+abcd-1234".into()));
    }

    #[tokio::test]
    async fn suspended_account_is_rejected() {
        let processor = processor(FakeRegistry {
            suspended: true,
            balance_negative: false,
            model: BillingModel::Postpaid,
        });
        let err = processor.handle(push_trigger()).await.unwrap_err();
        assert!(matches!(err, FoghornError::IngestRejected(RejectionCode::AccountSuspended)));
    }

    #[tokio::test]
    async fn prepaid_negative_balance_requires_payment() {
        let processor = processor(FakeRegistry {
            suspended: false,
            balance_negative: true,
            model: BillingModel::Prepaid,
        });
        let err = processor.handle(push_trigger()).await.unwrap_err();
        assert!(matches!(err, FoghornError::IngestRejected(RejectionCode::PaymentRequired)));
    }

    #[tokio::test]
    async fn mismatched_payload_is_rejected_before_dispatch() {
        let processor = processor(FakeRegistry {
            suspended: false,
            balance_negative: false,
            model: BillingModel::Postpaid,
        });
        let mut trigger = push_trigger();
        trigger.trigger_type = TriggerType::ViewerConnect;
        let err = processor.handle(trigger).await.unwrap_err();
        assert!(matches!(err, FoghornError::PayloadTypeMismatch { .. }));
    }

    #[tokio::test]
    async fn viewer_connect_increments_user_connection() {
        let processor = processor(FakeRegistry {
            suspended: false,
            balance_negative: false,
            model: BillingModel::Postpaid,
        });
        let internal_name = InternalName::from("stream-x");
        processor
            .state
            .update_node_stats(internal_name.clone(), NodeId::from("node-a"), TenantId::new(), 0, 1, 0, 0, false, Utc::now());
        let trigger = Trigger {
            trigger_type: TriggerType::ViewerConnect,
            node_id: NodeId::from("node-a"),
            timestamp: Utc::now(),
            request_id: None,
            tenant_id: None,
            stream_id: None,
            user_id: None,
            cluster_id: None,
            payload: TriggerPayload::ViewerConnect {
                internal_name: internal_name.clone(),
                request_url: "https://edge.example/play?fwcid=not-a-uuid".into(),
                session_id: "sess-1".into(),
                client_ip: Some(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7))),
            },
        };
        processor.handle(trigger).await.unwrap();
        let stream = processor.state.get_stream(&internal_name).unwrap();
        assert_eq!(stream.total_viewers, 1);
    }
}
