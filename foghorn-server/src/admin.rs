//! The legacy administrative surface (§6.3): a single root path, keyed
//! entirely by which query parameters are present, preserved verbatim from
//! the source convention rather than redesigned into separate REST routes
//! — operators' existing scripts and dashboards depend on this exact
//! query-string vocabulary.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use foghorn_core::balancer::SelectionRequest;
use foghorn_model::geo::GeoPoint;
use foghorn_model::ids::InternalName;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(root_handler)).route("/healthz", get(health_handler))
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let rehydrate = state.state_manager.rehydrate_status();
    Json(json!({
        "status": "ok",
        "registry_connected": state.registry_status.is_healthy(),
        "billing_connected": state.billing_status.is_healthy(),
        "control_connections": state.control_registry.connected_count(),
        "rehydrate": {
            "nodes_last_run": rehydrate.nodes.last_run,
            "nodes_last_error": rehydrate.nodes.last_error,
            "artifacts_last_run": rehydrate.artifacts.last_run,
            "artifacts_last_error": rehydrate.artifacts.last_error,
        },
    }))
}

/// §6.3: "Any other path is a stream key request; the response is the
/// selected host string." In practice that's modeled here as "any request
/// to `/` that matched none of the named query parameters" — the legacy
/// surface never distinguished path from query in the source, but an axum
/// `Router` needs one concrete route, so every recognized query key is
/// handled here and a bare stream-key lookup is the fallback.
async fn root_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(proto) = params.get("proto") {
        return redirect_for_proto(proto, &params).into_response();
    }

    if let Some(raw) = params.get("weights") {
        return handle_weights(&state, raw).await.into_response();
    }

    if params.get("lstserver").is_some() {
        return handle_list_servers(&state).await.into_response();
    }

    if let Some(stream) = params.get("source") {
        return handle_source(&state, &addr, stream, params.contains_key("redirect")).await.into_response();
    }

    if let Some(min_cpu_tenths) = params.get("ingest") {
        return handle_ingest(&state, &addr, min_cpu_tenths).await.into_response();
    }

    if let Some(stream) = params.get("streamstats") {
        return handle_stream_stats(&state, stream).await.into_response();
    }

    if let Some(stream) = params.get("viewers") {
        return handle_viewers(&state, stream).await.into_response();
    }

    if let Some(host) = params.get("host") {
        return handle_host_status(&state, host).await.into_response();
    }

    // No recognized admin key: treat the whole query string as a stream
    // key request for a viewer-facing best-node lookup (§6.3 "Any other
    // path is a stream key request").
    match params.keys().next() {
        Some(stream_key) => handle_stream_key(&state, &addr, stream_key).await.into_response(),
        None => (StatusCode::BAD_REQUEST, "missing query parameter").into_response(),
    }
}

fn redirect_for_proto(proto: &str, params: &HashMap<String, String>) -> Response {
    let stream = params.keys().find(|k| k.as_str() != "proto").cloned().unwrap_or_default();
    Redirect::temporary(&format!("{proto}://{stream}")).into_response()
}

async fn handle_weights(state: &AppState, raw: &str) -> Response {
    if raw.is_empty() {
        let weights = state.balancer.weights();
        return Json(json!({
            "cpu": weights.cpu,
            "ram": weights.ram,
            "bw": weights.bw,
            "geo": weights.geo,
            "stream_bonus": weights.stream_bonus,
        }))
        .into_response();
    }

    #[derive(serde::Deserialize)]
    struct WeightsUpdate {
        cpu: u64,
        ram: u64,
        bw: u64,
        geo: u64,
        stream_bonus: u64,
    }

    let update: WeightsUpdate = match serde_json::from_str(raw) {
        Ok(update) => update,
        Err(err) => return ApiError::new(StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };

    match state.balancer.set_weights(update.cpu, update.ram, update.bw, update.geo, update.stream_bonus) {
        Ok(()) => Json(json!({"status": "updated"})).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn handle_list_servers(state: &AppState) -> Response {
    let now = Utc::now();
    let heartbeat_window = state.state_manager.heartbeat_window();
    let nodes = state.state_manager.nodes().snapshot();
    let body: HashMap<String, &'static str> = nodes
        .iter()
        .map(|node| (node.node_id.to_string(), node.admin_status_label(now, heartbeat_window)))
        .collect();
    Json(body).into_response()
}

async fn handle_source(state: &AppState, addr: &SocketAddr, stream: &str, redirect: bool) -> Response {
    match best_node_for(state, addr, stream, true).await {
        Ok(node_score) => {
            let host = host_only(&node_score.base_url);
            let dtsc = format!("dtsc://{host}:4200");
            if redirect {
                Redirect::temporary(&dtsc).into_response()
            } else {
                dtsc.into_response()
            }
        }
        // §4's "no eligible node; caller substitutes a configured fallback" —
        // for a DTSC pull that's a localhost fallback, unless operators have
        // pointed FALLBACK_HOST elsewhere.
        Err(_) => {
            let host = state.settings.fallback_host.as_deref().unwrap_or("localhost");
            (StatusCode::SERVICE_UNAVAILABLE, format!("dtsc://{host}:4200")).into_response()
        }
    }
}

async fn handle_ingest(state: &AppState, addr: &SocketAddr, min_cpu_tenths: &str) -> Response {
    let _min_cpu_tenths: u64 = min_cpu_tenths.parse().unwrap_or(0);
    match best_node_for(state, addr, "", true).await {
        Ok(node_score) => node_score.base_url.into_response(),
        // "FULL" is the ingest-side convention callers poll for and back off on.
        Err(_) => state.settings.fallback_host.clone().unwrap_or_else(|| "FULL".into()).into_response(),
    }
}

async fn handle_stream_stats(state: &AppState, stream: &str) -> Response {
    match state.state_manager.get_stream(&InternalName::from(stream)) {
        Some(s) => Json(json!([s.total_viewers, s.bytes_up + s.bytes_down, s.bytes_up, s.bytes_down])).into_response(),
        None => Json(json!([0, 0, 0, 0])).into_response(),
    }
}

async fn handle_viewers(state: &AppState, stream: &str) -> Response {
    match state.state_manager.get_stream(&InternalName::from(stream)) {
        Some(s) => s.total_viewers.to_string().into_response(),
        None => "0".into_response(),
    }
}

async fn handle_host_status(state: &AppState, host: &str) -> Response {
    let now = Utc::now();
    let heartbeat_window = state.state_manager.heartbeat_window();
    let nodes = state.state_manager.nodes().snapshot();
    match nodes.into_iter().find(|n| n.base_url.contains(host) || n.node_id.as_str() == host) {
        Some(node) => {
            let weights = state.balancer.weights();
            Json(json!({
                "node_id": node.node_id.to_string(),
                "base_url": node.base_url,
                "active": node.is_active(now, heartbeat_window),
                "mode": format!("{:?}", node.mode),
                "cpu_percent": node.metrics.cpu_percent,
                "ram_current": node.metrics.ram_current,
                "ram_max": node.capacity.ram_max,
                "up_speed": node.metrics.up_speed,
                "bw_limit": node.capacity.bw_limit,
                "avail_bandwidth": node.avail_bandwidth(),
                "pending_redirects": node.pending_redirects,
                "add_bandwidth": node.add_bandwidth,
                "weights": {
                    "cpu": weights.cpu,
                    "ram": weights.ram,
                    "bw": weights.bw,
                    "geo": weights.geo,
                    "stream_bonus": weights.stream_bonus,
                },
            }))
            .into_response()
        }
        None => (StatusCode::NOT_FOUND, "no such host").into_response(),
    }
}

async fn handle_stream_key(state: &AppState, addr: &SocketAddr, stream_key: &str) -> Response {
    match best_node_for(state, addr, stream_key, false).await {
        Ok(node_score) => node_score.base_url.into_response(),
        Err(_) => state.settings.fallback_host.clone().unwrap_or_else(|| "localhost".into()).into_response(),
    }
}

async fn best_node_for(
    state: &AppState,
    addr: &SocketAddr,
    stream: &str,
    is_source_selection: bool,
) -> foghorn_core::error::Result<foghorn_core::balancer::NodeScore> {
    let snapshot = state.state_manager.get_balancer_snapshot();
    let internal_name = (!stream.is_empty()).then(|| InternalName::from(stream));
    let req = SelectionRequest {
        internal_name: internal_name.as_ref(),
        request_geo: None::<GeoPoint>,
        required_capabilities: &[],
        tag_adjust: &HashMap::new(),
        client_ip: Some(addr.ip()),
        is_source_selection,
    };
    state
        .balancer
        .get_best_node_with_score(&snapshot, &req, Utc::now(), state.state_manager.heartbeat_window())
}

fn host_only(base_url: &str) -> String {
    base_url
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .split('/')
        .next()
        .unwrap_or(base_url)
        .split(':')
        .next()
        .unwrap_or(base_url)
        .to_string()
}
