//! Wire encoding for §6.1's envelope: the edge node sends JSON text frames
//! shaped `Trigger { trigger_type, node_id, timestamp, ..., payload }`, and
//! expects `Command`/`Reply` frames back. These types are the serde mirror
//! of `foghorn_core::trigger::types::{Trigger, TriggerPayload}` and
//! `foghorn_contracts::dispatch::{Command, Reply}` — kept separate from
//! them so the wire format can evolve without touching core's types.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use foghorn_contracts::dispatch::{Command, Reply};
use foghorn_core::error::{FoghornError, Result};
use foghorn_core::trigger::{EmbeddedStreamStats, Trigger, TriggerPayload, TriggerReply, TriggerType};
use foghorn_model::geo::GeoPoint;
use foghorn_model::ids::{ArtifactHash, CorrelationId, InternalName, NodeId, TenantId};
use uuid::Uuid;

fn parse_uuid_id<T: From<Uuid>>(raw: &str) -> Result<T> {
    raw.parse::<Uuid>()
        .map(T::from)
        .map_err(|_| FoghornError::InvalidArgument(format!("invalid id {raw:?}")))
}
use foghorn_model::node::{NodeArtifactEntry, NodeCapabilities, NodeCapacity, NodeMetrics, NodeMode};
use foghorn_model::stream::{BufferState, TrackInfo};
use serde::{Deserialize, Serialize};

/// The envelope as it appears on the wire, tag-adjacent (§9 supplemented
/// feature: `trigger_type` is a plain string tag, the payload fields ride
/// alongside it rather than in a nested `oneof` object).
#[derive(Debug, Deserialize)]
pub struct WireTrigger {
    pub trigger_type: String,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Value,
}

impl WireTrigger {
    pub fn into_trigger(self) -> Result<Trigger> {
        let kind = parse_trigger_type(&self.trigger_type)?;
        let payload = decode_payload(kind, &self.fields)?;
        Ok(Trigger {
            trigger_type: kind,
            node_id: NodeId::from(self.node_id),
            timestamp: self.timestamp,
            request_id: self.request_id,
            tenant_id: self.tenant_id.as_deref().map(parse_uuid_id).transpose()?,
            stream_id: self.stream_id.as_deref().map(parse_uuid_id).transpose()?,
            user_id: self.user_id.as_deref().map(parse_uuid_id).transpose()?,
            cluster_id: self.cluster_id,
            payload,
        })
    }
}

fn parse_trigger_type(raw: &str) -> Result<TriggerType> {
    Ok(match raw {
        "push-rewrite" => TriggerType::PushRewrite,
        "play-rewrite" => TriggerType::PlayRewrite,
        "stream-source" => TriggerType::StreamSource,
        "push-end" => TriggerType::PushEnd,
        "push-out-start" => TriggerType::PushOutStart,
        "viewer-connect" => TriggerType::ViewerConnect,
        "viewer-disconnect" => TriggerType::ViewerDisconnect,
        "stream-buffer" => TriggerType::StreamBuffer,
        "stream-end" => TriggerType::StreamEnd,
        "track-list" => TriggerType::TrackList,
        "recording-complete" => TriggerType::RecordingComplete,
        "recording-segment" => TriggerType::RecordingSegment,
        "stream-lifecycle-update" => TriggerType::StreamLifecycleUpdate,
        "client-lifecycle-update" => TriggerType::ClientLifecycleUpdate,
        "node-lifecycle-update" => TriggerType::NodeLifecycleUpdate,
        "process-billing" => TriggerType::ProcessBilling,
        "storage-lifecycle-update" => TriggerType::StorageLifecycleUpdate,
        "storage-snapshot" => TriggerType::StorageSnapshot,
        other => return Err(FoghornError::InvalidArgument(format!("unknown trigger_type {other:?}"))),
    })
}

fn decode_payload(kind: TriggerType, fields: &serde_json::Value) -> Result<TriggerPayload> {
    let get_str = |key: &str| -> Result<String> {
        fields
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| FoghornError::InvalidArgument(format!("missing field {key:?}")))
    };
    let get_opt_str = |key: &str| -> Option<String> { fields.get(key).and_then(|v| v.as_str()).map(str::to_owned) };
    let get_ip = |key: &str| -> Option<IpAddr> { get_opt_str(key).and_then(|s| s.parse().ok()) };
    let get_u64 = |key: &str| -> u64 { fields.get(key).and_then(|v| v.as_u64()).unwrap_or(0) };
    let get_bool = |key: &str| -> bool { fields.get(key).and_then(|v| v.as_bool()).unwrap_or(false) };

    Ok(match kind {
        TriggerType::PushRewrite => TriggerPayload::PushRewrite {
            stream_key: get_str("stream_key")?,
            push_url: get_str("push_url")?,
            publisher_hostname: get_str("publisher_hostname")?,
        },
        TriggerType::PlayRewrite => TriggerPayload::PlayRewrite {
            requested_id: get_str("requested_id")?,
            client_ip: get_ip("client_ip"),
        },
        TriggerType::StreamSource => TriggerPayload::StreamSource {
            stream_name: get_str("stream_name")?,
        },
        TriggerType::PushEnd => TriggerPayload::PushEnd {
            internal_name: InternalName::from(get_str("internal_name")?),
        },
        TriggerType::PushOutStart => TriggerPayload::PushOutStart {
            internal_name: InternalName::from(get_str("internal_name")?),
        },
        TriggerType::ViewerConnect => TriggerPayload::ViewerConnect {
            internal_name: InternalName::from(get_str("internal_name")?),
            request_url: get_str("request_url")?,
            session_id: get_str("session_id")?,
            client_ip: get_ip("client_ip"),
        },
        TriggerType::ViewerDisconnect => TriggerPayload::ViewerDisconnect {
            internal_name: InternalName::from(get_str("internal_name")?),
            session_id: get_str("session_id")?,
        },
        TriggerType::StreamBuffer => TriggerPayload::StreamBuffer {
            internal_name: InternalName::from(get_str("internal_name")?),
            buffer_state: match get_opt_str("buffer_state").as_deref() {
                Some("filling") => BufferState::Filling,
                Some("full") => BufferState::Full,
                Some("dry") => BufferState::Dry,
                Some("recovering") => BufferState::Recovering,
                _ => BufferState::Empty,
            },
            issues: fields
                .get("issues")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
                .unwrap_or_default(),
        },
        TriggerType::StreamEnd => TriggerPayload::StreamEnd {
            internal_name: InternalName::from(get_str("internal_name")?),
        },
        TriggerType::TrackList => TriggerPayload::TrackList {
            internal_name: InternalName::from(get_str("internal_name")?),
            tracks: fields
                .get("tracks")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|t| {
                            Some(TrackInfo {
                                codec: t.get("codec")?.as_str()?.to_string(),
                                resolution: t
                                    .get("width")
                                    .and_then(|v| v.as_u64())
                                    .zip(t.get("height").and_then(|v| v.as_u64()))
                                    .map(|(w, h)| (w as u32, h as u32)),
                                bitrate_bps: t.get("bitrate_bps").and_then(|v| v.as_u64()).unwrap_or(0),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        },
        TriggerType::RecordingComplete => TriggerPayload::RecordingComplete {
            artifact_hash: ArtifactHash::from(get_str("artifact_hash")?),
            size_bytes: get_u64("size_bytes"),
        },
        TriggerType::RecordingSegment => TriggerPayload::RecordingSegment {
            artifact_hash: ArtifactHash::from(get_str("artifact_hash")?),
            segment_index: get_u64("segment_index") as u32,
        },
        TriggerType::StreamLifecycleUpdate => TriggerPayload::StreamLifecycleUpdate {
            internal_name: InternalName::from(get_str("internal_name")?),
            detail: fields.get("detail").cloned().unwrap_or(serde_json::Value::Null),
        },
        TriggerType::ClientLifecycleUpdate => TriggerPayload::ClientLifecycleUpdate {
            session_id: get_str("session_id")?,
            detail: fields.get("detail").cloned().unwrap_or(serde_json::Value::Null),
        },
        TriggerType::NodeLifecycleUpdate => TriggerPayload::NodeLifecycleUpdate {
            base_url: get_str("base_url")?,
            healthy: get_bool("healthy"),
            geo: fields
                .get("lat")
                .and_then(|v| v.as_f64())
                .zip(fields.get("lon").and_then(|v| v.as_f64()))
                .and_then(|(lat, lon)| GeoPoint::new(lat, lon).ok()),
            capabilities: NodeCapabilities {
                ingest: get_bool("ingest"),
                edge: get_bool("edge"),
                storage: get_bool("storage"),
                processing: get_bool("processing"),
                roles: fields
                    .get("roles")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
                    .unwrap_or_default(),
            },
            capacity: NodeCapacity {
                ram_max: get_u64("ram_max"),
                bw_limit: get_u64("bw_limit"),
                storage_capacity_bytes: get_u64("storage_capacity_bytes"),
                max_transcodes: get_u64("max_transcodes") as u32,
            },
            metrics: NodeMetrics {
                cpu_percent: fields.get("cpu_percent").and_then(|v| v.as_f64()).unwrap_or(0.0),
                ram_current: get_u64("ram_current"),
                up_speed: get_u64("up_speed"),
                down_speed: get_u64("down_speed"),
                storage_used_bytes: get_u64("storage_used_bytes"),
                current_transcodes: get_u64("current_transcodes") as u32,
                disk_used_bytes: get_u64("disk_used_bytes"),
                disk_total_bytes: get_u64("disk_total_bytes"),
            },
            reported_mode: get_opt_str("mode").and_then(|m| match m.as_str() {
                "normal" => Some(NodeMode::Normal),
                "draining" => Some(NodeMode::Draining),
                "maintenance" => Some(NodeMode::Maintenance),
                _ => None,
            }),
            artifacts: fields
                .get("artifacts")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|a| {
                            Some(NodeArtifactEntry {
                                artifact_hash: ArtifactHash::from(a.get("artifact_hash")?.as_str()?.to_string()),
                                local_path: a.get("local_path")?.as_str()?.to_string(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
            total_connections: get_u64("total_connections"),
            streams: fields
                .get("streams")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|s| {
                            Some(EmbeddedStreamStats {
                                internal_name: InternalName::from(s.get("internal_name")?.as_str()?.to_string()),
                                tenant_id: s.get("tenant_id")?.as_str()?.parse::<Uuid>().ok().map(TenantId::from)?,
                                total_viewers: s.get("total_viewers").and_then(|v| v.as_u64()).unwrap_or(0),
                                inputs: s.get("inputs").and_then(|v| v.as_u64()).unwrap_or(0),
                                bytes_up: s.get("bytes_up").and_then(|v| v.as_u64()).unwrap_or(0),
                                bytes_down: s.get("bytes_down").and_then(|v| v.as_u64()).unwrap_or(0),
                                replicated: s.get("replicated").and_then(|v| v.as_bool()).unwrap_or(false),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        },
        TriggerType::ProcessBilling => TriggerPayload::ProcessBilling {
            tenant_id: parse_uuid_id(&get_str("tenant_id")?)?,
        },
        TriggerType::StorageLifecycleUpdate => TriggerPayload::StorageLifecycleUpdate {
            artifact_hash: ArtifactHash::from(get_str("artifact_hash")?),
            detail: fields.get("detail").cloned().unwrap_or(serde_json::Value::Null),
        },
        TriggerType::StorageSnapshot => TriggerPayload::StorageSnapshot {
            detail: fields.get("detail").cloned().unwrap_or(serde_json::Value::Null),
        },
    })
}

/// §6.1: a blocking trigger's reply body is the rewritten stream name, a
/// target path/URL, or the literal `"true"`/empty string.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WireTriggerReply {
    Text(String),
    PathWithAbort { path: String, abort: bool },
}

impl From<TriggerReply> for WireTriggerReply {
    fn from(reply: TriggerReply) -> Self {
        match reply {
            TriggerReply::StreamName(name) => WireTriggerReply::Text(name),
            TriggerReply::Path { value, abort } => WireTriggerReply::PathWithAbort { path: value, abort },
            TriggerReply::Ack => WireTriggerReply::Text(String::new()),
        }
    }
}

/// Outbound `Command` frame (§6.1), carrying the server-generated
/// `request_id` the reply will be correlated against.
#[derive(Debug, Serialize)]
pub struct WireCommand {
    pub request_id: String,
    pub target_node_id: String,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl WireCommand {
    pub fn new(request_id: CorrelationId, target_node_id: &NodeId, command: &Command) -> Self {
        let payload = match command {
            Command::ClipCreate {
                artifact_hash,
                source_stream,
                tenant_id,
            } => serde_json::json!({
                "type": "clip-create",
                "artifact_hash": artifact_hash.as_str(),
                "source_stream": source_stream.as_str(),
                "tenant_id": tenant_id.as_uuid(),
            }),
            Command::ClipDelete { artifact_hash } => serde_json::json!({
                "type": "clip-delete",
                "artifact_hash": artifact_hash.as_str(),
            }),
            Command::DvrStart { internal_name, tenant_id } => serde_json::json!({
                "type": "dvr-start",
                "internal_name": internal_name.as_str(),
                "tenant_id": tenant_id.as_uuid(),
            }),
            Command::DvrStop { internal_name } => serde_json::json!({
                "type": "dvr-stop",
                "internal_name": internal_name.as_str(),
            }),
            Command::ConfigSeed { config } => serde_json::json!({
                "type": "config-seed",
                "config": config,
            }),
            Command::ArtifactDelete { artifact_hash } => serde_json::json!({
                "type": "artifact-delete",
                "artifact_hash": artifact_hash.as_str(),
            }),
        };
        Self {
            request_id: request_id.to_string(),
            target_node_id: target_node_id.as_str().to_string(),
            payload,
        }
    }
}

/// Inbound `Reply` frame (§6.1): `request_id` is used to find the waiting
/// `oneshot` sender, then stripped before the payload is handed back.
#[derive(Debug, Deserialize)]
pub struct WireReply {
    pub request_id: String,
    #[serde(flatten)]
    pub fields: serde_json::Value,
}

impl WireReply {
    pub fn into_reply(self) -> Result<Reply> {
        let kind = self
            .fields
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FoghornError::InvalidArgument("reply missing type".into()))?;
        Ok(match kind {
            "progress" => Reply::Progress {
                percent: self.fields.get("percent").and_then(|v| v.as_u64()).unwrap_or(0) as u8,
            },
            "done" => Reply::Done,
            "delete-ack" => Reply::DeleteAck,
            "error" => Reply::Error {
                message: self.fields.get("message").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            },
            other => return Err(FoghornError::InvalidArgument(format!("unknown reply type {other:?}"))),
        })
    }
}
