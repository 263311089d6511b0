use chrono::{DateTime, Utc};

use crate::ids::{InternalName, NodeId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamStatus {
    Live,
    Offline,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self::Offline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BufferState {
    Empty,
    Filling,
    Full,
    Dry,
    Recovering,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackInfo {
    pub codec: String,
    pub resolution: Option<(u32, u32)>,
    pub bitrate_bps: u64,
}

/// A logical stream, identified by `internal_name` (§3). `started_at` is
/// monotonic: only ever set on the stream's first live transition, never
/// reset by later re-activations (§5, §8 invariant 6).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stream {
    pub internal_name: InternalName,
    pub tenant_id: TenantId,
    pub status: StreamStatus,
    pub buffer_state: BufferState,
    pub total_viewers: u64,
    pub total_inputs: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub tracks: Vec<TrackInfo>,
}

impl Stream {
    pub fn new(internal_name: InternalName, tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            internal_name,
            tenant_id,
            status: StreamStatus::Offline,
            buffer_state: BufferState::Empty,
            total_viewers: 0,
            total_inputs: 0,
            bytes_up: 0,
            bytes_down: 0,
            started_at: None,
            last_update: now,
            tracks: Vec::new(),
        }
    }

    /// §5/§8 invariant 6: set `started_at` only on the first live
    /// transition. Idempotent — calling this repeatedly while already live
    /// never moves the timestamp.
    pub fn mark_live_if_first_transition(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = StreamStatus::Live;
        self.last_update = now;
    }

    pub fn mark_offline(&mut self, now: DateTime<Utc>) {
        self.status = StreamStatus::Offline;
        self.last_update = now;
    }
}

/// A per-node copy of a stream, keyed by `(internal_name, node_id)` (§3).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamInstance {
    pub internal_name: InternalName,
    pub node_id: NodeId,
    pub tenant_id: TenantId,
    pub total_viewers: u64,
    pub inputs: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub buffer_state: BufferState,
    pub status: StreamStatus,
    /// True for a copy of the stream that is not the publisher's origin
    /// (used for viewer scaling, never eligible as a source, §3).
    pub replicated: bool,
    pub last_update: DateTime<Utc>,
}

impl StreamInstance {
    pub fn new(
        internal_name: InternalName,
        node_id: NodeId,
        tenant_id: TenantId,
        replicated: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            internal_name,
            node_id,
            tenant_id,
            total_viewers: 0,
            inputs: 0,
            bytes_up: 0,
            bytes_down: 0,
            buffer_state: BufferState::Empty,
            status: StreamStatus::Offline,
            replicated,
            last_update: now,
        }
    }

    /// §3 presence rule for **source** selection: non-offline and carrying
    /// at least one input.
    pub fn present_as_source(&self) -> bool {
        self.status != StreamStatus::Offline && self.inputs > 0 && !self.replicated
    }

    /// §3 presence rule for **viewer** selection: any non-offline instance,
    /// replicated or not.
    pub fn present_as_viewer_target(&self) -> bool {
        self.status != StreamStatus::Offline
    }
}
