use std::collections::BTreeSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::geo::GeoPoint;
use crate::ids::NodeId;

/// Operational mode. Foghorn is authoritative over this value; an
/// edge-reported mode is confirmation-only and a mismatch is logged, never
/// applied (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeMode {
    Normal,
    Draining,
    Maintenance,
}

impl Default for NodeMode {
    fn default() -> Self {
        Self::Normal
    }
}

/// Capability flags plus free-form role tags a node may advertise. The
/// fixed flags (`ingest`/`edge`/`storage`/`processing`) and the role-tag set
/// share one wire vocabulary: `cap=storage,edge` on the admin surface (§6.3)
/// and the balancer's capability filter (§4.3) both name either a fixed
/// flag or a role tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeCapabilities {
    pub ingest: bool,
    pub edge: bool,
    pub storage: bool,
    pub processing: bool,
    pub roles: BTreeSet<String>,
}

impl NodeCapabilities {
    pub fn has(&self, tag: &str) -> bool {
        match tag {
            "ingest" => self.ingest,
            "edge" => self.edge,
            "storage" => self.storage,
            "processing" => self.processing,
            other => self.roles.contains(other),
        }
    }

    /// True iff every tag in `required` is satisfied. Used by the
    /// balancer's capability filter (§4.3 step 2).
    pub fn satisfies_all(&self, required: &[String]) -> bool {
        required.iter().all(|tag| self.has(tag))
    }

    /// All advertised tags (fixed flags + role tags), used to apply
    /// per-tag score adjustments (§4.1).
    pub fn all_tags(&self) -> impl Iterator<Item = &str> {
        let fixed = [
            self.ingest.then_some("ingest"),
            self.edge.then_some("edge"),
            self.storage.then_some("storage"),
            self.processing.then_some("processing"),
        ];
        fixed
            .into_iter()
            .flatten()
            .chain(self.roles.iter().map(String::as_str))
    }
}

/// Static capacity limits, reported on registration and refreshed on every
/// heartbeat (§3). All byte-denominated fields are in bytes, not
/// bytes-per-second, per §9's unit-mixing open question — `bw_limit` is the
/// lone bytes/sec field and is named accordingly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeCapacity {
    pub ram_max: u64,
    pub bw_limit: u64,
    pub storage_capacity_bytes: u64,
    pub max_transcodes: u32,
}

/// Live metrics refreshed on every `node-lifecycle-update` heartbeat.
/// Replaces the previous value wholesale (last writer wins, §5).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeMetrics {
    pub cpu_percent: f64,
    pub ram_current: u64,
    pub up_speed: u64,
    pub down_speed: u64,
    pub storage_used_bytes: u64,
    pub current_transcodes: u32,
    pub disk_used_bytes: u64,
    pub disk_total_bytes: u64,
}

impl NodeMetrics {
    /// CPU usage as tenths of a percent (0..=1000), the unit the scoring
    /// kernel's integer arithmetic uses.
    pub fn cpu_tenths(&self) -> u64 {
        (self.cpu_percent * 10.0).round().clamp(0.0, 1000.0) as u64
    }
}

/// An entry in a node's artifact inventory, reported via heartbeat and
/// consulted by the `stream-source` trigger to resolve a VOD file path
/// (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeArtifactEntry {
    pub artifact_hash: crate::ids::ArtifactHash,
    pub local_path: String,
}

/// A media server instance under this cluster's management (§3). Created on
/// first heartbeat, mutated by the trigger processor, marked inactive when
/// its heartbeat goes stale; destroyed only by operator action (never by
/// the state manager itself).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub node_id: NodeId,
    pub base_url: String,
    pub geo: Option<GeoPoint>,
    pub capabilities: NodeCapabilities,
    pub capacity: NodeCapacity,
    pub metrics: NodeMetrics,
    pub mode: NodeMode,
    /// Mode as last reported by the edge node itself. Confirmation only;
    /// never used to decide `mode`.
    pub reported_mode: Option<NodeMode>,
    pub last_update: DateTime<Utc>,
    /// Self-reported heartbeat cadence, used to widen the staleness window
    /// for nodes that heartbeat slower than the cluster default.
    pub heartbeat_interval: ChronoDuration,
    pub artifacts: Vec<NodeArtifactEntry>,

    // Virtual-viewer bookkeeping (C7), kept alongside the node because it
    // feeds directly back into this node's own score.
    pub pending_redirects: u64,
    pub add_bandwidth: u64,
    pub est_bandwidth_per_user: u64,
}

impl Node {
    pub fn new(node_id: NodeId, base_url: String, now: DateTime<Utc>) -> Self {
        Self {
            node_id,
            base_url,
            geo: None,
            capabilities: NodeCapabilities::default(),
            capacity: NodeCapacity::default(),
            metrics: NodeMetrics::default(),
            mode: NodeMode::default(),
            reported_mode: None,
            last_update: now,
            heartbeat_interval: ChronoDuration::seconds(5),
            artifacts: Vec::new(),
            pending_redirects: 0,
            add_bandwidth: 0,
            est_bandwidth_per_user: 0,
        }
    }

    /// §3: `is_active` iff the last update is within the heartbeat window.
    /// The window widens for nodes whose self-reported heartbeat cadence is
    /// slower than the cluster default, floored/ceilinged by the caller.
    pub fn is_active(&self, now: DateTime<Utc>, heartbeat_window: ChronoDuration) -> bool {
        let window = heartbeat_window.max(self.heartbeat_interval * 3);
        now - self.last_update <= window
    }

    /// §3/§8 invariant 2: `avail_bandwidth = max(0, bw_limit - up_speed - add_bandwidth)`.
    pub fn avail_bandwidth(&self) -> u64 {
        self.capacity
            .bw_limit
            .saturating_sub(self.metrics.up_speed)
            .saturating_sub(self.add_bandwidth)
    }

    /// Human-readable status string for the legacy `lstserver` admin surface
    /// (§6.3), preserved verbatim from the source convention.
    pub fn admin_status_label(&self, now: DateTime<Utc>, heartbeat_window: ChronoDuration) -> &'static str {
        if self.is_active(now, heartbeat_window) {
            "Monitored (online)"
        } else {
            "Offline"
        }
    }
}
