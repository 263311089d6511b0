use std::collections::HashMap;

use chrono::{DateTime, Utc};
use foghorn_model::ids::{InternalName, NodeId, TenantId};
use foghorn_model::stream::{BufferState, Stream, StreamInstance, StreamStatus, TrackInfo};
use parking_lot::RwLock;

/// Streams and their per-node instances, one `RwLock` each (§5). Kept as
/// two separate maps because they're read at different granularities: the
/// balancer snapshot wants every instance, while most triggers address one
/// aggregate stream.
#[derive(Default)]
pub struct StreamStore {
    streams: RwLock<HashMap<InternalName, Stream>>,
    instances: RwLock<HashMap<(InternalName, NodeId), StreamInstance>>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `UpdateNodeStats`: upsert the per-node instance, then refresh the
    /// aggregate stream's counters from the sum of its instances.
    #[allow(clippy::too_many_arguments)]
    pub fn update_node_stats(
        &self,
        internal_name: InternalName,
        node_id: NodeId,
        tenant_id: TenantId,
        total_viewers: u64,
        inputs: u64,
        bytes_up: u64,
        bytes_down: u64,
        replicated: bool,
        now: DateTime<Utc>,
    ) -> StreamInstance {
        let key = (internal_name.clone(), node_id.clone());
        let instance = {
            let mut guard = self.instances.write();
            let instance = guard.entry(key).or_insert_with(|| {
                StreamInstance::new(internal_name.clone(), node_id.clone(), tenant_id.clone(), replicated, now)
            });
            instance.total_viewers = total_viewers;
            instance.inputs = inputs;
            instance.bytes_up = bytes_up;
            instance.bytes_down = bytes_down;
            instance.replicated = replicated;
            instance.status = if inputs > 0 { StreamStatus::Live } else { instance.status };
            instance.last_update = now;
            instance.clone()
        };
        self.recompute_aggregate(&internal_name, &tenant_id, now);
        instance
    }

    /// `UpdateStreamFromBuffer`: sets `started_at` on the stream's first
    /// live transition and never resets it (§5, §8 invariant 6).
    pub fn update_stream_from_buffer(
        &self,
        internal_name: InternalName,
        node_id: NodeId,
        tenant_id: TenantId,
        buffer_state: BufferState,
        now: DateTime<Utc>,
    ) {
        {
            let mut guard = self.instances.write();
            let instance = guard.entry((internal_name.clone(), node_id)).or_insert_with(|| {
                StreamInstance::new(internal_name.clone(), NodeId::from(""), tenant_id.clone(), false, now)
            });
            instance.buffer_state = buffer_state;
            instance.last_update = now;
        }
        let mut guard = self.streams.write();
        let stream = guard
            .entry(internal_name.clone())
            .or_insert_with(|| Stream::new(internal_name, tenant_id, now));
        stream.buffer_state = buffer_state;
        stream.mark_live_if_first_transition(now);
    }

    pub fn update_track_list(&self, internal_name: &InternalName, tracks: Vec<TrackInfo>, now: DateTime<Utc>) {
        let mut guard = self.streams.write();
        if let Some(stream) = guard.get_mut(internal_name) {
            stream.tracks = tracks;
            stream.last_update = now;
        }
    }

    /// `SetOffline`: mark one instance offline; the aggregate stream goes
    /// offline only once no non-offline instance remains (§4.2).
    pub fn set_offline(&self, internal_name: &InternalName, node_id: &NodeId, now: DateTime<Utc>) {
        {
            let mut guard = self.instances.write();
            if let Some(instance) = guard.get_mut(&(internal_name.clone(), node_id.clone())) {
                instance.status = StreamStatus::Offline;
                instance.last_update = now;
            }
        }
        let any_live = self
            .instances
            .read()
            .values()
            .any(|i| i.internal_name == *internal_name && i.status != StreamStatus::Offline);
        if !any_live {
            let mut guard = self.streams.write();
            if let Some(stream) = guard.get_mut(internal_name) {
                stream.mark_offline(now);
            }
        }
    }

    /// `UpdateUserConnection`: atomic +/-1 viewer adjustment on both the
    /// instance and the aggregate stream.
    pub fn update_user_connection(
        &self,
        internal_name: &InternalName,
        node_id: &NodeId,
        delta: i64,
        now: DateTime<Utc>,
    ) {
        {
            let mut guard = self.instances.write();
            if let Some(instance) = guard.get_mut(&(internal_name.clone(), node_id.clone())) {
                instance.total_viewers = apply_delta(instance.total_viewers, delta);
                instance.last_update = now;
            }
        }
        let mut guard = self.streams.write();
        if let Some(stream) = guard.get_mut(internal_name) {
            stream.total_viewers = apply_delta(stream.total_viewers, delta);
            stream.last_update = now;
        }
    }

    fn recompute_aggregate(&self, internal_name: &InternalName, tenant_id: &TenantId, now: DateTime<Utc>) {
        let (total_viewers, total_inputs, bytes_up, bytes_down, any_live) = {
            let guard = self.instances.read();
            let mut acc = (0u64, 0u64, 0u64, 0u64, false);
            for instance in guard.values().filter(|i| &i.internal_name == internal_name) {
                acc.0 += instance.total_viewers;
                acc.1 += instance.inputs;
                acc.2 += instance.bytes_up;
                acc.3 += instance.bytes_down;
                acc.4 |= instance.status != StreamStatus::Offline;
            }
            acc
        };
        let mut guard = self.streams.write();
        let stream = guard
            .entry(internal_name.clone())
            .or_insert_with(|| Stream::new(internal_name.clone(), tenant_id.clone(), now));
        stream.total_viewers = total_viewers;
        stream.total_inputs = total_inputs;
        stream.bytes_up = bytes_up;
        stream.bytes_down = bytes_down;
        stream.last_update = now;
        if any_live {
            stream.mark_live_if_first_transition(now);
        }
    }

    pub fn get(&self, internal_name: &InternalName) -> Option<Stream> {
        self.streams.read().get(internal_name).cloned()
    }

    pub fn instance(&self, internal_name: &InternalName, node_id: &NodeId) -> Option<StreamInstance> {
        self.instances.read().get(&(internal_name.clone(), node_id.clone())).cloned()
    }

    pub fn instances_for(&self, internal_name: &InternalName) -> Vec<StreamInstance> {
        self.instances
            .read()
            .values()
            .filter(|i| &i.internal_name == internal_name)
            .cloned()
            .collect()
    }

    pub fn snapshot_instances(&self) -> Vec<StreamInstance> {
        self.instances.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> InternalName {
        InternalName::from("abcd-efgh")
    }

    fn tenant() -> TenantId {
        TenantId::new()
    }

    #[test]
    fn started_at_is_set_once_and_never_reset() {
        let store = StreamStore::new();
        let t0 = Utc::now();
        store.update_stream_from_buffer(name(), NodeId::from("n1"), tenant(), BufferState::Full, t0);
        let started_at = store.get(&name()).unwrap().started_at.expect("started_at set on first live transition");

        // §8 invariant 6: a later buffer update never moves started_at.
        let t1 = t0 + chrono::Duration::seconds(90);
        store.update_stream_from_buffer(name(), NodeId::from("n1"), tenant(), BufferState::Recovering, t1);
        assert_eq!(store.get(&name()).unwrap().started_at, Some(started_at));
    }

    #[test]
    fn set_offline_only_offlines_aggregate_when_no_instance_remains() {
        let store = StreamStore::new();
        let t0 = Utc::now();
        store.update_node_stats(name(), NodeId::from("n1"), tenant(), 5, 1, 0, 0, false, t0);
        store.update_node_stats(name(), NodeId::from("n2"), tenant(), 3, 1, 0, 0, false, t0);

        store.set_offline(&name(), &NodeId::from("n1"), t0);
        assert_eq!(store.instance(&name(), &NodeId::from("n1")).unwrap().status, StreamStatus::Offline);

        store.set_offline(&name(), &NodeId::from("n2"), t0);
        assert_eq!(store.get(&name()).unwrap().status, StreamStatus::Offline);
    }

    #[test]
    fn source_presence_excludes_replicated_instances() {
        let store = StreamStore::new();
        let t0 = Utc::now();
        store.update_node_stats(name(), NodeId::from("origin"), tenant(), 0, 1, 0, 0, false, t0);
        store.update_node_stats(name(), NodeId::from("edge"), tenant(), 10, 1, 0, 0, true, t0);

        let origin = store.instance(&name(), &NodeId::from("origin")).unwrap();
        let edge = store.instance(&name(), &NodeId::from("edge")).unwrap();
        assert!(origin.present_as_source());
        assert!(!edge.present_as_source());
        assert!(edge.present_as_viewer_target());
    }

    #[test]
    fn update_user_connection_adjusts_instance_and_aggregate() {
        let store = StreamStore::new();
        let t0 = Utc::now();
        store.update_node_stats(name(), NodeId::from("n1"), tenant(), 5, 1, 0, 0, false, t0);

        store.update_user_connection(&name(), &NodeId::from("n1"), 1, t0);
        assert_eq!(store.instance(&name(), &NodeId::from("n1")).unwrap().total_viewers, 6);
        assert_eq!(store.get(&name()).unwrap().total_viewers, 6);

        store.update_user_connection(&name(), &NodeId::from("n1"), -10, t0);
        assert_eq!(store.instance(&name(), &NodeId::from("n1")).unwrap().total_viewers, 0);
    }
}

fn apply_delta(value: u64, delta: i64) -> u64 {
    if delta.is_negative() {
        value.saturating_sub(delta.unsigned_abs())
    } else {
        value.saturating_add(delta as u64)
    }
}
