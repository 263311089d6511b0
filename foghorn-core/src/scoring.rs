//! The weighted scoring kernel (C1): a pure function from a node snapshot
//! and a request's context to a composite `u64` score. No I/O, no
//! mutation — every input the kernel needs is passed in by the caller.

use std::collections::HashMap;

use foghorn_model::geo::GeoPoint;
use foghorn_model::node::Node;
use foghorn_model::weights::Weights;

/// Per-node inputs the balancer has already computed before calling into
/// the kernel (activity and over-bandwidth are decided by the caller, since
/// both require a wall-clock `now` the kernel itself never reads).
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub request_geo: Option<GeoPoint>,
    pub tag_adjust: &'a HashMap<String, i64>,
    pub stream_present: bool,
    pub node_active: bool,
}

/// `score(node, ctx, weights) -> u64`. §4.1.
///
/// Returns 0 when the node is unusable: inactive, or its capacity fields
/// make it mathematically full (`ram_max == 0`, `bw_limit == 0`, or
/// committed bandwidth already at or past `bw_limit`). Capability
/// filtering and same-host exclusion happen upstream in the balancer
/// (§4.3 step 2) — by the time a node reaches this function it has
/// already survived those checks.
pub fn score(node: &Node, ctx: &ScoringContext<'_>, weights: &Weights) -> u64 {
    if !ctx.node_active {
        return 0;
    }
    if node.capacity.ram_max == 0 || node.capacity.bw_limit == 0 {
        return 0;
    }

    let committed_bandwidth = node.metrics.up_speed.saturating_add(node.add_bandwidth);
    if committed_bandwidth >= node.capacity.bw_limit {
        return 0;
    }

    let cpu_tenths = node.metrics.cpu_tenths();
    let cpu_score = sub_weighted(weights.cpu, cpu_tenths, 1000);
    let ram_score = sub_weighted(weights.ram, node.metrics.ram_current, node.capacity.ram_max);
    let bw_score = sub_weighted(weights.bw, committed_bandwidth, node.capacity.bw_limit);

    let geo_score = match (ctx.request_geo, node.geo) {
        (Some(req), Some(node_geo)) => {
            let distance_km = req.great_circle_km(&node_geo);
            let penalty =
                (weights.geo as f64 * distance_km / foghorn_model::geo::MAX_EARTH_DISTANCE_KM)
                    .floor() as u64;
            weights.geo.saturating_sub(penalty)
        }
        // §4.1: the geo sub-score is omitted (not penalized) when either
        // side lacks a valid coordinate.
        _ => 0,
    };

    let stream_bonus = if ctx.stream_present {
        weights.stream_bonus
    } else {
        0
    };

    let tag_adjustment: i64 = node
        .capabilities
        .all_tags()
        .filter_map(|tag| ctx.tag_adjust.get(tag))
        .sum();

    let base = cpu_score
        .saturating_add(ram_score)
        .saturating_add(bw_score)
        .saturating_add(geo_score)
        .saturating_add(stream_bonus);

    if tag_adjustment.is_negative() {
        base.saturating_sub(tag_adjustment.unsigned_abs())
    } else {
        base.saturating_add(tag_adjustment as u64)
    }
}

/// `weight - (load * weight) / capacity`, saturating at 0. Keeps scores
/// monotone and bounded: a node at 0 load scores the full weight, a node
/// at or past capacity scores 0 rather than wrapping negative.
fn sub_weighted(weight: u64, load: u64, capacity: u64) -> u64 {
    let penalty = (load as u128 * weight as u128) / capacity as u128;
    weight.saturating_sub(penalty as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use foghorn_model::ids::NodeId;
    use foghorn_model::node::{NodeCapacity, NodeMetrics};

    use super::*;

    fn node_with(ram_max: u64, bw_limit: u64, cpu_percent: f64, ram_current: u64, up_speed: u64) -> Node {
        let now = chrono::Utc::now();
        let mut node = Node::new(NodeId::from("node-a"), "https://node-a".into(), now);
        node.capacity = NodeCapacity {
            ram_max,
            bw_limit,
            storage_capacity_bytes: 0,
            max_transcodes: 0,
        };
        node.metrics = NodeMetrics {
            cpu_percent,
            ram_current,
            up_speed,
            ..Default::default()
        };
        node
    }

    fn ctx(tag_adjust: &HashMap<String, i64>) -> ScoringContext<'_> {
        ScoringContext {
            request_geo: None,
            tag_adjust,
            stream_present: false,
            node_active: true,
        }
    }

    #[test]
    fn inactive_node_scores_zero() {
        let node = node_with(1000, 1000, 0.0, 0, 0);
        let tags = HashMap::new();
        let mut c = ctx(&tags);
        c.node_active = false;
        assert_eq!(score(&node, &c, &Weights::default()), 0);
    }

    #[test]
    fn zero_ram_max_or_bw_limit_scores_zero() {
        let tags = HashMap::new();
        let c = ctx(&tags);
        let node = node_with(0, 1000, 0.0, 0, 0);
        assert_eq!(score(&node, &c, &Weights::default()), 0);
        let node = node_with(1000, 0, 0.0, 0, 0);
        assert_eq!(score(&node, &c, &Weights::default()), 0);
    }

    #[test]
    fn over_bandwidth_scores_zero() {
        let tags = HashMap::new();
        let c = ctx(&tags);
        let node = node_with(1000, 1000, 0.0, 0, 1000);
        assert_eq!(score(&node, &c, &Weights::default()), 0);
    }

    #[test]
    fn raising_cpu_monotonically_decreases_score() {
        let tags = HashMap::new();
        let c = ctx(&tags);
        let weights = Weights::default();
        let low = node_with(1000, 1000, 10.0, 100, 100);
        let high = node_with(1000, 1000, 50.0, 100, 100);
        assert!(score(&low, &c, &weights) > score(&high, &c, &weights));
    }

    #[test]
    fn raising_ram_monotonically_decreases_score() {
        let tags = HashMap::new();
        let c = ctx(&tags);
        let weights = Weights::default();
        let low = node_with(1000, 1000, 10.0, 100, 100);
        let high = node_with(1000, 1000, 10.0, 800, 100);
        assert!(score(&low, &c, &weights) > score(&high, &c, &weights));
    }

    #[test]
    fn stream_bonus_added_when_present() {
        let tags = HashMap::new();
        let mut c = ctx(&tags);
        let weights = Weights::default();
        let node = node_with(1000, 1000, 10.0, 100, 100);
        let without = score(&node, &c, &weights);
        c.stream_present = true;
        let with = score(&node, &c, &weights);
        assert_eq!(with - without, weights.stream_bonus);
    }

    #[test]
    fn tag_adjustment_applied_for_advertised_tags_only() {
        let mut tags = HashMap::new();
        tags.insert("edge".to_string(), 25i64);
        tags.insert("storage".to_string(), -10i64);
        let c = ctx(&tags);
        let weights = Weights::default();

        let mut node = node_with(1000, 1000, 10.0, 100, 100);
        let baseline = score(&node, &c, &weights);

        node.capabilities.edge = true;
        let with_edge = score(&node, &c, &weights);
        assert_eq!(with_edge, baseline + 25);
    }

    #[test]
    fn missing_geo_on_either_side_omits_geo_term_without_penalty() {
        let tags = HashMap::new();
        let weights = Weights::default();
        let mut node = node_with(1000, 1000, 10.0, 100, 100);
        node.geo = None;

        let mut c = ctx(&tags);
        c.request_geo = GeoPoint::new(52.0, 4.5).ok();
        let missing_node_geo = score(&node, &c, &weights);

        node.geo = GeoPoint::new(52.37, 4.90).ok();
        c.request_geo = None;
        let missing_req_geo = score(&node, &c, &weights);

        assert_eq!(missing_node_geo, missing_req_geo);
    }
}
