//! Replication strategy abstractions.
//!
//! A keyspace's replication strategy determines whether its tables place
//! data with tablets at all, and if so, how the initial tablet map of a new
//! table is laid out. The balancer itself depends only on the tablet-map and
//! topology read contracts; strategies are consulted by the
//! [`TabletAllocator`](crate::allocator::TabletAllocator) on schema changes.

use crate::balancer::LoadSketch;
use crate::error::{Error, Result};
use crate::tablets::{TabletInfo, TabletMap};
use crate::topology::{NodeState, Topology};
use crate::types::{HostId, ShardId, TabletReplica};
use std::collections::BTreeMap;
use tracing::debug;

/// Capability contract for replication strategies.
///
/// Implementations must be thread-safe as they are shared across the
/// allocator and schema layers.
pub trait ReplicationStrategy: Send + Sync {
    /// Whether tables under this strategy are placed with tablets.
    fn uses_tablets(&self) -> bool;

    /// Lay out the initial tablet map for a new table.
    ///
    /// Only called when [`uses_tablets`](Self::uses_tablets) is true.
    fn allocate_tablets_for_new_table(
        &self,
        topology: &Topology,
        tablet_count: usize,
    ) -> Result<TabletMap>;
}

/// Strategy for keyspaces that do not use tablets.
///
/// Exists so callers can hold a `dyn ReplicationStrategy` uniformly; the
/// allocator ignores tables under this strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyStrategy;

impl ReplicationStrategy for LegacyStrategy {
    fn uses_tablets(&self) -> bool {
        false
    }

    fn allocate_tablets_for_new_table(
        &self,
        _topology: &Topology,
        _tablet_count: usize,
    ) -> Result<TabletMap> {
        Err(Error::Allocation(
            "strategy does not use tablets".to_string(),
        ))
    }
}

/// Tablet-aware strategy: each tablet gets `replication_factor` replicas on
/// distinct nodes, spread across racks, on the least-loaded shards.
#[derive(Debug, Clone)]
pub struct TabletAwareStrategy {
    replication_factor: usize,
}

impl TabletAwareStrategy {
    /// Create a strategy with the given replication factor.
    pub fn new(replication_factor: usize) -> Self {
        Self { replication_factor }
    }

    /// The configured replication factor.
    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }
}

impl ReplicationStrategy for TabletAwareStrategy {
    fn uses_tablets(&self) -> bool {
        true
    }

    /// Allocation walks the cluster's normal nodes in rack-interleaved
    /// order and assigns each tablet a rotating window of
    /// `replication_factor` nodes, so consecutive tablets land on different
    /// node sets and every replica set spans as many racks as possible.
    /// Destination shards come from a fresh [`LoadSketch`] so new tablets
    /// land on the least-loaded shards.
    fn allocate_tablets_for_new_table(
        &self,
        topology: &Topology,
        tablet_count: usize,
    ) -> Result<TabletMap> {
        // Group normal nodes by rack; sort racks and nodes for determinism.
        let mut by_rack: BTreeMap<&str, Vec<_>> = BTreeMap::new();
        for node in topology.nodes() {
            if node.state == NodeState::Normal {
                by_rack.entry(node.rack.as_str()).or_default().push(node.host);
            }
        }
        for hosts in by_rack.values_mut() {
            hosts.sort_unstable();
        }

        // Interleave racks so any window of consecutive entries spans the
        // maximum number of distinct racks.
        let mut ordered = Vec::new();
        let mut cursors: Vec<_> = by_rack.values().map(|hosts| hosts.iter()).collect();
        loop {
            let mut emitted = false;
            for cursor in cursors.iter_mut() {
                if let Some(host) = cursor.next() {
                    ordered.push(*host);
                    emitted = true;
                }
            }
            if !emitted {
                break;
            }
        }

        if self.replication_factor == 0 {
            return Err(Error::Allocation("replication factor must be positive".to_string()));
        }
        if ordered.len() < self.replication_factor {
            return Err(Error::Allocation(format!(
                "replication factor {} exceeds candidate node count {}",
                self.replication_factor,
                ordered.len()
            )));
        }

        let mut sketch = LoadSketch::new();

        let mut tablets = Vec::with_capacity(tablet_count);
        for tablet in 0..tablet_count {
            let mut replicas = Vec::with_capacity(self.replication_factor);
            for offset in 0..self.replication_factor {
                let host = ordered[(tablet + offset) % ordered.len()];
                let shard = next_shard_for(&mut sketch, topology, host)?;
                replicas.push(TabletReplica::new(host, shard));
            }
            tablets.push(TabletInfo::new(replicas));
        }

        debug!(
            tablet_count,
            replication_factor = self.replication_factor,
            nodes = ordered.len(),
            "allocated tablet map for new table"
        );
        Ok(TabletMap::from_tablets(tablets))
    }
}

/// Pick the least-loaded shard of `host`, seeding the sketch with zero
/// counts on first use. New tables start empty, so only placements made
/// during this allocation contribute to shard load.
fn next_shard_for(sketch: &mut LoadSketch, topology: &Topology, host: HostId) -> Result<ShardId> {
    if let Ok(shard) = sketch.next_shard(host) {
        return Ok(shard);
    }
    let node = topology
        .find_node(host)
        .ok_or(crate::error::TopologyError::NodeNotFound(host))?;
    sketch.seed_empty(host, node.shard_count);
    sketch.next_shard(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Node;
    use std::collections::HashSet;

    fn three_rack_topology() -> Topology {
        Topology::new(vec![
            Node::new(1, "dc1", "r1", 2),
            Node::new(2, "dc1", "r1", 2),
            Node::new(3, "dc1", "r2", 2),
            Node::new(4, "dc1", "r2", 2),
            Node::new(5, "dc1", "r3", 2),
            Node::new(6, "dc1", "r3", 2),
        ])
    }

    #[test]
    fn test_capability_check() {
        assert!(!LegacyStrategy.uses_tablets());
        assert!(TabletAwareStrategy::new(3).uses_tablets());
    }

    #[test]
    fn test_legacy_strategy_refuses_allocation() {
        let topology = three_rack_topology();
        assert!(LegacyStrategy
            .allocate_tablets_for_new_table(&topology, 4)
            .is_err());
    }

    #[test]
    fn test_replicas_on_distinct_nodes_and_racks() {
        let topology = three_rack_topology();
        let map = TabletAwareStrategy::new(3)
            .allocate_tablets_for_new_table(&topology, 8)
            .unwrap();

        assert_eq!(map.tablet_count(), 8);
        for (_, info) in map.tablets() {
            assert_eq!(info.replication_factor(), 3);

            let hosts: HashSet<_> = info.replicas.iter().map(|r| r.host).collect();
            assert_eq!(hosts.len(), 3, "replicas must land on distinct nodes");

            let racks: HashSet<_> = info
                .replicas
                .iter()
                .map(|r| topology.find_node(r.host).unwrap().rack.clone())
                .collect();
            assert_eq!(racks.len(), 3, "replicas must span all racks");
        }
    }

    #[test]
    fn test_rf_larger_than_cluster_is_an_error() {
        let topology = Topology::new(vec![Node::new(1, "dc1", "r1", 2)]);
        let err = TabletAwareStrategy::new(3)
            .allocate_tablets_for_new_table(&topology, 1)
            .unwrap_err();
        assert!(matches!(err, Error::Allocation(_)));
    }

    #[test]
    fn test_allocation_spreads_shards() {
        let topology = Topology::new(vec![
            Node::new(1, "dc1", "r1", 4),
            Node::new(2, "dc1", "r2", 4),
        ]);
        let map = TabletAwareStrategy::new(1)
            .allocate_tablets_for_new_table(&topology, 8)
            .unwrap();

        // 8 single-replica tablets over 2 nodes with 4 shards each: every
        // shard receives exactly one tablet.
        let mut per_shard: HashSet<TabletReplica> = HashSet::new();
        for (_, info) in map.tablets() {
            per_shard.insert(info.replicas[0]);
        }
        assert_eq!(per_shard.len(), 8);
    }
}
