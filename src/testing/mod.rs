//! Testing utilities for the tablet balancer.
//!
//! This module provides fixtures shared by the end-to-end suites:
//! - A cluster fixture builder for assembling topology and tablet metadata
//! - A plan applier simulating the external execution scheduler
//! - Convergence helpers driving repeated planning rounds
//!
//! The balancer never applies its own plans; [`apply_plan`] stands in for
//! the execution layer by mutating the in-memory tablet metadata the way a
//! completed migration would, so tests can observe multi-round behavior.

mod strategy_tests;

use crate::balancer::{balance_tablets, MigrationPlan};
use crate::error::{Error, Result};
use crate::tablets::{TabletInfo, TabletMap, TabletMetadata, TabletTransition};
use crate::topology::{Node, NodeState, Topology};
use crate::types::{HostId, ShardId, TabletId, TableId, TabletReplica};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Builder for topology and tablet metadata fixtures.
#[derive(Debug, Default)]
pub struct ClusterFixture {
    nodes: Vec<Node>,
    metadata: TabletMetadata,
}

impl ClusterFixture {
    /// Create an empty fixture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a normal-state node.
    pub fn node(mut self, host: HostId, dc: &str, rack: &str, shard_count: u32) -> Self {
        self.nodes.push(Node::new(host, dc, rack, shard_count));
        self
    }

    /// Add a node in a specific lifecycle state.
    pub fn node_with_state(
        mut self,
        host: HostId,
        dc: &str,
        rack: &str,
        shard_count: u32,
        state: NodeState,
    ) -> Self {
        self.nodes
            .push(Node::new(host, dc, rack, shard_count).with_state(state));
        self
    }

    /// Install a table with pre-built tablets.
    pub fn table(mut self, table: TableId, tablets: Vec<TabletInfo>) -> Self {
        self.metadata.set_map(table, TabletMap::from_tablets(tablets));
        self
    }

    /// Install a table of single-replica tablets, `per_shard` tablets on
    /// every shard of every listed host.
    pub fn uniform_table(
        mut self,
        table: TableId,
        hosts: &[(HostId, u32)],
        per_shard: usize,
    ) -> Self {
        let mut tablets = Vec::new();
        for &(host, shard_count) in hosts {
            for shard in 0..shard_count {
                for _ in 0..per_shard {
                    tablets.push(TabletInfo::new(vec![TabletReplica::new(host, shard)]));
                }
            }
        }
        self.metadata.set_map(table, TabletMap::from_tablets(tablets));
        self
    }

    /// Install a table of `count` single-replica tablets placed randomly
    /// across the listed hosts' shards, reproducible from `seed`.
    pub fn random_table(
        mut self,
        table: TableId,
        hosts: &[(HostId, u32)],
        count: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let tablets = (0..count)
            .map(|_| {
                let (host, shard_count) = hosts[rng.gen_range(0..hosts.len())];
                let shard: ShardId = rng.gen_range(0..shard_count);
                TabletInfo::new(vec![TabletReplica::new(host, shard)])
            })
            .collect();
        self.metadata.set_map(table, TabletMap::from_tablets(tablets));
        self
    }

    /// Mark one tablet as having a pending transition.
    pub fn transition(
        mut self,
        table: TableId,
        tablet: TabletId,
        transition: TabletTransition,
    ) -> Self {
        if let Some(map) = self.metadata.get_map_mut(&table) {
            map.set_transition(tablet, transition);
        }
        self
    }

    /// Finish the fixture.
    pub fn build(self) -> (Topology, TabletMetadata) {
        (Topology::new(self.nodes), self.metadata)
    }
}

/// Apply a plan to in-memory metadata the way the execution scheduler
/// would, returning how many migrations were applied.
pub fn apply_plan(metadata: &mut TabletMetadata, plan: &MigrationPlan) -> usize {
    let mut applied = 0;
    for migration in plan.iter() {
        if let Some(map) = metadata.get_map_mut(&migration.tablet.table) {
            if map.move_replica(migration.tablet.tablet, migration.src, migration.dst) {
                applied += 1;
            }
        }
    }
    applied
}

/// Run planning rounds, applying each plan, until a round yields an empty
/// plan. Returns the number of non-empty rounds; errors if convergence is
/// not reached within `max_rounds`.
pub async fn run_until_converged(
    topology: &Topology,
    metadata: &mut TabletMetadata,
    max_rounds: usize,
) -> Result<usize> {
    for round in 0..max_rounds {
        let plan = balance_tablets(topology, metadata).await?;
        if plan.is_empty() {
            return Ok(round);
        }
        apply_plan(metadata, &plan);
    }
    Err(Error::Internal(format!(
        "no convergence within {max_rounds} rounds"
    )))
}

/// Total tablet replicas per node.
pub fn tablets_per_node(metadata: &TabletMetadata) -> BTreeMap<HostId, u64> {
    let mut counts = BTreeMap::new();
    for (_, map) in metadata.all_tables() {
        for (_, info) in map.tablets() {
            for replica in &info.replicas {
                *counts.entry(replica.host).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Initialize test logging once; respects `RUST_LOG`.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Maximum per-rack replica count of one tablet within a datacenter.
pub fn max_rack_load(topology: &Topology, info: &TabletInfo, dc: &str) -> usize {
    let mut per_rack: BTreeMap<&str, usize> = BTreeMap::new();
    for replica in &info.replicas {
        if let Some(node) = topology.find_node(replica.host) {
            if node.datacenter == dc {
                *per_rack.entry(node.rack.as_str()).or_insert(0) += 1;
            }
        }
    }
    per_rack.values().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_fixture_builds_topology_and_metadata() {
        let (topology, metadata) = ClusterFixture::new()
            .node(1, "dc1", "r1", 2)
            .node(2, "dc1", "r1", 2)
            .uniform_table(Uuid::new_v4(), &[(1, 2)], 3)
            .build();

        assert_eq!(topology.node_count(), 2);
        assert_eq!(tablets_per_node(&metadata).get(&1), Some(&6));
    }

    #[test]
    fn test_apply_plan_moves_replicas() {
        let table = Uuid::new_v4();
        let (_, mut metadata) = ClusterFixture::new()
            .node(1, "dc1", "r1", 1)
            .node(2, "dc1", "r1", 1)
            .uniform_table(table, &[(1, 1)], 1)
            .build();

        let mut plan = MigrationPlan::new();
        plan.push(crate::balancer::TabletMigration {
            tablet: crate::types::GlobalTabletId::new(table, 0),
            src: TabletReplica::new(1, 0),
            dst: TabletReplica::new(2, 0),
        });

        assert_eq!(apply_plan(&mut metadata, &plan), 1);
        assert_eq!(tablets_per_node(&metadata).get(&2), Some(&1));
    }

    #[test]
    fn test_random_table_is_reproducible() {
        let table = Uuid::new_v4();
        let build = || {
            ClusterFixture::new()
                .node(1, "dc1", "r1", 2)
                .node(2, "dc1", "r1", 2)
                .random_table(table, &[(1, 2), (2, 2)], 16, 42)
                .build()
                .1
        };
        assert_eq!(tablets_per_node(&build()), tablets_per_node(&build()));
    }
}
