//! Tablet load balancer.
//!
//! The balancer equalizes tablet count per shard across the cluster, on the
//! assumption that shards have similar processing power and tablets consume
//! similar resources. It produces a [`MigrationPlan`]: a small incremental
//! batch of relocation instructions, not a complete schedule. To reach
//! balance the balancer is invoked iteratively until it returns an empty
//! plan.
//!
//! Load is tracked at two levels, per node and per shard. Nodes are
//! equalized first by moving tablets across nodes, away from the most
//! loaded node; per-shard tracking then ensures tablets leave the most
//! loaded shard of a given node first. The node metric is average per-shard
//! load (tablet count / shard count): once nodes are equal on that metric,
//! rebalancing nodes internally would yield global per-shard balance.
//! Focusing on nodes before shards results in fewer tablet movements than
//! looking at shards alone.
//!
//! Outline of one per-datacenter round:
//!
//! 1. Determine the set of nodes whose load should be balanced.
//! 2. Pick the least-loaded node (the target).
//! 3. Keep moving tablets to the target until balance is achieved with the
//!    highest-loaded node, or the plan reaches its size cap:
//!    1. pick the most-loaded node (the source),
//!    2. pick the most-loaded shard on the source,
//!    3. pick one candidate tablet on that shard,
//!    4. if replica collocation constraints pass, pick the least-loaded
//!       shard on the target and emit a migration.
//!
//! Even though a round focuses on a single target, plans are increments:
//! several under-loaded nodes are driven toward balance concurrently
//! because successive rounds alternate between them.
//!
//! Each call is a pure function of (topology, tablet map) → plan. All
//! derived load structures are rebuilt per call and discarded; the balancer
//! holds no state across calls.

mod events;
mod load;
mod plan;
mod sketch;

pub use events::{BalanceEvent, BalanceObserver, SkipReason, TracingObserver};
pub use plan::{MigrationPlan, TabletMigration};
pub use sketch::LoadSketch;

#[cfg(test)]
pub(crate) use events::recording::RecordingObserver;

use crate::config::BalancerConfig;
use crate::error::{Error, Result, TopologyError};
use crate::tablets::TabletMetadata;
use crate::topology::Topology;
use crate::types::{GlobalTabletId, HostId, TabletReplica};
use load::{NodeByLoad, NodeLoad};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

/// Computes incremental migration plans from cluster snapshots.
///
/// The balancer borrows read-only topology and tablet-map snapshots for the
/// duration of one planning session. Applying the plan is strictly external:
/// the execution scheduler streams the data, updates the metadata store, and
/// the next round observes the result through fresh snapshots.
pub struct LoadBalancer<'a> {
    topology: &'a Topology,
    tablets: &'a TabletMetadata,
    config: BalancerConfig,
    observer: Arc<dyn BalanceObserver>,
}

impl<'a> LoadBalancer<'a> {
    /// Create a balancer over the given snapshots.
    pub fn new(topology: &'a Topology, tablets: &'a TabletMetadata, config: BalancerConfig) -> Self {
        Self {
            topology,
            tablets,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the observer for this planning session.
    pub fn with_observer(mut self, observer: Arc<dyn BalanceObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Compute a migration plan across all datacenters.
    ///
    /// Datacenters are balanced independently; no cross-DC migration is ever
    /// produced. Sub-plans are concatenated so the execution layer can run
    /// them in parallel.
    pub async fn make_plan(&self) -> Result<MigrationPlan> {
        let mut plan = MigrationPlan::new();

        for dc in self.topology.datacenters() {
            let dc_plan = self.make_plan_for_dc(dc).await?;
            self.observer.on_event(&BalanceEvent::DatacenterPlanned {
                dc: dc.clone(),
                migrations: dc_plan.len(),
            });
            plan.merge(dc_plan);
        }

        self.observer.on_event(&BalanceEvent::PlanReady {
            migrations: plan.len(),
        });
        Ok(plan)
    }

    /// Compute a migration plan for one datacenter.
    pub async fn make_plan_for_dc(&self, dc: &str) -> Result<MigrationPlan> {
        self.observer
            .on_event(&BalanceEvent::DatacenterExamined { dc: dc.to_string() });

        // Select the subset of nodes to balance.
        let mut nodes: HashMap<HostId, NodeLoad> = HashMap::new();
        for node in self.topology.nodes_in_dc(dc) {
            if node.state == crate::topology::NodeState::Normal {
                if node.shard_count == 0 {
                    return Err(TopologyError::NoShards(node.host).into());
                }
                nodes.insert(node.host, NodeLoad::new(node.host, node.shard_count));
            }
        }
        if nodes.is_empty() {
            return Ok(MigrationPlan::new());
        }

        // Compute tablet load on nodes, validating replica shard ranges.
        for (table, map) in self.tablets.all_tables() {
            let table = *table;
            map.for_each_tablet(self.config.yield_chunk, |tid, info| {
                for replica in &info.replicas {
                    if let Some(load) = nodes.get_mut(&replica.host) {
                        load.tablet_count += 1;
                        if replica.shard >= load.shard_count {
                            return Err(TopologyError::ReplicaShardOutOfRange {
                                tablet: GlobalTabletId::new(table, tid),
                                replica: *replica,
                                shard_count: load.shard_count,
                            }
                            .into());
                        }
                    }
                }
                Ok(())
            })
            .await?;
        }

        // Compute load imbalance.
        let mut max_load = 0.0f64;
        let mut min_load = 0.0f64;
        let mut min_load_node = None;
        for (host, load) in nodes.iter_mut() {
            load.update();
            if min_load_node.is_none() || load.avg_load < min_load {
                min_load = load.avg_load;
                min_load_node = Some(*host);
            }
            if load.avg_load > max_load {
                max_load = load.avg_load;
            }
        }
        let target = match min_load_node {
            Some(host) => host,
            None => return Ok(MigrationPlan::new()),
        };
        if max_load == min_load {
            // Balanced at node granularity.
            // TODO: rebalance shards within nodes once node loads are equal.
            return Ok(MigrationPlan::new());
        }

        if self.config.log_node_loads {
            for load in nodes.values() {
                let rack = self
                    .topology
                    .find_node(load.host)
                    .map(|n| n.rack.clone())
                    .unwrap_or_default();
                self.observer.on_event(&BalanceEvent::NodeLoad {
                    host: load.host,
                    rack,
                    avg_load: load.avg_load,
                    tablets: load.tablet_count,
                    shards: load.shard_count,
                });
            }
        }
        self.observer.on_event(&BalanceEvent::TargetSelected {
            host: target,
            avg_load: min_load,
            max_load,
        });

        let target_node = self
            .topology
            .find_node(target)
            .ok_or(TopologyError::NodeNotFound(target))?;
        let target_rack = target_node.rack.as_str();

        // The target is saturated with one migration per destination shard,
        // so migrations can run in parallel without over-committing any
        // single shard. This assumes the target is internally balanced and
        // that migrations complete at similar times; neither holds in
        // general, which is currently ignored.
        let batch_size = target_node.shard_count as usize;

        // Compute per-shard load and candidate tablets. A table with active
        // transitions skips the whole datacenter round: re-planning could
        // race with the half-applied transitions.
        for (table, map) in self.tablets.all_tables() {
            if map.has_transitions() {
                self.observer
                    .on_event(&BalanceEvent::TransitionsPending { dc: dc.to_string() });
                return Ok(MigrationPlan::new());
            }
            let table = *table;
            map.for_each_tablet(self.config.yield_chunk, |tid, info| {
                for replica in &info.replicas {
                    if let Some(load) = nodes.get_mut(&replica.host) {
                        let shard = &mut load.shards[replica.shard as usize];
                        shard.tablet_count += 1;
                        shard.candidates.insert(GlobalTabletId::new(table, tid));
                    }
                }
                Ok(())
            })
            .await?;
        }

        // Prepare candidate nodes and shards for heap-based balancing. The
        // target is pulled out of the candidate pool; its load is tracked
        // separately while it fills.
        let mut target_info = nodes
            .remove(&target)
            .ok_or_else(|| Error::Internal("target node missing from candidate set".into()))?;
        for load in nodes.values_mut() {
            load.build_shard_heap();
        }
        let mut nodes_by_load: BinaryHeap<NodeByLoad> = nodes
            .values()
            .map(|n| NodeByLoad::new(n.avg_load, n.host))
            .collect();

        let mut target_sketch = LoadSketch::new();
        target_sketch
            .populate(self.topology, self.tablets, target)
            .await?;

        let mut plan = MigrationPlan::new();
        // Highest average load among nodes already removed from the
        // candidate heap. Candidates leave the heap in descending load
        // order and load inversion against the target is prevented below,
        // so at any time: target load <= any candidate load <= any
        // off-candidate load. When the maximum off-candidate load equals
        // the target's, every node has equal load.
        let mut max_off_candidate_load = 0.0f64;

        while plan.len() < batch_size && !nodes_by_load.is_empty() {
            tokio::task::yield_now().await;

            let src_entry = match nodes_by_load.pop() {
                Some(entry) => entry,
                None => break,
            };
            let src_host = src_entry.host;
            let src_node = nodes
                .get_mut(&src_host)
                .ok_or_else(|| Error::Internal("candidate node missing from load map".into()))?;

            // The maximum is taken with the current candidate to cover the
            // case of an empty off-candidate set.
            if max_off_candidate_load.max(src_node.avg_load) == target_info.avg_load {
                self.observer
                    .on_event(&BalanceEvent::BalanceAchieved { dc: dc.to_string() });
                break;
            }

            // Candidates below the target's load cannot contribute; since
            // they pop in descending order, none further can either.
            if src_node.avg_load <= target_info.avg_load {
                self.observer.on_event(&BalanceEvent::NoMoreCandidates {
                    next: src_host,
                    next_avg_load: src_node.avg_load,
                    target_avg_load: target_info.avg_load,
                });
                break;
            }

            // Prevent load inversion, which can oscillate across rounds.
            if src_node.avg_load_with(src_node.tablet_count - 1)
                < target_info.avg_load_with(target_info.tablet_count + 1)
            {
                self.observer.on_event(&BalanceEvent::LoadInversion {
                    next: src_host,
                    next_avg_load: src_node.avg_load,
                    target_avg_load: target_info.avg_load,
                });
                break;
            }

            if src_node.shard_heap.is_empty() {
                // Out of candidate shards: fold into the off-candidate
                // watermark and drop the node from the heap.
                self.observer.on_event(&BalanceEvent::NodeExhausted {
                    host: src_host,
                    tablets_remaining: src_node.tablet_count,
                });
                max_off_candidate_load = max_off_candidate_load.max(src_node.avg_load);
                continue;
            }

            let shard_entry = match src_node.shard_heap.pop() {
                Some(entry) => entry,
                None => continue,
            };
            let src_shard = shard_entry.shard;
            let src = TabletReplica::new(src_host, src_shard);

            if src_node.shards[src_shard as usize].candidates.is_empty() {
                // Shard exhausted: drop it from the shard heap, keep the
                // node in play without consuming a plan slot.
                self.observer.on_event(&BalanceEvent::ShardExhausted {
                    replica: src,
                    tablets_remaining: src_node.shards[src_shard as usize].tablet_count,
                });
                nodes_by_load.push(src_entry);
                continue;
            }

            // Take one candidate; selection among ties is arbitrary. The
            // tablet is consumed for this round whether or not the move
            // passes its constraint checks.
            let tablet = match src_node.shards[src_shard as usize].candidates.iter().next() {
                Some(&tablet) => tablet,
                None => continue,
            };
            src_node.shards[src_shard as usize].candidates.remove(&tablet);

            // Replica collocation constraints.
            let src_rack = self
                .topology
                .find_node(src_host)
                .map(|n| n.rack.as_str())
                .ok_or(TopologyError::NodeNotFound(src_host))?;
            let same_rack = target_rack == src_rack;

            let info = self
                .tablets
                .get_map(&tablet.table)
                .and_then(|m| m.get(tablet.tablet))
                .ok_or_else(|| Error::Internal(format!("tablet {tablet} missing from metadata")))?;

            let mut has_replica_on_target = false;
            let mut rack_load: HashMap<&str, usize> = HashMap::new();
            for replica in &info.replicas {
                if replica.host == target {
                    has_replica_on_target = true;
                    break;
                }
                if !same_rack {
                    if let Some(node) = self.topology.find_node(replica.host) {
                        if node.datacenter == dc {
                            *rack_load.entry(node.rack.as_str()).or_insert(0) += 1;
                        }
                    }
                }
            }

            if has_replica_on_target {
                self.observer.on_event(&BalanceEvent::CandidateSkipped {
                    tablet,
                    reason: SkipReason::ReplicaOnTarget,
                });
                src_node.shard_heap.push(shard_entry);
                nodes_by_load.push(src_entry);
                continue;
            }

            // Never increase the level of rack duplication in the replica
            // set. Same-rack moves keep rack counts unchanged and skip the
            // check.
            if !same_rack {
                let max_rack_load = rack_load.values().copied().max().unwrap_or(0);
                let new_rack_load = rack_load.get(target_rack).copied().unwrap_or(0) + 1;
                if new_rack_load > max_rack_load {
                    self.observer.on_event(&BalanceEvent::CandidateSkipped {
                        tablet,
                        reason: SkipReason::RackImbalance {
                            rack: target_rack.to_string(),
                            new_rack_load,
                            max_rack_load,
                        },
                    });
                    src_node.shard_heap.push(shard_entry);
                    nodes_by_load.push(src_entry);
                    continue;
                }
            }

            let dst = TabletReplica::new(target, target_sketch.next_shard(target)?);
            self.observer.on_event(&BalanceEvent::MigrationPlanned {
                tablet,
                src,
                dst,
            });
            plan.push(TabletMigration { tablet, src, dst });

            target_info.tablet_count += 1;
            target_info.update();

            let remaining = {
                let shard_load = &mut src_node.shards[src_shard as usize];
                shard_load.tablet_count -= 1;
                shard_load.tablet_count
            };
            if remaining > 0 {
                src_node.shard_heap.push(load::ShardByLoad {
                    tablet_count: remaining,
                    shard: src_shard,
                });
            }

            src_node.tablet_count -= 1;
            src_node.update();
            if src_node.tablet_count > 0 {
                nodes_by_load.push(NodeByLoad::new(src_node.avg_load, src_host));
            }
        }

        if plan.is_empty() {
            // Replica collocation can make even balance unreachable. With
            // heterogeneous shard counts, nodes with more shards replicate
            // more tablets, which rules out candidates on nodes with a
            // higher per-shard load: three nodes with 1, 1 and 7 shards
            // holding 7 tablets at RF=3 must each hold one replica per
            // tablet, leaving nothing movable.
            self.observer
                .on_event(&BalanceEvent::BalanceUnreachable { dc: dc.to_string() });
        }

        Ok(plan)
    }
}

/// Compute one balancing round over the given snapshots with defaults.
pub async fn balance_tablets(
    topology: &Topology,
    tablets: &TabletMetadata,
) -> Result<MigrationPlan> {
    LoadBalancer::new(topology, tablets, BalancerConfig::default())
        .make_plan()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tablets::{TabletInfo, TabletMap};
    use crate::topology::Node;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_zero_shard_node_is_fatal() {
        let topology = Topology::new(vec![
            Node::new(1, "dc1", "r1", 0),
            Node::new(2, "dc1", "r1", 4),
        ]);
        let tablets = TabletMetadata::new();

        let err = balance_tablets(&topology, &tablets).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Topology(TopologyError::NoShards(1))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_replica_shard_is_fatal() {
        let topology = Topology::new(vec![
            Node::new(1, "dc1", "r1", 2),
            Node::new(2, "dc1", "r1", 2),
        ]);
        let mut tablets = TabletMetadata::new();
        tablets.set_map(
            Uuid::new_v4(),
            TabletMap::from_tablets(vec![TabletInfo::new(vec![TabletReplica::new(1, 5)])]),
        );

        let err = balance_tablets(&topology, &tablets).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Topology(TopologyError::ReplicaShardOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_normal_nodes_are_not_candidates() {
        use crate::topology::NodeState;

        // The only normal node in the DC sees no imbalance against itself.
        let topology = Topology::new(vec![
            Node::new(1, "dc1", "r1", 2),
            Node::new(2, "dc1", "r1", 2).with_state(NodeState::Joining),
        ]);
        let mut tablets = TabletMetadata::new();
        tablets.set_map(
            Uuid::new_v4(),
            TabletMap::from_tablets(vec![
                TabletInfo::new(vec![TabletReplica::new(1, 0)]),
                TabletInfo::new(vec![TabletReplica::new(1, 1)]),
            ]),
        );

        let plan = balance_tablets(&topology, &tablets).await.unwrap();
        assert!(plan.is_empty());
    }
}
