//! Allocation E2E Test Suite
//!
//! End-to-end tests covering the allocator and replication strategy
//! working against the balancer: freshly allocated tables should need no
//! immediate rebalancing, and allocated maps must satisfy the same
//! collocation invariants the balancer enforces.
//!
//! # Test Cases
//!
//! | Test ID     | Scenario                        | Verification                     |
//! |-------------|---------------------------------|----------------------------------|
//! | TC_ALLOC_01 | New table on fresh cluster      | Balancer returns an empty plan   |
//! | TC_ALLOC_02 | New table, RF=3 over racks      | Distinct nodes per replica set   |
//! | TC_ALLOC_03 | Allocate then skew then balance | Converges back to an empty plan  |

#[cfg(test)]
mod tests {
    use crate::allocator::TabletAllocator;
    use crate::balancer::balance_tablets;
    use crate::strategy::TabletAwareStrategy;
    use crate::testing::{run_until_converged, tablets_per_node, ClusterFixture};
    use crate::types::TabletReplica;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_fresh_allocation_needs_no_rebalancing() {
        let (topology, _) = ClusterFixture::new()
            .node(1, "dc1", "r1", 2)
            .node(2, "dc1", "r2", 2)
            .node(3, "dc1", "r3", 2)
            .build();

        let allocator = TabletAllocator::default();
        allocator
            .on_table_created(Uuid::new_v4(), &TabletAwareStrategy::new(1), &topology, 12)
            .unwrap();

        let metadata = allocator.snapshot();
        let counts = tablets_per_node(&metadata);
        assert_eq!(counts.values().sum::<u64>(), 12);

        let plan = balance_tablets(&topology, &metadata).await.unwrap();
        assert!(plan.is_empty(), "fresh allocation left imbalance: {counts:?}");
        allocator.stop();
    }

    #[tokio::test]
    async fn test_allocated_replica_sets_use_distinct_nodes() {
        let (topology, _) = ClusterFixture::new()
            .node(1, "dc1", "r1", 4)
            .node(2, "dc1", "r2", 4)
            .node(3, "dc1", "r3", 4)
            .node(4, "dc1", "r1", 4)
            .build();

        let allocator = TabletAllocator::default();
        let table = Uuid::new_v4();
        allocator
            .on_table_created(table, &TabletAwareStrategy::new(3), &topology, 16)
            .unwrap();

        let metadata = allocator.snapshot();
        for (_, info) in metadata.get_map(&table).unwrap().tablets() {
            let hosts: HashSet<_> = info.replicas.iter().map(|r| r.host).collect();
            assert_eq!(hosts.len(), 3);
        }
        allocator.stop();
    }

    #[tokio::test]
    async fn test_skewed_allocation_converges_back() {
        let (topology, _) = ClusterFixture::new()
            .node(1, "dc1", "r1", 2)
            .node(2, "dc1", "r1", 2)
            .node(3, "dc1", "r1", 2)
            .build();

        let allocator = TabletAllocator::default();
        let table = Uuid::new_v4();
        allocator
            .on_table_created(table, &TabletAwareStrategy::new(1), &topology, 12)
            .unwrap();

        // Skew the placement: pile every replica onto node 1, as if nodes 2
        // and 3 had just joined an existing cluster.
        let mut metadata = allocator.snapshot();
        let map = metadata.get_map_mut(&table).unwrap();
        for tablet in 0..12u64 {
            let replicas = map.get(tablet).unwrap().replicas.clone();
            map.move_replica(tablet, replicas[0], TabletReplica::new(1, (tablet % 2) as u32));
        }

        run_until_converged(&topology, &mut metadata, 32)
            .await
            .unwrap();

        let counts = tablets_per_node(&metadata);
        let min = counts.values().min().copied().unwrap();
        let max = counts.values().max().copied().unwrap();
        assert!(max - min <= 1, "unexpected spread: {counts:?}");
        allocator.stop();
    }
}
