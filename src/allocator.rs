//! Tablet allocator: schema lifecycle integration around the balancer.
//!
//! The allocator owns the cluster's tablet metadata between rounds and keeps
//! it consistent with schema changes: creating a table under a tablet-aware
//! replication strategy allocates its initial tablet map, dropping a table
//! or keyspace removes the corresponding maps. Planning itself stays a pure
//! function over snapshots; the allocator only hands them out.

use crate::balancer::{LoadBalancer, MigrationPlan};
use crate::config::BalancerConfig;
use crate::error::Result;
use crate::strategy::ReplicationStrategy;
use crate::tablets::TabletMetadata;
use crate::topology::Topology;
use crate::types::TableId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Owns tablet metadata and reacts to schema lifecycle events.
#[derive(Debug, Default)]
pub struct TabletAllocator {
    metadata: RwLock<TabletMetadata>,
    stopped: AtomicBool,
}

impl TabletAllocator {
    /// Create an allocator over existing metadata.
    pub fn new(metadata: TabletMetadata) -> Self {
        Self {
            metadata: RwLock::new(metadata),
            stopped: AtomicBool::new(false),
        }
    }

    /// A new table was created under the given replication strategy.
    ///
    /// Allocates and installs the table's initial tablet map when the
    /// strategy uses tablets; tables under other strategies are ignored.
    pub fn on_table_created(
        &self,
        table: TableId,
        strategy: &dyn ReplicationStrategy,
        topology: &Topology,
        tablet_count: usize,
    ) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            warn!(%table, "allocator stopped, ignoring table creation");
            return Ok(());
        }
        if !strategy.uses_tablets() {
            return Ok(());
        }

        let map = strategy.allocate_tablets_for_new_table(topology, tablet_count)?;
        info!(%table, tablets = map.tablet_count(), "allocated tablet map for new table");
        self.metadata.write().set_map(table, map);
        Ok(())
    }

    /// A table was dropped; remove its tablet map if it had one.
    pub fn on_table_dropped(&self, table: &TableId) {
        if self.metadata.write().drop_map(table).is_some() {
            info!(%table, "dropped tablet map");
        }
    }

    /// A keyspace was dropped; remove the maps of all its tables.
    pub fn on_keyspace_dropped(&self, tables: &[TableId]) {
        let mut metadata = self.metadata.write();
        for table in tables {
            if metadata.drop_map(table).is_some() {
                info!(%table, "dropped tablet map");
            }
        }
    }

    /// Snapshot the current metadata for one planning round.
    pub fn snapshot(&self) -> TabletMetadata {
        self.metadata.read().clone()
    }

    /// Replace the metadata wholesale, e.g. after the execution layer
    /// reports applied migrations.
    pub fn install(&self, metadata: TabletMetadata) {
        *self.metadata.write() = metadata;
    }

    /// Run one balancing round over the current metadata.
    pub async fn make_plan(
        &self,
        topology: &Topology,
        config: BalancerConfig,
    ) -> Result<MigrationPlan> {
        let snapshot = self.snapshot();
        LoadBalancer::new(topology, &snapshot, config)
            .make_plan()
            .await
    }

    /// Stop reacting to lifecycle events.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether the allocator has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for TabletAllocator {
    fn drop(&mut self) {
        if !self.is_stopped() {
            warn!("tablet allocator dropped without stop()");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{LegacyStrategy, TabletAwareStrategy};
    use crate::topology::Node;
    use uuid::Uuid;

    fn topology() -> Topology {
        Topology::new(vec![
            Node::new(1, "dc1", "r1", 2),
            Node::new(2, "dc1", "r2", 2),
            Node::new(3, "dc1", "r3", 2),
        ])
    }

    #[test]
    fn test_table_lifecycle() {
        let allocator = TabletAllocator::default();
        let table = Uuid::new_v4();
        let strategy = TabletAwareStrategy::new(3);

        allocator
            .on_table_created(table, &strategy, &topology(), 4)
            .unwrap();
        assert_eq!(allocator.snapshot().table_count(), 1);
        assert_eq!(allocator.snapshot().get_map(&table).unwrap().tablet_count(), 4);

        allocator.on_table_dropped(&table);
        assert_eq!(allocator.snapshot().table_count(), 0);
        allocator.stop();
    }

    #[test]
    fn test_non_tablet_strategy_is_ignored() {
        let allocator = TabletAllocator::default();
        allocator
            .on_table_created(Uuid::new_v4(), &LegacyStrategy, &topology(), 4)
            .unwrap();
        assert_eq!(allocator.snapshot().table_count(), 0);
        allocator.stop();
    }

    #[test]
    fn test_keyspace_drop_removes_all_maps() {
        let allocator = TabletAllocator::default();
        let strategy = TabletAwareStrategy::new(1);
        let tables: Vec<TableId> = (0..3).map(|_| Uuid::new_v4()).collect();
        for table in &tables {
            allocator
                .on_table_created(*table, &strategy, &topology(), 2)
                .unwrap();
        }

        allocator.on_keyspace_dropped(&tables);
        assert_eq!(allocator.snapshot().table_count(), 0);
        allocator.stop();
    }

    #[test]
    fn test_stopped_allocator_ignores_creation() {
        let allocator = TabletAllocator::default();
        allocator.stop();
        allocator
            .on_table_created(Uuid::new_v4(), &TabletAwareStrategy::new(1), &topology(), 2)
            .unwrap();
        assert_eq!(allocator.snapshot().table_count(), 0);
    }
}
