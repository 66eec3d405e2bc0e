//! Core identifiers used throughout the balancer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Node identifier in the cluster.
pub type HostId = u64;

/// Table identifier. Tables are identified by UUID in the metadata store.
pub type TableId = Uuid;

/// Tablet identifier, unique within one table's tablet map.
///
/// Tablet ids index into the table's tablet array, so they are dense and
/// stable for the lifetime of the map.
pub type TabletId = u64;

/// Shard index within a node, in `[0, shard_count)`.
///
/// Shards are not standalone entities; a shard is always addressed relative
/// to its owning node.
pub type ShardId = u32;

/// Globally unique tablet identity: (table, tablet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalTabletId {
    /// Table the tablet belongs to.
    pub table: TableId,
    /// Tablet within that table's map.
    pub tablet: TabletId,
}

impl GlobalTabletId {
    /// Create a new global tablet id.
    pub fn new(table: TableId, tablet: TabletId) -> Self {
        Self { table, tablet }
    }
}

impl fmt::Display for GlobalTabletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.tablet)
    }
}

/// A tablet replica location: a specific shard on a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabletReplica {
    /// Node hosting the replica.
    pub host: HostId,
    /// Shard index on that node.
    pub shard: ShardId,
}

impl TabletReplica {
    /// Create a new replica location.
    pub fn new(host: HostId, shard: ShardId) -> Self {
        Self { host, shard }
    }
}

impl fmt::Display for TabletReplica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.shard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_display() {
        let replica = TabletReplica::new(3, 7);
        assert_eq!(replica.to_string(), "3:7");
    }

    #[test]
    fn test_global_tablet_id_roundtrip() {
        let id = GlobalTabletId::new(Uuid::new_v4(), 42);
        let encoded = bincode::serialize(&id).unwrap();
        let decoded: GlobalTabletId = bincode::deserialize(&encoded).unwrap();
        assert_eq!(id, decoded);
    }
}
