//! Migration plan artifact.
//!
//! A plan is an ordered batch of single-tablet relocation instructions
//! produced by one planning round. It is handed to the external execution
//! scheduler, which streams the data and applies the metadata change; the
//! balancer never executes migrations itself.

use crate::types::{GlobalTabletId, TabletReplica};
use serde::{Deserialize, Serialize};

/// One planned tablet relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletMigration {
    /// Tablet being moved.
    pub tablet: GlobalTabletId,
    /// Current replica location.
    pub src: TabletReplica,
    /// Destination replica location.
    pub dst: TabletReplica,
}

/// Ordered sequence of migrations produced by one planning round.
///
/// The plan is a small increment, not a complete schedule: the balancer is
/// invoked iteratively and converges to an empty plan once the cluster is
/// balanced. No two instructions in one plan reference the same tablet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    migrations: Vec<TabletMigration>,
}

impl MigrationPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of migrations in the plan.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the plan carries no migrations.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Append one migration, preserving insertion order.
    pub fn push(&mut self, migration: TabletMigration) {
        self.migrations.push(migration);
    }

    /// Append all migrations of `other`, preserving order.
    pub fn merge(&mut self, other: MigrationPlan) {
        self.migrations.extend(other.migrations);
    }

    /// The migrations in insertion order.
    pub fn migrations(&self) -> &[TabletMigration] {
        &self.migrations
    }

    /// Iterate over the migrations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TabletMigration> {
        self.migrations.iter()
    }

    /// Serialize the plan for handoff to the execution scheduler.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize a plan received from the planner.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl IntoIterator for MigrationPlan {
    type Item = TabletMigration;
    type IntoIter = std::vec::IntoIter<TabletMigration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn migration(tablet: u64, src_host: u64, dst_host: u64) -> TabletMigration {
        TabletMigration {
            tablet: GlobalTabletId::new(Uuid::nil(), tablet),
            src: TabletReplica::new(src_host, 0),
            dst: TabletReplica::new(dst_host, 0),
        }
    }

    #[test]
    fn test_merge_preserves_order() {
        let mut plan = MigrationPlan::new();
        plan.push(migration(0, 1, 2));

        let mut other = MigrationPlan::new();
        other.push(migration(1, 1, 3));
        other.push(migration(2, 2, 3));

        plan.merge(other);
        let tablets: Vec<u64> = plan.iter().map(|m| m.tablet.tablet).collect();
        assert_eq!(tablets, [0, 1, 2]);
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut plan = MigrationPlan::new();
        plan.push(migration(7, 4, 5));
        let bytes = plan.to_bytes().unwrap();
        let decoded = MigrationPlan::from_bytes(&bytes).unwrap();
        assert_eq!(plan, decoded);
    }
}
