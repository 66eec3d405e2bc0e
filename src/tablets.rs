//! Tablet metadata snapshot.
//!
//! A [`TabletMap`] records, for one table, the assignment of tablets to
//! replica sets plus any in-flight transition markers. [`TabletMetadata`]
//! collects the maps of all tables. Like the topology, tablet metadata is
//! owned and mutated by the external metadata store; the balancer reads it
//! for the duration of one planning round.
//!
//! Tablet maps can be large, so traversal is chunked: [`TabletMap::for_each_tablet`]
//! yields back to the executor periodically instead of making one long
//! synchronous pass.

use crate::error::Result;
use crate::types::{HostId, TableId, TabletId, TabletReplica};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Replica set of one tablet.
///
/// A tablet's replica set contains at most one replica per node; the
/// replication factor is the replica count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletInfo {
    /// Current replicas, one per distinct node.
    pub replicas: Vec<TabletReplica>,
}

impl TabletInfo {
    /// Create a tablet with the given replicas.
    pub fn new(replicas: Vec<TabletReplica>) -> Self {
        Self { replicas }
    }

    /// Replication factor of this tablet.
    pub fn replication_factor(&self) -> usize {
        self.replicas.len()
    }

    /// Whether any replica of this tablet lives on `host`.
    pub fn has_replica_on(&self, host: HostId) -> bool {
        self.replicas.iter().any(|r| r.host == host)
    }
}

/// Kind of an in-flight tablet transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    /// A replica is being moved between shards.
    Migration,
    /// A replica is being rebuilt from its peers.
    Rebuild,
}

/// An in-flight, not-yet-completed change to a tablet's replica set.
///
/// Transitions are recorded by the execution layer. While any tablet of a
/// table is in transition, planning for that table's datacenter is skipped
/// for the round: re-planning could race with the half-applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletTransition {
    /// What kind of change is under way.
    pub kind: TransitionKind,
    /// Replica set once the transition completes.
    pub next: Vec<TabletReplica>,
}

/// Tablet-to-replica assignment for one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabletMap {
    tablets: Vec<TabletInfo>,
    transitions: HashMap<TabletId, TabletTransition>,
}

impl TabletMap {
    /// Create a map with `tablet_count` tablets, all with empty replica sets.
    pub fn new(tablet_count: usize) -> Self {
        Self {
            tablets: vec![TabletInfo::default(); tablet_count],
            transitions: HashMap::new(),
        }
    }

    /// Create a map from pre-built tablet infos.
    pub fn from_tablets(tablets: Vec<TabletInfo>) -> Self {
        Self {
            tablets,
            transitions: HashMap::new(),
        }
    }

    /// Number of tablets in this map.
    pub fn tablet_count(&self) -> usize {
        self.tablets.len()
    }

    /// Look up a tablet by id.
    pub fn get(&self, tablet: TabletId) -> Option<&TabletInfo> {
        self.tablets.get(tablet as usize)
    }

    /// Iterate over (tablet id, info) pairs without yielding.
    pub fn tablets(&self) -> impl Iterator<Item = (TabletId, &TabletInfo)> {
        self.tablets
            .iter()
            .enumerate()
            .map(|(i, info)| (i as TabletId, info))
    }

    /// Chunked, yieldable traversal over all tablets.
    ///
    /// The callback runs for every tablet in id order; every `yield_every`
    /// tablets the traversal yields back to the executor so long scans
    /// coexist with other work. A `yield_every` of zero disables yielding.
    /// The first callback error short-circuits the traversal.
    pub async fn for_each_tablet<F>(&self, yield_every: usize, mut f: F) -> Result<()>
    where
        F: FnMut(TabletId, &TabletInfo) -> Result<()>,
    {
        for (i, info) in self.tablets.iter().enumerate() {
            f(i as TabletId, info)?;
            if yield_every > 0 && (i + 1) % yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }
        Ok(())
    }

    /// Whether any tablet of this table has a pending transition.
    pub fn has_transitions(&self) -> bool {
        !self.transitions.is_empty()
    }

    /// Pending transitions by tablet id.
    pub fn transitions(&self) -> &HashMap<TabletId, TabletTransition> {
        &self.transitions
    }

    /// Record a pending transition for a tablet.
    pub fn set_transition(&mut self, tablet: TabletId, transition: TabletTransition) {
        self.transitions.insert(tablet, transition);
    }

    /// Clear a pending transition, returning it if present.
    pub fn clear_transition(&mut self, tablet: TabletId) -> Option<TabletTransition> {
        self.transitions.remove(&tablet)
    }

    /// Replace the replica set of a tablet.
    pub fn set_replicas(&mut self, tablet: TabletId, replicas: Vec<TabletReplica>) {
        if let Some(info) = self.tablets.get_mut(tablet as usize) {
            info.replicas = replicas;
        }
    }

    /// Move one replica of `tablet` from `src` to `dst`.
    ///
    /// Returns false if `src` is not a current replica of the tablet.
    pub fn move_replica(&mut self, tablet: TabletId, src: TabletReplica, dst: TabletReplica) -> bool {
        let Some(info) = self.tablets.get_mut(tablet as usize) else {
            return false;
        };
        match info.replicas.iter().position(|r| *r == src) {
            Some(idx) => {
                info.replicas[idx] = dst;
                true
            }
            None => false,
        }
    }
}

/// Tablet maps for every tablet-enabled table in the cluster.
///
/// Keyed by table id with deterministic iteration order, so repeated rounds
/// over the same snapshot visit tables identically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabletMetadata {
    tables: BTreeMap<TableId, TabletMap>,
}

impl TabletMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate over (table, map) pairs in table-id order.
    pub fn all_tables(&self) -> impl Iterator<Item = (&TableId, &TabletMap)> {
        self.tables.iter()
    }

    /// Look up the tablet map of a table.
    pub fn get_map(&self, table: &TableId) -> Option<&TabletMap> {
        self.tables.get(table)
    }

    /// Mutable access to a table's map (used when applying migrations).
    pub fn get_map_mut(&mut self, table: &TableId) -> Option<&mut TabletMap> {
        self.tables.get_mut(table)
    }

    /// Install or replace the tablet map of a table.
    pub fn set_map(&mut self, table: TableId, map: TabletMap) {
        self.tables.insert(table, map);
    }

    /// Drop a table's map, returning it if present.
    pub fn drop_map(&mut self, table: &TableId) -> Option<TabletMap> {
        self.tables.remove(table)
    }

    /// Number of tablet-enabled tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_traversal_visits_all_tablets_in_order() {
        let map = TabletMap::new(10);
        let mut seen = Vec::new();
        map.for_each_tablet(3, |id, _| {
            seen.push(id);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_traversal_short_circuits_on_error() {
        let map = TabletMap::new(10);
        let mut seen = 0;
        let result = map
            .for_each_tablet(0, |id, _| {
                seen += 1;
                if id == 4 {
                    return Err(crate::error::Error::Internal("stop".into()));
                }
                Ok(())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_move_replica() {
        let mut map = TabletMap::from_tablets(vec![TabletInfo::new(vec![
            TabletReplica::new(1, 0),
            TabletReplica::new(2, 1),
        ])]);

        assert!(map.move_replica(0, TabletReplica::new(1, 0), TabletReplica::new(3, 2)));
        assert!(map.get(0).unwrap().has_replica_on(3));
        assert!(!map.get(0).unwrap().has_replica_on(1));

        // Source no longer present: refused.
        assert!(!map.move_replica(0, TabletReplica::new(1, 0), TabletReplica::new(4, 0)));
    }

    #[test]
    fn test_transitions() {
        let mut map = TabletMap::new(2);
        assert!(!map.has_transitions());

        map.set_transition(
            1,
            TabletTransition {
                kind: TransitionKind::Migration,
                next: vec![TabletReplica::new(5, 0)],
            },
        );
        assert!(map.has_transitions());

        map.clear_transition(1);
        assert!(!map.has_transitions());
    }

    #[test]
    fn test_metadata_table_iteration_is_deterministic() {
        let mut metadata = TabletMetadata::new();
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        metadata.set_map(t1, TabletMap::new(1));
        metadata.set_map(t2, TabletMap::new(2));

        let first: Vec<TableId> = metadata.all_tables().map(|(t, _)| *t).collect();
        let second: Vec<TableId> = metadata.all_tables().map(|(t, _)| *t).collect();
        assert_eq!(first, second);
        assert_eq!(metadata.table_count(), 2);
    }
}
