//! Destination shard selection for nodes being filled.
//!
//! The sketch answers "which shard of this node should receive the next
//! tablet". Shards with fewer tablets are preferred, and because each
//! selection increments the chosen shard's counter, repeated calls for the
//! same node spread selections round-robin proportionally to remaining
//! capacity.

use crate::config::DEFAULT_YIELD_CHUNK;
use crate::error::{Result, TopologyError};
use crate::tablets::TabletMetadata;
use crate::topology::Topology;
use crate::types::{HostId, ShardId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Min-heap key: least-loaded shard first.
type ShardSlot = Reverse<(u64, ShardId)>;

#[derive(Debug, Default)]
struct NodeSketch {
    shards: BinaryHeap<ShardSlot>,
}

/// Tracks per-shard tablet counts for nodes receiving migrations.
#[derive(Debug, Default)]
pub struct LoadSketch {
    nodes: HashMap<HostId, NodeSketch>,
}

impl LoadSketch {
    /// Create an empty sketch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load current per-shard tablet counts for `host` from the tablet map.
    ///
    /// Fails only if the host is absent from the topology; that is an
    /// internal error, not expected in normal operation. The traversal is
    /// chunked and yields cooperatively.
    pub async fn populate(
        &mut self,
        topology: &Topology,
        tablets: &TabletMetadata,
        host: HostId,
    ) -> Result<()> {
        let node = topology
            .find_node(host)
            .ok_or(TopologyError::NodeNotFound(host))?;

        let mut counts = vec![0u64; node.shard_count as usize];
        for (_, map) in tablets.all_tables() {
            map.for_each_tablet(DEFAULT_YIELD_CHUNK, |_, info| {
                for replica in &info.replicas {
                    if replica.host == host {
                        if let Some(count) = counts.get_mut(replica.shard as usize) {
                            *count += 1;
                        }
                    }
                }
                Ok(())
            })
            .await?;
        }

        let shards = counts
            .into_iter()
            .enumerate()
            .map(|(shard, count)| Reverse((count, shard as ShardId)))
            .collect();
        self.nodes.insert(host, NodeSketch { shards });
        Ok(())
    }

    /// Seed a node with all-zero shard counts without reading metadata.
    ///
    /// Used when filling nodes for a map that does not exist yet, such as
    /// allocating the tablet map of a new table: only placements made
    /// through this sketch contribute to shard load.
    pub fn seed_empty(&mut self, host: HostId, shard_count: u32) {
        let shards = (0..shard_count)
            .map(|shard| Reverse((0, shard)))
            .collect();
        self.nodes.insert(host, NodeSketch { shards });
    }

    /// Pick the least-loaded shard of `host` and account one tablet to it.
    ///
    /// Callable once per planned migration into the node, up to and beyond
    /// the node's shard count, without a fresh populate.
    pub fn next_shard(&mut self, host: HostId) -> Result<ShardId> {
        let sketch = self
            .nodes
            .get_mut(&host)
            .ok_or(TopologyError::NodeNotFound(host))?;
        let Reverse((count, shard)) = sketch
            .shards
            .pop()
            .ok_or(TopologyError::NoShards(host))?;
        sketch.shards.push(Reverse((count + 1, shard)));
        Ok(shard)
    }
}
