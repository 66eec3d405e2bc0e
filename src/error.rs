//! Error types for the tablet balancer.

use crate::types::{GlobalTabletId, HostId, TabletReplica};
use thiserror::Error;

/// Result type alias for balancer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the tablet balancer.
///
/// Only genuine invariant violations surface as errors. Rounds where no
/// progress is possible (pending transitions, balance already achieved,
/// collocation constraints leaving no valid move) return an empty plan
/// instead; an empty plan is a legitimate value, never an error.
#[derive(Error, Debug)]
pub enum Error {
    /// Corrupted or desynchronized topology. Aborts the planning round and
    /// is not retried automatically; it signals a bug elsewhere.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Replica allocation for a new table could not be satisfied.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Topology corruption detected while planning.
#[derive(Error, Debug)]
pub enum TopologyError {
    /// A candidate node reports zero shards. A node with no shards cannot
    /// participate in placement; this is a topology bug, not a skip.
    #[error("node {0} has no shards in topology")]
    NoShards(HostId),

    /// A tablet replica references a shard index outside its node's range.
    #[error("tablet {tablet} replica {replica} targets non-existent shard (shard count {shard_count})")]
    ReplicaShardOutOfRange {
        tablet: GlobalTabletId,
        replica: TabletReplica,
        shard_count: u32,
    },

    /// A host referenced by metadata is absent from the topology snapshot.
    #[error("node not found: {0}")]
    NodeNotFound(HostId),
}
