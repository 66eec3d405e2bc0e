//! Cluster topology snapshot.
//!
//! The topology is built by the external membership layer and handed to the
//! balancer as an immutable view for the duration of one planning round. The
//! balancer never mutates cluster state; it only reads node descriptors and
//! proposes changes.

use crate::types::HostId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a node.
///
/// Only `Normal` nodes within the datacenter being balanced participate as
/// balancing candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Node is joining the cluster and not yet serving.
    Joining,
    /// Node is a full member.
    Normal,
    /// Node is being drained out of the cluster.
    Leaving,
    /// Node has left the cluster.
    Left,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Joining => write!(f, "joining"),
            NodeState::Normal => write!(f, "normal"),
            NodeState::Leaving => write!(f, "leaving"),
            NodeState::Left => write!(f, "left"),
        }
    }
}

/// Descriptor for one node in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier.
    pub host: HostId,
    /// Datacenter the node belongs to.
    pub datacenter: String,
    /// Rack within the datacenter.
    pub rack: String,
    /// Number of execution shards on this node (shard-per-core).
    pub shard_count: u32,
    /// Lifecycle state.
    pub state: NodeState,
}

impl Node {
    /// Create a new node descriptor in `Normal` state.
    pub fn new(
        host: HostId,
        datacenter: impl Into<String>,
        rack: impl Into<String>,
        shard_count: u32,
    ) -> Self {
        Self {
            host,
            datacenter: datacenter.into(),
            rack: rack.into(),
            shard_count,
            state: NodeState::Normal,
        }
    }

    /// Set the lifecycle state.
    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    /// Whether this node is a balancing candidate for the given datacenter.
    pub fn is_candidate(&self, datacenter: &str) -> bool {
        self.state == NodeState::Normal && self.datacenter == datacenter
    }
}

/// Immutable-for-the-round view of cluster nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    nodes: HashMap<HostId, Node>,
    /// Sorted, deduplicated datacenter names.
    datacenters: Vec<String>,
}

impl Topology {
    /// Build a topology snapshot from node descriptors.
    pub fn new(nodes: Vec<Node>) -> Self {
        let mut datacenters: Vec<String> = nodes.iter().map(|n| n.datacenter.clone()).collect();
        datacenters.sort_unstable();
        datacenters.dedup();
        let nodes = nodes.into_iter().map(|n| (n.host, n)).collect();
        Self { nodes, datacenters }
    }

    /// Datacenter names present in the cluster, in sorted order.
    pub fn datacenters(&self) -> &[String] {
        &self.datacenters
    }

    /// Look up a node by host id.
    pub fn find_node(&self, host: HostId) -> Option<&Node> {
        self.nodes.get(&host)
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over nodes in one datacenter, regardless of state.
    pub fn nodes_in_dc<'a>(&'a self, datacenter: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.values().filter(move |n| n.datacenter == datacenter)
    }

    /// Number of nodes in the snapshot.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
