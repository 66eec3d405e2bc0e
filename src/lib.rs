//! Tablet load-balancing core for a shard-per-core distributed database.
//!
//! This crate computes incremental migration plans that move a cluster
//! toward balanced resource utilization:
//! - **Topology and tablet-map snapshots** are consumed read-only per round
//! - **Greedy two-level balancing** equalizes average per-shard load across
//!   nodes first, draining the most loaded shard of the most loaded node
//! - **Collocation constraints** (one replica per node, rack diversity) are
//!   enforced on every planned move
//!
//! # Features
//!
//! - Bounded plans: at most one migration per destination shard per round
//! - Stateless planning: every round is a pure function of its snapshots
//! - Cooperative yielding so planning coexists with other work
//! - Injected structured-event observer, with a `tracing` default
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera::{balance_tablets, Node, TabletInfo, TabletMap, TabletMetadata,
//!               TabletReplica, Topology};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let topology = Topology::new(vec![
//!         Node::new(1, "dc1", "r1", 4),
//!         Node::new(2, "dc1", "r1", 4),
//!     ]);
//!
//!     // Eight tablets, all piled on node 1.
//!     let tablets = (0..8u32)
//!         .map(|i| TabletInfo::new(vec![TabletReplica::new(1, i % 4)]))
//!         .collect();
//!     let mut metadata = TabletMetadata::new();
//!     metadata.set_map(Uuid::new_v4(), TabletMap::from_tablets(tablets));
//!
//!     // One planning round; apply the plan externally and call again
//!     // until it comes back empty.
//!     let plan = balance_tablets(&topology, &metadata).await?;
//!     for migration in plan.iter() {
//!         println!("move {} from {} to {}", migration.tablet, migration.src, migration.dst);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Control Loop (external)        │
//! └─────────────────────────────────────────────┘
//!            │ snapshots              ▲ plan
//!            ▼                        │
//! ┌─────────────────────────────────────────────┐
//! │               LoadBalancer                  │
//! │  • make_plan() -> MigrationPlan             │
//! │  • per-DC greedy fill of least-loaded node  │
//! └─────────────────────────────────────────────┘
//!     │               │               │
//!     ▼               ▼               ▼
//! ┌─────────┐   ┌──────────┐   ┌───────────┐
//! │Topology │   │ TabletMap│   │ LoadSketch│
//! │snapshot │   │ snapshot │   │ (target)  │
//! └─────────┘   └──────────┘   └───────────┘
//! ```
//!
//! # Planning Model
//!
//! - **Plans are increments**: the balancer is called repeatedly and
//!   converges to an empty plan once the cluster is balanced
//! - **Execution is external**: the plan is handed to a scheduler that
//!   streams data and updates metadata; the next round observes the result
//! - **Fatal vs. soft outcomes**: corrupted topology aborts the round with
//!   an error; "no progress possible" conditions return an empty plan

pub mod allocator;
pub mod balancer;
pub mod config;
pub mod error;
pub mod strategy;
pub mod tablets;
pub mod testing;
pub mod topology;
pub mod types;

// Re-export main types for convenience
pub use allocator::TabletAllocator;
pub use balancer::{
    balance_tablets, BalanceEvent, BalanceObserver, LoadBalancer, LoadSketch, MigrationPlan,
    SkipReason, TabletMigration, TracingObserver,
};
pub use config::BalancerConfig;
pub use error::{Error, Result, TopologyError};
pub use strategy::{LegacyStrategy, ReplicationStrategy, TabletAwareStrategy};
pub use tablets::{TabletInfo, TabletMap, TabletMetadata, TabletTransition, TransitionKind};
pub use topology::{Node, NodeState, Topology};
pub use types::{GlobalTabletId, HostId, ShardId, TableId, TabletId, TabletReplica};
