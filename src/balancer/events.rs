//! Structured balancing events.
//!
//! The balancer does not log through a global sink directly; it emits
//! structured events to a [`BalanceObserver`] injected at construction and
//! scoped to one planning session. The default observer forwards events to
//! `tracing`; tests can install a recording observer instead.

use crate::types::{GlobalTabletId, HostId, TabletReplica};
use tracing::{debug, info, warn};

/// Why a candidate tablet was rejected during selection.
///
/// Rejections are expected, frequent, and self-resolving; they are never
/// surfaced as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The tablet already has a replica on the target node.
    ReplicaOnTarget,
    /// Moving the replica would raise the tablet's per-rack replica count
    /// above the current maximum among its replicas.
    RackImbalance {
        rack: String,
        new_rack_load: usize,
        max_rack_load: usize,
    },
}

/// One structured event emitted during a planning session.
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceEvent {
    /// Planning started for a datacenter.
    DatacenterExamined { dc: String },
    /// Load summary for one candidate node.
    NodeLoad {
        host: HostId,
        rack: String,
        avg_load: f64,
        tablets: u64,
        shards: u32,
    },
    /// The least-loaded node was selected as the fill target.
    TargetSelected {
        host: HostId,
        avg_load: f64,
        max_load: f64,
    },
    /// A table has in-flight transitions; the datacenter round is skipped.
    TransitionsPending { dc: String },
    /// All nodes reached the target's average load.
    BalanceAchieved { dc: String },
    /// No remaining candidate is more loaded than the target.
    NoMoreCandidates {
        next: HostId,
        next_avg_load: f64,
        target_avg_load: f64,
    },
    /// One more move would invert source and target loads; stopping.
    LoadInversion {
        next: HostId,
        next_avg_load: f64,
        target_avg_load: f64,
    },
    /// A source node ran out of candidate shards.
    NodeExhausted {
        host: HostId,
        tablets_remaining: u64,
    },
    /// A source shard ran out of candidate tablets.
    ShardExhausted {
        replica: TabletReplica,
        tablets_remaining: u64,
    },
    /// A candidate tablet was rejected by a constraint check.
    CandidateSkipped {
        tablet: GlobalTabletId,
        reason: SkipReason,
    },
    /// A migration was added to the plan.
    MigrationPlanned {
        tablet: GlobalTabletId,
        src: TabletReplica,
        dst: TabletReplica,
    },
    /// Imbalance exists but collocation constraints left no valid move.
    BalanceUnreachable { dc: String },
    /// A datacenter's sub-plan is ready.
    DatacenterPlanned { dc: String, migrations: usize },
    /// The full plan across all datacenters is ready.
    PlanReady { migrations: usize },
}

/// Sink for balancing events, injected per planning session.
pub trait BalanceObserver: Send + Sync {
    /// Receive one event. Must not block.
    fn on_event(&self, event: &BalanceEvent);
}

/// Default observer forwarding events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl BalanceObserver for TracingObserver {
    fn on_event(&self, event: &BalanceEvent) {
        match event {
            BalanceEvent::DatacenterExamined { dc } => {
                info!(%dc, "examining datacenter");
            }
            BalanceEvent::NodeLoad {
                host,
                rack,
                avg_load,
                tablets,
                shards,
            } => {
                info!(host, %rack, avg_load, tablets, shards, "node load");
            }
            BalanceEvent::TargetSelected {
                host,
                avg_load,
                max_load,
            } => {
                info!(host, avg_load, max_load, "target node selected");
            }
            BalanceEvent::TransitionsPending { dc } => {
                warn!(%dc, "pending transitions active, skipping datacenter");
            }
            BalanceEvent::BalanceAchieved { dc } => {
                debug!(%dc, "balance achieved");
            }
            BalanceEvent::NoMoreCandidates {
                next,
                next_avg_load,
                target_avg_load,
            } => {
                debug!(next, next_avg_load, target_avg_load, "no more candidate nodes");
            }
            BalanceEvent::LoadInversion {
                next,
                next_avg_load,
                target_avg_load,
            } => {
                debug!(
                    next,
                    next_avg_load, target_avg_load, "load would be inverted, stopping"
                );
            }
            BalanceEvent::NodeExhausted {
                host,
                tablets_remaining,
            } => {
                debug!(host, tablets_remaining, "node ran out of candidate shards");
            }
            BalanceEvent::ShardExhausted {
                replica,
                tablets_remaining,
            } => {
                debug!(%replica, tablets_remaining, "shard ran out of candidates");
            }
            BalanceEvent::CandidateSkipped { tablet, reason } => {
                debug!(%tablet, ?reason, "candidate tablet skipped");
            }
            BalanceEvent::MigrationPlanned { tablet, src, dst } => {
                debug!(%tablet, %src, %dst, "migration planned");
            }
            BalanceEvent::BalanceUnreachable { dc } => {
                info!(%dc, "not possible to achieve balance");
            }
            BalanceEvent::DatacenterPlanned { dc, migrations } => {
                info!(%dc, migrations, "prepared migrations for datacenter");
            }
            BalanceEvent::PlanReady { migrations } => {
                info!(migrations, "prepared migrations");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use parking_lot::Mutex;

    /// Test observer capturing every event in order.
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<BalanceEvent>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<BalanceEvent> {
            self.events.lock().clone()
        }
    }

    impl BalanceObserver for RecordingObserver {
        fn on_event(&self, event: &BalanceEvent) {
            self.events.lock().push(event.clone());
        }
    }
}
