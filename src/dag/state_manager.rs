// src/dag/state_manager.rs

//! Per-run state transitions for nodes in the scheduler.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::node::NodeId;
use crate::dag::node_info::{NodeInfo, Readiness};
use crate::dag::scheduler_step::SchedulerStep;
use crate::types::NodeStatus;

/// Manages per-run state transitions for nodes.
pub struct StateManager<'a> {
    nodes: &'a mut BTreeMap<NodeId, NodeInfo>,
    /// 0 means unlimited.
    max_active_runs: usize,
}

impl<'a> StateManager<'a> {
    pub fn new(nodes: &'a mut BTreeMap<NodeId, NodeInfo>, max_active_runs: usize) -> Self {
        Self {
            nodes,
            max_active_runs,
        }
    }

    /// Walk the not-yet-started nodes until nothing changes: skip the ones
    /// whose dependencies rule them out, and mark as `Running` as many ready
    /// ones as the concurrency cap allows.
    ///
    /// Skips can cascade (a skipped node may in turn skip its dependents),
    /// hence the fixpoint loop.
    pub fn collect_new_ready_nodes(&mut self, step: &mut SchedulerStep) {
        loop {
            let mut changed = false;

            let candidates: Vec<(NodeId, Readiness)> = {
                let ro = ReadOnlyStateManager::new(self.nodes);
                self.nodes
                    .values()
                    .filter(|info| info.run_state == NodeStatus::None)
                    .map(|info| (info.id, ro.readiness_of(info)))
                    .collect()
            };

            for (id, readiness) in candidates {
                match readiness {
                    Readiness::Waiting => {}
                    Readiness::Skip => {
                        if let Some(info) = self.nodes.get_mut(&id) {
                            debug!(node = %info.name, "upstream outcome not tolerated; skipping");
                            info.run_state = NodeStatus::Skipped;
                            step.newly_skipped.push(id);
                            changed = true;
                        }
                    }
                    Readiness::Ready => {
                        if !self.has_capacity() {
                            continue;
                        }
                        if let Some(info) = self.nodes.get_mut(&id) {
                            info!(node = %info.name, "dependencies satisfied; dispatching node");
                            info.run_state = NodeStatus::Running;
                            step.newly_scheduled.push(id);
                        }
                    }
                }
            }

            if !changed {
                break;
            }
        }
    }

    /// Record a node's terminal status reported by its executor.
    pub fn record_completion(&mut self, id: NodeId, status: NodeStatus) {
        match self.nodes.get_mut(&id) {
            Some(info) => {
                if info.run_state != NodeStatus::Running {
                    warn!(
                        node = %info.name,
                        state = %info.run_state,
                        "completion for node that was not running"
                    );
                }
                info.run_state = status;
            }
            None => warn!(node_id = id, "completion for unknown node; ignoring"),
        }
    }

    /// Cancel every node that has not started yet.
    pub fn cancel_pending(&mut self) -> Vec<NodeId> {
        let mut canceled = Vec::new();
        for info in self.nodes.values_mut() {
            if info.run_state == NodeStatus::None {
                info.run_state = NodeStatus::Cancel;
                canceled.push(info.id);
            }
        }
        canceled
    }

    fn has_capacity(&self) -> bool {
        self.max_active_runs == 0 || self.running_count() < self.max_active_runs
    }

    fn running_count(&self) -> usize {
        ReadOnlyStateManager::new(self.nodes).running_count()
    }
}

/// A read-only view of the node map.
pub struct ReadOnlyStateManager<'a> {
    nodes: &'a BTreeMap<NodeId, NodeInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(nodes: &'a BTreeMap<NodeId, NodeInfo>) -> Self {
        Self { nodes }
    }

    /// Canonical dependency check.
    ///
    /// `Success` satisfies an edge. `Error`/`Cancel` is tolerated only with
    /// `continue_on.failure`, `Skipped` only with `continue_on.skipped`;
    /// otherwise the node is skipped.
    pub fn readiness_of(&self, info: &NodeInfo) -> Readiness {
        let mut readiness = Readiness::Ready;

        for dep_id in &info.deps {
            let Some(dep) = self.nodes.get(dep_id) else {
                warn!(node = %info.name, dep = dep_id, "dependency missing from node map");
                return Readiness::Waiting;
            };

            match dep.run_state {
                NodeStatus::Success => {}
                NodeStatus::Error | NodeStatus::Cancel if info.continue_on.failure => {}
                NodeStatus::Skipped if info.continue_on.skipped => {}
                NodeStatus::Error | NodeStatus::Cancel | NodeStatus::Skipped => {
                    readiness = Readiness::Skip;
                }
                NodeStatus::None | NodeStatus::Running => return Readiness::Waiting,
            }
        }

        readiness
    }

    pub fn running_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|info| info.run_state == NodeStatus::Running)
            .count()
    }

    /// Nothing running and nothing left that could start.
    pub fn all_nodes_settled(&self) -> bool {
        self.running_count() == 0
            && !self.nodes.values().any(|info| {
                info.run_state == NodeStatus::None && self.readiness_of(info) != Readiness::Waiting
            })
    }
}
