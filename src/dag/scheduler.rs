use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::graph::ExecutionGraph;
use crate::dag::node::NodeId;
use crate::dag::node_info::NodeInfo;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::types::{NodeStatus, SchedulerStatus};

/// Pure per-run state machine over an [`ExecutionGraph`].
///
/// It is responsible for:
/// - deciding which nodes are ready (dependencies terminal and tolerated)
/// - skipping nodes whose upstream outcome is not tolerated
/// - respecting the run's concurrency cap
/// - refusing new starts once cancellation was requested
/// - computing the run-level status at the end
///
/// It performs no IO and never touches the shared node state.
#[derive(Debug)]
pub struct Scheduler {
    nodes: BTreeMap<NodeId, NodeInfo>,
    /// 0 means unlimited.
    max_active_runs: usize,
    cancel_requested: bool,
    finished: bool,
}

impl Scheduler {
    pub fn new(graph: &ExecutionGraph, max_active_runs: usize) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .map(|n| (n.id(), NodeInfo::from_node(n, graph)))
            .collect();

        Self {
            nodes,
            max_active_runs,
            cancel_requested: false,
            finished: false,
        }
    }

    pub fn run_state_of(&self, id: NodeId) -> Option<NodeStatus> {
        self.nodes.get(&id).map(|info| info.run_state)
    }

    pub fn running(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|info| info.run_state == NodeStatus::Running)
            .map(|info| info.id)
            .collect()
    }

    pub fn running_count(&self) -> usize {
        ReadOnlyStateManager::new(&self.nodes).running_count()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Initial dispatch.
    pub fn step_start(&mut self) -> SchedulerStep {
        debug!(nodes = self.nodes.len(), "scheduler: starting run");
        let mut step = SchedulerStep::default();
        self.advance(&mut step);
        step
    }

    /// A dispatched node reached a terminal status.
    pub fn step_completion(&mut self, id: NodeId, status: NodeStatus) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if !status.is_terminal() {
            warn!(node_id = id, %status, "non-terminal completion status; ignoring");
            return step;
        }

        StateManager::new(&mut self.nodes, self.max_active_runs).record_completion(id, status);
        self.advance(&mut step);
        step
    }

    /// Cancellation: cancel everything not yet started and hand back the
    /// running nodes so the shell can terminate their processes.
    pub fn step_cancel(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if !self.cancel_requested {
            info!("scheduler: cancellation requested");
            self.cancel_requested = true;
            step.newly_canceled =
                StateManager::new(&mut self.nodes, self.max_active_runs).cancel_pending();
        }
        step.to_terminate = self.running();

        self.maybe_finish(&mut step);
        step
    }

    /// Run-level status: `Cancel` when cancellation was requested, else
    /// `Error` if any node failed, else `Success`.
    pub fn final_status(&self) -> SchedulerStatus {
        if self.cancel_requested {
            SchedulerStatus::Cancel
        } else if self
            .nodes
            .values()
            .any(|info| info.run_state == NodeStatus::Error)
        {
            SchedulerStatus::Error
        } else {
            SchedulerStatus::Success
        }
    }

    fn advance(&mut self, step: &mut SchedulerStep) {
        if !self.cancel_requested {
            StateManager::new(&mut self.nodes, self.max_active_runs).collect_new_ready_nodes(step);
        }
        self.maybe_finish(step);
    }

    fn maybe_finish(&mut self, step: &mut SchedulerStep) {
        if self.finished {
            return;
        }
        if ReadOnlyStateManager::new(&self.nodes).all_nodes_settled() {
            info!(status = %self.final_status(), "scheduler: all nodes settled");
            self.finished = true;
            step.run_just_finished = true;
        }
    }
}
