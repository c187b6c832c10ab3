// src/dag/node_info.rs

//! Scheduler-side view of a node: static wiring plus the scheduler's own
//! record of the node's run state.

use crate::dag::ExecutionGraph;
use crate::dag::node::{Node, NodeId};
use crate::dag::step::ContinueOn;
use crate::types::NodeStatus;

/// What the scheduler knows about one node.
///
/// `run_state` is driven only by the engine's own transition events; the
/// scheduler never reads the shared [`Node`] state to make decisions.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub continue_on: ContinueOn,
    /// Direct dependencies.
    pub deps: Vec<NodeId>,
    pub run_state: NodeStatus,
}

impl NodeInfo {
    pub fn from_node(node: &Node, graph: &ExecutionGraph) -> Self {
        // A node left `Running` by an interrupted run gets attempted again.
        let run_state = match node.read_status() {
            NodeStatus::Running => NodeStatus::None,
            other => other,
        };

        Self {
            id: node.id(),
            name: node.name().to_string(),
            continue_on: node.step().continue_on,
            deps: graph.dependencies_of(node.id()),
            run_state,
        }
    }
}

/// Whether a not-yet-started node can be launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Some dependency has not reached a terminal state.
    Waiting,
    /// Every dependency is satisfied (or tolerated by `continue_on`).
    Ready,
    /// A dependency outcome forces this node to be skipped.
    Skip,
}
