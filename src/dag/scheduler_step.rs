// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::node::NodeId;

/// Structured result of a single scheduler "step".
///
/// The async shell turns these into effects (launch, mark skipped, signal);
/// tests use them to drive the graph by hand.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Nodes that became ready and should be launched now.
    pub newly_scheduled: Vec<NodeId>,
    /// Nodes skipped because of an upstream outcome.
    pub newly_skipped: Vec<NodeId>,
    /// Nodes canceled before they ever started.
    pub newly_canceled: Vec<NodeId>,
    /// Running nodes whose processes must be asked to terminate.
    pub to_terminate: Vec<NodeId>,
    /// Whether this step settled the run (nothing running, nothing ready).
    pub run_just_finished: bool,
}
