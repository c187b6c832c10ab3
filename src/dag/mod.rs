// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`step`] holds the finalized, immutable step definitions.
//! - [`node`] is the runtime wrapper around one step for one run.
//! - [`graph`] builds the node graph, detects cycles and derives retry graphs.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   nodes are ready, which are skipped, and when the run is settled.
//! - [`node_info`] provides the scheduler-side node records.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod node;
pub mod node_info;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod step;

pub use graph::ExecutionGraph;
pub use node::{Node, NodeId, NodeState};
pub use node_info::Readiness;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use step::{Condition, ContinueOn, RepeatPolicy, RetryPolicy, Step};
