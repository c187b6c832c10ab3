// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - handing dispatched nodes to the executor
//! - signaling and killing processes, persisting snapshots
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use crate::dag::{ExecutionGraph, NodeId, Scheduler};
use crate::engine::event_handlers::{
    CoreStep, handle_cancel_requested, handle_cleanup_deadline, handle_node_finished,
    handle_start,
};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::types::{NodeStatus, SchedulerStatus};

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(graph: &ExecutionGraph, options: &RuntimeOptions) -> Self {
        Self {
            scheduler: Scheduler::new(graph, options.max_active_runs),
        }
    }

    /// Initial dispatch of the run.
    pub fn start(&mut self) -> CoreStep {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::NodeFinished { node, status } => {
                handle_node_finished(&mut self.scheduler, node, status)
            }
            RuntimeEvent::CancelRequested => handle_cancel_requested(&mut self.scheduler),
            RuntimeEvent::CleanupDeadlineElapsed => handle_cleanup_deadline(&mut self.scheduler),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.scheduler.is_cancel_requested()
    }

    pub fn running_count(&self) -> usize {
        self.scheduler.running_count()
    }

    pub fn run_state_of(&self, id: NodeId) -> Option<NodeStatus> {
        self.scheduler.run_state_of(id)
    }

    pub fn final_status(&self) -> SchedulerStatus {
        self.scheduler.final_status()
    }
}
