// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use crate::dag::{NodeId, Scheduler, SchedulerStep};
use crate::types::{NodeStatus, SchedulerStatus};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Launch these nodes.
    DispatchNodes(Vec<NodeId>),
    /// Mark these nodes skipped (upstream outcome not tolerated).
    MarkSkipped(Vec<NodeId>),
    /// Mark these never-started nodes canceled.
    MarkCanceled(Vec<NodeId>),
    /// Cancel the run: stop retry/repeat loops, ask these running nodes'
    /// processes to terminate and start the wind-down deadline.
    CancelRun { terminate: Vec<NodeId> },
    /// Wind-down deadline passed: force-kill what is still running.
    KillNodes(Vec<NodeId>),
    /// The graph is settled with this run-level status.
    Finish(SchedulerStatus),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Seed the run with every node that is ready from the outset.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.step_start();
    into_core_step(scheduler, step, Vec::new())
}

/// Handle a node completion event.
pub fn handle_node_finished(scheduler: &mut Scheduler, node: NodeId, status: NodeStatus) -> CoreStep {
    let step = scheduler.step_completion(node, status);
    into_core_step(scheduler, step, Vec::new())
}

/// Handle a cancellation request.
///
/// Repeated requests are harmless: pending nodes are only canceled once and
/// running nodes are signaled again.
pub fn handle_cancel_requested(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.step_cancel();
    let mut commands = Vec::new();
    if !step.newly_canceled.is_empty() {
        commands.push(CoreCommand::MarkCanceled(step.newly_canceled.clone()));
    }
    commands.push(CoreCommand::CancelRun {
        terminate: step.to_terminate.clone(),
    });
    into_core_step(scheduler, step, commands)
}

/// Handle the wind-down deadline.
pub fn handle_cleanup_deadline(scheduler: &mut Scheduler) -> CoreStep {
    let running = scheduler.running();
    let commands = if running.is_empty() {
        Vec::new()
    } else {
        vec![CoreCommand::KillNodes(running)]
    };
    CoreStep {
        commands,
        keep_running: !scheduler.is_finished(),
    }
}

fn into_core_step(
    scheduler: &Scheduler,
    step: SchedulerStep,
    mut commands: Vec<CoreCommand>,
) -> CoreStep {
    if !step.newly_skipped.is_empty() {
        commands.push(CoreCommand::MarkSkipped(step.newly_skipped));
    }
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchNodes(step.newly_scheduled));
    }

    let mut keep_running = true;
    if step.run_just_finished {
        commands.push(CoreCommand::Finish(scheduler.final_status()));
        keep_running = false;
    }

    CoreStep {
        commands,
        keep_running,
    }
}
