// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::{Node, NodeId};
use crate::errors::{DagrunError, Result};
use crate::exec::ExecutorBackend;
use crate::status::model::RunStatus;
use crate::status::store::StatusWriter;
use crate::types::{NodeStatus, SchedulerStatus, Signal};

use super::core::CoreRuntime;
use super::{CoreCommand, RunHandle, RuntimeEvent, RuntimeOptions};

/// Drives one run of a graph in response to `RuntimeEvent`s, and delegates
/// node execution to an `ExecutorBackend`.
///
/// This is the IO shell around `CoreRuntime`, which contains the
/// scheduling semantics. This struct reads events, dispatches nodes,
/// signals processes, runs lifecycle handlers and persists snapshots.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    run: Arc<RunHandle>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    options: RuntimeOptions,
    /// Run-level cancellation shared with the executor's retry/repeat loops.
    cancel: CancellationToken,
    cleanup_deadline: Option<Instant>,
    status_writer: Option<StatusWriter>,
    persist_error: Option<DagrunError>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("run_id", &self.run.run_id())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        run: Arc<RunHandle>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        options: RuntimeOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core: CoreRuntime::new(run.graph(), &options),
            run,
            event_rx,
            executor,
            options,
            cancel,
            cleanup_deadline: None,
            status_writer: None,
            persist_error: None,
        }
    }

    /// Persist a snapshot after every transition.
    pub fn with_status_writer(mut self, writer: StatusWriter) -> Self {
        self.status_writer = Some(writer);
        self
    }

    /// Main event loop.
    ///
    /// - Dispatches the initially ready nodes.
    /// - Consumes `RuntimeEvent`s until the graph settles.
    /// - Runs the handler matching the final status, then `on_exit`.
    ///
    /// Node failures never abort the loop; only a persistence failure is
    /// returned (after the run has finished).
    pub async fn run(mut self) -> Result<RunStatus> {
        info!(run_id = %self.run.run_id(), nodes = self.run.graph().len(), "run started");
        self.run.mark_started();
        self.persist();

        let step = self.core.start();
        let mut keep_running = step.keep_running;
        self.execute_commands(step.commands).await?;

        while keep_running {
            let event = tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(e) => e,
                    None => {
                        warn!("runtime event channel closed before the run settled");
                        break;
                    }
                },
                _ = wait_deadline(self.cleanup_deadline) => {
                    self.cleanup_deadline = None;
                    RuntimeEvent::CleanupDeadlineElapsed
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            self.execute_commands(step.commands).await?;
            self.persist();
            keep_running = step.keep_running;
        }

        self.run.mark_settled();
        let status = self.core.final_status();
        self.run_handlers(status).await;

        self.run.mark_finished(status);
        self.persist();
        info!(run_id = %self.run.run_id(), %status, "run finished");

        if let Some(writer) = self.status_writer.take() {
            if let Err(e) = writer.close() {
                self.persist_error.get_or_insert(e);
            }
        }
        match self.persist_error.take() {
            Some(e) => Err(e),
            None => Ok(self.run.snapshot()),
        }
    }

    /// Execute the commands from one core step, in order.
    async fn execute_commands(&mut self, commands: Vec<CoreCommand>) -> Result<()> {
        for command in commands {
            match command {
                CoreCommand::DispatchNodes(ids) => {
                    let nodes = self.nodes(&ids);
                    let names: Vec<_> = nodes.iter().map(|n| n.name().to_string()).collect();
                    debug!(?names, "dispatching ready nodes");
                    self.executor.spawn_ready_nodes(nodes).await?;
                }
                CoreCommand::MarkSkipped(ids) => {
                    for node in self.nodes(&ids) {
                        info!(node = %node.name(), "skipping node: upstream outcome not tolerated");
                        node.finish(NodeStatus::Skipped);
                    }
                }
                CoreCommand::MarkCanceled(ids) => {
                    for node in self.nodes(&ids) {
                        node.cancel();
                    }
                }
                CoreCommand::CancelRun { terminate } => {
                    self.cancel.cancel();
                    for node in self.nodes(&terminate) {
                        info!(node = %node.name(), "terminating running node");
                        node.signal(Signal::Terminate);
                    }
                    if !terminate.is_empty() && self.cleanup_deadline.is_none() {
                        self.cleanup_deadline = Some(Instant::now() + self.options.max_cleanup_time);
                    }
                }
                CoreCommand::KillNodes(ids) => {
                    for node in self.nodes(&ids) {
                        warn!(node = %node.name(), "cleanup deadline passed; killing node");
                        node.cancel();
                    }
                }
                CoreCommand::Finish(status) => {
                    debug!(%status, "graph settled");
                }
            }
        }
        Ok(())
    }

    async fn run_handlers(&mut self, status: SchedulerStatus) {
        let handlers = self.run.handlers().clone();

        if let Some(node) = handlers.for_status(status) {
            self.run_handler(Arc::clone(node)).await;
        }
        if let Some(node) = handlers.on_exit {
            self.run_handler(node).await;
        }
    }

    async fn run_handler(&mut self, node: Arc<Node>) {
        info!(handler = %node.name(), "running handler");
        let status = self.executor.run_handler(node.clone()).await;
        if status != NodeStatus::Success {
            warn!(handler = %node.name(), %status, "handler did not succeed");
        }
        self.persist();
    }

    fn nodes(&self, ids: &[NodeId]) -> Vec<Arc<Node>> {
        ids.iter()
            .filter_map(|id| self.run.graph().node(*id).cloned())
            .collect()
    }

    /// Write the current snapshot. Failures are remembered and returned
    /// once the run is over, so a storage problem never orphans processes.
    fn persist(&mut self) {
        let Some(writer) = self.status_writer.as_mut() else {
            return;
        };
        if let Err(e) = writer.write(&self.run.snapshot()) {
            error!(error = %e, "failed to persist run status");
            self.persist_error.get_or_insert(e);
        }
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
