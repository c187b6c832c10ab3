// src/engine/run_handle.rs

//! Shared view of one live run.
//!
//! The runtime is the only writer of run metadata and node state; the
//! control server and persistence only take snapshots through this handle.
//! A snapshot locks each node separately, so it may mix states from
//! slightly different instants. It is meant for reporting, never for
//! scheduling decisions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::dag::{ExecutionGraph, Node};
use crate::engine::RuntimeEvent;
use crate::errors::{DagrunError, Result};
use crate::status::model::{NodeSnapshot, RunStatus, snapshot_nodes};
use crate::types::SchedulerStatus;

/// Lifecycle handler nodes, run once after the graph settles.
#[derive(Debug, Default, Clone)]
pub struct Handlers {
    pub on_success: Option<Arc<Node>>,
    pub on_failure: Option<Arc<Node>>,
    pub on_cancel: Option<Arc<Node>>,
    pub on_exit: Option<Arc<Node>>,
}

impl Handlers {
    /// The handler matching a final status, if configured.
    pub fn for_status(&self, status: SchedulerStatus) -> Option<&Arc<Node>> {
        match status {
            SchedulerStatus::Success => self.on_success.as_ref(),
            SchedulerStatus::Error => self.on_failure.as_ref(),
            SchedulerStatus::Cancel => self.on_cancel.as_ref(),
            SchedulerStatus::None | SchedulerStatus::Running => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RunMeta {
    status: SchedulerStatus,
    started_at: Option<DateTime<Local>>,
    finished_at: Option<DateTime<Local>>,
}

#[derive(Debug)]
pub struct RunHandle {
    name: String,
    run_id: String,
    pid: u32,
    params: Vec<String>,
    graph: Arc<ExecutionGraph>,
    handlers: Handlers,
    meta: RwLock<RunMeta>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    /// The graph settled; only handlers remain.
    settled: AtomicBool,
    done: watch::Sender<bool>,
}

impl RunHandle {
    pub fn new(
        name: impl Into<String>,
        run_id: impl Into<String>,
        params: Vec<String>,
        graph: Arc<ExecutionGraph>,
        handlers: Handlers,
        event_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            run_id: run_id.into(),
            pid: std::process::id(),
            params,
            graph,
            handlers,
            meta: RwLock::new(RunMeta::default()),
            event_tx,
            settled: AtomicBool::new(false),
            done: watch::Sender::new(false),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn graph(&self) -> &Arc<ExecutionGraph> {
        &self.graph
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    pub fn status(&self) -> SchedulerStatus {
        self.meta.read().unwrap_or_else(PoisonError::into_inner).status
    }

    /// Point-in-time snapshot of the run.
    pub fn snapshot(&self) -> RunStatus {
        let meta = self
            .meta
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let handler = |n: &Option<Arc<Node>>| n.as_deref().map(NodeSnapshot::from_node);

        RunStatus {
            name: self.name.clone(),
            request_id: self.run_id.clone(),
            pid: Some(self.pid),
            status: meta.status,
            status_text: meta.status.to_string(),
            nodes: snapshot_nodes(self.graph.nodes()),
            on_exit: handler(&self.handlers.on_exit),
            on_success: handler(&self.handlers.on_success),
            on_failure: handler(&self.handlers.on_failure),
            on_cancel: handler(&self.handlers.on_cancel),
            started_at: meta.started_at,
            finished_at: meta.finished_at,
            params: self.params.clone(),
        }
    }

    /// Ask the runtime to cancel the run. Returns once the request is
    /// accepted, not once the wind-down completes.
    ///
    /// Refused once the graph has settled: handlers always run to the end.
    pub async fn request_stop(&self) -> Result<()> {
        if self.is_settled() {
            return Err(DagrunError::Protocol(
                "run is finishing; stop ignored".to_string(),
            ));
        }
        info!(run_id = %self.run_id, "stop requested");
        self.event_tx
            .send(RuntimeEvent::CancelRequested)
            .await
            .map_err(|_| DagrunError::Protocol("run already finished".to_string()))
    }

    /// Request cancellation and wait until the run has wound down.
    pub async fn cancel(&self) -> Result<()> {
        if !self.is_done() {
            // The runtime may finish between the check and the send.
            let _ = self.request_stop().await;
        }
        self.wait_done().await;
        Ok(())
    }

    /// True once no node is left to run (handlers may still be running).
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves once the runtime has finished the run (handlers included).
    pub async fn wait_done(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub(crate) fn mark_started(&self) {
        let mut meta = self.meta.write().unwrap_or_else(PoisonError::into_inner);
        meta.status = SchedulerStatus::Running;
        meta.started_at = Some(Local::now());
    }

    pub(crate) fn mark_settled(&self) {
        self.settled.store(true, Ordering::Release);
    }

    pub(crate) fn mark_finished(&self, status: SchedulerStatus) {
        {
            let mut meta = self.meta.write().unwrap_or_else(PoisonError::into_inner);
            meta.status = status;
            meta.finished_at = Some(Local::now());
        }
        self.done.send_replace(true);
    }
}
