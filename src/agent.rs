// src/agent.rs

//! One invocation of a DAG in the current process.
//!
//! The agent wires a loaded [`DagConfig`] to the engine: it checks DAG-level
//! preconditions, builds (or rebuilds for retry) the execution graph,
//! claims the DAG's control socket, persists snapshots and forwards
//! termination signals as stop requests.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DagConfig;
use crate::control::{ControlServer, socket_path};
use crate::dag::{ExecutionGraph, Node, Step};
use crate::engine::{Handlers, RunHandle, Runtime, RuntimeEvent};
use crate::errors::{DagrunError, Result};
use crate::exec::precondition::check_preconditions;
use crate::exec::{ExecContext, RealExecutorBackend};
use crate::identity::DagIdentity;
use crate::settings::Settings;
use crate::status::{NodeSnapshot, RunStatus, StatusStore};

const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug)]
pub struct Agent {
    config: DagConfig,
    settings: Settings,
    identity: DagIdentity,
    retry_of: Option<String>,
}

impl Agent {
    pub fn new(config: DagConfig, settings: Settings) -> Self {
        let identity = DagIdentity::from_config_path(&config.path);
        Self {
            config,
            settings,
            identity,
            retry_of: None,
        }
    }

    /// Re-run a prior run, keeping the outcome of every step that does not
    /// need to run again.
    pub fn retry_of(mut self, run_id: impl Into<String>) -> Self {
        self.retry_of = Some(run_id.into());
        self
    }

    /// Execute the DAG to completion and return the final snapshot.
    ///
    /// Node failures are part of the returned status. Errors are reserved
    /// for things that prevent or corrupt the run itself: unmet DAG
    /// preconditions, an invalid graph, another live agent, or a storage
    /// failure.
    pub async fn run(mut self) -> Result<RunStatus> {
        let store = StatusStore::new(&self.settings.data_dir, self.config.hist_retention_days);

        let graph = match self.retry_of.clone() {
            Some(run_id) => {
                let prior = store.find_by_run_id(&self.identity, &run_id)?.status;
                info!(dag = %self.config.name, %run_id, "retrying prior run");
                self.config.params = prior.params.clone();
                retry_graph(&self.config.steps, &prior)?
            }
            None => ExecutionGraph::build(self.config.steps.clone())?,
        };

        let env = self.config.run_env();
        self.check_dag_preconditions(&env).await?;

        let server =
            ControlServer::bind(socket_path(&self.settings.socket_dir, &self.identity)).await?;

        match store.prune(&self.identity) {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "pruned old status files"),
            Err(e) => warn!(error = %e, "failed to prune status history"),
        }

        let run_id = Uuid::now_v7().to_string();
        let writer = store.open(&self.identity, Local::now(), &run_id)?;

        let (event_tx, event_rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_SIZE);
        let run = Arc::new(RunHandle::new(
            self.config.name.clone(),
            run_id,
            self.config.params.clone(),
            Arc::new(graph),
            self.handlers(),
            event_tx.clone(),
        ));

        let options = self.config.runtime_options();
        let cancel = CancellationToken::new();
        let ctx = ExecContext {
            log_dir: options.log_dir.clone(),
            env,
            delay: options.delay,
            cancel: cancel.clone(),
        };
        let executor = RealExecutorBackend::new(event_tx, ctx);
        let runtime = Runtime::new(Arc::clone(&run), event_rx, executor, options, cancel)
            .with_status_writer(writer);

        let shutdown = CancellationToken::new();
        let server_task = tokio::spawn(server.serve(Arc::clone(&run), shutdown.clone()));
        let signal_task = tokio::spawn(forward_signals(Arc::clone(&run)));

        let result = runtime.run().await;

        signal_task.abort();
        shutdown.cancel();
        if let Err(e) = server_task.await {
            warn!(error = %e, "control server task failed");
        }
        result
    }

    async fn check_dag_preconditions(
        &self,
        env: &std::collections::BTreeMap<String, String>,
    ) -> Result<()> {
        match check_preconditions(&self.config.preconditions, env).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DagrunError::PreconditionsNotMet(format!(
                "DAG '{}' will not run",
                self.config.name
            ))),
            Err(e) => Err(DagrunError::PreconditionsNotMet(format!("{e:#}"))),
        }
    }

    fn handlers(&self) -> Handlers {
        let node = |step: &Option<Step>| step.clone().map(|s| Arc::new(Node::new(s)));
        let h = &self.config.handlers;
        Handlers {
            on_success: node(&h.on_success),
            on_failure: node(&h.on_failure),
            on_cancel: node(&h.on_cancel),
            on_exit: node(&h.on_exit),
        }
    }
}

/// Graph of `steps` carrying the node states recorded in `prior`, reset
/// for retry. Steps the prior run never recorded start fresh.
pub fn retry_graph(steps: &[Step], prior: &RunStatus) -> Result<ExecutionGraph> {
    let nodes = steps
        .iter()
        .map(|step| {
            let state = prior
                .nodes
                .iter()
                .find(|n| n.name == step.name)
                .map(NodeSnapshot::to_state)
                .unwrap_or_default();
            Arc::new(Node::with_state(step.clone(), state))
        })
        .collect();
    ExecutionGraph::rebuild_for_retry(nodes)
}

/// Turn SIGINT / SIGTERM into stop requests until the run finishes.
async fn forward_signals(run: Arc<RunHandle>) {
    loop {
        if !wait_for_termination().await {
            return;
        }
        info!(run_id = %run.run_id(), "termination signal received");
        if run.request_stop().await.is_err() {
            return;
        }
    }
}

/// `false` if signal handlers could not be installed.
#[cfg(unix)]
async fn wait_for_termination() -> bool {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to listen for SIGTERM");
            return false;
        }
    };
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.is_ok(),
        _ = term.recv() => true,
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> bool {
    tokio::signal::ctrl_c().await.is_ok()
}
