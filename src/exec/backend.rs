// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`node_runner`].
//!
//! - `RealExecutorBackend` spawns one Tokio task per dispatched node, which
//!   runs [`run_node`] and reports `NodeFinished` back to the runtime.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which nodes were dispatched and emits scripted `NodeFinished` events.
//!
//! [`node_runner`]: crate::exec::node_runner

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dag::Node;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::node_runner::{ExecContext, execute_node, run_node};
use crate::types::NodeStatus;

/// Trait abstracting how dispatched nodes are executed.
pub trait ExecutorBackend: Send {
    /// Start the given nodes. Each must eventually produce exactly one
    /// `RuntimeEvent::NodeFinished`.
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<Arc<Node>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Run a lifecycle handler to completion, outside the graph.
    fn run_handler(
        &mut self,
        node: Arc<Node>,
    ) -> Pin<Box<dyn Future<Output = NodeStatus> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    ctx: ExecContext,
}

impl RealExecutorBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, ctx: ExecContext) -> Self {
        Self { runtime_tx, ctx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<Arc<Node>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let ctx = self.ctx.clone();

        Box::pin(async move {
            for node in nodes {
                tokio::spawn(run_node(node, ctx.clone(), tx.clone()));
            }
            Ok(())
        })
    }

    fn run_handler(
        &mut self,
        node: Arc<Node>,
    ) -> Pin<Box<dyn Future<Output = NodeStatus> + Send + '_>> {
        // Handlers run once, unconditionally, even after the run was canceled.
        let ctx = ExecContext {
            cancel: CancellationToken::new(),
            delay: std::time::Duration::ZERO,
            ..self.ctx.clone()
        };

        Box::pin(async move { execute_node(&node, &ctx).await })
    }
}
