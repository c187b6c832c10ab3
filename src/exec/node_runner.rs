// src/exec/node_runner.rs

//! Per-node execution: preconditions, retry and repeat loops.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::Node;
use crate::engine::RuntimeEvent;
use crate::exec::precondition::check_preconditions;
use crate::types::NodeStatus;

/// Everything a node needs from its run to execute.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    /// Directory for per-node log files; `None` inherits the engine's streams.
    pub log_dir: Option<PathBuf>,
    /// Run-wide environment (DAG `env` plus positional parameters).
    pub env: BTreeMap<String, String>,
    /// Pause before each launch.
    pub delay: Duration,
    /// Run-level cancellation, observed between attempts.
    pub cancel: CancellationToken,
}

/// Execute a node and report its terminal status to the runtime.
pub async fn run_node(node: Arc<Node>, ctx: ExecContext, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let status = execute_node(&node, &ctx).await;

    if runtime_tx
        .send(RuntimeEvent::NodeFinished {
            node: node.id(),
            status,
        })
        .await
        .is_err()
    {
        error!(node = %node.name(), %status, "runtime gone; node completion dropped");
    }
}

/// Drive one node to a terminal status and return it.
///
/// - An unmet (or failing) precondition skips the node without launching
///   anything. A run cancellation aborts the check and kills its command.
/// - A failed attempt is retried immediately while fewer than
///   `retry_policy.limit` retries have been used.
/// - With `repeat_policy` enabled, a successful attempt is followed by a
///   pause and another attempt until one fails or the run is canceled.
pub async fn execute_node(node: &Node, ctx: &ExecContext) -> NodeStatus {
    if ctx.cancel.is_cancelled() {
        return node.finish(NodeStatus::Cancel);
    }

    let mut env = ctx.env.clone();
    env.extend(node.step().env.clone());

    let checked = tokio::select! {
        res = check_preconditions(&node.step().preconditions, &env) => res,
        _ = ctx.cancel.cancelled() => {
            info!(node = %node.name(), "run canceled while checking preconditions");
            return node.finish(NodeStatus::Cancel);
        }
    };
    match checked {
        Ok(true) => {}
        Ok(false) => {
            info!(node = %node.name(), "preconditions not met; skipping");
            return node.finish(NodeStatus::Skipped);
        }
        Err(e) => {
            warn!(node = %node.name(), error = %e, "precondition evaluation failed; skipping");
            return node.finish(NodeStatus::Skipped);
        }
    }

    if !ctx.delay.is_zero() && !pause(ctx.delay, &ctx.cancel).await {
        return node.finish(NodeStatus::Cancel);
    }
    if ctx.cancel.is_cancelled() || !node.start_running() {
        return node.finish(NodeStatus::Cancel);
    }
    node.setup_log(ctx.log_dir.as_deref());

    let retry_limit = node.step().retry_policy.limit;
    let repeat = node.step().repeat_policy;

    loop {
        info!(node = %node.name(), cmd = %node.step().command_line(), "starting node process");
        let result = node.execute(&ctx.env, &ctx.cancel).await;

        if node.read_status() == NodeStatus::Cancel || ctx.cancel.is_cancelled() {
            info!(node = %node.name(), "node canceled");
            return node.finish(NodeStatus::Cancel);
        }

        match result {
            Err(e) => {
                let retries = node.read_retry_count();
                if retries < retry_limit {
                    warn!(
                        node = %node.name(),
                        error = %e,
                        retry = retries + 1,
                        limit = retry_limit,
                        "node failed; retrying"
                    );
                    node.inc_retry_count();
                    continue;
                }
                error!(node = %node.name(), error = %e, "node failed");
                return node.finish(NodeStatus::Error);
            }
            Ok(()) if repeat.enabled => {
                debug!(node = %node.name(), interval = ?repeat.interval, "repeating node");
                if !pause(repeat.interval, &ctx.cancel).await
                    || node.read_status() == NodeStatus::Cancel
                {
                    return node.finish(NodeStatus::Cancel);
                }
                node.inc_done_count();
            }
            Ok(()) => {
                info!(node = %node.name(), "node finished");
                return node.finish(NodeStatus::Success);
            }
        }
    }
}

/// Sleep for `period`; `false` if the run was canceled first.
async fn pause(period: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => true,
        _ = cancel.cancelled() => false,
    }
}
