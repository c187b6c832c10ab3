use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use dagrun::dag::Node;
use dagrun::engine::RuntimeEvent;
use dagrun::errors::Result;
use dagrun::exec::ExecutorBackend;
use dagrun::types::NodeStatus;

/// A fake executor that:
/// - records which nodes were dispatched, and which handlers ran
/// - reports a scripted status for each node (default `Success`), either
///   immediately or when the test releases it.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    handlers: Arc<Mutex<Vec<String>>>,
    outcomes: HashMap<String, NodeStatus>,
    /// When set, nodes are parked here instead of finishing.
    parked: Option<Arc<Mutex<Vec<Arc<Node>>>>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            executed: Arc::new(Mutex::new(Vec::new())),
            handlers: Arc::new(Mutex::new(Vec::new())),
            outcomes: HashMap::new(),
            parked: None,
        }
    }

    /// Report `status` for the node named `name`.
    pub fn with_outcome(mut self, name: &str, status: NodeStatus) -> Self {
        self.outcomes.insert(name.to_string(), status);
        self
    }

    /// Never finish nodes on their own; they pile up in the returned list.
    pub fn parking(mut self) -> (Self, Arc<Mutex<Vec<Arc<Node>>>>) {
        let parked = Arc::new(Mutex::new(Vec::new()));
        self.parked = Some(Arc::clone(&parked));
        (self, parked)
    }

    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }

    pub fn handlers(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.handlers)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_nodes(
        &mut self,
        nodes: Vec<Arc<Node>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let parked = self.parked.clone();
        let outcomes = self.outcomes.clone();

        Box::pin(async move {
            for node in nodes {
                executed.lock().unwrap().push(node.name().to_string());

                if let Some(ref parked) = parked {
                    parked.lock().unwrap().push(node);
                    continue;
                }

                let status = outcomes
                    .get(node.name())
                    .copied()
                    .unwrap_or(NodeStatus::Success);
                tx.send(RuntimeEvent::NodeFinished {
                    node: node.id(),
                    status,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn run_handler(
        &mut self,
        node: Arc<Node>,
    ) -> Pin<Box<dyn Future<Output = NodeStatus> + Send + '_>> {
        let handlers = Arc::clone(&self.handlers);
        Box::pin(async move {
            handlers.lock().unwrap().push(node.name().to_string());
            NodeStatus::Success
        })
    }
}
