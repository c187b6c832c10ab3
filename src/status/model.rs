// src/status/model.rs

//! JSON-shaped run snapshots, shared by the control channel and the store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::dag::{Node, NodeState, Step};
use crate::types::{NodeStatus, SchedulerStatus};

/// Snapshot of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeSnapshot {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub log: Option<PathBuf>,
    #[serde(default)]
    pub started_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Local>>,
    pub status: NodeStatus,
    pub status_text: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub done_count: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl NodeSnapshot {
    /// Snapshot-read a live node.
    pub fn from_node(node: &Node) -> Self {
        let state = node.state();
        Self {
            name: node.name().to_string(),
            command: node.step().command_line(),
            depends: node.step().depends.clone(),
            log: state.log,
            started_at: state.started_at,
            finished_at: state.finished_at,
            status: state.status,
            status_text: state.status.to_string(),
            retry_count: state.retry_count,
            done_count: state.done_count,
            error: state.error,
        }
    }

    /// Placeholder for a step that has not run in this snapshot.
    pub fn from_step(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            command: step.command_line(),
            depends: step.depends.clone(),
            log: None,
            started_at: None,
            finished_at: None,
            status: NodeStatus::None,
            status_text: NodeStatus::None.to_string(),
            retry_count: 0,
            done_count: 0,
            error: None,
        }
    }

    /// The persisted part of the node state, for rebuilding a retry node.
    pub fn to_state(&self) -> NodeState {
        NodeState {
            status: self.status,
            log: self.log.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            retry_count: self.retry_count,
            done_count: self.done_count,
            error: self.error.clone(),
        }
    }
}

/// Snapshot of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunStatus {
    pub name: String,
    pub request_id: String,
    /// Engine process id; `None` when nothing is running.
    pub pid: Option<u32>,
    pub status: SchedulerStatus,
    pub status_text: String,
    pub nodes: Vec<NodeSnapshot>,
    #[serde(default)]
    pub on_exit: Option<NodeSnapshot>,
    #[serde(default)]
    pub on_success: Option<NodeSnapshot>,
    #[serde(default)]
    pub on_failure: Option<NodeSnapshot>,
    #[serde(default)]
    pub on_cancel: Option<NodeSnapshot>,
    #[serde(default)]
    pub started_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub params: Vec<String>,
}

impl RunStatus {
    /// The "not running, never ran" status for a DAG.
    pub fn not_started(name: &str, steps: &[Step]) -> Self {
        Self {
            name: name.to_string(),
            request_id: String::new(),
            pid: None,
            status: SchedulerStatus::None,
            status_text: SchedulerStatus::None.to_string(),
            nodes: steps.iter().map(NodeSnapshot::from_step).collect(),
            on_exit: None,
            on_success: None,
            on_failure: None,
            on_cancel: None,
            started_at: None,
            finished_at: None,
            params: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SchedulerStatus::Running
    }

    pub fn to_json(&self) -> crate::errors::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> crate::errors::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Snapshot a set of live nodes.
pub fn snapshot_nodes(nodes: &[Arc<Node>]) -> Vec<NodeSnapshot> {
    nodes.iter().map(|n| NodeSnapshot::from_node(n)).collect()
}
