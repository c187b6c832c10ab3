use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single node within one run.
///
/// `None -> Running -> {Success, Error, Cancel, Skipped}`; the terminal states
/// are one-way. Serialized as its numeric code so persisted records stay
/// compact; the human text travels alongside as `StatusText`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum NodeStatus {
    #[default]
    None,
    Running,
    Error,
    Cancel,
    Success,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Error | NodeStatus::Cancel | NodeStatus::Success | NodeStatus::Skipped
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NodeStatus::None => "not started",
            NodeStatus::Running => "running",
            NodeStatus::Error => "failed",
            NodeStatus::Cancel => "canceled",
            NodeStatus::Success => "finished",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(text)
    }
}

impl From<NodeStatus> for u8 {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::None => 0,
            NodeStatus::Running => 1,
            NodeStatus::Error => 2,
            NodeStatus::Cancel => 3,
            NodeStatus::Success => 4,
            NodeStatus::Skipped => 5,
        }
    }
}

impl TryFrom<u8> for NodeStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, String> {
        match code {
            0 => Ok(NodeStatus::None),
            1 => Ok(NodeStatus::Running),
            2 => Ok(NodeStatus::Error),
            3 => Ok(NodeStatus::Cancel),
            4 => Ok(NodeStatus::Success),
            5 => Ok(NodeStatus::Skipped),
            other => Err(format!("invalid node status code: {other}")),
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SchedulerStatus {
    #[default]
    None,
    Running,
    Error,
    Cancel,
    Success,
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SchedulerStatus::None => "not started",
            SchedulerStatus::Running => "running",
            SchedulerStatus::Error => "failed",
            SchedulerStatus::Cancel => "canceled",
            SchedulerStatus::Success => "finished",
        };
        f.write_str(text)
    }
}

impl From<SchedulerStatus> for u8 {
    fn from(status: SchedulerStatus) -> Self {
        match status {
            SchedulerStatus::None => 0,
            SchedulerStatus::Running => 1,
            SchedulerStatus::Error => 2,
            SchedulerStatus::Cancel => 3,
            SchedulerStatus::Success => 4,
        }
    }
}

impl TryFrom<u8> for SchedulerStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, String> {
        match code {
            0 => Ok(SchedulerStatus::None),
            1 => Ok(SchedulerStatus::Running),
            2 => Ok(SchedulerStatus::Error),
            3 => Ok(SchedulerStatus::Cancel),
            4 => Ok(SchedulerStatus::Success),
            other => Err(format!("invalid scheduler status code: {other}")),
        }
    }
}

/// Signals the engine may forward to a node's live process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
    Kill,
}
