// src/dag/step.rs

//! Finalized step definitions handed to the graph builder.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether a dependent may run despite an unmet upstream outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueOn {
    /// Proceed past an upstream `Error` or `Cancel`.
    #[serde(default)]
    pub failure: bool,
    /// Proceed past an upstream `Skipped`.
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepeatPolicy {
    pub enabled: bool,
    pub interval: Duration,
}

/// A precondition: the observed value of `condition` must equal `expected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub condition: String,
    pub expected: String,
}

/// Immutable description of one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub description: String,
    pub command: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub depends: Vec<String>,
    pub continue_on: ContinueOn,
    pub retry_policy: RetryPolicy,
    pub repeat_policy: RepeatPolicy,
    pub preconditions: Vec<Condition>,
    pub mail_on_error: bool,
}

impl Step {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Self::default()
        }
    }

    /// A step whose command line is interpreted by the platform shell.
    pub fn shell(name: impl Into<String>, cmd: &str) -> Self {
        let (command, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
        Self {
            args: vec![flag.to_string(), cmd.to_string()],
            ..Self::new(name, command)
        }
    }

    /// Human-readable command line, used in snapshots and dry-run output.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            return self.command.clone();
        }
        format!("{} {}", self.command, self.args.join(" "))
    }
}
