#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use dagrun::dag::{Condition, ExecutionGraph, Step};

/// Builder for a list of steps to simplify test setup.
#[derive(Default)]
pub struct DagBuilder {
    steps: Vec<Step>,
}

impl DagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(self) -> Vec<Step> {
        self.steps
    }

    pub fn build(self) -> ExecutionGraph {
        ExecutionGraph::build(self.steps).expect("Failed to build valid graph from builder")
    }
}

/// Builder for a shell `Step`.
pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    pub fn new(name: &str, cmd: &str) -> Self {
        Self {
            step: Step::shell(name, cmd),
        }
    }

    /// A step whose command always succeeds.
    pub fn noop(name: &str) -> Self {
        Self::new(name, "true")
    }

    pub fn depends(mut self, dep: &str) -> Self {
        self.step.depends.push(dep.to_string());
        self
    }

    pub fn continue_on_failure(mut self) -> Self {
        self.step.continue_on.failure = true;
        self
    }

    pub fn continue_on_skipped(mut self) -> Self {
        self.step.continue_on.skipped = true;
        self
    }

    pub fn retry(mut self, limit: u32) -> Self {
        self.step.retry_policy.limit = limit;
        self
    }

    pub fn repeat(mut self, interval: Duration) -> Self {
        self.step.repeat_policy.enabled = true;
        self.step.repeat_policy.interval = interval;
        self
    }

    pub fn precondition(mut self, condition: &str, expected: &str) -> Self {
        self.step.preconditions.push(Condition {
            condition: condition.to_string(),
            expected: expected.to_string(),
        });
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.step.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.step.dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Step {
        self.step
    }
}
