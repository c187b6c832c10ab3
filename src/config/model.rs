// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::{Condition, ContinueOn, Step};
use crate::engine::RuntimeOptions;

/// DAG definition as read from a TOML file.
///
/// ```toml
/// name = "nightly"
/// params = "2024-01-01 full"
/// max_active_runs = 2
///
/// [env]
/// TARGET = "/srv/backup"
///
/// [step.extract]
/// cmd = "./extract.sh $1"
///
/// [step.load]
/// command = "python3"
/// args = ["load.py"]
/// depends = ["extract"]
/// retry_policy = { limit = 2 }
///
/// [handler_on.failure]
/// cmd = "notify-send 'nightly failed'"
/// ```
///
/// Use [`crate::config::load_and_validate`] to turn it into a [`DagConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDagFile {
    /// Defaults to the file stem.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Run-wide environment, applied to every step and handler.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Default parameter string; `--params` on the command line replaces it.
    #[serde(default)]
    pub params: String,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 0 means unlimited.
    #[serde(default)]
    pub max_active_runs: usize,

    #[serde(default = "default_max_cleanup_time_sec")]
    pub max_cleanup_time_sec: u64,

    /// 0 keeps history forever.
    #[serde(default = "default_hist_retention_days")]
    pub hist_retention_days: u32,

    /// Pause before each step launch.
    #[serde(default)]
    pub delay_sec: u64,

    /// Conditions that must all hold for the run to start at all.
    #[serde(default)]
    pub preconditions: Vec<Condition>,

    /// All steps from `[step.<name>]`.
    #[serde(default)]
    pub step: BTreeMap<String, StepConfig>,

    #[serde(default)]
    pub handler_on: HandlerOnConfig,
}

fn default_max_cleanup_time_sec() -> u64 {
    300
}

fn default_hist_retention_days() -> u32 {
    7
}

/// `[step.<name>]` and `[handler_on.<kind>]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepConfig {
    /// Shell command line, run through `sh -c`.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Program to execute directly; mutually exclusive with `cmd`.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub description: String,

    /// Working directory; relative paths are resolved against the config
    /// file's directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default)]
    pub continue_on: ContinueOn,

    #[serde(default)]
    pub retry_policy: Option<RetryPolicyConfig>,

    #[serde(default)]
    pub repeat_policy: Option<RepeatPolicyConfig>,

    #[serde(default)]
    pub preconditions: Vec<Condition>,

    #[serde(default)]
    pub mail_on_error: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default)]
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RepeatPolicyConfig {
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub interval_sec: u64,
}

/// `[handler_on.*]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlerOnConfig {
    #[serde(default)]
    pub success: Option<StepConfig>,
    #[serde(default)]
    pub failure: Option<StepConfig>,
    #[serde(default)]
    pub cancel: Option<StepConfig>,
    #[serde(default)]
    pub exit: Option<StepConfig>,
}

/// Lifecycle handler steps of a loaded DAG.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSteps {
    pub on_success: Option<Step>,
    pub on_failure: Option<Step>,
    pub on_cancel: Option<Step>,
    pub on_exit: Option<Step>,
}

/// A validated, fully defaulted DAG definition.
#[derive(Debug, Clone)]
pub struct DagConfig {
    /// Path the definition was loaded from.
    pub path: PathBuf,
    pub name: String,
    pub description: String,
    pub env: BTreeMap<String, String>,
    /// Positional parameters, exposed to steps as `$1`, `$2`, ...
    pub params: Vec<String>,
    pub steps: Vec<Step>,
    pub handlers: HandlerSteps,
    pub preconditions: Vec<Condition>,
    pub log_dir: PathBuf,
    pub max_active_runs: usize,
    pub max_cleanup_time: Duration,
    pub hist_retention_days: u32,
    pub delay: Duration,
}

impl DagConfig {
    /// Engine options for a run of this DAG.
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            max_active_runs: self.max_active_runs,
            max_cleanup_time: self.max_cleanup_time,
            delay: self.delay,
            log_dir: Some(self.log_dir.clone()),
        }
    }

    /// Environment shared by every step of a run: the DAG `env` plus the
    /// positional parameters.
    pub fn run_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        for (i, value) in self.params.iter().enumerate() {
            env.insert((i + 1).to_string(), value.clone());
        }
        env
    }
}
