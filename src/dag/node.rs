// src/dag/node.rs

//! Runtime wrapper around one step for one run.
//!
//! A [`Node`] is shared (`Arc<Node>`) between the engine, the executor task
//! that runs it, and snapshot readers (status queries, persistence). Its
//! mutable state sits behind a per-node `RwLock`; no lock ever spans more
//! than one node. While a process is live the node also owns its pid and a
//! cancellation token that kills it.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dag::step::Step;
use crate::exec::precondition::expand_params;
use crate::types::{NodeStatus, Signal};

/// Process-lifetime-unique node identity.
pub type NodeId = usize;

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(1);

/// Mutable run state of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeState {
    pub status: NodeStatus,
    pub log: Option<PathBuf>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    pub retry_count: u32,
    pub done_count: u32,
    pub error: Option<String>,
}

/// Handle to the process currently executing for a node.
#[derive(Debug)]
struct LiveProcess {
    pid: Option<u32>,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct Node {
    id: NodeId,
    step: Step,
    state: RwLock<NodeState>,
    process: Mutex<Option<LiveProcess>>,
}

impl Node {
    pub fn new(step: Step) -> Self {
        Self::with_state(step, NodeState::default())
    }

    /// Build a node carrying state from an earlier run (retry).
    pub fn with_state(step: Step, state: NodeState) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            step,
            state: RwLock::new(state),
            process: Mutex::new(None),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn name(&self) -> &str {
        &self.step.name
    }

    /// Consistent copy of the whole state.
    pub fn state(&self) -> NodeState {
        self.read_state().clone()
    }

    pub fn read_status(&self) -> NodeStatus {
        self.read_state().status
    }

    pub fn read_retry_count(&self) -> u32 {
        self.read_state().retry_count
    }

    pub fn read_done_count(&self) -> u32 {
        self.read_state().done_count
    }

    /// Pid of the live process, if any.
    pub fn pid(&self) -> Option<u32> {
        self.lock_process().as_ref().and_then(|p| p.pid)
    }

    /// Run the step's command to completion.
    ///
    /// Output goes to the node's log file when one has been set up, otherwise
    /// to the inherited standard streams. The outcome is recorded in the
    /// node's `error` field. `extra_env` is applied before the step's own
    /// variables so the step wins on conflicts; positional parameters in
    /// the arguments are substituted from it. A process spawned after
    /// `run_cancel` fired is sent SIGTERM right away.
    pub async fn execute(
        &self,
        extra_env: &BTreeMap<String, String>,
        run_cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let result = self.execute_inner(extra_env, run_cancel).await;
        self.write_state().error = result.as_ref().err().map(|e| format!("{e:#}"));
        result
    }

    async fn execute_inner(
        &self,
        extra_env: &BTreeMap<String, String>,
        run_cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let mut cmd = Command::new(&self.step.command);
        cmd.args(self.step.args.iter().map(|a| expand_params(a, extra_env)))
            .envs(extra_env)
            .envs(&self.step.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(ref dir) = self.step.dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        match self.read_state().log.clone() {
            Some(path) => {
                let file = open_log_file(&path)?;
                let err_file = file
                    .try_clone()
                    .with_context(|| format!("cloning log handle {}", path.display()))?;
                cmd.stdout(Stdio::from(file)).stderr(Stdio::from(err_file));
            }
            None => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for step '{}'", self.step.name))?;

        let token = CancellationToken::new();
        *self.lock_process() = Some(LiveProcess {
            pid: child.id(),
            cancel: token.clone(),
        });

        debug!(node = %self.step.name, pid = ?child.id(), "process started");

        // A termination request that raced the spawn. The pid is registered
        // before this check, so a later request finds it through `signal`.
        if self.read_status() == NodeStatus::Cancel || run_cancel.is_cancelled() {
            if let Some(pid) = child.id() {
                send_signal(pid, Signal::Terminate);
            }
        }

        let outcome = tokio::select! {
            status = child.wait() => status
                .with_context(|| format!("waiting for process of step '{}'", self.step.name)),
            _ = token.cancelled() => {
                if let Some(pid) = child.id() {
                    send_signal(pid, Signal::Kill);
                }
                if let Err(e) = child.kill().await {
                    warn!(node = %self.step.name, error = %e, "failed to kill process");
                }
                Err(anyhow!("process killed"))
            }
        };

        // Release the process handle and cancellation trigger.
        self.lock_process().take();

        let status = outcome?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow!("{status}"))
        }
    }

    /// Forward `sig` to the live process and mark a running node canceled.
    pub fn signal(&self, sig: Signal) {
        {
            let mut state = self.write_state();
            if state.status == NodeStatus::Running {
                state.status = NodeStatus::Cancel;
            }
        }
        if let Some(pid) = self.pid() {
            debug!(node = %self.step.name, pid, ?sig, "forwarding signal");
            send_signal(pid, sig);
        }
    }

    /// Mark canceled unless already terminal and kill an in-progress execution.
    pub fn cancel(&self) {
        {
            let mut state = self.write_state();
            if !state.status.is_terminal() {
                state.status = NodeStatus::Cancel;
            }
        }
        if let Some(p) = self.lock_process().as_ref() {
            p.cancel.cancel();
        }
    }

    /// Choose the log path for this attempt and stamp the start time.
    pub(crate) fn setup_log(&self, log_dir: Option<&Path>) {
        let now = Local::now();
        let mut state = self.write_state();
        state.started_at = Some(now);
        state.log = log_dir.map(|dir| {
            dir.join(format!(
                "{}.{}.log",
                sanitize_file_name(&self.step.name),
                now.format("%Y%m%d.%H:%M:%S")
            ))
        });
    }

    /// Move to `Running` unless a cancellation already landed.
    pub(crate) fn start_running(&self) -> bool {
        let mut state = self.write_state();
        if state.status == NodeStatus::Cancel {
            return false;
        }
        state.status = NodeStatus::Running;
        true
    }

    /// Record a terminal status. A cancellation that already landed wins.
    pub(crate) fn finish(&self, status: NodeStatus) -> NodeStatus {
        let mut state = self.write_state();
        if state.status != NodeStatus::Cancel {
            state.status = status;
        }
        state.finished_at = Some(Local::now());
        state.status
    }

    pub(crate) fn inc_retry_count(&self) {
        self.write_state().retry_count += 1;
    }

    pub(crate) fn inc_done_count(&self) {
        self.write_state().done_count += 1;
    }

    /// Make the node eligible to run again in a retry.
    pub(crate) fn reset_for_retry(&self) {
        let mut state = self.write_state();
        state.status = NodeStatus::None;
        state.retry_count = 0;
        state.done_count = 0;
    }

    fn read_state(&self) -> RwLockReadGuard<'_, NodeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, NodeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_process(&self) -> MutexGuard<'_, Option<LiveProcess>> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_log_file(path: &Path) -> anyhow::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log dir {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

/// Replace anything that is not safe in a file name with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Signal the process group led by `pid` (nodes spawn as group leaders).
#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, sig: Signal) {
    use nix::sys::signal::{Signal as NixSignal, killpg};
    use nix::unistd::Pid;

    let nix_sig = match sig {
        Signal::Interrupt => NixSignal::SIGINT,
        Signal::Terminate => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), nix_sig) {
        debug!(pid, error = %e, "signal delivery failed (process likely gone)");
    }
}

#[cfg(not(unix))]
pub(crate) fn send_signal(pid: u32, sig: Signal) {
    debug!(pid, ?sig, "signal forwarding unsupported on this platform");
}
