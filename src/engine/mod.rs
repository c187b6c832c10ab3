// src/engine/mod.rs

//! Orchestration engine for dagrun.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the main runtime event loop that reacts to:
//!   - node completion events
//!   - cancellation requests (control channel, signals)
//!   - the wind-down deadline after a cancellation
//! - lifecycle handlers and status snapshots
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`run_handle`] is the shared, read-mostly
//! view of a live run used by status queries and stop requests.

use std::path::PathBuf;
use std::time::Duration;

use crate::dag::NodeId;
use crate::types::NodeStatus;

/// Default bound on how long a cancellation waits for processes to exit.
pub const DEFAULT_MAX_CLEANUP_TIME: Duration = Duration::from_secs(300);

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Concurrency cap on running nodes; 0 means unlimited.
    pub max_active_runs: usize,
    /// How long a cancellation waits before force-killing processes.
    pub max_cleanup_time: Duration,
    /// Pause before each node launch.
    pub delay: Duration,
    /// Where node logs go; `None` inherits the engine's streams.
    pub log_dir: Option<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_active_runs: 0,
            max_cleanup_time: DEFAULT_MAX_CLEANUP_TIME,
            delay: Duration::ZERO,
            log_dir: None,
        }
    }
}

/// Events flowing into the runtime from executors, the control channel and
/// signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched node reached a terminal status.
    NodeFinished { node: NodeId, status: NodeStatus },
    /// Stop the run (control channel stop, SIGINT/SIGTERM).
    CancelRequested,
    /// The wind-down bound after cancellation elapsed.
    CleanupDeadlineElapsed,
}

pub mod core;
pub mod event_handlers;
pub mod run_handle;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use run_handle::{Handlers, RunHandle};
pub use runtime::Runtime;
