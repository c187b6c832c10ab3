// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running step commands, using
//! `tokio::process::Command`, and reporting back to the orchestration
//! runtime via `RuntimeEvent`s.
//!
//! - [`node_runner`] drives one node: preconditions, retry and repeat.
//! - [`precondition`] evaluates condition / expected-value checks.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod node_runner;
pub mod precondition;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use node_runner::{ExecContext, execute_node, run_node};
