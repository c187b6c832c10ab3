// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    /// Nothing is listening on the control address; the DAG is not running.
    #[error("DAG is not running: {0}")]
    NotRunning(#[source] std::io::Error),

    /// The control listener accepted the connection but never answered.
    #[error("DAG process is unresponsive (no answer within {0:?})")]
    Unresponsive(Duration),

    #[error("control protocol error: {0}")]
    Protocol(String),

    #[error("the DAG is running")]
    DagRunning,

    #[error("DAG preconditions not met: {0}")]
    PreconditionsNotMet(String),

    #[error("no status data for today")]
    NoStatusToday,

    #[error("status not found for run '{0}'")]
    StatusNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagrunError {
    /// True for the recoverable control-channel case where no listener
    /// exists and callers should fall back to persisted history.
    pub fn is_not_running(&self) -> bool {
        matches!(self, DagrunError::NotRunning(_))
    }

    /// True when a persisted status record simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DagrunError::NoStatusToday | DagrunError::StatusNotFound(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagrunError>;
