// src/settings.rs

//! Host-level settings: where run history, step logs and control sockets live.
//!
//! Built once at startup with [`Settings::from_env`] and passed down
//! explicitly. Tests use [`Settings::with_base_dir`] instead of mutating the
//! process environment.

use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "DAGRUN__DATA";
pub const ENV_LOGS_DIR: &str = "DAGRUN__LOGS";
pub const ENV_SOCKET_DIR: &str = "DAGRUN__SOCKETS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root of persisted run status files.
    pub data_dir: PathBuf,
    /// Root of per-step log files (a DAG's default log dir lives below it).
    pub logs_dir: PathBuf,
    /// Directory holding control-channel sockets.
    pub socket_dir: PathBuf,
}

impl Settings {
    /// Resolve settings from `DAGRUN__*` environment variables, falling back
    /// to `~/.dagrun/{data,logs}` and the system temp dir for sockets.
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let base = home.join(".dagrun");

        Self {
            data_dir: env_path(ENV_DATA_DIR).unwrap_or_else(|| base.join("data")),
            logs_dir: env_path(ENV_LOGS_DIR).unwrap_or_else(|| base.join("logs")),
            socket_dir: env_path(ENV_SOCKET_DIR).unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Everything below a single directory (tests, sandboxes).
    pub fn with_base_dir(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            data_dir: base.join("data"),
            logs_dir: base.join("logs"),
            socket_dir: base.join("sock"),
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
