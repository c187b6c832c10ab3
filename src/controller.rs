// src/controller.rs

//! Operations external tooling performs on one DAG: start, retry, stop and
//! status queries against the live agent or its persisted history.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::config::{DagConfig, load_and_validate};
use crate::control::{ControlClient, socket_path};
use crate::errors::{DagrunError, Result};
use crate::identity::DagIdentity;
use crate::settings::Settings;
use crate::status::{RunStatus, StatusFile, StatusStore};

pub trait Controller {
    /// Ask the running DAG to stop. `Ok(false)` when nothing was running.
    fn stop(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Launch `bin start` as a detached process. Returns its pid.
    fn start(&self, bin: &Path, work_dir: &Path, params: Option<&str>) -> Result<u32>;

    /// Launch `bin retry --req <run_id>` as a detached process. Returns its pid.
    fn retry(&self, bin: &Path, work_dir: &Path, run_id: &str) -> Result<u32>;

    /// Live status; a default "not started" status when nothing is running.
    fn get_status(&self) -> impl Future<Output = Result<RunStatus>> + Send;

    /// Live status, else today's latest record, else the default status.
    fn get_last_status(&self) -> impl Future<Output = Result<RunStatus>> + Send;

    fn get_status_by_run_id(&self, run_id: &str) -> Result<RunStatus>;

    /// Up to `n` most recent records, newest first.
    fn get_status_history(&self, n: usize) -> Result<Vec<StatusFile>>;

    /// Correct a persisted record. Refused while that run is still running.
    fn update_status(&self, status: &RunStatus) -> impl Future<Output = Result<()>> + Send;
}

/// [`Controller`] bound to one loaded DAG definition.
#[derive(Debug, Clone)]
pub struct DagController {
    config: DagConfig,
    identity: DagIdentity,
    store: StatusStore,
    client: ControlClient,
}

impl DagController {
    pub fn new(config: DagConfig, settings: &Settings) -> Self {
        let identity = DagIdentity::from_config_path(&config.path);
        let client = ControlClient::new(socket_path(&settings.socket_dir, &identity));
        let store = StatusStore::new(&settings.data_dir, config.hist_retention_days);
        Self {
            config,
            identity,
            store,
            client,
        }
    }

    /// Load every DAG file (`*.toml`) in `dir`, sorted by file name.
    ///
    /// Files that fail to load are reported as messages next to the loaded
    /// configs instead of failing the whole listing.
    pub fn list_dags(dir: impl AsRef<Path>, settings: &Settings) -> (Vec<DagConfig>, Vec<String>) {
        let dir = dir.as_ref();
        let mut dags = Vec::new();
        let mut errors = Vec::new();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                errors.push(format!("invalid DAGs directory {}: {e}", dir.display()));
                return (dags, errors);
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        for file in files {
            match load_and_validate(&file, None, settings) {
                Ok(config) => dags.push(config),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "failed to load DAG file");
                    let name = file.file_name().unwrap_or_default().to_string_lossy();
                    errors.push(format!("reading {name} failed: {e}"));
                }
            }
        }
        (dags, errors)
    }

    pub fn with_client(mut self, client: ControlClient) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &DagConfig {
        &self.config
    }

    pub fn identity(&self) -> &DagIdentity {
        &self.identity
    }

    fn default_status(&self) -> RunStatus {
        RunStatus::not_started(&self.config.name, &self.config.steps)
    }

    fn spawn_detached(&self, bin: &Path, work_dir: &Path, args: Vec<String>) -> Result<u32> {
        let mut cmd = Command::new(bin);
        cmd.args(&args)
            .arg(self.config_path())
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();
        info!(bin = %bin.display(), ?args, pid, "launched detached agent");

        // Reap the agent when it exits so long-lived callers keep no zombies.
        std::thread::Builder::new()
            .name(format!("dagrun-reap-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => debug!(pid, %status, "detached agent exited"),
                Err(e) => warn!(pid, error = %e, "waiting for detached agent failed"),
            })?;
        Ok(pid)
    }

    fn config_path(&self) -> PathBuf {
        self.identity.path().to_path_buf()
    }
}

impl Controller for DagController {
    async fn stop(&self) -> Result<bool> {
        match self.client.stop().await {
            Ok(()) => {
                info!(dag = %self.config.name, "stop request accepted");
                Ok(true)
            }
            Err(e) if e.is_not_running() => {
                debug!(dag = %self.config.name, "stop requested but DAG is not running");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn start(&self, bin: &Path, work_dir: &Path, params: Option<&str>) -> Result<u32> {
        let mut args = vec!["start".to_string()];
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            args.push(format!("--params={params}"));
        }
        self.spawn_detached(bin, work_dir, args)
    }

    fn retry(&self, bin: &Path, work_dir: &Path, run_id: &str) -> Result<u32> {
        let args = vec!["retry".to_string(), format!("--req={run_id}")];
        self.spawn_detached(bin, work_dir, args)
    }

    async fn get_status(&self) -> Result<RunStatus> {
        match self.client.status().await {
            Ok(status) => Ok(status),
            Err(e) if e.is_not_running() => Ok(self.default_status()),
            Err(e) => Err(e),
        }
    }

    async fn get_last_status(&self) -> Result<RunStatus> {
        match self.client.status().await {
            Ok(status) => return Ok(status),
            Err(e) if e.is_not_running() => {}
            Err(e) => return Err(e),
        }
        match self.store.read_latest_today(&self.identity) {
            Ok(status) => Ok(status),
            Err(e) if e.is_not_found() => Ok(self.default_status()),
            Err(e) => {
                warn!(dag = %self.config.name, error = %e, "reading today's status failed");
                Err(e)
            }
        }
    }

    fn get_status_by_run_id(&self, run_id: &str) -> Result<RunStatus> {
        Ok(self.store.find_by_run_id(&self.identity, run_id)?.status)
    }

    fn get_status_history(&self, n: usize) -> Result<Vec<StatusFile>> {
        self.store.read_history(&self.identity, n)
    }

    async fn update_status(&self, status: &RunStatus) -> Result<()> {
        match self.client.status().await {
            Ok(live) if live.request_id == status.request_id && live.is_running() => {
                return Err(DagrunError::DagRunning);
            }
            Ok(_) => {}
            Err(e) if e.is_not_running() => {}
            Err(e) => return Err(e),
        }
        self.store.update_in_place(&self.identity, status)
    }
}
