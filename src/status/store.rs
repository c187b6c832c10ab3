// src/status/store.rs

//! Append-oriented persistence of run snapshots.
//!
//! Layout, one directory per DAG identity:
//!
//! ```text
//! <data_dir>/<name>-<digest>/<name>.<YYYYMMDD>.<HHMMSS>.<mmm>.<run_id>.dat
//! ```
//!
//! Each file belongs to one run and holds its snapshots as JSON lines; the
//! last line is the current record. File names sort by start time, so the
//! newest file dated today is that day's current pointer.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::errors::{DagrunError, Result};
use crate::identity::DagIdentity;
use crate::status::model::RunStatus;

const EXTENSION: &str = "dat";
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// A persisted record together with the file that holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFile {
    pub file: PathBuf,
    pub status: RunStatus,
}

#[derive(Debug, Clone)]
pub struct StatusStore {
    data_dir: PathBuf,
    /// Days of history kept by [`StatusStore::prune`]; 0 keeps everything.
    retention_days: u32,
}

impl StatusStore {
    pub fn new(data_dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            data_dir: data_dir.into(),
            retention_days,
        }
    }

    /// Directory holding every record of one DAG.
    pub fn dag_dir(&self, dag: &DagIdentity) -> PathBuf {
        self.data_dir.join(dag.key())
    }

    /// Create the file for a new run and return a writer appending to it.
    pub fn open(
        &self,
        dag: &DagIdentity,
        started_at: DateTime<Local>,
        run_id: &str,
    ) -> Result<StatusWriter> {
        let dir = self.dag_dir(dag);
        fs::create_dir_all(&dir)?;
        let file = dir.join(format!(
            "{}.{}.{run_id}.{EXTENSION}",
            dag.name(),
            started_at.format("%Y%m%d.%H%M%S.%3f"),
        ));
        debug!(file = %file.display(), "opening status file");
        StatusWriter::open(file)
    }

    /// Append a snapshot to its run's file, creating the file if needed.
    pub fn write(&self, dag: &DagIdentity, status: &RunStatus) -> Result<PathBuf> {
        let mut writer = match self.find_file(dag, &status.request_id)? {
            Some(file) => StatusWriter::open(file)?,
            None => self.open(
                dag,
                status.started_at.unwrap_or_else(Local::now),
                &status.request_id,
            )?,
        };
        writer.write(status)?;
        writer.close()
    }

    /// Most recent record written today.
    pub fn read_latest_today(&self, dag: &DagIdentity) -> Result<RunStatus> {
        let today = Local::now().format("%Y%m%d").to_string();
        let file = self
            .list_files(dag)?
            .into_iter()
            .find(|f| parse_file_name(f).is_some_and(|(date, _)| date == today))
            .ok_or(DagrunError::NoStatusToday)?;
        read_last_record(&file)
    }

    /// Locate the record of one run.
    pub fn find_by_run_id(&self, dag: &DagIdentity, run_id: &str) -> Result<StatusFile> {
        let file = self
            .find_file(dag, run_id)?
            .ok_or_else(|| DagrunError::StatusNotFound(run_id.to_string()))?;
        let status = read_last_record(&file)?;
        if status.request_id != run_id {
            return Err(DagrunError::StatusNotFound(run_id.to_string()));
        }
        Ok(StatusFile { file, status })
    }

    /// Up to `n` most recent records, newest first, across days.
    ///
    /// Unreadable files are logged and skipped.
    pub fn read_history(&self, dag: &DagIdentity, n: usize) -> Result<Vec<StatusFile>> {
        let mut out = Vec::new();
        for file in self.list_files(dag)? {
            if out.len() >= n {
                break;
            }
            match read_last_record(&file) {
                Ok(status) => out.push(StatusFile { file, status }),
                Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable status file"),
            }
        }
        Ok(out)
    }

    /// Replace the stored record of `status.request_id` with `status`.
    ///
    /// The rewrite goes to a sibling temp file that is renamed over the
    /// original; the writer is closed (or dropped) on every path.
    pub fn update_in_place(&self, dag: &DagIdentity, status: &RunStatus) -> Result<()> {
        let target = self.find_by_run_id(dag, &status.request_id)?.file;
        let tmp = target.with_extension("tmp");

        if let Err(e) = write_single(tmp.clone(), status) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &target)?;
        info!(run_id = %status.request_id, file = %target.display(), "status record updated");
        Ok(())
    }

    /// Delete records older than the retention window. Returns how many
    /// files were removed.
    pub fn prune(&self, dag: &DagIdentity) -> Result<usize> {
        if self.retention_days == 0 {
            return Ok(0);
        }
        let Some(cutoff) = SystemTime::now().checked_sub(DAY * self.retention_days) else {
            return Ok(0);
        };

        let mut removed = 0;
        for file in self.list_files(dag)? {
            let modified = fs::metadata(&file).and_then(|m| m.modified())?;
            if modified < cutoff {
                debug!(file = %file.display(), "pruning old status file");
                fs::remove_file(&file)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn find_file(&self, dag: &DagIdentity, run_id: &str) -> Result<Option<PathBuf>> {
        if run_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .list_files(dag)?
            .into_iter()
            .find(|f| parse_file_name(f).is_some_and(|(_, id)| id == run_id)))
    }

    /// Status files of a DAG, newest first.
    fn list_files(&self, dag: &DagIdentity) -> Result<Vec<PathBuf>> {
        let dir = self.dag_dir(dag);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                files.push(path);
            }
        }
        files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(files)
    }
}

/// Appends JSON-line snapshots to one status file.
#[derive(Debug)]
pub struct StatusWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl StatusWriter {
    /// Open for appending, creating the file if missing.
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, status: &RunStatus) -> Result<()> {
        serde_json::to_writer(&mut self.out, status)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }

    /// Flush and release the file handle.
    pub fn close(mut self) -> Result<PathBuf> {
        self.out.flush()?;
        Ok(self.path)
    }
}

/// Truncate `path` and write exactly one record to it.
fn write_single(path: PathBuf, status: &RunStatus) -> Result<PathBuf> {
    let mut writer = StatusWriter::create(path)?;
    writer.write(status)?;
    writer.close()
}

/// Last non-empty JSON line of a status file.
fn read_last_record(path: &Path) -> Result<RunStatus> {
    let contents = fs::read_to_string(path)?;
    let line = contents
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| DagrunError::StatusNotFound(path.display().to_string()))?;
    RunStatus::from_json(line)
}

/// `(date, run_id)` from `<name>.<YYYYMMDD>.<HHMMSS>.<mmm>.<run_id>.dat`.
fn parse_file_name(path: &Path) -> Option<(String, String)> {
    let file_name = path.file_name()?.to_str()?;
    let mut parts = file_name.rsplitn(6, '.');
    let _ext = parts.next()?;
    let run_id = parts.next()?;
    let _millis = parts.next()?;
    let _time = parts.next()?;
    let date = parts.next()?;
    Some((date.to_string(), run_id.to_string()))
}
