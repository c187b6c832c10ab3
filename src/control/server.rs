// src/control/server.rs

//! Per-run control listener.
//!
//! The running agent answers `status` with a live snapshot and `stop` by
//! requesting cancellation. Each connection carries exactly one request.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::control::protocol::{ControlRequest, ControlResponse};
use crate::engine::RunHandle;
use crate::errors::{DagrunError, Result};

#[derive(Debug)]
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Bind the control socket at `path`.
    ///
    /// A socket file left behind by a dead agent is removed. If another
    /// agent still answers on it, the bind is refused with
    /// [`DagrunError::DagRunning`].
    pub async fn bind(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            if UnixStream::connect(&path).await.is_ok() {
                return Err(DagrunError::DagRunning);
            }
            debug!(path = %path.display(), "removing stale control socket");
            remove_socket(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "control server listening");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` fires, then remove the socket.
    pub async fn serve(self, run: Arc<RunHandle>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let run = Arc::clone(&run);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &run).await {
                                debug!(error = %e, "control connection failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "control accept failed"),
                },
                _ = shutdown.cancelled() => break,
            }
        }

        if let Err(e) = remove_socket(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove control socket");
        }
        debug!(path = %self.path.display(), "control server stopped");
    }
}

async fn handle_connection(stream: UnixStream, run: &RunHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let Some(line) = lines.next_line().await? else {
        return Ok(());
    };

    let response = match serde_json::from_str::<ControlRequest>(&line) {
        Ok(ControlRequest::Status) => ControlResponse::Status(Box::new(run.snapshot())),
        Ok(ControlRequest::Stop) => match run.request_stop().await {
            Ok(()) => ControlResponse::Stopped,
            Err(e) => ControlResponse::Error(e.to_string()),
        },
        Err(e) => ControlResponse::Error(format!("malformed request: {e}")),
    };

    let mut out = serde_json::to_vec(&response)?;
    out.push(b'\n');
    writer.write_all(&out).await?;
    writer.shutdown().await?;
    Ok(())
}

fn remove_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
