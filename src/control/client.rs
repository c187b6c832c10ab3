// src/control/client.rs

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::control::protocol::{ControlRequest, ControlResponse};
use crate::errors::{DagrunError, Result};
use crate::status::model::RunStatus;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Client side of a DAG's control socket.
///
/// Failures are classified so callers can tell "nothing is running"
/// ([`DagrunError::NotRunning`]) apart from "something is listening but
/// does not answer" ([`DagrunError::Unresponsive`]).
#[derive(Debug, Clone)]
pub struct ControlClient {
    addr: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(addr: impl Into<PathBuf>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &Path {
        &self.addr
    }

    /// Live snapshot of the running DAG.
    pub async fn status(&self) -> Result<RunStatus> {
        match self.request(ControlRequest::Status).await? {
            ControlResponse::Status(status) => Ok(*status),
            ControlResponse::Error(msg) => Err(DagrunError::Protocol(msg)),
            other => Err(unexpected(&other)),
        }
    }

    /// Ask the running DAG to cancel. Returns once the request is accepted.
    pub async fn stop(&self) -> Result<()> {
        match self.request(ControlRequest::Stop).await? {
            ControlResponse::Stopped => Ok(()),
            ControlResponse::Error(msg) => Err(DagrunError::Protocol(msg)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn request(&self, request: ControlRequest) -> Result<ControlResponse> {
        let stream = match timeout(self.timeout, UnixStream::connect(&self.addr)).await {
            Err(_) => return Err(DagrunError::Unresponsive(self.timeout)),
            Ok(Err(e)) if is_no_listener(&e) => return Err(DagrunError::NotRunning(e)),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(stream)) => stream,
        };

        timeout(self.timeout, exchange(stream, request))
            .await
            .map_err(|_| DagrunError::Unresponsive(self.timeout))?
    }
}

async fn exchange(stream: UnixStream, request: ControlRequest) -> Result<ControlResponse> {
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_vec(&request)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    match lines.next_line().await? {
        Some(reply) => Ok(serde_json::from_str(&reply)?),
        None => Err(DagrunError::Protocol(
            "connection closed without a response".to_string(),
        )),
    }
}

fn is_no_listener(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
    )
}

fn unexpected(response: &ControlResponse) -> DagrunError {
    DagrunError::Protocol(format!("unexpected response: {response:?}"))
}
