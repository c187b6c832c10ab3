// src/control/address.rs

use std::path::{Path, PathBuf};

use crate::identity::DagIdentity;

/// Control socket of a DAG: `<socket_dir>/@dagrun-<name>-<digest>.sock`.
///
/// Stable for a given configuration path and distinct across paths, since
/// the digest is taken over the normalized path.
pub fn socket_path(socket_dir: &Path, dag: &DagIdentity) -> PathBuf {
    socket_dir.join(format!("@dagrun-{}.sock", dag.key()))
}
