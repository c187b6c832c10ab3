// src/identity.rs

//! Stable identity of a DAG, derived from its configuration path.
//!
//! Both the status store (one directory per DAG) and the control channel
//! (one socket per DAG) key off this. The digest is a blake3 hash of the
//! absolute, lexically normalized path, so the same file always maps to the
//! same identity and distinct files do not collide.

use std::path::{Component, Path, PathBuf};

use crate::dag::node::sanitize_file_name;

/// Characters of the digest used in names.
const DIGEST_LEN: usize = 16;
/// Longest readable name prefix (socket paths are length-limited).
const MAX_NAME_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DagIdentity {
    path: PathBuf,
    name: String,
}

impl DagIdentity {
    pub fn from_config_path(config_path: impl AsRef<Path>) -> Self {
        let path = normalize(config_path.as_ref());
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dag".to_string());

        Self {
            name: sanitize_file_name(&stem),
            path,
        }
    }

    /// Normalized configuration path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File-name-safe stem of the config file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hex digest of the normalized path.
    pub fn digest(&self) -> String {
        let hash = blake3::hash(self.path.to_string_lossy().as_bytes());
        hash.to_hex()[..DIGEST_LEN].to_string()
    }

    /// `<name>-<digest>`, truncated so it fits in a socket path.
    pub fn key(&self) -> String {
        let name: String = self.name.chars().take(MAX_NAME_LEN).collect();
        format!("{name}-{}", self.digest())
    }
}

/// Make `path` absolute and resolve `.`/`..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
