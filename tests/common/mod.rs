#![allow(dead_code)]

pub use dagrun_test_utils::builders;
pub use dagrun_test_utils::{init_tracing, with_timeout};

use std::path::{Path, PathBuf};

/// Write a DAG file named `name` into `dir` and return its path.
pub fn write_dag(dir: &Path, name: &str, toml: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, toml).expect("write DAG file");
    path
}
