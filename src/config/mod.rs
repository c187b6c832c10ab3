// src/config/mod.rs

//! DAG definition files.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a file from disk and apply defaults (`loader.rs`).
//! - Validate structural invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_params};
pub use model::{DagConfig, HandlerSteps, RawDagFile, StepConfig};
pub use validate::validate_raw_config;
