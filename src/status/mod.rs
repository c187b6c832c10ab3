// src/status/mod.rs

//! Run snapshots and their persistence.
//!
//! - [`model`] defines the JSON-shaped [`RunStatus`] / [`NodeSnapshot`].
//! - [`store`] persists them, one stream per DAG identity per day.

pub mod model;
pub mod store;

pub use model::{NodeSnapshot, RunStatus};
pub use store::{StatusFile, StatusStore, StatusWriter};
