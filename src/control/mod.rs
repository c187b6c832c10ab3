// src/control/mod.rs

//! Local control channel between CLI invocations and a running agent.

pub mod address;
pub mod client;
pub mod protocol;
pub mod server;

pub use address::socket_path;
pub use client::ControlClient;
pub use protocol::{ControlRequest, ControlResponse};
pub use server::ControlServer;
