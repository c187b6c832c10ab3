// src/control/protocol.rs

//! Wire format of the control channel.
//!
//! Each exchange is one request line and one response line, both JSON.
//!
//! ```text
//! -> {"method":"status"}
//! <- {"type":"status","body":{"Pid":4242,"Status":1,"StatusText":"running",...}}
//! -> {"method":"stop"}
//! <- {"type":"stopped"}
//! ```

use serde::{Deserialize, Serialize};

use crate::status::model::RunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ControlRequest {
    Status,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "lowercase")]
pub enum ControlResponse {
    Status(Box<RunStatus>),
    /// The stop request was accepted; wind-down continues in the background.
    Stopped,
    Error(String),
}
