// src/config/validate.rs

//! Structural checks on a raw DAG file.
//!
//! Dependency resolution and cycle detection are left to
//! [`crate::dag::ExecutionGraph::build`], which reports them with the same
//! error kinds for configs and programmatic graphs alike.

use crate::config::model::{RawDagFile, StepConfig};
use crate::errors::{DagrunError, Result};

pub fn validate_raw_config(cfg: &RawDagFile) -> Result<()> {
    ensure_has_steps(cfg)?;

    for (name, step) in cfg.step.iter() {
        validate_step(&format!("step '{name}'"), step)?;
    }

    let handlers = [
        ("success", &cfg.handler_on.success),
        ("failure", &cfg.handler_on.failure),
        ("cancel", &cfg.handler_on.cancel),
        ("exit", &cfg.handler_on.exit),
    ];
    for (kind, handler) in handlers {
        if let Some(step) = handler {
            validate_handler(kind, step)?;
        }
    }

    Ok(())
}

fn ensure_has_steps(cfg: &RawDagFile) -> Result<()> {
    if cfg.step.is_empty() {
        return Err(DagrunError::ConfigError(
            "config must contain at least one [step.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_step(what: &str, step: &StepConfig) -> Result<()> {
    match (&step.cmd, &step.command) {
        (Some(_), Some(_)) => Err(DagrunError::ConfigError(format!(
            "{what} sets both `cmd` and `command`"
        ))),
        (Some(cmd), None) if cmd.trim().is_empty() => Err(DagrunError::ConfigError(format!(
            "{what} has an empty `cmd`"
        ))),
        (None, Some(command)) if command.trim().is_empty() => Err(DagrunError::ConfigError(
            format!("{what} has an empty `command`"),
        )),
        (None, None) => Err(DagrunError::ConfigError(format!(
            "{what} needs a `cmd` or `command`"
        ))),
        _ => Ok(()),
    }
}

fn validate_handler(kind: &str, step: &StepConfig) -> Result<()> {
    let what = format!("handler_on.{kind}");
    validate_step(&what, step)?;
    if !step.depends.is_empty() {
        return Err(DagrunError::ConfigError(format!(
            "{what} cannot declare `depends`"
        )));
    }
    Ok(())
}
