// src/exec/precondition.rs

//! Condition / expected-value checks that gate whether a node runs.
//!
//! A condition is evaluated to an observed string:
//! - `` `cmd` `` (backtick-enclosed) runs `cmd` through the shell and uses
//!   its trimmed stdout;
//! - anything else has `$VAR` / `${VAR}` expanded from the run environment,
//!   then the process environment.
//!
//! The precondition holds when the observed value equals `expected`.
//! Commands run in their own process group, which is killed if the
//! evaluation future is dropped before the command exits.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{Context, bail};
use regex::{Captures, Regex};
use tokio::process::Command;
use tracing::debug;

use crate::dag::Condition;
use crate::dag::node::send_signal;
use crate::types::Signal;

static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^`(.*)`$").expect("valid command regex"));

static PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([0-9]+)\}|\$([0-9]+)").expect("valid parameter regex"));

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+)\}|\$([A-Za-z0-9_]+)").expect("valid variable regex")
});

/// `Ok(true)` when every condition holds.
pub async fn check_preconditions(
    conditions: &[Condition],
    env: &BTreeMap<String, String>,
) -> anyhow::Result<bool> {
    for cond in conditions {
        let observed = eval_condition(&cond.condition, env).await?;
        if observed != cond.expected {
            debug!(
                condition = %cond.condition,
                expected = %cond.expected,
                observed = %observed,
                "precondition not met"
            );
            return Ok(false);
        }
    }
    Ok(true)
}

/// Observed value of a single condition string.
pub async fn eval_condition(condition: &str, env: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let Some(caps) = COMMAND_RE.captures(condition.trim()) else {
        return Ok(expand_vars(condition, env));
    };
    let script = expand_vars(&caps[1], env);

    let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
    let mut cmd = Command::new(shell);
    cmd.arg(flag)
        .arg(&script)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd
        .spawn()
        .with_context(|| format!("running precondition command '{script}'"))?;
    let group = GroupGuard(child.id());
    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for precondition command '{script}'"))?;
    group.disarm();

    if !output.status.success() {
        bail!("precondition command '{script}' exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Kills the command's process group if evaluation is abandoned midway.
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.0.take() {
            send_signal(pid, Signal::Kill);
        }
    }
}

/// Expand `$VAR` and `${VAR}`; unknown variables expand to "".
pub fn expand_vars(input: &str, env: &BTreeMap<String, String>) -> String {
    VAR_RE
        .replace_all(input, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            env.get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Substitute positional parameter references (`$1`, `${2}`) from `env`.
///
/// Other variables are left for the shell. Unknown positions expand to "".
pub fn expand_params(input: &str, env: &BTreeMap<String, String>) -> String {
    PARAM_RE
        .replace_all(input, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            env.get(name).cloned().unwrap_or_default()
        })
        .into_owned()
}
