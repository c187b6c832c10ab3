// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::config::model::{DagConfig, HandlerSteps, RawDagFile, StepConfig};
use crate::config::validate::validate_raw_config;
use crate::dag::node::sanitize_file_name;
use crate::dag::{RepeatPolicy, RetryPolicy, Step};
use crate::errors::Result;
use crate::settings::Settings;

/// Read and deserialize a DAG file without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawDagFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawDagFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a DAG file, validate it and apply defaults.
///
/// - `params_override` replaces the file's `params` string when given.
/// - Step working directories default to the config file's directory.
/// - `log_dir` defaults to `<settings.logs_dir>/<sanitized name>`.
pub fn load_and_validate(
    path: impl AsRef<Path>,
    params_override: Option<&str>,
    settings: &Settings,
) -> Result<DagConfig> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    validate_raw_config(&raw)?;

    let base_dir = config_dir(path);
    let name = raw
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| file_stem(path));

    let log_dir = match raw.log_dir {
        Some(ref dir) => resolve(&base_dir, dir),
        None => settings.logs_dir.join(sanitize_file_name(&name)),
    };

    let steps = raw
        .step
        .iter()
        .map(|(step_name, cfg)| build_step(step_name, cfg, &base_dir))
        .collect();

    let handler = |kind: &str, cfg: &Option<StepConfig>| {
        cfg.as_ref()
            .map(|c| build_step(&format!("on_{kind}"), c, &base_dir))
    };
    let handlers = HandlerSteps {
        on_success: handler("success", &raw.handler_on.success),
        on_failure: handler("failure", &raw.handler_on.failure),
        on_cancel: handler("cancel", &raw.handler_on.cancel),
        on_exit: handler("exit", &raw.handler_on.exit),
    };

    let params = parse_params(params_override.unwrap_or(&raw.params));
    debug!(dag = %name, steps = raw.step.len(), ?params, "loaded DAG config");

    Ok(DagConfig {
        path: path.to_path_buf(),
        name,
        description: raw.description,
        env: raw.env,
        params,
        steps,
        handlers,
        preconditions: raw.preconditions,
        log_dir,
        max_active_runs: raw.max_active_runs,
        max_cleanup_time: Duration::from_secs(raw.max_cleanup_time_sec),
        hist_retention_days: raw.hist_retention_days,
        delay: Duration::from_secs(raw.delay_sec),
    })
}

fn build_step(name: &str, cfg: &StepConfig, base_dir: &Path) -> Step {
    let mut step = match (&cfg.cmd, &cfg.command) {
        (Some(cmd), _) => Step::shell(name, cmd),
        (None, Some(command)) => Step {
            args: cfg.args.clone(),
            ..Step::new(name, command.clone())
        },
        // Rejected by validation.
        (None, None) => Step::new(name, String::new()),
    };

    step.description = cfg.description.clone();
    step.dir = Some(match cfg.dir {
        Some(ref dir) => resolve(base_dir, dir),
        None => base_dir.to_path_buf(),
    });
    step.env = cfg.env.clone();
    step.depends = cfg.depends.clone();
    step.continue_on = cfg.continue_on;
    step.retry_policy = RetryPolicy {
        limit: cfg.retry_policy.map(|p| p.limit).unwrap_or(0),
    };
    step.repeat_policy = cfg
        .repeat_policy
        .map(|p| RepeatPolicy {
            enabled: p.repeat,
            interval: Duration::from_secs(p.interval_sec),
        })
        .unwrap_or_default();
    step.preconditions = cfg.preconditions.clone();
    step.mail_on_error = cfg.mail_on_error;
    step
}

/// Split a parameter string on whitespace; double quotes group words and
/// are stripped.
///
/// `a "b c" d` yields `["a", "b c", "d"]`.
pub fn parse_params(input: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    params.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        params.push(current);
    }
    params
}

/// Directory of the config file; `.` for a bare file name.
fn config_dir(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if dir.is_absolute() {
        return dir;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&dir))
        .unwrap_or(dir)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dag".to_string())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
