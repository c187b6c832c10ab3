// tests/agent_end_to_end.rs
//
// Whole runs: config file -> agent -> processes -> status files, observed
// and stopped through the controller.
#![cfg(unix)]

mod common;
use crate::common::{init_tracing, with_timeout, write_dag};

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;

use dagrun::agent::Agent;
use dagrun::config::{DagConfig, load_and_validate};
use dagrun::controller::{Controller, DagController};
use dagrun::errors::DagrunError;
use dagrun::settings::Settings;
use dagrun::types::{NodeStatus, SchedulerStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn load(path: &Path, settings: &Settings) -> DagConfig {
    load_and_validate(path, None, settings).expect("valid DAG file")
}

fn node_status(status: &dagrun::status::RunStatus, name: &str) -> NodeStatus {
    status
        .nodes
        .iter()
        .find(|n| n.name == name)
        .map(|n| n.status)
        .expect("node in snapshot")
}

#[tokio::test]
async fn successful_run_is_persisted_and_queryable() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let settings = Settings::with_base_dir(dir.path().join("home"));
    let out = dir.path().join("out.txt");
    let path = write_dag(
        dir.path(),
        "hello.toml",
        &format!(
            r#"
params = "world"

[step.first]
cmd = "echo first >> {out}"

[step.second]
cmd = "echo hello $1 >> {out}"
depends = ["first"]

[handler_on.exit]
cmd = "echo exit >> {out}"
"#,
            out = out.display()
        ),
    );

    let cfg = load(&path, &settings);
    let status = with_timeout(Agent::new(cfg.clone(), settings.clone()).run()).await?;

    assert_eq!(status.status, SchedulerStatus::Success);
    assert_eq!(node_status(&status, "first"), NodeStatus::Success);
    assert_eq!(node_status(&status, "second"), NodeStatus::Success);
    assert_eq!(status.params, vec!["world"]);
    let exit = status.on_exit.as_ref().ok_or("exit handler missing")?;
    assert_eq!(exit.status, NodeStatus::Success);
    assert_eq!(
        std::fs::read_to_string(&out)?,
        "first\nhello world\nexit\n"
    );

    // Per-node logs live under the default log dir.
    let log = status.nodes[0].log.clone().ok_or("no log path")?;
    assert!(log.starts_with(settings.logs_dir.join("hello")));

    let controller = DagController::new(cfg, &settings);
    assert_eq!(controller.get_status_by_run_id(&status.request_id)?, status);
    assert_eq!(controller.get_last_status().await?, status);
    assert_eq!(controller.get_status_history(5)?.len(), 1);

    let idle = controller.get_status().await?;
    assert_eq!(idle.status, SchedulerStatus::None);
    assert_eq!(idle.pid, None);
    assert!(!controller.stop().await?);
    Ok(())
}

#[tokio::test]
async fn unmet_dag_precondition_prevents_the_run() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let settings = Settings::with_base_dir(dir.path().join("home"));
    let marker = dir.path().join("ran");
    let path = write_dag(
        dir.path(),
        "gated.toml",
        &format!(
            r#"
preconditions = [{{ condition = "`echo closed`", expected = "open" }}]

[step.a]
cmd = "touch {}"
"#,
            marker.display()
        ),
    );

    let cfg = load(&path, &settings);
    let err = Agent::new(cfg.clone(), settings.clone()).run().await.unwrap_err();

    assert!(matches!(err, DagrunError::PreconditionsNotMet(_)), "got {err:?}");
    assert!(!marker.exists());
    assert!(DagController::new(cfg, &settings).get_status_history(5)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn retry_reruns_only_failed_branch() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let settings = Settings::with_base_dir(dir.path().join("home"));
    let counter = dir.path().join("a_runs");
    let gate = dir.path().join("gate");
    let path = write_dag(
        dir.path(),
        "pipeline.toml",
        &format!(
            r#"
[step.a]
cmd = "echo x >> {counter}"

[step.b]
cmd = "test -f {gate}"
depends = ["a"]

[step.c]
cmd = "true"
depends = ["b"]
"#,
            counter = counter.display(),
            gate = gate.display()
        ),
    );

    let first = with_timeout(Agent::new(load(&path, &settings), settings.clone()).run()).await?;
    assert_eq!(first.status, SchedulerStatus::Error);
    assert_eq!(node_status(&first, "a"), NodeStatus::Success);
    assert_eq!(node_status(&first, "b"), NodeStatus::Error);
    assert_eq!(node_status(&first, "c"), NodeStatus::Skipped);

    std::fs::write(&gate, "")?;

    let retried = with_timeout(
        Agent::new(load(&path, &settings), settings.clone())
            .retry_of(first.request_id.clone())
            .run(),
    )
    .await?;

    assert_eq!(retried.status, SchedulerStatus::Success);
    assert_ne!(retried.request_id, first.request_id);
    assert_eq!(node_status(&retried, "b"), NodeStatus::Success);
    assert_eq!(node_status(&retried, "c"), NodeStatus::Success);
    assert_eq!(std::fs::read_to_string(&counter)?.lines().count(), 1, "a is not re-run");
    Ok(())
}

#[tokio::test]
async fn retry_of_unknown_run_is_not_found() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let settings = Settings::with_base_dir(dir.path().join("home"));
    let path = write_dag(dir.path(), "x.toml", "[step.a]\ncmd = \"true\"\n");

    let err = Agent::new(load(&path, &settings), settings.clone())
        .retry_of("no-such-run")
        .run()
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn live_run_is_observed_guarded_and_stopped() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let settings = Settings::with_base_dir(dir.path().join("home"));
    let path = write_dag(
        dir.path(),
        "long.toml",
        r#"
[step.sleeper]
cmd = "sleep 30"

[step.after]
cmd = "true"
depends = ["sleeper"]

[handler_on.cancel]
cmd = "true"
"#,
    );

    let cfg = load(&path, &settings);
    let agent = tokio::spawn(Agent::new(cfg.clone(), settings.clone()).run());
    let controller = DagController::new(cfg.clone(), &settings);

    let live = with_timeout(async {
        loop {
            if let Ok(status) = controller.get_status().await {
                if node_status(&status, "sleeper") == NodeStatus::Running {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert_eq!(live.status, SchedulerStatus::Running);
    assert_eq!(live.pid, Some(std::process::id()));

    // One agent per DAG at a time.
    let second = Agent::new(cfg.clone(), settings.clone()).run().await.unwrap_err();
    assert!(matches!(second, DagrunError::DagRunning), "got {second:?}");

    // A running record cannot be corrected.
    let err = controller.update_status(&live).await.unwrap_err();
    assert!(matches!(err, DagrunError::DagRunning), "got {err:?}");

    assert!(controller.stop().await?);

    let finished = with_timeout(agent).await??;
    assert_eq!(finished.status, SchedulerStatus::Cancel);
    assert_eq!(node_status(&finished, "sleeper"), NodeStatus::Cancel);
    assert_eq!(node_status(&finished, "after"), NodeStatus::Cancel);
    let handler = finished.on_cancel.as_ref().ok_or("cancel handler missing")?;
    assert_eq!(handler.status, NodeStatus::Success);

    // Once stopped, the record can be corrected.
    let mut corrected = finished.clone();
    corrected.status = SchedulerStatus::Success;
    corrected.status_text = SchedulerStatus::Success.to_string();
    controller.update_status(&corrected).await?;
    assert_eq!(controller.get_status_by_run_id(&finished.request_id)?, corrected);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn detached_agent_is_reaped_after_exit() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let settings = Settings::with_base_dir(dir.path().join("home"));
    let path = write_dag(dir.path(), "quick.toml", "[step.a]\ncmd = \"true\"\n");
    let controller = DagController::new(load(&path, &settings), &settings);

    // `true` ignores its arguments and exits at once.
    let pid = controller.start(Path::new("true"), dir.path(), Some("x"))?;

    let proc_entry = Path::new("/proc").join(pid.to_string());
    with_timeout(async {
        while proc_entry.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    Ok(())
}
