// tests/node_execution.rs
//
// Real processes through `sh`; unix only.
#![cfg(unix)]

mod common;
use crate::common::builders::StepBuilder;
use crate::common::{init_tracing, with_timeout};

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use dagrun::dag::Node;
use dagrun::exec::{ExecContext, execute_node};
use dagrun::types::{NodeStatus, Signal};

type TestResult = Result<(), Box<dyn Error>>;

fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

async fn wait_for_pid(node: &Node) {
    with_timeout(async {
        while node.pid().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn unmet_precondition_skips_without_launching() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let marker = dir.path().join("ran");

    let node = Node::new(
        StepBuilder::new("guarded", &format!("touch {}", marker.display()))
            .precondition("`echo no`", "yes")
            .build(),
    );

    let status = with_timeout(execute_node(&node, &ExecContext::default())).await;

    assert_eq!(status, NodeStatus::Skipped);
    assert_eq!(node.read_status(), NodeStatus::Skipped);
    assert!(!marker.exists(), "command must not run");
    assert!(node.state().started_at.is_none());
    Ok(())
}

#[tokio::test]
async fn precondition_reads_run_environment() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let marker = dir.path().join("ran");

    let node = Node::new(
        StepBuilder::new("flagged", &format!("touch {}", marker.display()))
            .precondition("$FLAG", "on")
            .build(),
    );
    let ctx = ExecContext {
        env: BTreeMap::from([("FLAG".to_string(), "on".to_string())]),
        ..ExecContext::default()
    };

    assert_eq!(with_timeout(execute_node(&node, &ctx)).await, NodeStatus::Success);
    assert!(marker.exists());
    Ok(())
}

#[tokio::test]
async fn retry_limit_k_means_k_plus_one_attempts() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let counter = dir.path().join("attempts");

    let node = Node::new(
        StepBuilder::new("flaky", &format!("echo x >> {}; exit 1", counter.display()))
            .retry(2)
            .build(),
    );

    let status = with_timeout(execute_node(&node, &ExecContext::default())).await;

    assert_eq!(status, NodeStatus::Error);
    assert_eq!(line_count(&counter), 3);
    assert_eq!(node.read_retry_count(), 2);
    assert!(node.state().error.is_some());
    Ok(())
}

#[tokio::test]
async fn retry_stops_at_first_success() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let counter = dir.path().join("attempts");
    let c = counter.display();

    let node = Node::new(
        StepBuilder::new(
            "eventually",
            &format!("echo x >> {c}; [ $(wc -l < {c}) -ge 2 ]"),
        )
        .retry(3)
        .build(),
    );

    let status = with_timeout(execute_node(&node, &ExecContext::default())).await;

    assert_eq!(status, NodeStatus::Success);
    assert_eq!(line_count(&counter), 2);
    assert_eq!(node.read_retry_count(), 1);
    Ok(())
}

#[tokio::test]
async fn repeat_runs_until_canceled() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let counter = dir.path().join("ticks");

    let node = Arc::new(Node::new(
        StepBuilder::new("ticker", &format!("echo x >> {}", counter.display()))
            .repeat(Duration::from_millis(30))
            .build(),
    ));
    let ctx = ExecContext::default();
    let cancel = ctx.cancel.clone();

    let task = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { execute_node(&node, &ctx).await })
    };

    with_timeout(async {
        while line_count(&counter) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    cancel.cancel();

    let status = with_timeout(task).await?;
    assert_eq!(status, NodeStatus::Cancel);
    assert!(node.read_done_count() >= 2);
    Ok(())
}

#[tokio::test]
async fn repeat_ends_on_first_failure() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let counter = dir.path().join("ticks");
    let c = counter.display();

    let node = Node::new(
        StepBuilder::new("until_three", &format!("echo x >> {c}; [ $(wc -l < {c}) -lt 3 ]"))
            .repeat(Duration::from_millis(10))
            .build(),
    );

    let status = with_timeout(execute_node(&node, &ExecContext::default())).await;
    assert_eq!(status, NodeStatus::Error);
    assert_eq!(node.read_done_count(), 2);
    Ok(())
}

#[tokio::test]
async fn output_goes_to_a_per_node_log_file() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let node = Node::new(StepBuilder::new("say hello", "echo hello; echo oops 1>&2").build());
    let ctx = ExecContext {
        log_dir: Some(dir.path().join("logs")),
        ..ExecContext::default()
    };

    assert_eq!(with_timeout(execute_node(&node, &ctx)).await, NodeStatus::Success);

    let log = node.state().log.ok_or("no log path")?;
    let file_name = log.file_name().ok_or("no file name")?.to_string_lossy().into_owned();
    assert!(file_name.starts_with("say_hello."), "got {file_name}");
    assert!(file_name.ends_with(".log"));

    let contents = std::fs::read_to_string(&log)?;
    assert!(contents.contains("hello"));
    assert!(contents.contains("oops"));
    Ok(())
}

#[tokio::test]
async fn working_dir_and_env_are_applied() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let node = Node::new(
        StepBuilder::new("where", "pwd > out.txt; echo \"$GREETING $1\" >> out.txt")
            .dir(dir.path())
            .env("GREETING", "hi")
            .build(),
    );
    let ctx = ExecContext {
        env: BTreeMap::from([
            ("GREETING".to_string(), "overridden".to_string()),
            ("1".to_string(), "there".to_string()),
        ]),
        ..ExecContext::default()
    };

    assert_eq!(with_timeout(execute_node(&node, &ctx)).await, NodeStatus::Success);

    let out = std::fs::read_to_string(dir.path().join("out.txt"))?;
    assert!(out.contains("hi there"), "got {out}");
    Ok(())
}

#[tokio::test]
async fn cancel_kills_a_running_process() -> TestResult {
    init_tracing();

    let node = Arc::new(Node::new(StepBuilder::new("sleeper", "sleep 30").build()));
    let task = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { execute_node(&node, &ExecContext::default()).await })
    };

    wait_for_pid(&node).await;
    assert_eq!(node.read_status(), NodeStatus::Running);
    node.cancel();

    assert_eq!(with_timeout(task).await?, NodeStatus::Cancel);
    assert!(node.pid().is_none(), "process handle released");
    Ok(())
}

#[tokio::test]
async fn terminate_signal_marks_running_node_canceled() -> TestResult {
    init_tracing();

    let node = Arc::new(Node::new(
        StepBuilder::new("sleeper", "sleep 30").retry(5).build(),
    ));
    let task = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { execute_node(&node, &ExecContext::default()).await })
    };

    wait_for_pid(&node).await;
    node.signal(Signal::Terminate);

    // A canceled node is never retried.
    assert_eq!(with_timeout(task).await?, NodeStatus::Cancel);
    assert_eq!(node.read_retry_count(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_program_is_a_launch_failure() -> TestResult {
    init_tracing();

    let node = Node::new(dagrun::dag::Step::new("ghost", "/definitely/not/a/program"));
    let status = with_timeout(execute_node(&node, &ExecContext::default())).await;

    assert_eq!(status, NodeStatus::Error);
    let error = node.state().error.ok_or("no error recorded")?;
    assert!(error.contains("ghost"), "got {error}");
    Ok(())
}

#[tokio::test]
async fn node_canceled_before_launch_never_starts() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let marker = dir.path().join("ran");

    let node = Node::new(StepBuilder::new("late", &format!("touch {}", marker.display())).build());
    node.cancel();

    let status = with_timeout(execute_node(&node, &ExecContext::default())).await;

    assert_eq!(status, NodeStatus::Cancel);
    assert!(!marker.exists(), "command must not run");
    Ok(())
}

#[tokio::test]
async fn process_spawned_after_run_cancel_is_terminated() -> TestResult {
    init_tracing();

    let node = Node::new(StepBuilder::new("sleeper", "sleep 30").build());
    let run_cancel = CancellationToken::new();
    run_cancel.cancel();

    let begun = std::time::Instant::now();
    let result = with_timeout(node.execute(&BTreeMap::new(), &run_cancel)).await;

    assert!(result.is_err(), "terminated process reports failure");
    assert!(begun.elapsed() < Duration::from_secs(5));
    assert!(node.pid().is_none());
    Ok(())
}

#[tokio::test]
async fn launch_delay_observes_cancellation() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let marker = dir.path().join("ran");

    let node = Arc::new(Node::new(
        StepBuilder::new("delayed", &format!("touch {}", marker.display())).build(),
    ));
    let ctx = ExecContext {
        delay: Duration::from_secs(30),
        ..ExecContext::default()
    };
    let cancel = ctx.cancel.clone();
    let task = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { execute_node(&node, &ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    assert_eq!(with_timeout(task).await?, NodeStatus::Cancel);
    assert!(!marker.exists(), "command must not run during the delay");
    Ok(())
}
