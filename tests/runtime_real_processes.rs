// tests/runtime_real_processes.rs
//
// The runtime driving real processes through `RealExecutorBackend`; unix only.
#![cfg(unix)]

mod common;
use crate::common::builders::{DagBuilder, StepBuilder};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dagrun::dag::{ExecutionGraph, Node};
use dagrun::engine::{Handlers, RunHandle, Runtime, RuntimeOptions};
use dagrun::exec::{ExecContext, RealExecutorBackend};
use dagrun::types::{NodeStatus, SchedulerStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn real_runtime(
    graph: ExecutionGraph,
    handlers: Handlers,
    max_cleanup_time: Duration,
) -> (Arc<RunHandle>, Runtime<RealExecutorBackend>) {
    let (tx, rx) = mpsc::channel(64);
    let run = Arc::new(RunHandle::new(
        "real",
        "run-real",
        Vec::new(),
        Arc::new(graph),
        handlers,
        tx.clone(),
    ));
    let cancel = CancellationToken::new();
    let ctx = ExecContext {
        cancel: cancel.clone(),
        ..ExecContext::default()
    };
    let options = RuntimeOptions {
        max_cleanup_time,
        ..RuntimeOptions::default()
    };
    let runtime = Runtime::new(
        Arc::clone(&run),
        rx,
        RealExecutorBackend::new(tx, ctx),
        options,
        cancel,
    );
    (run, runtime)
}

async fn wait_for_file(path: &Path) {
    with_timeout(async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

fn status_of(run: &RunHandle, name: &str) -> NodeStatus {
    run.graph()
        .node_by_name(name)
        .map(|n| n.read_status())
        .expect("node in graph")
}

#[tokio::test]
async fn stop_abandons_a_slow_precondition_command() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let started = dir.path().join("checking");
    let marker = dir.path().join("ran");

    let graph = DagBuilder::new()
        .with_step(
            StepBuilder::new("gated", &format!("touch {}", marker.display()))
                .precondition(
                    &format!("`touch {}; sleep 20; echo ok`", started.display()),
                    "ok",
                )
                .build(),
        )
        .build();
    // A long deadline: the stop must not depend on escalation.
    let (run, runtime) = real_runtime(graph, Handlers::default(), Duration::from_secs(30));
    let task = tokio::spawn(runtime.run());

    wait_for_file(&started).await;
    let begun = Instant::now();
    with_timeout(run.cancel()).await?;
    assert!(
        begun.elapsed() < Duration::from_secs(3),
        "stop took {:?}",
        begun.elapsed()
    );

    let status = with_timeout(task).await??;
    assert_eq!(status.status, SchedulerStatus::Cancel);
    assert_eq!(status_of(&run, "gated"), NodeStatus::Cancel);
    assert!(!marker.exists(), "step must not launch");
    Ok(())
}

#[tokio::test]
async fn process_ignoring_sigterm_is_killed_at_cleanup_deadline() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let ready = dir.path().join("ready");

    let graph = DagBuilder::new()
        .with_step(
            StepBuilder::new(
                "stubborn",
                &format!("trap '' TERM; touch {}; sleep 30", ready.display()),
            )
            .build(),
        )
        .build();
    let (run, runtime) = real_runtime(graph, Handlers::default(), Duration::from_millis(500));
    let task = tokio::spawn(runtime.run());

    wait_for_file(&ready).await;
    let begun = Instant::now();
    with_timeout(run.cancel()).await?;
    let waited = begun.elapsed();

    assert!(waited >= Duration::from_millis(400), "SIGTERM was not ignored: {waited:?}");
    assert!(waited < Duration::from_secs(5), "deadline not enforced: {waited:?}");

    let status = with_timeout(task).await??;
    assert_eq!(status.status, SchedulerStatus::Cancel);
    assert_eq!(status_of(&run, "stubborn"), NodeStatus::Cancel);
    Ok(())
}

#[tokio::test]
async fn stop_is_refused_once_only_handlers_remain() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let exiting = dir.path().join("exiting");

    let graph = DagBuilder::new()
        .with_step(StepBuilder::new("quick", "true").build())
        .build();
    let handlers = Handlers {
        on_exit: Some(Arc::new(Node::new(
            StepBuilder::new("on_exit", &format!("touch {}; sleep 1", exiting.display())).build(),
        ))),
        ..Handlers::default()
    };
    let (run, runtime) = real_runtime(graph, handlers, Duration::from_secs(30));
    let task = tokio::spawn(runtime.run());

    wait_for_file(&exiting).await;
    assert!(run.is_settled());
    assert!(!run.is_done());
    assert!(run.request_stop().await.is_err());

    let status = with_timeout(task).await??;
    assert_eq!(status.status, SchedulerStatus::Success);
    let on_exit = status.on_exit.as_ref().ok_or("exit handler missing")?;
    assert_eq!(on_exit.status, NodeStatus::Success);
    Ok(())
}
