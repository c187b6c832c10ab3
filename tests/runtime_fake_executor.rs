// tests/runtime_fake_executor.rs

mod common;
use crate::common::builders::{DagBuilder, StepBuilder};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dagrun::dag::{ExecutionGraph, Node};
use dagrun::engine::{Handlers, RunHandle, Runtime, RuntimeEvent, RuntimeOptions};
use dagrun::types::{NodeStatus, SchedulerStatus};
use dagrun_test_utils::fake_executor::FakeExecutor;

type TestResult = Result<(), Box<dyn Error>>;

fn run_handle(
    graph: ExecutionGraph,
    handlers: Handlers,
) -> (Arc<RunHandle>, mpsc::Sender<RuntimeEvent>, mpsc::Receiver<RuntimeEvent>) {
    let (tx, rx) = mpsc::channel(64);
    let run = Arc::new(RunHandle::new(
        "test",
        "run-1",
        vec!["p1".to_string()],
        Arc::new(graph),
        handlers,
        tx.clone(),
    ));
    (run, tx, rx)
}

fn handler(name: &str) -> Option<Arc<Node>> {
    Some(Arc::new(Node::new(StepBuilder::noop(name).build())))
}

#[tokio::test]
async fn chain_runs_in_order_and_succeeds() -> TestResult {
    init_tracing();

    let graph = DagBuilder::new()
        .with_step(StepBuilder::noop("A").build())
        .with_step(StepBuilder::noop("B").depends("A").build())
        .with_step(StepBuilder::noop("C").depends("B").build())
        .build();
    let (run, tx, rx) = run_handle(graph, Handlers::default());

    let executor = FakeExecutor::new(tx);
    let executed = executor.executed();

    let runtime = Runtime::new(
        Arc::clone(&run),
        rx,
        executor,
        RuntimeOptions::default(),
        CancellationToken::new(),
    );
    let status = with_timeout(runtime.run()).await?;

    assert_eq!(*executed.lock().unwrap(), vec!["A", "B", "C"]);
    assert_eq!(status.status, SchedulerStatus::Success);
    assert_eq!(status.status_text, "finished");
    assert_eq!(status.request_id, "run-1");
    assert_eq!(status.params, vec!["p1".to_string()]);
    assert!(status.started_at.is_some());
    assert!(status.finished_at.is_some());
    assert!(run.is_done());
    Ok(())
}

#[tokio::test]
async fn failure_runs_failure_and_exit_handlers_only() -> TestResult {
    init_tracing();

    let graph = DagBuilder::new()
        .with_step(StepBuilder::noop("A").build())
        .with_step(StepBuilder::noop("B").depends("A").build())
        .build();
    let handlers = Handlers {
        on_success: handler("on_success"),
        on_failure: handler("on_failure"),
        on_cancel: handler("on_cancel"),
        on_exit: handler("on_exit"),
    };
    let (run, tx, rx) = run_handle(graph, handlers);

    let executor = FakeExecutor::new(tx).with_outcome("A", NodeStatus::Error);
    let executed = executor.executed();
    let ran_handlers = executor.handlers();

    let runtime = Runtime::new(
        Arc::clone(&run),
        rx,
        executor,
        RuntimeOptions::default(),
        CancellationToken::new(),
    );
    let status = with_timeout(runtime.run()).await?;

    assert_eq!(status.status, SchedulerStatus::Error);
    assert_eq!(*executed.lock().unwrap(), vec!["A"]);
    assert_eq!(*ran_handlers.lock().unwrap(), vec!["on_failure", "on_exit"]);

    // B never ran: the runtime marked it skipped.
    let b = run.graph().node_by_name("B").ok_or("missing B")?;
    assert_eq!(b.read_status(), NodeStatus::Skipped);
    Ok(())
}

#[tokio::test]
async fn concurrency_cap_limits_dispatch_batches() -> TestResult {
    init_tracing();

    let graph = DagBuilder::new()
        .with_step(StepBuilder::noop("a").build())
        .with_step(StepBuilder::noop("b").build())
        .with_step(StepBuilder::noop("c").build())
        .build();
    let (run, tx, rx) = run_handle(graph, Handlers::default());

    let (executor, parked) = FakeExecutor::new(tx.clone()).parking();
    let options = RuntimeOptions {
        max_active_runs: 2,
        ..RuntimeOptions::default()
    };
    let task = tokio::spawn(
        Runtime::new(Arc::clone(&run), rx, executor, options, CancellationToken::new()).run(),
    );

    // Two of three nodes start; the third waits for a slot.
    with_timeout(async {
        while parked.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(parked.lock().unwrap().len(), 2);

    let first = parked.lock().unwrap()[0].id();
    tx.send(RuntimeEvent::NodeFinished {
        node: first,
        status: NodeStatus::Success,
    })
    .await?;

    with_timeout(async {
        while parked.lock().unwrap().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    let rest: Vec<_> = parked.lock().unwrap()[1..].iter().map(|n| n.id()).collect();
    for node in rest {
        tx.send(RuntimeEvent::NodeFinished {
            node,
            status: NodeStatus::Success,
        })
        .await?;
    }

    let status = with_timeout(task).await??;
    assert_eq!(status.status, SchedulerStatus::Success);
    Ok(())
}

#[tokio::test]
async fn stop_request_cancels_pending_nodes_and_runs_cancel_handler() -> TestResult {
    init_tracing();

    let graph = DagBuilder::new()
        .with_step(StepBuilder::noop("first").build())
        .with_step(StepBuilder::noop("second").depends("first").build())
        .build();
    let handlers = Handlers {
        on_cancel: handler("on_cancel"),
        on_success: handler("on_success"),
        ..Handlers::default()
    };
    let (run, tx, rx) = run_handle(graph, handlers);

    let (executor, parked) = FakeExecutor::new(tx.clone()).parking();
    let executed = executor.executed();
    let ran_handlers = executor.handlers();
    let task = tokio::spawn(
        Runtime::new(
            Arc::clone(&run),
            rx,
            executor,
            RuntimeOptions::default(),
            CancellationToken::new(),
        )
        .run(),
    );

    with_timeout(async {
        while parked.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    run.request_stop().await?;

    // The parked process "exits" after being told to terminate.
    let first = parked.lock().unwrap()[0].id();
    tx.send(RuntimeEvent::NodeFinished {
        node: first,
        status: NodeStatus::Cancel,
    })
    .await?;

    let status = with_timeout(task).await??;
    assert_eq!(status.status, SchedulerStatus::Cancel);
    assert_eq!(*executed.lock().unwrap(), vec!["first"]);
    assert_eq!(*ran_handlers.lock().unwrap(), vec!["on_cancel"]);

    let second = run.graph().node_by_name("second").ok_or("missing second")?;
    assert_eq!(second.read_status(), NodeStatus::Cancel);

    // Stopping a finished run is reported, not hidden.
    assert!(run.request_stop().await.is_err());
    Ok(())
}
