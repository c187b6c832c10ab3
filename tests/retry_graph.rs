// tests/retry_graph.rs

mod common;
use crate::common::builders::StepBuilder;
use crate::common::init_tracing;

use std::error::Error;
use std::sync::Arc;

use dagrun::agent::retry_graph;
use dagrun::dag::{ExecutionGraph, Node, NodeState, Step};
use dagrun::status::RunStatus;
use dagrun::types::NodeStatus::{self, Cancel, Error as Failed, Skipped, Success};

type TestResult = Result<(), Box<dyn Error>>;

fn node(step: Step, status: NodeStatus) -> Arc<Node> {
    Arc::new(Node::with_state(
        step,
        NodeState {
            status,
            retry_count: 2,
            done_count: 1,
            ..NodeState::default()
        },
    ))
}

fn statuses(graph: &ExecutionGraph) -> Vec<NodeStatus> {
    graph.nodes().iter().map(|n| n.read_status()).collect()
}

#[test]
fn taint_propagates_down_dependency_chains() -> TestResult {
    init_tracing();

    let nodes = vec![
        node(StepBuilder::noop("1").build(), Success),
        node(StepBuilder::noop("2").depends("1").build(), Failed),
        node(StepBuilder::noop("3").depends("2").build(), Cancel),
        node(StepBuilder::noop("4").build(), Skipped),
        node(StepBuilder::noop("5").depends("4").build(), Failed),
        node(StepBuilder::noop("6").depends("5").build(), Success),
        node(StepBuilder::noop("7").depends("6").build(), Skipped),
        node(StepBuilder::noop("8").build(), Skipped),
    ];

    let graph = ExecutionGraph::rebuild_for_retry(nodes)?;

    assert_eq!(
        statuses(&graph),
        vec![
            Success,
            NodeStatus::None,
            NodeStatus::None,
            Skipped,
            NodeStatus::None,
            NodeStatus::None,
            NodeStatus::None,
            Skipped
        ]
    );

    // Reset nodes get fresh counters; kept nodes keep theirs.
    let reset = graph.node_by_name("6").ok_or("missing 6")?;
    assert_eq!(reset.read_retry_count(), 0);
    assert_eq!(reset.read_done_count(), 0);
    let kept = graph.node_by_name("1").ok_or("missing 1")?;
    assert_eq!(kept.read_retry_count(), 2);
    assert_eq!(kept.read_done_count(), 1);

    Ok(())
}

#[test]
fn all_success_is_unchanged() -> TestResult {
    let nodes = vec![
        node(StepBuilder::noop("a").build(), Success),
        node(StepBuilder::noop("b").depends("a").build(), Success),
        node(StepBuilder::noop("c").depends("b").build(), Success),
    ];
    let graph = ExecutionGraph::rebuild_for_retry(nodes)?;
    assert_eq!(statuses(&graph), vec![Success, Success, Success]);
    Ok(())
}

#[test]
fn all_none_is_unchanged() -> TestResult {
    let nodes = vec![
        node(StepBuilder::noop("a").build(), NodeStatus::None),
        node(StepBuilder::noop("b").depends("a").build(), NodeStatus::None),
    ];
    let graph = ExecutionGraph::rebuild_for_retry(nodes)?;
    assert_eq!(statuses(&graph), vec![NodeStatus::None, NodeStatus::None]);
    Ok(())
}

#[test]
fn retry_graph_restores_states_by_step_name() -> TestResult {
    let steps = vec![
        StepBuilder::noop("extract").build(),
        StepBuilder::noop("load").depends("extract").build(),
        StepBuilder::noop("report").depends("load").build(),
        StepBuilder::noop("added_later").build(),
    ];

    let mut prior = RunStatus::not_started("etl", &steps[..3]);
    prior.nodes[0].status = Success;
    prior.nodes[1].status = Failed;
    prior.nodes[2].status = Skipped;

    let graph = retry_graph(&steps, &prior)?;

    assert_eq!(
        statuses(&graph),
        vec![Success, NodeStatus::None, NodeStatus::None, NodeStatus::None]
    );
    Ok(())
}
