// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::node::{Node, NodeId};
use crate::dag::step::Step;
use crate::errors::{DagrunError, Result};
use crate::types::NodeStatus;

/// Graph of nodes for one run.
///
/// Edge direction: dependency -> dependent. For a step `B` with
/// `depends = ["A"]` we add the edge `A -> B`. Acyclicity is checked once,
/// at construction; a cyclic input never yields a graph.
#[derive(Debug)]
pub struct ExecutionGraph {
    nodes: Vec<Arc<Node>>,
    index: HashMap<NodeId, usize>,
    edges: DiGraphMap<NodeId, ()>,
    /// Node ids in a valid topological order.
    order: Vec<NodeId>,
}

impl ExecutionGraph {
    /// Build a fresh graph from a finalized step list.
    pub fn build(steps: Vec<Step>) -> Result<Self> {
        let nodes = steps.into_iter().map(|s| Arc::new(Node::new(s))).collect();
        Self::from_nodes(nodes)
    }

    /// Build a graph from nodes that carry terminal state from a prior run
    /// and reset exactly what must be attempted again.
    ///
    /// A node is tainted when its own prior status is `Error` or `Cancel`,
    /// or when any upstream dependency is tainted. Tainted nodes go back to
    /// `None` with zeroed counters; every other node keeps its status.
    pub fn rebuild_for_retry(nodes: Vec<Arc<Node>>) -> Result<Self> {
        let graph = Self::from_nodes(nodes)?;

        let mut tainted: HashSet<NodeId> = HashSet::new();
        for &id in &graph.order {
            let Some(node) = graph.node(id) else { continue };
            let own = matches!(node.read_status(), NodeStatus::Error | NodeStatus::Cancel);
            let upstream = graph
                .dependencies_of(id)
                .iter()
                .any(|dep| tainted.contains(dep));
            if own || upstream {
                tainted.insert(id);
            }
        }

        for node in &graph.nodes {
            if tainted.contains(&node.id()) {
                debug!(node = %node.name(), prior = %node.read_status(), "resetting node for retry");
                node.reset_for_retry();
            }
        }

        Ok(graph)
    }

    /// Shared construction: resolve dependency names, add edges, reject cycles.
    pub fn from_nodes(nodes: Vec<Arc<Node>>) -> Result<Self> {
        let mut by_name: HashMap<&str, NodeId> = HashMap::new();
        let mut edges: DiGraphMap<NodeId, ()> = DiGraphMap::new();

        for node in &nodes {
            if by_name.insert(node.name(), node.id()).is_some() {
                return Err(DagrunError::ConfigError(format!(
                    "duplicate step name '{}'",
                    node.name()
                )));
            }
            edges.add_node(node.id());
        }

        for node in &nodes {
            for dep in &node.step().depends {
                let Some(&dep_id) = by_name.get(dep.as_str()) else {
                    return Err(DagrunError::UnknownDependency {
                        step: node.name().to_string(),
                        dependency: dep.clone(),
                    });
                };
                edges.add_edge(dep_id, node.id(), ());
            }
        }

        // toposort walks the graph depth-first and fails on any back-edge
        // (self-dependencies included).
        let order = match toposort(&edges, None) {
            Ok(order) => order,
            Err(cycle) => {
                let name = nodes
                    .iter()
                    .find(|n| n.id() == cycle.node_id())
                    .map(|n| n.name().to_string())
                    .unwrap_or_default();
                return Err(DagrunError::DagCycle(format!(
                    "cycle detected in step graph involving step '{name}'"
                )));
            }
        };

        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id(), i))
            .collect();

        Ok(Self {
            nodes,
            index,
            edges,
            order,
        })
    }

    /// All nodes, in the order the steps were supplied.
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<Node>> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate dependencies of a node.
    pub fn dependencies_of(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .neighbors_directed(id, Direction::Incoming)
            .collect()
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .neighbors_directed(id, Direction::Outgoing)
            .collect()
    }

    /// Whether the step named `dependent` has a direct edge from `dependency`.
    pub fn has_edge(&self, dependency: &str, dependent: &str) -> bool {
        match (self.node_by_name(dependency), self.node_by_name(dependent)) {
            (Some(a), Some(b)) => self.edges.contains_edge(a.id(), b.id()),
            _ => false,
        }
    }

    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }
}
