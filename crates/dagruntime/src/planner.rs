use crate::graph::DependencyGraph;
use dagcore::{NodeId, WorkflowError};
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Linear execution order over every node of a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    order: Vec<NodeId>,
}

impl Plan {
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|n| n == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.order.iter()
    }

    pub fn into_order(self) -> Vec<NodeId> {
        self.order
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Computes a deterministic topological order.
///
/// Cycles are found first with a depth-first walk over `requires` links that
/// keeps the current path, so the error carries the whole cycle. The order
/// itself comes from Kahn's algorithm with ready nodes taken in declaration
/// order.
pub struct ExecutionPlanner;

impl ExecutionPlanner {
    pub fn plan(graph: &DependencyGraph) -> Result<Plan, WorkflowError> {
        if let Some(cycle) = Self::find_cycle(graph) {
            return Err(WorkflowError::CycleDetected { cycle });
        }

        let inner = graph.inner();
        let mut in_degree: Vec<usize> = inner
            .node_indices()
            .map(|idx| inner.neighbors_directed(idx, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = inner
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(inner.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(inner[idx].id.clone());
            for next in inner.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != inner.node_count() {
            // find_cycle missed something; report a node that never became ready
            let stuck = inner
                .node_indices()
                .find(|idx| in_degree[idx.index()] > 0)
                .map(|idx| inner[idx].id.clone())
                .into_iter()
                .collect();
            return Err(WorkflowError::CycleDetected { cycle: stuck });
        }

        Ok(Plan { order })
    }

    /// Returns the first cycle found, following `requires` links, with the
    /// starting id repeated at the end.
    ///
    /// The walk keeps its own stack of frames, so chain length is bounded by
    /// memory rather than by the thread's stack.
    pub fn find_cycle(graph: &DependencyGraph) -> Option<Vec<NodeId>> {
        let inner = graph.inner();
        let mut marks = vec![Mark::Unvisited; inner.node_count()];

        for root in inner.node_indices() {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }

            marks[root.index()] = Mark::OnStack;
            let mut stack = vec![Frame::enter(graph, root)];

            while let Some(frame) = stack.last_mut() {
                let Some(&dep) = frame.deps.get(frame.cursor) else {
                    marks[frame.node.index()] = Mark::Done;
                    stack.pop();
                    continue;
                };
                frame.cursor += 1;

                match marks[dep.index()] {
                    Mark::Done => {}
                    Mark::OnStack => {
                        let start = stack.iter().position(|f| f.node == dep).unwrap_or(0);
                        let mut cycle: Vec<NodeId> = stack[start..]
                            .iter()
                            .map(|f| inner[f.node].id.clone())
                            .collect();
                        cycle.push(inner[dep].id.clone());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks[dep.index()] = Mark::OnStack;
                        stack.push(Frame::enter(graph, dep));
                    }
                }
            }
        }
        None
    }
}

/// One node on the depth-first path and how far through its `requires` the
/// walk has got
struct Frame {
    node: NodeIndex,
    deps: Vec<NodeIndex>,
    cursor: usize,
}

impl Frame {
    fn enter(graph: &DependencyGraph, node: NodeIndex) -> Self {
        Self {
            node,
            deps: graph.sorted_neighbors(node, Direction::Incoming),
            cursor: 0,
        }
    }
}
