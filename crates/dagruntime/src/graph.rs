use dagcore::{NodeId, NodeSpec, WorkflowError, WorkflowSpec};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// Dependency graph of one workflow. Edges point from a prerequisite to the
/// node that requires it. Node indices follow declaration order.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<NodeSpec, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a workflow. All nodes are added before any edge so
    /// `requires` may name nodes declared further down.
    pub fn from_workflow(workflow: &WorkflowSpec) -> Result<Self, WorkflowError> {
        let mut graph = Self::new();

        for node in &workflow.nodes {
            graph.add_node(node.clone())?;
        }

        for node in &workflow.nodes {
            for dep in &node.requires {
                if !graph.contains(dep) {
                    return Err(WorkflowError::UnknownDependency {
                        node: node.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                graph.add_edge(dep, &node.id)?;
            }
        }

        Ok(graph)
    }

    pub fn add_node(&mut self, spec: NodeSpec) -> Result<NodeIndex, WorkflowError> {
        if self.index.contains_key(&spec.id) {
            return Err(WorkflowError::DuplicateNode(spec.id));
        }
        let id = spec.id.clone();
        let idx = self.graph.add_node(spec);
        self.index.insert(id, idx);
        Ok(idx)
    }

    /// Record that `to` depends on `from`.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), WorkflowError> {
        if from == to {
            return Err(WorkflowError::SelfDependency(to.to_string()));
        }
        let to_idx = self.index_of(to).ok_or_else(|| WorkflowError::UnknownDependency {
            node: from.to_string(),
            dependency: to.to_string(),
        })?;
        let from_idx = self.index_of(from).ok_or_else(|| WorkflowError::UnknownDependency {
            node: to.to_string(),
            dependency: from.to_string(),
        })?;

        if self.graph.find_edge(from_idx, to_idx).is_none() {
            self.graph.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.index_of(id).and_then(|idx| self.graph.node_weight(idx))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Node ids in declaration order
    pub fn ids(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].id.as_str())
            .collect()
    }

    /// Direct prerequisites of `id`, in declaration order
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Nodes that directly require `id`, in declaration order
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Every edge as (prerequisite, dependent)
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].id.as_str(),
                    self.graph[e.target()].id.as_str(),
                )
            })
            .collect()
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub(crate) fn inner(&self) -> &DiGraph<NodeSpec, ()> {
        &self.graph
    }

    /// Neighbor indices sorted into declaration order. petgraph yields them
    /// newest edge first.
    pub(crate) fn sorted_neighbors(&self, idx: NodeIndex, dir: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        neighbors.sort_unstable();
        neighbors
    }

    fn neighbors(&self, id: &str, dir: Direction) -> Vec<&str> {
        match self.index_of(id) {
            Some(idx) => self
                .sorted_neighbors(idx, dir)
                .into_iter()
                .map(|n| self.graph[n].id.as_str())
                .collect(),
            None => Vec::new(),
        }
    }
}
