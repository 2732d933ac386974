//! Must-complete-before dependency graph over admitted requests.
//!
//! Nodes are request ids; an edge `a -> b` means `b` cannot dispatch until
//! `a` reaches a terminal state. Admission is all-or-nothing: a batch of
//! edges that would close a cycle mutates nothing.

use crate::coord::types::RequestId;
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<RequestId, ()>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to admit `id` with the given edges. Returns false (leaving the
    /// graph untouched) if any edge is a self-loop or the batch would make
    /// the graph cyclic.
    pub fn try_admit(&mut self, id: RequestId, edges: &[(RequestId, RequestId)]) -> bool {
        if edges.is_empty() {
            return true;
        }
        if edges.iter().any(|&(a, b)| a == b) {
            return false;
        }
        let mut scratch = self.graph.clone();
        scratch.add_node(id);
        for &(a, b) in edges {
            scratch.add_edge(a, b, ());
        }
        if is_cyclic_directed(&scratch) {
            return false;
        }
        self.graph = scratch;
        true
    }

    /// A request is ready when it has no unfinished predecessors. Requests
    /// never entered into the graph are unconstrained.
    pub fn is_ready(&self, id: RequestId) -> bool {
        !self.graph.contains_node(id)
            || self
                .graph
                .neighbors_directed(id, Direction::Incoming)
                .next()
                .is_none()
    }

    /// Drop a terminal request, releasing all of its edges.
    pub fn remove(&mut self, id: RequestId) {
        self.graph.remove_node(id);
    }

    pub fn clear(&mut self) {
        self.graph = DiGraphMap::new();
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
