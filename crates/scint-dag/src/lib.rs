// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal generic DAG wrapper used by the scheduler to track job
//! dependencies and by the preparer/planner to reason about the dependency
//! closure of a resolved set.
//!
//! This is a thin encapsulation over [`petgraph`], kept deliberately small:
//! callers never need to touch `petgraph` types directly.

use petgraph::{
    prelude::DiGraph,
    visit::{Dfs, Topo, Walker},
};

mod subgraph;

pub use subgraph::subgraph;

/// Node index as used throughout the dag's public API.
pub type NodeIndex = petgraph::prelude::NodeIndex<u32>;

/// Generic directed-acyclic-graph wrapper.
///
/// `N` is the node payload (a job id, a package id, ...). Edges carry no
/// weight: the only thing that matters is "this depends on that".
#[derive(Debug, Clone)]
pub struct Dag<N>(DiGraph<N, (), u32>);

impl<N> Default for Dag<N> {
    fn default() -> Self {
        Self(DiGraph::default())
    }
}

impl<N> Dag<N>
where
    N: Clone + PartialEq,
{
    /// Construct a new, empty `Dag`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node`, returning its index. If `node` already exists, returns
    /// the existing index instead of inserting a duplicate.
    pub fn add_node_or_get_index(&mut self, node: N) -> NodeIndex {
        if let Some(index) = self.get_index(&node) {
            index
        } else {
            self.0.add_node(node)
        }
    }

    /// True if `node` is present in the graph.
    pub fn node_exists(&self, node: &N) -> bool {
        self.get_index(node).is_some()
    }

    /// Remove `node`, returning it if it was present.
    pub fn remove_node(&mut self, node: &N) -> Option<N> {
        let index = self.get_index(node)?;
        self.0.remove_node(index)
    }

    /// Add an edge `a -> b` ("a depends on b"). Refuses to create a cycle or
    /// a duplicate edge; returns whether the edge was added.
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex) -> bool {
        let a_node = &self.0[a];

        if self.dfs(b).any(|n| n == a_node) {
            return false;
        }
        if self.0.find_edge(a, b).is_some() {
            return false;
        }

        self.0.add_edge(a, b, ());
        true
    }

    /// Iterate all nodes in insertion order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &'_ N> {
        self.0.node_indices().map(|i| &self.0[i])
    }

    /// Direct dependencies of `node` (outgoing edges), if present.
    pub fn depends_on(&self, node: &N) -> Vec<N> {
        let Some(index) = self.get_index(node) else {
            return Vec::new();
        };
        self.0
            .neighbors_directed(index, petgraph::Direction::Outgoing)
            .map(|i| self.0[i].clone())
            .collect()
    }

    /// Depth-first traversal starting at `start`.
    pub fn dfs(&self, start: NodeIndex) -> impl Iterator<Item = &'_ N> {
        Dfs::new(&self.0, start).iter(&self.0).map(|i| &self.0[i])
    }

    /// Topological order over the whole graph. Nodes that participate in a
    /// cycle are silently skipped by `petgraph::visit::Topo` — callers that
    /// must detect cycles should use [`Dag::toposort`].
    pub fn topo(&self) -> impl Iterator<Item = &'_ N> {
        Topo::new(&self.0).iter(&self.0).map(|i| &self.0[i])
    }

    /// Topological order, failing if the graph contains a cycle. Returns the
    /// offending node on failure.
    pub fn toposort(&self) -> Result<Vec<N>, N> {
        petgraph::algo::toposort(&self.0, None)
            .map(|order| order.into_iter().map(|i| self.0[i].clone()).collect())
            .map_err(|cycle| self.0[cycle.node_id()].clone())
    }

    /// Transpose the graph (reverse every edge), returning a clone.
    pub fn transpose(&self) -> Self {
        let mut transposed = self.0.clone();
        transposed.reverse();
        Self(transposed)
    }

    /// Build the subgraph reachable from `starting_nodes`, following edges
    /// forward. Used in transposed form to compute reverse-dependency
    /// closures (e.g. "everything that depends on this job").
    pub fn subgraph(&self, starting_nodes: &[N]) -> Self {
        Self(subgraph(&self.0, starting_nodes))
    }

    /// Index for `node`, if present.
    pub fn get_index(&self, node: &N) -> Option<NodeIndex> {
        self.0.node_indices().find(|i| self.0[*i] == *node)
    }

    /// Number of nodes currently in the graph.
    pub fn len(&self) -> usize {
        self.0.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.node_count() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_edge_rejects_cycles() {
        let mut dag: Dag<&str> = Dag::new();
        let a = dag.add_node_or_get_index("a");
        let b = dag.add_node_or_get_index("b");
        assert!(dag.add_edge(a, b));
        // b -> a would close a cycle since a -> b already exists
        assert!(!dag.add_edge(b, a));
    }

    #[test]
    fn toposort_orders_dependencies_last() {
        let mut dag: Dag<&str> = Dag::new();
        let a = dag.add_node_or_get_index("a");
        let b = dag.add_node_or_get_index("b");
        let c = dag.add_node_or_get_index("c");
        // a depends on b, b depends on c
        dag.add_edge(a, b);
        dag.add_edge(b, c);

        let order = dag.toposort().unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn depends_on_reports_direct_edges_only() {
        let mut dag: Dag<&str> = Dag::new();
        let a = dag.add_node_or_get_index("a");
        let b = dag.add_node_or_get_index("b");
        let c = dag.add_node_or_get_index("c");
        dag.add_edge(a, b);
        dag.add_edge(b, c);

        assert_eq!(dag.depends_on(&"a"), vec!["b"]);
        assert_eq!(dag.depends_on(&"b"), vec!["c"]);
        assert!(dag.depends_on(&"c").is_empty());
    }
}
