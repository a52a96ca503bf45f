//! Per-subject version graph
//!
//! Directed graph whose nodes are schema versions and whose edges are
//! registered deltas. Built on petgraph with a HashMap index for O(1)
//! version lookup. Append-only: registration adds at most one node pair and
//! exactly one edge, and nothing is ever removed.

pub mod compat;
pub mod resolve;

pub use compat::{Compatibility, CompatibilityMatrix};
pub use resolve::{resolve, ChainStep, ResolvedChain};

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::delta::{Delta, VersionId};
use crate::error::{Result, SchemaError};

/// The delta graph for one subject.
#[derive(Debug, Default)]
pub struct VersionGraph {
    graph: DiGraph<VersionId, Arc<Delta>>,
    /// Index: version -> node, the graph's only lookup path
    nodes: HashMap<VersionId, NodeIndex>,
}

impl VersionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a delta against the current graph without mutating it.
    ///
    /// Rejects structural problems, duplicate edges, and edges that would
    /// make a version its own ancestor.
    pub fn check(&self, delta: &Delta) -> Result<()> {
        delta.validate()?;

        if let (Some(&from_idx), Some(&to_idx)) = (
            self.nodes.get(&delta.from_version),
            self.nodes.get(&delta.to_version),
        ) {
            if self.graph.find_edge(from_idx, to_idx).is_some() {
                return Err(SchemaError::DuplicateEdge {
                    from: delta.from_version.clone(),
                    to: delta.to_version.clone(),
                });
            }
            // Reachability from the head back to the tail means the new edge
            // would close a loop.
            if has_path_connecting(&self.graph, to_idx, from_idx, None) {
                return Err(SchemaError::Cycle {
                    from: delta.from_version.clone(),
                    to: delta.to_version.clone(),
                });
            }
        }
        Ok(())
    }

    /// Register a delta, adding its versions to the graph as needed.
    ///
    /// Fails with `DuplicateEdge` or `Cycle` and leaves the graph unchanged
    /// on rejection.
    pub fn register(&mut self, delta: Delta) -> Result<Arc<Delta>> {
        self.check(&delta)?;

        let from_idx = self.intern(delta.from_version.clone());
        let to_idx = self.intern(delta.to_version.clone());
        let delta = Arc::new(delta);
        self.graph.add_edge(from_idx, to_idx, Arc::clone(&delta));
        Ok(delta)
    }

    fn intern(&mut self, version: VersionId) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&version) {
            return idx;
        }
        let idx = self.graph.add_node(version.clone());
        self.nodes.insert(version, idx);
        idx
    }

    pub fn has_version(&self, version: &VersionId) -> bool {
        self.nodes.contains_key(version)
    }

    /// All versions, sorted.
    pub fn versions(&self) -> Vec<VersionId> {
        let mut versions: Vec<_> = self.nodes.keys().cloned().collect();
        versions.sort();
        versions
    }

    pub fn version_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn delta_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// The direct delta for an ordered version pair, if registered.
    pub fn delta(&self, from: &VersionId, to: &VersionId) -> Option<Arc<Delta>> {
        let from_idx = *self.nodes.get(from)?;
        let to_idx = *self.nodes.get(to)?;
        let edge = self.graph.find_edge(from_idx, to_idx)?;
        self.graph.edge_weight(edge).cloned()
    }

    /// Outgoing edges of a version: (successor, delta).
    pub fn neighbors(&self, version: &VersionId) -> Vec<(VersionId, Arc<Delta>)> {
        self.edges(version, Direction::Outgoing)
    }

    /// Incoming edges of a version: (predecessor, delta). Used by the
    /// resolver for downgrade walks.
    pub fn incoming(&self, version: &VersionId) -> Vec<(VersionId, Arc<Delta>)> {
        self.edges(version, Direction::Incoming)
    }

    fn edges(&self, version: &VersionId, direction: Direction) -> Vec<(VersionId, Arc<Delta>)> {
        let Some(&idx) = self.nodes.get(version) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, direction)
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                self.graph
                    .node_weight(other)
                    .map(|v| (v.clone(), Arc::clone(e.weight())))
            })
            .collect()
    }

    /// All registered deltas in registration order.
    pub fn deltas(&self) -> Vec<Arc<Delta>> {
        self.graph
            .edge_references()
            .map(|e| Arc::clone(e.weight()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: &str) -> VersionId {
        VersionId::new(id).unwrap()
    }

    fn delta(from: &str, to: &str) -> Delta {
        Delta::new(v(from), v(to))
    }

    #[test]
    fn test_register_adds_versions_and_edge() {
        let mut graph = VersionGraph::new();
        graph.register(delta("v1", "v2")).unwrap();

        assert!(graph.has_version(&v("v1")));
        assert!(graph.has_version(&v("v2")));
        assert_eq!(graph.delta_count(), 1);
        assert!(graph.delta(&v("v1"), &v("v2")).is_some());
        assert!(graph.delta(&v("v2"), &v("v1")).is_none());
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut graph = VersionGraph::new();
        graph.register(delta("v1", "v2")).unwrap();

        let err = graph.register(delta("v1", "v2")).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateEdge { .. }));
        assert_eq!(graph.delta_count(), 1);
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let mut graph = VersionGraph::new();
        graph.register(delta("v1", "v2")).unwrap();
        graph.register(delta("v2", "v3")).unwrap();

        let err = graph.register(delta("v3", "v1")).unwrap_err();
        assert!(matches!(err, SchemaError::Cycle { .. }));
        assert_eq!(graph.delta_count(), 2);
        assert_eq!(graph.version_count(), 3);
    }

    #[test]
    fn test_direct_back_edge_rejected() {
        let mut graph = VersionGraph::new();
        graph.register(delta("v1", "v2")).unwrap();
        let err = graph.register(delta("v2", "v1")).unwrap_err();
        assert!(matches!(err, SchemaError::Cycle { .. }));
    }

    #[test]
    fn test_neighbors_and_incoming() {
        let mut graph = VersionGraph::new();
        graph.register(delta("v1", "v2")).unwrap();
        graph.register(delta("v1", "v3")).unwrap();
        graph.register(delta("v2", "v4")).unwrap();

        let out: Vec<_> = graph
            .neighbors(&v("v1"))
            .into_iter()
            .map(|(version, _)| version)
            .collect();
        assert_eq!(out.len(), 2);
        assert!(out.contains(&v("v2")));
        assert!(out.contains(&v("v3")));

        let inc: Vec<_> = graph
            .incoming(&v("v4"))
            .into_iter()
            .map(|(version, _)| version)
            .collect();
        assert_eq!(inc, vec![v("v2")]);
    }

    #[test]
    fn test_versions_sorted() {
        let mut graph = VersionGraph::new();
        graph.register(delta("v2", "v3")).unwrap();
        graph.register(delta("v1", "v2")).unwrap();
        assert_eq!(graph.versions(), vec![v("v1"), v("v2"), v("v3")]);
    }
}
