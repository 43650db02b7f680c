//! Dependency graph management using `petgraph`.
//!
//! Orders resources inside a stack and stacks inside an app so that every
//! node appears after the nodes it depends on.

use std::collections::HashMap;

use edgestack_common::error::{EdgestackError, Result};
use petgraph::graph::NodeIndex;

/// A dependency graph of named nodes.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Internal petgraph representation.
    graph: petgraph::Graph<String, ()>,
    /// Name to node lookup so repeated names map to one node.
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: petgraph::Graph::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a node, returning the existing index if the name is known.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeIndex {
        let name = name.into();
        if let Some(&idx) = self.index.get(&name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        let _ = self.index.insert(name, idx);
        idx
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`
    /// so that topological sort yields dependencies first.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let dependent = self.add_node(dependent);
        let dependency = self.add_node(dependency);
        if self.graph.find_edge(dependency, dependent).is_none() {
            let _ = self.graph.add_edge(dependency, dependent, ());
        }
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the direct dependencies of `name`, sorted.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        deps.sort();
        deps
    }

    /// Returns a topological ordering of the nodes.
    ///
    /// Dependencies appear before the nodes that depend on them.
    ///
    /// # Errors
    ///
    /// Returns [`EdgestackError::CyclicDependency`] naming `scope` if the
    /// graph contains a cycle.
    pub fn resolve_order(&self, scope: &str) -> Result<Vec<String>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => Err(EdgestackError::CyclicDependency {
                scope: scope.to_owned(),
                node: self
                    .graph
                    .node_weight(cycle.node_id())
                    .cloned()
                    .unwrap_or_default(),
            }),
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
