//! Graph snapshots: the unit of history and persistence.
//!
//! A snapshot is immutable once published. Mutation code builds a new
//! snapshot and swaps an `Arc`; readers holding the old `Arc` keep a
//! consistent view. Identity (which snapshot) is pointer identity on the
//! `Arc`; [`PartialEq`] here is structural and exists for tests and
//! "did anything change" checks only.

use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use crate::ids::{EdgeId, NodeId};
use crate::node::Node;

/// Complete graph state: every node and every edge.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn contains_edge(&self, id: &EdgeId) -> bool {
        self.edge(id).is_some()
    }

    /// Edges with `node` at either end.
    pub fn edges_touching<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.touches(node))
    }

    /// Nodes whose `parent_id` is `parent`, in snapshot order.
    pub fn children_of<'a>(&'a self, parent: &'a NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent_id.as_ref() == Some(parent))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Ids of nodes flagged as waiting on generation.
    pub fn generating_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().filter(|n| n.is_generating).map(|n| &n.id)
    }
}
