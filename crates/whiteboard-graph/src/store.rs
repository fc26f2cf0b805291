//! The graph store: canonical nodes and edges, copy-on-write.
//!
//! [`GraphStore`] holds exactly one thing, the current snapshot, behind an
//! `Arc`. Every mutator clones the snapshot, edits the clone, and publishes it
//! by swapping the `Arc` only if the whole edit succeeded. A failed mutation
//! leaves the previous snapshot in place untouched. Readers that grabbed the
//! old `Arc` keep a consistent view.
//!
//! The store knows nothing about history or the network. The history manager
//! wraps it; the client crate feeds it remote results.
//!
//! # Hierarchy rules
//!
//! - `parent_id` is authoritative. A `ParentChild` edge always mirrors it
//!   (source = parent, target = child), and at most one targets a node.
//! - Creating a `ParentChild` edge is `set_parent(target, Some(source))`;
//!   deleting one is `set_parent(target, None)`.
//! - Deleting a node orphans its children: their `parent_id` is cleared and
//!   they stay in the graph. Nothing is cascade-deleted.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};
use whiteboard_types::{
    ContentError, ContentPatch, Edge, EdgeId, EdgeKind, GraphSnapshot, Node, NodeContent, NodeId, NodeKind,
    Position, Size,
};

use crate::hierarchy::{check_reparent, find_cycle};
use crate::{GraphError, Result};

/// Owner of the current graph snapshot.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    snapshot: Arc<GraphSnapshot>,
    /// Bumped on every published snapshot.
    version: u64,
}

impl GraphStore {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an externally supplied snapshot, validating it first.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        validate_snapshot(&snapshot)?;
        Ok(Self { snapshot: Arc::new(snapshot), version: 0 })
    }

    /// The current snapshot. Cheap: clones the `Arc`.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.snapshot.node(id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.snapshot.edge(id)
    }

    /// Apply `f` to a private copy; publish only on success.
    fn mutate<T>(&mut self, f: impl FnOnce(&mut GraphSnapshot) -> Result<T>) -> Result<T> {
        let mut next = GraphSnapshot::clone(&self.snapshot);
        let out = f(&mut next)?;
        self.snapshot = Arc::new(next);
        self.version = self.version.wrapping_add(1);
        Ok(out)
    }

    // =========================================================================
    // Wholesale replacement
    // =========================================================================

    /// Install an external snapshot (server response, loaded file).
    pub fn replace(&mut self, snapshot: GraphSnapshot) -> Result<Arc<GraphSnapshot>> {
        validate_snapshot(&snapshot)?;
        self.snapshot = Arc::new(snapshot);
        self.version = self.version.wrapping_add(1);
        Ok(self.snapshot())
    }

    /// Reinstate a previously published snapshot, keeping its identity.
    ///
    /// Used by undo/redo: the `Arc` came out of this store (or went through
    /// [`replace`](Self::replace)), so it is already valid.
    pub fn restore(&mut self, snapshot: Arc<GraphSnapshot>) {
        self.snapshot = snapshot;
        self.version = self.version.wrapping_add(1);
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Create a root node. `initial` must match `kind` when given.
    pub fn create_node(
        &mut self,
        kind: NodeKind,
        position: Position,
        initial: Option<NodeContent>,
    ) -> Result<Node> {
        let id = NodeId::new();
        let content = match initial {
            Some(content) if content.kind() != kind => {
                return Err(GraphError::Content {
                    node: id,
                    source: ContentError::KindMismatch { kind, patch: "initialContent" },
                });
            }
            Some(content) => content,
            None => NodeContent::empty(kind),
        };
        let node = Node::new(id, kind, position).with_content(content);
        self.insert_node(node.clone())?;
        debug!(node = %node.id, %kind, "created node");
        Ok(node)
    }

    /// Insert a fully formed node (placeholders, server-issued nodes).
    ///
    /// If the node names a parent, the parent must exist; the node is appended
    /// to the parent's `children_order` and gets its `ParentChild` edge.
    pub fn insert_node(&mut self, node: Node) -> Result<Arc<GraphSnapshot>> {
        self.mutate(|g| {
            if node.id.is_empty() {
                return Err(GraphError::InvalidSnapshot("node with empty id".into()));
            }
            if g.contains_node(&node.id) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
            let parent = node.parent_id.clone();
            let child = node.id.clone();
            if let Some(parent) = &parent
                && !g.contains_node(parent)
            {
                return Err(GraphError::NodeNotFound(parent.clone()));
            }
            g.nodes.push(node);
            if let Some(parent) = parent {
                attach_child(g, &parent, &child);
            }
            Ok(())
        })?;
        Ok(self.snapshot())
    }

    /// Apply a kind-checked content patch.
    pub fn update_node_content(&mut self, id: &NodeId, patch: &ContentPatch) -> Result<Arc<GraphSnapshot>> {
        self.mutate(|g| {
            let node = g.node_mut(id).ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
            node.content
                .apply(patch)
                .map_err(|source| GraphError::Content { node: id.clone(), source })
        })?;
        trace!(node = %id, patch = patch.name(), "updated content");
        Ok(self.snapshot())
    }

    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<Arc<GraphSnapshot>> {
        self.update_node(id, |node| node.position = position)
    }

    pub fn resize_node(&mut self, id: &NodeId, size: Size) -> Result<Arc<GraphSnapshot>> {
        self.update_node(id, |node| node.size = Some(size))
    }

    pub fn set_color(&mut self, id: &NodeId, color: Option<String>) -> Result<Arc<GraphSnapshot>> {
        self.update_node(id, |node| node.color = color)
    }

    /// Edit non-structural node fields in place (flags, geometry, content).
    ///
    /// `f` must not touch `id`, `parent_id` or `children_order`; hierarchy
    /// changes go through [`set_parent`](Self::set_parent).
    pub fn update_node(&mut self, id: &NodeId, f: impl FnOnce(&mut Node)) -> Result<Arc<GraphSnapshot>> {
        self.mutate(|g| {
            let node = g.node_mut(id).ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
            f(node);
            Ok(())
        })?;
        Ok(self.snapshot())
    }

    /// Remove a node, every edge touching it, and orphan its children.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<Arc<GraphSnapshot>> {
        let orphans = self.mutate(|g| {
            let idx = g
                .nodes
                .iter()
                .position(|n| &n.id == id)
                .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
            let removed = g.nodes.remove(idx);

            if let Some(parent) = &removed.parent_id {
                detach_child(g, parent, id);
            }

            let mut orphans = 0usize;
            for node in g.nodes.iter_mut() {
                if node.parent_id.as_ref() == Some(id) {
                    node.parent_id = None;
                    orphans += 1;
                }
            }

            g.edges.retain(|e| !e.touches(id));
            Ok(orphans)
        })?;
        debug!(node = %id, orphans, "deleted node");
        Ok(self.snapshot())
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Connect two nodes. `ParentChild` edges go through [`set_parent`](Self::set_parent).
    pub fn create_edge(&mut self, source: &NodeId, target: &NodeId, kind: EdgeKind) -> Result<Arc<GraphSnapshot>> {
        match kind {
            EdgeKind::ParentChild => self.set_parent(target, Some(source)),
            EdgeKind::Regular => self.insert_edge(Edge::new(EdgeId::new(), source.clone(), target.clone(), kind)),
        }
    }

    /// Insert an edge with a caller-chosen id.
    pub fn insert_edge(&mut self, edge: Edge) -> Result<Arc<GraphSnapshot>> {
        if edge.kind == EdgeKind::ParentChild {
            return self.set_parent(&edge.target_id, Some(&edge.source_id));
        }
        self.mutate(|g| {
            if edge.source_id == edge.target_id {
                return Err(GraphError::SelfLoop(edge.source_id.clone()));
            }
            for end in [&edge.source_id, &edge.target_id] {
                if !g.contains_node(end) {
                    return Err(GraphError::NodeNotFound(end.clone()));
                }
            }
            if let Some(existing) = g
                .edges
                .iter()
                .find(|e| e.id == edge.id || (e.kind == EdgeKind::Regular && e.connects(&edge.source_id, &edge.target_id)))
            {
                return Err(GraphError::DuplicateEdge(existing.id.clone()));
            }
            g.edges.push(edge);
            Ok(())
        })?;
        Ok(self.snapshot())
    }

    /// Remove an edge. Removing a `ParentChild` edge clears the child's parent.
    pub fn delete_edge(&mut self, id: &EdgeId) -> Result<Arc<GraphSnapshot>> {
        let edge = self
            .snapshot
            .edge(id)
            .cloned()
            .ok_or_else(|| GraphError::EdgeNotFound(id.clone()))?;
        if edge.kind == EdgeKind::ParentChild {
            return self.set_parent(&edge.target_id, None);
        }
        self.mutate(|g| {
            g.edges.retain(|e| &e.id != id);
            Ok(())
        })?;
        Ok(self.snapshot())
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Reparent `node` (or make it a root with `None`).
    ///
    /// Rejects cycles before touching anything. Keeps `children_order` and
    /// the `ParentChild` edge in step with `parent_id`.
    pub fn set_parent(&mut self, node: &NodeId, parent: Option<&NodeId>) -> Result<Arc<GraphSnapshot>> {
        if !self.snapshot.contains_node(node) {
            return Err(GraphError::NodeNotFound(node.clone()));
        }
        if let Some(parent) = parent {
            if !self.snapshot.contains_node(parent) {
                return Err(GraphError::NodeNotFound(parent.clone()));
            }
            check_reparent(&self.snapshot, node, parent)?;
        }

        self.mutate(|g| {
            let old = g.node(node).and_then(|n| n.parent_id.clone());
            if let Some(old) = &old {
                detach_child(g, old, node);
            }
            if let Some(n) = g.node_mut(node) {
                n.parent_id = parent.cloned();
            }
            if let Some(parent) = parent {
                attach_child(g, parent, node);
            }
            Ok(())
        })?;
        debug!(node = %node, parent = ?parent, "set parent");
        Ok(self.snapshot())
    }
}

/// Append `child` to `parent`'s order and add the hierarchy edge.
fn attach_child(g: &mut GraphSnapshot, parent: &NodeId, child: &NodeId) {
    if let Some(p) = g.node_mut(parent)
        && !p.children_order.contains(child)
    {
        p.children_order.push(child.clone());
    }
    g.edges.retain(|e| !(e.kind == EdgeKind::ParentChild && &e.target_id == child));
    g.edges.push(Edge::parent_child(parent.clone(), child.clone()));
}

/// Drop `child` from `parent`'s order and remove the hierarchy edge.
fn detach_child(g: &mut GraphSnapshot, parent: &NodeId, child: &NodeId) {
    if let Some(p) = g.node_mut(parent) {
        p.children_order.retain(|c| c != child);
    }
    g.edges
        .retain(|e| !(e.kind == EdgeKind::ParentChild && &e.source_id == parent && &e.target_id == child));
}

/// Check every invariant a snapshot must hold before it may be installed.
///
/// - node and edge ids are non-empty and unique
/// - edge endpoints exist, no self-loops
/// - `parent_id` references an existing node and the hierarchy is acyclic
/// - `ParentChild` edges agree with `parent_id`, at most one per child
pub fn validate_snapshot(snapshot: &GraphSnapshot) -> Result<()> {
    let mut node_ids = HashSet::new();
    for node in &snapshot.nodes {
        if node.id.is_empty() {
            return Err(GraphError::InvalidSnapshot("node with empty id".into()));
        }
        if !node_ids.insert(&node.id) {
            return Err(GraphError::InvalidSnapshot(format!("duplicate node id {}", node.id)));
        }
    }

    for node in &snapshot.nodes {
        if let Some(parent) = &node.parent_id
            && !node_ids.contains(parent)
        {
            return Err(GraphError::InvalidSnapshot(format!(
                "node {} has missing parent {}",
                node.id, parent
            )));
        }
    }

    let mut edge_ids = HashSet::new();
    let mut parented = HashSet::new();
    for edge in &snapshot.edges {
        if edge.id.is_empty() || !edge_ids.insert(&edge.id) {
            return Err(GraphError::InvalidSnapshot(format!("duplicate or empty edge id {:?}", edge.id)));
        }
        if !node_ids.contains(&edge.source_id) || !node_ids.contains(&edge.target_id) {
            return Err(GraphError::InvalidSnapshot(format!(
                "edge {} references a missing node ({} -> {})",
                edge.id, edge.source_id, edge.target_id
            )));
        }
        if edge.source_id == edge.target_id {
            return Err(GraphError::InvalidSnapshot(format!("edge {} is a self-loop", edge.id)));
        }
        if edge.kind == EdgeKind::ParentChild {
            let agrees = snapshot
                .node(&edge.target_id)
                .and_then(|n| n.parent_id.as_ref())
                == Some(&edge.source_id);
            if !agrees {
                return Err(GraphError::InvalidSnapshot(format!(
                    "parent-child edge {} disagrees with {}'s parent",
                    edge.id, edge.target_id
                )));
            }
            if !parented.insert(&edge.target_id) {
                return Err(GraphError::InvalidSnapshot(format!(
                    "node {} is the target of more than one parent-child edge",
                    edge.target_id
                )));
            }
        }
    }

    if let Some(cycle) = find_cycle(snapshot) {
        return Err(GraphError::InvalidSnapshot(format!("hierarchy cycle through {cycle:?}")));
    }

    Ok(())
}
