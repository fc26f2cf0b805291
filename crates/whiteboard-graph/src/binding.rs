//! Behavior bindings: the enrichment seam between pure nodes and the outside.
//!
//! Nodes are plain data. Whatever a presentation layer hangs off a node (edit
//! callbacks, "create child" buttons, a generate action) is produced by a
//! [`NodeBinder`] and kept in a side table, [`Bindings`], keyed by node id.
//! The table is re-derived whenever a snapshot is installed wholesale
//! (remote response, undo, redo), so no handle ever points at a node that
//! the current snapshot doesn't contain.

use std::collections::HashMap;

use whiteboard_types::{GraphSnapshot, Node, NodeId};

/// Produces the behavior handle attached to a node.
pub trait NodeBinder {
    type Handle: Clone;

    fn bind(&self, node: &Node) -> Self::Handle;
}

/// Binder for graph-only users (CLI, tests): nothing to attach.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unbound;

impl NodeBinder for Unbound {
    type Handle = ();

    fn bind(&self, _node: &Node) -> Self::Handle {}
}

/// Handles per node for one snapshot.
#[derive(Clone, Debug)]
pub struct Bindings<H> {
    handles: HashMap<NodeId, H>,
}

impl<H> Default for Bindings<H> {
    fn default() -> Self {
        Self { handles: HashMap::new() }
    }
}

impl<H: Clone> Bindings<H> {
    /// Bind every node of `snapshot` from scratch.
    pub fn rebind<B: NodeBinder<Handle = H>>(binder: &B, snapshot: &GraphSnapshot) -> Self {
        let handles = snapshot
            .nodes
            .iter()
            .map(|node| (node.id.clone(), binder.bind(node)))
            .collect();
        Self { handles }
    }

    /// Incremental update after a local edit: bind new nodes, drop gone ones,
    /// keep handles of nodes that survived.
    pub fn sync<B: NodeBinder<Handle = H>>(&mut self, binder: &B, snapshot: &GraphSnapshot) {
        self.handles.retain(|id, _| snapshot.contains_node(id));
        for node in &snapshot.nodes {
            if !self.handles.contains_key(&node.id) {
                self.handles.insert(node.id.clone(), binder.bind(node));
            }
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&H> {
        self.handles.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.handles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
