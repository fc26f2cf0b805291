//! Error types for graph operations.

use thiserror::Error;
use whiteboard_types::{ContentError, EdgeId, NodeId};

/// Errors that can occur during graph mutation or validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Node not found in the current snapshot.
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Edge not found in the current snapshot.
    #[error("edge not found: {0:?}")]
    EdgeNotFound(EdgeId),

    /// Node id already present.
    #[error("node already exists: {0:?}")]
    DuplicateNode(NodeId),

    /// Edge id already present, or a regular edge with the same endpoints.
    #[error("edge already exists: {0:?}")]
    DuplicateEdge(EdgeId),

    /// An edge from a node to itself.
    #[error("edge would connect {0:?} to itself")]
    SelfLoop(NodeId),

    /// Patch does not fit the node's content.
    #[error("cannot edit content of {node:?}: {source}")]
    Content {
        node: NodeId,
        #[source]
        source: ContentError,
    },

    /// Proposed hierarchy change would create a cycle.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// A snapshot from outside (server, persisted file) breaks an invariant.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Rejected reparent: `node` would become its own ancestor.
///
/// `path` runs from the proposed parent up through its ancestors to the
/// point where `node` was found, so `path.last() == Some(&node)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("reparenting {node:?} under {proposed_parent:?} would create a cycle via {path:?}")]
pub struct CycleError {
    pub node: NodeId,
    pub proposed_parent: NodeId,
    pub path: Vec<NodeId>,
}
