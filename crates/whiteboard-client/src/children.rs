//! Child creation and reparenting against the content service.
//!
//! Creating a child is a round trip: we compute the placement locally, the
//! content service persists the node and its parent-child edge and answers
//! with the whole graph, and that graph is installed (and re-bound) as one
//! history entry. Any failure before installation leaves the local graph
//! exactly as it was.
//!
//! Reparenting runs the local cycle check first, then asks the server.

use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use whiteboard_graph::{ChildPlacement, CycleError, GraphError, HistoryManager, NodeBinder, check_reparent};
use whiteboard_types::{GraphSnapshot, NodeContent, NodeId, NodeKind, WhiteboardId};

use crate::services::{ContentService, CreateChildRequest, HierarchyCheck, ResponseStatus, ServiceError};

/// Errors from child creation or reparenting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChildError {
    #[error("parent node not found: {0:?}")]
    ParentNotFound(NodeId),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("content service call failed: {0}")]
    Service(#[from] ServiceError),

    #[error("content service refused: {0}")]
    Refused(String),

    #[error("content service response missing {0}")]
    IncompleteResponse(&'static str),

    #[error("server rejected reparenting {node:?} under {proposed_parent:?}: cycle via {path:?}")]
    RemoteCycle {
        node: NodeId,
        proposed_parent: NodeId,
        path: Vec<NodeId>,
    },
}

impl ChildError {
    /// The offending ancestor path, for hierarchy rejections.
    pub fn cycle_path(&self) -> Option<&[NodeId]> {
        match self {
            ChildError::Graph(GraphError::Cycle(CycleError { path, .. })) => Some(path),
            ChildError::RemoteCycle { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Build the `createChildNode` request for a child of `parent`.
pub fn plan_child<R: Rng + ?Sized>(
    snapshot: &GraphSnapshot,
    parent: &NodeId,
    kind: NodeKind,
    initial_content: Option<NodeContent>,
    is_generating: bool,
    placement: &ChildPlacement,
    rng: &mut R,
) -> Result<CreateChildRequest, ChildError> {
    let parent_node = snapshot
        .node(parent)
        .ok_or_else(|| ChildError::ParentNotFound(parent.clone()))?;
    Ok(CreateChildRequest {
        kind,
        parent_id: parent.clone(),
        position: placement.place(parent_node, rng),
        initial_content,
        is_generating,
    })
}

/// Send a planned child to the content service and install the result.
///
/// Returns the new node's id. On any error the history is untouched.
pub async fn create_child<B: NodeBinder>(
    content: &Arc<dyn ContentService>,
    whiteboard: &WhiteboardId,
    history: &mut HistoryManager<B>,
    request: CreateChildRequest,
) -> Result<NodeId, ChildError> {
    let span = info_span!(
        "child.create",
        whiteboard = %whiteboard,
        parent = %request.parent_id,
        kind = %request.kind,
    );
    async move {
        let parent = request.parent_id.clone();
        let response = content.create_child_node(whiteboard, request).await?;

        if response.status == ResponseStatus::Error {
            let reason = response.error.unwrap_or_else(|| "unspecified error".to_string());
            warn!(%reason, "content service refused child creation");
            return Err(ChildError::Refused(reason));
        }
        let graph = response.updated_graph.ok_or(ChildError::IncompleteResponse("updatedGraph"))?;
        let new_id = response.new_node_id.ok_or(ChildError::IncompleteResponse("newNodeId"))?;
        if !graph.contains_node(&new_id) {
            return Err(ChildError::IncompleteResponse("new node in updatedGraph"));
        }
        if graph.node(&new_id).and_then(|n| n.parent_id.as_ref()) != Some(&parent) {
            warn!(node = %new_id, "server placed new node under a different parent");
        }

        history.install(graph)?;
        info!(node = %new_id, "child created");
        Ok(new_id)
    }
    .instrument(span)
    .await
}

/// Move `node` under `parent` (or to the root with `None`) after local and
/// remote validation. Records one history entry on success.
pub async fn reparent<B: NodeBinder>(
    content: &Arc<dyn ContentService>,
    whiteboard: &WhiteboardId,
    history: &mut HistoryManager<B>,
    node: &NodeId,
    parent: Option<&NodeId>,
) -> Result<Arc<GraphSnapshot>, ChildError> {
    if let Some(parent) = parent {
        let snapshot = history.snapshot();
        if !snapshot.contains_node(node) {
            return Err(GraphError::NodeNotFound(node.clone()).into());
        }
        if !snapshot.contains_node(parent) {
            return Err(ChildError::ParentNotFound(parent.clone()));
        }
        check_reparent(&snapshot, node, parent).map_err(GraphError::from)?;

        let verdict = content
            .validate_hierarchy(
                whiteboard,
                HierarchyCheck { node_id: node.clone(), proposed_parent_id: parent.clone() },
            )
            .await?;
        if !verdict.is_valid {
            let path = verdict.cycle_path.unwrap_or_default();
            warn!(node = %node, parent = %parent, ?path, "server rejected reparent");
            return Err(ChildError::RemoteCycle {
                node: node.clone(),
                proposed_parent: parent.clone(),
                path,
            });
        }
    }

    let snapshot = history.set_parent(node, parent)?;
    debug!(node = %node, parent = ?parent, "reparented");
    Ok(snapshot)
}
