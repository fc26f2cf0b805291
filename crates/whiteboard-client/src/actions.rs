//! Per-node action handles: the behavior a view attaches to each node.
//!
//! ```text
//!   NodeHandle (Clone, Send)     mpsc      Whiteboard session
//!   ┌──────────────────────┐  ────────▶  ┌────────────────────────────┐
//!   │ .edit(patch)         │             │ process_commands()          │
//!   │ .create_child(kind)  │             │   → history / services      │
//!   │ .generate(kind)      │             └────────────────────────────┘
//!   └──────────────────────┘
//! ```
//!
//! Handles carry only the node id and a sender, never a copy of the node,
//! so a handle made before an undo still acts on whatever that id means now.
//! [`ActionBinder`] is the [`NodeBinder`] the session plugs into its history
//! manager; handles are re-derived whenever a snapshot is installed.

use thiserror::Error;
use tokio::sync::mpsc;
use whiteboard_graph::NodeBinder;
use whiteboard_types::{ContentPatch, Node, NodeId, NodeKind};

/// Commands a node handle can issue.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeCommand {
    /// Commit a content edit (blur).
    Edit { node: NodeId, patch: ContentPatch },
    /// Create an empty child through the content service.
    CreateChild { parent: NodeId, kind: NodeKind },
    /// Create a placeholder child and request generated content for it.
    Generate { parent: NodeId, kind: NodeKind },
    /// Re-dispatch generation for an errored placeholder.
    Retry { node: NodeId },
    /// Delete the node.
    Delete { node: NodeId },
    SetColor { node: NodeId, color: Option<String> },
}

impl NodeCommand {
    /// The node this command is about.
    pub fn node(&self) -> &NodeId {
        match self {
            NodeCommand::Edit { node, .. }
            | NodeCommand::Retry { node }
            | NodeCommand::Delete { node }
            | NodeCommand::SetColor { node, .. } => node,
            NodeCommand::CreateChild { parent, .. } | NodeCommand::Generate { parent, .. } => parent,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("whiteboard session closed")]
    SessionClosed,
}

/// Behavior handle for one node.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    node: NodeId,
    tx: mpsc::UnboundedSender<NodeCommand>,
}

impl NodeHandle {
    pub fn node_id(&self) -> &NodeId {
        &self.node
    }

    fn send(&self, command: NodeCommand) -> Result<(), ActionError> {
        self.tx.send(command).map_err(|_| ActionError::SessionClosed)
    }

    pub fn edit(&self, patch: ContentPatch) -> Result<(), ActionError> {
        self.send(NodeCommand::Edit { node: self.node.clone(), patch })
    }

    pub fn create_child(&self, kind: NodeKind) -> Result<(), ActionError> {
        self.send(NodeCommand::CreateChild { parent: self.node.clone(), kind })
    }

    pub fn generate(&self, kind: NodeKind) -> Result<(), ActionError> {
        self.send(NodeCommand::Generate { parent: self.node.clone(), kind })
    }

    pub fn retry(&self) -> Result<(), ActionError> {
        self.send(NodeCommand::Retry { node: self.node.clone() })
    }

    pub fn delete(&self) -> Result<(), ActionError> {
        self.send(NodeCommand::Delete { node: self.node.clone() })
    }

    pub fn set_color(&self, color: Option<String>) -> Result<(), ActionError> {
        self.send(NodeCommand::SetColor { node: self.node.clone(), color })
    }
}

/// Binder producing [`NodeHandle`]s that feed one session's command queue.
#[derive(Clone, Debug)]
pub struct ActionBinder {
    tx: mpsc::UnboundedSender<NodeCommand>,
}

impl ActionBinder {
    /// A binder plus the receiving end of its command queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NodeCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NodeBinder for ActionBinder {
    type Handle = NodeHandle;

    fn bind(&self, node: &Node) -> NodeHandle {
        NodeHandle { node: node.id.clone(), tx: self.tx.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whiteboard_types::Position;

    #[test]
    fn test_handle_commands_reach_queue() {
        let (binder, mut rx) = ActionBinder::channel();
        let node = Node::new("n".into(), NodeKind::Topic, Position::default());
        let handle = binder.bind(&node);

        handle.edit(ContentPatch::PushItem("x".into())).unwrap();
        handle.generate(NodeKind::Note).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first, NodeCommand::Edit { node: "n".into(), patch: ContentPatch::PushItem("x".into()) });
        let second = rx.try_recv().unwrap();
        assert_eq!(second.node(), &NodeId::from("n"));
        assert!(matches!(second, NodeCommand::Generate { kind: NodeKind::Note, .. }));
    }

    #[test]
    fn test_handle_after_session_drop() {
        let (binder, rx) = ActionBinder::channel();
        let handle = binder.bind(&Node::new("n".into(), NodeKind::Idea, Position::default()));
        drop(rx);
        assert_eq!(handle.delete(), Err(ActionError::SessionClosed));
    }
}
