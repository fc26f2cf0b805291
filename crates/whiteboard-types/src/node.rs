//! Node types: kinds, kind-specific content, geometry and generation flags.
//!
//! ## Design: content carries the kind
//!
//! A node's kind is not stored next to its content: it *is* the content's
//! tag. `NodeContent` serializes internally tagged (`"kind": "topicNode"`), so
//! a node can never claim to be a Topic while holding free text. Edits arrive
//! as [`ContentPatch`] values which are checked against the tag before they
//! touch anything.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::NodeId;

/// What a node *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum NodeKind {
    /// Free-text idea card.
    #[default]
    #[serde(rename = "ideaNode")]
    #[strum(serialize = "ideaNode", serialize = "idea")]
    Idea,
    /// Ordered list of short strings.
    #[serde(rename = "topicNode")]
    #[strum(serialize = "topicNode", serialize = "topic")]
    Topic,
    /// Free-text note.
    #[serde(rename = "noteNode")]
    #[strum(serialize = "noteNode", serialize = "note")]
    Note,
}

impl NodeKind {
    /// Parse from string (case-insensitive, accepts `idea` and `ideaNode`).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Idea => "ideaNode",
            NodeKind::Topic => "topicNode",
            NodeKind::Note => "noteNode",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canvas coordinates (top-left origin, y grows downward).
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Measured node size. Absent until the renderer has laid the node out.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Zero (or negative) in either dimension, i.e. not laid out yet.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Kind-specific payload. The tag doubles as the node kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeContent {
    #[serde(rename = "ideaNode")]
    Idea {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "topicNode")]
    Topic {
        #[serde(default)]
        items: Vec<String>,
    },
    #[serde(rename = "noteNode")]
    Note {
        #[serde(default)]
        text: String,
    },
}

impl NodeContent {
    /// Empty content of the given kind (what a placeholder starts with).
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Idea => NodeContent::Idea { text: String::new() },
            NodeKind::Topic => NodeContent::Topic { items: Vec::new() },
            NodeKind::Note => NodeContent::Note { text: String::new() },
        }
    }

    /// Map generated text onto a kind's content shape.
    ///
    /// Idea/Note take the text verbatim. Topic takes non-empty trimmed lines,
    /// in order, capped at `max_items`.
    pub fn from_generated(kind: NodeKind, text: &str, max_items: usize) -> Self {
        match kind {
            NodeKind::Idea => NodeContent::Idea { text: text.to_string() },
            NodeKind::Note => NodeContent::Note { text: text.to_string() },
            NodeKind::Topic => NodeContent::Topic {
                items: text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .take(max_items)
                    .map(str::to_string)
                    .collect(),
            },
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeContent::Idea { .. } => NodeKind::Idea,
            NodeContent::Topic { .. } => NodeKind::Topic,
            NodeContent::Note { .. } => NodeKind::Note,
        }
    }

    /// Free text, for Idea/Note.
    pub fn text(&self) -> Option<&str> {
        match self {
            NodeContent::Idea { text } | NodeContent::Note { text } => Some(text),
            NodeContent::Topic { .. } => None,
        }
    }

    /// Items, for Topic.
    pub fn items(&self) -> Option<&[String]> {
        match self {
            NodeContent::Topic { items } => Some(items),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            NodeContent::Idea { text } | NodeContent::Note { text } => text.trim().is_empty(),
            NodeContent::Topic { items } => items.iter().all(|i| i.trim().is_empty()),
        }
    }

    /// Plain-text rendering used as generation context.
    ///
    /// Topic items are written one per line so the generator sees the list
    /// the way a user reads it.
    pub fn to_context_text(&self) -> String {
        match self {
            NodeContent::Idea { text } | NodeContent::Note { text } => text.clone(),
            NodeContent::Topic { items } => items.join("\n"),
        }
    }

    /// Apply a patch, checking it targets this content's kind.
    pub fn apply(&mut self, patch: &ContentPatch) -> Result<(), ContentError> {
        match (self, patch) {
            (NodeContent::Idea { text } | NodeContent::Note { text }, ContentPatch::SetText(new)) => {
                *text = new.clone();
                Ok(())
            }
            (NodeContent::Topic { items }, ContentPatch::SetItems(new)) => {
                *items = new.clone();
                Ok(())
            }
            (NodeContent::Topic { items }, ContentPatch::PushItem(item)) => {
                items.push(item.clone());
                Ok(())
            }
            (NodeContent::Topic { items }, ContentPatch::SetItem { index, value }) => {
                let len = items.len();
                let slot = items
                    .get_mut(*index)
                    .ok_or(ContentError::ItemOutOfBounds { index: *index, len })?;
                *slot = value.clone();
                Ok(())
            }
            (NodeContent::Topic { items }, ContentPatch::RemoveItem { index }) => {
                if *index >= items.len() {
                    return Err(ContentError::ItemOutOfBounds { index: *index, len: items.len() });
                }
                items.remove(*index);
                Ok(())
            }
            (content, patch) => Err(ContentError::KindMismatch {
                kind: content.kind(),
                patch: patch.name(),
            }),
        }
    }
}

/// Partial content update. Text patches fit Idea/Note; item patches fit Topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum ContentPatch {
    SetText(String),
    SetItems(Vec<String>),
    PushItem(String),
    SetItem { index: usize, value: String },
    RemoveItem { index: usize },
}

impl ContentPatch {
    pub fn name(&self) -> &'static str {
        match self {
            ContentPatch::SetText(_) => "setText",
            ContentPatch::SetItems(_) => "setItems",
            ContentPatch::PushItem(_) => "pushItem",
            ContentPatch::SetItem { .. } => "setItem",
            ContentPatch::RemoveItem { .. } => "removeItem",
        }
    }

    /// The patch that replaces a content wholesale.
    pub fn replace_with(content: &NodeContent) -> Self {
        match content {
            NodeContent::Idea { text } | NodeContent::Note { text } => ContentPatch::SetText(text.clone()),
            NodeContent::Topic { items } => ContentPatch::SetItems(items.clone()),
        }
    }
}

/// Errors from applying a [`ContentPatch`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("patch {patch} does not apply to {kind} content")]
    KindMismatch { kind: NodeKind, patch: &'static str },
    #[error("item index {index} out of bounds for topic with {len} items")]
    ItemOutOfBounds { index: usize, len: usize },
}

/// A whiteboard node. Plain data; behavior is attached elsewhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    pub content: NodeContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children_order: Vec<NodeId>,
    #[serde(default)]
    pub is_generating: bool,
    #[serde(default)]
    pub has_generation_error: bool,
    /// Human-readable reason for `has_generation_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Node {
    /// A new root node with empty content of `kind`.
    pub fn new(id: NodeId, kind: NodeKind, position: Position) -> Self {
        Self {
            id,
            position,
            size: None,
            content: NodeContent::empty(kind),
            parent_id: None,
            children_order: Vec::new(),
            is_generating: false,
            has_generation_error: false,
            generation_error: None,
            color: None,
        }
    }

    /// An empty node flagged as waiting for generated content.
    pub fn placeholder(id: NodeId, kind: NodeKind, position: Position, parent_id: NodeId) -> Self {
        Self {
            parent_id: Some(parent_id),
            is_generating: true,
            ..Self::new(id, kind, position)
        }
    }

    pub fn with_content(mut self, content: NodeContent) -> Self {
        self.content = content;
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_parent(mut self, parent_id: NodeId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.content.kind()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Size the renderer measured, or zero if not laid out yet.
    pub fn measured_size(&self) -> Size {
        self.size.unwrap_or_default()
    }

    /// Flip into the errored state, keeping the node for retry or removal.
    pub fn mark_generation_failed(&mut self, reason: impl Into<String>) {
        self.is_generating = false;
        self.has_generation_error = true;
        self.generation_error = Some(reason.into());
    }

    /// Flip into the in-flight state (initial dispatch or retry).
    pub fn mark_generating(&mut self) {
        self.is_generating = true;
        self.has_generation_error = false;
        self.generation_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!(NodeKind::from_str("topic"), Some(NodeKind::Topic));
        assert_eq!(NodeKind::from_str("TopicNode"), Some(NodeKind::Topic));
        assert_eq!(NodeKind::from_str("ideaNode"), Some(NodeKind::Idea));
        assert_eq!(NodeKind::from_str("kanban"), None);
    }

    #[test]
    fn test_topic_from_generated_trims_and_drops_blank_lines() {
        let content = NodeContent::from_generated(NodeKind::Topic, "a\n\nb\n c \n", 5);
        assert_eq!(content.items().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_topic_from_generated_caps_items() {
        let text = "1\n2\n3\n4\n5\n6\n7";
        let content = NodeContent::from_generated(NodeKind::Topic, text, 5);
        assert_eq!(content.items().unwrap(), ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_text_kinds_take_generated_text_verbatim() {
        let raw = "  line one\n\nline two  ";
        let idea = NodeContent::from_generated(NodeKind::Idea, raw, 5);
        let note = NodeContent::from_generated(NodeKind::Note, raw, 5);
        assert_eq!(idea.text(), Some(raw));
        assert_eq!(note.text(), Some(raw));
        assert_eq!(note.kind(), NodeKind::Note);
    }

    #[test]
    fn test_patch_kind_mismatch_is_rejected() {
        let mut content = NodeContent::empty(NodeKind::Topic);
        let err = content.apply(&ContentPatch::SetText("x".into())).unwrap_err();
        assert_eq!(err, ContentError::KindMismatch { kind: NodeKind::Topic, patch: "setText" });
        assert_eq!(content, NodeContent::empty(NodeKind::Topic));
    }

    #[test]
    fn test_topic_item_patches() {
        let mut content = NodeContent::Topic { items: vec!["a".into(), "b".into()] };
        content.apply(&ContentPatch::PushItem("c".into())).unwrap();
        content.apply(&ContentPatch::SetItem { index: 0, value: "A".into() }).unwrap();
        content.apply(&ContentPatch::RemoveItem { index: 1 }).unwrap();
        assert_eq!(content.items().unwrap(), ["A", "c"]);

        let err = content.apply(&ContentPatch::RemoveItem { index: 9 }).unwrap_err();
        assert_eq!(err, ContentError::ItemOutOfBounds { index: 9, len: 2 });
    }

    #[test]
    fn test_node_serde_shape() {
        let node = Node::new(NodeId::from("n1"), NodeKind::Topic, Position::new(1.0, 2.0))
            .with_content(NodeContent::Topic { items: vec!["x".into()] });
        let json = serde_json::to_value(&node).unwrap();

        assert_eq!(json["content"]["kind"], "topicNode");
        assert_eq!(json["content"]["items"][0], "x");
        assert_eq!(json["isGenerating"], false);
        assert!(json.get("parentId").is_none());

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_node_deserializes_with_missing_optional_fields() {
        let json = r#"{"id":"n2","position":{"x":0,"y":0},"content":{"kind":"noteNode"}}"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.kind(), NodeKind::Note);
        assert_eq!(node.content.text(), Some(""));
        assert!(!node.is_generating);
        assert!(node.children_order.is_empty());
    }

    #[test]
    fn test_generation_flags() {
        let mut node = Node::placeholder(NodeId::from("c"), NodeKind::Idea, Position::default(), NodeId::from("p"));
        assert!(node.is_generating);
        node.mark_generation_failed("boom");
        assert!(!node.is_generating);
        assert!(node.has_generation_error);
        node.mark_generating();
        assert!(node.is_generating);
        assert!(!node.has_generation_error);
        assert_eq!(node.generation_error, None);
    }
}
