//! Transient buffer for high-frequency edits (dragging, resizing, typing).
//!
//! Pointer-move and keystroke updates land here instead of in the store.
//! The view renders the committed snapshot with these overrides applied on
//! top; on a commit boundary (pointer-up, blur, idle timer) the history
//! manager folds the whole buffer into a single entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use whiteboard_types::{GraphSnapshot, NodeContent, NodeId, Position, Size};

/// Pending overrides per node, newest value wins.
#[derive(Clone, Debug, Default)]
pub struct LiveEdits {
    positions: HashMap<NodeId, Position>,
    sizes: HashMap<NodeId, Size>,
    contents: HashMap<NodeId, NodeContent>,
    last_touch: Option<Instant>,
}

/// Everything a commit needs to fold in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiveBatch {
    pub positions: Vec<(NodeId, Position)>,
    pub sizes: Vec<(NodeId, Size)>,
    pub contents: Vec<(NodeId, NodeContent)>,
}

impl LiveBatch {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.sizes.is_empty() && self.contents.is_empty()
    }
}

impl LiveEdits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_position(&mut self, id: NodeId, position: Position) {
        self.positions.insert(id, position);
        self.touch();
    }

    pub fn stage_size(&mut self, id: NodeId, size: Size) {
        self.sizes.insert(id, size);
        self.touch();
    }

    /// Stage a full replacement of a node's content (the text being typed).
    pub fn stage_content(&mut self, id: NodeId, content: NodeContent) {
        self.contents.insert(id, content);
        self.touch();
    }

    fn touch(&mut self) {
        self.last_touch = Some(Instant::now());
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.sizes.is_empty() && self.contents.is_empty()
    }

    /// True once nothing has been staged for at least `idle`.
    pub fn is_idle(&self, now: Instant, idle: Duration) -> bool {
        match self.last_touch {
            Some(at) => !self.is_empty() && now.saturating_duration_since(at) >= idle,
            None => false,
        }
    }

    /// The committed snapshot with every override applied.
    ///
    /// Overrides for nodes the snapshot doesn't contain are ignored, as are
    /// content overrides whose kind no longer matches the node.
    pub fn overlay(&self, base: &GraphSnapshot) -> GraphSnapshot {
        let mut view = base.clone();
        for node in view.nodes.iter_mut() {
            if let Some(pos) = self.positions.get(&node.id) {
                node.position = *pos;
            }
            if let Some(size) = self.sizes.get(&node.id) {
                node.size = Some(*size);
            }
            if let Some(content) = self.contents.get(&node.id)
                && content.kind() == node.kind()
            {
                node.content = content.clone();
            }
        }
        view
    }

    /// Take everything, leaving the buffer empty.
    pub fn drain(&mut self) -> LiveBatch {
        self.last_touch = None;
        LiveBatch {
            positions: self.positions.drain().collect(),
            sizes: self.sizes.drain().collect(),
            contents: self.contents.drain().collect(),
        }
    }

    /// Throw pending edits away (Escape during a drag).
    pub fn clear(&mut self) {
        self.positions.clear();
        self.sizes.clear();
        self.contents.clear();
        self.last_touch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whiteboard_types::{Node, NodeKind};

    fn base() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![
                Node::new("a".into(), NodeKind::Idea, Position::default()),
                Node::new("t".into(), NodeKind::Topic, Position::default()),
            ],
            vec![],
        )
    }

    #[test]
    fn test_overlay_applies_newest_override() {
        let mut live = LiveEdits::new();
        live.stage_position("a".into(), Position::new(1.0, 1.0));
        live.stage_position("a".into(), Position::new(5.0, 7.0));
        live.stage_size("a".into(), Size::new(10.0, 10.0));

        let view = live.overlay(&base());
        let a = view.node(&"a".into()).unwrap();
        assert_eq!(a.position, Position::new(5.0, 7.0));
        assert_eq!(a.size, Some(Size::new(10.0, 10.0)));
        // Base untouched.
        assert_eq!(base().node(&"a".into()).unwrap().position, Position::default());
    }

    #[test]
    fn test_overlay_skips_missing_nodes_and_wrong_kind() {
        let mut live = LiveEdits::new();
        live.stage_position("ghost".into(), Position::new(1.0, 1.0));
        live.stage_content("t".into(), NodeContent::Idea { text: "nope".into() });

        let view = live.overlay(&base());
        assert_eq!(view, base());
    }

    #[test]
    fn test_drain_empties_buffer() {
        let mut live = LiveEdits::new();
        live.stage_content("a".into(), NodeContent::Idea { text: "hi".into() });
        let batch = live.drain();
        assert_eq!(batch.contents.len(), 1);
        assert!(live.is_empty());
        assert!(live.drain().is_empty());
    }

    #[test]
    fn test_idle_detection() {
        let mut live = LiveEdits::new();
        let now = Instant::now();
        assert!(!live.is_idle(now, Duration::ZERO));

        live.stage_position("a".into(), Position::default());
        let later = Instant::now() + Duration::from_millis(900);
        assert!(live.is_idle(later, Duration::from_millis(800)));
        assert!(!live.is_idle(Instant::now(), Duration::from_secs(60)));

        live.clear();
        assert!(!live.is_idle(later, Duration::ZERO));
    }
}
