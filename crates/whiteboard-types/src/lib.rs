//! Shared identity, node, edge and snapshot types for the whiteboard engine.
//!
//! A pure leaf crate: plain data with serde shapes matching the content
//! service's JSON (`camelCase` fields, `ideaNode`/`topicNode`/`noteNode` kind
//! tags). No behavior is attached to nodes here; bindings are layered on
//! by `whiteboard-graph`.
//!
//! # Overview
//!
//! ```text
//! Whiteboard (WhiteboardId)
//!     └── GraphSnapshot { nodes, edges }   ← unit of undo/redo + persistence
//!           ├── Node (NodeId)
//!           │     ├── content: NodeContent (tag = kind)
//!           │     └── parent_id / children_order (hierarchy)
//!           └── Edge (EdgeId, Regular | ParentChild)
//! ```

pub mod edge;
pub mod ids;
pub mod node;
pub mod snapshot;

pub use edge::{Edge, EdgeKind};
pub use ids::{EdgeId, NodeId, WhiteboardId};
pub use node::{ContentError, ContentPatch, Node, NodeContent, NodeKind, Position, Size};
pub use snapshot::GraphSnapshot;
