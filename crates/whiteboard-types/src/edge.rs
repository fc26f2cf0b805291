//! Edge types: directional relationships between nodes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{EdgeId, NodeId};

/// Edge flavor.
///
/// `ParentChild` edges mirror the `parent_id` hierarchy: source is the parent,
/// target the child. `Regular` edges are free-form connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(ascii_case_insensitive)]
pub enum EdgeKind {
    #[default]
    #[strum(serialize = "regular", serialize = "default")]
    Regular,
    #[strum(serialize = "parentChild", serialize = "parent_child", serialize = "hierarchy")]
    ParentChild,
}

impl EdgeKind {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Regular => "regular",
            EdgeKind::ParentChild => "parentChild",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directional connection between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    #[serde(default)]
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(id: EdgeId, source_id: NodeId, target_id: NodeId, kind: EdgeKind) -> Self {
        Self { id, source_id, target_id, kind }
    }

    /// The hierarchy edge for `parent -> child`, with its deterministic id.
    pub fn parent_child(parent: NodeId, child: NodeId) -> Self {
        Self {
            id: EdgeId::parent_child(&parent, &child),
            source_id: parent,
            target_id: child,
            kind: EdgeKind::ParentChild,
        }
    }

    /// Check if either endpoint is `node`.
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source_id == node || &self.target_id == node
    }

    /// Same endpoints in the same direction.
    pub fn connects(&self, source: &NodeId, target: &NodeId) -> bool {
        &self.source_id == source && &self.target_id == target
    }
}
