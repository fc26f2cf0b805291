//! Typed identifiers for whiteboards, nodes, and edges.
//!
//! Ids are opaque strings on the wire. The content service mints its own
//! (node ids come back from `createChildNode`), so the types wrap `String`
//! rather than a fixed-width UUID. Locally minted ids are UUIDv7 text, which
//! keeps them time-ordered in logs. The `short()` form is for human-facing
//! output only, never used as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A whiteboard identifier (the notebook page hosting the graph).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhiteboardId(String);

/// A node identifier, unique within a graph snapshot.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// An edge identifier, unique within a graph snapshot.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a new time-ordered id (UUIDv7 text).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            /// Wrap an id issued elsewhere (server, persisted snapshot).
            pub fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw id text.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 8 characters, for display only.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((idx, _)) => &self.0[..idx],
                    None => &self.0,
                }
            }

            /// Check if this is the empty id (never valid in a snapshot).
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$T> for String {
            fn from(id: $T) -> String {
                id.0
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_string_id!(WhiteboardId, "WhiteboardId");
impl_string_id!(NodeId, "NodeId");
impl_string_id!(EdgeId, "EdgeId");

impl EdgeId {
    /// Deterministic id for the parent→child edge of `child`.
    ///
    /// A node has at most one parent, so the child id alone is enough to make
    /// the edge id unique. Keeps the server's edge id and ours in agreement.
    pub fn parent_child(parent: &NodeId, child: &NodeId) -> Self {
        Self(format!("pc-{}-{}", parent.as_str(), child.as_str()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_short_handles_short_raw_ids() {
        let id = NodeId::from("n1");
        assert_eq!(id.short(), "n1");

        let long = NodeId::from("0123456789abcdef");
        assert_eq!(long.short(), "01234567");
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = WhiteboardId::from("wb-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"wb-42\"");

        let back: WhiteboardId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_debug_uses_type_name() {
        let id = EdgeId::from("e1");
        assert_eq!(format!("{:?}", id), "EdgeId(e1)");
        assert_eq!(id.to_string(), "e1");
    }

    #[test]
    fn test_parent_child_edge_id_is_deterministic() {
        let p = NodeId::from("p");
        let c = NodeId::from("c");
        assert_eq!(EdgeId::parent_child(&p, &c), EdgeId::parent_child(&p, &c));
        assert_ne!(EdgeId::parent_child(&p, &c), EdgeId::parent_child(&c, &p));
    }
}
