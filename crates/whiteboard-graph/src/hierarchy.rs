//! Cycle validation for hierarchy edits.
//!
//! The parent/child tree lives in the nodes themselves (`parent_id` plus the
//! parent's `children_order`). These are the checks the store runs before
//! accepting a hierarchy edit, and the load-time cycle scan.

use std::collections::HashSet;

use whiteboard_types::{GraphSnapshot, Node, NodeId};

use crate::CycleError;

/// Maximum expected hierarchy depth. Traversal code uses this as a circuit
/// breaker: exceeding it means a cycle slipped in or the data is corrupt.
pub const MAX_HIERARCHY_DEPTH: usize = 512;

/// Walk from `start` up through its parents: `[start, parent, grandparent, ..]`.
///
/// Stops at a root, a dangling parent reference, a revisited node, or
/// `MAX_HIERARCHY_DEPTH`.
pub fn ancestor_chain(snapshot: &GraphSnapshot, start: &NodeId) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = snapshot.node(start);

    while let Some(node) = current {
        if chain.len() >= MAX_HIERARCHY_DEPTH || !seen.insert(node.id.clone()) {
            break;
        }
        chain.push(node.id.clone());
        current = node.parent_id.as_ref().and_then(|p| snapshot.node(p));
    }

    chain
}

/// Reject making `proposed_parent` the parent of `node` if `node` already sits
/// on the proposed parent's ancestor chain (including the parent itself).
pub fn check_reparent(
    snapshot: &GraphSnapshot,
    node: &NodeId,
    proposed_parent: &NodeId,
) -> Result<(), CycleError> {
    let chain = ancestor_chain(snapshot, proposed_parent);
    match chain.iter().position(|id| id == node) {
        Some(hit) => Err(CycleError {
            node: node.clone(),
            proposed_parent: proposed_parent.clone(),
            path: chain[..=hit].to_vec(),
        }),
        None => Ok(()),
    }
}

/// Find a parent cycle anywhere in the snapshot, returning its members.
pub fn find_cycle(snapshot: &GraphSnapshot) -> Option<Vec<NodeId>> {
    let mut cleared: HashSet<&NodeId> = HashSet::new();

    for start in &snapshot.nodes {
        if cleared.contains(&start.id) {
            continue;
        }
        let mut trail: Vec<&Node> = Vec::new();
        let mut current = Some(start);

        while let Some(node) = current {
            if cleared.contains(&node.id) {
                break;
            }
            if let Some(pos) = trail.iter().position(|n| n.id == node.id) {
                return Some(trail[pos..].iter().map(|n| n.id.clone()).collect());
            }
            trail.push(node);
            current = node.parent_id.as_ref().and_then(|p| snapshot.node(p));
        }

        cleared.extend(trail.iter().map(|n| &n.id));
    }

    None
}
