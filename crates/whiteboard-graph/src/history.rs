//! Undo/redo history over the graph store.
//!
//! ```text
//!  entries: [S0] [S1] [S2] [S3]
//!                       ^cursor
//!  commit(S4)  → [S0] [S1] [S2] [S4]      (S3 discarded)
//!  undo()      → cursor-1, store ← entries[cursor], rebind
//!  redo()      → cursor+1, store ← entries[cursor], rebind
//! ```
//!
//! Entries are `Arc<GraphSnapshot>`; identity is the `Arc`, never deep
//! equality. `0 <= cursor < entries.len()` always holds: the manager starts
//! with the initial snapshot as entry zero.
//!
//! Discrete actions (create, delete, connect, reparent, recolor, a content
//! edit on blur) each record exactly one entry. Dragging and typing go
//! through the [`LiveEdits`] buffer and are folded into one entry by
//! [`commit_live`](HistoryManager::commit_live).
//!
//! Generation results are not user actions. [`rewrite_node`](HistoryManager::rewrite_node)
//! patches the node in place across every entry that contains it, so undo
//! never brings back a finished spinner.

use std::sync::Arc;

use tracing::{debug, trace, warn};
use whiteboard_types::{
    ContentPatch, EdgeId, EdgeKind, GraphSnapshot, Node, NodeContent, NodeId, NodeKind, Position, Size,
};

use crate::binding::{Bindings, NodeBinder};
use crate::live::{LiveBatch, LiveEdits};
use crate::store::GraphStore;
use crate::Result;

/// Default number of retained entries.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Where [`HistoryManager::rewrite_node`] found the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteScope {
    /// In the current snapshot (and possibly other entries).
    Current,
    /// Only in entries away from the cursor.
    History,
    /// Nowhere; nothing was touched.
    Absent,
}

impl RewriteScope {
    pub fn is_current(self) -> bool {
        self == RewriteScope::Current
    }
}

/// History manager wrapping a [`GraphStore`] and its node bindings.
pub struct HistoryManager<B: NodeBinder> {
    store: GraphStore,
    entries: Vec<Arc<GraphSnapshot>>,
    cursor: usize,
    limit: usize,
    binder: B,
    bindings: Bindings<B::Handle>,
    live: LiveEdits,
}

impl<B: NodeBinder> HistoryManager<B> {
    /// Empty graph, one entry.
    pub fn new(binder: B, limit: usize) -> Self {
        let store = GraphStore::new();
        let initial = store.snapshot();
        let bindings = Bindings::rebind(&binder, &initial);
        Self {
            store,
            entries: vec![initial],
            cursor: 0,
            limit: limit.max(1),
            binder,
            bindings,
            live: LiveEdits::new(),
        }
    }

    /// Start from a loaded snapshot (validated); history holds just that.
    pub fn with_snapshot(binder: B, snapshot: GraphSnapshot, limit: usize) -> Result<Self> {
        let mut manager = Self::new(binder, limit);
        manager.reset(snapshot)?;
        Ok(manager)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Committed snapshot.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.store.snapshot()
    }

    /// What the user sees: committed snapshot plus pending live edits.
    pub fn view(&self) -> Arc<GraphSnapshot> {
        if self.live.is_empty() {
            self.store.snapshot()
        } else {
            Arc::new(self.live.overlay(&self.store.snapshot()))
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.store.node(id)
    }

    pub fn binder(&self) -> &B {
        &self.binder
    }

    pub fn bindings(&self) -> &Bindings<B::Handle> {
        &self.bindings
    }

    pub fn handle(&self, id: &NodeId) -> Option<&B::Handle> {
        self.bindings.get(id)
    }

    pub fn live(&self) -> &LiveEdits {
        &self.live
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    // =========================================================================
    // Commit / undo / redo
    // =========================================================================

    /// Record the store's current snapshot as a new entry.
    ///
    /// Truncates any redo tail, appends, advances. Re-recording the snapshot
    /// already at the cursor is a no-op.
    fn record(&mut self) -> Arc<GraphSnapshot> {
        let snapshot = self.store.snapshot();
        if Arc::ptr_eq(&snapshot, &self.entries[self.cursor]) {
            return snapshot;
        }

        self.entries.truncate(self.cursor + 1);
        self.entries.push(Arc::clone(&snapshot));
        self.cursor += 1;

        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
            self.cursor -= excess;
        }

        self.bindings.sync(&self.binder, &snapshot);
        trace!(cursor = self.cursor, entries = self.entries.len(), "history commit");
        snapshot
    }

    /// Validate and commit an externally built snapshot as one entry.
    pub fn commit(&mut self, snapshot: GraphSnapshot) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.replace(snapshot)?;
        Ok(self.record())
    }

    /// Install a server-issued snapshot as one entry and rebind every node.
    pub fn install(&mut self, snapshot: GraphSnapshot) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.replace(snapshot)?;
        let snapshot = self.record();
        self.bindings = Bindings::rebind(&self.binder, &snapshot);
        debug!(nodes = snapshot.node_count(), edges = snapshot.edge_count(), "installed snapshot");
        Ok(snapshot)
    }

    /// Replace everything (initial load): history collapses to this snapshot.
    pub fn reset(&mut self, snapshot: GraphSnapshot) -> Result<Arc<GraphSnapshot>> {
        self.store.replace(snapshot)?;
        let snapshot = self.store.snapshot();
        self.entries = vec![Arc::clone(&snapshot)];
        self.cursor = 0;
        self.live.clear();
        self.bindings = Bindings::rebind(&self.binder, &snapshot);
        Ok(snapshot)
    }

    /// Step back. `None` at the first entry. Pending live edits are dropped.
    pub fn undo(&mut self) -> Option<Arc<GraphSnapshot>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.restore_cursor())
    }

    /// Step forward. `None` at the newest entry.
    pub fn redo(&mut self) -> Option<Arc<GraphSnapshot>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.restore_cursor())
    }

    fn restore_cursor(&mut self) -> Arc<GraphSnapshot> {
        let snapshot = Arc::clone(&self.entries[self.cursor]);
        self.live.clear();
        self.store.restore(Arc::clone(&snapshot));
        self.bindings = Bindings::rebind(&self.binder, &snapshot);
        trace!(cursor = self.cursor, "history restore");
        snapshot
    }

    // =========================================================================
    // Discrete actions (one entry each)
    // =========================================================================

    pub fn create_node(&mut self, kind: NodeKind, position: Position, initial: Option<NodeContent>) -> Result<Node> {
        self.flush_live();
        let node = self.store.create_node(kind, position, initial)?;
        self.record();
        Ok(node)
    }

    /// Insert a fully formed node (placeholder, server-issued).
    pub fn insert_node(&mut self, node: Node) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.insert_node(node)?;
        Ok(self.record())
    }

    /// Content edit at a commit boundary (blur).
    pub fn update_node_content(&mut self, id: &NodeId, patch: &ContentPatch) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.update_node_content(id, patch)?;
        Ok(self.record())
    }

    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.move_node(id, position)?;
        Ok(self.record())
    }

    pub fn resize_node(&mut self, id: &NodeId, size: Size) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.resize_node(id, size)?;
        Ok(self.record())
    }

    pub fn set_color(&mut self, id: &NodeId, color: Option<String>) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.set_color(id, color)?;
        Ok(self.record())
    }

    pub fn delete_node(&mut self, id: &NodeId) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.delete_node(id)?;
        Ok(self.record())
    }

    pub fn create_edge(&mut self, source: &NodeId, target: &NodeId, kind: EdgeKind) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.create_edge(source, target, kind)?;
        Ok(self.record())
    }

    pub fn delete_edge(&mut self, id: &EdgeId) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.delete_edge(id)?;
        Ok(self.record())
    }

    pub fn set_parent(&mut self, node: &NodeId, parent: Option<&NodeId>) -> Result<Arc<GraphSnapshot>> {
        self.flush_live();
        self.store.set_parent(node, parent)?;
        Ok(self.record())
    }

    // =========================================================================
    // Live edits
    // =========================================================================

    pub fn live_move(&mut self, id: NodeId, position: Position) {
        self.live.stage_position(id, position);
    }

    pub fn live_resize(&mut self, id: NodeId, size: Size) {
        self.live.stage_size(id, size);
    }

    pub fn live_content(&mut self, id: NodeId, content: NodeContent) {
        self.live.stage_content(id, content);
    }

    /// Fold pending live edits into a single entry.
    ///
    /// Returns `None` when the graph did not change. Overrides for nodes
    /// that disappeared meanwhile are dropped with a warning.
    pub fn commit_live(&mut self) -> Option<Arc<GraphSnapshot>> {
        let batch = self.live.drain();
        if batch.is_empty() {
            return None;
        }
        let before = self.store.snapshot();
        self.apply_batch(batch);
        if Arc::ptr_eq(&before, &self.store.snapshot()) {
            return None;
        }
        Some(self.record())
    }

    /// Throw pending live edits away.
    pub fn discard_live(&mut self) {
        self.live.clear();
    }

    fn flush_live(&mut self) {
        self.commit_live();
    }

    fn apply_batch(&mut self, batch: LiveBatch) {
        for (id, position) in batch.positions {
            if let Err(e) = self.store.move_node(&id, position) {
                warn!(node = %id, error = %e, "dropping live move");
            }
        }
        for (id, size) in batch.sizes {
            if let Err(e) = self.store.resize_node(&id, size) {
                warn!(node = %id, error = %e, "dropping live resize");
            }
        }
        for (id, content) in batch.contents {
            if let Err(e) = self.store.update_node_content(&id, &ContentPatch::replace_with(&content)) {
                warn!(node = %id, error = %e, "dropping live content edit");
            }
        }
    }

    // =========================================================================
    // Non-undoable patches
    // =========================================================================

    /// Patch a node without creating an entry, rewriting it in every entry
    /// that contains it.
    ///
    /// A node that is only in undone or redoable entries is still patched
    /// there, so stepping back to it shows the result. Nothing changes when
    /// no entry holds the node.
    pub fn rewrite_node(&mut self, id: &NodeId, f: impl Fn(&mut Node)) -> Result<RewriteScope> {
        let in_current = self.store.node(id).is_some();
        if in_current {
            self.store.update_node(id, &f)?;
        }
        let current = self.store.snapshot();

        let mut rewritten = 0usize;
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if idx == self.cursor {
                if in_current {
                    *entry = Arc::clone(&current);
                }
                continue;
            }
            if entry.contains_node(id) {
                let mut patched = GraphSnapshot::clone(entry);
                if let Some(node) = patched.node_mut(id) {
                    f(node);
                }
                *entry = Arc::new(patched);
                rewritten += 1;
            }
        }

        trace!(node = %id, in_current, other_entries = rewritten, "rewrote node across history");
        Ok(match (in_current, rewritten) {
            (true, _) => RewriteScope::Current,
            (false, 0) => RewriteScope::Absent,
            (false, _) => RewriteScope::History,
        })
    }
}
