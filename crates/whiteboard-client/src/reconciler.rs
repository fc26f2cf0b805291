//! Generation reconciliation: matching pushed results to placeholder nodes.
//!
//! # Lifecycle
//!
//! ```text
//! PlaceholderInserted ──▶ AwaitingEvent ──┬──▶ Completed
//!                                         ├──▶ Errored   (error event, timeout, dispatch failure)
//!                                         ├──▶ Shelved   (node only in undone/redoable entries)
//!                                         └──▶ Orphaned  (node in no history entry)
//! ```
//!
//! The reconciler only tracks requests; the graph lives in the history
//! manager passed to each call. Results are written with
//! [`HistoryManager::rewrite_node`], so they are not undoable and patch the
//! node in every history entry that contains it.
//!
//! A completion for a node we never tracked is still applied if the node
//! exists (the request may predate this session). A result for a node that
//! was undone away is written into the entries that still hold it, so redo
//! never brings back a stuck spinner. A result for a node no entry holds is
//! dropped without touching anything.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, info_span, trace, warn};
use whiteboard_graph::{GraphError, HistoryManager, NodeBinder, RewriteScope};
use whiteboard_types::{NodeContent, NodeId, NodeKind, WhiteboardId};

use crate::children::ChildError;
use crate::constants::{GENERATION_TIMEOUT, TOPIC_MAX_ITEMS};
use crate::services::{GenerationRequest, ServiceError};
use crate::subscriptions::PushEvent;

/// Errors from generation requests.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("node {0:?} has no parent to generate from")]
    NoParent(NodeId),

    #[error("node {0:?} is not in a retryable state")]
    NotRetryable(NodeId),

    #[error("placeholder creation failed: {0}")]
    Placeholder(#[from] ChildError),

    #[error("generation dispatch failed: {0}")]
    Dispatch(#[from] ServiceError),

    #[error("generation service refused: {0}")]
    Refused(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Where a tracked request stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationPhase {
    PlaceholderInserted,
    AwaitingEvent,
}

/// A request in flight, keyed by placeholder node id.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingGeneration {
    pub node_id: NodeId,
    pub parent_id: NodeId,
    pub kind: NodeKind,
    /// Parent content as it was when the request was made.
    pub parent_content: String,
    pub phase: GenerationPhase,
    pub started: Instant,
    /// 1 for the first dispatch, +1 per retry after a failure.
    pub attempts: u32,
}

/// What applying a push event did.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// Content written, spinner cleared.
    Completed { node: NodeId },
    /// Node kept and flagged as failed.
    Errored { node: NodeId, reason: String },
    /// The node is not in the current graph but undo/redo entries hold it;
    /// the result was written there. The current graph did not change.
    Shelved { node: NodeId },
    /// No history entry holds the node; nothing changed.
    Orphaned { node: NodeId },
    /// The event was not for us.
    Skipped { reason: SkipReason },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    WrongWhiteboard { expected: WhiteboardId, got: WhiteboardId },
}

/// Tracks generation requests for one whiteboard.
#[derive(Clone, Debug)]
pub struct GenerationReconciler {
    whiteboard: WhiteboardId,
    pending: HashMap<NodeId, PendingGeneration>,
    /// Attempts made for nodes whose last request failed.
    failed: HashMap<NodeId, u32>,
    timeout: Duration,
    topic_max_items: usize,
}

impl GenerationReconciler {
    pub fn new(whiteboard: WhiteboardId) -> Self {
        Self::with_limits(whiteboard, GENERATION_TIMEOUT, TOPIC_MAX_ITEMS)
    }

    pub fn with_limits(whiteboard: WhiteboardId, timeout: Duration, topic_max_items: usize) -> Self {
        Self { whiteboard, pending: HashMap::new(), failed: HashMap::new(), timeout, topic_max_items }
    }

    pub fn whiteboard(&self) -> &WhiteboardId {
        &self.whiteboard
    }

    pub fn pending(&self, node: &NodeId) -> Option<&PendingGeneration> {
        self.pending.get(node)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, node: &NodeId) -> bool {
        self.pending.contains_key(node)
    }

    // =========================================================================
    // Request side
    // =========================================================================

    /// Track a placeholder that has just been installed.
    ///
    /// A fresh request for the same node replaces the old one and counts as
    /// another attempt, as does one for a node whose last request failed.
    pub fn track(&mut self, node_id: NodeId, parent_id: NodeId, kind: NodeKind, parent_content: String, now: Instant) {
        let previous = self
            .pending
            .get(&node_id)
            .map(|p| p.attempts)
            .or_else(|| self.failed.remove(&node_id));
        let attempts = previous.map_or(1, |n| n + 1);
        debug!(node = %node_id, parent = %parent_id, %kind, attempts, "tracking generation");
        self.pending.insert(
            node_id.clone(),
            PendingGeneration {
                node_id,
                parent_id,
                kind,
                parent_content,
                phase: GenerationPhase::PlaceholderInserted,
                started: now,
                attempts,
            },
        );
    }

    /// The dispatch payload for a tracked node.
    pub fn request_for(&self, node: &NodeId) -> Option<GenerationRequest> {
        self.pending.get(node).map(|p| GenerationRequest {
            whiteboard_id: self.whiteboard.clone(),
            node_id: p.node_id.clone(),
            parent_id: p.parent_id.clone(),
            kind: p.kind,
            parent_content_text: p.parent_content.clone(),
        })
    }

    /// The generation service accepted the request.
    pub fn mark_dispatched(&mut self, node: &NodeId) {
        if let Some(p) = self.pending.get_mut(node) {
            p.phase = GenerationPhase::AwaitingEvent;
        }
    }

    /// The generation service refused or couldn't be reached: flag the
    /// placeholder as errored and stop tracking it.
    pub fn fail_dispatch<B: NodeBinder>(&mut self, history: &mut HistoryManager<B>, node: &NodeId, reason: &str) -> bool {
        self.settle_failed(node);
        warn!(node = %node, %reason, "generation dispatch failed");
        mark_failed(history, node, reason).is_current()
    }

    /// Prepare a retry for an errored placeholder.
    ///
    /// Re-reads the parent's current content, flips the node back to
    /// generating, and returns the payload to dispatch.
    pub fn retry<B: NodeBinder>(
        &mut self,
        history: &mut HistoryManager<B>,
        node: &NodeId,
        now: Instant,
    ) -> Result<GenerationRequest, GenerationError> {
        let current = history
            .node(node)
            .ok_or_else(|| GenerationError::NodeNotFound(node.clone()))?;
        if !current.has_generation_error || current.is_generating {
            return Err(GenerationError::NotRetryable(node.clone()));
        }
        let parent_id = current
            .parent_id
            .clone()
            .ok_or_else(|| GenerationError::NoParent(node.clone()))?;
        let kind = current.kind();
        let parent_content = history
            .node(&parent_id)
            .map(|p| p.content.to_context_text())
            .ok_or_else(|| GenerationError::NoParent(node.clone()))?;

        history.rewrite_node(node, |n| n.mark_generating())?;
        self.track(node.clone(), parent_id, kind, parent_content, now);
        info!(node = %node, "retrying generation");
        self.request_for(node).ok_or_else(|| GenerationError::NodeNotFound(node.clone()))
    }

    /// Stop tracking (node deleted locally).
    pub fn forget(&mut self, node: &NodeId) -> bool {
        self.failed.remove(node);
        self.pending.remove(node).is_some()
    }

    /// Stop tracking a request that failed, keeping its attempt count for a
    /// later retry.
    fn settle_failed(&mut self, node: &NodeId) {
        if let Some(p) = self.pending.remove(node) {
            self.failed.insert(node.clone(), p.attempts);
        }
    }

    // =========================================================================
    // Result side
    // =========================================================================

    /// Apply one push event to the graph.
    pub fn apply_event<B: NodeBinder>(&mut self, history: &mut HistoryManager<B>, event: &PushEvent) -> ReconcileOutcome {
        let span = info_span!("generation.event", event = event.event_type(), node = %event.node_id());
        let _guard = span.enter();

        if event.whiteboard_id() != &self.whiteboard {
            return ReconcileOutcome::Skipped {
                reason: SkipReason::WrongWhiteboard {
                    expected: self.whiteboard.clone(),
                    got: event.whiteboard_id().clone(),
                },
            };
        }

        let node = event.node_id().clone();
        let tracked = self.pending.remove(&node);
        if tracked.is_none() {
            trace!("result for untracked node");
        }

        let scope = match event {
            PushEvent::GenerationComplete { generated_content, .. } => {
                self.failed.remove(&node);
                let max = self.topic_max_items;
                history.rewrite_node(&node, |n| {
                    n.content = NodeContent::from_generated(n.kind(), generated_content, max);
                    n.is_generating = false;
                    n.has_generation_error = false;
                    n.generation_error = None;
                })
            }
            PushEvent::GenerationError { error, .. } => {
                if let Some(p) = &tracked {
                    self.failed.insert(node.clone(), p.attempts);
                }
                Ok(mark_failed(history, &node, error))
            }
        };

        match (scope, event) {
            (Ok(RewriteScope::Current), PushEvent::GenerationComplete { .. }) => {
                info!("generation completed");
                ReconcileOutcome::Completed { node }
            }
            (Ok(RewriteScope::Current), PushEvent::GenerationError { error, .. }) => {
                warn!(%error, "generation failed");
                ReconcileOutcome::Errored { node, reason: error.clone() }
            }
            (Ok(RewriteScope::History), _) => {
                debug!("result for undone node, written to history");
                ReconcileOutcome::Shelved { node }
            }
            (Ok(RewriteScope::Absent), _) | (Err(_), _) => {
                self.failed.remove(&node);
                debug!(tracked = tracked.is_some(), "result for deleted node, dropping");
                ReconcileOutcome::Orphaned { node }
            }
        }
    }

    /// Mark requests older than the timeout as errored, in every history
    /// entry that holds the node. Returns the nodes that timed out; tracked
    /// requests whose node no entry holds are just dropped.
    pub fn expire<B: NodeBinder>(&mut self, history: &mut HistoryManager<B>, now: Instant) -> Vec<NodeId> {
        let timeout = self.timeout;
        let stale: Vec<NodeId> = self
            .pending
            .values()
            .filter(|p| now.saturating_duration_since(p.started) >= timeout)
            .map(|p| p.node_id.clone())
            .collect();

        let mut expired = Vec::new();
        for node in stale {
            self.settle_failed(&node);
            let reason = format!("no result after {}s", timeout.as_secs());
            if mark_failed(history, &node, &reason) == RewriteScope::Absent {
                self.failed.remove(&node);
            } else {
                warn!(node = %node, "generation timed out");
                expired.push(node);
            }
        }
        expired
    }
}

/// Flag a node as failed across history.
fn mark_failed<B: NodeBinder>(history: &mut HistoryManager<B>, node: &NodeId, reason: &str) -> RewriteScope {
    history
        .rewrite_node(node, |n| n.mark_generation_failed(reason))
        .unwrap_or(RewriteScope::Absent)
}
