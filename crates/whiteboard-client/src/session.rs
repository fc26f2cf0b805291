//! One open whiteboard: graph history, collaborators and advisory state.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────────── Whiteboard ───────────────────────────┐
//!  NodeHandle ──cmd──▶ process_commands ─┐                                               │
//!  view calls ───────▶ create_node, ... ─┼──▶ HistoryManager<ActionBinder> ──▶ schedule ──┼──▶ PersistenceBridge
//!                    │ create_child ─────┤          ▲                                    │
//!                    │ request_generation┘          │ rewrite_node                       │
//!  Subscription ─────▶ apply_push ──▶ GenerationReconciler                              │
//!                    │ tick: idle live commit, generation timeouts, save reports ──▶ notices
//!                    └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutations are synchronous; only service calls and the push channel
//! suspend. Remote failures never propagate as panics: the call returns an
//! error, the local graph is left as it was, and a [`Notice`] is queued for
//! the presentation layer.

use std::sync::Arc;

use rand::thread_rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use whiteboard_graph::{ChildPlacement, GraphError, HistoryManager};
use whiteboard_types::{ContentPatch, EdgeId, EdgeKind, GraphSnapshot, Node, NodeContent, NodeId, NodeKind, Position, Size, WhiteboardId};

use crate::actions::{ActionBinder, NodeCommand, NodeHandle};
use crate::children::{self, ChildError};
use crate::config::WhiteboardConfig;
use crate::persistence::{PersistenceBridge, SaveReport};
use crate::reconciler::{GenerationError, GenerationReconciler, ReconcileOutcome};
use crate::services::{ContentService, GenerationRequest, GenerationService, GenerationStatus, ServiceError};
use crate::subscriptions::{PushEvent, Subscription, SubscriptionHub};

/// What went wrong, for the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    ChildCreationFailed,
    GenerationDispatchFailed,
    GenerationFailed,
    GenerationTimedOut,
    SaveFailed,
    HierarchyRejected,
}

/// Advisory failure record. Drained with [`Whiteboard::drain_notices`].
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub node: Option<NodeId>,
    pub message: String,
}

/// An open whiteboard session.
pub struct Whiteboard {
    id: WhiteboardId,
    history: HistoryManager<ActionBinder>,
    commands: mpsc::UnboundedReceiver<NodeCommand>,
    content: Arc<dyn ContentService>,
    generation: Arc<dyn GenerationService>,
    reconciler: GenerationReconciler,
    persistence: PersistenceBridge,
    save_reports: mpsc::UnboundedReceiver<SaveReport>,
    subscription: Option<Subscription>,
    placement: ChildPlacement,
    config: WhiteboardConfig,
    notices: Vec<Notice>,
}

impl Whiteboard {
    /// Open a whiteboard on a loaded snapshot.
    ///
    /// Must be called from within a tokio runtime (the saver task is spawned
    /// here). Fails if the snapshot is inconsistent.
    pub fn open(
        id: WhiteboardId,
        snapshot: GraphSnapshot,
        content: Arc<dyn ContentService>,
        generation: Arc<dyn GenerationService>,
        config: WhiteboardConfig,
    ) -> Result<Self, GraphError> {
        let (binder, commands) = ActionBinder::channel();
        let history = HistoryManager::with_snapshot(binder, snapshot, config.history.limit)?;
        let (reports_tx, save_reports) = mpsc::unbounded_channel();
        let persistence = PersistenceBridge::spawn(content.clone(), id.clone(), config.persistence.debounce, reports_tx);
        let reconciler =
            GenerationReconciler::with_limits(id.clone(), config.generation.timeout, config.generation.topic_max_items);

        info!(whiteboard = %id, nodes = history.snapshot().node_count(), "whiteboard opened");
        Ok(Self {
            id,
            history,
            commands,
            content,
            generation,
            reconciler,
            persistence,
            save_reports,
            subscription: None,
            placement: config.placement.to_placement(),
            config,
            notices: Vec::new(),
        })
    }

    /// Attach to the push channel. Replaces any earlier subscription.
    pub fn subscribe(&mut self, hub: &SubscriptionHub) {
        self.subscription = Some(hub.subscribe(&self.id));
    }

    pub fn id(&self) -> &WhiteboardId {
        &self.id
    }

    /// Committed snapshot.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.history.snapshot()
    }

    /// What the view renders: committed snapshot plus live overrides.
    pub fn view(&self) -> Arc<GraphSnapshot> {
        self.history.view()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.history.node(id)
    }

    pub fn handle(&self, id: &NodeId) -> Option<&NodeHandle> {
        self.history.handle(id)
    }

    pub fn history(&self) -> &HistoryManager<ActionBinder> {
        &self.history
    }

    pub fn reconciler(&self) -> &GenerationReconciler {
        &self.reconciler
    }

    pub fn config(&self) -> &WhiteboardConfig {
        &self.config
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, kind: NoticeKind, node: Option<NodeId>, message: impl Into<String>) {
        let message = message.into();
        debug!(?kind, node = ?node, %message, "notice");
        self.notices.push(Notice { kind, node, message });
    }

    fn changed(&self, snapshot: Arc<GraphSnapshot>) -> Arc<GraphSnapshot> {
        self.persistence.schedule(Arc::clone(&snapshot));
        snapshot
    }

    // =========================================================================
    // Local actions
    // =========================================================================

    pub fn create_node(
        &mut self,
        kind: NodeKind,
        position: Position,
        initial: Option<NodeContent>,
    ) -> Result<Node, GraphError> {
        let node = self.history.create_node(kind, position, initial)?;
        self.changed(self.history.snapshot());
        Ok(node)
    }

    pub fn update_node_content(&mut self, id: &NodeId, patch: &ContentPatch) -> Result<Arc<GraphSnapshot>, GraphError> {
        let snapshot = self.history.update_node_content(id, patch)?;
        Ok(self.changed(snapshot))
    }

    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<Arc<GraphSnapshot>, GraphError> {
        let snapshot = self.history.move_node(id, position)?;
        Ok(self.changed(snapshot))
    }

    pub fn resize_node(&mut self, id: &NodeId, size: Size) -> Result<Arc<GraphSnapshot>, GraphError> {
        let snapshot = self.history.resize_node(id, size)?;
        Ok(self.changed(snapshot))
    }

    pub fn set_color(&mut self, id: &NodeId, color: Option<String>) -> Result<Arc<GraphSnapshot>, GraphError> {
        let snapshot = self.history.set_color(id, color)?;
        Ok(self.changed(snapshot))
    }

    /// Delete a node. Its children are orphaned, its edges removed, and a
    /// pending generation for it is forgotten.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<Arc<GraphSnapshot>, GraphError> {
        let snapshot = self.history.delete_node(id)?;
        if self.reconciler.forget(id) {
            debug!(node = %id, "dropped pending generation for deleted node");
        }
        Ok(self.changed(snapshot))
    }

    pub fn create_edge(&mut self, source: &NodeId, target: &NodeId, kind: EdgeKind) -> Result<Arc<GraphSnapshot>, GraphError> {
        let snapshot = self.history.create_edge(source, target, kind)?;
        Ok(self.changed(snapshot))
    }

    pub fn delete_edge(&mut self, id: &EdgeId) -> Result<Arc<GraphSnapshot>, GraphError> {
        let snapshot = self.history.delete_edge(id)?;
        Ok(self.changed(snapshot))
    }

    pub fn undo(&mut self) -> Option<Arc<GraphSnapshot>> {
        let snapshot = self.history.undo()?;
        Some(self.changed(snapshot))
    }

    pub fn redo(&mut self) -> Option<Arc<GraphSnapshot>> {
        let snapshot = self.history.redo()?;
        Some(self.changed(snapshot))
    }

    // ── live edits ──

    pub fn live_move(&mut self, id: NodeId, position: Position) {
        self.history.live_move(id, position);
    }

    pub fn live_resize(&mut self, id: NodeId, size: Size) {
        self.history.live_resize(id, size);
    }

    pub fn live_content(&mut self, id: NodeId, content: NodeContent) {
        self.history.live_content(id, content);
    }

    /// Pointer-up / blur: fold live edits into one entry.
    pub fn commit_live(&mut self) -> Option<Arc<GraphSnapshot>> {
        let snapshot = self.history.commit_live()?;
        Some(self.changed(snapshot))
    }

    pub fn discard_live(&mut self) {
        self.history.discard_live();
    }

    // =========================================================================
    // Remote protocols
    // =========================================================================

    /// Create an empty child of `parent` through the content service.
    pub async fn create_child(&mut self, parent: &NodeId, kind: NodeKind) -> Result<NodeId, ChildError> {
        self.create_child_inner(parent, kind, false).await
    }

    async fn create_child_inner(&mut self, parent: &NodeId, kind: NodeKind, generating: bool) -> Result<NodeId, ChildError> {
        let result = self.try_create_child(parent, kind, generating).await;
        match &result {
            Ok(node) => {
                self.changed(self.history.snapshot());
                debug!(parent = %parent, node = %node, "child installed");
            }
            Err(e) => self.notify(NoticeKind::ChildCreationFailed, Some(parent.clone()), e.to_string()),
        }
        result
    }

    async fn try_create_child(&mut self, parent: &NodeId, kind: NodeKind, generating: bool) -> Result<NodeId, ChildError> {
        // Installing the server graph replaces the store; fold pending drags
        // and typing in first so they reach the server.
        self.commit_live();
        let request = children::plan_child(
            &self.history.snapshot(),
            parent,
            kind,
            None,
            generating,
            &self.placement,
            &mut thread_rng(),
        )?;
        // The server builds the child on its stored graph; make sure it has ours.
        self.persistence.flush().await?;
        children::create_child(&self.content, &self.id, &mut self.history, request).await
    }

    /// Insert a generating placeholder under `parent` and dispatch generation
    /// for it.
    ///
    /// A dispatch failure keeps the placeholder, flagged as errored, and
    /// returns the error; the node id is on the queued notice.
    pub async fn request_generation(&mut self, parent: &NodeId, kind: NodeKind) -> Result<NodeId, GenerationError> {
        let span = info_span!("generation.request", whiteboard = %self.id, parent = %parent, %kind);
        async move {
            self.commit_live();
            let parent_content = self
                .history
                .node(parent)
                .map(|n| n.content.to_context_text())
                .ok_or_else(|| GenerationError::NodeNotFound(parent.clone()))?;

            let node = self.create_child_inner(parent, kind, true).await?;
            // Servers that ignore `isGenerating` still get a spinner locally.
            self.history.rewrite_node(&node, |n| n.mark_generating())?;
            self.reconciler.track(node.clone(), parent.clone(), kind, parent_content, Instant::now());

            let request = self
                .reconciler
                .request_for(&node)
                .ok_or_else(|| GenerationError::NodeNotFound(node.clone()))?;
            self.dispatch(request).await?;
            Ok(node)
        }
        .instrument(span)
        .await
    }

    /// Re-dispatch generation for a node whose last attempt failed.
    pub async fn retry_generation(&mut self, node: &NodeId) -> Result<(), GenerationError> {
        let request = self.reconciler.retry(&mut self.history, node, Instant::now())?;
        self.changed(self.history.snapshot());
        let span = info_span!("generation.request", whiteboard = %self.id, node = %node, retry = true);
        self.dispatch(request).instrument(span).await
    }

    async fn dispatch(&mut self, request: GenerationRequest) -> Result<(), GenerationError> {
        let node = request.node_id.clone();
        let failure = match self.generation.request_generation(request).await {
            Ok(ack) if ack.status == GenerationStatus::Started => {
                self.reconciler.mark_dispatched(&node);
                debug!(node = %node, "generation dispatched");
                return Ok(());
            }
            Ok(ack) => GenerationError::Refused(ack.error.unwrap_or_else(|| "unspecified error".to_string())),
            Err(e) => GenerationError::Dispatch(e),
        };

        let reason = failure.to_string();
        if self.reconciler.fail_dispatch(&mut self.history, &node, &reason) {
            self.changed(self.history.snapshot());
        }
        self.notify(NoticeKind::GenerationDispatchFailed, Some(node), reason);
        Err(failure)
    }

    /// Move `node` under `parent` (`None` detaches it) after local and
    /// server-side cycle checks.
    pub async fn reparent(&mut self, node: &NodeId, parent: Option<&NodeId>) -> Result<Arc<GraphSnapshot>, ChildError> {
        match children::reparent(&self.content, &self.id, &mut self.history, node, parent).await {
            Ok(snapshot) => Ok(self.changed(snapshot)),
            Err(e) => {
                self.notify(NoticeKind::HierarchyRejected, Some(node.clone()), e.to_string());
                Err(e)
            }
        }
    }

    // =========================================================================
    // Event pumps
    // =========================================================================

    /// Apply one push event.
    pub fn apply_push(&mut self, event: &PushEvent) -> ReconcileOutcome {
        let outcome = self.reconciler.apply_event(&mut self.history, event);
        match &outcome {
            ReconcileOutcome::Completed { .. } => {
                self.changed(self.history.snapshot());
            }
            ReconcileOutcome::Errored { node, reason } => {
                let (node, reason) = (node.clone(), reason.clone());
                self.changed(self.history.snapshot());
                self.notify(NoticeKind::GenerationFailed, Some(node), reason);
            }
            ReconcileOutcome::Shelved { node } => {
                debug!(node = %node, "result kept in history for undone node");
            }
            ReconcileOutcome::Orphaned { .. } | ReconcileOutcome::Skipped { .. } => {}
        }
        outcome
    }

    /// Apply every push event already received.
    pub fn pump_events(&mut self) -> Vec<ReconcileOutcome> {
        let mut events = Vec::new();
        if let Some(subscription) = self.subscription.as_mut() {
            while let Some(event) = subscription.try_recv() {
                events.push(event);
            }
        }
        events.iter().map(|event| self.apply_push(event)).collect()
    }

    /// Wait for the next push event and apply it. `None` without a
    /// subscription or once it closed.
    pub async fn next_event(&mut self) -> Option<ReconcileOutcome> {
        let event = self.subscription.as_mut()?.recv().await?;
        Some(self.apply_push(&event))
    }

    /// Run every queued node command. Returns how many ran.
    pub async fn process_commands(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(command) = self.commands.try_recv() {
            self.execute(command).await;
            ran += 1;
        }
        ran
    }

    async fn execute(&mut self, command: NodeCommand) {
        let node = command.node().clone();
        let result: Result<(), String> = match command {
            NodeCommand::Edit { node, patch } => self.update_node_content(&node, &patch).map(drop).map_err(|e| e.to_string()),
            NodeCommand::CreateChild { parent, kind } => self.create_child(&parent, kind).await.map(drop).map_err(|e| e.to_string()),
            NodeCommand::Generate { parent, kind } => {
                self.request_generation(&parent, kind).await.map(drop).map_err(|e| e.to_string())
            }
            NodeCommand::Retry { node } => self.retry_generation(&node).await.map_err(|e| e.to_string()),
            NodeCommand::Delete { node } => self.delete_node(&node).map(drop).map_err(|e| e.to_string()),
            NodeCommand::SetColor { node, color } => self.set_color(&node, color).map(drop).map_err(|e| e.to_string()),
        };
        if let Err(error) = result {
            warn!(node = %node, %error, "node command failed");
        }
    }

    /// Periodic housekeeping: commit idle live edits, time out generation
    /// requests, and turn save results into notices.
    pub fn tick(&mut self) {
        if self.history.live().is_idle(std::time::Instant::now(), self.config.live.idle_commit) {
            if self.commit_live().is_some() {
                debug!("idle live edits committed");
            }
        }

        let expired = self.reconciler.expire(&mut self.history, Instant::now());
        if !expired.is_empty() {
            self.changed(self.history.snapshot());
        }
        for node in expired {
            let message = format!("no result after {}s", self.config.generation.timeout.as_secs());
            self.notify(NoticeKind::GenerationTimedOut, Some(node), message);
        }

        while let Ok(report) = self.save_reports.try_recv() {
            if let SaveReport::Failed { error } = report {
                self.notify(NoticeKind::SaveFailed, None, error.to_string());
            }
        }
    }

    /// Save the current state now.
    pub async fn flush(&mut self) -> Result<(), ServiceError> {
        self.commit_live();
        self.persistence.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::PushConfig;
    use crate::mock::{GenerationMode, MockContentService, MockGenerationService, ScriptStep, ScriptedSource};

    const WB: &str = "wb";

    struct Fixture {
        wb: Whiteboard,
        content: Arc<MockContentService>,
        generation: Arc<MockGenerationService>,
    }

    fn open_with(config: WhiteboardConfig) -> Fixture {
        let content = Arc::new(MockContentService::new());
        let generation = Arc::new(MockGenerationService::new());
        let wb = Whiteboard::open(WB.into(), GraphSnapshot::empty(), content.clone(), generation.clone(), config).unwrap();
        Fixture { wb, content, generation }
    }

    fn open() -> Fixture {
        open_with(WhiteboardConfig::default())
    }

    fn idea(wb: &mut Whiteboard, text: &str) -> NodeId {
        wb.create_node(NodeKind::Idea, Position::default(), Some(NodeContent::Idea { text: text.into() }))
            .unwrap()
            .id
    }

    fn complete(node: &NodeId, text: &str) -> PushEvent {
        PushEvent::GenerationComplete {
            whiteboard_id: WB.into(),
            node_id: node.clone(),
            generated_content: text.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_scenario() {
        let Fixture { mut wb, generation, .. } = open();
        let root = idea(&mut wb, "rust");

        let ph = wb.request_generation(&root, NodeKind::Topic).await.unwrap();
        let node = wb.node(&ph).unwrap();
        assert!(node.is_generating);
        assert_eq!(node.parent_id, Some(root.clone()));
        assert_eq!(generation.requests()[0].parent_content_text, "rust");

        let event = complete(&ph, "a\n\nb\n c \n");
        assert_eq!(wb.apply_push(&event), ReconcileOutcome::Completed { node: ph.clone() });
        let node = wb.node(&ph).unwrap();
        assert_eq!(node.content.items().unwrap(), ["a", "b", "c"]);
        assert!(!node.is_generating);

        wb.delete_node(&ph).unwrap();
        let before = wb.snapshot();
        assert_eq!(wb.apply_push(&event), ReconcileOutcome::Shelved { node: ph.clone() });
        assert!(Arc::ptr_eq(&before, &wb.snapshot()));
        assert!(wb.drain_notices().is_empty());

        let stray = complete(&"never-existed".into(), "x");
        assert_eq!(wb.apply_push(&stray), ReconcileOutcome::Orphaned { node: "never-existed".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_after_undo_survives_redo() {
        let mut config = WhiteboardConfig::default();
        config.generation.timeout = Duration::from_secs(10);
        let Fixture { mut wb, .. } = open_with(config);
        let root = idea(&mut wb, "seed");
        let ph = wb.request_generation(&root, NodeKind::Note).await.unwrap();

        wb.undo().unwrap();
        assert!(wb.node(&ph).is_none());
        assert_eq!(wb.apply_push(&complete(&ph, "late")), ReconcileOutcome::Shelved { node: ph.clone() });

        wb.redo().unwrap();
        let node = wb.node(&ph).unwrap();
        assert!(!node.is_generating);
        assert_eq!(node.content.text(), Some("late"));

        tokio::time::sleep(Duration::from_secs(11)).await;
        wb.tick();
        assert!(wb.drain_notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_undo_leaves_retryable_node() {
        let mut config = WhiteboardConfig::default();
        config.generation.timeout = Duration::from_secs(10);
        let Fixture { mut wb, generation, .. } = open_with(config);
        let root = idea(&mut wb, "seed");
        let ph = wb.request_generation(&root, NodeKind::Idea).await.unwrap();
        wb.undo().unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        wb.tick();
        assert_eq!(wb.drain_notices()[0].kind, NoticeKind::GenerationTimedOut);

        wb.redo().unwrap();
        assert!(wb.node(&ph).unwrap().has_generation_error);
        wb.retry_generation(&ph).await.unwrap();
        assert!(wb.node(&ph).unwrap().is_generating);
        assert_eq!(wb.reconciler().pending(&ph).unwrap().attempts, 2);
        assert_eq!(generation.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_child_keeps_pending_drag() {
        let Fixture { mut wb, content, .. } = open();
        let a = idea(&mut wb, "dragged");
        let b = idea(&mut wb, "parent");

        wb.live_move(a.clone(), Position::new(77.0, 77.0));
        wb.create_child(&b, NodeKind::Note).await.unwrap();

        assert_eq!(wb.node(&a).unwrap().position, Position::new(77.0, 77.0));
        assert_eq!(content.last_save().unwrap().node(&a).unwrap().position, Position::new(77.0, 77.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_reads_typed_parent_text() {
        let Fixture { mut wb, generation, .. } = open();
        let root = idea(&mut wb, "draft");

        wb.live_content(root.clone(), NodeContent::Idea { text: "typed so far".into() });
        wb.request_generation(&root, NodeKind::Topic).await.unwrap();

        assert_eq!(generation.requests()[0].parent_content_text, "typed so far");
        assert_eq!(wb.node(&root).unwrap().content.text(), Some("typed so far"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_refusal_keeps_errored_placeholder() {
        let Fixture { mut wb, generation, .. } = open();
        let root = idea(&mut wb, "seed");
        generation.set_mode(GenerationMode::Refuse("busy".into()));

        let err = wb.request_generation(&root, NodeKind::Note).await.unwrap_err();
        assert_eq!(err, GenerationError::Refused("busy".into()));

        let notices = wb.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::GenerationDispatchFailed);
        let ph = notices[0].node.clone().unwrap();
        let node = wb.node(&ph).unwrap();
        assert!(node.has_generation_error);
        assert!(!node.is_generating);

        generation.set_mode(GenerationMode::Start);
        wb.retry_generation(&ph).await.unwrap();
        assert!(wb.node(&ph).unwrap().is_generating);
        assert_eq!(generation.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_failure_leaves_graph_and_raises_notice() {
        let Fixture { mut wb, content, .. } = open();
        let root = idea(&mut wb, "seed");
        let before = wb.snapshot();

        content.fail_next_create(ServiceError::Timeout);
        assert!(wb.create_child(&root, NodeKind::Idea).await.is_err());
        assert!(Arc::ptr_eq(&before, &wb.snapshot()));
        assert_eq!(wb.drain_notices()[0].kind, NoticeKind::ChildCreationFailed);

        let child = wb.create_child(&root, NodeKind::Idea).await.unwrap();
        assert_eq!(wb.node(&child).unwrap().parent_id, Some(root));
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_handles_drive_commands() {
        let Fixture { mut wb, .. } = open();
        let root = idea(&mut wb, "seed");
        let handle = wb.handle(&root).cloned().unwrap();

        handle.edit(ContentPatch::SetText("edited".into())).unwrap();
        handle.create_child(NodeKind::Topic).unwrap();
        handle.set_color(Some("#ff0".into())).unwrap();
        assert_eq!(wb.process_commands().await, 3);

        let node = wb.node(&root).unwrap();
        assert_eq!(node.content.text(), Some("edited"));
        assert_eq!(node.children_order.len(), 1);
        assert_eq!(node.color.as_deref(), Some("#ff0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_events_through_hub() {
        let Fixture { mut wb, .. } = open();
        let root = idea(&mut wb, "seed");
        let ph = wb.request_generation(&root, NodeKind::Idea).await.unwrap();

        let source = Arc::new(ScriptedSource::new(vec![ScriptStep::Frames(vec![
            ": keep-alive".into(),
            complete(&ph, "generated").to_frame(),
        ])]));
        let hub = SubscriptionHub::new(source, PushConfig::default());
        wb.subscribe(&hub);

        let outcome = wb.next_event().await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Completed { node: ph.clone() });
        assert_eq!(wb.node(&ph).unwrap().content.text(), Some("generated"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_times_out_generation() {
        let mut config = WhiteboardConfig::default();
        config.generation.timeout = Duration::from_secs(10);
        let Fixture { mut wb, .. } = open_with(config);
        let root = idea(&mut wb, "seed");
        let ph = wb.request_generation(&root, NodeKind::Idea).await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        wb.tick();

        assert!(wb.node(&ph).unwrap().has_generation_error);
        assert!(wb.notices().iter().any(|n| n.kind == NoticeKind::GenerationTimedOut));
        assert_eq!(wb.reconciler().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_reports_failed_save() {
        let Fixture { mut wb, content, .. } = open();
        content.set_fail_saves(true);
        let root = idea(&mut wb, "seed");
        wb.move_node(&root, Position::new(10.0, 10.0)).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        wb.tick();
        assert_eq!(wb.drain_notices()[0].kind, NoticeKind::SaveFailed);
        // The session carries on.
        assert!(wb.move_node(&root, Position::new(20.0, 20.0)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_commits_idle_live_edits() {
        let mut config = WhiteboardConfig::default();
        config.live.idle_commit = Duration::ZERO;
        let Fixture { mut wb, .. } = open_with(config);
        let root = idea(&mut wb, "seed");
        let entries = wb.history().len();

        wb.live_move(root.clone(), Position::new(5.0, 5.0));
        wb.live_move(root.clone(), Position::new(9.0, 9.0));
        assert_eq!(wb.view().node(&root).unwrap().position, Position::new(9.0, 9.0));
        assert_eq!(wb.snapshot().node(&root).unwrap().position, Position::default());

        wb.tick();
        assert_eq!(wb.history().len(), entries + 1);
        assert_eq!(wb.node(&root).unwrap().position, Position::new(9.0, 9.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reparent_cycle_raises_notice() {
        let Fixture { mut wb, .. } = open();
        let root = idea(&mut wb, "seed");
        let child = wb.create_child(&root, NodeKind::Idea).await.unwrap();

        let err = wb.reparent(&root, Some(&child)).await.unwrap_err();
        assert_eq!(err.cycle_path().unwrap().len(), 2);
        assert_eq!(wb.drain_notices()[0].kind, NoticeKind::HierarchyRejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_redo_persist() {
        let Fixture { mut wb, content, .. } = open();
        let root = idea(&mut wb, "seed");
        assert!(wb.undo().is_some());
        assert!(wb.node(&root).is_none());
        assert!(wb.redo().is_some());

        wb.flush().await.unwrap();
        assert!(content.last_save().unwrap().contains_node(&root));
    }
}
