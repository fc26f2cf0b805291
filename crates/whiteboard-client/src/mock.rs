//! In-memory fakes of the remote collaborators.
//!
//! Compiled for tests and behind the `testing` feature. The content fake
//! keeps one authoritative graph per whiteboard and applies child creation
//! through the real [`GraphStore`], so ids, edges and children order look the
//! way a conforming server would produce them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use whiteboard_graph::{GraphStore, check_reparent};
use whiteboard_types::{GraphSnapshot, Node, NodeContent, NodeId, WhiteboardId};

use crate::services::*;
use crate::subscriptions::{FrameSource, FrameStream, SubscriptionError};

// ============================================================================
// Content service
// ============================================================================

#[derive(Default)]
struct ContentState {
    graphs: HashMap<WhiteboardId, GraphSnapshot>,
    saves: Vec<(WhiteboardId, GraphSnapshot)>,
    fail_next_create: Option<ServiceError>,
    refuse_creates: Option<String>,
    fail_saves: bool,
    reject_hierarchy: Option<Vec<NodeId>>,
    fail_validate: Option<ServiceError>,
}

/// Content service backed by a map of graphs.
#[derive(Default)]
pub struct MockContentService {
    state: Mutex<ContentState>,
}

impl MockContentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the stored graph for a whiteboard.
    pub fn with_graph(self, whiteboard: &WhiteboardId, snapshot: GraphSnapshot) -> Self {
        self.state.lock().graphs.insert(whiteboard.clone(), snapshot);
        self
    }

    /// Next `create_child_node` fails at the transport level.
    pub fn fail_next_create(&self, error: ServiceError) {
        self.state.lock().fail_next_create = Some(error);
    }

    /// Every `create_child_node` answers `status: error`.
    pub fn refuse_creates(&self, reason: impl Into<String>) {
        self.state.lock().refuse_creates = Some(reason.into());
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.state.lock().fail_saves = fail;
    }

    /// Every `validate_hierarchy` answers invalid with this path.
    pub fn reject_hierarchy(&self, path: Vec<NodeId>) {
        self.state.lock().reject_hierarchy = Some(path);
    }

    pub fn fail_validate(&self, error: ServiceError) {
        self.state.lock().fail_validate = Some(error);
    }

    pub fn save_count(&self) -> usize {
        self.state.lock().saves.len()
    }

    pub fn last_save(&self) -> Option<GraphSnapshot> {
        self.state.lock().saves.last().map(|(_, s)| s.clone())
    }
}

#[async_trait]
impl ContentService for MockContentService {
    async fn create_child_node(
        &self,
        whiteboard: &WhiteboardId,
        request: CreateChildRequest,
    ) -> Result<CreateChildResponse, ServiceError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_create.take() {
            return Err(error);
        }
        if let Some(reason) = &state.refuse_creates {
            return Ok(CreateChildResponse {
                status: ResponseStatus::Error,
                updated_graph: None,
                new_node_id: None,
                error: Some(reason.clone()),
            });
        }

        let current = state.graphs.get(whiteboard).cloned().unwrap_or_default();
        let refused = |e: whiteboard_graph::GraphError| CreateChildResponse {
            status: ResponseStatus::Error,
            updated_graph: None,
            new_node_id: None,
            error: Some(e.to_string()),
        };
        let mut store = match GraphStore::from_snapshot(current) {
            Ok(store) => store,
            Err(e) => return Ok(refused(e)),
        };

        let id = NodeId::new();
        let mut node = Node::new(id.clone(), request.kind, request.position).with_parent(request.parent_id);
        node.content = request
            .initial_content
            .filter(|c| c.kind() == request.kind)
            .unwrap_or_else(|| NodeContent::empty(request.kind));
        node.is_generating = request.is_generating;

        let updated = match store.insert_node(node) {
            Ok(snapshot) => GraphSnapshot::clone(&snapshot),
            Err(e) => return Ok(refused(e)),
        };
        state.graphs.insert(whiteboard.clone(), updated.clone());

        Ok(CreateChildResponse {
            status: ResponseStatus::Success,
            updated_graph: Some(updated),
            new_node_id: Some(id),
            error: None,
        })
    }

    async fn update_whiteboard_content(
        &self,
        whiteboard: &WhiteboardId,
        snapshot: &GraphSnapshot,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        if state.fail_saves {
            return Err(ServiceError::Transport("content store unavailable".into()));
        }
        state.graphs.insert(whiteboard.clone(), snapshot.clone());
        state.saves.push((whiteboard.clone(), snapshot.clone()));
        Ok(())
    }

    async fn validate_hierarchy(
        &self,
        whiteboard: &WhiteboardId,
        check: HierarchyCheck,
    ) -> Result<HierarchyVerdict, ServiceError> {
        let state = self.state.lock();
        if let Some(error) = &state.fail_validate {
            return Err(error.clone());
        }
        if let Some(path) = &state.reject_hierarchy {
            return Ok(HierarchyVerdict { is_valid: false, cycle_path: Some(path.clone()) });
        }
        let graph = state.graphs.get(whiteboard).cloned().unwrap_or_default();
        Ok(match check_reparent(&graph, &check.node_id, &check.proposed_parent_id) {
            Ok(()) => HierarchyVerdict { is_valid: true, cycle_path: None },
            Err(cycle) => HierarchyVerdict { is_valid: false, cycle_path: Some(cycle.path) },
        })
    }
}

// ============================================================================
// Generation service
// ============================================================================

/// How the generation fake answers.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationMode {
    Start,
    Refuse(String),
    Fail(ServiceError),
}

/// Generation service that records requests.
pub struct MockGenerationService {
    mode: Mutex<GenerationMode>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl Default for MockGenerationService {
    fn default() -> Self {
        Self { mode: Mutex::new(GenerationMode::Start), requests: Mutex::new(Vec::new()) }
    }
}

impl MockGenerationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, mode: GenerationMode) {
        *self.mode.lock() = mode;
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    async fn request_generation(&self, request: GenerationRequest) -> Result<GenerationAck, ServiceError> {
        self.requests.lock().push(request);
        match self.mode.lock().clone() {
            GenerationMode::Start => Ok(GenerationAck::started()),
            GenerationMode::Refuse(reason) => Ok(GenerationAck::error(reason)),
            GenerationMode::Fail(error) => Err(error),
        }
    }
}

// ============================================================================
// Frame sources
// ============================================================================

/// One connection attempt of a [`ScriptedSource`].
#[derive(Clone, Debug)]
pub enum ScriptStep {
    /// `connect` fails with this message.
    Fail(String),
    /// `connect` succeeds; these frames are delivered, then the stream ends.
    Frames(Vec<String>),
}

/// Replays a fixed script of connections, then reports `Closed`.
pub struct ScriptedSource {
    steps: Mutex<VecDeque<ScriptStep>>,
    connects: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps: Mutex::new(steps.into()), connects: AtomicUsize::new(0) }
    }

    /// Number of `connect` calls so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn connect(&self, _whiteboard: &WhiteboardId) -> Result<FrameStream, SubscriptionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front();
        match step {
            None => Err(SubscriptionError::Closed),
            Some(ScriptStep::Fail(reason)) => Err(SubscriptionError::Connect(reason)),
            Some(ScriptStep::Frames(frames)) => Ok(futures::stream::iter(frames.into_iter().map(Ok)).boxed()),
        }
    }
}

/// Live source fed through a broadcast sender. Every connection sees the
/// frames sent while it is attached.
pub struct ChannelSource {
    frames: broadcast::Sender<String>,
}

impl ChannelSource {
    pub fn new() -> (Self, broadcast::Sender<String>) {
        let (frames, _) = broadcast::channel(256);
        (Self { frames: frames.clone() }, frames)
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn connect(&self, _whiteboard: &WhiteboardId) -> Result<FrameStream, SubscriptionError> {
        let rx = self.frames.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => return Some((Ok(frame), rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}
