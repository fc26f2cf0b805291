//! Whiteboard client: one open whiteboard and its remote collaborators.
//!
//! ```text
//! Whiteboard (session)
//!     ├── HistoryManager<ActionBinder>     whiteboard-graph, handles per node
//!     ├── ContentService                   createChildNode / updateWhiteboardContent / validateHierarchy
//!     ├── GenerationService                requestGeneration (fire and forget)
//!     ├── GenerationReconciler             placeholder ─▶ completed | errored | orphaned
//!     ├── PersistenceBridge                debounced full-snapshot saves
//!     └── Subscription ◀── SubscriptionHub (process-wide, keyed by whiteboard id)
//! ```
//!
//! Services are traits; [`mock`] holds in-memory fakes behind the `testing`
//! feature.

pub mod actions;
pub mod children;
pub mod config;
pub mod constants;
pub mod persistence;
pub mod reconciler;
pub mod services;
pub mod session;
pub mod subscriptions;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use actions::{ActionBinder, ActionError, NodeCommand, NodeHandle};
pub use children::{ChildError, create_child, plan_child, reparent};
pub use config::{ConfigError, WhiteboardConfig};
pub use persistence::{PersistenceBridge, SaveReport};
pub use reconciler::{GenerationError, GenerationPhase, GenerationReconciler, PendingGeneration, ReconcileOutcome, SkipReason};
pub use services::{
    ContentService, CreateChildRequest, CreateChildResponse, GenerationAck, GenerationRequest, GenerationService,
    GenerationStatus, HierarchyCheck, HierarchyVerdict, ResponseStatus, ServiceError,
};
pub use session::{Notice, NoticeKind, Whiteboard};
pub use subscriptions::{
    ConnectionStatus, FrameError, FrameSource, FrameStream, PushEvent, Subscription, SubscriptionError,
    SubscriptionHub, parse_frame,
};
