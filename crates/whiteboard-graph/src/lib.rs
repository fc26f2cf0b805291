//! Graph engine for the whiteboard: store, history, hierarchy, geometry.
//!
//! Everything here is synchronous and free of I/O. The client crate drives
//! it from service responses and push events; the CLI drives it from files.
//!
//! ```text
//! HistoryManager<B: NodeBinder>
//!     ├── GraphStore ── Arc<GraphSnapshot> (copy-on-write)
//!     │       └── hierarchy checks (cycle rejection, validation)
//!     ├── entries: Vec<Arc<GraphSnapshot>> + cursor
//!     ├── LiveEdits (drag/typing overrides, folded on commit)
//!     └── Bindings<B::Handle> (re-derived on install/undo/redo)
//!
//! geometry   pure floating-edge routing over a snapshot
//! placement  where a requested child goes
//! ```

pub mod binding;
mod error;
pub mod geometry;
pub mod hierarchy;
pub mod history;
pub mod live;
pub mod placement;
pub mod store;

pub use binding::{Bindings, NodeBinder, Unbound};
pub use error::{CycleError, GraphError};
pub use geometry::{FloatingEdge, Side, route_all, route_edge};
pub use hierarchy::check_reparent;
pub use history::{DEFAULT_HISTORY_LIMIT, HistoryManager, RewriteScope};
pub use live::{LiveBatch, LiveEdits};
pub use placement::ChildPlacement;
pub use store::{GraphStore, validate_snapshot};

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
