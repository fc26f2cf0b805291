//! Client configuration constants.
//!
//! Defaults for every tunable in [`WhiteboardConfig`](crate::WhiteboardConfig).

use std::time::Duration;

/// Quiet period before a changed snapshot is pushed to the content service.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Idle time after the last drag/keystroke before live edits auto-commit.
pub const LIVE_IDLE_COMMIT: Duration = Duration::from_millis(800);

/// A generation request with no terminal event after this long is marked errored.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Topic nodes keep at most this many generated lines.
pub const TOPIC_MAX_ITEMS: usize = 5;

/// First reconnect delay for the push channel; doubles per attempt.
pub const RECONNECT_INITIAL: Duration = Duration::from_millis(500);

/// Reconnect delay ceiling.
pub const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Events held for a whiteboard nobody is listening to. Oldest dropped first.
pub const MAX_BACKLOG_EVENTS: usize = 200;

/// Capacity of the connection-status broadcast per whiteboard.
pub const STATUS_CHANNEL_CAPACITY: usize = 16;
