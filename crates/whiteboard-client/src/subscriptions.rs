//! Push-event channel: typed events, frame parsing, and the subscription hub.
//!
//! ```text
//!  FrameSource::connect(wb) ──frames──▶ run_connection (tokio task per wb)
//!                                          │ parse_frame
//!                                          ▼
//!                                Channel { listener | backlog }
//!                                          │
//!                                   Subscription::recv()
//! ```
//!
//! The hub is shared process-wide (clone it) and keyed by whiteboard id, not
//! by whichever view happens to be showing the whiteboard. Subscribing again
//! for the same whiteboard tears the previous connection task down. Events
//! that arrive while nobody holds a [`Subscription`] are kept in a bounded
//! backlog and handed to the next subscriber.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use whiteboard_types::{NodeId, WhiteboardId};

use crate::config::PushConfig;
use crate::constants::STATUS_CHANNEL_CAPACITY;

/// Wire name of the completion event.
pub const GENERATION_COMPLETE: &str = "whiteboard_generation_complete";
/// Wire name of the failure event.
pub const GENERATION_ERROR: &str = "whiteboard_generation_error";

// ============================================================================
// Event Types
// ============================================================================

/// Events pushed by the server for a whiteboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushEvent {
    GenerationComplete {
        whiteboard_id: WhiteboardId,
        node_id: NodeId,
        generated_content: String,
    },
    GenerationError {
        whiteboard_id: WhiteboardId,
        node_id: NodeId,
        error: String,
    },
}

impl PushEvent {
    pub fn whiteboard_id(&self) -> &WhiteboardId {
        match self {
            PushEvent::GenerationComplete { whiteboard_id, .. }
            | PushEvent::GenerationError { whiteboard_id, .. } => whiteboard_id,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match self {
            PushEvent::GenerationComplete { node_id, .. } | PushEvent::GenerationError { node_id, .. } => node_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PushEvent::GenerationComplete { .. } => GENERATION_COMPLETE,
            PushEvent::GenerationError { .. } => GENERATION_ERROR,
        }
    }

    /// Encode as a JSON frame (`{"type": .., "data": {..}}`).
    pub fn to_frame(&self) -> String {
        let data = match self {
            PushEvent::GenerationComplete { whiteboard_id, node_id, generated_content } => json!({
                "whiteboardId": whiteboard_id,
                "nodeId": node_id,
                "generatedContent": generated_content,
            }),
            PushEvent::GenerationError { whiteboard_id, node_id, error } => json!({
                "whiteboardId": whiteboard_id,
                "nodeId": node_id,
                "error": error,
            }),
        };
        json!({ "type": self.event_type(), "data": data }).to_string()
    }
}

/// Connection lifecycle of one whiteboard's push channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
}

// ============================================================================
// Frame parsing
// ============================================================================

/// A frame that looked like an event but couldn't be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("event has no type")]
    MissingType,
    #[error("unknown event type {0:?}")]
    UnknownType(String),
    #[error("bad {event} payload: {reason}")]
    Payload { event: &'static str, reason: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletePayload {
    whiteboard_id: WhiteboardId,
    node_id: NodeId,
    generated_content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    whiteboard_id: WhiteboardId,
    node_id: NodeId,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one raw frame.
///
/// - `Ok(None)`: keep-alive, SSE comment, or any non-JSON text
/// - `Ok(Some(_))`: a typed event
/// - `Err(_)`: JSON that claims to be an event but is unusable
///
/// Accepts an optional SSE `data:` prefix. The payload is read from `data`
/// when present, else from the top-level object.
pub fn parse_frame(raw: &str) -> Result<Option<PushEvent>, FrameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return Ok(None);
    }
    let body = trimmed.strip_prefix("data:").map(str::trim).unwrap_or(trimmed);

    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Ok(None);
    };
    let Value::Object(obj) = &value else {
        return Ok(None);
    };

    let event_type = obj
        .get("type")
        .or_else(|| obj.get("event"))
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?;
    let payload = match obj.get("data") {
        Some(data @ Value::Object(_)) => data.clone(),
        _ => value.clone(),
    };

    match event_type {
        GENERATION_COMPLETE => {
            let p: CompletePayload = serde_json::from_value(payload).map_err(|e| FrameError::Payload {
                event: GENERATION_COMPLETE,
                reason: e.to_string(),
            })?;
            Ok(Some(PushEvent::GenerationComplete {
                whiteboard_id: p.whiteboard_id,
                node_id: p.node_id,
                generated_content: p.generated_content,
            }))
        }
        GENERATION_ERROR => {
            let p: ErrorPayload = serde_json::from_value(payload).map_err(|e| FrameError::Payload {
                event: GENERATION_ERROR,
                reason: e.to_string(),
            })?;
            Ok(Some(PushEvent::GenerationError {
                whiteboard_id: p.whiteboard_id,
                node_id: p.node_id,
                error: p.error.unwrap_or_else(|| "generation failed".to_string()),
            }))
        }
        other => Err(FrameError::UnknownType(other.to_string())),
    }
}

// ============================================================================
// Frame sources
// ============================================================================

/// Errors from a push transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("stream failed: {0}")]
    Stream(String),
    /// The source will never produce frames again; stop reconnecting.
    #[error("push source closed")]
    Closed,
}

/// Raw frames from one connection.
pub type FrameStream = BoxStream<'static, Result<String, SubscriptionError>>;

/// Transport for the push channel (SSE, websocket, test script).
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
    async fn connect(&self, whiteboard: &WhiteboardId) -> Result<FrameStream, SubscriptionError>;
}

// ============================================================================
// Hub
// ============================================================================

/// Per-whiteboard delivery state.
struct Channel {
    listener: Mutex<Option<mpsc::UnboundedSender<PushEvent>>>,
    backlog: Mutex<VecDeque<PushEvent>>,
    backlog_cap: usize,
    status: broadcast::Sender<ConnectionStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped per subscribe; a connection task with an older value is stale.
    epoch: AtomicU64,
}

impl Channel {
    fn new(backlog_cap: usize) -> Self {
        let (status, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            listener: Mutex::new(None),
            backlog: Mutex::new(VecDeque::new()),
            backlog_cap,
            status,
            task: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    fn handle_frame(&self, whiteboard: &WhiteboardId, raw: &str) {
        match parse_frame(raw) {
            Ok(Some(event)) if event.whiteboard_id() == whiteboard => self.deliver(event),
            Ok(Some(event)) => {
                debug!(whiteboard = %whiteboard, other = %event.whiteboard_id(), "event for another whiteboard, dropping");
            }
            Ok(None) => trace!(whiteboard = %whiteboard, "keep-alive frame"),
            Err(FrameError::UnknownType(t)) => {
                debug!(whiteboard = %whiteboard, event_type = %t, "ignoring unknown push event");
            }
            Err(e) => warn!(whiteboard = %whiteboard, error = %e, "malformed push frame, ignoring"),
        }
    }

    /// Hand to the listener, or park in the backlog if there is none.
    fn deliver(&self, event: PushEvent) {
        let mut listener = self.listener.lock();
        let event = match listener.as_ref() {
            Some(tx) => match tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };
        *listener = None;

        let mut backlog = self.backlog.lock();
        backlog.push_back(event);
        while backlog.len() > self.backlog_cap {
            if let Some(dropped) = backlog.pop_front() {
                warn!(node = %dropped.node_id(), "push backlog full, dropping oldest event");
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    fn abort_task(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

struct HubInner {
    source: Arc<dyn FrameSource>,
    config: PushConfig,
    channels: DashMap<WhiteboardId, Arc<Channel>>,
}

/// Process-wide registry of push subscriptions, keyed by whiteboard id.
#[derive(Clone)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl SubscriptionHub {
    pub fn new(source: Arc<dyn FrameSource>, config: PushConfig) -> Self {
        Self {
            inner: Arc::new(HubInner { source, config, channels: DashMap::new() }),
        }
    }

    fn channel(&self, whiteboard: &WhiteboardId) -> Arc<Channel> {
        let backlog = self.inner.config.backlog;
        self.inner
            .channels
            .entry(whiteboard.clone())
            .or_insert_with(|| Arc::new(Channel::new(backlog)))
            .clone()
    }

    /// Start (or restart) the push connection for `whiteboard`.
    ///
    /// Must be called from within a tokio runtime. Buffered events are
    /// delivered first, in arrival order.
    pub fn subscribe(&self, whiteboard: &WhiteboardId) -> Subscription {
        let channel = self.channel(whiteboard);
        if channel.task.lock().is_some() {
            debug!(whiteboard = %whiteboard, "replacing existing push subscription");
        }
        channel.abort_task();
        let epoch = channel.epoch.fetch_add(1, Ordering::AcqRel) + 1;

        let (tx, events) = mpsc::unbounded_channel();
        {
            let mut listener = channel.listener.lock();
            let mut backlog = channel.backlog.lock();
            if !backlog.is_empty() {
                debug!(whiteboard = %whiteboard, count = backlog.len(), "handing backlog to new subscriber");
            }
            for event in backlog.drain(..) {
                let _ = tx.send(event);
            }
            *listener = Some(tx);
        }
        let status = channel.status.subscribe();

        let span = info_span!("push.connection", whiteboard = %whiteboard);
        let task = tokio::spawn(
            run_connection(
                whiteboard.clone(),
                Arc::clone(&self.inner.source),
                Arc::clone(&channel),
                epoch,
                self.inner.config.clone(),
            )
            .instrument(span),
        );
        *channel.task.lock() = Some(task);

        Subscription { whiteboard: whiteboard.clone(), events, status }
    }

    /// Stop the connection and forget any backlog. Returns false if there
    /// was nothing subscribed.
    pub fn unsubscribe(&self, whiteboard: &WhiteboardId) -> bool {
        match self.inner.channels.remove(whiteboard) {
            Some((_, channel)) => {
                channel.abort_task();
                let _ = channel.status.send(ConnectionStatus::Disconnected);
                info!(whiteboard = %whiteboard, "push subscription closed");
                true
            }
            None => false,
        }
    }

    /// Events waiting for a subscriber.
    pub fn backlog_len(&self, whiteboard: &WhiteboardId) -> usize {
        self.inner
            .channels
            .get(whiteboard)
            .map(|c| c.backlog.lock().len())
            .unwrap_or(0)
    }

    /// Check if someone is currently receiving events for `whiteboard`.
    pub fn has_listener(&self, whiteboard: &WhiteboardId) -> bool {
        self.inner
            .channels
            .get(whiteboard)
            .map(|c| c.listener.lock().as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }
}

impl Drop for HubInner {
    fn drop(&mut self) {
        for entry in self.channels.iter() {
            entry.value().abort_task();
        }
    }
}

/// Connect, pump frames, reconnect with exponential backoff.
async fn run_connection(
    whiteboard: WhiteboardId,
    source: Arc<dyn FrameSource>,
    channel: Arc<Channel>,
    epoch: u64,
    config: PushConfig,
) {
    let mut attempt: u32 = 0;
    let mut delay = config.reconnect_initial;

    loop {
        match source.connect(&whiteboard).await {
            Ok(mut frames) => {
                info!(whiteboard = %whiteboard, "push channel connected");
                attempt = 0;
                delay = config.reconnect_initial;
                let _ = channel.status.send(ConnectionStatus::Connected);

                while let Some(frame) = frames.next().await {
                    match frame {
                        // An abort only lands at the next await; a replaced
                        // connection must not deliver in the meantime.
                        Ok(_) if !channel.is_current(epoch) => {
                            debug!(whiteboard = %whiteboard, "connection superseded, stopping");
                            return;
                        }
                        Ok(raw) => channel.handle_frame(&whiteboard, &raw),
                        Err(e) => {
                            warn!(whiteboard = %whiteboard, error = %e, "push stream failed");
                            break;
                        }
                    }
                }
                debug!(whiteboard = %whiteboard, "push stream ended");
            }
            Err(SubscriptionError::Closed) => {
                info!(whiteboard = %whiteboard, "push source closed");
                let _ = channel.status.send(ConnectionStatus::Disconnected);
                return;
            }
            Err(e) => warn!(whiteboard = %whiteboard, error = %e, attempt, "push connect failed"),
        }

        attempt = attempt.saturating_add(1);
        let _ = channel.status.send(ConnectionStatus::Reconnecting { attempt });
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(config.reconnect_max);
    }
}

/// A live subscription for one whiteboard.
pub struct Subscription {
    whiteboard: WhiteboardId,
    events: mpsc::UnboundedReceiver<PushEvent>,
    status: broadcast::Receiver<ConnectionStatus>,
}

impl Subscription {
    pub fn whiteboard(&self) -> &WhiteboardId {
        &self.whiteboard
    }

    /// Next event. `None` once the hub dropped this whiteboard.
    pub async fn recv(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }

    /// Next event if one is ready.
    pub fn try_recv(&mut self) -> Option<PushEvent> {
        self.events.try_recv().ok()
    }

    /// Status updates from now on.
    pub fn status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status.resubscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ChannelSource, ScriptStep, ScriptedSource};
    use std::time::Duration;

    fn complete(wb: &str, node: &str, text: &str) -> String {
        PushEvent::GenerationComplete {
            whiteboard_id: wb.into(),
            node_id: node.into(),
            generated_content: text.into(),
        }
        .to_frame()
    }

    // ── parse_frame ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_nested_and_flat_payloads() {
        let nested = complete("wb", "n1", "hello");
        let flat = r#"{"type":"whiteboard_generation_complete","whiteboardId":"wb","nodeId":"n1","generatedContent":"hello"}"#;
        let a = parse_frame(&nested).unwrap().unwrap();
        let b = parse_frame(flat).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.node_id(), &NodeId::from("n1"));
    }

    #[test]
    fn test_parse_sse_data_prefix() {
        let frame = format!("data: {}", complete("wb", "n1", "x"));
        assert!(parse_frame(&frame).unwrap().is_some());
    }

    #[test]
    fn test_keep_alive_frames_are_ignored() {
        assert_eq!(parse_frame(""), Ok(None));
        assert_eq!(parse_frame(": keep-alive"), Ok(None));
        assert_eq!(parse_frame("ping"), Ok(None));
        assert_eq!(parse_frame("\"pong\""), Ok(None));
        assert_eq!(parse_frame("data: not json"), Ok(None));
    }

    #[test]
    fn test_error_event_defaults_reason() {
        let frame = r#"{"type":"whiteboard_generation_error","data":{"whiteboardId":"wb","nodeId":"n"}}"#;
        match parse_frame(frame).unwrap().unwrap() {
            PushEvent::GenerationError { error, .. } => assert_eq!(error, "generation failed"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_payloads_are_errors() {
        let missing = r#"{"type":"whiteboard_generation_complete","data":{"whiteboardId":"wb"}}"#;
        assert!(matches!(parse_frame(missing), Err(FrameError::Payload { .. })));
        assert_eq!(parse_frame(r#"{"nodeId":"n"}"#), Err(FrameError::MissingType));
        assert_eq!(
            parse_frame(r#"{"type":"whiteboard_renamed"}"#),
            Err(FrameError::UnknownType("whiteboard_renamed".into()))
        );
    }

    // ── hub ─────────────────────────────────────────────────────────────────

    async fn recv(sub: &mut Subscription) -> PushEvent {
        tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn test_events_delivered_in_order_skipping_bad_frames() {
        let source = ScriptedSource::new(vec![ScriptStep::Frames(vec![
            complete("wb", "a", "1"),
            ": ping".into(),
            r#"{"type":"whiteboard_generation_complete","data":{}}"#.into(),
            complete("other", "x", "not ours"),
            complete("wb", "b", "2"),
        ])]);
        let hub = SubscriptionHub::new(Arc::new(source), PushConfig::default());
        let mut sub = hub.subscribe(&"wb".into());

        assert_eq!(recv(&mut sub).await.node_id(), &NodeId::from("a"));
        assert_eq!(recv(&mut sub).await.node_id(), &NodeId::from("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_with_backoff_then_disconnects() {
        let source = Arc::new(ScriptedSource::new(vec![
            ScriptStep::Fail("refused".into()),
            ScriptStep::Fail("refused".into()),
            ScriptStep::Frames(vec![complete("wb", "a", "1")]),
        ]));
        let hub = SubscriptionHub::new(source.clone(), PushConfig::default());
        let mut sub = hub.subscribe(&"wb".into());
        let mut status = sub.status();

        assert_eq!(recv(&mut sub).await.node_id(), &NodeId::from("a"));

        let mut seen = Vec::new();
        while let Ok(s) = tokio::time::timeout(Duration::from_secs(120), status.recv()).await {
            match s {
                Ok(s) => {
                    let done = s == ConnectionStatus::Disconnected;
                    seen.push(s);
                    if done {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        assert_eq!(
            seen,
            vec![
                ConnectionStatus::Reconnecting { attempt: 1 },
                ConnectionStatus::Reconnecting { attempt: 2 },
                ConnectionStatus::Connected,
                ConnectionStatus::Reconnecting { attempt: 1 },
                ConnectionStatus::Disconnected,
            ]
        );
        assert_eq!(source.connects(), 4);
    }

    #[tokio::test]
    async fn test_backlog_handed_to_next_subscriber() {
        let (source, frames) = ChannelSource::new();
        let hub = SubscriptionHub::new(Arc::new(source), PushConfig::default());
        let wb = WhiteboardId::from("wb");

        let first = hub.subscribe(&wb);
        // Let the connection task attach before the view goes away.
        while frames.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        drop(first);

        frames.send(complete("wb", "late", "arrived while closed")).unwrap();
        for _ in 0..1000 {
            if hub.backlog_len(&wb) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(hub.backlog_len(&wb), 1);
        assert!(!hub.has_listener(&wb));

        let mut second = hub.subscribe(&wb);
        assert_eq!(recv(&mut second).await.node_id(), &NodeId::from("late"));
        assert_eq!(hub.backlog_len(&wb), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_live_subscription() {
        let (source, frames) = ChannelSource::new();
        let hub = SubscriptionHub::new(Arc::new(source), PushConfig::default());
        let wb = WhiteboardId::from("wb");

        let mut first = hub.subscribe(&wb);
        while frames.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        let mut second = hub.subscribe(&wb);
        let mut status = second.status();
        assert_eq!(status.recv().await.unwrap(), ConnectionStatus::Connected);

        frames.send(complete("wb", "n1", "once")).unwrap();
        assert_eq!(recv(&mut second).await.node_id(), &NodeId::from("n1"));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(second.try_recv().is_none());
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_connection_does_not_deliver() {
        let channel = Arc::new(Channel::new(8));
        let (tx, mut events) = mpsc::unbounded_channel();
        *channel.listener.lock() = Some(tx);
        channel.epoch.store(2, Ordering::Release);

        let (source, frames) = ChannelSource::new();
        let task = tokio::spawn(run_connection(
            "wb".into(),
            Arc::new(source),
            Arc::clone(&channel),
            1,
            PushConfig::default(),
        ));
        while frames.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        frames.send(complete("wb", "n1", "stale")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        assert!(events.try_recv().is_err());
        assert_eq!(channel.backlog.lock().len(), 0);
    }

    #[tokio::test]
    async fn test_backlog_is_bounded() {
        let channel = Channel::new(3);
        for i in 0..5 {
            channel.deliver(PushEvent::GenerationError {
                whiteboard_id: "wb".into(),
                node_id: NodeId::from(format!("n{i}")),
                error: "x".into(),
            });
        }
        let backlog = channel.backlog.lock();
        assert_eq!(backlog.len(), 3);
        assert_eq!(backlog.front().unwrap().node_id(), &NodeId::from("n2"));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_subscription() {
        let (source, _frames) = ChannelSource::new();
        let hub = SubscriptionHub::new(Arc::new(source), PushConfig::default());
        let wb = WhiteboardId::from("wb");
        let mut sub = hub.subscribe(&wb);

        assert!(hub.unsubscribe(&wb));
        assert!(!hub.unsubscribe(&wb));
        assert_eq!(tokio::time::timeout(Duration::from_secs(5), sub.recv()).await.unwrap(), None);
    }
}
