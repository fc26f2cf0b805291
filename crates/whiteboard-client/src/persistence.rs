//! Debounced save of the full snapshot to the content service.
//!
//! ```text
//!   schedule(snap) ──┐
//!   schedule(snap) ──┼──▶ [saver task] ── quiet for `debounce` ──▶ update_whiteboard_content
//!   flush()        ──┘         │
//!                              └──▶ SaveReport (mpsc) ──▶ session notices
//! ```
//!
//! Only the newest scheduled snapshot is ever sent. A failed save is
//! reported and forgotten; the next change schedules a fresh one. Dropping
//! the bridge lets the task save whatever is still pending, then exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, info_span, warn};
use whiteboard_types::{GraphSnapshot, WhiteboardId};

use crate::services::{ContentService, ServiceError};

/// Outcome of one save attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum SaveReport {
    Saved { nodes: usize, edges: usize },
    Failed { error: ServiceError },
}

enum SaveCommand {
    Changed(Arc<GraphSnapshot>),
    Flush(oneshot::Sender<Result<(), ServiceError>>),
}

/// Handle to the saver task of one whiteboard.
pub struct PersistenceBridge {
    tx: mpsc::UnboundedSender<SaveCommand>,
    task: JoinHandle<()>,
}

impl PersistenceBridge {
    /// Start the saver task. Reports go to `reports`.
    pub fn spawn(
        content: Arc<dyn ContentService>,
        whiteboard: WhiteboardId,
        debounce: Duration,
        reports: mpsc::UnboundedSender<SaveReport>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let saver = Saver { content, whiteboard, debounce, reports };
        let task = tokio::spawn(saver.run(rx));
        Self { tx, task }
    }

    /// Note that the graph changed. Restarts the quiet period.
    pub fn schedule(&self, snapshot: Arc<GraphSnapshot>) {
        if self.tx.send(SaveCommand::Changed(snapshot)).is_err() {
            warn!("saver task gone, change not persisted");
        }
    }

    /// Save anything pending right now and wait for the result.
    pub async fn flush(&self) -> Result<(), ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SaveCommand::Flush(reply))
            .map_err(|_| ServiceError::Transport("saver task gone".into()))?;
        rx.await.map_err(|_| ServiceError::Transport("saver task gone".into()))?
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

struct Saver {
    content: Arc<dyn ContentService>,
    whiteboard: WhiteboardId,
    debounce: Duration,
    reports: mpsc::UnboundedSender<SaveReport>,
}

impl Saver {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<SaveCommand>) {
        let mut pending: Option<Arc<GraphSnapshot>> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            let wake = deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                command = rx.recv() => match command {
                    Some(SaveCommand::Changed(snapshot)) => {
                        pending = Some(snapshot);
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    Some(SaveCommand::Flush(reply)) => {
                        deadline = None;
                        let result = match pending.take() {
                            Some(snapshot) => self.save(&snapshot).await,
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Some(snapshot) = pending.take() {
                            let _ = self.save(&snapshot).await;
                        }
                        debug!(whiteboard = %self.whiteboard, "saver stopped");
                        return;
                    }
                },
                _ = sleep_until(wake), if deadline.is_some() => {
                    deadline = None;
                    if let Some(snapshot) = pending.take() {
                        let _ = self.save(&snapshot).await;
                    }
                }
            }
        }
    }

    async fn save(&self, snapshot: &GraphSnapshot) -> Result<(), ServiceError> {
        let span = info_span!(
            "persistence.save",
            whiteboard = %self.whiteboard,
            nodes = snapshot.node_count(),
        );
        let result = self
            .content
            .update_whiteboard_content(&self.whiteboard, snapshot)
            .instrument(span)
            .await;

        let report = match &result {
            Ok(()) => {
                debug!(whiteboard = %self.whiteboard, "saved");
                SaveReport::Saved { nodes: snapshot.node_count(), edges: snapshot.edge_count() }
            }
            Err(error) => {
                warn!(whiteboard = %self.whiteboard, %error, "save failed");
                SaveReport::Failed { error: error.clone() }
            }
        };
        // Nobody listening is fine.
        let _ = self.reports.send(report);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockContentService;
    use whiteboard_types::{Node, NodeKind, Position};

    fn snap(n: usize) -> Arc<GraphSnapshot> {
        let nodes = (0..n)
            .map(|i| Node::new(format!("n{i}").as_str().into(), NodeKind::Idea, Position::default()))
            .collect();
        Arc::new(GraphSnapshot::new(nodes, vec![]))
    }

    fn bridge(service: &Arc<MockContentService>) -> (PersistenceBridge, mpsc::UnboundedReceiver<SaveReport>) {
        let (reports_tx, reports) = mpsc::unbounded_channel();
        let content: Arc<dyn ContentService> = service.clone();
        (PersistenceBridge::spawn(content, "wb".into(), Duration::from_millis(1000), reports_tx), reports)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_save() {
        let service = Arc::new(MockContentService::new());
        let (bridge, mut reports) = bridge(&service);

        for n in 1..=5 {
            bridge.schedule(snap(n));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(service.save_count(), 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(service.save_count(), 1);
        assert_eq!(service.last_save().unwrap().node_count(), 5);
        assert_eq!(reports.recv().await, Some(SaveReport::Saved { nodes: 5, edges: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_saves_immediately() {
        let service = Arc::new(MockContentService::new());
        let (bridge, _reports) = bridge(&service);

        bridge.schedule(snap(2));
        bridge.flush().await.unwrap();
        assert_eq!(service.save_count(), 1);

        // Nothing pending: no extra save, and the old deadline was cleared.
        bridge.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(service.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_not_retried() {
        let service = Arc::new(MockContentService::new());
        service.set_fail_saves(true);
        let (bridge, mut reports) = bridge(&service);

        bridge.schedule(snap(1));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(matches!(reports.recv().await, Some(SaveReport::Failed { .. })));

        service.set_fail_saves(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(service.save_count(), 0);
        assert!(bridge.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_saves_pending() {
        let service = Arc::new(MockContentService::new());
        let (bridge, mut reports) = bridge(&service);

        bridge.schedule(snap(3));
        drop(bridge);
        assert_eq!(reports.recv().await, Some(SaveReport::Saved { nodes: 3, edges: 0 }));
        assert_eq!(service.save_count(), 1);
    }
}
