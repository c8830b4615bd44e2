//! Fan-out of structured events to external subscribers: a broadcast
//! channel, best-effort and non-blocking for the publisher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events the batch organizer emits. Carries its own timestamp; payload
/// shape is fixed per variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum NotificationEvent {
    BatchProcessingStarted {
        batch_id: String,
        paper_count: usize,
        task_directory: Option<String>,
        at: DateTime<Utc>,
    },
    BatchProcessingCompleted {
        batch_id: String,
        task_directory: Option<String>,
        total_papers: usize,
        success_count: usize,
        failed_count: usize,
        csv_artifact: Option<String>,
        completed_at: DateTime<Utc>,
    },
}

/// In-process pub/sub. Delivery is best-effort: a publish with no
/// subscribers, or subscribers that have been dropped, is not an error.
pub struct NotificationBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event. Subscribers that have disconnected do not affect
    /// this call, and a publish with zero live subscribers is not an error.
    pub fn emit(&self, event: NotificationEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
