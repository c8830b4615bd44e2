//! Durable queue persistence.
//!
//! This is deliberately thin: the actual key-value storage is an external
//! collaborator. `DurableQueueStore` wraps any
//! `KvStore` with the `task_queue_{namespace}_{kind}` key convention and
//! best-effort semantics — a read failure (or missing key) yields an empty
//! queue rather than propagating an error, because the core must tolerate
//! total loss of persisted queues.

use super::Task;
use crate::external::KvStore;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Execution,
    Waiting,
}

impl QueueKind {
    fn as_str(&self) -> &str {
        match self {
            Self::Execution => "execution",
            Self::Waiting => "waiting",
        }
    }
}

fn storage_key(namespace: &str, kind: QueueKind) -> String {
    format!("task_queue_{namespace}_{}", kind.as_str())
}

/// Persists per-(handler, queue-kind) task lists on top of a `KvStore`.
pub struct DurableQueueStore {
    kv: Arc<dyn KvStore>,
}

impl DurableQueueStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Best-effort write. A failure to serialize or write is logged and
    /// swallowed — persistence errors are never fatal
    /// `PersistenceError`).
    pub async fn save_queue(&self, namespace: &str, kind: QueueKind, tasks: &[Task]) {
        let key = storage_key(namespace, kind);
        match serde_json::to_vec(tasks) {
            Ok(bytes) => self.kv.write(&key, bytes).await,
            Err(e) => warn!(namespace, kind = kind.as_str(), error = %e, "failed to serialize queue for persistence"),
        }
    }

    /// Returns an empty sequence on first use or on any read/deserialize
    /// failure, rather than propagating an error.
    pub async fn load_queue(&self, namespace: &str, kind: QueueKind) -> Vec<Task> {
        let key = storage_key(namespace, kind);
        match self.kv.read(&key).await {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(namespace, kind = kind.as_str(), error = %e, "failed to deserialize persisted queue, starting empty");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// Clears both queues for a namespace, e.g. after a handler is retired.
    pub async fn clear(&self, namespace: &str) {
        for kind in [QueueKind::Execution, QueueKind::Waiting] {
            self.kv.delete(&storage_key(namespace, kind)).await;
        }
    }
}
