//! Registry mapping task kind to `Executor`, and the single entry point
//! submitters route tasks through.

use crate::error::DispatchError;
use crate::executor::{CompletionSink, Executor};
use crate::task::{Task, TaskKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct Dispatcher {
    executors: RwLock<HashMap<TaskKind, Arc<dyn Executor>>>,
    started: AtomicBool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `executor` for `kind`. Rejects kinds the executor itself
    /// does not declare support for; the same `Arc` may be registered for
    /// more than one kind (a single executor serving a family of kinds).
    pub async fn register(&self, kind: TaskKind, executor: Arc<dyn Executor>) -> Result<(), DispatchError> {
        if !executor.supported_kinds().contains(&kind) {
            return Err(DispatchError::KindNotDeclared(kind.to_string()));
        }
        self.executors.write().await.insert(kind, executor);
        Ok(())
    }

    pub async fn submit(&self, task: Task) -> Result<(), DispatchError> {
        let kind = task.kind().clone();
        let executor = {
            let executors = self.executors.read().await;
            executors.get(&kind).cloned()
        };
        match executor {
            Some(executor) => executor.submit(task).await.map_err(DispatchError::from),
            None => Err(DispatchError::UnsupportedKind(kind.to_string())),
        }
    }

    /// Registers `sink` on the executor currently serving `kind`, so it is
    /// notified once that executor reports a task's Completed/Failed
    /// transition. Does nothing to tasks already in flight before the call.
    pub async fn set_completion_sink(&self, kind: &TaskKind, sink: Arc<dyn CompletionSink>) -> Result<(), DispatchError> {
        let executor = {
            let executors = self.executors.read().await;
            executors.get(kind).cloned()
        };
        match executor {
            Some(executor) => {
                executor.set_completion_sink(sink).await;
                Ok(())
            }
            None => Err(DispatchError::UnsupportedKind(kind.to_string())),
        }
    }

    /// Idempotent: calling `start()` twice does not start any executor's
    /// loop a second time, since each `Executor::start` is itself
    /// idempotent and this only dedupes distinct registrations of the same
    /// underlying `Arc` before calling through.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let executors = self.executors.read().await;
        let mut started: Vec<Arc<dyn Executor>> = Vec::new();
        for executor in executors.values() {
            if started.iter().any(|s| Arc::ptr_eq(s, executor)) {
                continue;
            }
            started.push(executor.clone());
        }
        drop(executors);
        for executor in started {
            executor.start().await;
        }
    }
}
