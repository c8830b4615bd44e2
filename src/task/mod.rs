//! The Task value object and its kind/status types.

mod kind;
pub mod queue_store;

pub use kind::TaskKind;
pub use queue_store::{DurableQueueStore, QueueKind};

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle status of a `Task`. Transitions form a strict DAG:
/// `Pending -> Executing -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A unit of work with a kind, params, and a lifecycle managed by exactly
/// one `HandlerExecutor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    key: String,
    kind: TaskKind,
    params: serde_json::Value,
    status: TaskStatus,
    result: Option<serde_json::Value>,
    error: Option<CoreError>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Constructs a new task, `Pending`, timestamped now. `key` must be
    /// non-empty and globally unique across all handlers (enforced by
    /// convention, not by this constructor.
    pub fn new(key: impl Into<String>, kind: TaskKind, params: serde_json::Value) -> Result<Self, CoreError> {
        let key = key.into();
        if key.is_empty() {
            return Err(CoreError::invalid_input("task key must not be empty"));
        }
        let now = Utc::now();
        Ok(Self {
            key,
            kind,
            params,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&CoreError> {
        self.error.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// `key` is non-empty (checked at construction); `kind` must be a
    /// known/non-empty discriminator.
    pub fn validate_params(&self) -> Result<(), CoreError> {
        if self.kind.as_str().is_empty() {
            return Err(CoreError::invalid_input("task kind must not be empty"));
        }
        Ok(())
    }

    /// `Pending -> Executing`. Only the owning `HandlerExecutor` calls this.
    pub fn mark_executing(&mut self) -> Result<(), CoreError> {
        if self.status != TaskStatus::Pending {
            return Err(CoreError::internal(format!(
                "cannot mark executing from status {:?}",
                self.status
            )));
        }
        self.status = TaskStatus::Executing;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Resets an `Executing` task back to `Pending`. Used only when
    /// reloading persisted queues on restart:
    /// a restart has no in-flight process actually running the task, so
    /// any task that was mid-execution when it was last persisted must be
    /// re-admitted from scratch rather than trusted as still running.
    pub fn reset_to_pending(&mut self) {
        if self.status == TaskStatus::Executing {
            self.status = TaskStatus::Pending;
            self.updated_at = Utc::now();
        }
    }

    /// `Executing -> Completed`.
    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.updated_at = Utc::now();
    }

    /// `Executing -> Failed` (or `Pending -> Failed` for validation
    /// failures that never reached execution).
    pub fn mark_failed(&mut self, error: CoreError) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }

    /// True once `now - created_at` exceeds `limit`.
    pub fn is_expired(&self, limit: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.created_at);
        match chrono::Duration::from_std(limit) {
            Ok(limit) => age > limit,
            Err(_) => false,
        }
    }
}
