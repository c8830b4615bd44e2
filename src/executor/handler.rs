//! Per-kind execution logic plugged into a `HandlerExecutor`.

use crate::error::CoreError;
use crate::task::{Task, TaskKind};
use async_trait::async_trait;

/// Implemented once per task kind (or per family of kinds a single
/// executor serves).
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Kinds this handler knows how to run.
    fn supported_kinds(&self) -> &[TaskKind];

    /// Handler-specific validation beyond `Task::validate_params`. Default
    /// accepts everything.
    fn validate_params(&self, _task: &Task) -> Result<(), CoreError> {
        Ok(())
    }

    /// Called right before `execute`; may be a no-op.
    async fn before_execute(&self, _task: &Task) -> Result<(), CoreError> {
        Ok(())
    }

    /// The per-kind operation. May suspend on external I/O. A returned
    /// `Err` maps the task to `Failed`; a returned `Ok` maps it to
    /// `Completed` with that value as `Task::result`.
    async fn execute(&self, task: &Task) -> Result<serde_json::Value, CoreError>;

    /// Called after `execute` returns a result, successful or not.
    /// Exceptions here are logged and do not revert the already-decided
    /// Completed/Failed transition.
    async fn after_execute(&self, _task: &Task, _result: &Result<serde_json::Value, CoreError>) {}
}
