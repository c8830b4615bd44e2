//! Core error types shared across the scheduler, metadata coordinator and
//! batch organizer.

use std::fmt;
use thiserror::Error;

/// An opaque error carrier: what `Task.error` and `PaperItem` failures hold.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CoreError {
    pub kind: CoreErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreErrorKind {
    InvalidInput,
    UnsupportedKind,
    QueueFull,
    Timeout,
    ExternalFailure,
    InternalError,
    PersistenceError,
}

impl fmt::Display for CoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid_input",
            Self::UnsupportedKind => "unsupported_kind",
            Self::QueueFull => "queue_full",
            Self::Timeout => "timeout",
            Self::ExternalFailure => "external_failure",
            Self::InternalError => "internal_error",
            Self::PersistenceError => "persistence_error",
        };
        write!(f, "{s}")
    }
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::InvalidInput, message)
    }

    pub fn unsupported_kind(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::UnsupportedKind, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Timeout, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::ExternalFailure, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::InternalError, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::PersistenceError, message)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CoreError {}

/// Errors returned synchronously from `HandlerExecutor::submit`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("task kind {0} is not supported by this executor")]
    UnsupportedKind(String),
    #[error("both execution and waiting queues are at capacity")]
    QueueFull,
}

/// Errors returned synchronously from `Dispatcher::submit`/`register`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no executor registered for task kind {0}")]
    UnsupportedKind(String),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("executor does not declare kind {0} among its supported kinds")]
    KindNotDeclared(String),
}

/// Errors from `MetadataCoordinator::wait_all_ready`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("timed out after {elapsed_ms}ms waiting for metadata readiness")]
    Timeout { elapsed_ms: u64 },
}

/// Errors from `BatchOrganizer::organize_papers`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors an external collaborator (AI client, storage glue, KV store) can
/// return. The core never treats these as fatal on their own; see
/// `organize::OrganizeHandler` for how they become per-action failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{0}")]
    Failed(String),
}

impl ExternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
