//! Task orchestration core: a generic bounded-concurrency task scheduler,
//! a metadata-readiness gate, and a batch organizer that fans out
//! per-paper work and produces a CSV artifact.
//!
//! This crate owns scheduling and lifecycle only. The AI client, storage
//! glue, durable key-value store, and notification transport are
//! consumed through the traits in [`external`]; this crate never
//! initializes a `tracing` subscriber itself, leaving that to the binary
//! that embeds it.

pub mod batch;
pub mod config;
pub mod csv_export;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod external;
pub mod metadata;
pub mod notifications;
pub mod organize;
pub mod task;

#[cfg(test)]
pub mod testing;

pub use batch::{Batch, BatchOrganizer, Paper};
pub use dispatcher::Dispatcher;
pub use error::CoreError;
pub use metadata::MetadataCoordinator;
pub use notifications::NotificationBus;
pub use task::{Task, TaskKind};
