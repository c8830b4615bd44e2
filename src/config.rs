//! Tunables for the scheduler and metadata coordinator.
//!
//! These are plain, serializable structs rather than a global singleton:
//! callers build one per `HandlerExecutor`/`MetadataCoordinator` and may
//! override defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a persisted task is kept across restarts before
/// `HandlerExecutor::clear_expired` drops it. `FixedCount` is reserved
/// (kept for forward compatibility); no executor constructs it today.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PersistenceStrategy {
    /// Queues are never persisted; on start they are always empty.
    None,
    /// Tasks older than this duration are purged on load.
    FixedDuration(#[serde(with = "duration_millis")] Duration),
    /// Reserved: keep only the N most recent tasks. Not implemented by any
    /// executor; see DESIGN.md.
    FixedCount(usize),
}

impl Default for PersistenceStrategy {
    fn default() -> Self {
        Self::None
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Configuration for one `HandlerExecutor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub name: String,
    pub max_concurrency: usize,
    pub exec_cap: usize,
    pub wait_cap: usize,
    pub persistence: PersistenceStrategy,
    #[serde(with = "timing_serde")]
    pub timing: ProcessingLoopTiming,
}

impl ExecutorConfig {
    pub fn new(name: impl Into<String>, max_concurrency: usize, exec_cap: usize, wait_cap: usize) -> Self {
        Self {
            name: name.into(),
            max_concurrency: max_concurrency.max(1),
            exec_cap,
            wait_cap,
            persistence: PersistenceStrategy::None,
            timing: ProcessingLoopTiming::default(),
        }
    }

    pub fn with_persistence(mut self, strategy: PersistenceStrategy) -> Self {
        self.persistence = strategy;
        self
    }
}

/// Backoff timing for an executor's processing loop: how long it idles
/// when there's no work, yields between admitted tasks, and backs off
/// after an unexpected error.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingLoopTiming {
    pub idle_backoff: Duration,
    pub yield_delay: Duration,
    pub error_backoff: Duration,
}

impl Default for ProcessingLoopTiming {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_secs(1),
            yield_delay: Duration::from_millis(100),
            error_backoff: Duration::from_secs(2),
        }
    }
}

mod timing_serde {
    use super::ProcessingLoopTiming;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Repr {
        idle_backoff_ms: u64,
        yield_delay_ms: u64,
        error_backoff_ms: u64,
    }

    pub fn serialize<S: Serializer>(t: &ProcessingLoopTiming, s: S) -> Result<S::Ok, S::Error> {
        Repr {
            idle_backoff_ms: t.idle_backoff.as_millis() as u64,
            yield_delay_ms: t.yield_delay.as_millis() as u64,
            error_backoff_ms: t.error_backoff.as_millis() as u64,
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ProcessingLoopTiming, D::Error> {
        let repr = Repr::deserialize(d)?;
        Ok(ProcessingLoopTiming {
            idle_backoff: std::time::Duration::from_millis(repr.idle_backoff_ms),
            yield_delay: std::time::Duration::from_millis(repr.yield_delay_ms),
            error_backoff: std::time::Duration::from_millis(repr.error_backoff_ms),
        })
    }
}

/// Configuration for `MetadataCoordinator::wait_all_ready`.
#[derive(Debug, Clone, Copy)]
pub struct MetadataWaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for MetadataWaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}
