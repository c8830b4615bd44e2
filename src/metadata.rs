//! The metadata-enrichment coordinator: a cache of per-paper
//! readiness, and the polling wait used by the batch organizer before it
//! fans out organize tasks.

use crate::error::MetadataError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Whatever the extractor handler discovered about a paper. `processing`
/// is the only field the readiness check looks at; the rest is opaque
/// payload merged into the paper item on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub processing: bool,
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl PaperRecord {
    pub fn ready(paper_id: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            paper_id: paper_id.into(),
            processing: false,
            fields,
        }
    }
}

#[derive(Default)]
pub struct MetadataCoordinator {
    cache: DashMap<String, PaperRecord>,
}

impl MetadataCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, paper_id: &str) -> Option<PaperRecord> {
        self.cache.get(paper_id).map(|entry| entry.value().clone())
    }

    /// Replaces any existing entry. This is the only writer path; readers
    /// (including concurrent `isReady` polls from the coordinator's wait
    /// loop) must tolerate concurrent writes, which `DashMap` provides.
    pub fn store(&self, record: PaperRecord) {
        self.cache.insert(record.paper_id.clone(), record);
    }

    /// A paper is ready iff an entry exists and it is not flagged
    /// `processing`.
    pub fn is_ready(&self, paper_id: &str) -> bool {
        self.cache.get(paper_id).map(|entry| !entry.processing).unwrap_or(false)
    }

    /// Invoked by the external extractor once it has finished enriching a
    /// paper. Storing the record is the only way readiness flips true.
    pub fn on_preprocessing_completed(&self, record: PaperRecord) {
        self.store(record);
    }

    /// Waits until every id in `paper_ids` is ready, polling at
    /// `poll_interval`. Returns the ready records (in the same order as
    /// `paper_ids`) on success, or `MetadataError::Timeout` once `timeout`
    /// has elapsed without every id being ready simultaneously.
    ///
    /// A `timeout` of zero with at least one not-yet-ready id returns
    /// Timeout after a single readiness check, without sleeping.
    pub async fn wait_all_ready(
        &self,
        paper_ids: &[String],
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Vec<PaperRecord>, MetadataError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(records) = self.try_collect_all_ready(paper_ids) {
                return Ok(records);
            }
            if Instant::now() >= deadline {
                return Err(MetadataError::Timeout {
                    elapsed_ms: timeout.as_millis() as u64,
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }
    }

    fn try_collect_all_ready(&self, paper_ids: &[String]) -> Option<Vec<PaperRecord>> {
        let mut records = Vec::with_capacity(paper_ids.len());
        for id in paper_ids {
            let entry = self.cache.get(id)?;
            if entry.processing {
                return None;
            }
            records.push(entry.value().clone());
        }
        Some(records)
    }
}
