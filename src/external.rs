//! Interfaces the core consumes but does not implement: the AI client,
//! storage/filesystem glue, durable KV, and notification transport.
//! Implementations live outside this crate; `crate::testing` provides
//! fakes used only by this crate's own tests.

use crate::batch::Paper;
use crate::error::ExternalError;
use async_trait::async_trait;

/// Implementations are opaque;
/// a failed or empty translation is not itself an error the core
/// propagates — callers decide how to treat it (see
/// `organize::OrganizeHandler`).
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn translate_abstract(&self, text: &str, target_language: &str) -> Result<String, ExternalError>;
    async fn classify(&self, paper: &Paper, standard: &str) -> Result<String, ExternalError>;
}

/// Result of creating/confirming a per-task storage subdirectory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DirResult {
    pub task_directory: String,
    pub full_path: String,
}

/// Result of saving the batch CSV artifact to disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SaveResult {
    pub filename: String,
    pub download_id: String,
    pub full_path: String,
}

/// Creates/confirms a per-task directory and saves the CSV artifact.
#[async_trait]
pub trait StorageGlue: Send + Sync {
    async fn create_sub_directory(&self, name: &str) -> Result<DirResult, ExternalError>;
    async fn save_csv_file(
        &self,
        data: &[u8],
        filename: &str,
        task_directory: &str,
    ) -> Result<SaveResult, ExternalError>;
}

/// Backs `DurableQueueStore`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn read(&self, key: &str) -> Option<Vec<u8>>;
    async fn write(&self, key: &str, value: Vec<u8>);
    async fn delete(&self, key: &str);
}
