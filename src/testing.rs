//! In-process fakes for the external collaborators, used only by
//! this crate's own unit tests. Integration tests under `tests/` keep their
//! own copies in `tests/common/` since they compile against the published
//! crate API rather than `cfg(test)` internals.

use crate::batch::Paper;
use crate::error::ExternalError;
use crate::external::{AiClient, DirResult, KvStore, SaveResult, StorageGlue};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryKvStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().await.get(key).cloned()
    }

    async fn write(&self, key: &str, value: Vec<u8>) {
        self.data.write().await.insert(key.to_string(), value);
    }

    async fn delete(&self, key: &str) {
        self.data.write().await.remove(key);
    }
}

/// Translates by uppercasing and tagging with the target language; never
/// fails. Good enough to exercise the organize pipeline in unit tests.
pub struct EchoAiClient;

#[async_trait]
impl AiClient for EchoAiClient {
    async fn translate_abstract(&self, text: &str, target_language: &str) -> Result<String, ExternalError> {
        Ok(format!("[{target_language}] {text}"))
    }

    async fn classify(&self, _paper: &Paper, standard: &str) -> Result<String, ExternalError> {
        Ok(format!("{standard}:uncategorized"))
    }
}

/// An AI client whose translation call always fails, for exercising the
/// organize pipeline's per-stage failure handling.
pub struct FailingAiClient;

#[async_trait]
impl AiClient for FailingAiClient {
    async fn translate_abstract(&self, _text: &str, _target_language: &str) -> Result<String, ExternalError> {
        Err(ExternalError::new("translation backend unavailable"))
    }

    async fn classify(&self, _paper: &Paper, standard: &str) -> Result<String, ExternalError> {
        Ok(format!("{standard}:uncategorized"))
    }
}

/// Storage glue that only tracks paths in memory — never touches disk.
#[derive(Default)]
pub struct NoopStorageGlue;

#[async_trait]
impl StorageGlue for NoopStorageGlue {
    async fn create_sub_directory(&self, name: &str) -> Result<DirResult, ExternalError> {
        Ok(DirResult {
            task_directory: name.to_string(),
            full_path: format!("/tmp/{name}"),
        })
    }

    async fn save_csv_file(
        &self,
        _data: &[u8],
        filename: &str,
        task_directory: &str,
    ) -> Result<SaveResult, ExternalError> {
        Ok(SaveResult {
            filename: filename.to_string(),
            download_id: format!("download-{filename}"),
            full_path: format!("{task_directory}/{filename}"),
        })
    }
}
