//! Fakes for the external collaborators, built against the crate's public
//! API (integration tests cannot see `cfg(test)` internals).

use async_trait::async_trait;
use paper_organizer_core::batch::Paper;
use paper_organizer_core::error::ExternalError;
use paper_organizer_core::external::{AiClient, DirResult, KvStore, SaveResult, StorageGlue};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryKvStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
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

/// Captures every saved CSV so tests can assert on its contents without a
/// real filesystem.
#[derive(Default)]
pub struct CapturingStorageGlue {
    pub saved: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl StorageGlue for CapturingStorageGlue {
    async fn create_sub_directory(&self, name: &str) -> Result<DirResult, ExternalError> {
        Ok(DirResult {
            task_directory: name.to_string(),
            full_path: format!("/tmp/{name}"),
        })
    }

    async fn save_csv_file(&self, data: &[u8], filename: &str, task_directory: &str) -> Result<SaveResult, ExternalError> {
        self.saved.lock().unwrap().push((filename.to_string(), data.to_vec()));
        Ok(SaveResult {
            filename: filename.to_string(),
            download_id: format!("download-{filename}"),
            full_path: format!("{task_directory}/{filename}"),
        })
    }
}
