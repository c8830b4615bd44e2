//! Minimal end-to-end wiring of the core: registers the organize handler,
//! submits one batch, and waits for it to finish. Demonstrates how an
//! embedding application assembles `Dispatcher` + `MetadataCoordinator` +
//! `BatchOrganizer` and initializes logging; not part of the library crate.

use anyhow::{Context, Result};
use paper_organizer_core::batch::{BatchOptions, Paper, StorageOptions, TranslationOptions};
use paper_organizer_core::config::ExecutorConfig;
use paper_organizer_core::dispatcher::Dispatcher;
use paper_organizer_core::executor::{Executor, HandlerExecutor};
use paper_organizer_core::external::{AiClient, DirResult, SaveResult, StorageGlue};
use paper_organizer_core::metadata::{MetadataCoordinator, PaperRecord};
use paper_organizer_core::notifications::NotificationEvent;
use paper_organizer_core::external::KvStore;
use paper_organizer_core::organize::OrganizeHandler;
use paper_organizer_core::task::{DurableQueueStore, TaskKind};
use paper_organizer_core::{BatchOrganizer, NotificationBus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// A pass-through AI client that returns its input unchanged, standing in
/// for whatever translation/classification backend a real deployment wires
/// up behind the same trait.
struct PassthroughAiClient;

#[async_trait::async_trait]
impl AiClient for PassthroughAiClient {
    async fn translate_abstract(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, paper_organizer_core::error::ExternalError> {
        Ok(format!("[{target_language}] {text}"))
    }

    async fn classify(
        &self,
        _paper: &Paper,
        standard: &str,
    ) -> Result<String, paper_organizer_core::error::ExternalError> {
        Ok(format!("{standard}:general"))
    }
}

/// Writes nothing; reports success so the demo can print where a real
/// deployment's files would have landed.
struct NoopStorage;

#[async_trait::async_trait]
impl StorageGlue for NoopStorage {
    async fn create_sub_directory(&self, name: &str) -> Result<DirResult, paper_organizer_core::error::ExternalError> {
        Ok(DirResult {
            task_directory: name.to_string(),
            full_path: format!("/tmp/demo-run/{name}"),
        })
    }

    async fn save_csv_file(
        &self,
        data: &[u8],
        filename: &str,
        task_directory: &str,
    ) -> Result<SaveResult, paper_organizer_core::error::ExternalError> {
        info!(bytes = data.len(), filename, task_directory, "would save csv artifact");
        Ok(SaveResult {
            filename: filename.to_string(),
            full_path: format!("{task_directory}/{filename}"),
            download_id: filename.to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,paper_organizer_core=debug".into()),
        )
        .init();

    let storage = Arc::new(NoopStorage);
    let dispatcher = Arc::new(Dispatcher::new());
    let handler = OrganizeHandler::new(Arc::new(PassthroughAiClient), storage.clone());
    let store = Arc::new(DurableQueueStore::new(Arc::new(InMemoryKvStore::default())));
    let executor: Arc<dyn Executor> = Arc::new(HandlerExecutor::new(
        ExecutorConfig::new("organize_paper", 4, 64, 256),
        handler,
        store,
    ));
    dispatcher
        .register(TaskKind::OrganizePaper, executor)
        .await
        .context("registering organize handler")?;

    let metadata = Arc::new(MetadataCoordinator::new());
    let notifications = Arc::new(NotificationBus::default());
    let organizer = Arc::new(BatchOrganizer::new(
        dispatcher.clone(),
        metadata.clone(),
        notifications.clone(),
        storage,
        Duration::from_millis(200),
        Duration::from_secs(30),
    ));
    dispatcher
        .set_completion_sink(&TaskKind::OrganizePaper, organizer.clone())
        .await
        .context("wiring organize completion sink")?;
    dispatcher.start().await;
    let mut events = notifications.subscribe();

    let paper = Paper::new("demo-1", "Attention Is All You Need");
    metadata.store(PaperRecord::ready("demo-1", serde_json::json!({"source": "demo"})));

    let options = BatchOptions {
        translation: TranslationOptions {
            enabled: true,
            target_language: "French".into(),
        },
        storage: StorageOptions {
            task_directory: Some("demo-run".into()),
        },
        ..Default::default()
    };
    let batch_id = organizer.organize_papers(vec![paper], options).await.context("submitting batch")?;
    info!(batch_id, "batch submitted");

    loop {
        match events.recv().await {
            Ok(NotificationEvent::BatchProcessingCompleted { batch_id: id, success_count, failed_count, .. }) if id == batch_id => {
                info!(success_count, failed_count, "batch finished");
                break;
            }
            Ok(_) => continue,
            Err(err) => return Err(err).context("notification bus closed before batch finished"),
        }
    }

    let batch = organizer.batch(&batch_id).await.context("batch vanished after completion")?;
    println!("batch {} finished with status {:?}", batch.id, batch.status);
    Ok(())
}

/// An in-memory `KvStore`, standing in for whatever durable key-value
/// backend a real deployment uses to persist executor queues across
/// restarts.
#[derive(Default)]
struct InMemoryKvStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait::async_trait]
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
