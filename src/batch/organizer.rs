//! The batch coordinator: drives a batch from Pending through Running
//! to a terminal state, gating on metadata readiness and fanning out one
//! organize task per paper.

use super::{Batch, BatchOptions, BatchStatus, CsvArtifact, Paper, PaperStatus};
use crate::csv_export;
use crate::dispatcher::Dispatcher;
use crate::error::{BatchError, CoreError};
use crate::executor::CompletionSink;
use crate::external::StorageGlue;
use crate::metadata::MetadataCoordinator;
use crate::notifications::{NotificationBus, NotificationEvent};
use crate::organize::{OrganizeParams, OrganizeResult};
use crate::task::{Task, TaskKind, TaskStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// `taskKey -> (batchId, paperId)`, consulted by `on_organize_task_completed`.
type TaskIndex = HashMap<String, (String, String)>;

pub struct BatchOrganizer {
    dispatcher: Arc<Dispatcher>,
    metadata: Arc<MetadataCoordinator>,
    notifications: Arc<NotificationBus>,
    storage: Arc<dyn StorageGlue>,
    poll_interval: Duration,
    timeout: Duration,
    batches: Mutex<HashMap<String, Batch>>,
    task_index: Mutex<TaskIndex>,
}

impl BatchOrganizer {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        metadata: Arc<MetadataCoordinator>,
        notifications: Arc<NotificationBus>,
        storage: Arc<dyn StorageGlue>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            metadata,
            notifications,
            storage,
            poll_interval,
            timeout,
            batches: Mutex::new(HashMap::new()),
            task_index: Mutex::new(HashMap::new()),
        }
    }

    /// Validates and creates a batch, then spawns the coordinator loop and
    /// returns immediately with the new batch's id.
    pub async fn organize_papers(self: &Arc<Self>, papers: Vec<Paper>, options: BatchOptions) -> Result<String, BatchError> {
        if papers.is_empty() {
            return Err(BatchError::InvalidInput("papers must not be empty".into()));
        }
        for paper in &papers {
            if paper.id.is_empty() || paper.title.is_empty() {
                return Err(BatchError::InvalidInput("every paper requires id and title".into()));
            }
        }

        let batch_id = Uuid::new_v4().to_string();
        let batch = Batch::new(batch_id.clone(), papers, options);
        self.batches.lock().await.insert(batch_id.clone(), batch);

        let this = self.clone();
        let id = batch_id.clone();
        tokio::spawn(async move {
            this.run_coordinator(id).await;
        });

        Ok(batch_id)
    }

    pub async fn batch(&self, batch_id: &str) -> Option<Batch> {
        self.batches.lock().await.get(batch_id).cloned()
    }

    async fn run_coordinator(&self, batch_id: String) {
        let paper_ids: Vec<String> = {
            let mut batches = self.batches.lock().await;
            let batch = match batches.get_mut(&batch_id) {
                Some(b) => b,
                None => return,
            };
            batch.status = BatchStatus::Running;
            let ids = batch.papers.iter().map(|p| p.paper.id.clone()).collect();
            ids
        };

        self.emit_started(&batch_id).await;

        match self.metadata.wait_all_ready(&paper_ids, self.poll_interval, self.timeout).await {
            Ok(records) => self.apply_metadata_ready(&batch_id, records).await,
            Err(err) => {
                self.fail_all_waiting(&batch_id, CoreError::timeout(err.to_string())).await;
                self.finalize_if_possible(&batch_id).await;
                return;
            }
        }

        self.submit_organize_tasks(&batch_id).await;
        self.finalize_if_possible(&batch_id).await;
    }

    async fn emit_started(&self, batch_id: &str) {
        let batches = self.batches.lock().await;
        if let Some(batch) = batches.get(batch_id) {
            self.notifications.emit(NotificationEvent::BatchProcessingStarted {
                batch_id: batch.id.clone(),
                paper_count: batch.papers.len(),
                task_directory: batch.task_directory.clone(),
                at: Utc::now(),
            });
        }
    }

    /// Shallow-overlays each ready record's fields onto its matching
    /// `PaperItem.paper` before flipping it to `MetadataReady`.
    async fn apply_metadata_ready(&self, batch_id: &str, records: Vec<crate::metadata::PaperRecord>) {
        let by_id: HashMap<String, crate::metadata::PaperRecord> =
            records.into_iter().map(|r| (r.paper_id.clone(), r)).collect();
        let mut batches = self.batches.lock().await;
        if let Some(batch) = batches.get_mut(batch_id) {
            for item in batch.papers.iter_mut() {
                if let Some(record) = by_id.get(&item.paper.id) {
                    item.paper.overlay_fields(&record.fields);
                    item.status = PaperStatus::MetadataReady;
                }
            }
            batch.recompute_progress();
        }
    }

    async fn fail_all_waiting(&self, batch_id: &str, error: CoreError) {
        let mut batches = self.batches.lock().await;
        if let Some(batch) = batches.get_mut(batch_id) {
            for item in batch.papers.iter_mut() {
                if item.status == PaperStatus::WaitingMetadata {
                    item.status = PaperStatus::Failed;
                    item.error = Some(error.clone());
                }
            }
            batch.recompute_progress();
        }
    }

    /// Constructs and submits one `organize_paper` task per ready paper,
    /// concurrently. Submit failures fail that paper alone.
    async fn submit_organize_tasks(&self, batch_id: &str) {
        let (options, ready_ids): (BatchOptions, Vec<String>) = {
            let batches = self.batches.lock().await;
            let batch = match batches.get(batch_id) {
                Some(b) => b,
                None => return,
            };
            let ids = batch
                .papers
                .iter()
                .filter(|p| p.status == PaperStatus::MetadataReady)
                .map(|p| p.paper.id.clone())
                .collect();
            (batch.options.clone(), ids)
        };

        let submissions = ready_ids.into_iter().map(|paper_id| {
            let options = options.clone();
            async move { self.submit_one_organize_task(batch_id, paper_id, options).await }
        });
        futures::future::join_all(submissions).await;
    }

    /// Constructs and submits a single paper's organize task. Run
    /// concurrently across all ready papers by `submit_organize_tasks`.
    async fn submit_one_organize_task(&self, batch_id: &str, paper_id: String, options: BatchOptions) {
        let paper = {
            let batches = self.batches.lock().await;
            batches
                .get(batch_id)
                .and_then(|b| b.papers.iter().find(|p| p.paper.id == paper_id))
                .map(|p| p.paper.clone())
        };
        let Some(paper) = paper else { return };

        let task_key = format!("organize_paper_{}_{}", paper_id, Utc::now().timestamp_millis());
        let params = OrganizeParams { paper, options };
        let task = match serde_json::to_value(&params)
            .map_err(|e| CoreError::internal(e.to_string()))
            .and_then(|value| Task::new(task_key.clone(), TaskKind::OrganizePaper, value))
        {
            Ok(task) => task,
            Err(err) => {
                self.mark_paper_failed(batch_id, &paper_id, err).await;
                return;
            }
        };

        match self.dispatcher.submit(task).await {
            Ok(()) => {
                self.task_index
                    .lock()
                    .await
                    .insert(task_key.clone(), (batch_id.to_string(), paper_id.clone()));
                let mut batches = self.batches.lock().await;
                if let Some(batch) = batches.get_mut(batch_id) {
                    if let Some(item) = batch.papers.iter_mut().find(|p| p.paper.id == paper_id) {
                        item.status = PaperStatus::Organizing;
                        item.organize_task_key = Some(task_key.clone());
                    }
                    batch.recompute_progress();
                }
            }
            Err(err) => {
                self.mark_paper_failed(batch_id, &paper_id, CoreError::internal(err.to_string())).await;
            }
        }
    }

    async fn mark_paper_failed(&self, batch_id: &str, paper_id: &str, error: CoreError) {
        let mut batches = self.batches.lock().await;
        if let Some(batch) = batches.get_mut(batch_id) {
            if let Some(item) = batch.papers.iter_mut().find(|p| p.paper.id == paper_id) {
                item.status = PaperStatus::Failed;
                item.error = Some(error);
            }
            batch.recompute_progress();
        }
    }

    /// Consulted by whatever delivers organize-task completion (a
    /// notification subscriber, or a direct handler callback). Idempotent:
    /// calling this twice for the same `task_key` only updates state on the
    /// first call, since the second lookup finds the paper already
    /// terminal.
    pub async fn on_organize_task_completed(
        &self,
        task_key: &str,
        success: bool,
        error: Option<CoreError>,
        processed: Option<crate::batch::ProcessedData>,
        actions: Vec<crate::batch::ActionStatus>,
        storage: Option<crate::external::DirResult>,
    ) {
        let located = self.task_index.lock().await.get(task_key).cloned();
        let Some((batch_id, paper_id)) = located else {
            warn!(task_key, "completion notification for unknown task key");
            return;
        };

        {
            let mut batches = self.batches.lock().await;
            if let Some(batch) = batches.get_mut(&batch_id) {
                if let Some(item) = batch.papers.iter_mut().find(|p| p.paper.id == paper_id) {
                    if item.status.is_terminal() {
                        debug!(task_key, "ignoring duplicate completion for already-terminal paper");
                        return;
                    }
                    if success {
                        item.status = PaperStatus::Completed;
                        item.processed_data = processed;
                        item.actions = actions;
                        item.storage = storage;
                    } else {
                        item.status = PaperStatus::Failed;
                        item.error = error;
                    }
                }
                batch.recompute_progress();
            }
        }

        self.finalize_if_possible(&batch_id).await;
    }

    /// If every paper has reached a terminal state, decides Completed vs.
    /// Failed, optionally generates the CSV artifact, and emits
    /// `BatchProcessingCompleted`. Safe to call repeatedly; only the
    /// transition out of `Running` has any effect.
    async fn finalize_if_possible(&self, batch_id: &str) {
        let should_finalize = {
            let batches = self.batches.lock().await;
            match batches.get(batch_id) {
                Some(batch) => batch.status == BatchStatus::Running && batch.all_papers_terminal(),
                None => false,
            }
        };
        if !should_finalize {
            return;
        }

        let all_completed = {
            let batches = self.batches.lock().await;
            batches.get(batch_id).map(|b| b.all_papers_completed()).unwrap_or(false)
        };

        {
            let mut batches = self.batches.lock().await;
            if let Some(batch) = batches.get_mut(batch_id) {
                batch.status = if all_completed { BatchStatus::Completed } else { BatchStatus::Failed };
                batch.updated_at = Utc::now();
            }
        }

        if all_completed {
            self.maybe_generate_csv(batch_id).await;
        }

        self.emit_completed(batch_id).await;
    }

    async fn maybe_generate_csv(&self, batch_id: &str) {
        let (task_directory, csv_bytes) = {
            let batches = self.batches.lock().await;
            let Some(batch) = batches.get(batch_id) else { return };
            let Some(dir) = batch.task_directory.clone() else { return };
            match csv_export::build_csv(batch) {
                Ok(bytes) => (dir, bytes),
                Err(err) => {
                    warn!(batch_id, error = %err, "failed to build csv artifact");
                    return;
                }
            }
        };

        let filename = csv_export::artifact_filename(batch_id);
        match self.storage.save_csv_file(&csv_bytes, &filename, &task_directory).await {
            Ok(result) => {
                let mut batches = self.batches.lock().await;
                if let Some(batch) = batches.get_mut(batch_id) {
                    batch.csv_artifact = Some(CsvArtifact::from_save_result(result));
                }
            }
            Err(err) => warn!(batch_id, error = %err, "failed to save csv artifact"),
        }
    }

    async fn emit_completed(&self, batch_id: &str) {
        let batches = self.batches.lock().await;
        if let Some(batch) = batches.get(batch_id) {
            self.notifications.emit(NotificationEvent::BatchProcessingCompleted {
                batch_id: batch.id.clone(),
                task_directory: batch.task_directory.clone(),
                total_papers: batch.progress.total,
                success_count: batch.progress.done,
                failed_count: batch.progress.failed,
                csv_artifact: batch.csv_artifact.as_ref().map(|a| a.filename.clone()),
                completed_at: Utc::now(),
            });
        }
    }
}

/// Bridges a `HandlerExecutor`'s per-task Completed/Failed transition to
/// `on_organize_task_completed`. Registered via
/// `Dispatcher::set_completion_sink` once both the dispatcher's organize
/// executor and this organizer exist.
#[async_trait]
impl CompletionSink for BatchOrganizer {
    async fn on_task_completed(&self, task: &Task) {
        if *task.kind() != TaskKind::OrganizePaper {
            return;
        }
        match task.status() {
            TaskStatus::Completed => {
                let parsed: Result<OrganizeResult, _> =
                    serde_json::from_value(task.result().cloned().unwrap_or(serde_json::Value::Null));
                match parsed {
                    Ok(result) => {
                        self.on_organize_task_completed(
                            task.key(),
                            true,
                            None,
                            Some(result.processed_data),
                            result.actions,
                            result.storage,
                        )
                        .await;
                    }
                    Err(err) => {
                        warn!(task_key = task.key(), error = %err, "malformed organize task result");
                        self.on_organize_task_completed(
                            task.key(),
                            false,
                            Some(CoreError::internal(format!("malformed organize result: {err}"))),
                            None,
                            Vec::new(),
                            None,
                        )
                        .await;
                    }
                }
            }
            TaskStatus::Failed => {
                self.on_organize_task_completed(task.key(), false, task.error().cloned(), None, Vec::new(), None)
                    .await;
            }
            TaskStatus::Pending | TaskStatus::Executing => {
                debug!(task_key = task.key(), "completion sink invoked for a non-terminal task");
            }
        }
    }
}
