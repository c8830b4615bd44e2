//! The per-paper organize pipeline: storage, translation, classification.
//! Each stage is independent; a stage failure is recorded as a failed
//! action and does not abort the remaining stages or the task itself.

use crate::batch::{ActionStatus, BatchOptions, Paper, ProcessedData};
use crate::error::CoreError;
use crate::external::{AiClient, DirResult, StorageGlue};
use crate::task::{Task, TaskKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Everything an organize task needs beyond the raw paper: the batch-level
/// options it was submitted under. Carried in `Task::params` as
/// `{paper, options}`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct OrganizeParams {
    pub paper: Paper,
    pub options: BatchOptions,
}

/// The shape `OrganizeHandler::execute` returns as `Task::result`. The
/// batch organizer's completion intake reads this back out.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct OrganizeResult {
    pub processed_data: ProcessedData,
    pub actions: Vec<ActionStatus>,
    pub storage: Option<DirResult>,
}

pub struct OrganizeHandler {
    ai: Arc<dyn AiClient>,
    storage: Arc<dyn StorageGlue>,
}

impl OrganizeHandler {
    pub fn new(ai: Arc<dyn AiClient>, storage: Arc<dyn StorageGlue>) -> Self {
        Self { ai, storage }
    }
}

#[async_trait]
impl crate::executor::TaskHandler for OrganizeHandler {
    fn supported_kinds(&self) -> &[TaskKind] {
        const KINDS: [TaskKind; 1] = [TaskKind::OrganizePaper];
        &KINDS
    }

    async fn execute(&self, task: &Task) -> Result<serde_json::Value, CoreError> {
        let params: OrganizeParams = serde_json::from_value(task.params().clone())
            .map_err(|e| CoreError::invalid_input(format!("malformed organize params: {e}")))?;

        let mut actions = Vec::new();
        let mut storage_result = None;

        if let Some(dir_name) = params.options.storage.task_directory.as_deref() {
            match self.storage.create_sub_directory(dir_name).await {
                Ok(dir) => {
                    actions.push(ActionStatus {
                        action: "storage".into(),
                        success: true,
                        error: None,
                    });
                    storage_result = Some(dir);
                }
                Err(err) => {
                    warn!(task = task.key(), error = %err, "storage stage failed");
                    actions.push(ActionStatus {
                        action: "storage".into(),
                        success: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let original_abstract = params.paper.abstract_text.clone();
        let mut translated_abstract = None;
        let mut target_language = None;
        if params.options.translation.enabled {
            let language = params.options.translation.target_language.clone();
            match self.ai.translate_abstract(&original_abstract, &language).await {
                Ok(translated) if !translated.is_empty() => {
                    actions.push(ActionStatus {
                        action: "translation".into(),
                        success: true,
                        error: None,
                    });
                    translated_abstract = Some(translated);
                    target_language = Some(language);
                }
                Ok(_) => actions.push(ActionStatus {
                    action: "translation".into(),
                    success: false,
                    error: Some("translation returned empty text".into()),
                }),
                Err(err) => {
                    warn!(task = task.key(), error = %err, "translation stage failed");
                    actions.push(ActionStatus {
                        action: "translation".into(),
                        success: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let mut classification = None;
        let mut classification_standard = None;
        if params.options.classification.enabled {
            let standard = params.options.classification.selected_standard.clone();
            match self.ai.classify(&params.paper, &standard).await {
                Ok(category) => {
                    actions.push(ActionStatus {
                        action: "classification".into(),
                        success: true,
                        error: None,
                    });
                    classification = Some(category);
                    classification_standard = Some(standard);
                }
                Err(err) => {
                    warn!(task = task.key(), error = %err, "classification stage failed");
                    actions.push(ActionStatus {
                        action: "classification".into(),
                        success: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let result = OrganizeResult {
            processed_data: ProcessedData {
                original_abstract,
                translated_abstract,
                target_language,
                classification,
                classification_standard,
            },
            actions,
            storage: storage_result,
        };
        serde_json::to_value(result).map_err(|e| CoreError::internal(format!("failed to serialize result: {e}")))
    }
}
