//! Batch and per-paper value types. `organizer` holds the
//! coordinator logic that drives these types through their lifecycle.

pub mod organizer;

pub use organizer::BatchOrganizer;

use crate::error::CoreError;
use crate::external::{DirResult, SaveResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The input paper descriptor. Fields beyond `id`/`title` are free-form but
/// enumerated here rather than left as an open map, since downstream CSV
/// export and translation need specific fields by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub all_versions_url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

impl Paper {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            abstract_text: String::new(),
            all_versions_url: None,
            pdf_url: None,
        }
    }

    /// Shallow-overlays any recognized field present in `fields` (the
    /// `PaperRecord` the metadata extractor produced) onto this paper.
    /// Unrecognized keys and absent ones are ignored; present values
    /// replace whatever this paper already had.
    pub fn overlay_fields(&mut self, fields: &serde_json::Value) {
        let Some(map) = fields.as_object() else { return };
        if let Some(title) = map.get("title").and_then(|v| v.as_str()) {
            self.title = title.to_string();
        }
        if let Some(abstract_text) = map.get("abstract_text").or_else(|| map.get("abstract")).and_then(|v| v.as_str()) {
            self.abstract_text = abstract_text.to_string();
        }
        if let Some(authors) = map.get("authors").and_then(|v| v.as_array()) {
            self.authors = authors.iter().filter_map(|a| a.as_str().map(str::to_string)).collect();
        }
        if let Some(url) = map.get("all_versions_url").and_then(|v| v.as_str()) {
            self.all_versions_url = Some(url.to_string());
        }
        if let Some(url) = map.get("pdf_url").and_then(|v| v.as_str()) {
            self.pdf_url = Some(url.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationOptions {
    pub enabled: bool,
    #[serde(default)]
    pub target_language: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationOptions {
    pub enabled: bool,
    #[serde(default)]
    pub selected_standard: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageOptions {
    pub task_directory: Option<String>,
}

/// Recognized, structured batch configuration. No open/free-form fields —
/// unknown JSON keys are simply ignored by serde rather than silently
/// propagated through the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOptions {
    #[serde(default)]
    pub translation: TranslationOptions,
    #[serde(default)]
    pub classification: ClassificationOptions,
    #[serde(default)]
    pub storage: StorageOptions,
    #[serde(default)]
    pub download_pdf: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    WaitingMetadata,
    MetadataReady,
    Organizing,
    Completed,
    Failed,
}

impl PaperStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-action outcome recorded by the organize pipeline (storage,
/// translation, classification), surfaced verbatim on the PaperItem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStatus {
    pub action: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedData {
    pub original_abstract: String,
    pub translated_abstract: Option<String>,
    pub target_language: Option<String>,
    pub classification: Option<String>,
    pub classification_standard: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperItem {
    pub paper: Paper,
    pub status: PaperStatus,
    pub organize_task_key: Option<String>,
    pub processed_data: Option<ProcessedData>,
    pub actions: Vec<ActionStatus>,
    pub storage: Option<DirResult>,
    pub error: Option<CoreError>,
}

impl PaperItem {
    pub fn new(paper: Paper) -> Self {
        Self {
            paper,
            status: PaperStatus::WaitingMetadata,
            organize_task_key: None,
            processed_data: None,
            actions: Vec::new(),
            storage: None,
            error: None,
        }
    }
}

/// `waiting+ready+organizing+done+failed == total` at every observation
/// point.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub waiting: usize,
    pub ready: usize,
    pub organizing: usize,
    pub done: usize,
    pub failed: usize,
}

impl Progress {
    pub fn from_items(items: &[PaperItem]) -> Self {
        let mut progress = Progress {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                PaperStatus::WaitingMetadata => progress.waiting += 1,
                PaperStatus::MetadataReady => progress.ready += 1,
                PaperStatus::Organizing => progress.organizing += 1,
                PaperStatus::Completed => progress.done += 1,
                PaperStatus::Failed => progress.failed += 1,
            }
        }
        progress
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvArtifact {
    pub filename: String,
    pub full_path: String,
    pub download_id: String,
}

impl CsvArtifact {
    pub fn from_save_result(result: SaveResult) -> Self {
        Self {
            filename: result.filename,
            full_path: result.full_path,
            download_id: result.download_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub status: BatchStatus,
    pub options: BatchOptions,
    pub papers: Vec<PaperItem>,
    pub progress: Progress,
    pub task_directory: Option<String>,
    pub csv_artifact: Option<CsvArtifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(id: impl Into<String>, papers: Vec<Paper>, options: BatchOptions) -> Self {
        let items: Vec<PaperItem> = papers.into_iter().map(PaperItem::new).collect();
        let progress = Progress::from_items(&items);
        let now = Utc::now();
        Self {
            id: id.into(),
            status: BatchStatus::Pending,
            task_directory: options.storage.task_directory.clone(),
            options,
            papers: items,
            progress,
            csv_artifact: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn recompute_progress(&mut self) {
        self.progress = Progress::from_items(&self.papers);
        self.updated_at = Utc::now();
    }

    /// True once every paper is in a terminal state (Completed or Failed).
    pub fn all_papers_terminal(&self) -> bool {
        self.papers.iter().all(|p| p.status.is_terminal())
    }

    pub fn all_papers_completed(&self) -> bool {
        self.papers.iter().all(|p| p.status == PaperStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overlay_fields_replaces_only_recognized_present_keys() {
        let mut paper = Paper::new("p1", "Draft Title");
        paper.abstract_text = "draft abstract".into();
        paper.overlay_fields(&serde_json::json!({
            "abstract": "final abstract",
            "authors": ["A. One", "B. Two"],
            "pdf_url": "https://example.org/p1.pdf",
            "unused_key": "ignored",
        }));
        assert_eq!(paper.title, "Draft Title");
        assert_eq!(paper.abstract_text, "final abstract");
        assert_eq!(paper.authors, vec!["A. One".to_string(), "B. Two".to_string()]);
        assert_eq!(paper.pdf_url.as_deref(), Some("https://example.org/p1.pdf"));
        assert_eq!(paper.all_versions_url, None);
    }

    #[test]
    fn overlay_fields_on_non_object_is_a_no_op() {
        let mut paper = Paper::new("p1", "T");
        paper.overlay_fields(&serde_json::json!("not an object"));
        assert_eq!(paper.title, "T");
    }

    #[test]
    fn progress_counters_sum_to_total() {
        let papers = vec![Paper::new("p1", "T1"), Paper::new("p2", "T2")];
        let batch = Batch::new("b1", papers, BatchOptions::default());
        let p = batch.progress;
        assert_eq!(p.waiting + p.ready + p.organizing + p.done + p.failed, p.total);
        assert_eq!(p.total, 2);
        assert_eq!(p.waiting, 2);
    }

    #[test]
    fn recompute_progress_reflects_status_changes() {
        let papers = vec![Paper::new("p1", "T1")];
        let mut batch = Batch::new("b1", papers, BatchOptions::default());
        batch.papers[0].status = PaperStatus::Completed;
        batch.recompute_progress();
        let expected = Progress {
            total: 1,
            waiting: 0,
            ready: 0,
            organizing: 0,
            done: 1,
            failed: 0,
        };
        assert_eq!(batch.progress, expected);
        assert!(batch.all_papers_terminal());
        assert!(batch.all_papers_completed());
    }
}
