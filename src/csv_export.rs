//! CSV artifact generation for a completed batch.

use crate::batch::{Batch, PaperItem};
use crate::error::CoreError;
use chrono::Utc;

/// Builds the CSV bytes for `batch`'s papers, in submission order. Column
/// set depends on `batch.options`: `Translated Abstract` appears only when
/// translation was enabled, `Category` only when classification was.
pub fn build_csv(batch: &Batch) -> Result<Vec<u8>, CoreError> {
    let mut writer = csv::WriterBuilder::new().terminator(csv::Terminator::Any(b'\n')).from_writer(Vec::new());

    let mut header = vec!["Title", "Authors", "Original Abstract"];
    if batch.options.translation.enabled {
        header.push("Translated Abstract");
    }
    header.push("All Versions URL");
    header.push("PDF URL");
    if batch.options.classification.enabled {
        header.push("Category");
    }
    writer
        .write_record(&header)
        .map_err(|e| CoreError::internal(format!("failed to write csv header: {e}")))?;

    for item in &batch.papers {
        let row = build_row(item, batch);
        writer
            .write_record(&row)
            .map_err(|e| CoreError::internal(format!("failed to write csv row: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| CoreError::internal(format!("failed to flush csv writer: {e}")))
}

fn build_row(item: &PaperItem, batch: &Batch) -> Vec<String> {
    let mut row = vec![
        item.paper.title.clone(),
        item.paper.authors.join("; "),
        item.processed_data
            .as_ref()
            .map(|d| d.original_abstract.clone())
            .unwrap_or_else(|| item.paper.abstract_text.clone()),
    ];
    if batch.options.translation.enabled {
        row.push(
            item.processed_data
                .as_ref()
                .and_then(|d| d.translated_abstract.clone())
                .unwrap_or_default(),
        );
    }
    row.push(item.paper.all_versions_url.clone().unwrap_or_default());
    row.push(item.paper.pdf_url.clone().unwrap_or_default());
    if batch.options.classification.enabled {
        row.push(
            item.processed_data
                .as_ref()
                .and_then(|d| d.classification.clone())
                .unwrap_or_default(),
        );
    }
    row
}

/// `batch_{batchId}_{YYYY-MM-DD}.csv`.
pub fn artifact_filename(batch_id: &str) -> String {
    format!("batch_{batch_id}_{}.csv", Utc::now().format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchOptions, ClassificationOptions, Paper, PaperStatus, ProcessedData, TranslationOptions};

    fn completed_item(paper: Paper, processed: ProcessedData) -> PaperItem {
        let mut item = PaperItem::new(paper);
        item.status = PaperStatus::Completed;
        item.processed_data = Some(processed);
        item
    }

    #[test]
    fn translation_enabled_adds_column() {
        let mut paper = Paper::new("p1", "T");
        paper.abstract_text = "A".into();
        let mut batch = Batch::new(
            "b1",
            vec![paper.clone()],
            BatchOptions {
                translation: TranslationOptions {
                    enabled: true,
                    target_language: "Chinese".into(),
                },
                ..Default::default()
            },
        );
        batch.papers[0] = completed_item(
            paper,
            ProcessedData {
                original_abstract: "A".into(),
                translated_abstract: Some("[Chinese] A".into()),
                target_language: Some("Chinese".into()),
                classification: None,
                classification_standard: None,
            },
        );

        let csv_bytes = build_csv(&batch).unwrap();
        let csv_text = String::from_utf8(csv_bytes).unwrap();
        let header = csv_text.lines().next().unwrap();
        assert_eq!(header, "Title,Authors,Original Abstract,Translated Abstract,All Versions URL,PDF URL");
        assert!(csv_text.contains("[Chinese] A"));
    }

    #[test]
    fn classification_only_omits_translated_abstract() {
        let mut paper = Paper::new("p1", "T");
        paper.abstract_text = "A".into();
        let mut batch = Batch::new(
            "b1",
            vec![paper.clone()],
            BatchOptions {
                classification: ClassificationOptions {
                    enabled: true,
                    selected_standard: "ACM".into(),
                },
                ..Default::default()
            },
        );
        batch.papers[0] = completed_item(
            paper,
            ProcessedData {
                original_abstract: "A".into(),
                translated_abstract: None,
                target_language: None,
                classification: Some("ACM:uncategorized".into()),
                classification_standard: Some("ACM".into()),
            },
        );

        let csv_bytes = build_csv(&batch).unwrap();
        let csv_text = String::from_utf8(csv_bytes).unwrap();
        let header = csv_text.lines().next().unwrap();
        assert_eq!(header, "Title,Authors,Original Abstract,All Versions URL,PDF URL,Category");
        assert!(csv_text.contains("ACM:uncategorized"));
    }
}
