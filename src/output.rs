//! Output types returned by a scan run.

use crate::error::PageError;
use crate::pipeline::aggregate::AggregatedFeature;
use crate::pipeline::features::FeatureRecord;
use crate::pipeline::results::ResultRow;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of a full run over the input folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// One entry per source document, in input order.
    pub documents: Vec<DocumentReport>,
    /// The rows written to the results table (classified documents only).
    pub rows: Vec<ResultRow>,
    pub stats: RunStats,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| d.error.is_some())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| d.error.is_none())
    }
}

/// What happened to one source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source: PathBuf,
    pub file_name: String,
    pub page_count: usize,
    /// `None` when the document was skipped.
    pub aggregated: Option<AggregatedFeature>,
    pub page_records: Vec<FeatureRecord>,
    /// Non-fatal failures, one per affected page.
    pub page_errors: Vec<PageError>,
    /// Fatal error that caused the document to be skipped.
    pub error: Option<String>,
    pub stages: StageStats,
}

impl DocumentReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-stage counts: how much work was done vs. served from the work area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub images_rendered: usize,
    pub images_reused: usize,
    pub ocr_run: usize,
    pub ocr_reused: usize,
    pub features_run: usize,
    pub features_reused: usize,
}

impl StageStats {
    /// True if any page artifact was (re)computed.
    pub fn recomputed(&self) -> bool {
        self.images_rendered + self.ocr_run + self.features_run > 0
    }

    pub fn add(&mut self, other: &StageStats) {
        self.images_rendered += other.images_rendered;
        self.images_reused += other.images_reused;
        self.ocr_run += other.ocr_run;
        self.ocr_reused += other.ocr_reused;
        self.features_run += other.features_run;
        self.features_reused += other.features_reused;
    }
}

/// Run-level totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_documents: usize,
    pub classified_documents: usize,
    pub failed_documents: usize,
    pub total_pages: usize,
    pub failed_pages: usize,
    pub stages: StageStats,
    pub feature_files_written: usize,
    pub results_written: bool,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recomputed_tracks_any_stage() {
        let mut s = StageStats::default();
        assert!(!s.recomputed());
        s.images_reused = 3;
        s.ocr_reused = 3;
        assert!(!s.recomputed());
        s.features_run = 1;
        assert!(s.recomputed());
    }

    #[test]
    fn stage_stats_add() {
        let mut total = StageStats::default();
        let doc = StageStats {
            images_rendered: 2,
            ocr_reused: 1,
            ..Default::default()
        };
        total.add(&doc);
        total.add(&doc);
        assert_eq!(total.images_rendered, 4);
        assert_eq!(total.ocr_reused, 2);
    }

    #[test]
    fn report_splits_failures() {
        let report = RunReport {
            documents: vec![
                DocumentReport {
                    file_name: "a.pdf".into(),
                    ..Default::default()
                },
                DocumentReport {
                    file_name: "b.pdf".into(),
                    error: Some("corrupt".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(report.failed().next().unwrap().file_name, "b.pdf");
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"error\":\"corrupt\""));
    }
}
