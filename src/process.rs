//! Run entry points: drive every document in the input folder through the
//! pipeline and write the output tables.
//!
//! Per document the stages run in order, each one skipped when its artifact
//! in the work area is fresh:
//!
//! ```text
//! page_count ─▶ render stale pages ─▶ per page: OCR ─▶ features ─▶ aggregate
//! ```
//!
//! A fatal error (unreadable PDF, failed render) skips the document and the
//! run continues. Page-level OCR or extraction failures only zero out that
//! page, and a page record that cannot be cached is used anyway.
//!
//! Feature files, `all-features.csv` and the results table are written by a
//! single writer after all documents finished, so `concurrency > 1` never
//! races on them.

use crate::config::ScanConfig;
use crate::error::{PageError, ScanError};
use crate::output::{DocumentReport, RunReport, RunStats, StageStats};
use crate::pipeline::aggregate::{aggregate, AggregatedFeature};
use crate::pipeline::features::{write_feature_rows, FeatureRecord, FeatureRow, FieldName};
use crate::pipeline::input::{scan_input_dir, SourceDocument};
use crate::pipeline::llm::{FeatureExtractor, LlmFeatureExtractor};
use crate::pipeline::ocr::{OcrEngine, OcrPage, TesseractOcr};
use crate::pipeline::render::{PageTarget, PdfiumRasterizer, Rasterizer};
use crate::pipeline::results::{build_row, write_atomic, write_results};
use crate::pipeline::store::{modified, ArtifactStore};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The three external capabilities the pipeline depends on.
#[derive(Clone)]
pub struct Adapters {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub extractor: Arc<dyn FeatureExtractor>,
}

impl Adapters {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        ocr: Arc<dyn OcrEngine>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        Self {
            rasterizer,
            ocr,
            extractor,
        }
    }

    /// pdfium rasteriser, Tesseract OCR and the LLM feature extractor.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            rasterizer: Arc::new(PdfiumRasterizer::new(config)),
            ocr: Arc::new(TesseractOcr::new(config.ocr_language.clone(), config.dpi)),
            extractor: Arc::new(LlmFeatureExtractor::new(config)),
        }
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = ocr;
        self
    }
}

/// A configured run over one input folder.
pub struct Pipeline {
    config: ScanConfig,
    store: ArtifactStore,
    adapters: Adapters,
}

impl Pipeline {
    pub fn new(config: &ScanConfig, adapters: Adapters) -> Self {
        Self {
            store: ArtifactStore::new(config.work_root(), config.force),
            config: config.clone(),
            adapters,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Classify one document, reusing every fresh artifact.
    pub async fn process_document(&self, doc: &SourceDocument) -> Result<DocumentReport, ScanError> {
        self.store.ensure_work_area(doc)?;
        let mut stages = StageStats::default();

        let page_count = self.adapters.rasterizer.page_count(&doc.path).await?;
        debug!("{}: {} page(s)", doc.file_name, page_count);

        // ── Render stale pages ───────────────────────────────────────────
        let targets: Vec<PageTarget> = (1..=page_count)
            .map(|page| (page, self.store.resolve_page_image(doc, page)))
            .filter(|(_, image)| !image.is_fresh)
            .map(|(page, image)| PageTarget {
                page,
                path: image.path,
            })
            .collect();
        if !targets.is_empty() {
            self.adapters
                .rasterizer
                .render_pages(&doc.path, &targets)
                .await?;
            for target in &targets {
                self.store.mark_produced(&target.path);
            }
        }
        stages.images_rendered = targets.len();
        stages.images_reused = page_count - targets.len();

        // ── OCR + features, page by page ─────────────────────────────────
        let mut records = Vec::with_capacity(page_count);
        let mut page_errors = Vec::new();
        for page in 1..=page_count {
            let record = match self.page_features(doc, page, &mut stages).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("{}: {}", doc.file_name, e);
                    page_errors.push(e);
                    FeatureRecord::zero(page)
                }
            };
            records.push(record);
        }

        let aggregated = aggregate(&records);
        info!(
            "{}: best page {:?} (score {:.2})",
            doc.file_name, aggregated.page, aggregated.score
        );

        Ok(DocumentReport {
            source: doc.path.clone(),
            file_name: doc.file_name.clone(),
            page_count,
            aggregated: Some(aggregated),
            page_records: records,
            page_errors,
            error: None,
            stages,
        })
    }

    /// OCR and feature record for one page. An error only zeroes the page.
    async fn page_features(
        &self,
        doc: &SourceDocument,
        page: usize,
        stages: &mut StageStats,
    ) -> Result<FeatureRecord, PageError> {
        let ocr_page = match self.cached_ocr(doc, page).await {
            Some(ocr_page) => {
                stages.ocr_reused += 1;
                ocr_page
            }
            None => {
                let image = self.store.page_image_path(doc, page);
                stages.ocr_run += 1;
                let ocr_page = self
                    .adapters
                    .ocr
                    .recognize(&image)
                    .await
                    .map_err(|e| PageError::Ocr {
                        page,
                        detail: e.to_string(),
                    })?;
                self.save(&self.store.page_ocr_path(doc, page), ocr_page.to_csv());
                ocr_page
            }
        };

        if let Some(record) = self.cached_features(doc, page).await {
            stages.features_reused += 1;
            return Ok(record);
        }

        stages.features_run += 1;
        let fields = self
            .adapters
            .extractor
            .extract(&ocr_page.text())
            .await
            .map_err(|e| PageError::Extraction {
                page,
                detail: e.to_string(),
            })?;
        let record = FeatureRecord::new(page, fields);
        self.save(&self.store.feature_record_path(doc, page), record.to_csv());
        Ok(record)
    }

    /// Cache a freshly computed page artifact. When that fails the record is
    /// still used for this run; the path counts as produced so nothing derived
    /// from an older copy is reused, and the next run recomputes it.
    fn save(&self, path: &Path, bytes: Result<Vec<u8>, ScanError>) {
        if let Err(e) = bytes.and_then(|bytes| self.store.persist(path, &bytes)) {
            warn!("Not caching {}: {}", path.display(), e);
            self.store.mark_produced(path);
        }
    }

    async fn cached_ocr(&self, doc: &SourceDocument, page: usize) -> Option<OcrPage> {
        let resolved = self.store.resolve_page_ocr(doc, page);
        if !resolved.is_fresh {
            return None;
        }
        let parsed = match self.store.load(&resolved.path).await {
            Ok(bytes) => OcrPage::from_csv(&bytes, &resolved.path),
            Err(e) => Err(e),
        };
        parsed
            .map_err(|e| debug!("Recomputing OCR: {}", e))
            .ok()
    }

    async fn cached_features(&self, doc: &SourceDocument, page: usize) -> Option<FeatureRecord> {
        let resolved = self.store.resolve_feature_record(doc, page);
        if !resolved.is_fresh {
            return None;
        }
        let parsed = match self.store.load(&resolved.path).await {
            Ok(bytes) => FeatureRecord::from_csv(page, &bytes, &resolved.path),
            Err(e) => Err(e),
        };
        parsed
            .map_err(|e| debug!("Recomputing features: {}", e))
            .ok()
    }

    /// Process `docs` (in input order) and write the output tables.
    pub async fn run(&self, docs: &[SourceDocument]) -> Result<RunReport, ScanError> {
        let start = Instant::now();
        let total = docs.len();
        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_run_start(total);
        }

        let documents: Vec<DocumentReport> = stream::iter(docs.iter().enumerate().map(|(i, doc)| {
            let callback = callback.clone();
            async move {
                let index = i + 1;
                if let Some(ref cb) = callback {
                    cb.on_document_start(&doc.file_name, index, total);
                }
                match self.process_document(doc).await {
                    Ok(report) => {
                        if let Some(ref cb) = callback {
                            cb.on_document_complete(&doc.file_name, index, total);
                        }
                        report
                    }
                    Err(e) => {
                        warn!("Skipping {}: {}", doc.file_name, e);
                        if let Some(ref cb) = callback {
                            cb.on_document_error(&doc.file_name, index, total, &e.to_string());
                        }
                        DocumentReport {
                            source: doc.path.clone(),
                            file_name: doc.file_name.clone(),
                            error: Some(e.to_string()),
                            ..Default::default()
                        }
                    }
                }
            }
        }))
        .buffered(self.config.concurrency.max(1))
        .collect()
        .await;

        let mut stats = RunStats {
            total_documents: total,
            ..Default::default()
        };
        let mut rows = Vec::new();
        for (doc, report) in docs.iter().zip(&documents) {
            stats.total_pages += report.page_count;
            stats.failed_pages += report.page_errors.len();
            stats.stages.add(&report.stages);
            match &report.aggregated {
                Some(agg) if report.is_success() => {
                    stats.classified_documents += 1;
                    rows.push(build_row(doc, agg));
                }
                _ => stats.failed_documents += 1,
            }
        }

        if self.config.write_features {
            stats.feature_files_written = self.write_feature_files(docs, &documents)?;
        }
        if self.config.write_results {
            write_results(&self.config.results_path(), &rows)?;
            stats.results_written = true;
        }

        stats.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Run complete: {}/{} documents classified, {}ms",
            stats.classified_documents, total, stats.total_duration_ms
        );
        if let Some(ref cb) = callback {
            cb.on_run_complete(total, stats.classified_documents);
        }

        Ok(RunReport {
            documents,
            rows,
            stats,
        })
    }

    /// Write per-document feature files that are missing, outdated or whose
    /// document was recomputed, then `all-features.csv` if anything changed.
    ///
    /// `all-features.csv` also changes when the set of contributing documents
    /// does, e.g. a PDF that became unreadable or was removed.
    fn write_feature_files(
        &self,
        docs: &[SourceDocument],
        reports: &[DocumentReport],
    ) -> Result<usize, ScanError> {
        let all_path = self.config.all_features_path();
        let mut written = 0;
        let mut all_rows = Vec::new();
        let mut ids = Vec::new();
        let mut all_stale = self.config.force;

        for (doc, report) in docs.iter().zip(reports) {
            all_stale |= !is_current(&all_path, doc);
            let Some(agg) = report.aggregated.as_ref().filter(|_| report.is_success()) else {
                continue;
            };
            let rows = document_feature_rows(doc, agg);
            let path = self.config.feature_path(&doc.file_name);

            if self.config.force || !is_current(&path, doc) || report.stages.recomputed() {
                info!("Writing features to {}", path.display());
                write_atomic(&path, &write_feature_rows(rows.clone())?)?;
                written += 1;
                all_stale = true;
            }
            ids.push(rows[0].value.clone());
            all_rows.extend(rows);
        }

        if !all_stale && compiled_ids(&all_path).as_ref() != Some(&ids) {
            debug!("Documents in {} changed", all_path.display());
            all_stale = true;
        }
        if all_stale {
            info!("Writing features compilation to {}", all_path.display());
            write_atomic(&all_path, &write_feature_rows(all_rows)?)?;
        } else {
            debug!("Keeping {}", all_path.display());
        }
        Ok(written)
    }
}

/// Document ids listed in an existing `all-features.csv`, in file order.
/// `None` when the file is missing or unreadable.
fn compiled_ids(path: &Path) -> Option<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).ok()?;
    reader
        .deserialize::<FeatureRow>()
        .filter(|row| row.as_ref().map_or(true, |r| r.key == "id"))
        .map(|row| row.map(|r| r.value).ok())
        .collect()
}

/// `id,<absolute source path>,1` followed by the four aggregated fields.
fn document_feature_rows(doc: &SourceDocument, agg: &AggregatedFeature) -> Vec<FeatureRow> {
    let id = FeatureRow {
        key: "id".to_string(),
        value: doc.path.to_string_lossy().into_owned(),
        quality: 1.0,
    };
    std::iter::once(id)
        .chain(FieldName::ALL.into_iter().map(|f| FeatureRow {
            key: f.key().to_string(),
            value: agg.value(f).to_string(),
            quality: agg.quality(f),
        }))
        .collect()
}

fn is_current(path: &Path, doc: &SourceDocument) -> bool {
    modified(path).is_some_and(|m| m >= doc.modified)
}

/// Scan the input folder and classify every PDF in it with the given adapters.
///
/// Creates the output folder and work area if needed. Only an unusable
/// input folder, an uncreatable output folder or a failed table write are
/// errors; per-document failures are reported in [`RunReport::documents`].
pub async fn run_scan(config: &ScanConfig, adapters: Adapters) -> Result<RunReport, ScanError> {
    let work_root = config.work_root();
    std::fs::create_dir_all(&work_root).map_err(|source| ScanError::OutputWriteFailed {
        path: work_root.clone(),
        source,
    })?;

    let docs = scan_input_dir(&config.input_dir)?;
    info!(
        "Classifying {} document(s) from {} into {}",
        docs.len(),
        config.input_dir.display(),
        config.output_dir.display()
    );
    Pipeline::new(config, adapters).run(&docs).await
}

/// [`run_scan`] with the default adapters (pdfium, Tesseract, LLM).
pub async fn scan(config: &ScanConfig) -> Result<RunReport, ScanError> {
    run_scan(config, Adapters::from_config(config)).await
}

/// Synchronous wrapper around [`scan`].
///
/// Creates a temporary tokio runtime internally.
pub fn scan_sync(config: &ScanConfig) -> Result<RunReport, ScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(scan(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::{FeatureFields, FieldValue};
    use tempfile::TempDir;

    #[test]
    fn feature_rows_start_with_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        let doc = SourceDocument::from_path(&path).unwrap();

        let mut fields = FeatureFields::new();
        fields.insert(FieldName::Sender, FieldValue::new("OTTO", 0.5));
        let agg = aggregate(&[FeatureRecord::new(1, fields)]);

        let rows = document_feature_rows(&doc, &agg);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].key, "id");
        assert_eq!(rows[0].value, doc.path.to_string_lossy());
        assert_eq!(rows[0].quality, 1.0);
        assert_eq!(rows[3].key, "Sender");
        assert_eq!(rows[3].value, "OTTO");
        assert_eq!(rows[1].value, "");
    }
}
