//! # pdfclassify
//!
//! Classify a folder of scanned PDFs: find each document's date, type,
//! sender and invoice number, write them to a results table and optionally
//! rename the files accordingly.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input folder
//!  │
//!  ├─ 1. Scan       list *.pdf (case-insensitive), sorted
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. OCR        Tesseract (default) or a vision model
//!  ├─ 4. Extract    LLM answers "key: value (quality)" per page
//!  ├─ 5. Aggregate  best-scoring page wins
//!  └─ 6. Output     feature files, all-features.csv, results.csv
//! ```
//!
//! Every intermediate artifact lives in `<output>/work.d/<stem>/` and is
//! reused while it is fresh, so re-running over an unchanged folder costs no
//! rendering, OCR or model calls. `force` recomputes everything.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfclassify::{scan, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = ScanConfig::builder()
//!         .input_dir("scans")
//!         .output_dir("classified")
//!         .build()?;
//!     let report = scan(&config).await?;
//!     for row in &report.rows {
//!         println!("{} → {} / {}", row.scanfile, row.doctype, row.sendername);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfclassify` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! * **pdfium**: shared library, found next to the binary, on the system
//!   library path or via `PDFCLASSIFY_PDFIUM_LIB`.
//! * **tesseract**: on `PATH` with the configured language pack (`deu` by
//!   default). Not needed with the vision OCR engine.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{ExtractionError, OcrError, PageError, ScanError};
pub use output::{DocumentReport, RunReport, RunStats, StageStats};
pub use pipeline::aggregate::{aggregate, AggregatedFeature};
pub use pipeline::features::{FeatureFields, FeatureRecord, FieldName, FieldValue};
pub use pipeline::input::SourceDocument;
pub use pipeline::llm::{parse_feature_response, FeatureExtractor, LlmFeatureExtractor};
pub use pipeline::ocr::{OcrEngine, OcrPage, OcrWord, TesseractOcr, VisionOcr};
pub use pipeline::render::{PageTarget, PdfiumRasterizer, Rasterizer};
pub use pipeline::rename::{RenameAction, RenameMode, RenameOutcome, Renamer};
pub use pipeline::results::{read_results, ResultRow};
pub use pipeline::store::{ArtifactStore, Resolved};
pub use process::{run_scan, scan, scan_sync, Adapters, Pipeline};
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback};
