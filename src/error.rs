//! Error types for the pdfclassify library.
//!
//! Failures are split by how far they reach:
//!
//! * [`ScanError`]: **Fatal for a document or the run**: the PDF cannot be
//!   opened, the configuration is incomplete, an output table cannot be
//!   written. A document-level `ScanError` skips that document only; the batch
//!   continues and the error shows up in the final report.
//!
//! * [`PageError`]: **Non-fatal**: OCR or feature extraction failed on one
//!   page. The page contributes an all-zero record and the document can still
//!   be classified from its other pages.
//!
//! * [`OcrError`] / [`ExtractionError`]: returned by the adapter traits and
//!   turned into a [`PageError`] by the pipeline once the page number is known.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors for a single document or for the whole run.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input folder does not exist or is not a directory.
    #[error("Input folder not found: '{path}'\nCheck the path exists and is a directory.")]
    InputDirNotFound { path: PathBuf },

    /// A source document could not be stat'ed or read.
    #[error("Cannot read source document '{path}': {detail}")]
    SourceUnreadable { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF is corrupt, encrypted or otherwise cannot be rasterised.
    #[error("PDF '{path}' is unreadable: {detail}")]
    DocumentUnreadable { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide, or point\n\
PDFCLASSIFY_PDFIUM_LIB at the library (file or directory).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Artifact errors ───────────────────────────────────────────────────
    /// A cached artifact could not be read or written. When reading, the
    /// pipeline treats this as "not fresh" and recomputes.
    #[error("Artifact I/O error on '{path}': {detail}")]
    ArtifactIo { path: PathBuf, detail: String },

    /// Could not write a results or features table.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed (missing input/output folder, bad value).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    pub(crate) fn artifact_io(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        ScanError::ArtifactIo {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::DocumentReport`]. The page is scored as an
/// all-zero record and is retried on the next run because failure records
/// are never persisted.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The OCR engine failed on this page.
    #[error("Page {page}: OCR failed: {detail}")]
    Ocr { page: usize, detail: String },

    /// Feature extraction failed on this page.
    #[error("Page {page}: feature extraction failed: {detail}")]
    Extraction { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Ocr { page, .. } | PageError::Extraction { page, .. } => *page,
        }
    }
}

/// Errors reported by an [`crate::pipeline::ocr::OcrEngine`].
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine binary or service is not available.
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine ran but did not produce a usable result.
    #[error("OCR failed: {0}")]
    Failed(String),
}

/// Errors reported by a [`crate::pipeline::llm::FeatureExtractor`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The language-model provider could not be created or called.
    #[error("LLM provider error: {0}")]
    Provider(String),

    /// The model answered, but not in the expected `key: value (quality)` form.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_unreadable_display() {
        let e = ScanError::DocumentUnreadable {
            path: PathBuf::from("/scans/broken.pdf"),
            detail: "xref table corrupt".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("broken.pdf"), "got: {msg}");
        assert!(msg.contains("xref"), "got: {msg}");
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::Ocr {
            page: 2,
            detail: "tesseract not found".into(),
        };
        assert_eq!(e.page(), 2);
        assert!(e.to_string().contains("Page 2"));

        let e = PageError::Extraction {
            page: 7,
            detail: "timeout".into(),
        };
        assert_eq!(e.page(), 7);
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::Extraction {
            page: 3,
            detail: "bad response".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("Extraction"));
        assert!(json.contains("bad response"));
    }

    #[test]
    fn invalid_config_display() {
        let e = ScanError::InvalidConfig("input folder is required".into());
        assert!(e.to_string().contains("input folder is required"));
    }
}
