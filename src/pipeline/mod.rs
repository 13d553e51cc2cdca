//! Pipeline stages for classifying scanned PDFs.
//!
//! Each submodule implements one step or one on-disk format. The adapters
//! with side effects (`render`, `ocr`, `llm`) sit behind traits so the
//! orchestration in [`crate::process`] can be tested with in-memory fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──▶ llm ──▶ aggregate ──▶ results ──▶ rename
//! (folder)  (pdfium)  (tess.)  (LLM)   (best page)   (CSV)      (copy/move)
//!                 ╲      │      ╱
//!                   store (work.d, freshness)
//! ```
//!
//! 1. [`input`]     list the PDFs in the input folder
//! 2. [`render`]    rasterise stale pages; runs in `spawn_blocking`
//! 3. [`ocr`]       page image → words; Tesseract or a vision model
//! 4. [`llm`]       page text → the four fields with quality
//! 5. [`aggregate`] pick the best page per document
//! 6. [`results`]   one CSV row per document
//! 7. [`rename`]    apply the results table to the file system
//!
//! [`store`] decides which artifacts are still fresh; [`features`] and
//! [`encode`] hold shared record types and helpers.

pub mod aggregate;
pub mod encode;
pub mod features;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod render;
pub mod rename;
pub mod results;
pub mod store;
