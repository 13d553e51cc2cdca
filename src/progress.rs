//! Progress-callback trait for per-document run events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::ScanConfigBuilder::progress_callback`] to receive events
//! as the pipeline works through the input folder. The CLI uses it to drive
//! an `indicatif` progress bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use pdfclassify::ScanProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ScanProgressCallback for Counter {
//!     fn on_document_complete(&self, name: &str, _index: usize, _total: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("classified {name}");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each document.
///
/// All methods have no-op defaults. With `concurrency > 1` the per-document
/// methods may be called from several tasks at once, so implementations must
/// synchronise shared state.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once after the input folder was scanned.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before the first stage of a document runs.
    ///
    /// `index` is 1-based in input order.
    fn on_document_start(&self, name: &str, index: usize, total: usize) {
        let _ = (name, index, total);
    }

    /// Called when a document produced an aggregated feature record.
    fn on_document_complete(&self, name: &str, index: usize, total: usize) {
        let _ = (name, index, total);
    }

    /// Called when a document was skipped because of a fatal error.
    fn on_document_error(&self, name: &str, index: usize, total: usize, error: &str) {
        let _ = (name, index, total, error);
    }

    /// Called once after all documents have been attempted.
    fn on_run_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ScanConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct EventLog {
        started_total: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        success_total: AtomicUsize,
    }

    impl ScanProgressCallback for EventLog {
        fn on_run_start(&self, total_documents: usize) {
            self.started_total.store(total_documents, Ordering::SeqCst);
        }

        fn on_document_start(&self, _name: &str, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _name: &str, _index: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _name: &str, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total: usize, success_count: usize) {
            self.success_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_ignores_every_event() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_document_start("a.pdf", 1, 2);
        cb.on_document_complete("a.pdf", 1, 2);
        cb.on_document_error("b.pdf", 2, 2, "corrupt");
        cb.on_run_complete(2, 1);
    }

    #[test]
    fn callback_sees_document_lifecycle() {
        let tracker = EventLog::default();

        tracker.on_run_start(3);
        tracker.on_document_start("a.pdf", 1, 3);
        tracker.on_document_complete("a.pdf", 1, 3);
        tracker.on_document_start("b.pdf", 2, 3);
        tracker.on_document_error("b.pdf", 2, 3, "encrypted");
        tracker.on_document_start("c.pdf", 3, 3);
        tracker.on_document_complete("c.pdf", 3, 3);
        tracker.on_run_complete(3, 2);

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.success_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_callback_behind_arc() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(1);
        cb.on_document_complete("scan.pdf", 1, 1);
    }
}
