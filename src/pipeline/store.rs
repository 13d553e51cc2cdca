//! Artifact store: where derived page artifacts live and whether they are fresh.
//!
//! Every source document owns a work area `<work_root>/<work_name>/` (its
//! stem unless another document claimed it first) holding, per page `n`:
//!
//! ```text
//! page_<n>.png            rasterised page          (upstream: source PDF)
//! page_<n>.csv            OCR record               (upstream: page image)
//! page_<n>-features.csv   extracted feature record (upstream: OCR record)
//! ```
//!
//! ## Freshness
//!
//! An artifact is fresh iff it exists, its mtime is not older than the source
//! document's mtime (a tie is fresh) and, for OCR and feature records, its
//! upstream artifact is fresh, was not rewritten during this run and is not
//! newer than it. Staleness therefore propagates down the chain even when a
//! downstream file carries a recent timestamp. `force` makes every check
//! return false. Any metadata error reads as "not fresh".
//!
//! Writes go through [`ArtifactStore::persist`], which writes a temp file in
//! the same directory and renames it into place, so an aborted run never
//! leaves a truncated artifact with a fresh-looking mtime.
//!
//! Timestamps are inherently racy if another process writes into the work
//! area during a run; the store assumes it is the only writer.

use crate::error::ScanError;
use crate::pipeline::input::SourceDocument;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::debug;

/// A canonical artifact location and its freshness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    pub is_fresh: bool,
}

/// Per-run view of the work root.
#[derive(Debug)]
pub struct ArtifactStore {
    work_root: PathBuf,
    force: bool,
    produced: Mutex<HashSet<PathBuf>>,
}

impl ArtifactStore {
    pub fn new(work_root: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            work_root: work_root.into(),
            force,
            produced: Mutex::new(HashSet::new()),
        }
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// `<work_root>/<work_name>`
    pub fn work_area(&self, doc: &SourceDocument) -> PathBuf {
        self.work_root.join(&doc.work_name)
    }

    /// Create the document's work area if it does not exist yet.
    pub fn ensure_work_area(&self, doc: &SourceDocument) -> Result<PathBuf, ScanError> {
        let dir = self.work_area(doc);
        std::fs::create_dir_all(&dir).map_err(|e| ScanError::artifact_io(&dir, e))?;
        Ok(dir)
    }

    pub fn page_image_path(&self, doc: &SourceDocument, page: usize) -> PathBuf {
        self.work_area(doc).join(format!("page_{page}.png"))
    }

    pub fn page_ocr_path(&self, doc: &SourceDocument, page: usize) -> PathBuf {
        self.work_area(doc).join(format!("page_{page}.csv"))
    }

    pub fn feature_record_path(&self, doc: &SourceDocument, page: usize) -> PathBuf {
        self.work_area(doc).join(format!("page_{page}-features.csv"))
    }

    /// Page image: fresh iff it is not older than the source document.
    pub fn resolve_page_image(&self, doc: &SourceDocument, page: usize) -> Resolved {
        let path = self.page_image_path(doc, page);
        let is_fresh = self.is_fresh(doc, &path, None);
        Resolved { path, is_fresh }
    }

    /// OCR record: additionally requires a fresh, untouched page image.
    pub fn resolve_page_ocr(&self, doc: &SourceDocument, page: usize) -> Resolved {
        let image = self.resolve_page_image(doc, page);
        let path = self.page_ocr_path(doc, page);
        let is_fresh = self.is_fresh(doc, &path, Some(&image));
        Resolved { path, is_fresh }
    }

    /// Feature record: additionally requires a fresh, untouched OCR record.
    pub fn resolve_feature_record(&self, doc: &SourceDocument, page: usize) -> Resolved {
        let ocr = self.resolve_page_ocr(doc, page);
        let path = self.feature_record_path(doc, page);
        let is_fresh = self.is_fresh(doc, &path, Some(&ocr));
        Resolved { path, is_fresh }
    }

    /// Record that `path` was (re)written during this run. Artifacts derived
    /// from it are never fresh for the rest of the run.
    pub fn mark_produced(&self, path: &Path) {
        if let Ok(mut produced) = self.produced.lock() {
            produced.insert(path.to_path_buf());
        }
    }

    pub fn was_produced(&self, path: &Path) -> bool {
        self.produced
            .lock()
            .map(|p| p.contains(path))
            .unwrap_or(false)
    }

    /// Atomically write `bytes` to `path` and mark it produced.
    pub fn persist(&self, path: &Path, bytes: &[u8]) -> Result<(), ScanError> {
        let dir = path
            .parent()
            .ok_or_else(|| ScanError::artifact_io(path, "artifact path has no parent"))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| ScanError::artifact_io(path, e))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ScanError::artifact_io(path, e))?;
        tmp.persist(path)
            .map_err(|e| ScanError::artifact_io(path, e.error))?;
        self.mark_produced(path);
        Ok(())
    }

    /// Read a cached artifact. Empty files are rejected here so the caller
    /// recomputes instead of trusting them.
    pub async fn load(&self, path: &Path) -> Result<Vec<u8>, ScanError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ScanError::artifact_io(path, e))?;
        if bytes.is_empty() {
            return Err(ScanError::artifact_io(path, "artifact is empty"));
        }
        Ok(bytes)
    }

    fn is_fresh(&self, doc: &SourceDocument, path: &Path, upstream: Option<&Resolved>) -> bool {
        if self.force {
            return false;
        }
        let Some(mtime) = modified(path) else {
            return false;
        };
        if mtime < doc.modified {
            debug!("{} is older than its source document", path.display());
            return false;
        }
        let Some(up) = upstream else {
            return true;
        };
        if !up.is_fresh || self.was_produced(&up.path) {
            return false;
        }
        match modified(&up.path) {
            Some(up_mtime) if mtime >= up_mtime => true,
            _ => {
                debug!("{} is older than {}", path.display(), up.path.display());
                false
            }
        }
    }
}

/// Modification time, `None` when the file is missing or unreadable.
pub fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        doc: SourceDocument,
        store: ArtifactStore,
        base: SystemTime,
    }

    fn set_mtime(path: &Path, t: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(t)
            .unwrap();
    }

    fn fixture(force: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("scan_001.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_mtime(&pdf, base);
        let doc = SourceDocument::from_path(&pdf).unwrap();
        let store = ArtifactStore::new(dir.path().join("out/work.d"), force);
        store.ensure_work_area(&doc).unwrap();
        Fixture {
            _dir: dir,
            doc,
            store,
            base,
        }
    }

    fn write_at(path: &Path, t: SystemTime) {
        std::fs::write(path, b"x").unwrap();
        set_mtime(path, t);
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn layout_matches_work_area_convention() {
        let f = fixture(false);
        let area = f.store.work_area(&f.doc);
        assert!(area.ends_with("work.d/scan_001"));
        assert!(area.is_dir());
        assert!(f.store.page_image_path(&f.doc, 1).ends_with("scan_001/page_1.png"));
        assert!(f.store.page_ocr_path(&f.doc, 2).ends_with("scan_001/page_2.csv"));
        assert!(f
            .store
            .feature_record_path(&f.doc, 3)
            .ends_with("scan_001/page_3-features.csv"));
    }

    #[test]
    fn missing_artifacts_are_stale() {
        let f = fixture(false);
        assert!(!f.store.resolve_page_image(&f.doc, 1).is_fresh);
        assert!(!f.store.resolve_page_ocr(&f.doc, 1).is_fresh);
        assert!(!f.store.resolve_feature_record(&f.doc, 1).is_fresh);
    }

    #[test]
    fn equal_mtime_counts_as_fresh() {
        let f = fixture(false);
        write_at(&f.store.page_image_path(&f.doc, 1), f.base);
        assert!(f.store.resolve_page_image(&f.doc, 1).is_fresh);
    }

    #[test]
    fn older_than_source_is_stale() {
        let f = fixture(false);
        write_at(&f.store.page_image_path(&f.doc, 1), f.base - secs(1));
        assert!(!f.store.resolve_page_image(&f.doc, 1).is_fresh);
    }

    #[test]
    fn full_chain_fresh() {
        let f = fixture(false);
        write_at(&f.store.page_image_path(&f.doc, 1), f.base + secs(1));
        write_at(&f.store.page_ocr_path(&f.doc, 1), f.base + secs(2));
        write_at(&f.store.feature_record_path(&f.doc, 1), f.base + secs(3));
        assert!(f.store.resolve_page_ocr(&f.doc, 1).is_fresh);
        assert!(f.store.resolve_feature_record(&f.doc, 1).is_fresh);
    }

    #[test]
    fn stale_image_invalidates_recent_downstream() {
        let f = fixture(false);
        write_at(&f.store.page_image_path(&f.doc, 1), f.base - secs(10));
        write_at(&f.store.page_ocr_path(&f.doc, 1), f.base + secs(100));
        write_at(&f.store.feature_record_path(&f.doc, 1), f.base + secs(200));
        assert!(!f.store.resolve_page_ocr(&f.doc, 1).is_fresh);
        assert!(!f.store.resolve_feature_record(&f.doc, 1).is_fresh);
    }

    #[test]
    fn ocr_older_than_image_is_stale() {
        let f = fixture(false);
        write_at(&f.store.page_image_path(&f.doc, 1), f.base + secs(50));
        write_at(&f.store.page_ocr_path(&f.doc, 1), f.base + secs(10));
        write_at(&f.store.feature_record_path(&f.doc, 1), f.base + secs(60));
        assert!(f.store.resolve_page_image(&f.doc, 1).is_fresh);
        assert!(!f.store.resolve_page_ocr(&f.doc, 1).is_fresh);
        assert!(!f.store.resolve_feature_record(&f.doc, 1).is_fresh);
    }

    #[test]
    fn produced_upstream_invalidates_downstream() {
        let f = fixture(false);
        write_at(&f.store.page_image_path(&f.doc, 1), f.base + secs(1));
        write_at(&f.store.page_ocr_path(&f.doc, 1), f.base + secs(2));
        write_at(&f.store.feature_record_path(&f.doc, 1), f.base + secs(3));

        f.store.mark_produced(&f.store.page_ocr_path(&f.doc, 1));
        assert!(f.store.resolve_page_ocr(&f.doc, 1).is_fresh);
        assert!(!f.store.resolve_feature_record(&f.doc, 1).is_fresh);
    }

    #[test]
    fn force_makes_everything_stale() {
        let f = fixture(true);
        write_at(&f.store.page_image_path(&f.doc, 1), f.base + secs(1));
        write_at(&f.store.page_ocr_path(&f.doc, 1), f.base + secs(2));
        write_at(&f.store.feature_record_path(&f.doc, 1), f.base + secs(3));
        assert!(!f.store.resolve_page_image(&f.doc, 1).is_fresh);
        assert!(!f.store.resolve_page_ocr(&f.doc, 1).is_fresh);
        assert!(!f.store.resolve_feature_record(&f.doc, 1).is_fresh);
    }

    #[test]
    fn persist_writes_and_marks_produced() {
        let f = fixture(false);
        let path = f.store.page_ocr_path(&f.doc, 1);
        f.store.persist(&path, b"line,word,confidence\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"line,word,confidence\n");
        assert!(f.store.was_produced(&path));
        // No stray temp files next to the artifact.
        let entries = std::fs::read_dir(f.store.work_area(&f.doc)).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn load_rejects_empty_and_missing() {
        let f = fixture(false);
        let path = f.store.page_ocr_path(&f.doc, 1);
        assert!(matches!(
            f.store.load(&path).await,
            Err(ScanError::ArtifactIo { .. })
        ));
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            f.store.load(&path).await,
            Err(ScanError::ArtifactIo { .. })
        ));
    }
}
