//! Input discovery: the PDFs directly inside the input folder.
//!
//! A [`SourceDocument`] pins the canonical path and the modification time
//! observed at scan start. Every freshness decision for that document is made
//! against this snapshot, so touching the PDF mid-run does not flip artifacts
//! between fresh and stale halfway through a document.
//!
//! Each document also gets a work-area name. Usually that is its stem, but
//! `a.pdf` and `a.PDF` share a stem, so only one of them may claim it; the
//! other falls back to its full file name.

use crate::error::ScanError;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// A PDF found in the input folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Canonical absolute path.
    pub path: PathBuf,
    /// Modification time at scan start.
    pub modified: SystemTime,
    /// File name including extension, e.g. `scan_001.PDF`.
    pub file_name: String,
    /// File name without extension.
    pub stem: String,
    /// Directory name of the work area, unique within one scan.
    pub work_name: String,
}

impl SourceDocument {
    pub fn from_path(path: &Path) -> Result<Self, ScanError> {
        let unreadable = |detail: String| ScanError::SourceUnreadable {
            path: path.to_path_buf(),
            detail,
        };

        // Names come from the entry as listed (a symlink keeps its own name),
        // the canonical path is only used for identity and metadata.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| unreadable("path has no file name".into()))?;
        let stem = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());

        let canonical = path.canonicalize().map_err(|e| unreadable(e.to_string()))?;
        let modified = std::fs::metadata(&canonical)
            .and_then(|m| m.modified())
            .map_err(|e| unreadable(e.to_string()))?;

        Ok(Self {
            path: canonical,
            modified,
            work_name: stem.clone(),
            file_name,
            stem,
        })
    }

    /// Lowercased file suffix without the dot (`pdf`).
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// Modification date in local time, `YYYY-MM-DD`.
    pub fn modified_date(&self) -> String {
        let local: DateTime<Local> = self.modified.into();
        local.format("%Y-%m-%d").to_string()
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// List the PDF files directly inside `dir`, sorted by file name.
///
/// Subdirectories are not descended into. Entries that cannot be stat'ed are
/// skipped with a debug log rather than failing the whole scan.
pub fn scan_input_dir(dir: &Path) -> Result<Vec<SourceDocument>, ScanError> {
    if !dir.is_dir() {
        return Err(ScanError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ScanError::SourceUnreadable {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut docs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_pdf(&path) {
            continue;
        }
        match SourceDocument::from_path(&path) {
            Ok(doc) => docs.push(doc),
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }
    docs.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    assign_work_names(&mut docs);

    info!("Found {} PDF(s) in {}", docs.len(), dir.display());
    Ok(docs)
}

/// Give every document a distinct work-area name.
///
/// Lowercase `.pdf` files claim their stem first, so their work areas do not
/// move when a differently cased sibling shows up. Whoever loses the stem uses
/// the full file name, then `<file name>-<n>`.
fn assign_work_names(docs: &mut [SourceDocument]) {
    let mut order: Vec<usize> = (0..docs.len()).collect();
    order.sort_by_key(|&i| !docs[i].file_name.ends_with(".pdf"));

    let mut taken = HashSet::new();
    for i in order {
        let doc = &mut docs[i];
        let mut name = doc.stem.clone();
        if taken.contains(&name) {
            name = doc.file_name.clone();
        }
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{}-{n}", doc.file_name);
            n += 1;
        }
        if name != doc.stem {
            warn!(
                "{}: work area '{}' is taken, using '{}'",
                doc.file_name, doc.stem, name
            );
        }
        taken.insert(name.clone());
        doc.work_name = name;
    }
}
