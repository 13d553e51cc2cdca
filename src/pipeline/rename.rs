//! Renamer: copy or move classified PDFs to descriptive file names.
//!
//! Driven by the results table, so a reviewed (hand-edited) `results.csv` can
//! be applied without re-running the pipeline. Target names follow
//!
//! ```text
//! {docdate}_{doctype}_{sendername}_{docid}_{receivername}_{dateoffile}.{extension}
//! ```
//!
//! with every component made filesystem-safe and recognised date strings
//! normalised to `YYYY-MM-DD` so the names sort chronologically.

use crate::error::ScanError;
use crate::pipeline::results::ResultRow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const REPLACE_CHAR: char = '-';
const UNKNOWN: &str = "unknown";

static RE_ISO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static RE_DOTTED_LONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{4}$").unwrap());
static RE_DOTTED_SHORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{2}$").unwrap());
static RE_COMPACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").unwrap());
static RE_FORBIDDEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());
static RE_REPEATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

/// `YYYY-MM-DD`, `DD.MM.YYYY`, `DD.MM.YY` or `YYYYMMDD`.
pub fn is_date_string(s: &str) -> bool {
    RE_ISO.is_match(s)
        || RE_DOTTED_LONG.is_match(s)
        || RE_DOTTED_SHORT.is_match(s)
        || RE_COMPACT.is_match(s)
}

/// Rewrite a recognised date string as `YYYY-MM-DD`; anything else is
/// returned unchanged.
///
/// Two-digit dates are ambiguous. They are read as `YY.MM.DD`, then a month
/// above 12 swaps month and day, and a day above 31 swaps year and day.
/// The century is always 20.
pub fn sortable_date(s: &str) -> String {
    if RE_ISO.is_match(s) {
        return s.to_string();
    }
    if RE_DOTTED_LONG.is_match(s) {
        return format!("{}-{}-{}", &s[6..10], &s[3..5], &s[0..2]);
    }
    if RE_DOTTED_SHORT.is_match(s) {
        let (mut year, mut month, mut day) = (&s[0..2], &s[3..5], &s[6..8]);
        if two_digits(month) > 12 {
            std::mem::swap(&mut month, &mut day);
        }
        if two_digits(day) > 31 {
            std::mem::swap(&mut year, &mut day);
        }
        return format!("20{year}-{month}-{day}");
    }
    if RE_COMPACT.is_match(s) {
        return format!("{}-{}-{}", &s[0..4], &s[4..6], &s[6..8]);
    }
    s.to_string()
}

fn two_digits(s: &str) -> u32 {
    s.parse().unwrap_or(0)
}

/// Make one filename component safe: forbidden characters become `-`,
/// leading/trailing spaces, dots and dashes are dropped, dash runs collapse
/// and date strings are normalised.
pub fn sanitize_component(raw: &str) -> String {
    let replaced = RE_FORBIDDEN.replace_all(raw, REPLACE_CHAR.to_string());
    let trimmed = replaced.trim_matches(|c: char| c == ' ' || c == '.' || c == REPLACE_CHAR);
    let collapsed = RE_REPEATED.replace_all(trimmed, REPLACE_CHAR.to_string());
    if is_date_string(&collapsed) {
        sortable_date(&collapsed)
    } else {
        collapsed.into_owned()
    }
}

fn or_unknown(s: String) -> String {
    if s.is_empty() {
        UNKNOWN.to_string()
    } else {
        s
    }
}

/// Target file name for a results row.
pub fn target_file_name(row: &ResultRow) -> String {
    format!(
        "{}_{}_{}_{}_{}_{}.{}",
        or_unknown(sanitize_component(&row.docdate)),
        or_unknown(sanitize_component(&row.doctype)),
        or_unknown(sanitize_component(&row.sendername)),
        or_unknown(sanitize_component(&row.docid)),
        sanitize_component(&row.receivername),
        sanitize_component(&row.dateoffile),
        sanitize_component(&row.extension),
    )
}

/// What to do with the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameMode {
    /// Only report the planned names.
    #[default]
    None,
    Copy,
    Move,
}

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "detail")]
pub enum RenameAction {
    Planned,
    DryRun,
    Copied,
    Moved,
    SkippedExisting,
    MissingSource,
    Failed(String),
}

impl fmt::Display for RenameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameAction::Planned => f.write_str("planned"),
            RenameAction::DryRun => f.write_str("dry run"),
            RenameAction::Copied => f.write_str("copied"),
            RenameAction::Moved => f.write_str("moved"),
            RenameAction::SkippedExisting => f.write_str("skipped (target exists)"),
            RenameAction::MissingSource => f.write_str("skipped (source missing)"),
            RenameAction::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameOutcome {
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(flatten)]
    pub action: RenameAction,
}

/// Applies results rows to the file system.
#[derive(Debug, Clone)]
pub struct Renamer {
    pub target_dir: PathBuf,
    pub mode: RenameMode,
    pub dry_run: bool,
    pub overwrite: bool,
}

impl Renamer {
    pub fn new(target_dir: impl Into<PathBuf>, mode: RenameMode) -> Self {
        Self {
            target_dir: target_dir.into(),
            mode,
            dry_run: false,
            overwrite: false,
        }
    }

    pub fn dry_run(mut self, v: bool) -> Self {
        self.dry_run = v;
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.overwrite = v;
        self
    }

    /// Copy or move every row's source file (resolved against `input_dir`)
    /// to its target name. Per-file failures are reported, not returned; only
    /// failing to create the target folder aborts.
    pub fn apply(&self, rows: &[ResultRow], input_dir: &Path) -> Result<Vec<RenameOutcome>, ScanError> {
        if self.mode != RenameMode::None && !self.dry_run {
            std::fs::create_dir_all(&self.target_dir).map_err(|source| {
                ScanError::OutputWriteFailed {
                    path: self.target_dir.clone(),
                    source,
                }
            })?;
        }

        let outcomes = rows
            .iter()
            .filter(|row| row.is_complete())
            .map(|row| {
                let source = input_dir.join(&row.scanfile);
                let target = self.target_dir.join(target_file_name(row));
                let action = self.apply_one(&source, &target);
                info!("{} -> {}: {}", row.scanfile, target.display(), action);
                RenameOutcome {
                    source,
                    target,
                    action,
                }
            })
            .collect();
        Ok(outcomes)
    }

    fn apply_one(&self, source: &Path, target: &Path) -> RenameAction {
        if self.mode == RenameMode::None {
            return RenameAction::Planned;
        }
        if !source.is_file() {
            return RenameAction::MissingSource;
        }
        if target.exists() && !self.overwrite {
            return RenameAction::SkippedExisting;
        }
        if self.dry_run {
            return RenameAction::DryRun;
        }

        let result = match self.mode {
            RenameMode::Copy => std::fs::copy(source, target).map(|_| RenameAction::Copied),
            RenameMode::Move => move_file(source, target).map(|_| RenameAction::Moved),
            RenameMode::None => Ok(RenameAction::Planned),
        };
        result.unwrap_or_else(|e| {
            warn!("{}: {}", source.display(), e);
            RenameAction::Failed(e.to_string())
        })
    }
}

/// Rename, falling back to copy + remove across file systems.
fn move_file(source: &Path, target: &Path) -> std::io::Result<()> {
    match std::fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(source, target)?;
            std::fs::remove_file(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(scanfile: &str) -> ResultRow {
        ResultRow {
            scanfile: scanfile.into(),
            docdate: "27.10.2023".into(),
            doctype: "invoice".into(),
            sendername: "Test/Sender".into(),
            docid: "123".into(),
            receivername: String::new(),
            dateoffile: "2023-10-28".into(),
            extension: "pdf".into(),
        }
    }

    #[test]
    fn recognises_date_strings() {
        for s in ["2023-10-27", "27.10.2023", "27.10.23", "20231027"] {
            assert!(is_date_string(s), "{s}");
        }
        for s in ["not a date", "2023-10-", "2023-10-277", "123456789"] {
            assert!(!is_date_string(s), "{s}");
        }
    }

    #[test]
    fn sortable_date_heuristics() {
        let cases = [
            ("2023-10-27", "2023-10-27"),
            ("27.10.2023", "2023-10-27"),
            ("20231027", "2023-10-27"),
            ("27.10.23", "2027-10-23"),
            ("10.27.23", "2010-23-27"),
            ("23.10.27", "2023-10-27"),
            ("23.27.10", "2023-10-27"),
            ("25.27.10", "2025-10-27"),
            ("27.10.33", "2033-10-27"),
            ("10.27.33", "2010-33-27"),
            ("not a date", "not a date"),
        ];
        for (input, expected) in cases {
            assert_eq!(sortable_date(input), expected, "{input}");
        }
    }

    #[test]
    fn sanitizes_components() {
        for bad in ["/", "\\", "*", "?", ":", "\"", "<", ">", "|"] {
            assert_eq!(sanitize_component(&format!("test{bad}file.pdf")), "test-file.pdf");
        }
        assert_eq!(sanitize_component("test  file.pdf"), "test  file.pdf");
        assert_eq!(sanitize_component("test..file.pdf"), "test..file.pdf");
        assert_eq!(sanitize_component("test--file.pdf"), "test-file.pdf");
        assert_eq!(sanitize_component(" test file.pdf "), "test file.pdf");
        assert_eq!(sanitize_component("-.OTTO.-"), "OTTO");
        assert_eq!(sanitize_component("27.10.2023"), "2023-10-27");
        assert_eq!(sanitize_component("123"), "123");
    }

    #[test]
    fn builds_target_name() {
        assert_eq!(
            target_file_name(&row("a.pdf")),
            "2023-10-27_invoice_Test-Sender_123__2023-10-28.pdf"
        );
        let empty = ResultRow {
            scanfile: "a.pdf".into(),
            dateoffile: "2023-01-02".into(),
            extension: "pdf".into(),
            ..ResultRow::default()
        };
        assert_eq!(
            target_file_name(&empty),
            "unknown_unknown_unknown_unknown__2023-01-02.pdf"
        );
    }

    #[test]
    fn mode_none_only_plans() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF").unwrap();
        let out = dir.path().join("out");
        let outcomes = Renamer::new(&out, RenameMode::None)
            .apply(&[row("a.pdf")], dir.path())
            .unwrap();
        assert_eq!(outcomes[0].action, RenameAction::Planned);
        assert!(!out.exists());
    }

    #[test]
    fn copy_keeps_source_and_skips_existing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF").unwrap();
        let out = dir.path().join("out");
        let renamer = Renamer::new(&out, RenameMode::Copy);

        let outcomes = renamer.apply(&[row("a.pdf")], dir.path()).unwrap();
        assert_eq!(outcomes[0].action, RenameAction::Copied);
        assert!(outcomes[0].target.is_file());
        assert!(dir.path().join("a.pdf").is_file());

        let again = renamer.apply(&[row("a.pdf")], dir.path()).unwrap();
        assert_eq!(again[0].action, RenameAction::SkippedExisting);

        let forced = renamer
            .clone()
            .overwrite(true)
            .apply(&[row("a.pdf")], dir.path())
            .unwrap();
        assert_eq!(forced[0].action, RenameAction::Copied);
    }

    #[test]
    fn move_removes_source() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF").unwrap();
        let out = dir.path().join("out");
        let outcomes = Renamer::new(&out, RenameMode::Move)
            .apply(&[row("a.pdf")], dir.path())
            .unwrap();
        assert_eq!(outcomes[0].action, RenameAction::Moved);
        assert!(!dir.path().join("a.pdf").exists());
        assert_eq!(std::fs::read(&outcomes[0].target).unwrap(), b"%PDF");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF").unwrap();
        let out = dir.path().join("out");
        let outcomes = Renamer::new(&out, RenameMode::Move)
            .dry_run(true)
            .apply(&[row("a.pdf")], dir.path())
            .unwrap();
        assert_eq!(outcomes[0].action, RenameAction::DryRun);
        assert!(dir.path().join("a.pdf").exists());
        assert!(!out.exists());
    }

    #[test]
    fn missing_source_and_incomplete_rows() {
        let dir = TempDir::new().unwrap();
        let mut incomplete = row("b.pdf");
        incomplete.extension.clear();
        let outcomes = Renamer::new(dir.path().join("out"), RenameMode::Copy)
            .apply(&[row("gone.pdf"), incomplete], dir.path())
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].action, RenameAction::MissingSource);
    }
}
