//! Results table: one row per classified document.
//!
//! ```text
//! scanfile,docdate,doctype,sendername,docid,receivername,dateoffile,extension
//! scan_001.pdf,2022-08-01,rechnung,OTTO,4711,,2022-08-01,pdf
//! ```
//!
//! The renamer reads this table back, so its column names are part of the
//! on-disk contract.

use crate::error::ScanError;
use crate::pipeline::aggregate::AggregatedFeature;
use crate::pipeline::features::FieldName;
use crate::pipeline::input::SourceDocument;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const RESULTS_HEADER: [&str; 8] = [
    "scanfile",
    "docdate",
    "doctype",
    "sendername",
    "docid",
    "receivername",
    "dateoffile",
    "extension",
];

/// One line of the results table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultRow {
    /// Source file name, relative to the input folder.
    pub scanfile: String,
    pub docdate: String,
    pub doctype: String,
    pub sendername: String,
    pub docid: String,
    /// Never extracted; kept for the renamer's filename layout.
    pub receivername: String,
    /// Document date when known, otherwise the source file's mtime date.
    pub dateoffile: String,
    /// Lowercased source suffix.
    pub extension: String,
}

impl ResultRow {
    /// Rows missing the source file name or extension cannot be renamed.
    pub fn is_complete(&self) -> bool {
        !self.scanfile.is_empty() && !self.extension.is_empty()
    }
}

/// Build the results row for a classified document.
pub fn build_row(doc: &SourceDocument, agg: &AggregatedFeature) -> ResultRow {
    let docdate = agg.value(FieldName::DocumentDate).to_string();
    let dateoffile = if agg.quality(FieldName::DocumentDate) > 0.0 && !docdate.is_empty() {
        docdate.clone()
    } else {
        doc.modified_date()
    };

    ResultRow {
        scanfile: doc.file_name.clone(),
        docdate,
        doctype: agg.value(FieldName::DocumentType).to_string(),
        sendername: agg.value(FieldName::Sender).to_string(),
        docid: agg.value(FieldName::InvoiceNumber).to_string(),
        receivername: String::new(),
        dateoffile,
        extension: doc.extension(),
    }
}

/// Serialise rows with header. The header is written even for an empty table.
pub fn results_csv(rows: &[ResultRow]) -> Result<Vec<u8>, ScanError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(RESULTS_HEADER)
        .map_err(|e| ScanError::Internal(format!("results table: {e}")))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ScanError::Internal(format!("results table: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| ScanError::Internal(format!("results table: {e}")))
}

/// Write the results table atomically.
pub fn write_results(path: &Path, rows: &[ResultRow]) -> Result<(), ScanError> {
    let bytes = results_csv(rows)?;
    write_atomic(path, &bytes)?;
    info!("Wrote {} result row(s) to {}", rows.len(), path.display());
    Ok(())
}

/// Read a results table. Rows that fail to parse or lack the source file name
/// or extension are skipped with a warning.
pub fn read_results(path: &Path) -> Result<Vec<ResultRow>, ScanError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| ScanError::SourceUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut rows = Vec::new();
    for (i, row) in reader.deserialize::<ResultRow>().enumerate() {
        match row {
            Ok(row) if row.is_complete() => rows.push(row),
            Ok(_) => warn!("{}: row {} is incomplete, skipping", path.display(), i + 1),
            Err(e) => warn!("{}: row {} unreadable: {}", path.display(), i + 1, e),
        }
    }
    Ok(rows)
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScanError> {
    use std::io::Write;

    let to_err = |source: std::io::Error| ScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(to_err)?;
    tmp.write_all(bytes).map_err(to_err)?;
    tmp.persist(path).map_err(|e| to_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::{FeatureFields, FeatureRecord, FieldValue};
    use crate::pipeline::aggregate::aggregate;
    use tempfile::TempDir;

    fn doc(dir: &TempDir, name: &str) -> SourceDocument {
        let path = dir.path().join(name);
        std::fs::write(&path, b"%PDF").unwrap();
        SourceDocument::from_path(&path).unwrap()
    }

    fn agg_with(date: &str, date_q: f64) -> AggregatedFeature {
        let mut fields = FeatureFields::new();
        fields.insert(FieldName::DocumentDate, FieldValue::new(date, date_q));
        fields.insert(FieldName::DocumentType, FieldValue::new("rechnung", 1.0));
        fields.insert(FieldName::Sender, FieldValue::new("OTTO", 1.0));
        fields.insert(FieldName::InvoiceNumber, FieldValue::new("4711", 1.0));
        aggregate(&[FeatureRecord::new(1, fields)])
    }

    #[test]
    fn row_uses_document_date_when_known() {
        let dir = TempDir::new().unwrap();
        let row = build_row(&doc(&dir, "scan_001.PDF"), &agg_with("2022-08-01", 1.0));
        assert_eq!(
            row,
            ResultRow {
                scanfile: "scan_001.PDF".into(),
                docdate: "2022-08-01".into(),
                doctype: "rechnung".into(),
                sendername: "OTTO".into(),
                docid: "4711".into(),
                receivername: String::new(),
                dateoffile: "2022-08-01".into(),
                extension: "pdf".into(),
            }
        );
    }

    #[test]
    fn row_falls_back_to_file_mtime() {
        let dir = TempDir::new().unwrap();
        let d = doc(&dir, "scan.pdf");
        let row = build_row(&d, &agg_with("2022-08-01", 0.0));
        assert_eq!(row.dateoffile, d.modified_date());

        let row = build_row(&d, &AggregatedFeature::empty());
        assert_eq!(row.docdate, "");
        assert_eq!(row.dateoffile, d.modified_date());
    }

    #[test]
    fn header_written_for_empty_table() {
        let bytes = results_csv(&[]).unwrap();
        assert_eq!(
            bytes,
            b"scanfile,docdate,doctype,sendername,docid,receivername,dateoffile,extension\n"
        );
    }

    #[test]
    fn read_back_skips_incomplete_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(
            &path,
            "scanfile,docdate,doctype,sendername,docid,receivername,dateoffile,extension\n\
             a.pdf,2022-08-01,rechnung,OTTO,4711,,2022-08-01,pdf\n\
             ,2022-08-01,rechnung,OTTO,4711,,2022-08-01,pdf\n\
             b.pdf,,,,,,2023-01-01,\n",
        )
        .unwrap();
        let rows = read_results(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scanfile, "a.pdf");
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let row = build_row(&doc(&dir, "x.pdf"), &agg_with("2022-08-01", 0.9));
        write_results(&path, std::slice::from_ref(&row)).unwrap();
        assert_eq!(read_results(&path).unwrap(), vec![row]);
    }
}
