//! Feature records: the four fields extracted from a page and their quality.
//!
//! A [`FeatureRecord`] is persisted per page as a `key,value,quality` CSV
//! table. Only fields the extractor actually reported are stored; a missing
//! field scores quality 0 during aggregation.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The recognised field names, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldName {
    #[serde(rename = "Document Date")]
    DocumentDate,
    #[serde(rename = "Document Type")]
    DocumentType,
    #[serde(rename = "Sender")]
    Sender,
    #[serde(rename = "Invoice Number")]
    InvoiceNumber,
}

impl FieldName {
    pub const ALL: [FieldName; 4] = [
        FieldName::DocumentDate,
        FieldName::DocumentType,
        FieldName::Sender,
        FieldName::InvoiceNumber,
    ];

    /// Key as written in feature tables and expected in model responses.
    pub fn key(self) -> &'static str {
        match self {
            FieldName::DocumentDate => "Document Date",
            FieldName::DocumentType => "Document Type",
            FieldName::Sender => "Sender",
            FieldName::InvoiceNumber => "Invoice Number",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FieldName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldName::ALL
            .into_iter()
            .find(|f| f.key() == s)
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}

/// An extracted value and the extractor's confidence in it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    /// Confidence in `[0, 1]`.
    pub quality: f64,
}

impl FieldValue {
    pub fn new(value: impl Into<String>, quality: f64) -> Self {
        Self {
            value: value.into(),
            quality: quality.clamp(0.0, 1.0),
        }
    }
}

/// Field values as reported by a feature extractor for one text.
pub type FeatureFields = BTreeMap<FieldName, FieldValue>;

/// The fields extracted from one page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// 1-based page index.
    pub page: usize,
    pub fields: FeatureFields,
}

impl FeatureRecord {
    pub fn new(page: usize, fields: FeatureFields) -> Self {
        Self { page, fields }
    }

    /// The record a failed page contributes: every field empty with quality 0.
    pub fn zero(page: usize) -> Self {
        let fields = FieldName::ALL
            .into_iter()
            .map(|f| (f, FieldValue::default()))
            .collect();
        Self { page, fields }
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Mean quality over all recognised fields; a missing field counts as 0.
    pub fn score(&self) -> f64 {
        let sum: f64 = FieldName::ALL
            .iter()
            .map(|f| self.fields.get(f).map_or(0.0, |v| v.quality))
            .sum();
        sum / FieldName::ALL.len() as f64
    }

    /// Serialise as a `key,value,quality` table.
    pub fn to_csv(&self) -> Result<Vec<u8>, ScanError> {
        let rows = self.fields.iter().map(|(name, v)| FeatureRow {
            key: name.key().to_string(),
            value: v.value.clone(),
            quality: v.quality,
        });
        write_feature_rows(rows)
    }

    /// Parse a persisted `key,value,quality` table.
    ///
    /// An empty file, a foreign header or an unknown key is an
    /// [`ScanError::ArtifactIo`]: the caller recomputes rather than trusting it.
    pub fn from_csv(page: usize, bytes: &[u8], path: &Path) -> Result<Self, ScanError> {
        let mut reader = csv::Reader::from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|e| ScanError::artifact_io(path, e))?
            .clone();
        if headers.iter().collect::<Vec<_>>() != FEATURE_HEADER {
            return Err(ScanError::artifact_io(
                path,
                format!("unexpected header {:?}", headers),
            ));
        }

        let mut fields = FeatureFields::new();
        for row in reader.deserialize::<FeatureRow>() {
            let row = row.map_err(|e| ScanError::artifact_io(path, e))?;
            let name = row
                .key
                .parse::<FieldName>()
                .map_err(|e| ScanError::artifact_io(path, e))?;
            if !(0.0..=1.0).contains(&row.quality) {
                return Err(ScanError::artifact_io(
                    path,
                    format!("quality {} out of range for '{}'", row.quality, row.key),
                ));
            }
            fields.insert(name, FieldValue::new(row.value, row.quality));
        }
        Ok(Self { page, fields })
    }
}

/// Header of every feature table.
pub const FEATURE_HEADER: [&str; 3] = ["key", "value", "quality"];

/// One `key,value,quality` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub key: String,
    pub value: String,
    pub quality: f64,
}

/// Serialise feature rows with the standard header, even when there are none.
pub fn write_feature_rows(rows: impl IntoIterator<Item = FeatureRow>) -> Result<Vec<u8>, ScanError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(FEATURE_HEADER)
        .map_err(|e| ScanError::Internal(format!("feature table: {e}")))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ScanError::Internal(format!("feature table: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| ScanError::Internal(format!("feature table: {e}")))
}
