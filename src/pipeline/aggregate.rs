//! Aggregation: pick the page whose extraction looks most trustworthy.

use crate::pipeline::features::{FeatureFields, FeatureRecord, FieldName};
use serde::{Deserialize, Serialize};

/// The document-level answer: all four fields, taken from one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedFeature {
    /// 1-based page the fields come from; `None` when there were no records.
    pub page: Option<usize>,
    /// Always holds every [`FieldName`].
    pub fields: FeatureFields,
    /// Score of the winning page.
    pub score: f64,
}

impl AggregatedFeature {
    /// Every field empty with quality 0.
    pub fn empty() -> Self {
        Self {
            page: None,
            fields: complete(&FeatureFields::new()),
            score: 0.0,
        }
    }

    pub fn value(&self, field: FieldName) -> &str {
        self.fields.get(&field).map_or("", |v| v.value.as_str())
    }

    pub fn quality(&self, field: FieldName) -> f64 {
        self.fields.get(&field).map_or(0.0, |v| v.quality)
    }
}

fn complete(fields: &FeatureFields) -> FeatureFields {
    FieldName::ALL
        .into_iter()
        .map(|f| (f, fields.get(&f).cloned().unwrap_or_default()))
        .collect()
}

/// Select the highest-scoring record. Ties go to the lowest page number, so
/// the result does not depend on the order records are passed in.
pub fn aggregate(records: &[FeatureRecord]) -> AggregatedFeature {
    let best = records.iter().fold(None::<(&FeatureRecord, f64)>, |best, r| {
        let score = r.score();
        match best {
            Some((b, bs)) if bs > score || (bs == score && b.page <= r.page) => Some((b, bs)),
            _ => Some((r, score)),
        }
    });

    match best {
        Some((record, score)) => AggregatedFeature {
            page: Some(record.page),
            fields: complete(&record.fields),
            score,
        },
        None => AggregatedFeature::empty(),
    }
}
