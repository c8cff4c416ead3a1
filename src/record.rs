use std::collections::BTreeMap;

use chrono::Local;
use serde::Serialize;

use crate::error::{ErrorKind, RecordError};
use crate::value::Value;

/// Processing metadata carried alongside the data fields. Excluded from
/// quality scoring.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordMeta {
    pub processed_at: String,
    pub source: String,
    pub row_number: usize,
    pub quality_score: f64,
    pub errors: Vec<RecordError>,
}

/// One output record: named typed fields plus metadata. Scored once by the
/// aggregator, then moved into exactly one partition.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Record {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
    #[serde(rename = "_meta")]
    pub meta: RecordMeta,
}

impl Record {
    pub fn new(source: impl Into<String>, row_number: usize) -> Self {
        Self {
            fields: BTreeMap::new(),
            meta: RecordMeta {
                processed_at: timestamp_now(),
                source: source.into(),
                row_number,
                quality_score: 0.0,
                errors: Vec::new(),
            },
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn push_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.meta.errors.push(RecordError::new(kind, message));
    }

    pub fn is_clean(&self) -> bool {
        self.meta.errors.is_empty()
    }

    /// Completeness score: non-null data fields over total data fields, as a
    /// percentage rounded to two decimals. A record with no data fields
    /// scores 0 rather than dividing by zero.
    pub fn quality_score(&self) -> f64 {
        if self.fields.is_empty() {
            return 0.0;
        }
        let non_null = self.fields.values().filter(|v| !v.is_null()).count();
        round2(non_null as f64 / self.fields.len() as f64 * 100.0)
    }

    pub fn finalize_score(&mut self) {
        self.meta.quality_score = self.quality_score();
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn timestamp_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
