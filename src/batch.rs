use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::record::{Record, round2};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BatchCounts {
    pub total: usize,
    pub clean: usize,
    pub error: usize,
    pub duplicates_removed: usize,
    pub empty_removed: usize,
}

/// Which path and which concrete dialect/strategy produced a result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum Provenance {
    Delimited {
        encoding: String,
        delimiter: char,
    },
    Document {
        strategy: String,
        tables_found: usize,
    },
    Spreadsheet {
        rules_applied: usize,
    },
    Reconciliation {
        stream_records: usize,
        reference_records: usize,
    },
    Failed {
        attempted: Vec<String>,
    },
}

/// The structured result handed back to the caller. Output persistence is the
/// caller's concern; the core never writes to storage. `batch_id` lets callers
/// namespace any shared output location per run.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub success: bool,
    pub clean_records: Vec<Record>,
    pub error_records: Vec<Record>,
    pub counts: BatchCounts,
    pub success_rate: f64,
    pub provenance: Provenance,
    pub elapsed_seconds: f64,
}

/// Scores each record and routes it into exactly one partition. Error
/// presence is decided upstream by whichever component annotated the record;
/// the aggregator never recomputes it.
#[derive(Debug, Default)]
pub struct Aggregator {
    clean: Vec<Record>,
    errors: Vec<Record>,
    duplicates_removed: usize,
    empty_removed: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_removals(duplicates_removed: usize, empty_removed: usize) -> Self {
        Self {
            duplicates_removed,
            empty_removed,
            ..Self::default()
        }
    }

    pub fn push(&mut self, mut record: Record) {
        record.finalize_score();
        if record.is_clean() {
            self.clean.push(record);
        } else {
            self.errors.push(record);
        }
    }

    pub fn finish(self, provenance: Provenance, elapsed: Duration) -> BatchResult {
        let counts = BatchCounts {
            total: self.clean.len()
                + self.errors.len()
                + self.duplicates_removed
                + self.empty_removed,
            clean: self.clean.len(),
            error: self.errors.len(),
            duplicates_removed: self.duplicates_removed,
            empty_removed: self.empty_removed,
        };
        let success_rate = if counts.total == 0 {
            0.0
        } else {
            round2(counts.clean as f64 / counts.total as f64 * 100.0)
        };
        BatchResult {
            batch_id: Uuid::new_v4(),
            success: true,
            clean_records: self.clean,
            error_records: self.errors,
            counts,
            success_rate,
            provenance,
            elapsed_seconds: round2(elapsed.as_secs_f64()),
        }
    }
}

impl BatchResult {
    /// Total-failure result: no usable data, one diagnostic error entry.
    pub fn failed(
        diagnostic: Record,
        attempted: Vec<String>,
        elapsed: Duration,
    ) -> Self {
        BatchResult {
            batch_id: Uuid::new_v4(),
            success: false,
            clean_records: Vec::new(),
            error_records: vec![diagnostic],
            counts: BatchCounts {
                total: 0,
                clean: 0,
                error: 1,
                duplicates_removed: 0,
                empty_removed: 0,
            },
            success_rate: 0.0,
            provenance: Provenance::Failed { attempted },
            elapsed_seconds: round2(elapsed.as_secs_f64()),
        }
    }
}
