//! Generic profile-driven record cleaning for the delimited path.

use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde::Serialize;

use crate::error::ErrorKind;
use crate::infer::{ColumnKind, ColumnProfile};
use crate::record::Record;
use crate::table::RawTable;
use crate::value::{
    Value, is_null_sentinel, parse_numeric, parse_temporal, render_temporal,
};

/// Per-column outcome tallies accumulated across the batch.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ColumnTally {
    pub nulls: usize,
    pub invalid: usize,
    pub valid: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct CleanSummary {
    pub column_stats: BTreeMap<String, ColumnTally>,
    pub duplicates_removed: usize,
    pub empty_removed: usize,
}

pub struct CleanedBatch {
    pub records: Vec<Record>,
    pub summary: CleanSummary,
}

/// Cleans every row of `table` according to the inferred profiles.
///
/// Fully-empty rows are dropped first, then exact duplicates of earlier rows;
/// both removals are counted, never silently absorbed. A value that fails its
/// column's expected-kind parse is retained as trimmed text and annotated,
/// not dropped.
pub fn clean_table(
    table: &RawTable,
    profiles: &[ColumnProfile],
    source_tag: &str,
) -> CleanedBatch {
    let mut summary = CleanSummary::default();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut records = Vec::new();

    for (row_number, row) in table.rows.iter().enumerate() {
        if row.iter().all(|cell| is_null_sentinel(cell)) {
            summary.empty_removed += 1;
            continue;
        }
        if !seen.insert(row.clone()) {
            summary.duplicates_removed += 1;
            continue;
        }

        let mut record = Record::new(source_tag, row_number);
        for (profile, raw) in profiles.iter().zip(row.iter()) {
            let tally = summary.column_stats.entry(profile.name.clone()).or_default();
            let value = clean_cell(raw, profile, tally, &mut record);
            record.insert(profile.name.clone(), value);
        }
        records.push(record);
    }

    debug!(
        "cleaned {} row(s): {} empty removed, {} duplicate(s) removed",
        records.len(),
        summary.empty_removed,
        summary.duplicates_removed
    );
    CleanedBatch { records, summary }
}

fn clean_cell(
    raw: &str,
    profile: &ColumnProfile,
    tally: &mut ColumnTally,
    record: &mut Record,
) -> Value {
    if is_null_sentinel(raw) {
        tally.nulls += 1;
        return Value::Null;
    }
    match profile.kind {
        ColumnKind::Numeric => match parse_numeric(raw) {
            Some(value) => {
                tally.valid += 1;
                value
            }
            None => {
                tally.invalid += 1;
                record.push_error(
                    ErrorKind::FieldValidation,
                    format!("Invalid numeric value in {}: {}", profile.name, raw.trim()),
                );
                Value::Text(raw.trim().to_string())
            }
        },
        ColumnKind::Temporal => match parse_temporal(raw) {
            Some(parsed) => {
                tally.valid += 1;
                Value::Text(render_temporal(&parsed))
            }
            None => {
                tally.invalid += 1;
                record.push_error(
                    ErrorKind::FieldValidation,
                    format!("Invalid temporal value in {}: {}", profile.name, raw.trim()),
                );
                Value::Text(raw.trim().to_string())
            }
        },
        ColumnKind::Text => {
            tally.valid += 1;
            Value::Text(raw.trim().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::infer::profile_columns;

    fn run(columns: &[&str], rows: &[&[&str]]) -> CleanedBatch {
        let table = RawTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        );
        let profiles = profile_columns(&table, &PipelineConfig::default());
        clean_table(&table, &profiles, "unit")
    }

    #[test]
    fn numeric_cells_parse_and_separators_are_stripped() {
        let batch = run(&["amount"], &[&["1,200"], &["3.5"], &["900"]]);
        assert_eq!(batch.records[0].get("amount"), Some(&Value::Integer(1200)));
        assert_eq!(batch.records[1].get("amount"), Some(&Value::Float(3.5)));
    }

    #[test]
    fn failing_cells_are_retained_as_text_with_an_error() {
        let batch = run(&["n"], &[&["1"], &["2"], &["3"], &["oops"]]);
        let bad = &batch.records[3];
        assert_eq!(bad.get("n"), Some(&Value::Text("oops".into())));
        assert_eq!(bad.meta.errors.len(), 1);
        assert!(bad.meta.errors[0].message.contains("Invalid numeric"));
        assert_eq!(batch.summary.column_stats["n"].invalid, 1);
        assert_eq!(batch.summary.column_stats["n"].valid, 3);
    }

    #[test]
    fn temporal_cells_render_canonically() {
        let batch = run(&["ts"], &[&["06/05/2024 14:30:00"], &["2024-05-07"]]);
        assert_eq!(
            batch.records[0].get("ts"),
            Some(&Value::Text("2024-05-06 14:30:00".into()))
        );
        assert_eq!(
            batch.records[1].get("ts"),
            Some(&Value::Text("2024-05-07 00:00:00".into()))
        );
    }

    #[test]
    fn null_sentinels_become_null_in_any_kind() {
        let batch = run(&["n", "t"], &[&["1", "x"], &["n/a", "NULL"]]);
        assert_eq!(batch.records[1].get("n"), Some(&Value::Null));
        assert_eq!(batch.records[1].get("t"), Some(&Value::Null));
        assert_eq!(batch.summary.column_stats["n"].nulls, 1);
    }

    #[test]
    fn empty_and_duplicate_rows_are_removed_and_counted() {
        let batch = run(
            &["a", "b"],
            &[
                &["1", "x"],
                &["", ""],
                &["1", "x"],
                &["2", "y"],
                &["1", "x"],
            ],
        );
        assert_eq!(batch.summary.empty_removed, 1);
        assert_eq!(batch.summary.duplicates_removed, 2);
        assert_eq!(batch.records.len(), 2);
    }

    #[test]
    fn row_numbers_reflect_original_positions() {
        let batch = run(&["a", "b"], &[&["", ""], &["1", "2"]]);
        assert_eq!(batch.records[0].meta.row_number, 1);
    }
}
