//! Column type inference from bounded samples.

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::table::RawTable;
use crate::value::{is_null_sentinel, is_numeric, is_temporal};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Temporal,
    Text,
}

/// Inference result for one column. Built once from the first N non-null
/// values and never revised afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub sample_size: usize,
    pub match_ratio: f64,
}

/// Classifies every column of `table`. The numeric test runs before the
/// temporal test, so an all-year column like "2024" lands on Numeric; this
/// tie-break is deliberate. Columns with no sampled non-null values are Text.
pub fn profile_columns(table: &RawTable, config: &PipelineConfig) -> Vec<ColumnProfile> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| profile_column(name, table, idx, config))
        .collect()
}

fn profile_column(
    name: &str,
    table: &RawTable,
    index: usize,
    config: &PipelineConfig,
) -> ColumnProfile {
    let sample: Vec<&str> = table
        .rows
        .iter()
        .map(|row| row[index].as_str())
        .filter(|cell| !is_null_sentinel(cell))
        .take(config.sample_rows)
        .collect();

    if sample.is_empty() {
        return ColumnProfile {
            name: name.to_string(),
            kind: ColumnKind::Text,
            sample_size: 0,
            match_ratio: 0.0,
        };
    }

    let total = sample.len() as f64;
    let numeric_ratio = sample.iter().filter(|v| is_numeric(v)).count() as f64 / total;
    if numeric_ratio >= config.type_threshold {
        return ColumnProfile {
            name: name.to_string(),
            kind: ColumnKind::Numeric,
            sample_size: sample.len(),
            match_ratio: numeric_ratio,
        };
    }

    let temporal_ratio = sample.iter().filter(|v| is_temporal(v)).count() as f64 / total;
    let (kind, match_ratio) = if temporal_ratio >= config.type_threshold {
        (ColumnKind::Temporal, temporal_ratio)
    } else {
        (ColumnKind::Text, 1.0 - numeric_ratio.max(temporal_ratio))
    };
    ColumnProfile {
        name: name.to_string(),
        kind,
        sample_size: sample.len(),
        match_ratio,
    }
}
