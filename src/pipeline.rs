//! The public operations: one entry point per input class. Each runs
//! synchronously to completion and returns a structured `BatchResult`;
//! only source-unreadable conditions and total cascade exhaustion are fatal.

use std::time::Instant;

use log::info;

use crate::batch::{Aggregator, BatchResult, Provenance};
use crate::clean::clean_table;
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError};
use crate::extract::{Cascade, PageSource};
use crate::infer::profile_columns;
use crate::record::Record;
use crate::reconcile::{ReconcileSpec, ReferenceIndex, parse_stream, reconcile};
use crate::rules::{RuleRegistry, validate_table};
use crate::sniff::{Dialect, FormatHints, printable_delimiter, sniff_dialect};
use crate::table::RawTable;
use crate::value::{Value, is_null_sentinel};

/// Delimited path: sniff dialect, infer column kinds, clean, score.
pub fn process_delimited(
    bytes: &[u8],
    hints: &FormatHints,
    config: &PipelineConfig,
) -> Result<BatchResult, PipelineError> {
    let started = Instant::now();
    let dialect = sniff_dialect(bytes, hints, config)?;
    info!(
        "delimited input: encoding '{}', delimiter '{}'",
        dialect.encoding_label,
        printable_delimiter(dialect.delimiter)
    );
    let table = read_delimited_table(bytes, &dialect)?;
    let profiles = profile_columns(&table, config);
    let cleaned = clean_table(&table, &profiles, "delimited");

    let mut aggregator = Aggregator::with_removals(
        cleaned.summary.duplicates_removed,
        cleaned.summary.empty_removed,
    );
    for record in cleaned.records {
        aggregator.push(record);
    }
    Ok(aggregator.finish(
        Provenance::Delimited {
            encoding: dialect.encoding_label.to_string(),
            delimiter: dialect.delimiter as char,
        },
        started.elapsed(),
    ))
}

/// Page/image-oriented path: run the cascade, normalize rows generically,
/// annotate mostly-empty rows, score. Cascade exhaustion comes back as a
/// structured failure result, never a raw error surfaced from a strategy.
pub fn process_paginated_document(
    source: &dyn PageSource,
    cascade: &Cascade,
    config: &PipelineConfig,
) -> Result<BatchResult, PipelineError> {
    let started = Instant::now();
    let outcome = match cascade.run(source) {
        Ok(outcome) => outcome,
        Err(PipelineError::ExtractionExhausted {
            attempted,
            recommendation,
            diagnostics,
        }) => {
            let mut diagnostic = Record::new("document_extraction", 0);
            diagnostic.insert("source_name", Value::Text(source.name().to_string()));
            diagnostic.insert(
                "extraction_methods_tried",
                Value::Text(attempted.clone()),
            );
            diagnostic.insert("recommendation", Value::Text(recommendation.clone()));
            diagnostic.push_error(
                ErrorKind::ExtractionFailed,
                format!("Every extraction strategy failed ({attempted}). {recommendation}"),
            );
            for detail in diagnostics {
                diagnostic.push_error(ErrorKind::ExtractionFailed, detail);
            }
            let attempted = attempted.split(',').map(str::to_string).collect();
            return Ok(BatchResult::failed(diagnostic, attempted, started.elapsed()));
        }
        Err(other) => return Err(other),
    };
    info!(
        "document '{}' extracted via '{}' ({} table(s))",
        source.name(),
        outcome.strategy,
        outcome.tables_found
    );

    let source_tag = format!("document_extraction[{}]", outcome.strategy);
    let width = outcome.table.width();
    let mut aggregator = Aggregator::new();
    for (row_number, row) in outcome.table.rows.iter().enumerate() {
        let mut record = Record::new(source_tag.clone(), row_number);
        let mut populated = 0usize;
        for (column, raw) in outcome.table.columns.iter().zip(row.iter()) {
            if is_null_sentinel(raw) {
                record.insert(column.clone(), Value::Null);
            } else {
                populated += 1;
                record.insert(column.clone(), Value::Text(raw.trim().to_string()));
            }
        }
        if width > 0 {
            let empty_ratio = (width - populated) as f64 / width as f64;
            if empty_ratio > config.mostly_empty_threshold {
                record.push_error(
                    ErrorKind::MostlyEmpty,
                    format!("Row mostly empty: {populated}/{width} fields have data"),
                );
            }
        }
        aggregator.push(record);
    }
    Ok(aggregator.finish(
        Provenance::Document {
            strategy: outcome.strategy,
            tables_found: outcome.tables_found,
        },
        started.elapsed(),
    ))
}

/// Spreadsheet-class path: the caller hands an already-decoded table; domain
/// rules decide the partitions.
pub fn process_spreadsheet(
    table: &RawTable,
    registry: &RuleRegistry,
    config: &PipelineConfig,
) -> BatchResult {
    let started = Instant::now();
    let batch = validate_table(table, registry, config);
    let mut aggregator = Aggregator::new();
    for record in batch.records {
        aggregator.push(record);
    }
    aggregator.finish(
        Provenance::Spreadsheet {
            rules_applied: batch.report.rules_applied,
        },
        started.elapsed(),
    )
}

/// Reconciliation path: hierarchical stream cross-validated against a
/// reference dataset, with median imputation.
pub fn process_hierarchical(
    stream_bytes: &[u8],
    reference_bytes: &[u8],
    spec: &ReconcileSpec,
    config: &PipelineConfig,
) -> Result<BatchResult, PipelineError> {
    let started = Instant::now();
    let reference = ReferenceIndex::from_json(reference_bytes, &spec.reference_identifier_field)?;
    let stream = parse_stream(stream_bytes, &spec.record_element)?;
    let batch = reconcile(&stream, &reference, spec, config);

    let mut aggregator = Aggregator::new();
    for record in batch.records {
        aggregator.push(record);
    }
    Ok(aggregator.finish(
        Provenance::Reconciliation {
            stream_records: batch.stream_count,
            reference_records: batch.reference_count,
        },
        started.elapsed(),
    ))
}

fn read_delimited_table(bytes: &[u8], dialect: &Dialect) -> Result<RawTable, PipelineError> {
    let (text, _, had_errors) = dialect.encoding.decode(bytes);
    if had_errors {
        return Err(PipelineError::SourceUnreadable(format!(
            "failed to decode input as {}",
            dialect.encoding_label
        )));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(dialect.delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| PipelineError::SourceUnreadable(err.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| PipelineError::SourceUnreadable(err.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTable::new(headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::TextPageSource;

    fn cfg() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn delimited_path_produces_typed_clean_records() {
        let csv = b"id,amount,when\n1,\"1,200\",2024-05-06\n2,3.5,2024-05-07\n";
        let result = process_delimited(csv, &FormatHints::default(), &cfg()).unwrap();
        assert!(result.success);
        assert_eq!(result.counts.clean, 2);
        assert_eq!(result.counts.error, 0);
        assert_eq!(
            result.clean_records[0].get("amount"),
            Some(&Value::Integer(1200))
        );
        assert_eq!(
            result.provenance,
            Provenance::Delimited {
                encoding: "utf-8".to_string(),
                delimiter: ','
            }
        );
    }

    #[test]
    fn document_path_annotates_mostly_empty_rows() {
        // Six columns, one populated: 5/6 empty is above the 0.8 threshold.
        let source = TextPageSource::new(
            "sparse.txt",
            vec![
                "a  b  c  d  e  f\nx  n/a  n/a  n/a  n/a  n/a\n1  2  3  4  5  6\n"
                    .to_string(),
            ],
        );
        let result =
            process_paginated_document(&source, &Cascade::text_only(), &cfg()).unwrap();
        assert!(result.success);
        assert_eq!(result.counts.error, 1);
        assert_eq!(
            result.error_records[0].meta.errors[0].kind,
            ErrorKind::MostlyEmpty
        );
    }

    #[test]
    fn exhausted_cascade_becomes_a_structured_failure() {
        let source = TextPageSource::new("blank.pdf", vec![String::new()]);
        let cascade = Cascade::text_only().without_metadata_stub();
        let result = process_paginated_document(&source, &cascade, &cfg()).unwrap();
        assert!(!result.success);
        assert!(result.clean_records.is_empty());
        assert_eq!(result.error_records.len(), 1);
        assert_eq!(
            result.provenance,
            Provenance::Failed {
                attempted: vec!["text_heuristics".to_string()]
            }
        );
    }
}
