//! Cross-validation of a hierarchical record stream against a reference
//! dataset, with median imputation for missing numeric fields.
//!
//! Two passes over the fully-materialized stream: pass one accumulates
//! parseable numeric values per field and collects identifiers; pass two
//! cleans each record against the median table and the reference index.
//! Reconciliation is bidirectional: reference entries with no matching
//! stream record are reported too.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError};
use crate::record::Record;
use crate::value::{Value, is_null_sentinel};

/// Declares a total field that must equal the sum of its parts.
#[derive(Debug, Clone)]
pub struct TotalCheck {
    pub total: String,
    pub parts: Vec<String>,
}

/// Field semantics for one reconciliation run. Defaults model the credit-card
/// usage schema; callers may supply their own.
#[derive(Debug, Clone)]
pub struct ReconcileSpec {
    /// Element name of one record in the hierarchical stream.
    pub record_element: String,
    /// Positional/record-id field inside each record.
    pub record_id_field: String,
    /// Identifier field inside each stream record.
    pub identifier_field: String,
    /// Identifier field inside each reference entry.
    pub reference_identifier_field: String,
    pub numeric_fields: Vec<String>,
    /// Numeric fields that must lie in [0, 1].
    pub ratio_fields: Vec<String>,
    pub strictly_positive_fields: Vec<String>,
    pub non_negative_fields: Vec<String>,
    pub total_checks: Vec<TotalCheck>,
}

impl ReconcileSpec {
    pub fn credit_card_usage() -> Self {
        let numeric_fields = [
            "BALANCE",
            "BALANCE_FREQUENCY",
            "PURCHASES",
            "ONEOFF_PURCHASES",
            "INSTALLMENTS_PURCHASES",
            "CASH_ADVANCE",
            "PURCHASES_FREQUENCY",
            "ONEOFF_PURCHASES_FREQUENCY",
            "PURCHASES_INSTALLMENTS_FREQUENCY",
            "CASH_ADVANCE_FREQUENCY",
            "CASH_ADVANCE_TRX",
            "PURCHASES_TRX",
            "CREDIT_LIMIT",
            "PAYMENTS",
            "MINIMUM_PAYMENTS",
            "PRC_FULL_PAYMENT",
            "TENURE",
        ]
        .iter()
        .map(|f| f.to_string())
        .collect();
        Self {
            record_element: "Customer".to_string(),
            record_id_field: "RecordId".to_string(),
            identifier_field: "CUST_ID".to_string(),
            reference_identifier_field: "Customer_ID".to_string(),
            numeric_fields,
            ratio_fields: [
                "PRC_FULL_PAYMENT",
                "BALANCE_FREQUENCY",
                "PURCHASES_FREQUENCY",
                "ONEOFF_PURCHASES_FREQUENCY",
                "PURCHASES_INSTALLMENTS_FREQUENCY",
                "CASH_ADVANCE_FREQUENCY",
            ]
            .iter()
            .map(|f| f.to_string())
            .collect(),
            strictly_positive_fields: vec!["CREDIT_LIMIT".to_string()],
            non_negative_fields: vec!["TENURE".to_string()],
            total_checks: vec![TotalCheck {
                total: "PURCHASES".to_string(),
                parts: vec![
                    "ONEOFF_PURCHASES".to_string(),
                    "INSTALLMENTS_PURCHASES".to_string(),
                ],
            }],
        }
    }
}

/// Read-only median per numeric field, computed once before the second pass.
/// A field with no parseable values in the batch has median 0.
#[derive(Debug, Default)]
pub struct MedianTable {
    medians: HashMap<String, f64>,
}

impl MedianTable {
    pub fn from_samples(samples: &HashMap<String, Vec<f64>>) -> Self {
        let medians = samples
            .iter()
            .map(|(field, values)| (field.clone(), median(values)))
            .collect();
        Self { medians }
    }

    pub fn get(&self, field: &str) -> f64 {
        self.medians.get(field).copied().unwrap_or(0.0)
    }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Identifier membership index over the reference dataset.
#[derive(Debug)]
pub struct ReferenceIndex {
    identifiers: HashSet<String>,
    ordered: Vec<String>,
}

impl ReferenceIndex {
    /// Parses a JSON array of objects, pulling `identifier_field` from each.
    pub fn from_json(bytes: &[u8], identifier_field: &str) -> Result<Self, PipelineError> {
        let entries: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_slice(bytes)
                .map_err(|err| PipelineError::ReferenceUnreadable(err.to_string()))?;
        let mut identifiers = HashSet::new();
        let mut ordered = Vec::new();
        for entry in &entries {
            let Some(value) = entry.get(identifier_field) else {
                continue;
            };
            let id = match value {
                serde_json::Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            if identifiers.insert(id.clone()) {
                ordered.push(id);
            }
        }
        Ok(Self {
            identifiers,
            ordered,
        })
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ordered.iter()
    }
}

/// One stream record as parsed from the hierarchical markup: child element
/// name to trimmed text, `None` for empty elements.
pub type StreamRecord = BTreeMap<String, Option<String>>;

/// Parses every `record_element` from the XML stream.
pub fn parse_stream(bytes: &[u8], record_element: &str) -> Result<Vec<StreamRecord>, PipelineError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<StreamRecord> = None;
    let mut field: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|err| PipelineError::SourceUnreadable(format!("XML parse error: {err}")))?
        {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                if name == record_element {
                    current = Some(StreamRecord::new());
                } else if let Some(record) = current.as_mut() {
                    record.insert(name.clone(), None);
                    field = Some(name);
                }
            }
            Event::Text(ref text) => {
                if let (Some(record), Some(name)) = (current.as_mut(), field.as_ref()) {
                    let value = String::from_utf8_lossy(text.as_ref()).trim().to_string();
                    if !value.is_empty() {
                        record.insert(name.clone(), Some(value));
                    }
                }
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).to_string();
                if name == record_element {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                } else {
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(records)
}

pub struct ReconcileBatch {
    pub records: Vec<Record>,
    pub stream_count: usize,
    pub reference_count: usize,
}

/// Runs the full two-pass reconciliation and returns annotated records (the
/// aggregator partitions them afterwards).
pub fn reconcile(
    stream: &[StreamRecord],
    reference: &ReferenceIndex,
    spec: &ReconcileSpec,
    config: &PipelineConfig,
) -> ReconcileBatch {
    // Pass 1: numeric accumulation and identifier collection.
    let mut samples: HashMap<String, Vec<f64>> = spec
        .numeric_fields
        .iter()
        .map(|field| (field.clone(), Vec::new()))
        .collect();
    let mut stream_ids: HashSet<String> = HashSet::new();
    for record in stream {
        for field in &spec.numeric_fields {
            if let Some(Some(raw)) = record.get(field)
                && !is_null_sentinel(raw)
                && let Ok(parsed) = raw.parse::<f64>()
            {
                samples.get_mut(field).expect("seeded above").push(parsed);
            }
        }
        if let Some(Some(id)) = record.get(&spec.identifier_field) {
            stream_ids.insert(id.clone());
        }
    }
    let medians = MedianTable::from_samples(&samples);
    info!(
        "reconciling {} stream record(s) against {} reference entr(ies)",
        stream.len(),
        reference.len()
    );

    // Pass 2: clean, impute, and cross-check every record.
    let mut records = Vec::with_capacity(stream.len());
    for (index, raw) in stream.iter().enumerate() {
        records.push(reconcile_record(index, raw, reference, &medians, spec, config));
    }

    // Post-pass: reference entries never observed in the stream.
    for identifier in reference.iter() {
        if !stream_ids.contains(identifier) {
            let mut record = Record::new("reconciliation", records.len());
            record.insert(spec.identifier_field.clone(), Value::Text(identifier.clone()));
            record.insert(spec.record_id_field.clone(), Value::Null);
            record.push_error(
                ErrorKind::NoActivity,
                format!("No activity found in stream for reference identifier '{identifier}'"),
            );
            records.push(record);
        }
    }

    ReconcileBatch {
        records,
        stream_count: stream.len(),
        reference_count: reference.len(),
    }
}

fn reconcile_record(
    index: usize,
    raw: &StreamRecord,
    reference: &ReferenceIndex,
    medians: &MedianTable,
    spec: &ReconcileSpec,
    config: &PipelineConfig,
) -> Record {
    let mut record = Record::new("reconciliation", index);

    let record_id = raw
        .get(&spec.record_id_field)
        .and_then(|v| v.as_deref())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(-1);
    record.insert(spec.record_id_field.clone(), Value::Integer(record_id));

    // Identifier resolution: a missing identifier gets a synthesized
    // placeholder and the record keeps flowing.
    let original = raw
        .get(&spec.identifier_field)
        .and_then(|v| v.clone())
        .filter(|v| !is_null_sentinel(v));
    let resolved = match &original {
        Some(id) => id.clone(),
        None => {
            record.push_error(
                ErrorKind::MissingIdentifier,
                format!("Missing {}", spec.identifier_field),
            );
            format!("TEMP_{record_id}")
        }
    };
    record.insert(spec.identifier_field.clone(), Value::Text(resolved.clone()));
    record.insert(
        "original_identifier".to_string(),
        original.map_or(Value::Null, Value::Text),
    );

    if !reference.contains(&resolved) {
        record.push_error(
            ErrorKind::ReferentialMismatch,
            format!(
                "{} '{resolved}' not found in reference dataset",
                spec.identifier_field
            ),
        );
    }

    // Numeric fields: imputation never silently succeeds.
    let mut numeric: HashMap<&str, f64> = HashMap::new();
    for field in &spec.numeric_fields {
        let parsed = raw
            .get(field)
            .and_then(|v| v.as_deref())
            .filter(|v| !is_null_sentinel(v))
            .map(str::parse::<f64>);
        let value = match parsed {
            Some(Ok(value)) => value,
            Some(Err(_)) => {
                let imputed = medians.get(field);
                record.push_error(
                    ErrorKind::Imputation,
                    format!("Invalid {field} (imputed with median {imputed})"),
                );
                imputed
            }
            None => {
                let imputed = medians.get(field);
                record.push_error(
                    ErrorKind::Imputation,
                    format!("Missing {field} (imputed with median {imputed})"),
                );
                imputed
            }
        };
        numeric.insert(field.as_str(), value);
        record.insert(field.clone(), Value::Float(value));
    }

    for check in &spec.total_checks {
        let total = numeric.get(check.total.as_str()).copied().unwrap_or(0.0);
        let sum: f64 = check
            .parts
            .iter()
            .filter_map(|p| numeric.get(p.as_str()))
            .sum();
        if (total - sum).abs() > config.arithmetic_tolerance {
            record.push_error(
                ErrorKind::ArithmeticInconsistency,
                format!(
                    "Mismatch: {} != {} (expected {sum}, found {total})",
                    check.total,
                    check.parts.join(" + ")
                ),
            );
        }
    }
    for field in &spec.ratio_fields {
        if let Some(value) = numeric.get(field.as_str())
            && !(0.0..=1.0).contains(value)
        {
            record.push_error(
                ErrorKind::FieldValidation,
                format!("{field} out of range [0,1]: {value}"),
            );
        }
    }
    for field in &spec.strictly_positive_fields {
        if let Some(value) = numeric.get(field.as_str())
            && *value <= 0.0
        {
            record.push_error(
                ErrorKind::FieldValidation,
                format!("Invalid {field} <= 0: {value}"),
            );
        }
    }
    for field in &spec.non_negative_fields {
        if let Some(value) = numeric.get(field.as_str())
            && *value < 0.0
        {
            record.push_error(
                ErrorKind::FieldValidation,
                format!("Invalid {field} < 0: {value}"),
            );
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn median_of_odd_and_even_samples() {
        assert_eq!(median(&[10.0, 20.0, 30.0]), 20.0);
        assert_eq!(median(&[10.0, 20.0, 30.0, 40.0]), 25.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn median_table_defaults_to_zero_for_unseen_fields() {
        let table = MedianTable::from_samples(&HashMap::new());
        assert_eq!(table.get("GHOST"), 0.0);
    }

    #[test]
    fn parse_stream_collects_child_elements() {
        let xml = b"<Customers>\
            <Customer><RecordId>1</RecordId><CUST_ID>C100</CUST_ID><BALANCE>10.5</BALANCE></Customer>\
            <Customer><RecordId>2</RecordId><CUST_ID></CUST_ID></Customer>\
            </Customers>";
        let records = parse_stream(xml, "Customer").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["CUST_ID"], Some("C100".to_string()));
        assert_eq!(records[0]["BALANCE"], Some("10.5".to_string()));
        assert_eq!(records[1]["CUST_ID"], None);
    }

    #[test]
    fn reference_index_reads_string_and_numeric_identifiers() {
        let json = br#"[{"Customer_ID": "C1"}, {"Customer_ID": 42}, {"other": 1}]"#;
        let index = ReferenceIndex::from_json(json, "Customer_ID").unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains("C1"));
        assert!(index.contains("42"));
    }

    proptest! {
        #[test]
        fn median_lies_within_sample_bounds(values in proptest::collection::vec(-1e9f64..1e9, 1..50)) {
            let m = median(&values);
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(m >= min && m <= max);
        }
    }
}
