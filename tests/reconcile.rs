use std::collections::BTreeMap;

use ingest_triage::batch::Provenance;
use ingest_triage::config::PipelineConfig;
use ingest_triage::error::ErrorKind;
use ingest_triage::pipeline::process_hierarchical;
use ingest_triage::reconcile::ReconcileSpec;
use ingest_triage::value::Value;

mod common;

fn cfg() -> PipelineConfig {
    PipelineConfig::default()
}

/// Minimal schema used by the imputation-focused cases.
fn item_spec() -> ReconcileSpec {
    ReconcileSpec {
        record_element: "Item".to_string(),
        record_id_field: "RecordId".to_string(),
        identifier_field: "Id".to_string(),
        reference_identifier_field: "Id".to_string(),
        numeric_fields: vec!["amount".to_string()],
        ratio_fields: Vec::new(),
        strictly_positive_fields: Vec::new(),
        non_negative_fields: Vec::new(),
        total_checks: Vec::new(),
    }
}

fn item_xml(entries: &[(u32, &str, &str)]) -> String {
    let mut xml = String::from("<Items>");
    for (record_id, id, amount) in entries {
        xml.push_str(&format!(
            "<Item><RecordId>{record_id}</RecordId><Id>{id}</Id><amount>{amount}</amount></Item>"
        ));
    }
    xml.push_str("</Items>");
    xml
}

/// Builds one fully-populated customer element with selective overrides.
/// An override with an empty value drops the field's text entirely.
fn customer_xml(record_id: u32, cust_id: &str, overrides: &[(&str, &str)]) -> String {
    let mut fields: BTreeMap<&str, String> = [
        ("BALANCE", "100"),
        ("BALANCE_FREQUENCY", "0.5"),
        ("PURCHASES", "30"),
        ("ONEOFF_PURCHASES", "10"),
        ("INSTALLMENTS_PURCHASES", "20"),
        ("CASH_ADVANCE", "0"),
        ("PURCHASES_FREQUENCY", "0.5"),
        ("ONEOFF_PURCHASES_FREQUENCY", "0.5"),
        ("PURCHASES_INSTALLMENTS_FREQUENCY", "0.5"),
        ("CASH_ADVANCE_FREQUENCY", "0.5"),
        ("CASH_ADVANCE_TRX", "0"),
        ("PURCHASES_TRX", "3"),
        ("CREDIT_LIMIT", "1000"),
        ("PAYMENTS", "50"),
        ("MINIMUM_PAYMENTS", "10"),
        ("PRC_FULL_PAYMENT", "0.5"),
        ("TENURE", "12"),
    ]
    .into_iter()
    .map(|(k, v)| (k, v.to_string()))
    .collect();
    for (field, value) in overrides {
        fields.insert(field, value.to_string());
    }

    let mut xml = format!("<Customer><RecordId>{record_id}</RecordId>");
    if !cust_id.is_empty() {
        xml.push_str(&format!("<CUST_ID>{cust_id}</CUST_ID>"));
    } else {
        xml.push_str("<CUST_ID></CUST_ID>");
    }
    for (field, value) in &fields {
        xml.push_str(&format!("<{field}>{value}</{field}>"));
    }
    xml.push_str("</Customer>");
    xml
}

fn wrap(customers: &[String]) -> String {
    format!("<Customers>{}</Customers>", customers.join(""))
}

fn reference(ids: &[&str]) -> String {
    let entries: Vec<String> = ids
        .iter()
        .map(|id| format!("{{\"Customer_ID\": \"{id}\"}}"))
        .collect();
    format!("[{}]", entries.join(","))
}

#[test]
fn fully_valid_record_lands_in_the_clean_partition() {
    let stream = wrap(&[customer_xml(1, "C100", &[])]);
    let result = process_hierarchical(
        stream.as_bytes(),
        reference(&["C100"]).as_bytes(),
        &ReconcileSpec::credit_card_usage(),
        &cfg(),
    )
    .unwrap();
    assert_eq!(result.counts.clean, 1);
    assert_eq!(result.counts.error, 0);
    assert_eq!(result.success_rate, 100.0);
    let record = &result.clean_records[0];
    assert_eq!(record.get("CUST_ID"), Some(&Value::Text("C100".into())));
    assert_eq!(record.get("BALANCE"), Some(&Value::Float(100.0)));
    assert_eq!(
        record.get("original_identifier"),
        Some(&Value::Text("C100".into()))
    );
    assert_eq!(
        result.provenance,
        Provenance::Reconciliation {
            stream_records: 1,
            reference_records: 1,
        }
    );
}

#[test]
fn missing_numeric_field_is_imputed_with_the_batch_median() {
    let stream = item_xml(&[
        (1, "A", "10"),
        (2, "B", "20"),
        (3, "C", "30"),
        (4, "D", ""),
    ]);
    let reference = br#"[{"Id":"A"},{"Id":"B"},{"Id":"C"},{"Id":"D"}]"#;
    let result =
        process_hierarchical(stream.as_bytes(), reference, &item_spec(), &cfg()).unwrap();
    assert_eq!(result.counts.clean, 3);
    assert_eq!(result.counts.error, 1);
    let imputed = &result.error_records[0];
    assert_eq!(imputed.get("amount"), Some(&Value::Float(20.0)));
    assert_eq!(imputed.meta.errors[0].kind, ErrorKind::Imputation);
    assert!(imputed.meta.errors[0].message.contains("median 20"));
}

#[test]
fn unparseable_numeric_field_is_imputed_and_flagged_invalid() {
    let stream = item_xml(&[(1, "A", "10"), (2, "B", "30"), (3, "C", "garbage")]);
    let reference = br#"[{"Id":"A"},{"Id":"B"},{"Id":"C"}]"#;
    let result =
        process_hierarchical(stream.as_bytes(), reference, &item_spec(), &cfg()).unwrap();
    let flagged = &result.error_records[0];
    assert_eq!(flagged.get("amount"), Some(&Value::Float(20.0)));
    assert!(flagged.meta.errors[0].message.starts_with("Invalid amount"));
}

#[test]
fn missing_identifier_gets_a_synthesized_placeholder() {
    let stream = wrap(&[customer_xml(7, "", &[])]);
    let result = process_hierarchical(
        stream.as_bytes(),
        reference(&["TEMP_7"]).as_bytes(),
        &ReconcileSpec::credit_card_usage(),
        &cfg(),
    )
    .unwrap();
    let record = &result.error_records[0];
    assert_eq!(record.get("CUST_ID"), Some(&Value::Text("TEMP_7".into())));
    assert_eq!(record.get("original_identifier"), Some(&Value::Null));
    assert_eq!(record.meta.errors[0].kind, ErrorKind::MissingIdentifier);
}

#[test]
fn reconciliation_reports_mismatches_in_both_directions() {
    // C1 matches, C2 is unknown to the reference, C3 never appears in the
    // stream. Exactly one error on each side.
    let stream = wrap(&[customer_xml(1, "C1", &[]), customer_xml(2, "C2", &[])]);
    let result = process_hierarchical(
        stream.as_bytes(),
        reference(&["C1", "C3"]).as_bytes(),
        &ReconcileSpec::credit_card_usage(),
        &cfg(),
    )
    .unwrap();
    assert_eq!(result.counts.clean, 1);
    assert_eq!(result.counts.error, 2);

    let unknown = result
        .error_records
        .iter()
        .find(|r| r.get("CUST_ID") == Some(&Value::Text("C2".into())))
        .unwrap();
    assert_eq!(unknown.meta.errors.len(), 1);
    assert_eq!(unknown.meta.errors[0].kind, ErrorKind::ReferentialMismatch);

    let inactive = result
        .error_records
        .iter()
        .find(|r| r.get("CUST_ID") == Some(&Value::Text("C3".into())))
        .unwrap();
    assert_eq!(inactive.meta.errors.len(), 1);
    assert_eq!(inactive.meta.errors[0].kind, ErrorKind::NoActivity);
    assert!(inactive.meta.errors[0].message.contains("No activity found"));
}

#[test]
fn purchase_totals_must_balance_within_tolerance() {
    let stream = wrap(&[customer_xml(1, "C1", &[("PURCHASES", "100")])]);
    let result = process_hierarchical(
        stream.as_bytes(),
        reference(&["C1"]).as_bytes(),
        &ReconcileSpec::credit_card_usage(),
        &cfg(),
    )
    .unwrap();
    let record = &result.error_records[0];
    assert_eq!(
        record.meta.errors[0].kind,
        ErrorKind::ArithmeticInconsistency
    );
    assert!(record.meta.errors[0].message.contains("PURCHASES"));
}

#[test]
fn range_rules_flag_ratios_limits_and_tenure() {
    let stream = wrap(&[
        customer_xml(1, "C1", &[("PRC_FULL_PAYMENT", "1.5")]),
        customer_xml(2, "C2", &[("CREDIT_LIMIT", "0")]),
        customer_xml(3, "C3", &[("TENURE", "-1")]),
    ]);
    let result = process_hierarchical(
        stream.as_bytes(),
        reference(&["C1", "C2", "C3"]).as_bytes(),
        &ReconcileSpec::credit_card_usage(),
        &cfg(),
    )
    .unwrap();
    assert_eq!(result.counts.error, 3);
    let messages: Vec<&str> = result
        .error_records
        .iter()
        .map(|r| r.meta.errors[0].message.as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("out of range [0,1]")));
    assert!(messages.iter().any(|m| m.contains("CREDIT_LIMIT <= 0")));
    assert!(messages.iter().any(|m| m.contains("TENURE < 0")));
}

#[test]
fn unreadable_reference_dataset_is_fatal() {
    let stream = wrap(&[customer_xml(1, "C1", &[])]);
    let err = process_hierarchical(
        stream.as_bytes(),
        b"not json",
        &ReconcileSpec::credit_card_usage(),
        &cfg(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("reference dataset"));
}
