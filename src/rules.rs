//! Domain rule validation for spreadsheet-class tables.
//!
//! Rules are data: each one pairs case-insensitive column-name aliases with a
//! predicate and a coercion class, so the table can be exercised in isolation
//! instead of living in a branch chain. Columns matching no rule are accepted
//! unconditionally.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::ErrorKind;
use crate::record::Record;
use crate::table::RawTable;
use crate::value::{
    Value, is_null_sentinel, parse_numeric, parse_temporal, render_temporal,
};

/// How a column is coerced during the cleaning pass that follows validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Unparseable or missing values become 0.
    Numeric,
    /// Missing values become the configured placeholder.
    Text,
    /// Values are re-rendered canonically; unparseable ones become the
    /// placeholder.
    Temporal,
}

pub struct Rule {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub coercion: Coercion,
    predicate: fn(&str) -> bool,
}

impl Rule {
    pub fn matches_column(&self, column: &str) -> bool {
        self.aliases
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(column.trim()))
    }

    pub fn accepts(&self, raw: &str) -> bool {
        (self.predicate)(raw)
    }
}

pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rule_for(&self, column: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches_column(column))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The shipped rule table for transaction-ledger spreadsheets.
    pub fn transaction_ledger() -> Self {
        Self::new(vec![
            Rule {
                name: "transaction_id",
                aliases: &["transaction id", "transaction_id"],
                coercion: Coercion::Text,
                predicate: is_transaction_id,
            },
            Rule {
                name: "customer_id",
                aliases: &["customer id", "customer_id"],
                coercion: Coercion::Text,
                predicate: is_customer_id,
            },
            Rule {
                name: "timestamp",
                aliases: &["timestamp"],
                coercion: Coercion::Temporal,
                predicate: is_strict_timestamp,
            },
            Rule {
                name: "transaction_type",
                aliases: &["transaction type", "transaction_type"],
                coercion: Coercion::Text,
                predicate: |raw| {
                    matches_set(raw, &["p2p", "p2m", "bill payment", "billpayment"])
                },
            },
            Rule {
                name: "category_text",
                aliases: &[
                    "merchant_category",
                    "sender_age_group",
                    "receiver_age_group",
                    "sender_state",
                    "receiver_state",
                    "sender_bank",
                    "receiver_bank",
                    "day_of_week",
                ],
                coercion: Coercion::Text,
                predicate: |raw| !raw.trim().is_empty(),
            },
            Rule {
                name: "amount",
                aliases: &["amount", "amount (inr)"],
                coercion: Coercion::Numeric,
                predicate: |raw| raw.trim().parse::<f64>().is_ok(),
            },
            Rule {
                name: "transaction_status",
                aliases: &["transaction_status", "transaction status"],
                coercion: Coercion::Text,
                predicate: |raw| matches_set(raw, &["success", "failed"]),
            },
            Rule {
                name: "device_type",
                aliases: &["device_type", "device type"],
                coercion: Coercion::Text,
                predicate: |raw| matches_set(raw, &["android", "ios", "web"]),
            },
            Rule {
                name: "network_type",
                aliases: &["network_type", "network type"],
                coercion: Coercion::Text,
                predicate: |raw| {
                    let trimmed = raw.trim();
                    ["4G", "5G", "WiFi", "3G"].contains(&trimmed)
                },
            },
            Rule {
                name: "fraud_flag",
                aliases: &["fraud_flag", "fraud flag"],
                coercion: Coercion::Numeric,
                predicate: is_boolean_01,
            },
            Rule {
                name: "hour_of_day",
                aliases: &["hour_of_day", "hour of day"],
                coercion: Coercion::Numeric,
                predicate: |raw| raw.trim().parse::<i64>().is_ok_and(|h| (0..24).contains(&h)),
            },
            Rule {
                name: "is_weekend",
                aliases: &["is_weekend", "is weekend"],
                coercion: Coercion::Numeric,
                predicate: is_boolean_01,
            },
        ])
    }
}

static TXN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^TXN\d{10}$").expect("valid pattern"));
static CUSTOMER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}$").expect("valid pattern"));

fn is_transaction_id(raw: &str) -> bool {
    TXN_ID.is_match(raw.trim())
}

fn is_customer_id(raw: &str) -> bool {
    CUSTOMER_ID.is_match(raw.trim())
}

fn is_strict_timestamp(raw: &str) -> bool {
    // A successful chrono parse guarantees the hour/minute ranges; date-only
    // values parse to midnight and are accepted.
    parse_temporal(raw).is_some()
}

fn is_boolean_01(raw: &str) -> bool {
    matches!(raw.trim(), "0" | "1")
}

fn matches_set(raw: &str, allowed: &[&str]) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    allowed.contains(&lowered.as_str())
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    /// Failing-cell count per column, including columns with zero failures.
    pub column_failures: BTreeMap<String, usize>,
    pub rules_applied: usize,
}

pub struct ValidatedBatch {
    pub records: Vec<Record>,
    pub report: ValidationReport,
}

/// Validates then cleans a spreadsheet-class table.
///
/// Every cell of every column is evaluated against its matching rule; a row
/// failing on several columns still enters the error set exactly once. The
/// cleaning pass runs regardless of validation outcome, and validation
/// failures are excluded from the clean partition by row index.
pub fn validate_table(
    table: &RawTable,
    registry: &RuleRegistry,
    config: &PipelineConfig,
) -> ValidatedBatch {
    let mut column_failures: BTreeMap<String, usize> = BTreeMap::new();
    let mut failed_rows: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut rules_applied = 0usize;

    for (col_idx, column) in table.columns.iter().enumerate() {
        let failures = column_failures.entry(column.clone()).or_insert(0);
        let Some(rule) = registry.rule_for(column) else {
            continue;
        };
        rules_applied += 1;
        for (row_idx, row) in table.rows.iter().enumerate() {
            if !rule.accepts(&row[col_idx]) {
                *failures += 1;
                failed_rows.entry(row_idx).or_default().push(column.clone());
            }
        }
    }
    debug!(
        "domain validation: {} rule-matched column(s), {} failing row(s)",
        rules_applied,
        failed_rows.len()
    );

    // Rows marked above are still cleaned; they just land in the error set.
    let failed: BTreeSet<usize> = failed_rows.keys().copied().collect();
    let mut records = Vec::with_capacity(table.row_count());
    for (row_idx, row) in table.rows.iter().enumerate() {
        let mut record = Record::new("domain_validation", row_idx);
        for (col_idx, column) in table.columns.iter().enumerate() {
            let coercion = registry
                .rule_for(column)
                .map_or(Coercion::Text, |rule| rule.coercion);
            record.insert(column.clone(), coerce_cell(&row[col_idx], coercion, config));
        }
        if failed.contains(&row_idx) {
            for column in &failed_rows[&row_idx] {
                let col_idx = table.columns.iter().position(|c| c == column);
                let raw = col_idx.map_or("", |idx| row[idx].trim());
                record.push_error(
                    ErrorKind::FieldValidation,
                    format!("Validation failed for column '{column}': '{raw}'"),
                );
            }
        }
        records.push(record);
    }

    ValidatedBatch {
        records,
        report: ValidationReport {
            column_failures,
            rules_applied,
        },
    }
}

fn coerce_cell(raw: &str, coercion: Coercion, config: &PipelineConfig) -> Value {
    match coercion {
        Coercion::Numeric => parse_numeric(raw).unwrap_or(Value::Integer(0)),
        Coercion::Text => {
            if is_null_sentinel(raw) {
                Value::Text(config.text_placeholder.clone())
            } else {
                Value::Text(raw.trim().to_string())
            }
        }
        Coercion::Temporal => match parse_temporal(raw) {
            Some(parsed) => Value::Text(render_temporal(&parsed)),
            None => Value::Text(config.text_placeholder.clone()),
        },
    }
}
