use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A typed cell value after cleaning. Raw input is always text; the cleaner
/// promotes it to `Integer`/`Float` or a canonical temporal string per the
/// column profile, or demotes it to `Null` when a null sentinel is found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Tokens treated as missing values in any column kind, compared
/// case-insensitively after trimming.
pub const NULL_SENTINELS: &[&str] = &["", "n/a", "null", "none", "nan"];

pub fn is_null_sentinel(raw: &str) -> bool {
    let trimmed = raw.trim();
    NULL_SENTINELS
        .iter()
        .any(|s| trimmed.eq_ignore_ascii_case(s))
}

/// Strips thousands separators and embedded whitespace before a numeric parse.
pub fn strip_numeric_noise(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect()
}

/// Parses a numeric cell: integer unless a decimal point or exponent marker is
/// present. Returns `None` when the cleaned token does not parse.
pub fn parse_numeric(raw: &str) -> Option<Value> {
    let cleaned = strip_numeric_noise(raw);
    if cleaned.is_empty() {
        return None;
    }
    let float: f64 = cleaned.parse().ok()?;
    if cleaned.contains('.') || cleaned.contains('e') || cleaned.contains('E') {
        Some(Value::Float(float))
    } else {
        cleaned
            .parse::<i64>()
            .ok()
            .map(Value::Integer)
            .or(Some(Value::Float(float)))
    }
}

pub fn is_numeric(raw: &str) -> bool {
    let cleaned = strip_numeric_noise(raw);
    !cleaned.is_empty() && cleaned.parse::<f64>().is_ok()
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M",
];

/// Permissive temporal parse: datetime formats first, then bare dates at
/// midnight. Day-first layouts are listed ahead of month-first ones.
pub fn parse_temporal(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

pub fn is_temporal(raw: &str) -> bool {
    parse_temporal(raw).is_some()
}

/// Canonical rendering used everywhere a temporal value is re-emitted.
pub fn render_temporal(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}
