use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal pipeline failures. Everything row- or field-level is recovered
/// locally by annotating the record instead of surfacing one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no encoding/delimiter pair produced more than one column (tried {tried})")]
    DialectDetection { tried: String },
    #[error("every extraction strategy failed: {attempted}. {recommendation}")]
    ExtractionExhausted {
        /// Comma-separated strategy identifiers, in attempt order.
        attempted: String,
        recommendation: String,
        diagnostics: Vec<String>,
    },
    #[error("could not read source: {0}")]
    SourceUnreadable(String),
    #[error("could not read reference dataset: {0}")]
    ReferenceUnreadable(String),
}

/// Machine-checkable tag for a record-level problem.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FieldValidation,
    Imputation,
    ReferentialMismatch,
    ArithmeticInconsistency,
    MostlyEmpty,
    MissingIdentifier,
    NoActivity,
    ExtractionFailed,
}

/// A non-fatal problem attached to a record. The record is still emitted,
/// routed to the error partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RecordError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
