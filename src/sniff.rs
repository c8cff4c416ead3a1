//! Dialect and encoding detection for delimited input.
//!
//! Real-world exports vary encoding and delimiter independently, so the
//! sniffer walks a small fixed grid of ordered encodings crossed with ordered
//! delimiters, accepting the first pair whose bounded prefix parses into
//! more than one column. Earlier grid entries deliberately win ties.

use encoding_rs::Encoding;
use itertools::Itertools;
use log::debug;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Encoding labels tried in order. `latin-1` and `iso-8859-1` resolve to the
/// same `encoding_rs` encoding; both labels are kept so the documented probe
/// order is preserved verbatim.
pub const ENCODING_LABELS: &[&str] = &["utf-8", "latin-1", "windows-1252", "iso-8859-1"];

/// Delimiters tried in order for each encoding.
pub const DELIMITERS: &[u8] = &[b',', b';', b'\t', b'|'];

/// The detected (encoding, delimiter) pair for a delimited source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub encoding: &'static Encoding,
    pub encoding_label: &'static str,
    pub delimiter: u8,
}

/// Caller-supplied overrides. A present hint pins that axis of the grid.
#[derive(Debug, Clone, Default)]
pub struct FormatHints {
    pub delimiter: Option<u8>,
    pub encoding: Option<String>,
}

pub fn sniff_dialect(
    bytes: &[u8],
    hints: &FormatHints,
    config: &PipelineConfig,
) -> Result<Dialect, PipelineError> {
    let encodings: Vec<&'static str> = match &hints.encoding {
        Some(label) => vec![resolve_label(label)?],
        None => ENCODING_LABELS.to_vec(),
    };
    let delimiters: Vec<u8> = match hints.delimiter {
        Some(d) => vec![d],
        None => DELIMITERS.to_vec(),
    };

    for label in &encodings {
        let Some(encoding) = grid_encoding(label) else {
            continue;
        };
        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            debug!("encoding '{label}' rejected: decode errors");
            continue;
        }
        for &delimiter in &delimiters {
            if prefix_parses_multi_column(&text, delimiter, config.sniff_rows) {
                debug!(
                    "dialect accepted: encoding '{label}', delimiter '{}'",
                    printable_delimiter(delimiter)
                );
                return Ok(Dialect {
                    encoding,
                    encoding_label: label,
                    delimiter,
                });
            }
        }
    }

    Err(PipelineError::DialectDetection {
        tried: format!(
            "{} x {}",
            encodings.join("/"),
            delimiters.iter().map(|d| printable_delimiter(*d)).join("")
        ),
    })
}

/// A candidate pair is accepted when the first `sniff_rows` records parse
/// without error and the first record carries at least two fields.
fn prefix_parses_multi_column(text: &str, delimiter: u8, sniff_rows: usize) -> bool {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(false)
        .from_reader(text.as_bytes());
    let mut columns = 0usize;
    for (idx, record) in reader.records().enumerate() {
        if idx >= sniff_rows {
            break;
        }
        match record {
            Ok(record) if idx == 0 => columns = record.len(),
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    columns > 1
}

/// "latin-1" is not a WHATWG label; it stays in the grid for probe-order
/// fidelity and maps to the same decoder as "iso-8859-1".
fn grid_encoding(label: &str) -> Option<&'static Encoding> {
    if label == "latin-1" {
        return Encoding::for_label(b"latin1");
    }
    Encoding::for_label(label.as_bytes())
}

fn resolve_label(label: &str) -> Result<&'static str, PipelineError> {
    let trimmed = label.trim().to_ascii_lowercase();
    if let Some(known) = ENCODING_LABELS.iter().find(|known| **known == trimmed) {
        return Ok(known);
    }
    // Aliases encoding_rs knows (e.g. "cp1252") pin to the earliest grid label
    // sharing their decoder; labels outside the grid are rejected, never
    // defaulted.
    Encoding::for_label(trimmed.as_bytes())
        .and_then(|e| {
            ENCODING_LABELS
                .iter()
                .find(|known| grid_encoding(known) == Some(e))
                .copied()
        })
        .ok_or_else(|| {
            PipelineError::SourceUnreadable(format!("unsupported encoding '{label}'"))
        })
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
