//! Extraction strategy cascade for paginated (page/image-oriented) documents.
//!
//! Strategies are tried strictly in order and the first one yielding usable
//! tables wins. A strategy that errors or returns nothing is a clean failure:
//! nothing propagates, the diagnostic is kept for the final report. External
//! extraction engines (structured table readers, OCR) enter through the
//! `TableEngine`/`OcrEngine` traits; the cascade, the text heuristics, table
//! alignment, and the metadata stub are owned here.

use std::sync::LazyLock;

use anyhow::Result;
use itertools::Itertools;
use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::error::PipelineError;
use crate::table::RawTable;
use crate::value::is_null_sentinel;

/// A fully-materialized paginated document. Implementations must be
/// re-readable: the cascade may walk the pages once per strategy.
pub trait PageSource {
    fn name(&self) -> &str;
    fn page_count(&self) -> usize;
    fn page_text(&self, page: usize) -> Result<String>;
    fn byte_len(&self) -> u64;
}

/// In-memory page source over pre-extracted text, one entry per page.
#[derive(Debug, Clone)]
pub struct TextPageSource {
    name: String,
    pages: Vec<String>,
    byte_len: u64,
}

impl TextPageSource {
    pub fn new(name: impl Into<String>, pages: Vec<String>) -> Self {
        let byte_len = pages.iter().map(|p| p.len() as u64).sum();
        Self {
            name: name.into(),
            pages,
            byte_len,
        }
    }

    /// Splits raw text into pages on form-feed characters.
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        let pages = text.split('\u{c}').map(str::to_string).collect();
        Self::new(name, pages)
    }
}

impl PageSource for TextPageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page: usize) -> Result<String> {
        self.pages
            .get(page)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("page {page} out of range"))
    }

    fn byte_len(&self) -> u64 {
        self.byte_len
    }
}

/// One geometry/flavor configuration handed to a structured table engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub label: &'static str,
    pub lattice: bool,
    pub stream: bool,
    pub headerless: bool,
    pub split_text: bool,
    pub region: Option<[f64; 4]>,
    pub edge_tolerance: Option<f64>,
}

const fn base_config(label: &'static str) -> EngineConfig {
    EngineConfig {
        label,
        lattice: false,
        stream: false,
        headerless: false,
        split_text: false,
        region: None,
        edge_tolerance: None,
    }
}

/// Geometry grid for the primary engine: whole-document guess, lattice,
/// stream, fixed-region, headerless.
pub const PRIMARY_CONFIGS: &[EngineConfig] = &[
    base_config("whole_document"),
    EngineConfig {
        lattice: true,
        ..base_config("lattice")
    },
    EngineConfig {
        stream: true,
        ..base_config("stream")
    },
    EngineConfig {
        region: Some([0.0, 0.0, 792.0, 612.0]),
        ..base_config("fixed_region")
    },
    EngineConfig {
        headerless: true,
        ..base_config("headerless")
    },
];

/// Flavor grid for the alternate engine.
pub const ALTERNATE_CONFIGS: &[EngineConfig] = &[
    EngineConfig {
        lattice: true,
        ..base_config("lattice")
    },
    EngineConfig {
        stream: true,
        ..base_config("stream")
    },
    EngineConfig {
        lattice: true,
        split_text: true,
        ..base_config("lattice_split")
    },
    EngineConfig {
        stream: true,
        edge_tolerance: Some(50.0),
        ..base_config("stream_edge_tolerant")
    },
];

/// Structured table extraction collaborator.
pub trait TableEngine {
    fn name(&self) -> &'static str;
    fn read_tables(&self, source: &dyn PageSource, config: &EngineConfig)
    -> Result<Vec<RawTable>>;
}

/// Optical character recognition collaborator, invoked per page.
pub trait OcrEngine {
    fn recognize_page(&self, source: &dyn PageSource, page: usize) -> Result<String>;
}

/// What a strategy produced when it succeeded.
pub struct StrategyYield {
    pub tables: Vec<RawTable>,
    /// Sub-configuration or mode that won, for provenance.
    pub detail: Option<String>,
}

/// Ordered-strategy capability: return `Ok(None)` for a clean miss, `Err`
/// only for diagnostics (the cascade converts either into a failed attempt).
pub trait ExtractionStrategy {
    fn id(&self) -> &'static str;
    fn try_extract(&self, source: &dyn PageSource) -> Result<Option<StrategyYield>>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExtractionAttempt {
    pub strategy: String,
    pub success: bool,
    pub tables_found: usize,
    pub diagnostic: String,
}

#[derive(Debug)]
pub struct CascadeOutcome {
    pub table: RawTable,
    /// Winning strategy id, with the sub-configuration in brackets.
    pub strategy: String,
    pub tables_found: usize,
    pub attempts: Vec<ExtractionAttempt>,
    /// True when only the metadata stub succeeded: structurally a success,
    /// semantically "extraction failed".
    pub degraded: bool,
}

pub struct Cascade {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    use_metadata_stub: bool,
}

impl Cascade {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self {
            strategies,
            use_metadata_stub: true,
        }
    }

    /// Full cascade: primary engine, alternate engine, text heuristics, OCR,
    /// metadata stub.
    pub fn standard(
        primary: Box<dyn TableEngine>,
        alternate: Box<dyn TableEngine>,
        ocr: Box<dyn OcrEngine>,
    ) -> Self {
        Self::new(vec![
            Box::new(EngineStrategy::new("native_tables", primary, PRIMARY_CONFIGS)),
            Box::new(EngineStrategy::new(
                "alternate_tables",
                alternate,
                ALTERNATE_CONFIGS,
            )),
            Box::new(TextHeuristicStrategy),
            Box::new(OcrStrategy::new(ocr)),
        ])
    }

    /// Cascade for sources with no external engines attached: heuristic text
    /// parsing backed by the metadata stub.
    pub fn text_only() -> Self {
        Self::new(vec![Box::new(TextHeuristicStrategy)])
    }

    pub fn without_metadata_stub(mut self) -> Self {
        self.use_metadata_stub = false;
        self
    }

    pub fn run(&self, source: &dyn PageSource) -> Result<CascadeOutcome, PipelineError> {
        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            match strategy.try_extract(source) {
                Ok(Some(yielded)) if !yielded.tables.is_empty() => {
                    let tables_found = yielded.tables.len();
                    let table = RawTable::align_and_concat(yielded.tables)
                        .unwrap_or_else(|| RawTable::new(Vec::new(), Vec::new()));
                    let strategy_tag = match &yielded.detail {
                        Some(detail) => format!("{}[{}]", strategy.id(), detail),
                        None => strategy.id().to_string(),
                    };
                    attempts.push(ExtractionAttempt {
                        strategy: strategy.id().to_string(),
                        success: true,
                        tables_found,
                        diagnostic: format!("{tables_found} table(s)"),
                    });
                    return Ok(CascadeOutcome {
                        table,
                        strategy: strategy_tag,
                        tables_found,
                        attempts,
                        degraded: false,
                    });
                }
                Ok(_) => {
                    debug!("strategy '{}' found no usable tables", strategy.id());
                    attempts.push(ExtractionAttempt {
                        strategy: strategy.id().to_string(),
                        success: false,
                        tables_found: 0,
                        diagnostic: "no usable tables".to_string(),
                    });
                }
                Err(err) => {
                    debug!("strategy '{}' failed: {err}", strategy.id());
                    attempts.push(ExtractionAttempt {
                        strategy: strategy.id().to_string(),
                        success: false,
                        tables_found: 0,
                        diagnostic: err.to_string(),
                    });
                }
            }
        }

        if self.use_metadata_stub {
            let attempted: Vec<String> =
                attempts.iter().map(|a| a.strategy.clone()).collect();
            let table = metadata_stub(source, &attempted);
            attempts.push(ExtractionAttempt {
                strategy: "metadata_stub".to_string(),
                success: true,
                tables_found: 1,
                diagnostic: "synthetic metadata record".to_string(),
            });
            return Ok(CascadeOutcome {
                table,
                strategy: "metadata_stub".to_string(),
                tables_found: 1,
                attempts,
                degraded: true,
            });
        }

        let attempted = attempts.iter().map(|a| a.strategy.as_str()).join(",");
        Err(PipelineError::ExtractionExhausted {
            attempted,
            recommendation: RECOMMENDATION.to_string(),
            diagnostics: attempts
                .into_iter()
                .map(|a| format!("{}: {}", a.strategy, a.diagnostic))
                .collect(),
        })
    }
}

const RECOMMENDATION: &str = "Enable an OCR engine, convert the document to a \
text-based format, or verify it is not password protected.";

/// Strategies 1 and 2: a structured table engine driven through an ordered
/// configuration grid; the first configuration with usable tables wins.
pub struct EngineStrategy {
    id: &'static str,
    engine: Box<dyn TableEngine>,
    configs: &'static [EngineConfig],
}

impl EngineStrategy {
    pub fn new(
        id: &'static str,
        engine: Box<dyn TableEngine>,
        configs: &'static [EngineConfig],
    ) -> Self {
        Self {
            id,
            engine,
            configs,
        }
    }
}

impl ExtractionStrategy for EngineStrategy {
    fn id(&self) -> &'static str {
        self.id
    }

    fn try_extract(&self, source: &dyn PageSource) -> Result<Option<StrategyYield>> {
        let mut last_error = None;
        for config in self.configs {
            match self.engine.read_tables(source, config) {
                Ok(tables) => {
                    let tidied = tidy_tables(tables);
                    if !tidied.is_empty() {
                        return Ok(Some(StrategyYield {
                            tables: tidied,
                            detail: Some(config.label.to_string()),
                        }));
                    }
                }
                Err(err) => {
                    debug!(
                        "{} config '{}' failed: {err}",
                        self.engine.name(),
                        config.label
                    );
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            // Every configuration errored: surface the last one as diagnostic.
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

/// Drops fully-empty rows and columns and assigns `col_N` names to blank
/// headers; tables left with no rows or columns are discarded.
fn tidy_tables(tables: Vec<RawTable>) -> Vec<RawTable> {
    tables
        .into_iter()
        .filter_map(|table| {
            let rows: Vec<Vec<String>> = table
                .rows
                .into_iter()
                .filter(|row| !row.iter().all(|cell| cell.trim().is_empty()))
                .collect();
            if rows.is_empty() {
                return None;
            }
            let keep: Vec<usize> = (0..table.columns.len())
                .filter(|&idx| {
                    !table.columns[idx].trim().is_empty()
                        || rows.iter().any(|row| !row[idx].trim().is_empty())
                })
                .collect();
            if keep.is_empty() {
                return None;
            }
            let columns = keep
                .iter()
                .enumerate()
                .map(|(k, &idx)| {
                    let name = table.columns[idx].trim();
                    if name.is_empty() {
                        format!("col_{k}")
                    } else {
                        name.to_string()
                    }
                })
                .collect();
            let rows = rows
                .into_iter()
                .map(|row| keep.iter().map(|&idx| row[idx].clone()).collect())
                .collect();
            Some(RawTable::new(columns, rows))
        })
        .collect()
}

static TWO_SPACE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}|\t+").expect("valid split pattern"));
static THREE_SPACE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{3,}|\t+").expect("valid split pattern"));

fn split_line(line: &str, pattern: &Regex) -> Vec<String> {
    pattern
        .split(line.trim())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strategy 3: heuristic parsing of the document's extracted text into a
/// table. Lines splitting into at least two tokens on runs of two or more
/// whitespace characters (or tab runs) become candidate rows.
pub struct TextHeuristicStrategy;

impl TextHeuristicStrategy {
    fn parse(text: &str) -> Option<RawTable> {
        if text.trim().len() <= 20 {
            return None;
        }
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.len() <= 2 {
            return None;
        }
        let rows: Vec<Vec<String>> = lines
            .iter()
            .map(|line| split_line(line, &TWO_SPACE_SPLIT))
            .filter(|tokens| tokens.len() >= 2)
            .collect();
        if rows.len() <= 1 {
            return None;
        }
        Some(RawTable::from_ragged(rows, "col"))
    }
}

impl ExtractionStrategy for TextHeuristicStrategy {
    fn id(&self) -> &'static str {
        "text_heuristics"
    }

    fn try_extract(&self, source: &dyn PageSource) -> Result<Option<StrategyYield>> {
        let mut text = String::new();
        for page in 0..source.page_count() {
            text.push_str(&source.page_text(page)?);
            text.push('\n');
        }
        Ok(Self::parse(&text).map(|table| StrategyYield {
            tables: vec![table],
            detail: None,
        }))
    }
}

/// Strategy 4: OCR every page, then parse the concatenated text with a
/// stricter split. When splitting yields no usable rows, degrade further to
/// one row per non-trivial line.
pub struct OcrStrategy {
    engine: Box<dyn OcrEngine>,
}

impl OcrStrategy {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

impl ExtractionStrategy for OcrStrategy {
    fn id(&self) -> &'static str {
        "ocr"
    }

    fn try_extract(&self, source: &dyn PageSource) -> Result<Option<StrategyYield>> {
        let mut text = String::new();
        for page in 0..source.page_count() {
            match self.engine.recognize_page(source, page) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                // A page that fails OCR is skipped, not fatal.
                Err(err) => debug!("ocr failed for page {page}: {err}"),
            }
        }
        if text.trim().len() <= 50 {
            return Ok(None);
        }
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| line.len() > 3)
            .collect();
        if lines.len() <= 2 {
            return Ok(None);
        }
        let rows: Vec<Vec<String>> = lines
            .iter()
            .map(|line| split_line(line, &THREE_SPACE_SPLIT))
            .filter(|tokens| tokens.len() >= 2)
            .collect();
        if rows.len() > 1 {
            return Ok(Some(StrategyYield {
                tables: vec![RawTable::from_ragged(rows, "ocr_col")],
                detail: Some("table".to_string()),
            }));
        }
        // Last resort within OCR: one row per line.
        let rows = lines
            .iter()
            .enumerate()
            .map(|(idx, line)| vec![line.to_string(), (idx + 1).to_string()])
            .collect();
        Ok(Some(StrategyYield {
            tables: vec![RawTable::new(
                vec!["ocr_text".to_string(), "line_number".to_string()],
                rows,
            )],
            detail: Some("text_lines".to_string()),
        }))
    }
}

/// Strategy 5: a single synthetic record describing the source, so the
/// pipeline never returns zero records for an otherwise-unreadable input.
fn metadata_stub(source: &dyn PageSource, attempted: &[String]) -> RawTable {
    let mut sample = String::new();
    for page in 0..source.page_count().min(3) {
        if let Ok(text) = source.page_text(page) {
            let trimmed = text.trim();
            if !trimmed.is_empty() && !is_null_sentinel(trimmed) {
                sample = trimmed.chars().take(200).collect();
                break;
            }
        }
    }
    if sample.is_empty() {
        sample = "No extractable text found".to_string();
    }
    RawTable::new(
        vec![
            "source_name".to_string(),
            "total_pages".to_string(),
            "byte_size".to_string(),
            "extraction_attempted".to_string(),
            "status".to_string(),
            "sample_text".to_string(),
        ],
        vec![vec![
            source.name().to_string(),
            source.page_count().to_string(),
            source.byte_len().to_string(),
            attempted.join(","),
            "no_extractable_tables".to_string(),
            sample,
        ]],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEngine;

    impl TableEngine for FailingEngine {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn read_tables(
            &self,
            _source: &dyn PageSource,
            _config: &EngineConfig,
        ) -> Result<Vec<RawTable>> {
            anyhow::bail!("engine unavailable")
        }
    }

    struct EchoOcr;

    impl OcrEngine for EchoOcr {
        fn recognize_page(&self, source: &dyn PageSource, page: usize) -> Result<String> {
            source.page_text(page)
        }
    }

    fn tabular_source() -> TextPageSource {
        TextPageSource::new(
            "report.txt",
            vec![
                "name    amount    status\nalpha   100       ok\nbeta    250       ok\n"
                    .to_string(),
            ],
        )
    }

    #[test]
    fn text_heuristics_split_on_whitespace_runs() {
        let table = TextHeuristicStrategy::parse(
            "name    amount\nalpha   100\nbeta    250\n",
        )
        .unwrap();
        assert_eq!(table.width(), 2);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows[1], vec!["alpha", "100"]);
    }

    #[test]
    fn short_or_narrow_text_is_a_clean_miss() {
        assert!(TextHeuristicStrategy::parse("tiny").is_none());
        assert!(
            TextHeuristicStrategy::parse(
                "one_token_per_line_number_one\nsecond_line\nthird_line\n"
            )
            .is_none()
        );
    }

    #[test]
    fn failing_engines_fall_through_to_text_heuristics() {
        let cascade = Cascade::new(vec![
            Box::new(EngineStrategy::new(
                "native_tables",
                Box::new(FailingEngine),
                PRIMARY_CONFIGS,
            )),
            Box::new(TextHeuristicStrategy),
        ]);
        let outcome = cascade.run(&tabular_source()).unwrap();
        assert_eq!(outcome.strategy, "text_heuristics");
        assert!(!outcome.degraded);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].success);
        assert!(outcome.attempts[0].diagnostic.contains("engine unavailable"));
    }

    #[test]
    fn cascade_output_matches_direct_strategy_invocation() {
        let source = tabular_source();
        let direct = TextHeuristicStrategy
            .try_extract(&source)
            .unwrap()
            .unwrap();
        let outcome = Cascade::text_only().run(&source).unwrap();
        assert_eq!(outcome.table, direct.tables[0]);
    }

    #[test]
    fn ocr_runs_only_after_text_heuristics_miss() {
        // Single-token lines defeat the text heuristics but OCR's line
        // fallback still produces rows.
        let source = TextPageSource::new(
            "scan.pdf",
            vec![
                "lorem ipsum dolor sit amet consectetur adipiscing elit sed do\nfirstline of scanned content\nsecond line here\nthird line here\n".to_string(),
            ],
        );
        let cascade = Cascade::new(vec![Box::new(OcrStrategy::new(Box::new(EchoOcr)))]);
        let outcome = cascade.run(&source).unwrap();
        assert!(outcome.strategy.starts_with("ocr"));
    }

    #[test]
    fn metadata_stub_is_the_terminal_fallback() {
        let source = TextPageSource::new("blank.pdf", vec!["   ".to_string()]);
        let outcome = Cascade::text_only().run(&source).unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.strategy, "metadata_stub");
        assert_eq!(outcome.table.row_count(), 1);
        let status_idx = outcome
            .table
            .columns
            .iter()
            .position(|c| c == "status")
            .unwrap();
        assert_eq!(outcome.table.rows[0][status_idx], "no_extractable_tables");
    }

    #[test]
    fn exhaustion_reports_every_attempt_when_stub_disabled() {
        let source = TextPageSource::new("blank.pdf", vec![String::new()]);
        let err = Cascade::text_only()
            .without_metadata_stub()
            .run(&source)
            .unwrap_err();
        match err {
            PipelineError::ExtractionExhausted {
                attempted,
                recommendation,
                diagnostics,
            } => {
                assert_eq!(attempted, "text_heuristics");
                assert!(!recommendation.is_empty());
                assert_eq!(diagnostics.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tidy_drops_empty_rows_and_columns_and_names_blanks() {
        let table = RawTable::new(
            vec!["".to_string(), "kept".to_string(), "ghost".to_string()],
            vec![
                vec!["a".to_string(), "b".to_string(), "".to_string()],
                vec!["".to_string(), "".to_string(), "".to_string()],
            ],
        );
        let tidied = tidy_tables(vec![table]);
        assert_eq!(tidied.len(), 1);
        assert_eq!(tidied[0].columns, vec!["col_0", "kept", "ghost"]);
        assert_eq!(tidied[0].row_count(), 1);
    }
}
