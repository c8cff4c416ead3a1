pub mod batch;
pub mod clean;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod infer;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod rules;
pub mod sniff;
pub mod table;
pub mod value;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::batch::BatchResult;
use crate::cli::{Cli, Commands};
use crate::config::PipelineConfig;
use crate::extract::{Cascade, TextPageSource};
use crate::reconcile::ReconcileSpec;
use crate::rules::RuleRegistry;
use crate::sniff::FormatHints;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("ingest_triage", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Delimited(args) => handle_delimited(&args),
        Commands::Document(args) => handle_document(&args),
        Commands::Validate(args) => handle_validate(&args),
        Commands::Reconcile(args) => handle_reconcile(&args),
    }
}

fn handle_delimited(args: &cli::DelimitedArgs) -> Result<()> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("Reading input file {:?}", args.input))?;
    let hints = FormatHints {
        delimiter: args.delimiter,
        encoding: args.input_encoding.clone(),
    };
    let config = PipelineConfig::default();
    let result = pipeline::process_delimited(&bytes, &hints, &config)?;
    report(&result);
    write_result(&result, args.output.as_deref())
}

fn handle_document(args: &cli::DocumentArgs) -> Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("Reading input file {:?}", args.input))?;
    let name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let source = TextPageSource::from_text(name, &text);
    let config = PipelineConfig::default();
    let result = pipeline::process_paginated_document(&source, &Cascade::text_only(), &config)?;
    report(&result);
    write_result(&result, args.output.as_deref())
}

fn handle_validate(args: &cli::ValidateArgs) -> Result<()> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("Reading input file {:?}", args.input))?;
    let config = PipelineConfig::default();
    let hints = FormatHints {
        delimiter: args.delimiter,
        encoding: None,
    };
    let dialect = sniff::sniff_dialect(&bytes, &hints, &config)?;
    let table = read_table_for_validation(&bytes, &dialect)?;
    let result = pipeline::process_spreadsheet(&table, &RuleRegistry::transaction_ledger(), &config);
    report(&result);
    write_result(&result, args.output.as_deref())
}

fn handle_reconcile(args: &cli::ReconcileArgs) -> Result<()> {
    let stream = fs::read(&args.input)
        .with_context(|| format!("Reading input file {:?}", args.input))?;
    let reference = fs::read(&args.reference)
        .with_context(|| format!("Reading reference file {:?}", args.reference))?;
    let config = PipelineConfig::default();
    let result = pipeline::process_hierarchical(
        &stream,
        &reference,
        &ReconcileSpec::credit_card_usage(),
        &config,
    )?;
    report(&result);
    write_result(&result, args.output.as_deref())
}

fn read_table_for_validation(
    bytes: &[u8],
    dialect: &sniff::Dialect,
) -> Result<table::RawTable> {
    let (text, _, _) = dialect.encoding.decode(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(dialect.delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .context("Reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("Reading CSV row")?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(table::RawTable::new(headers, rows))
}

fn report(result: &BatchResult) {
    info!(
        "batch {}: {} clean, {} error ({}% success) in {}s",
        result.batch_id,
        result.counts.clean,
        result.counts.error,
        result.success_rate,
        result.elapsed_seconds
    );
}

fn write_result(result: &BatchResult, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Serializing batch result")?;
    match output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Writing batch result to {path:?}")),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
