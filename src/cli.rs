use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Triage tabular files into clean and error partitions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process a delimited file with dialect sniffing and type inference
    Delimited(DelimitedArgs),
    /// Process a paginated document through the extraction cascade
    Document(DocumentArgs),
    /// Validate a spreadsheet-class table against the domain rule registry
    Validate(ValidateArgs),
    /// Reconcile a hierarchical stream against a reference dataset
    Reconcile(ReconcileArgs),
}

#[derive(Debug, Args)]
pub struct DelimitedArgs {
    /// Input delimited file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Force a delimiter instead of sniffing (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Force a character encoding instead of sniffing
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Output JSON file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DocumentArgs {
    /// Input text file, one page per form-feed-separated section
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output JSON file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Input CSV file carrying the spreadsheet-class table
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Output JSON file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Input XML file holding the hierarchical record stream
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Reference dataset (JSON array of objects)
    #[arg(short = 'r', long = "reference")]
    pub reference: PathBuf,
    /// Output JSON file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

fn parse_delimiter(raw: &str) -> Result<u8, String> {
    match raw {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        other => Err(format!("unsupported delimiter '{other}'")),
    }
}
