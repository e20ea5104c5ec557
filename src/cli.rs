use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::options::parse_punctuation;

#[derive(Debug, Parser)]
#[command(author, version, about = "Read delimited text files with typed columns", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer column formats of a delimited file and print or save them as a schema
    Probe(ProbeArgs),
    /// Preview the first records of a delimited file as typed values
    Preview(PreviewArgs),
}

/// Flags shared by every command that opens a file.
#[derive(Debug, Args)]
pub struct ReaderArgs {
    /// Input file to read (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML file with reader options; flags below override it
    #[arg(long = "options")]
    pub options: Option<PathBuf>,
    /// Field delimiter: a character or a name such as 'tab', 'pipe', 'semicolon'
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<char>,
    /// Field qualifier; 'none' disables quoting
    #[arg(long, value_parser = parse_qualifier)]
    pub qualifier: Option<Qualifier>,
    /// The first row holds data, not column names
    #[arg(long = "no-header")]
    pub no_header: bool,
    /// Number of lines to skip before the header
    #[arg(long = "skip-rows")]
    pub skip_rows: Option<usize>,
    /// Lines starting with this text are ignored
    #[arg(long = "comment")]
    pub comment: Option<String>,
    /// Read at most this many records
    #[arg(long = "record-limit")]
    pub record_limit: Option<usize>,
    /// Character encoding of the input file (detected when omitted)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Schema file with column definitions to apply
    #[arg(short = 'm', long = "schema")]
    pub schema: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qualifier(pub Option<char>);

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub reader: ReaderArgs,
    /// YAML file with inference options; flags below override it
    #[arg(long = "inference")]
    pub inference: Option<PathBuf>,
    /// Distinct values sampled per column
    #[arg(long = "sample-values")]
    pub sample_values: Option<usize>,
    /// Records scanned while sampling (0 means the whole file)
    #[arg(long = "checked-records")]
    pub checked_records: Option<usize>,
    /// Distinct values needed before numbers and dates are guessed
    #[arg(long = "min-samples")]
    pub min_samples: Option<usize>,
    /// Date pattern tried before the built-in ones, e.g. 'dd/MM/yyyy'
    #[arg(long = "date-format")]
    pub date_format: Option<String>,
    /// Pair date columns with separate time and time zone columns
    #[arg(long = "date-parts")]
    pub date_parts: bool,
    /// Write the inferred schema to this YAML file
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// How to print the result
    #[arg(long = "format", value_enum, default_value = "table")]
    pub format: ProbeFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeFormat {
    Table,
    Json,
    Yaml,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub reader: ReaderArgs,
    /// Number of records to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// Infer column formats before displaying
    #[arg(long)]
    pub infer: bool,
    /// Append each column's format to its heading
    #[arg(long = "show-formats")]
    pub show_formats: bool,
}

pub fn parse_delimiter(value: &str) -> Result<char, String> {
    parse_punctuation(value)?.ok_or_else(|| "Delimiter cannot be empty".to_string())
}

pub fn parse_qualifier(value: &str) -> Result<Qualifier, String> {
    if value.trim().eq_ignore_ascii_case("none") {
        return Ok(Qualifier(None));
    }
    parse_punctuation(value).map(Qualifier)
}
