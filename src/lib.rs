pub mod cancel;
pub mod cli;
pub mod columns;
pub mod data;
pub mod date_pattern;
pub mod error;
pub mod inference;
pub mod io_utils;
pub mod number;
pub mod options;
pub mod preview;
pub mod probe;
pub mod reader;
pub mod realign;
pub mod sample;
pub mod schema;
pub mod source;
pub mod table;
pub mod tokenizer;
pub mod value_format;
pub mod warning;

use std::{env, io, sync::OnceLock, thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, warn};

use crate::{
    cli::{Cli, Commands, ReaderArgs},
    error::ReaderError,
    options::{ReaderOptions, describe_char},
    reader::CsvReader,
    schema::Schema,
    warning::WarningSink,
};

static LOGGER: OnceLock<()> = OnceLock::new();

/// Attempts made to open an input that fails with an I/O error.
const OPEN_ATTEMPTS: usize = 3;
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(250);

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_typed", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => probe::execute(&args),
        Commands::Preview(args) => preview::execute(&args),
    }
}

/// Builds reader options from an optional options file and the command
/// line overrides.
pub(crate) fn reader_options(args: &ReaderArgs, schema: Option<&Schema>) -> Result<ReaderOptions> {
    let mut options = match &args.options {
        Some(path) => ReaderOptions::load(path)
            .with_context(|| format!("Loading reader options from {path:?}"))?,
        None => ReaderOptions::default(),
    };
    let from_file = args.options.as_ref().map(|_| options.field_delimiter);
    options.field_delimiter =
        io_utils::resolve_input_delimiter(&args.input, args.delimiter.or(from_file));
    if let Some(qualifier) = args.qualifier {
        options.field_qualifier = qualifier.0;
    }
    if let Some(schema) = schema {
        options.has_field_header = schema.has_field_header;
    }
    if args.no_header {
        options.has_field_header = false;
    }
    if let Some(skip_rows) = args.skip_rows {
        options.skip_rows = skip_rows;
    }
    if let Some(comment) = &args.comment {
        options.comment_line = comment.clone();
    }
    if let Some(limit) = args.record_limit {
        options.record_limit = limit;
    }
    options.validate().context("Validating reader options")?;
    Ok(options)
}

/// Opens the input named by `args`, applying a schema file when given.
pub(crate) fn open_reader(args: &ReaderArgs, sink: &mut dyn WarningSink) -> Result<CsvReader> {
    let schema = match &args.schema {
        Some(path) => {
            Some(Schema::load(path).with_context(|| format!("Loading schema from {path:?}"))?)
        }
        None => None,
    };
    let options = reader_options(args, schema.as_ref())?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let supplied = schema.map(|schema| schema.columns).unwrap_or_default();
    debug!(
        "Opening {:?} with delimiter {} and {} supplied column(s)",
        args.input,
        describe_char(options.field_delimiter),
        supplied.len()
    );

    io_utils::open_with_retry(
        || CsvReader::from_path(&args.input, options.clone(), encoding, &supplied, &mut *sink),
        |attempt, err| {
            let missing = matches!(
                err,
                ReaderError::Open { source, .. } if source.kind() == io::ErrorKind::NotFound
            );
            if missing || attempt >= OPEN_ATTEMPTS {
                return false;
            }
            warn!("Opening {:?} failed ({err}), retrying", args.input);
            thread::sleep(OPEN_RETRY_DELAY);
            true
        },
    )
    .with_context(|| format!("Opening {:?}", args.input))
}
