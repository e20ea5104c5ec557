use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::{ProbeArgs, ProbeFormat},
    open_reader,
    options::InferenceOptions,
    schema::{self, ColumnReport, InferenceOutcome, Schema},
    table::{self, Alignment},
    warning::LogWarnings,
};

fn inference_options(args: &ProbeArgs) -> Result<InferenceOptions> {
    let mut options = match &args.inference {
        Some(path) => InferenceOptions::load(path)
            .with_context(|| format!("Loading inference options from {path:?}"))?,
        None => InferenceOptions::default(),
    };
    if let Some(sample_values) = args.sample_values {
        options.sample_values = sample_values;
    }
    if let Some(checked_records) = args.checked_records {
        options.checked_records = checked_records;
    }
    if let Some(min_samples) = args.min_samples {
        options.min_samples = min_samples;
    }
    if let Some(date_format) = &args.date_format {
        options.date_format = date_format.clone();
    }
    options.date_parts |= args.date_parts;
    Ok(options)
}

pub fn execute(args: &ProbeArgs) -> Result<()> {
    let options = inference_options(args)?;
    let mut warnings = LogWarnings::new();
    let mut reader = open_reader(&args.reader, &mut warnings)?;
    let report = schema::infer_column_formats(&mut reader, &options, &mut warnings)
        .with_context(|| format!("Inferring column formats of {:?}", args.reader.input))?;
    let schema = Schema::from_reader(&reader);

    match args.format {
        ProbeFormat::Table => print_report(&report.columns),
        ProbeFormat::Json => println!("{}", schema.to_json_string()?),
        ProbeFormat::Yaml => print!("{}", schema.to_yaml_string()?),
    }

    if let Some(path) = &args.output {
        schema
            .save(path)
            .with_context(|| format!("Writing schema to {path:?}"))?;
        info!(
            "Schema for {} column(s) written to {:?}",
            schema.columns.len(),
            path
        );
    }
    info!(
        "Probed {} record(s) of {:?} with {} warning(s)",
        report.records_read,
        args.reader.input,
        warnings.count()
    );
    Ok(())
}

fn describe_outcome(outcome: &InferenceOutcome) -> String {
    match outcome {
        InferenceOutcome::Skipped(reason) => format!("skipped ({reason})"),
        InferenceOutcome::Empty => "no values".to_string(),
        InferenceOutcome::Confirmed => "confirmed".to_string(),
        InferenceOutcome::Possible { matched, examined } => {
            format!("possible ({matched} of {examined})")
        }
        InferenceOutcome::Text { uniform_shape } => match uniform_shape {
            Some(shape) => format!("text, shape {shape}"),
            None => "text".to_string(),
        },
    }
}

fn print_report(columns: &[ColumnReport]) {
    let headers = ["#", "Column", "Format", "Result", "Samples", "Example", "Note"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = columns
        .iter()
        .map(|column| {
            vec![
                (column.ordinal + 1).to_string(),
                column.name.clone(),
                column.format.to_string(),
                describe_outcome(&column.outcome),
                column.samples.to_string(),
                column.example.clone().unwrap_or_default(),
                column.note.clone().unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    let alignments = [
        Alignment::Right,
        Alignment::Left,
        Alignment::Left,
        Alignment::Left,
        Alignment::Right,
    ];
    table::print_table(&headers, &rows, &alignments);
}
