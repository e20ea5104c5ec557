use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::PreviewArgs,
    open_reader,
    options::InferenceOptions,
    schema,
    table::{self, Alignment},
    value_format::DataType,
    warning::LogWarnings,
};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let mut warnings = LogWarnings::new();
    let mut reader = open_reader(&args.reader, &mut warnings)?;
    if args.infer {
        schema::infer_column_formats(&mut reader, &InferenceOptions::default(), &mut warnings)
            .with_context(|| format!("Inferring column formats of {:?}", args.reader.input))?;
    }

    let headers = reader
        .columns()
        .iter()
        .map(|column| {
            if args.show_formats {
                format!("{} ({})", column.destination(), column.format)
            } else {
                column.destination().to_string()
            }
        })
        .collect::<Vec<_>>();
    let alignments = reader
        .columns()
        .iter()
        .map(|column| match column.format.data_type() {
            DataType::Integer | DataType::Double | DataType::Numeric => Alignment::Right,
            _ => Alignment::Left,
        })
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    while rows.len() < args.rows
        && reader
            .read_next_record(&mut warnings)
            .with_context(|| format!("Reading record {}", reader.record_number() + 1))?
    {
        let row = (0..reader.field_count())
            .map(|idx| reader.display(idx))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    table::print_table(&headers, &rows, &alignments);
    info!(
        "Displayed {} row(s) from {:?} with {} warning(s)",
        rows.len(),
        args.reader.input,
        warnings.count()
    );
    Ok(())
}
