//! Property checks for the tokenizer, the row assembler and inference.

mod common;

use std::collections::HashSet;

use common::read_text;
use csv_typed::{
    data::Value,
    inference::guess_value_format,
    options::{InferenceOptions, ReaderOptions},
    value_format::ValueFormat,
    warning::WarningKind,
};
use proptest::prelude::*;

fn plain_options(has_header: bool) -> ReaderOptions {
    ReaderOptions {
        has_field_header: has_header,
        treat_text_as_null: String::new(),
        ..ReaderOptions::default()
    }
}

/// Whole, padded, decimal, exponent and date values kept below the range
/// of spreadsheet serial days.
fn sample_value() -> impl Strategy<Value = String> {
    prop_oneof![
        "-?[1-9][0-9]{0,3}",
        "0[0-9]{1,3}",
        "[1-9][0-9]{0,3}\\.[0-9]{1,3}",
        "[1-9]\\.[0-9]e[1-9]",
        (1u32..13, 1u32..29, 1990u32..2030).prop_map(|(m, d, y)| format!("{m:02}/{d:02}/{y}")),
    ]
}

fn plain_field() -> impl Strategy<Value = String> {
    "[a-z0-9_.:!?-]{1,12}"
}

fn table(width: usize) -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec(plain_field(), width), 1..20)
}

fn quoted_with_csv_writer(rows: &[Vec<String>]) -> String {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row).expect("write record");
    }
    String::from_utf8(writer.into_inner().expect("flush writer")).expect("utf-8")
}

proptest! {
    #[test]
    fn plain_fields_read_back_unchanged(rows in (1usize..6).prop_flat_map(table)) {
        let text: String = rows.iter().map(|row| format!("{}\n", row.join(","))).collect();
        let (reader, read, warnings) = read_text(&text, plain_options(false));

        prop_assert_eq!(reader.field_count(), rows[0].len());
        prop_assert!(warnings.is_empty());
        let expected: Vec<Vec<Option<String>>> = rows
            .iter()
            .map(|row| row.iter().cloned().map(Some).collect())
            .collect();
        prop_assert_eq!(read, expected);
    }

    #[test]
    fn quoted_fields_match_the_csv_crate(
        rows in (1usize..5).prop_flat_map(|width| prop::collection::vec(
            prop::collection::vec("[a-z ,\"\n]{0,10}", width),
            1..10,
        ))
    ) {
        // a leading marker keeps every row non-empty
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|mut row| {
                row[0].insert(0, 'x');
                row
            })
            .collect();
        let text = quoted_with_csv_writer(&rows);
        let (_, read, _) = read_text(&text, plain_options(false));

        let expected: Vec<Vec<Option<String>>> = rows
            .iter()
            .map(|row| row.iter().cloned().map(Some).collect())
            .collect();
        prop_assert_eq!(read, expected);
    }

    #[test]
    fn every_record_has_the_header_width(
        width in 2usize..6,
        widths in prop::collection::vec(1usize..9, 1..15),
    ) {
        let header: Vec<String> = (0..width).map(|i| format!("h{i}")).collect();
        let mut text = format!("{}\n", header.join(","));
        for (row, count) in widths.iter().enumerate() {
            let fields: Vec<String> = (0..*count).map(|i| format!("v{row}x{i}")).collect();
            text.push_str(&fields.join(","));
            text.push('\n');
        }

        let (_, read, warnings) = read_text(&text, plain_options(true));
        for record in &read {
            prop_assert_eq!(record.len(), width);
        }

        let last = widths.len() - 1;
        let marker = widths[last] == 1;
        let expected_records = if marker { widths.len() - 1 } else { widths.len() };
        prop_assert_eq!(read.len(), expected_records);
        let mismatched = widths
            .iter()
            .enumerate()
            .filter(|(row, count)| **count != width && !(marker && *row == last))
            .count();
        prop_assert_eq!(warnings.of_kind(WarningKind::ColumnCount).count(), mismatched);
    }

    #[test]
    fn confirmed_formats_accept_every_sample(
        values in prop::collection::vec(
            prop_oneof![
                "-?[1-9][0-9]{0,6}",
                "[1-9][0-9]{0,3}\\.[0-9]{1,3}",
                (1u32..13, 1u32..29, 1990u32..2030)
                    .prop_map(|(m, d, y)| format!("{m:02}/{d:02}/{y}")),
            ],
            1..30,
        )
    ) {
        let result = guess_value_format(&values, 5, &InferenceOptions::default(), None, None)
            .expect("guess");
        if let Some(format) = result.confirmed() {
            let converter = format.compile().expect("compile");
            for value in &values {
                prop_assert!(
                    converter.convert(value).is_some(),
                    "{} does not accept {}", format, value
                );
            }
        }
    }

    #[test]
    fn adding_accepted_samples_keeps_a_confirmed_format(
        base in prop::collection::vec(sample_value(), 1..15),
        extra in prop::collection::vec(sample_value(), 1..15),
    ) {
        let options = InferenceOptions::default();
        let first = guess_value_format(&base, 5, &options, None, None).expect("guess");
        let Some(format) = first.confirmed() else {
            return Ok(());
        };
        let converter = format.compile().expect("compile");
        let mut grown = base.clone();
        grown.extend(extra.into_iter().filter(|value| converter.convert(value).is_some()));

        let second = guess_value_format(&grown, 5, &options, None, None).expect("guess");
        prop_assert_eq!(second.confirmed(), Some(format));
    }

    #[test]
    fn more_than_two_logical_values_are_never_boolean(
        values in prop::collection::vec(
            prop::sample::select(vec![
                "yes", "No", "TRUE", "false", "y", "n", "1", "0", "on", "off",
                "maybe", "pending", "2", "unknown",
            ]),
            3..20,
        )
    ) {
        let boolean = ValueFormat::Boolean {
            true_value: String::new(),
            false_value: String::new(),
        }
        .compile()
        .expect("compile");
        let logical: HashSet<String> = values
            .iter()
            .map(|v| match boolean.convert(v) {
                Some(Value::Boolean(flag)) => flag.to_string(),
                _ => v.to_lowercase(),
            })
            .collect();
        prop_assume!(logical.len() > 2);

        let samples: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let result = guess_value_format(&samples, 5, &InferenceOptions::default(), None, None)
            .expect("guess");
        prop_assert!(!matches!(result.format(), Some(ValueFormat::Boolean { .. })), "unexpected Boolean format: {:?}", result.format());
    }
}
