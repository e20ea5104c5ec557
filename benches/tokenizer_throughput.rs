use std::fmt::Write as _;
use std::hint::black_box;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use csv_typed::columns::Column;
use csv_typed::options::{InferenceOptions, ReaderOptions};
use csv_typed::reader::CsvReader;
use csv_typed::schema;
use csv_typed::value_format::ValueFormat;
use csv_typed::warning::IgnoreWarnings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STATUSES: &[&str] = &["shipped", "pending", "processing", "on hold"];

fn generate_orders(rows: usize) -> String {
    let mut rng = StdRng::seed_from_u64(42);
    let mut text = String::from("id,ordered_at,status,amount,note\n");
    for i in 0..rows {
        let day = rng.random_range(1..=28);
        let month = rng.random_range(1..=12);
        let status = STATUSES[rng.random_range(0..STATUSES.len())];
        let amount: f64 = rng.random_range(1.0..25_000.0);
        let note = if rng.random_bool(0.1) {
            "\"left at door, signed\""
        } else {
            ""
        };
        let _ = writeln!(
            text,
            "{i},{month:02}/{day:02}/2024,{status},{amount:.2},{note}"
        );
    }
    text
}

fn typed_columns() -> Vec<Column> {
    vec![
        Column::new(0, "id").with_format(ValueFormat::Integer {
            group_separator: None,
        }),
        Column::new(1, "ordered_at").with_format(ValueFormat::date_time("MM/dd/yyyy", '/')),
        Column::new(2, "status"),
        Column::new(3, "amount").with_format(ValueFormat::Numeric {
            decimal_separator: '.',
            group_separator: None,
        }),
        Column::new(4, "note"),
    ]
}

fn read_everything(text: &str, supplied: &[Column]) -> usize {
    let mut sink = IgnoreWarnings;
    let mut reader = CsvReader::from_text(text, ReaderOptions::default(), supplied, &mut sink)
        .expect("open reader");
    let mut records = 0;
    while reader.read_next_record(&mut sink).expect("read record") {
        records += 1;
    }
    records
}

fn bench_reader(c: &mut Criterion) {
    let text = generate_orders(50_000);
    let supplied = typed_columns();

    let mut group = c.benchmark_group("reader");
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("raw_fields", |b| {
        b.iter(|| black_box(read_everything(&text, &[])));
    });

    group.bench_function("typed_fields", |b| {
        b.iter(|| black_box(read_everything(&text, &supplied)));
    });

    group.bench_function("infer_then_read", |b| {
        b.iter_batched(
            || {
                let mut sink = IgnoreWarnings;
                CsvReader::from_text(text.as_str(), ReaderOptions::default(), &[], &mut sink)
                    .expect("open reader")
            },
            |mut reader| {
                let mut sink = IgnoreWarnings;
                schema::infer_column_formats(&mut reader, &InferenceOptions::default(), &mut sink)
                    .expect("infer");
                while reader.read_next_record(&mut sink).expect("read record") {}
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_reader);
criterion_main!(benches);
