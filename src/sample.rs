//! Distinct value sampling for format inference.

use std::collections::HashSet;

use log::debug;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{
    error::Result, options::InferenceOptions, reader::CsvReader, warning::WarningSink,
};

/// Fixed so repeated inference over the same file yields the same order.
const SHUFFLE_SEED: u64 = 0x5eed_ca11;

/// Distinct sample values per column.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    /// Indexed by column ordinal; columns that were not sampled stay empty.
    pub values: Vec<Vec<String>>,
    pub records_read: usize,
}

impl SampleSet {
    pub fn column(&self, idx: usize) -> &[String] {
        self.values.get(idx).map(Vec::as_slice).unwrap_or_default()
    }
}

struct ColumnSampler {
    seen: HashSet<String>,
    values: Vec<String>,
}

/// Collects up to `sample_values` distinct non-empty values for each column
/// in `columns`, reading at most `checked_records` records.
///
/// Sampling starts at the reader's current record. On a resettable source
/// that was already past the first record, reaching the end rewinds to the
/// first data row and sampling continues until the start record comes
/// around again. The reader is left wherever sampling stopped.
pub fn collect_samples(
    reader: &mut CsvReader,
    columns: &[usize],
    options: &InferenceOptions,
    sink: &mut dyn WarningSink,
) -> Result<SampleSet> {
    let field_count = reader.field_count();
    let mut samplers: Vec<Option<ColumnSampler>> = (0..field_count).map(|_| None).collect();
    for idx in columns.iter().filter(|idx| **idx < field_count) {
        samplers[*idx] = Some(ColumnSampler {
            seen: HashSet::new(),
            values: Vec::new(),
        });
    }

    let start_record = reader.record_number();
    let mut wrapped = false;
    let mut records_read = 0usize;
    let limit = options.sample_values.max(1);

    loop {
        if options.checked_records > 0 && records_read >= options.checked_records {
            break;
        }
        if wrapped && reader.record_number() >= start_record {
            break;
        }
        let complete = samplers
            .iter()
            .flatten()
            .all(|sampler| sampler.values.len() >= limit);
        if complete {
            break;
        }

        if !reader.read_next_record(sink)? {
            if !wrapped && start_record > 0 && reader.is_resettable() {
                debug!("Sampling wraps around to the first record");
                reader.reset()?;
                wrapped = true;
                continue;
            }
            break;
        }
        records_read += 1;

        for (idx, sampler) in samplers.iter_mut().enumerate() {
            let Some(sampler) = sampler else {
                continue;
            };
            if sampler.values.len() >= limit {
                continue;
            }
            let Some(text) = reader.raw(idx)?.map(str::trim) else {
                continue;
            };
            if !text.is_empty() && sampler.seen.insert(text.to_string()) {
                sampler.values.push(text.to_string());
            }
        }
    }

    let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
    let values = samplers
        .into_iter()
        .map(|sampler| {
            let mut values = sampler.map(|s| s.values).unwrap_or_default();
            values.shuffle(&mut rng);
            values
        })
        .collect();
    debug!("Collected samples from {records_read} records");
    Ok(SampleSet {
        values,
        records_read,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::ReaderOptions, warning::IgnoreWarnings};

    fn reader(text: &str) -> CsvReader {
        CsvReader::from_text(text, ReaderOptions::default(), &[], &mut IgnoreWarnings)
            .expect("open")
    }

    fn sorted(values: &[String]) -> Vec<&str> {
        let mut values: Vec<&str> = values.iter().map(String::as_str).collect();
        values.sort();
        values
    }

    #[test]
    fn collects_distinct_non_empty_values() {
        let mut reader = reader("a,b\n1,x\n1,\n2,y\nNULL,x\n");
        let samples = collect_samples(
            &mut reader,
            &[0, 1],
            &InferenceOptions::default(),
            &mut IgnoreWarnings,
        )
        .expect("samples");
        assert_eq!(samples.records_read, 4);
        assert_eq!(sorted(samples.column(0)), vec!["1", "2"]);
        assert_eq!(sorted(samples.column(1)), vec!["x", "y"]);
    }

    #[test]
    fn stops_at_checked_records_and_sample_limit() {
        let mut reader = reader("a\n1\n2\n3\n4\n5\n");
        let options = InferenceOptions {
            checked_records: 3,
            ..InferenceOptions::default()
        };
        let samples =
            collect_samples(&mut reader, &[0], &options, &mut IgnoreWarnings).expect("samples");
        assert_eq!(samples.records_read, 3);

        let mut reader = self::reader("a\n1\n2\n3\n4\n5\n");
        let options = InferenceOptions {
            sample_values: 2,
            ..InferenceOptions::default()
        };
        let samples =
            collect_samples(&mut reader, &[0], &options, &mut IgnoreWarnings).expect("samples");
        assert_eq!(samples.column(0).len(), 2);
        assert_eq!(samples.records_read, 2);
    }

    #[test]
    fn wraps_around_from_the_middle() {
        let mut reader = reader("a\n1\n2\n3\n4\n");
        assert!(reader.read_next_record(&mut IgnoreWarnings).unwrap());
        assert!(reader.read_next_record(&mut IgnoreWarnings).unwrap());
        let samples = collect_samples(
            &mut reader,
            &[0],
            &InferenceOptions::default(),
            &mut IgnoreWarnings,
        )
        .expect("samples");
        assert_eq!(sorted(samples.column(0)), vec!["1", "2", "3", "4"]);
        assert_eq!(samples.records_read, 4);
    }

    #[test]
    fn shuffle_is_deterministic() {
        let text = (0..50).fold(String::from("a\n"), |mut acc, n| {
            acc.push_str(&format!("{n}\n"));
            acc
        });
        let first = collect_samples(
            &mut reader(&text),
            &[0],
            &InferenceOptions::default(),
            &mut IgnoreWarnings,
        )
        .expect("samples");
        let second = collect_samples(
            &mut reader(&text),
            &[0],
            &InferenceOptions::default(),
            &mut IgnoreWarnings,
        )
        .expect("samples");
        assert_eq!(first.values, second.values);
    }
}
