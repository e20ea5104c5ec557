//! Schema model, inference orchestration and YAML persistence.
//!
//! This module owns the [`Schema`] struct (the persisted list of typed
//! [`Column`] definitions) and [`infer_column_formats`], which samples an
//! open [`CsvReader`], guesses a format per column and commits all formats
//! to the reader in one step.
//!
//! ## Responsibilities
//!
//! - Sampling and per-column format guessing with date carry-forward
//! - Skipping id-like columns
//! - Pairing date-only columns with a time and a time zone column
//! - YAML schema loading and saving via `serde_yaml`, JSON output via `serde_json`

use std::{fs::File, io::BufReader, path::Path};

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    columns::Column,
    date_pattern::DatePattern,
    error::{ReaderError, Result},
    inference::{CheckResult, guess_value_format},
    options::InferenceOptions,
    reader::CsvReader,
    sample::{SampleSet, collect_samples},
    value_format::ValueFormat,
    warning::WarningSink,
};

pub const CURRENT_SCHEMA_VERSION: &str = "1.0";

const TIME_OF_DAY: &str = r"^([01]?\d|2[0-3]):[0-5]\d(:[0-5]\d)?$";
const TIME_ZONE_NAMES: &[&str] = &["timezone", "time zone", "timezoneid"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default = "Schema::default_has_field_header")]
    pub has_field_header: bool,
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn from_reader(reader: &CsvReader) -> Self {
        Schema {
            schema_version: Some(CURRENT_SCHEMA_VERSION.to_string()),
            has_field_header: reader.options().has_field_header,
            columns: reader.columns().to_vec(),
        }
    }

    pub const fn default_has_field_header() -> bool {
        true
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(&self.versioned())
            .map_err(|err| ReaderError::Serialization(err.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.versioned())
            .map_err(|err| ReaderError::Serialization(err.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| ReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::to_writer(file, &self.versioned()).map_err(|err| ReaderError::Schema {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| ReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut schema: Schema =
            serde_yaml::from_reader(BufReader::new(file)).map_err(|err| ReaderError::Schema {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        for (ordinal, column) in schema.columns.iter_mut().enumerate() {
            column.ordinal = ordinal;
            column.format.compile().map_err(|err| ReaderError::Schema {
                path: path.to_path_buf(),
                message: format!("column '{}': {err}", column.name),
            })?;
        }
        Ok(schema)
    }

    fn versioned(&self) -> Schema {
        let mut schema = self.clone();
        if schema.schema_version.is_none() {
            schema.schema_version = Some(CURRENT_SCHEMA_VERSION.to_string());
        }
        schema
    }
}

/// How the format of one column was decided.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    /// Not sampled: ignored, id-like or already typed by a supplied
    /// definition.
    Skipped(String),
    /// No sample values.
    Empty,
    Confirmed,
    Possible { matched: usize, examined: usize },
    Text { uniform_shape: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ColumnReport {
    pub ordinal: usize,
    pub name: String,
    pub format: ValueFormat,
    pub outcome: InferenceOutcome,
    pub samples: usize,
    pub example: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InferenceReport {
    pub records_read: usize,
    pub columns: Vec<ColumnReport>,
}

impl InferenceReport {
    pub fn column(&self, name: &str) -> Option<&ColumnReport> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// `id`, `Id`/`ID` suffixes and `_id`, ` id`, `-id` endings.
pub fn is_id_column(name: &str) -> bool {
    let trimmed = name.trim();
    let lower = trimmed.to_lowercase();
    lower == "id"
        || trimmed.ends_with("Id")
        || trimmed.ends_with("ID")
        || ["_id", " id", "-id"].iter().any(|suffix| lower.ends_with(suffix))
}

/// Samples the reader, guesses a format for every text column and applies
/// all formats at once.
///
/// Columns with a non-text format (from supplied definitions) keep it. On a
/// resettable source the reader is rewound to the first data row
/// afterwards. Nothing is applied when inference fails or is cancelled.
pub fn infer_column_formats(
    reader: &mut CsvReader,
    options: &InferenceOptions,
    sink: &mut dyn WarningSink,
) -> Result<InferenceReport> {
    let mut columns = reader.columns().to_vec();
    let cancel = reader.cancellation().cloned();

    let mut reports: Vec<ColumnReport> = columns
        .iter()
        .map(|column| ColumnReport {
            ordinal: column.ordinal,
            name: column.name.clone(),
            format: column.format.clone(),
            outcome: InferenceOutcome::Empty,
            samples: 0,
            example: None,
            note: None,
        })
        .collect();

    let mut sampled = Vec::new();
    for (idx, column) in columns.iter().enumerate() {
        let reason = if column.ignore {
            Some("ignored")
        } else if !column.format.is_text() {
            Some("format supplied")
        } else if options.ignore_id_columns && is_id_column(&column.name) {
            Some("id column")
        } else {
            None
        };
        match reason {
            Some(reason) => reports[idx].outcome = InferenceOutcome::Skipped(reason.to_string()),
            None => sampled.push(idx),
        }
    }

    let samples = collect_samples(reader, &sampled, options, sink)?;

    let mut previous_date: Option<ValueFormat> = None;
    for idx in sampled {
        let values = samples.column(idx);
        let report = &mut reports[idx];
        report.samples = values.len();
        report.example = values.first().cloned();
        if values.is_empty() {
            continue;
        }
        let result = guess_value_format(
            values,
            options.min_samples,
            options,
            previous_date.as_ref(),
            cancel.as_ref(),
        )?;
        report.outcome = match &result {
            CheckResult::Confirmed(_) => InferenceOutcome::Confirmed,
            CheckResult::Possible {
                matched, examined, ..
            } => InferenceOutcome::Possible {
                matched: *matched,
                examined: *examined,
            },
            CheckResult::NoMatch { uniform_shape } => InferenceOutcome::Text {
                uniform_shape: uniform_shape.clone(),
            },
        };
        if let Some(format) = result.format() {
            debug!("Column '{}' guessed as {format}", columns[idx].name);
            if matches!(format, ValueFormat::DateTime { .. }) {
                previous_date = Some(format.clone());
            }
            columns[idx].format = format.clone();
            report.format = format.clone();
        }
    }

    if options.date_parts {
        pair_date_parts(&mut columns, &samples, &mut reports)?;
    }

    reader.apply_columns(columns)?;
    if reader.is_resettable() {
        reader.reset()?;
    } else {
        warn!(
            "Input cannot be rewound; the {} records used for sampling are not read again",
            samples.records_read
        );
    }
    info!(
        "Inferred formats for {} column(s) from {} record(s)",
        reports.len(),
        samples.records_read
    );
    Ok(InferenceReport {
        records_read: samples.records_read,
        columns: reports,
    })
}

fn is_date_only(format: &ValueFormat) -> Result<bool> {
    Ok(match format.date_pattern() {
        Some(pattern) => {
            let pattern = DatePattern::compile(pattern)?;
            pattern.has_date() && !pattern.has_time()
        }
        None => false,
    })
}

/// Time pattern readable from a column, if it holds times of day.
fn time_part_format(
    column: &Column,
    samples: &[String],
    time_of_day: &Regex,
) -> Result<Option<String>> {
    if let Some(pattern) = column.format.date_pattern() {
        let compiled = DatePattern::compile(pattern)?;
        if compiled.has_time() && !compiled.has_date() {
            return Ok(Some(pattern.to_string()));
        }
        return Ok(None);
    }
    if !column.format.is_text() || samples.is_empty() {
        return Ok(None);
    }
    let length = samples[0].chars().count();
    let uniform = samples
        .iter()
        .all(|s| s.chars().count() == length && time_of_day.is_match(s));
    Ok(match (uniform, length) {
        (true, 5) => Some("HH:mm".to_string()),
        (true, 8) => Some("HH:mm:ss".to_string()),
        _ => None,
    })
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    let (base, tail) = (name.get(..split)?, name.get(split..)?);
    tail.eq_ignore_ascii_case(suffix).then_some(base)
}

fn pair_date_parts(
    columns: &mut [Column],
    samples: &SampleSet,
    reports: &mut [ColumnReport],
) -> Result<()> {
    let time_of_day =
        Regex::new(TIME_OF_DAY).map_err(|err| ReaderError::configuration(err.to_string()))?;
    let zone = columns.iter().position(|c| {
        TIME_ZONE_NAMES
            .iter()
            .any(|name| c.name.trim().eq_ignore_ascii_case(name))
    });

    for idx in 0..columns.len() {
        if columns[idx].ignore
            || columns[idx].time_part.is_some()
            || !is_date_only(&columns[idx].format)?
        {
            continue;
        }

        let by_name = strip_suffix_ignore_case(columns[idx].name.trim(), "date")
            .filter(|base| !base.trim().is_empty())
            .and_then(|base| {
                columns.iter().position(|other| {
                    other.ordinal != columns[idx].ordinal
                        && strip_suffix_ignore_case(other.name.trim(), "time")
                            .is_some_and(|other_base| other_base.eq_ignore_ascii_case(base))
                })
            });
        let candidates = by_name.into_iter().chain(Some(idx + 1));

        let mut paired = None;
        for time_idx in candidates {
            let Some(time_column) = columns.get(time_idx) else {
                continue;
            };
            if time_column.ignore {
                continue;
            }
            if let Some(format) = time_part_format(time_column, samples.column(time_idx), &time_of_day)?
            {
                paired = Some((time_idx, format));
                break;
            }
        }

        let Some((time_idx, format)) = paired else {
            continue;
        };
        let time_name = columns[time_idx].name.clone();
        columns[idx].time_part = Some(time_name.clone());
        columns[idx].time_part_format = format;
        let mut note = format!("time part from '{time_name}'");
        if let Some(zone_idx) = zone.filter(|z| *z != idx && *z != time_idx) {
            let zone_name = columns[zone_idx].name.clone();
            note.push_str(&format!(", time zone from '{zone_name}'"));
            columns[idx].time_zone_part = Some(zone_name);
        }
        debug!("Column '{}': {note}", columns[idx].name);
        reports[idx].note = Some(note);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::ReaderOptions, value_format::DataType, warning::IgnoreWarnings};

    fn reader(text: &str) -> CsvReader {
        CsvReader::from_text(text, ReaderOptions::default(), &[], &mut IgnoreWarnings)
            .expect("open")
    }

    fn options() -> InferenceOptions {
        InferenceOptions {
            min_samples: 2,
            ..InferenceOptions::default()
        }
    }

    #[test]
    fn id_column_names() {
        for name in ["id", "ID", "CustomerId", "OrderID", "order_id", "order id", "order-id"] {
            assert!(is_id_column(name), "{name}");
        }
        for name in ["paid", "Identity", "valid"] {
            assert!(!is_id_column(name), "{name}");
        }
    }

    #[test]
    fn infers_commits_and_rewinds() {
        let mut reader = reader("id,amount,flag\n1,1.5,yes\n2,2.25,no\n3,3,yes\n");
        let report =
            infer_column_formats(&mut reader, &options(), &mut IgnoreWarnings).expect("infer");
        assert_eq!(report.records_read, 3);
        assert!(matches!(
            report.columns[0].outcome,
            InferenceOutcome::Skipped(_)
        ));
        assert_eq!(reader.columns()[1].format.data_type(), DataType::Numeric);
        assert_eq!(reader.columns()[2].format.data_type(), DataType::Boolean);

        assert!(reader.read_next_record(&mut IgnoreWarnings).unwrap());
        assert_eq!(reader.record_number(), 1);
        assert!(reader.get_bool(2).unwrap());
    }

    #[test]
    fn date_format_carries_forward() {
        let mut reader = reader("start,end\n31.12.2020,01.01.2021\n15.01.2021,02.01.2021\n");
        infer_column_formats(&mut reader, &options(), &mut IgnoreWarnings).expect("infer");
        let expected = ValueFormat::date_time("dd/MM/yyyy", '.');
        assert_eq!(reader.columns()[0].format, expected);
        assert_eq!(reader.columns()[1].format, expected);
    }

    #[test]
    fn date_and_time_columns_are_paired() {
        let mut reader = reader(
            "ShipDate,Amount,ShipTime,TimeZone\n\
             2024/01/02,1,10:30,UTC\n\
             2024/01/03,2,11:45,+01:00\n",
        );
        let options = InferenceOptions {
            date_parts: true,
            ..options()
        };
        let report = infer_column_formats(&mut reader, &options, &mut IgnoreWarnings).expect("infer");
        let date = &reader.columns()[0];
        assert_eq!(date.time_part.as_deref(), Some("ShipTime"));
        assert_eq!(date.time_part_format, "HH:mm");
        assert_eq!(date.time_zone_part.as_deref(), Some("TimeZone"));
        assert!(report.columns[0].note.is_some());

        assert!(reader.read_next_record(&mut IgnoreWarnings).unwrap());
        let stamp = reader.get_datetime(0).unwrap();
        assert_eq!(stamp.format("%Y-%m-%d %H:%M").to_string(), "2024-01-02 10:30");
    }

    #[test]
    fn schema_round_trips_through_yaml() {
        let mut reader = reader("amount\n1\n2\n");
        infer_column_formats(&mut reader, &options(), &mut IgnoreWarnings).expect("infer");
        let schema = Schema::from_reader(&reader);
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("schema.yml");
        schema.save(&path).expect("save");
        let loaded = Schema::load(&path).expect("load");
        assert_eq!(loaded, schema);
        assert!(schema.to_json_string().unwrap().contains("\"integer\""));
    }
}
