//! Format inference for a single column.
//!
//! [`guess_value_format`] runs the checks in a fixed priority order and
//! stops at the first format every sample satisfies. When nothing fits all
//! samples the best candidate that fits a majority is reported as
//! [`CheckResult::Possible`].

use std::collections::HashMap;

use chrono::{Datelike, Local};
use log::debug;

use crate::{
    cancel::CancellationToken,
    data::{Value, parse_guid},
    date_pattern::{
        DatePattern, SERIAL_DATE, SERIAL_MAX, SERIAL_MIN, datetime_to_serial, serial_to_datetime,
    },
    error::Result,
    number::{self, NumberRules, Scaling},
    options::InferenceOptions,
    value_format::{Converter, ValueFormat},
};

/// Patterns tried after the configured `date_format`, most specific first.
/// `/` stands for the date separator, `:` for the time separator.
pub const STANDARD_DATE_FORMATS: &[&str] = &[
    "yyyyMMdd",
    "yyyy/MM/dd",
    "yyyy/M/d",
    "MM/dd/yyyy",
    "M/d/yyyy",
    "dd/MM/yyyy",
    "d/M/yyyy",
    "MM/dd/yy",
    "dd/MM/yy",
    "M/d/yy",
    "d/M/yy",
    "yyyy/MM/ddTHH:mm:ss",
    "yyyy/MM/dd HH:mm:ss",
    "yyyy/MM/dd HH:mm",
    "MM/dd/yyyy HH:mm:ss",
    "MM/dd/yyyy HH:mm",
    "M/d/yyyy h:mm:ss tt",
    "M/d/yyyy h:mm tt",
    "dd/MM/yyyy HH:mm:ss",
    "dd/MM/yyyy HH:mm",
    "yyyy/MM/ddTHH:mm:ss.fff",
    "yyyy/MM/dd HH:mm:ss.fff",
    "d MMM yyyy",
    "dd MMM yyyy",
    "MMM d, yyyy",
    "MMMM d, yyyy",
    "d MMMM yyyy",
    "dddd, MMMM d, yyyy",
    "HH:mm:ss",
    "HH:mm",
    "h:mm tt",
    "h:mm:ss tt",
];

const DATE_SEPARATORS: [char; 3] = ['/', '.', '-'];
const DECIMAL_SEPARATORS: [char; 2] = ['.', ','];
const GROUP_SEPARATORS: [char; 5] = [',', '.', ' ', '\'', '\u{00A0}'];
/// Serial dates need more than this many samples.
const SERIAL_MIN_SAMPLES: usize = 10;
const SERIAL_YEARS_BACK: i32 = 80;
const SERIAL_YEARS_AHEAD: i32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    /// Every sample matched.
    Confirmed(ValueFormat),
    /// More than half of the examined samples matched.
    Possible {
        format: ValueFormat,
        matched: usize,
        examined: usize,
    },
    /// Plain text. `uniform_shape` is set when every sample has the same
    /// character shape, e.g. `AA-999`.
    NoMatch { uniform_shape: Option<String> },
}

impl CheckResult {
    pub fn confirmed(&self) -> Option<&ValueFormat> {
        match self {
            CheckResult::Confirmed(format) => Some(format),
            _ => None,
        }
    }

    /// The format worth applying: confirmed or possible.
    pub fn format(&self) -> Option<&ValueFormat> {
        match self {
            CheckResult::Confirmed(format) | CheckResult::Possible { format, .. } => Some(format),
            CheckResult::NoMatch { .. } => None,
        }
    }
}

/// Best partial match seen so far.
#[derive(Debug, Default)]
struct Candidates {
    best: Option<(ValueFormat, usize, usize)>,
}

impl Candidates {
    fn offer(&mut self, format: &ValueFormat, matched: usize, examined: usize) {
        if matched == 0 || matched * 2 <= examined {
            return;
        }
        let better = match &self.best {
            Some((_, best, _)) => matched > *best,
            None => true,
        };
        if better {
            self.best = Some((format.clone(), matched, examined));
        }
    }
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) => token.check(),
        None => Ok(()),
    }
}

/// Guesses the format of a column from distinct sample values.
///
/// `previous_date` is the date format found for an earlier column; it is
/// tried before the more expensive checks.
pub fn guess_value_format(
    samples: &[String],
    min_samples: usize,
    options: &InferenceOptions,
    previous_date: Option<&ValueFormat>,
    cancel: Option<&CancellationToken>,
) -> Result<CheckResult> {
    let samples: Vec<&str> = samples
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if samples.is_empty() {
        return Ok(CheckResult::NoMatch {
            uniform_shape: None,
        });
    }

    if options.detect_boolean
        && let Some(format) = check_boolean(&samples, options)?
    {
        return Ok(CheckResult::Confirmed(format));
    }
    check_cancelled(cancel)?;

    if options.detect_guid && samples.iter().all(|s| parse_guid(s).is_some()) {
        return Ok(CheckResult::Confirmed(ValueFormat::Guid));
    }

    if options.detect_date_time
        && let Some(previous) = previous_date
        && let Some(format) = check_carried_date(&samples, previous)?
    {
        debug!("Date format {format} carried forward");
        return Ok(CheckResult::Confirmed(format));
    }

    let mut candidates = Candidates::default();

    if samples.len() >= min_samples {
        if options.detect_date_time
            && samples
                .iter()
                .all(|s| s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()))
        {
            let format = ValueFormat::date_time("yyyyMMdd", '/');
            let (matched, examined) = count_matches(&samples, &format.compile()?);
            if matched == examined {
                return Ok(CheckResult::Confirmed(format));
            }
            candidates.offer(&format, matched, examined);
        }

        if options.detect_date_time
            && options.serial_date_time
            && samples.len() > SERIAL_MIN_SAMPLES
            && all_serial(&samples, recent_serial_range())
        {
            return Ok(CheckResult::Confirmed(ValueFormat::date_time(SERIAL_DATE, '/')));
        }

        if options.detect_numbers
            && let Some(format) = check_numbers(&samples, options, &mut candidates, cancel)?
        {
            return Ok(CheckResult::Confirmed(format));
        }

        if options.detect_date_time
            && let Some(format) = check_dates(&samples, options, &mut candidates, cancel)?
        {
            return Ok(CheckResult::Confirmed(format));
        }
    }

    if options.detect_date_time
        && options.serial_date_time
        && !options.detect_numbers
        && all_serial(&samples, (SERIAL_MIN, SERIAL_MAX))
    {
        return Ok(CheckResult::Confirmed(ValueFormat::date_time(SERIAL_DATE, '/')));
    }

    if let Some((format, matched, examined)) = candidates.best {
        return Ok(CheckResult::Possible {
            format,
            matched,
            examined,
        });
    }

    Ok(CheckResult::NoMatch {
        uniform_shape: uniform_shape(&samples),
    })
}

fn count_matches(samples: &[&str], converter: &Converter) -> (usize, usize) {
    let matched = samples
        .iter()
        .filter(|s| converter.convert(s).is_some())
        .count();
    (matched, samples.len())
}

/// Every sample resolves to true or false, so at most two logical values
/// are present however many literals spell them. The first observed
/// literal of each side becomes the format's literal.
fn check_boolean(samples: &[&str], options: &InferenceOptions) -> Result<Option<ValueFormat>> {
    let probe = ValueFormat::Boolean {
        true_value: options.true_value.clone(),
        false_value: options.false_value.clone(),
    }
    .compile()?;

    let mut true_value = None;
    let mut false_value = None;
    for sample in samples {
        match probe.convert(sample) {
            Some(Value::Boolean(true)) => {
                true_value.get_or_insert_with(|| sample.to_string());
            }
            Some(Value::Boolean(false)) => {
                false_value.get_or_insert_with(|| sample.to_string());
            }
            _ => return Ok(None),
        }
    }
    let configured = |literals: &str, fallback: &str| {
        literals
            .split(';')
            .map(str::trim)
            .find(|token| !token.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };
    Ok(Some(ValueFormat::Boolean {
        true_value: true_value.unwrap_or_else(|| configured(&options.true_value, "True")),
        false_value: false_value.unwrap_or_else(|| configured(&options.false_value, "False")),
    }))
}

fn check_carried_date(samples: &[&str], previous: &ValueFormat) -> Result<Option<ValueFormat>> {
    let ValueFormat::DateTime { date_format, .. } = previous else {
        return Ok(None);
    };
    if date_format != SERIAL_DATE {
        let pattern = DatePattern::compile(date_format)?;
        let (min, max) = pattern.length_range();
        let first = samples[0].chars().count();
        if first < min || first > max {
            return Ok(None);
        }
    }
    let (matched, examined) = count_matches(samples, &previous.compile()?);
    Ok((matched == examined).then(|| previous.clone()))
}

/// Serial day numbers for dates from 80 years ago to 20 years ahead.
fn recent_serial_range() -> (f64, f64) {
    let today = Local::now().date_naive();
    let bound = |years: i32| {
        today
            .with_year(today.year() + years)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|stamp| datetime_to_serial(&stamp))
    };
    match (bound(-SERIAL_YEARS_BACK), bound(SERIAL_YEARS_AHEAD)) {
        (Some(low), Some(high)) => (low, high),
        _ => (SERIAL_MIN, SERIAL_MAX),
    }
}

fn all_serial(samples: &[&str], (low, high): (f64, f64)) -> bool {
    samples.iter().all(|sample| {
        sample
            .parse::<f64>()
            .ok()
            .filter(|serial| (low..=high).contains(serial))
            .and_then(serial_to_datetime)
            .is_some()
    })
}

/// Candidate characters ordered by how many samples contain them; equal
/// counts keep declaration order.
fn separators_by_use(samples: &[&str], candidates: &[char]) -> Vec<char> {
    let mut used: Vec<(char, usize)> = candidates
        .iter()
        .map(|c| (*c, samples.iter().filter(|s| s.contains(*c)).count()))
        .filter(|(_, count)| *count > 0)
        .collect();
    used.sort_by(|a, b| b.1.cmp(&a.1));
    used.into_iter().map(|(c, _)| c).collect()
}

fn check_numbers(
    samples: &[&str],
    options: &InferenceOptions,
    candidates: &mut Candidates,
    cancel: Option<&CancellationToken>,
) -> Result<Option<ValueFormat>> {
    let mut decimals = separators_by_use(samples, &DECIMAL_SEPARATORS);
    if !decimals.contains(&'.') {
        decimals.push('.');
    }
    let mut groups: Vec<Option<char>> = vec![None];
    groups.extend(separators_by_use(samples, &GROUP_SEPARATORS).into_iter().map(Some));

    for decimal in &decimals {
        for group in &groups {
            if *group == Some(*decimal) {
                continue;
            }
            check_cancelled(cancel)?;
            let rules = NumberRules {
                decimal_separator: *decimal,
                group_separator: *group,
                allow_scaling: options.detect_percentage,
                strip_currency: options.remove_currency_symbols,
            };

            let mut matched = 0usize;
            let mut zero_padded = 0usize;
            let mut integer = true;
            let mut exponent = false;
            let mut grouped = false;
            for sample in samples {
                let Some(parsed) = number::normalize(sample, &rules) else {
                    continue;
                };
                if parsed.leading_zero && !parsed.has_decimal {
                    zero_padded += 1;
                }
                matched += 1;
                integer &= !parsed.has_decimal
                    && !parsed.has_exponent
                    && parsed.scaling == Scaling::None;
                exponent |= parsed.has_exponent;
                grouped |= parsed.has_group;
            }

            // codes such as zip codes lose their padding as numbers
            if matched > 0 && zero_padded == matched {
                continue;
            }

            let format = if integer {
                ValueFormat::Integer {
                    group_separator: if grouped { *group } else { None },
                }
            } else if exponent {
                ValueFormat::Double {
                    decimal_separator: *decimal,
                    group_separator: if grouped { *group } else { None },
                }
            } else {
                ValueFormat::Numeric {
                    decimal_separator: *decimal,
                    group_separator: if grouped { *group } else { None },
                }
            };
            if matched == samples.len() {
                debug!("Numeric samples match {format}");
                return Ok(Some(format));
            }
            candidates.offer(&format, matched, samples.len());
        }
    }
    Ok(None)
}

/// Most frequent sample length in chars; ties go to the shorter length.
fn modal_length(samples: &[&str]) -> usize {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for sample in samples {
        *counts.entry(sample.chars().count()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(len, _)| len)
        .unwrap_or_default()
}

fn check_dates(
    samples: &[&str],
    options: &InferenceOptions,
    candidates: &mut Candidates,
    cancel: Option<&CancellationToken>,
) -> Result<Option<ValueFormat>> {
    let length = modal_length(samples);
    let mut separators = separators_by_use(samples, &DATE_SEPARATORS);
    if separators.is_empty() {
        separators.push('/');
    }

    let configured = options.date_format.trim();
    let patterns = std::iter::once(configured)
        .filter(|p| !p.is_empty() && *p != SERIAL_DATE)
        .chain(
            STANDARD_DATE_FORMATS
                .iter()
                .copied()
                .filter(|p| *p != configured),
        );

    for text in patterns {
        let pattern = DatePattern::compile(text)?;
        let (min, max) = pattern.length_range();
        if length < min || length > max {
            continue;
        }
        let separators: &[char] = if text.contains('/') {
            &separators
        } else {
            &['/']
        };
        for separator in separators {
            check_cancelled(cancel)?;
            let matched = samples
                .iter()
                .filter(|s| pattern.parse(s, *separator, ':').is_some())
                .count();
            let format = ValueFormat::date_time(text, *separator);
            if matched == samples.len() {
                debug!("Date samples match {format}");
                return Ok(Some(format));
            }
            candidates.offer(&format, matched, samples.len());
        }
    }
    Ok(None)
}

/// Character shape of a value: digits become `9`, letters `A`.
pub fn shape_signature(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                '9'
            } else if c.is_alphabetic() {
                'A'
            } else {
                c
            }
        })
        .collect()
}

fn uniform_shape(samples: &[&str]) -> Option<String> {
    let first = shape_signature(samples.first()?);
    samples[1..]
        .iter()
        .all(|s| shape_signature(s) == first)
        .then_some(first)
}
