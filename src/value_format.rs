//! Column formats and the converters compiled from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, parse_guid},
    date_pattern::{DatePattern, SERIAL_DATE, serial_to_datetime},
    error::Result,
    number::{self, NumberRules},
};

/// Built-in literals accepted for `true` in addition to configured ones.
pub const TRUE_TOKENS: &[&str] = &[
    "true", "yes", "y", "1", "t", "on", "wahr", "ja", "oui", "si", "vrai",
];
/// Built-in literals accepted for `false` in addition to configured ones.
pub const FALSE_TOKENS: &[&str] = &[
    "false", "no", "n", "0", "f", "off", "falsch", "nein", "non", "faux",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    String,
    Integer,
    Double,
    Numeric,
    Boolean,
    DateTime,
    Guid,
    TextPart,
    TextToHtml,
    TextToHtmlFull,
}

/// Data type plus the parameters needed to read it.
///
/// Equality compares the tag and the parameters of that tag only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueFormat {
    #[default]
    String,
    Integer {
        #[serde(default)]
        group_separator: Option<char>,
    },
    /// Binary floating point.
    Double {
        decimal_separator: char,
        #[serde(default)]
        group_separator: Option<char>,
    },
    /// Exact decimal.
    Numeric {
        decimal_separator: char,
        #[serde(default)]
        group_separator: Option<char>,
    },
    Boolean {
        /// Semicolon separated literals read as true.
        true_value: String,
        false_value: String,
    },
    DateTime {
        /// Pattern such as `MM/dd/yyyy`, or `SerialDate`.
        date_format: String,
        date_separator: char,
        time_separator: char,
    },
    Guid,
    /// One part of a value split at `splitter`; `part` is 1-based.
    TextPart {
        part: usize,
        splitter: char,
        #[serde(default)]
        part_to_end: bool,
    },
    TextToHtml,
    TextToHtmlFull,
}

impl ValueFormat {
    pub fn date_time(date_format: impl Into<String>, date_separator: char) -> Self {
        ValueFormat::DateTime {
            date_format: date_format.into(),
            date_separator,
            time_separator: ':',
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ValueFormat::String => DataType::String,
            ValueFormat::Integer { .. } => DataType::Integer,
            ValueFormat::Double { .. } => DataType::Double,
            ValueFormat::Numeric { .. } => DataType::Numeric,
            ValueFormat::Boolean { .. } => DataType::Boolean,
            ValueFormat::DateTime { .. } => DataType::DateTime,
            ValueFormat::Guid => DataType::Guid,
            ValueFormat::TextPart { .. } => DataType::TextPart,
            ValueFormat::TextToHtml => DataType::TextToHtml,
            ValueFormat::TextToHtmlFull => DataType::TextToHtmlFull,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ValueFormat::String)
    }

    /// Date pattern of a `DateTime` format, `None` for serial dates.
    pub fn date_pattern(&self) -> Option<&str> {
        match self {
            ValueFormat::DateTime { date_format, .. } if date_format != SERIAL_DATE => {
                Some(date_format)
            }
            _ => None,
        }
    }

    pub fn compile(&self) -> Result<Converter> {
        Ok(match self {
            ValueFormat::String => Converter::Text,
            ValueFormat::Integer { group_separator } => Converter::Integer(NumberRules {
                decimal_separator: if *group_separator == Some('.') { ',' } else { '.' },
                group_separator: *group_separator,
                allow_scaling: false,
                strip_currency: true,
            }),
            ValueFormat::Double {
                decimal_separator,
                group_separator,
            } => Converter::Double(NumberRules::new(*decimal_separator, *group_separator)),
            ValueFormat::Numeric {
                decimal_separator,
                group_separator,
            } => Converter::Numeric(NumberRules::new(*decimal_separator, *group_separator)),
            ValueFormat::Boolean {
                true_value,
                false_value,
            } => Converter::Boolean {
                trues: literals(true_value, TRUE_TOKENS),
                falses: literals(false_value, FALSE_TOKENS),
            },
            ValueFormat::DateTime {
                date_format,
                date_separator,
                time_separator,
            } => {
                if date_format == SERIAL_DATE {
                    Converter::SerialDate
                } else {
                    Converter::DateTime {
                        pattern: DatePattern::compile(date_format)?,
                        date_separator: *date_separator,
                        time_separator: *time_separator,
                    }
                }
            }
            ValueFormat::Guid => Converter::Guid,
            ValueFormat::TextPart {
                part,
                splitter,
                part_to_end,
            } => Converter::TextPart {
                part: (*part).max(1),
                splitter: *splitter,
                to_end: *part_to_end,
            },
            ValueFormat::TextToHtml => Converter::Html { full: false },
            ValueFormat::TextToHtmlFull => Converter::Html { full: true },
        })
    }
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueFormat::String => write!(f, "Text"),
            ValueFormat::Integer { group_separator } => match group_separator {
                Some(group) => write!(f, "Integer (group '{group}')"),
                None => write!(f, "Integer"),
            },
            ValueFormat::Double {
                decimal_separator, ..
            } => write!(f, "Double (decimal '{decimal_separator}')"),
            ValueFormat::Numeric {
                decimal_separator, ..
            } => write!(f, "Numeric (decimal '{decimal_separator}')"),
            ValueFormat::Boolean {
                true_value,
                false_value,
            } => write!(f, "Boolean ({true_value}/{false_value})"),
            ValueFormat::DateTime {
                date_format,
                date_separator,
                ..
            } => {
                if date_format == SERIAL_DATE {
                    write!(f, "Date Time (serial)")
                } else {
                    let shown = date_format.replace('/', &date_separator.to_string());
                    write!(f, "Date Time ({shown})")
                }
            }
            ValueFormat::Guid => write!(f, "Guid"),
            ValueFormat::TextPart { part, splitter, .. } => {
                write!(f, "Text Part ({part} of '{splitter}')")
            }
            ValueFormat::TextToHtml => write!(f, "Text to HTML"),
            ValueFormat::TextToHtmlFull => write!(f, "Text to HTML (full)"),
        }
    }
}

fn literals(configured: &str, builtin: &[&str]) -> Vec<String> {
    let mut values: Vec<String> = configured
        .split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect();
    for token in builtin {
        if !values.iter().any(|v| v == token) {
            values.push((*token).to_string());
        }
    }
    values
}

/// A [`ValueFormat`] prepared for repeated conversion.
#[derive(Debug, Clone)]
pub enum Converter {
    Text,
    Integer(NumberRules),
    Double(NumberRules),
    Numeric(NumberRules),
    Boolean {
        trues: Vec<String>,
        falses: Vec<String>,
    },
    DateTime {
        pattern: DatePattern,
        date_separator: char,
        time_separator: char,
    },
    SerialDate,
    Guid,
    TextPart {
        part: usize,
        splitter: char,
        to_end: bool,
    },
    Html {
        full: bool,
    },
}

impl Converter {
    /// Converts non-empty cell text; `None` when the text does not fit.
    pub fn convert(&self, text: &str) -> Option<Value> {
        match self {
            Converter::Text => Some(Value::String(text.to_string())),
            Converter::Integer(rules) => number::parse_i64(text, rules).map(Value::Integer),
            Converter::Double(rules) => number::parse_f64(text, rules).map(Value::Double),
            Converter::Numeric(rules) => number::parse_decimal(text, rules).map(Value::Decimal),
            Converter::Boolean { trues, falses } => {
                parse_bool(text, trues, falses).map(Value::Boolean)
            }
            Converter::DateTime {
                pattern,
                date_separator,
                time_separator,
            } => pattern
                .parse(text, *date_separator, *time_separator)
                .map(Value::DateTime),
            Converter::SerialDate => {
                let serial: f64 = text.trim().parse().ok()?;
                serial_to_datetime(serial).map(Value::DateTime)
            }
            Converter::Guid => parse_guid(text).map(Value::Guid),
            Converter::TextPart {
                part,
                splitter,
                to_end,
            } => {
                let value = if *to_end {
                    text.splitn(*part, *splitter).nth(part - 1)
                } else {
                    text.split(*splitter).nth(part - 1)
                };
                Some(Value::String(value.unwrap_or_default().to_string()))
            }
            Converter::Html { full } => Some(Value::String(text_to_html(text, *full))),
        }
    }
}

pub(crate) fn parse_bool(text: &str, trues: &[String], falses: &[String]) -> Option<bool> {
    let lowered = text.trim().to_lowercase();
    if trues.iter().any(|t| *t == lowered) {
        Some(true)
    } else if falses.iter().any(|f| *f == lowered) {
        Some(false)
    } else {
        None
    }
}

fn text_to_html(text: &str, full: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' if full => out.push_str("&quot;"),
            '\'' if full => out.push_str("&#39;"),
            '\r' if full => {}
            '\n' if full => out.push_str("<br>"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn equality_follows_tag_parameters() {
        assert_eq!(
            ValueFormat::date_time("MM/dd/yyyy", '/'),
            ValueFormat::DateTime {
                date_format: "MM/dd/yyyy".into(),
                date_separator: '/',
                time_separator: ':',
            }
        );
        assert_ne!(
            ValueFormat::date_time("MM/dd/yyyy", '/'),
            ValueFormat::date_time("MM/dd/yyyy", '-')
        );
        assert_eq!(
            ValueFormat::Integer {
                group_separator: None
            }
            .data_type(),
            DataType::Integer
        );
    }

    #[test]
    fn converts_numbers_with_separators() {
        let numeric = ValueFormat::Numeric {
            decimal_separator: ',',
            group_separator: Some('.'),
        }
        .compile()
        .unwrap();
        assert_eq!(
            numeric.convert("1.234,50"),
            Some(Value::Decimal(Decimal::from_str("1234.5").unwrap()))
        );
        let integer = ValueFormat::Integer {
            group_separator: Some(','),
        }
        .compile()
        .unwrap();
        assert_eq!(integer.convert("1,234"), Some(Value::Integer(1234)));
        assert_eq!(integer.convert("12.5"), None);
    }

    #[test]
    fn booleans_accept_configured_and_builtin_tokens() {
        let converter = ValueFormat::Boolean {
            true_value: "Active".into(),
            false_value: "Retired".into(),
        }
        .compile()
        .unwrap();
        assert_eq!(converter.convert("ACTIVE"), Some(Value::Boolean(true)));
        assert_eq!(converter.convert("retired"), Some(Value::Boolean(false)));
        assert_eq!(converter.convert("yes"), Some(Value::Boolean(true)));
        assert_eq!(converter.convert("maybe"), None);
    }

    #[test]
    fn date_time_and_serial_conversion() {
        let converter = ValueFormat::date_time("dd/MM/yyyy", '.').compile().unwrap();
        let expected = NaiveDate::from_ymd_opt(2021, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(converter.convert("01.03.2021"), Some(Value::DateTime(expected)));
        let serial = ValueFormat::date_time(SERIAL_DATE, '/').compile().unwrap();
        assert!(matches!(serial.convert("44256"), Some(Value::DateTime(_))));
        assert!(ValueFormat::date_time("''", '/').compile().is_err());
    }

    #[test]
    fn text_part_and_html() {
        let second = ValueFormat::TextPart {
            part: 2,
            splitter: ':',
            part_to_end: false,
        }
        .compile()
        .unwrap();
        assert_eq!(second.convert("a:b:c"), Some(Value::String("b".into())));
        let rest = ValueFormat::TextPart {
            part: 2,
            splitter: ':',
            part_to_end: true,
        }
        .compile()
        .unwrap();
        assert_eq!(rest.convert("a:b:c"), Some(Value::String("b:c".into())));
        let html = ValueFormat::TextToHtmlFull.compile().unwrap();
        assert_eq!(
            html.convert("a<b\n\"c\""),
            Some(Value::String("a&lt;b<br>&quot;c&quot;".into()))
        );
    }

    #[test]
    fn yaml_shape_is_tagged() {
        let yaml = serde_yaml::to_string(&ValueFormat::date_time("yyyy/MM/dd", '-')).unwrap();
        assert!(yaml.contains("type: date_time"));
        let parsed: ValueFormat = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, ValueFormat::date_time("yyyy/MM/dd", '-'));
    }
}
