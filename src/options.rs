//! Reader and inference configuration.
//!
//! Both structs are plain data with documented defaults. They deserialize
//! from YAML with every field optional, so an options file only needs the
//! settings that differ from the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};

/// How whitespace around a field value is removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrimmingOption {
    /// Keep the value exactly as read.
    None,
    /// Trim only values that were not enclosed in qualifiers.
    #[default]
    Unquoted,
    /// Trim every value, quoted or not.
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    #[serde(with = "punctuation")]
    pub field_delimiter: char,
    #[serde(with = "optional_punctuation")]
    pub field_qualifier: Option<char>,
    #[serde(with = "optional_punctuation")]
    pub escape_character: Option<char>,
    pub trimming_option: TrimmingOption,
    /// Physical lines skipped before the header (or first data row).
    pub skip_rows: usize,
    pub has_field_header: bool,
    pub skip_duplicate_header: bool,
    pub skip_empty_lines: bool,
    /// Consecutive empty rows after which the rest of the input is ignored.
    pub consecutive_empty_rows_max: usize,
    pub allow_row_combining: bool,
    /// Enables the re-align learner for rows with too many fields.
    pub try_to_solve_more_columns: bool,
    pub alternate_quoting: bool,
    pub duplicate_quoting_to_escape: bool,
    /// A lone LF inside a quoted value reads as a space.
    pub treat_lf_as_space: bool,
    pub treat_nbsp_as_space: bool,
    pub treat_unknown_character_as_space: bool,
    /// Semicolon separated literals that are read as null.
    pub treat_text_as_null: String,
    pub new_line_placeholder: String,
    pub delimiter_placeholder: String,
    pub quote_placeholder: String,
    /// Prefix marking a comment line; empty disables comments.
    pub comment_line: String,
    pub warn_delimiter_in_value: bool,
    pub warn_line_feed: bool,
    pub warn_nbsp: bool,
    pub warn_quotes: bool,
    pub warn_unknown_character: bool,
    pub warn_empty_tailing_columns: bool,
    /// Ceiling per warning kind, 0 means unlimited.
    pub num_warning: usize,
    /// Maximum number of records returned, 0 means unlimited.
    pub record_limit: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            field_delimiter: ',',
            field_qualifier: Some('"'),
            escape_character: None,
            trimming_option: TrimmingOption::Unquoted,
            skip_rows: 0,
            has_field_header: true,
            skip_duplicate_header: true,
            skip_empty_lines: true,
            consecutive_empty_rows_max: 5,
            allow_row_combining: false,
            try_to_solve_more_columns: false,
            alternate_quoting: false,
            duplicate_quoting_to_escape: true,
            treat_lf_as_space: false,
            treat_nbsp_as_space: false,
            treat_unknown_character_as_space: false,
            treat_text_as_null: "NULL".to_string(),
            new_line_placeholder: String::new(),
            delimiter_placeholder: String::new(),
            quote_placeholder: String::new(),
            comment_line: String::new(),
            warn_delimiter_in_value: false,
            warn_line_feed: false,
            warn_nbsp: true,
            warn_quotes: false,
            warn_unknown_character: true,
            warn_empty_tailing_columns: true,
            num_warning: 0,
            record_limit: 0,
        }
    }
}

const FORBIDDEN_STRUCTURAL: &[char] = &['\r', '\n', ' ', '\0'];

impl ReaderOptions {
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.field_delimiter = delimiter;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_field_header = has_header;
        self
    }

    /// Rejects settings where one character plays two roles or a structural
    /// character is unusable.
    pub fn validate(&self) -> Result<()> {
        let delimiter = self.field_delimiter;
        if FORBIDDEN_STRUCTURAL.contains(&delimiter) {
            return Err(ReaderError::configuration(format!(
                "{} can not be used as field delimiter",
                describe_char(delimiter)
            )));
        }
        if let Some(qualifier) = self.field_qualifier {
            if FORBIDDEN_STRUCTURAL.contains(&qualifier) {
                return Err(ReaderError::configuration(format!(
                    "{} can not be used as field qualifier",
                    describe_char(qualifier)
                )));
            }
            if qualifier == delimiter {
                return Err(ReaderError::configuration(format!(
                    "field qualifier and field delimiter are both {}",
                    describe_char(qualifier)
                )));
            }
        }
        if let Some(escape) = self.escape_character {
            if matches!(escape, '\r' | '\n' | '\0') {
                return Err(ReaderError::configuration(format!(
                    "{} can not be used as escape character",
                    describe_char(escape)
                )));
            }
            if escape == delimiter {
                return Err(ReaderError::configuration(format!(
                    "escape character and field delimiter are both {}",
                    describe_char(escape)
                )));
            }
            if Some(escape) == self.field_qualifier {
                return Err(ReaderError::configuration(format!(
                    "escape character and field qualifier are both {}",
                    describe_char(escape)
                )));
            }
        }
        Ok(())
    }

    /// Lower-cased literals of [`Self::treat_text_as_null`].
    pub fn null_literals(&self) -> Vec<String> {
        self.treat_text_as_null
            .split(';')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_yaml(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    pub detect_boolean: bool,
    pub detect_guid: bool,
    pub detect_numbers: bool,
    pub detect_date_time: bool,
    pub detect_percentage: bool,
    pub serial_date_time: bool,
    pub remove_currency_symbols: bool,
    /// Below this many distinct samples only boolean, GUID and a carried
    /// forward date format are tried.
    pub min_samples: usize,
    /// Distinct values collected per column.
    pub sample_values: usize,
    /// Records scanned while collecting samples, 0 means all.
    pub checked_records: usize,
    /// Semicolon separated literals accepted as true.
    pub true_value: String,
    /// Semicolon separated literals accepted as false.
    pub false_value: String,
    /// Date pattern tried before the built-in ones.
    pub date_format: String,
    pub ignore_id_columns: bool,
    /// Pair date-only columns with a separate time column.
    pub date_parts: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            detect_boolean: true,
            detect_guid: true,
            detect_numbers: true,
            detect_date_time: true,
            detect_percentage: true,
            serial_date_time: true,
            remove_currency_symbols: true,
            min_samples: 5,
            sample_values: 150,
            checked_records: 30_000,
            true_value: "True".to_string(),
            false_value: "False".to_string(),
            date_format: "MM/dd/yyyy".to_string(),
            ignore_id_columns: true,
            date_parts: false,
        }
    }
}

impl InferenceOptions {
    pub fn load(path: &Path) -> Result<Self> {
        load_yaml(path)
    }
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path).map_err(|source| ReaderError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_reader(std::io::BufReader::new(file)).map_err(|err| ReaderError::Schema {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Resolves written punctuation names and escape notations to a character.
///
/// Returns `Ok(None)` for an empty value.
pub fn parse_punctuation(value: &str) -> std::result::Result<Option<char>, String> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (None, _) => return Ok(None),
        (Some(single), None) => return Ok(Some(single)),
        _ => {}
    }
    let normalized = value
        .trim()
        .to_ascii_lowercase()
        .replace(['-', '_'], " ");
    let resolved = match normalized.as_str() {
        "tab" | "\\t" | "horizontal tab" | "tabulator" => '\t',
        "comma" | "," => ',',
        "semicolon" => ';',
        "colon" => ':',
        "pipe" | "vertical bar" | "bar" => '|',
        "space" | "blank" => ' ',
        "quote" | "double quote" | "quotation marks" | "quotation mark" => '"',
        "apostrophe" | "single quote" | "singlequote" => '\'',
        "backslash" | "\\\\" => '\\',
        "slash" | "forward slash" => '/',
        "hash" | "number sign" | "pound" => '#',
        "at" | "at sign" => '@',
        "ampersand" => '&',
        "tilde" => '~',
        "caret" => '^',
        "star" | "asterisk" => '*',
        "plus" => '+',
        "minus" | "hyphen" | "dash" => '-',
        "underscore" => '_',
        "equals" | "equal sign" => '=',
        "percent" => '%',
        "dollar" => '$',
        "exclamation" | "exclamation mark" => '!',
        "question" | "question mark" => '?',
        "dot" | "period" | "full stop" => '.',
        "file separator" | "fs" => '\u{1C}',
        "group separator" | "gs" => '\u{1D}',
        "record separator" | "rs" => '\u{1E}',
        "unit separator" | "us" => '\u{1F}',
        _ => return Err(format!("Unknown punctuation '{value}'")),
    };
    Ok(Some(resolved))
}

pub(crate) fn describe_char(ch: char) -> String {
    match ch {
        '\t' => "Tab".to_string(),
        '\r' => "CR".to_string(),
        '\n' => "LF".to_string(),
        ' ' => "Space".to_string(),
        '\0' => "NUL".to_string(),
        other => format!("'{other}'"),
    }
}

mod punctuation {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &char, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<char, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_punctuation(&raw)
            .map_err(de::Error::custom)?
            .ok_or_else(|| de::Error::custom("delimiter can not be empty"))
    }
}

mod optional_punctuation {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Option<char>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ch) => serializer.serialize_str(&ch.to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<char>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        super::parse_punctuation(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_names_resolve_to_characters() {
        assert_eq!(parse_punctuation("Tab").unwrap(), Some('\t'));
        assert_eq!(parse_punctuation("PIPE").unwrap(), Some('|'));
        assert_eq!(parse_punctuation("unit-separator").unwrap(), Some('\u{1F}'));
        assert_eq!(parse_punctuation(";").unwrap(), Some(';'));
        assert_eq!(parse_punctuation("").unwrap(), None);
        assert!(parse_punctuation("nonsense").is_err());
    }

    #[test]
    fn validate_rejects_conflicting_roles() {
        let options = ReaderOptions {
            field_qualifier: Some(','),
            ..ReaderOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ReaderError::Configuration(_))
        ));

        let options = ReaderOptions {
            escape_character: Some('"'),
            ..ReaderOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn validate_rejects_structural_characters() {
        for bad in ['\r', '\n', ' ', '\0'] {
            let options = ReaderOptions::default().with_delimiter(bad);
            assert!(options.validate().is_err(), "{bad:?} accepted");
        }
        assert!(ReaderOptions::default().validate().is_ok());
    }

    #[test]
    fn null_literals_are_split_and_lowercased() {
        let options = ReaderOptions {
            treat_text_as_null: "NULL; n/a ;;#N/A".to_string(),
            ..ReaderOptions::default()
        };
        assert_eq!(options.null_literals(), vec!["null", "n/a", "#n/a"]);
    }

    #[test]
    fn yaml_options_accept_punctuation_names() {
        let yaml = "field_delimiter: Tab\nfield_qualifier: ''\nskip_rows: 2\n";
        let options: ReaderOptions = serde_yaml::from_str(yaml).expect("parse options");
        assert_eq!(options.field_delimiter, '\t');
        assert_eq!(options.field_qualifier, None);
        assert_eq!(options.skip_rows, 2);
        assert!(options.has_field_header);
    }
}
