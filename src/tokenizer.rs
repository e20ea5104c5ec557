//! Character level field tokenizer.
//!
//! [`FieldTokenizer::next_field`] reads one logical field with one character
//! of look-ahead. Whether a field is quoted is only known once the first
//! non-whitespace character shows up, so leading whitespace is held back
//! until then.

use crate::{
    error::{ReaderError, Result},
    options::{ReaderOptions, TrimmingOption, describe_char},
    source::{CharSource, Checkpoint},
    warning::WarningKind,
};

const NBSP: char = '\u{00A0}';
const REPLACEMENT: char = '\u{FFFD}';

/// Result of one [`FieldTokenizer::next_field`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Value(String),
    /// The previous value was the last one of its row.
    EndOfRow,
    EndOfFile,
}

/// A problem noticed while reading a field, turned into a warning by the
/// row assembler which knows the record context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub column: usize,
    pub kind: WarningKind,
    pub message: String,
}

/// Whitespace trimmed off both ends of an unquoted field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Padding {
    pub leading: String,
    pub trailing: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenizerCheckpoint {
    source: Checkpoint,
    line_number: usize,
    end_line: usize,
    end_of_line: bool,
    after_delimiter: bool,
}

#[derive(Debug, Default)]
struct FieldHints {
    quoted: bool,
    qualifier_in_value: bool,
    delimiter_in_value: bool,
    line_break_in_value: bool,
    nbsp: bool,
    unknown: usize,
    unterminated: bool,
}

pub struct FieldTokenizer {
    source: CharSource,
    delimiter: char,
    qualifier: Option<char>,
    escape: Option<char>,
    trimming: TrimmingOption,
    alternate_quoting: bool,
    duplicate_quoting: bool,
    treat_lf_as_space: bool,
    treat_nbsp_as_space: bool,
    treat_unknown_as_space: bool,
    null_literals: Vec<String>,
    new_line_placeholder: String,
    delimiter_placeholder: String,
    quote_placeholder: String,
    warn_quotes: bool,
    warn_delimiter_in_value: bool,
    warn_nbsp: bool,
    warn_unknown_character: bool,
    warn_line_feed: bool,
    line_number: usize,
    end_line: usize,
    end_of_line: bool,
    after_delimiter: bool,
    issues: Vec<FieldIssue>,
    padding: Padding,
}

impl FieldTokenizer {
    pub fn new(source: CharSource, options: &ReaderOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            source,
            delimiter: options.field_delimiter,
            qualifier: options.field_qualifier,
            escape: options.escape_character,
            trimming: options.trimming_option,
            alternate_quoting: options.alternate_quoting,
            duplicate_quoting: options.duplicate_quoting_to_escape,
            treat_lf_as_space: options.treat_lf_as_space,
            treat_nbsp_as_space: options.treat_nbsp_as_space,
            treat_unknown_as_space: options.treat_unknown_character_as_space,
            null_literals: options.null_literals(),
            new_line_placeholder: options.new_line_placeholder.clone(),
            delimiter_placeholder: options.delimiter_placeholder.clone(),
            quote_placeholder: options.quote_placeholder.clone(),
            warn_quotes: options.warn_quotes,
            warn_delimiter_in_value: options.warn_delimiter_in_value,
            warn_nbsp: options.warn_nbsp,
            warn_unknown_character: options.warn_unknown_character,
            warn_line_feed: options.warn_line_feed,
            line_number: 1,
            end_line: 1,
            end_of_line: false,
            after_delimiter: false,
            issues: Vec::new(),
            padding: Padding::default(),
        })
    }

    /// Physical line the next character belongs to (1-based).
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Line on which the most recent field ended.
    pub fn end_line(&self) -> usize {
        self.end_line
    }

    pub fn is_end_of_line(&self) -> bool {
        self.end_of_line
    }

    pub fn source(&self) -> &CharSource {
        &self.source
    }

    pub fn take_issues(&mut self) -> Vec<FieldIssue> {
        std::mem::take(&mut self.issues)
    }

    /// Whitespace trimmed from the most recent value.
    pub fn take_padding(&mut self) -> Padding {
        std::mem::take(&mut self.padding)
    }

    pub fn checkpoint(&mut self) -> TokenizerCheckpoint {
        TokenizerCheckpoint {
            source: self.source.checkpoint(),
            line_number: self.line_number,
            end_line: self.end_line,
            end_of_line: self.end_of_line,
            after_delimiter: self.after_delimiter,
        }
    }

    pub fn restore(&mut self, checkpoint: TokenizerCheckpoint) -> bool {
        if !self.source.restore(checkpoint.source) {
            return false;
        }
        self.line_number = checkpoint.line_number;
        self.end_line = checkpoint.end_line;
        self.end_of_line = checkpoint.end_of_line;
        self.after_delimiter = checkpoint.after_delimiter;
        true
    }

    pub fn release(&mut self) {
        self.source.release();
    }

    pub fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.line_number = 1;
        self.end_line = 1;
        self.end_of_line = false;
        self.after_delimiter = false;
        self.issues.clear();
        Ok(())
    }

    pub fn at_end(&mut self) -> Result<bool> {
        let line = self.line_number;
        self.source
            .at_end()
            .map_err(|source| ReaderError::Read { line, source })
    }

    /// Forgets any unfinished row state so the next call starts a new row.
    pub fn finish_row(&mut self) {
        self.end_of_line = false;
        self.after_delimiter = false;
    }

    /// Consumes raw characters up to and including the next line break
    /// without interpreting qualifiers.
    pub fn skip_line(&mut self) -> Result<()> {
        self.finish_row();
        while let Some(ch) = self.next_char()? {
            if ch == '\r' || ch == '\n' {
                self.consume_line_break(ch)?;
                break;
            }
        }
        self.end_line = self.line_number;
        Ok(())
    }

    /// Reads the next field of the current row.
    ///
    /// `collect_warnings` controls whether opt-in issues are recorded; the
    /// row assembler turns them off while it looks ahead.
    pub fn next_field(&mut self, column: usize, collect_warnings: bool) -> Result<Field> {
        if self.end_of_line {
            self.finish_row();
            return Ok(Field::EndOfRow);
        }
        if !self.after_delimiter && self.at_end()? {
            return Ok(Field::EndOfFile);
        }
        self.after_delimiter = false;

        let mut value = String::new();
        let mut leading = String::new();
        let mut hints = FieldHints::default();
        let mut pre_data = true;
        let mut post_data = false;

        loop {
            let Some(mut ch) = self.next_char()? else {
                if hints.quoted && !post_data {
                    hints.unterminated = true;
                }
                self.end_line = self.line_number;
                self.end_of_line = true;
                break;
            };

            if let Some(escape) = self.escape
                && ch == escape
                && !post_data
            {
                match self.next_char()? {
                    Some(next) => value.push(unescape(escape, next)),
                    None => value.push(escape),
                }
                pre_data = false;
                continue;
            }

            if ch == '\r' || ch == '\n' {
                let terminator = self.consume_line_break(ch)?;
                if hints.quoted && !post_data {
                    if terminator == "\n" && self.treat_lf_as_space {
                        value.push(' ');
                        continue;
                    }
                    hints.line_break_in_value = true;
                    value.push_str(terminator);
                    continue;
                }
                self.end_line = self.line_number - 1;
                self.end_of_line = true;
                break;
            }

            ch = self.map_special(ch, &mut hints);

            if hints.quoted && !post_data {
                if Some(ch) == self.qualifier {
                    let next = self.peek()?;
                    if self.duplicate_quoting && next == self.qualifier {
                        self.next_char()?;
                        value.push(ch);
                        continue;
                    }
                    if self.alternate_quoting && !self.closes_field(next) {
                        hints.qualifier_in_value = true;
                        value.push(ch);
                        continue;
                    }
                    post_data = true;
                    continue;
                }
                if ch == self.delimiter {
                    hints.delimiter_in_value = true;
                }
                value.push(ch);
                continue;
            }

            if ch == self.delimiter {
                self.after_delimiter = true;
                self.end_line = self.line_number;
                break;
            }

            if pre_data && Some(ch) == self.qualifier {
                hints.quoted = true;
                pre_data = false;
                value.clear();
                continue;
            }

            if is_blank(ch) {
                if pre_data {
                    if self.trimming == TrimmingOption::None {
                        value.push(ch);
                    } else {
                        leading.push(ch);
                    }
                    continue;
                }
                if post_data {
                    continue;
                }
            }

            if post_data || Some(ch) == self.qualifier {
                // text after a closing qualifier or a stray qualifier
                hints.qualifier_in_value = true;
            }
            pre_data = false;
            value.push(ch);
        }

        self.padding = if self.trims(&hints) && !hints.quoted {
            let body = value.trim_start();
            leading.push_str(&value[..value.len() - body.len()]);
            Padding {
                leading,
                trailing: body[body.trim_end().len()..].to_string(),
            }
        } else {
            Padding::default()
        };
        let value = self.finish_value(value, &hints);
        if collect_warnings {
            self.record_issues(column, &value, &hints);
        }
        Ok(Field::Value(value))
    }

    fn trims(&self, hints: &FieldHints) -> bool {
        match self.trimming {
            TrimmingOption::None => false,
            TrimmingOption::Unquoted => !hints.quoted,
            TrimmingOption::All => true,
        }
    }

    fn finish_value(&self, value: String, hints: &FieldHints) -> String {
        let mut value = if self.trims(hints) {
            let trimmed = value.trim();
            if trimmed.len() == value.len() {
                value
            } else {
                trimmed.to_string()
            }
        } else {
            value
        };

        if !self.new_line_placeholder.is_empty() && value.contains(&self.new_line_placeholder) {
            value = value.replace(&self.new_line_placeholder, "\n");
        }
        if !self.delimiter_placeholder.is_empty() && value.contains(&self.delimiter_placeholder) {
            value = value.replace(&self.delimiter_placeholder, &self.delimiter.to_string());
        }
        if let Some(qualifier) = self.qualifier
            && !self.quote_placeholder.is_empty()
            && value.contains(&self.quote_placeholder)
        {
            value = value.replace(&self.quote_placeholder, &qualifier.to_string());
        }

        if !value.is_empty()
            && self
                .null_literals
                .iter()
                .any(|literal| literal.eq_ignore_ascii_case(&value) || *literal == value.to_lowercase())
        {
            value.clear();
        }
        value
    }

    fn record_issues(&mut self, column: usize, value: &str, hints: &FieldHints) {
        if hints.unterminated {
            self.issues.push(FieldIssue {
                column,
                kind: WarningKind::QualifierInValue,
                message: "Closing field qualifier missing at end of file".to_string(),
            });
        }
        if self.warn_quotes && hints.qualifier_in_value {
            let qualifier = self.qualifier.map(describe_char).unwrap_or_default();
            self.issues.push(FieldIssue {
                column,
                kind: WarningKind::QualifierInValue,
                message: format!("Field qualifier {qualifier} found in value"),
            });
        }
        if self.warn_delimiter_in_value && hints.delimiter_in_value {
            self.issues.push(FieldIssue {
                column,
                kind: WarningKind::DelimiterInValue,
                message: format!(
                    "Field delimiter {} found in value",
                    describe_char(self.delimiter)
                ),
            });
        }
        if self.warn_nbsp && hints.nbsp {
            let message = if self.treat_nbsp_as_space {
                "Non-breaking space found in value, replaced with a space"
            } else {
                "Non-breaking space found in value"
            };
            self.issues.push(FieldIssue {
                column,
                kind: WarningKind::NonBreakingSpace,
                message: message.to_string(),
            });
        }
        if self.warn_unknown_character && hints.unknown > 0 {
            let message = if suspicious_unknown_count(hints.unknown, value) {
                format!(
                    "Value contains {} unknown characters; the input is probably decoded with the wrong code page",
                    hints.unknown
                )
            } else {
                "Unknown character (U+FFFD) found in value".to_string()
            };
            self.issues.push(FieldIssue {
                column,
                kind: WarningKind::UnknownCharacter,
                message,
            });
        }
        if self.warn_line_feed && hints.line_break_in_value {
            self.issues.push(FieldIssue {
                column,
                kind: WarningKind::LineFeedInValue,
                message: "Line break found in value".to_string(),
            });
        }
    }

    fn map_special(&self, ch: char, hints: &mut FieldHints) -> char {
        match ch {
            NBSP => {
                hints.nbsp = true;
                if self.treat_nbsp_as_space { ' ' } else { ch }
            }
            REPLACEMENT => {
                hints.unknown += 1;
                if self.treat_unknown_as_space { ' ' } else { ch }
            }
            _ => ch,
        }
    }

    fn closes_field(&self, next: Option<char>) -> bool {
        match next {
            None => true,
            Some(ch) => ch == self.delimiter || ch == '\r' || ch == '\n',
        }
    }

    /// Consumes the partner of a two character line break and returns the
    /// full terminator.
    fn consume_line_break(&mut self, first: char) -> Result<&'static str> {
        let terminator = match (first, self.peek()?) {
            ('\r', Some('\n')) => {
                self.next_char()?;
                "\r\n"
            }
            ('\n', Some('\r')) => {
                self.next_char()?;
                "\n\r"
            }
            ('\r', _) => "\r",
            _ => "\n",
        };
        self.line_number += 1;
        Ok(terminator)
    }

    fn next_char(&mut self) -> Result<Option<char>> {
        let line = self.line_number;
        self.source
            .next_char()
            .map_err(|source| ReaderError::Read { line, source })
    }

    fn peek(&mut self) -> Result<Option<char>> {
        let line = self.line_number;
        self.source
            .peek()
            .map_err(|source| ReaderError::Read { line, source })
    }
}

fn is_blank(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

fn unescape(escape: char, ch: char) -> char {
    if escape != '\\' {
        return ch;
    }
    match ch {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'b' => '\u{8}',
        'a' => '\u{7}',
        other => other,
    }
}

/// Many replacement characters in one value point to a code page mismatch
/// rather than a single damaged byte.
fn suspicious_unknown_count(unknown: usize, value: &str) -> bool {
    if unknown >= 10 {
        return true;
    }
    let total = value.chars().count().max(1);
    unknown > 1 && unknown * 4 >= total
}
