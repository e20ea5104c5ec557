//! Row assembler and typed record cursor.
//!
//! [`CsvReader`] pulls fields from a [`FieldTokenizer`], repairs rows whose
//! width differs from the header, converts each cell according to its column
//! format and hands out raw text and typed values for the current record.
//! Everything the reader repairs is reported through a [`WarningSink`].

use std::cmp::Ordering;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use encoding_rs::Encoding;
use itertools::Itertools;
use log::debug;
use regex::Regex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    cancel::CancellationToken,
    columns::{Column, ColumnNote, reconcile_columns, wire_time_parts},
    data::Value,
    date_pattern::DatePattern,
    error::{ReaderError, Result},
    options::ReaderOptions,
    realign::ReAlignColumns,
    source::CharSource,
    tokenizer::{Field, FieldIssue, FieldTokenizer, Padding},
    value_format::{Converter, ValueFormat},
    warning::{Allowance, IgnoreWarnings, Warning, WarningKind, WarningLimiter, WarningSink},
};

/// A trailing single-field row shorter than this is taken for an end of file
/// marker.
const EOF_MARKER_MAX_LEN: usize = 10;
/// Combined width may exceed the expected width by less than this.
const COMBINE_SLACK: usize = 4;
/// Rows inspected to learn the width of a header-less file.
const WIDTH_PROBE_ROWS: usize = 10;

const TIME_ZONE_OFFSET: &str = r"^(?i:UTC|GMT)?\s*([+-])(\d{1,2})(?::?(\d{2}))?$";

/// One physical row before width reconciliation.
#[derive(Debug, Clone)]
struct RawRow {
    fields: Vec<String>,
    /// Trimmed whitespace per field, used when re-aligning.
    padding: Vec<Padding>,
    start_line: usize,
    end_line: usize,
    issues: Vec<FieldIssue>,
}

impl RawRow {
    fn is_empty(&self) -> bool {
        self.fields.iter().all(|field| field.trim().is_empty())
    }
}

/// Converted state of one cell of the current record.
#[derive(Debug, Clone, PartialEq)]
enum CellValue {
    Null,
    Value(Value),
    /// Text present but not valid for the column format.
    Invalid,
}

/// Forward-only cursor over a delimited text source.
pub struct CsvReader {
    tokenizer: FieldTokenizer,
    options: ReaderOptions,
    columns: Vec<Column>,
    converters: Vec<Converter>,
    time_patterns: Vec<Option<DatePattern>>,
    header: Option<Vec<String>>,
    realign: Option<ReAlignColumns>,
    limiter: WarningLimiter,
    time_zone_offset: Regex,
    cancel: Option<CancellationToken>,
    record_number: usize,
    start_line: usize,
    end_line: usize,
    row: Vec<Option<String>>,
    cells: Vec<CellValue>,
    has_record: bool,
    consecutive_empty: usize,
    end_of_file: bool,
}

impl CsvReader {
    /// Opens a reader on `source`.
    ///
    /// Skips `skip_rows` lines, reads the header (or learns the width of a
    /// header-less file) and reconciles `supplied` column definitions with
    /// it. Column adjustments are reported to `sink`.
    pub fn open(
        source: CharSource,
        options: ReaderOptions,
        supplied: &[Column],
        sink: &mut dyn WarningSink,
    ) -> Result<Self> {
        let tokenizer = FieldTokenizer::new(source, &options)?;
        let time_zone_offset = Regex::new(TIME_ZONE_OFFSET)
            .map_err(|err| ReaderError::configuration(err.to_string()))?;
        let mut reader = Self {
            tokenizer,
            limiter: WarningLimiter::new(options.num_warning),
            options,
            columns: Vec::new(),
            converters: Vec::new(),
            time_patterns: Vec::new(),
            header: None,
            realign: None,
            time_zone_offset,
            cancel: None,
            record_number: 0,
            start_line: 0,
            end_line: 0,
            row: Vec::new(),
            cells: Vec::new(),
            has_record: false,
            consecutive_empty: 0,
            end_of_file: false,
        };
        reader.initialize(supplied, sink)?;
        Ok(reader)
    }

    pub fn from_text(
        text: impl Into<String>,
        options: ReaderOptions,
        supplied: &[Column],
        sink: &mut dyn WarningSink,
    ) -> Result<Self> {
        Self::open(CharSource::from_text(text), options, supplied, sink)
    }

    pub fn from_path(
        path: &Path,
        options: ReaderOptions,
        encoding: Option<&'static Encoding>,
        supplied: &[Column],
        sink: &mut dyn WarningSink,
    ) -> Result<Self> {
        let source = CharSource::from_path(path, encoding)?;
        debug!(
            "Opened '{}' as {}{}",
            path.display(),
            source.encoding().name(),
            if source.has_byte_order_mark() {
                " with byte order mark"
            } else {
                ""
            }
        );
        Self::open(source, options, supplied, sink)
    }

    /// Checked between fields, rows and inference candidates.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    fn initialize(&mut self, supplied: &[Column], sink: &mut dyn WarningSink) -> Result<()> {
        self.skip_leading_rows()?;

        let (header, field_count, lines) = if self.options.has_field_header {
            match self.read_header_row(true)? {
                Some(row) => {
                    let width = row.fields.len();
                    (Some(row.fields), width, (row.start_line, row.end_line))
                }
                None => (None, 0, (1, 1)),
            }
        } else {
            let width = self.probe_width()?;
            (None, width, (0, 0))
        };

        let (columns, notes) = reconcile_columns(header.as_deref(), field_count, supplied);
        self.header = header;
        self.start_line = lines.0;
        self.end_line = lines.1;
        self.install_columns(columns)?;
        for note in notes {
            self.report_note(sink, note);
        }
        if self.options.try_to_solve_more_columns && field_count > 1 {
            self.realign = Some(ReAlignColumns::new(field_count));
        }
        debug!(
            "Reader opened with {} columns{}",
            field_count,
            if self.header.is_some() {
                ""
            } else {
                " (no header)"
            }
        );
        Ok(())
    }

    fn skip_leading_rows(&mut self) -> Result<()> {
        for _ in 0..self.options.skip_rows {
            if self.tokenizer.at_end()? {
                break;
            }
            self.tokenizer.skip_line()?;
        }
        Ok(())
    }

    /// First non-empty row after the skipped rows.
    fn read_header_row(&mut self, collect: bool) -> Result<Option<RawRow>> {
        while let Some(row) = self.read_row(collect)? {
            if !row.is_empty() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Width of the first non-empty row, read under a checkpoint and
    /// restored afterwards.
    fn probe_width(&mut self) -> Result<usize> {
        let checkpoint = self.tokenizer.checkpoint();
        let mut width = 0;
        for _ in 0..WIDTH_PROBE_ROWS {
            match self.read_row(false)? {
                Some(row) if row.is_empty() => {
                    width = width.max(row.fields.len());
                }
                Some(row) => {
                    width = row.fields.len();
                    break;
                }
                None => break,
            }
        }
        if !self.tokenizer.restore(checkpoint) {
            return Err(ReaderError::CheckpointLost {
                line: self.tokenizer.line_number(),
            });
        }
        Ok(width)
    }

    /// Compiles everything first so a failure leaves the current columns in
    /// place.
    fn install_columns(&mut self, columns: Vec<Column>) -> Result<()> {
        let converters = columns
            .iter()
            .map(|column| column.format.compile())
            .collect::<Result<Vec<_>>>()?;
        let time_patterns = columns
            .iter()
            .map(|column| match column.time_part_ordinal() {
                Some(_) => DatePattern::compile(&column.time_part_format).map(Some),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        self.columns = columns;
        self.converters = converters;
        self.time_patterns = time_patterns;
        Ok(())
    }

    /// Replaces all column definitions at once, keeping names and ordinals
    /// of the file. Nothing changes when a format fails to compile.
    pub fn apply_columns(&mut self, mut columns: Vec<Column>) -> Result<()> {
        if columns.len() != self.columns.len() {
            return Err(ReaderError::configuration(format!(
                "expected {} column definitions, got {}",
                self.columns.len(),
                columns.len()
            )));
        }
        for (ordinal, column) in columns.iter_mut().enumerate() {
            column.ordinal = ordinal;
        }
        wire_time_parts(&mut columns);
        self.install_columns(columns)?;
        if self.has_record {
            self.convert_current(&mut IgnoreWarnings);
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    /// Reads one physical row, skipping comment lines.
    fn read_row(&mut self, collect: bool) -> Result<Option<RawRow>> {
        loop {
            self.check_cancelled()?;
            let start_line = self.tokenizer.line_number();
            let first = match self.tokenizer.next_field(0, collect)? {
                Field::Value(value) => value,
                Field::EndOfRow => continue,
                Field::EndOfFile => return Ok(None),
            };

            let comment = &self.options.comment_line;
            if !comment.is_empty() && first.starts_with(comment.as_str()) {
                if !self.tokenizer.is_end_of_line() {
                    self.tokenizer.skip_line()?;
                }
                self.tokenizer.finish_row();
                self.tokenizer.take_issues();
                continue;
            }

            let mut fields = vec![first];
            let mut padding = vec![self.tokenizer.take_padding()];
            loop {
                match self.tokenizer.next_field(fields.len(), collect)? {
                    Field::Value(value) => {
                        fields.push(value);
                        padding.push(self.tokenizer.take_padding());
                    }
                    Field::EndOfRow | Field::EndOfFile => break,
                }
            }
            return Ok(Some(RawRow {
                fields,
                padding,
                start_line,
                end_line: self.tokenizer.end_line(),
                issues: self.tokenizer.take_issues(),
            }));
        }
    }

    fn is_repeated_header(&self, fields: &[String]) -> bool {
        let Some(header) = &self.header else {
            return false;
        };
        self.options.skip_duplicate_header
            && header.len() == fields.len()
            && header
                .iter()
                .zip(fields)
                .all(|(name, value)| name.trim().eq_ignore_ascii_case(value.trim()))
    }

    /// Advances to the next data record. Returns `false` at end of file.
    pub fn read_next_record(&mut self, sink: &mut dyn WarningSink) -> Result<bool> {
        self.has_record = false;
        loop {
            self.check_cancelled()?;
            if self.end_of_file {
                return Ok(false);
            }
            if self.options.record_limit > 0 && self.record_number >= self.options.record_limit
            {
                debug!("Record limit of {} reached", self.options.record_limit);
                self.end_of_file = true;
                return Ok(false);
            }
            let Some(mut row) = self.read_row(true)? else {
                self.end_of_file = true;
                return Ok(false);
            };

            let empty = row.is_empty();
            if empty {
                if self.options.skip_empty_lines {
                    continue;
                }
                self.consecutive_empty += 1;
                if self.consecutive_empty > self.options.consecutive_empty_rows_max {
                    debug!(
                        "{} consecutive empty rows at line {}, treating as end of file",
                        self.consecutive_empty, row.start_line
                    );
                    self.end_of_file = true;
                    return Ok(false);
                }
            } else {
                self.consecutive_empty = 0;
                if self.is_repeated_header(&row.fields) {
                    debug!("Skipped repeated header on line {}", row.start_line);
                    continue;
                }
            }

            self.start_line = row.start_line;
            self.end_line = row.end_line;
            self.record_number += 1;
            let issues = std::mem::take(&mut row.issues);

            if empty {
                row.fields.clear();
            } else if !self.fit_width(&mut row, sink)? {
                self.record_number -= 1;
                self.end_of_file = true;
                return Ok(false);
            }
            self.end_line = row.end_line;

            for issue in issues {
                self.report(sink, issue.kind, Some(issue.column), issue.message);
            }

            let field_count = self.columns.len();
            self.row.clear();
            self.row.extend(row.fields.into_iter().map(Some));
            self.row.resize(field_count, None);
            self.convert_current(sink);
            self.has_record = true;
            return Ok(true);
        }
    }

    /// Brings the row to the expected width. `false` means the row was an
    /// end of file marker and is dropped.
    fn fit_width(&mut self, row: &mut RawRow, sink: &mut dyn WarningSink) -> Result<bool> {
        let field_count = self.columns.len();
        match row.fields.len().cmp(&field_count) {
            Ordering::Equal => {
                if let Some(learner) = &mut self.realign {
                    learner.add_row(&row.fields);
                }
            }
            Ordering::Less => {
                if row.fields.len() == 1
                    && row.fields[0].chars().count() < EOF_MARKER_MAX_LEN
                    && self.tokenizer.at_end()?
                {
                    debug!(
                        "Dropped '{}' on line {} as end of file marker",
                        row.fields[0], row.start_line
                    );
                    return Ok(false);
                }
                if self.options.allow_row_combining {
                    self.combine_rows(row, sink)?;
                }
                match row.fields.len().cmp(&field_count) {
                    Ordering::Less => {
                        let message = format!(
                            "Line has fewer columns than expected ({}/{}), missing values are read as null",
                            row.fields.len(),
                            field_count
                        );
                        self.report(sink, WarningKind::ColumnCount, None, message);
                    }
                    Ordering::Greater => self.trim_surplus(row, sink),
                    Ordering::Equal => {}
                }
            }
            Ordering::Greater => self.trim_surplus(row, sink),
        }
        Ok(true)
    }

    /// Joins following physical rows onto a short row while the result stays
    /// plausible.
    fn combine_rows(&mut self, row: &mut RawRow, sink: &mut dyn WarningSink) -> Result<()> {
        let field_count = self.columns.len();
        while row.fields.len() < field_count {
            let checkpoint = self.tokenizer.checkpoint();
            let Some(next) = self.read_row(false)? else {
                self.tokenizer.release();
                break;
            };
            if next.fields.len() + row.fields.len() >= field_count + COMBINE_SLACK {
                if !self.tokenizer.restore(checkpoint) {
                    return Err(ReaderError::CheckpointLost {
                        line: self.tokenizer.line_number(),
                    });
                }
                break;
            }
            self.tokenizer.release();

            let had = row.fields.len();
            let mut rest = next.fields.into_iter();
            if let (Some(last), Some(first)) = (row.fields.last_mut(), rest.next()) {
                last.push('\n');
                last.push_str(&first);
            }
            row.fields.extend(rest);
            let mut rest = next.padding.into_iter();
            if let (Some(last), Some(first)) = (row.padding.last_mut(), rest.next()) {
                last.trailing = first.trailing;
            }
            row.padding.extend(rest);
            row.end_line = next.end_line;
            let message = format!(
                "Line {} had only {had} of {field_count} columns and was combined with line {}",
                row.start_line, next.start_line
            );
            self.end_line = row.end_line;
            self.report(sink, WarningKind::ColumnCount, None, message);
        }
        Ok(())
    }

    fn trim_surplus(&mut self, row: &mut RawRow, sink: &mut dyn WarningSink) {
        let field_count = self.columns.len();
        let found = row.fields.len();
        if let Some(learner) = &self.realign
            && let Some(fixed) =
                learner.realign(&row.fields, &row.padding, self.options.field_delimiter)
        {
            row.fields = fixed;
            let message = format!(
                "Line has more columns than expected ({found}/{field_count}), values were re-aligned"
            );
            self.report(sink, WarningKind::ColumnCount, None, message);
            return;
        }

        let surplus = &row.fields[field_count..];
        if surplus.iter().all(|value| value.trim().is_empty()) {
            if self.options.warn_empty_tailing_columns {
                let message = format!(
                    "Line has more columns than expected ({found}/{field_count}), the empty trailing columns are ignored"
                );
                self.report(sink, WarningKind::EmptyTailingColumns, None, message);
            }
        } else {
            let ignored = surplus
                .iter()
                .filter(|value| !value.trim().is_empty())
                .map(|value| format!("'{}'", preview(value)))
                .join(", ");
            let message = format!(
                "Line has more columns than expected ({found}/{field_count}), ignored values: {ignored}"
            );
            self.report(sink, WarningKind::ColumnCount, None, message);
        }
        row.fields.truncate(field_count);
    }

    /// Converts the stored raw row into typed cells.
    fn convert_current(&mut self, sink: &mut dyn WarningSink) {
        let mut problems: Vec<(usize, String)> = Vec::new();
        self.cells.clear();
        for (idx, column) in self.columns.iter().enumerate() {
            let cell = match self.row.get(idx).and_then(Option::as_deref) {
                None | Some("") => CellValue::Null,
                Some(text) if column.ignore || !column.convert => {
                    CellValue::Value(Value::String(text.to_string()))
                }
                Some(text) => match self.converters[idx].convert(text) {
                    Some(value) => CellValue::Value(value),
                    None => {
                        problems.push((idx, format!("'{text}' is not a valid {}", column.format)));
                        CellValue::Invalid
                    }
                },
            };
            self.cells.push(cell);
        }

        for idx in 0..self.columns.len() {
            let Some(time_idx) = self.columns[idx].time_part_ordinal() else {
                continue;
            };
            let CellValue::Value(Value::DateTime(date)) = &self.cells[idx] else {
                continue;
            };
            let mut combined = *date;

            if let (Some(pattern), Some(text)) = (
                &self.time_patterns[idx],
                self.row.get(time_idx).and_then(Option::as_deref),
            ) && !text.is_empty()
            {
                let time_separator = match &self.columns[idx].format {
                    ValueFormat::DateTime { time_separator, .. } => *time_separator,
                    _ => ':',
                };
                match pattern.parse(text, '/', time_separator) {
                    Some(time) => combined = date.date().and_time(time.time()),
                    None => problems.push((
                        time_idx,
                        format!(
                            "'{text}' is not a valid time ({})",
                            self.columns[idx].time_part_format
                        ),
                    )),
                }
            }

            if let Some(zone_idx) = self.columns[idx].time_zone_part_ordinal()
                && let Some(zone) = self.row.get(zone_idx).and_then(Option::as_deref)
                && !zone.trim().is_empty()
            {
                match self.utc_offset_minutes(zone) {
                    Some(offset) => combined -= Duration::minutes(offset),
                    None => problems.push((
                        zone_idx,
                        format!("Time zone '{zone}' is not recognized, value kept unadjusted"),
                    )),
                }
            }
            self.cells[idx] = CellValue::Value(Value::DateTime(combined));
        }

        for (column, message) in problems {
            self.report(sink, WarningKind::Conversion, Some(column), message);
        }
    }

    /// Offset east of UTC in minutes.
    fn utc_offset_minutes(&self, zone: &str) -> Option<i64> {
        let zone = zone.trim();
        let named = match zone.to_ascii_uppercase().as_str() {
            "Z" | "UTC" | "GMT" | "UT" => Some(0),
            "CET" => Some(60),
            "CEST" => Some(120),
            "EST" => Some(-300),
            "EDT" => Some(-240),
            "CST" => Some(-360),
            "CDT" => Some(-300),
            "MST" => Some(-420),
            "MDT" => Some(-360),
            "PST" => Some(-480),
            "PDT" => Some(-420),
            _ => None,
        };
        if named.is_some() {
            return named;
        }
        let captures = self.time_zone_offset.captures(zone)?;
        let hours: i64 = captures.get(2)?.as_str().parse().ok()?;
        let minutes: i64 = match captures.get(3) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        if hours > 14 || minutes > 59 {
            return None;
        }
        let total = hours * 60 + minutes;
        Some(if &captures[1] == "-" { -total } else { total })
    }

    fn report_note(&mut self, sink: &mut dyn WarningSink, note: ColumnNote) {
        self.report(sink, WarningKind::ColumnName, note.column, note.message);
    }

    fn report(
        &mut self,
        sink: &mut dyn WarningSink,
        kind: WarningKind,
        column: Option<usize>,
        message: String,
    ) {
        let message = match self.limiter.check(kind) {
            Allowance::Emit => message,
            Allowance::EmitLast => {
                format!("{message} (further warnings of this kind are suppressed)")
            }
            Allowance::Suppress => return,
        };
        let warning = Warning {
            kind,
            record_number: self.record_number,
            column,
            column_name: column
                .and_then(|idx| self.columns.get(idx))
                .map(|c| c.name.clone()),
            message,
            start_line: self.start_line,
            end_line: self.end_line,
        };
        sink.on_warning(&warning);
    }

    /// Rewinds to the first data row.
    pub fn reset(&mut self) -> Result<()> {
        self.tokenizer.reset()?;
        self.skip_leading_rows()?;
        if self.options.has_field_header && self.header.is_some() {
            self.read_header_row(false)?;
        }
        self.record_number = 0;
        self.consecutive_empty = 0;
        self.end_of_file = false;
        self.has_record = false;
        self.row.clear();
        self.cells.clear();
        self.limiter.reset();
        Ok(())
    }

    pub fn is_resettable(&self) -> bool {
        self.tokenizer.source().is_resettable()
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.tokenizer.source().encoding()
    }

    pub fn field_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Result<&Column> {
        self.columns.get(idx).ok_or(ReaderError::ColumnIndex(idx))
    }

    /// Position of the column named `name` (case-insensitive).
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ReaderError::ColumnName(name.to_string()))
    }

    /// Raw header cells as read from the file.
    pub fn header_row(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Number of data records delivered so far.
    pub fn record_number(&self) -> usize {
        self.record_number
    }

    pub fn start_line_number(&self) -> usize {
        self.start_line
    }

    pub fn end_line_number(&self) -> usize {
        self.end_line
    }

    pub fn is_end_of_file(&self) -> bool {
        self.end_of_file
    }

    fn check_index(&self, idx: usize) -> Result<()> {
        if !self.has_record {
            return Err(ReaderError::NoCurrentRecord);
        }
        if idx >= self.columns.len() {
            return Err(ReaderError::ColumnIndex(idx));
        }
        Ok(())
    }

    /// Raw text of a cell; `None` when the row was too short.
    pub fn raw(&self, idx: usize) -> Result<Option<&str>> {
        self.check_index(idx)?;
        Ok(self.row[idx].as_deref())
    }

    /// Raw fields of the current record.
    pub fn raw_record(&self) -> Result<&[Option<String>]> {
        if !self.has_record {
            return Err(ReaderError::NoCurrentRecord);
        }
        Ok(&self.row)
    }

    pub fn is_null(&self, idx: usize) -> Result<bool> {
        self.check_index(idx)?;
        Ok(!matches!(self.cells[idx], CellValue::Value(_)))
    }

    /// Typed value of a cell; `None` for null and for text that did not
    /// convert.
    pub fn value(&self, idx: usize) -> Result<Option<&Value>> {
        self.check_index(idx)?;
        Ok(match &self.cells[idx] {
            CellValue::Value(value) => Some(value),
            CellValue::Null | CellValue::Invalid => None,
        })
    }

    /// Typed values of the current record.
    pub fn values(&self) -> Result<Vec<Option<Value>>> {
        if !self.has_record {
            return Err(ReaderError::NoCurrentRecord);
        }
        Ok(self
            .cells
            .iter()
            .map(|cell| match cell {
                CellValue::Value(value) => Some(value.clone()),
                CellValue::Null | CellValue::Invalid => None,
            })
            .collect())
    }

    /// Text shown for a cell: the converted value, or the raw text when it
    /// did not convert.
    pub fn display(&self, idx: usize) -> Result<String> {
        self.check_index(idx)?;
        Ok(match &self.cells[idx] {
            CellValue::Value(value) => value.as_display(),
            CellValue::Invalid => self.row[idx].clone().unwrap_or_default(),
            CellValue::Null => String::new(),
        })
    }

    fn strict<T>(
        &self,
        idx: usize,
        expected: &str,
        extract: impl Fn(&Value) -> Option<T>,
    ) -> Result<T> {
        self.check_index(idx)?;
        let column = &self.columns[idx];
        let text = || self.row[idx].clone().unwrap_or_default();
        match &self.cells[idx] {
            CellValue::Null => Err(ReaderError::NullValue {
                column: column.name.clone(),
                record: self.record_number,
            }),
            CellValue::Invalid => Err(ReaderError::ValueFormat {
                column: column.name.clone(),
                text: text(),
                expected: column.format.to_string(),
            }),
            CellValue::Value(value) => extract(value).ok_or_else(|| ReaderError::ValueFormat {
                column: column.name.clone(),
                text: text(),
                expected: expected.to_string(),
            }),
        }
    }

    /// Converted text, or the raw text for columns read as text.
    pub fn get_string(&self, idx: usize) -> Result<String> {
        self.strict(idx, "text", |value| Some(value.as_display()))
    }

    pub fn get_i64(&self, idx: usize) -> Result<i64> {
        self.strict(idx, "Integer", Value::as_i64)
    }

    pub fn get_f64(&self, idx: usize) -> Result<f64> {
        self.strict(idx, "Double", Value::as_f64)
    }

    pub fn get_decimal(&self, idx: usize) -> Result<Decimal> {
        self.strict(idx, "Numeric", Value::as_decimal)
    }

    pub fn get_bool(&self, idx: usize) -> Result<bool> {
        self.strict(idx, "Boolean", Value::as_bool)
    }

    pub fn get_datetime(&self, idx: usize) -> Result<NaiveDateTime> {
        self.strict(idx, "Date Time", Value::as_datetime)
    }

    pub fn get_guid(&self, idx: usize) -> Result<Uuid> {
        self.strict(idx, "Guid", Value::as_guid)
    }
}

fn preview(value: &str) -> String {
    const MAX: usize = 20;
    if value.chars().count() > MAX {
        let head: String = value.chars().take(MAX).collect();
        format!("{head}…")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warning::WarningList;
    use chrono::{NaiveDate, Timelike};

    fn open(text: &str, options: ReaderOptions) -> (CsvReader, WarningList) {
        let mut warnings = WarningList::new();
        let reader = CsvReader::from_text(text, options, &[], &mut warnings).expect("open");
        (reader, warnings)
    }

    fn rows(reader: &mut CsvReader, warnings: &mut WarningList) -> Vec<Vec<Option<String>>> {
        let mut out = Vec::new();
        while reader.read_next_record(warnings).expect("read") {
            out.push(reader.raw_record().expect("record").to_vec());
        }
        out
    }

    fn some(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn reads_header_and_records() {
        let (mut reader, mut warnings) = open("a,b,c\n1,2,3\n4,5,6\n", ReaderOptions::default());
        let names: Vec<&str> = reader.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        let rows = rows(&mut reader, &mut warnings);
        assert_eq!(rows, vec![some(&["1", "2", "3"]), some(&["4", "5", "6"])]);
        assert_eq!(reader.record_number(), 2);
        assert!(warnings.is_empty());
    }

    #[test]
    fn short_row_without_combining_reads_null() {
        let options = ReaderOptions {
            allow_row_combining: false,
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) = open("a,b,c\n1,2\n", options);
        assert!(reader.read_next_record(&mut warnings).unwrap());
        assert_eq!(reader.raw(2).unwrap(), None);
        assert!(reader.is_null(2).unwrap());
        assert_eq!(warnings.of_kind(WarningKind::ColumnCount).count(), 1);
        assert_eq!(warnings.iter().next().unwrap().column, None);
    }

    #[test]
    fn short_rows_are_combined() {
        let options = ReaderOptions {
            allow_row_combining: true,
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) = open("a,b,c\n1,first\nsecond,3\n4,5,6\n", options);
        let rows = rows(&mut reader, &mut warnings);
        assert_eq!(rows[0], some(&["1", "first\nsecond", "3"]));
        assert_eq!(rows[1], some(&["4", "5", "6"]));
        assert_eq!(warnings.of_kind(WarningKind::ColumnCount).count(), 1);
    }

    #[test]
    fn implausible_combination_restores_the_next_row() {
        let options = ReaderOptions {
            allow_row_combining: true,
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) = open("a,b,c\n1,2\n4,5,6,7,8\n", options);
        let rows = rows(&mut reader, &mut warnings);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![Some("1".into()), Some("2".into()), None]);
        assert_eq!(rows[1], some(&["4", "5", "6"]));
    }

    #[test]
    fn trailing_marker_row_is_dropped() {
        let (mut reader, mut warnings) = open("a,b\n1,2\nEOF\n", ReaderOptions::default());
        let rows = rows(&mut reader, &mut warnings);
        assert_eq!(rows.len(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn surplus_columns_are_truncated() {
        let options = ReaderOptions {
            try_to_solve_more_columns: false,
            warn_empty_tailing_columns: true,
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) = open("a,b\n1,2,,\n3,4,x\n", options);
        let rows = rows(&mut reader, &mut warnings);
        assert_eq!(rows, vec![some(&["1", "2"]), some(&["3", "4"])]);
        assert_eq!(warnings.of_kind(WarningKind::EmptyTailingColumns).count(), 1);
        let column_count: Vec<_> = warnings.of_kind(WarningKind::ColumnCount).collect();
        assert_eq!(column_count.len(), 1);
        assert!(column_count[0].message.contains("'x'"));
    }

    #[test]
    fn comments_empty_rows_and_repeated_headers_are_skipped() {
        let options = ReaderOptions {
            comment_line: "#".into(),
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) =
            open("a,b\n# note, with comma\n1,2\n\nA,B\n3,4\n", options);
        let rows = rows(&mut reader, &mut warnings);
        assert_eq!(rows, vec![some(&["1", "2"]), some(&["3", "4"])]);
        assert_eq!(reader.end_line_number(), 6);
    }

    #[test]
    fn consecutive_empty_rows_end_the_file() {
        let options = ReaderOptions {
            skip_empty_lines: false,
            consecutive_empty_rows_max: 1,
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) = open("a,b\n1,2\n\n\n3,4\n", options);
        let rows = rows(&mut reader, &mut warnings);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![None, None]);
    }

    #[test]
    fn header_less_files_learn_their_width() {
        let options = ReaderOptions {
            has_field_header: false,
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) = open("1,2,3\n4,5,6\n", options);
        assert_eq!(reader.field_count(), 3);
        assert_eq!(reader.columns()[0].name, "Column1");
        assert_eq!(rows(&mut reader, &mut warnings).len(), 2);
    }

    #[test]
    fn record_limit_stops_reading() {
        let options = ReaderOptions {
            record_limit: 1,
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) = open("a\n1\n2\n3\n", options);
        assert_eq!(rows(&mut reader, &mut warnings).len(), 1);
    }

    #[test]
    fn tokenizer_issues_are_rate_limited() {
        let options = ReaderOptions {
            warn_delimiter_in_value: true,
            num_warning: 2,
            ..ReaderOptions::default()
        };
        let text = "a,b\n\"1,1\",x\n\"2,2\",x\n\"3,3\",x\n";
        let (mut reader, mut warnings) = open(text, options);
        assert_eq!(rows(&mut reader, &mut warnings).len(), 3);
        let issued: Vec<_> = warnings.of_kind(WarningKind::DelimiterInValue).collect();
        assert_eq!(issued.len(), 2);
        assert_eq!(issued[0].column, Some(0));
        assert_eq!(issued[0].column_name.as_deref(), Some("a"));
        assert!(issued[1].message.contains("suppressed"));
    }

    #[test]
    fn typed_columns_convert_and_report_failures() {
        let supplied = vec![
            Column::new(0, "id").with_format(ValueFormat::Integer {
                group_separator: None,
            }),
            Column::new(1, "when").with_format(ValueFormat::date_time("yyyy/MM/dd", '-')),
        ];
        let mut warnings = WarningList::new();
        let mut reader = CsvReader::from_text(
            "id,when\n7,2024-02-29\nx,\n",
            ReaderOptions::default(),
            &supplied,
            &mut warnings,
        )
        .expect("open");
        assert!(reader.read_next_record(&mut warnings).unwrap());
        assert_eq!(reader.get_i64(0).unwrap(), 7);
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(reader.get_datetime(1).unwrap(), expected);

        assert!(reader.read_next_record(&mut warnings).unwrap());
        assert!(reader.is_null(0).unwrap());
        assert!(matches!(
            reader.get_i64(0),
            Err(ReaderError::ValueFormat { .. })
        ));
        assert!(matches!(
            reader.get_datetime(1),
            Err(ReaderError::NullValue { .. })
        ));
        assert_eq!(reader.display(0).unwrap(), "x");
        assert_eq!(warnings.of_kind(WarningKind::Conversion).count(), 1);
    }

    #[test]
    fn time_and_zone_parts_are_combined() {
        let mut date =
            Column::new(0, "ShipDate").with_format(ValueFormat::date_time("yyyy/MM/dd", '-'));
        date.time_part = Some("ShipTime".into());
        date.time_part_format = "HH:mm".into();
        date.time_zone_part = Some("Zone".into());
        let mut warnings = WarningList::new();
        let mut reader = CsvReader::from_text(
            "ShipDate,ShipTime,Zone\n2024-01-02,10:30,+02:00\n2024-01-02,10:30,Mars\n",
            ReaderOptions::default(),
            &[date],
            &mut warnings,
        )
        .expect("open");
        assert!(reader.read_next_record(&mut warnings).unwrap());
        let value = reader.get_datetime(0).unwrap();
        assert_eq!((value.hour(), value.minute()), (8, 30));
        assert!(reader.read_next_record(&mut warnings).unwrap());
        assert_eq!(reader.get_datetime(0).unwrap().hour(), 10);
        assert_eq!(warnings.of_kind(WarningKind::Conversion).count(), 1);
    }

    #[test]
    fn reset_rewinds_to_first_record() {
        let options = ReaderOptions {
            skip_rows: 1,
            ..ReaderOptions::default()
        };
        let (mut reader, mut warnings) = open("skip me\na,b\n1,2\n3,4\n", options);
        assert_eq!(rows(&mut reader, &mut warnings).len(), 2);
        reader.reset().expect("reset");
        assert_eq!(reader.record_number(), 0);
        assert!(reader.read_next_record(&mut warnings).unwrap());
        assert_eq!(reader.raw(0).unwrap(), Some("1"));
    }

    #[test]
    fn apply_columns_is_atomic() {
        let (mut reader, _) = open("a,b\n1,2\n", ReaderOptions::default());
        let mut columns = reader.columns().to_vec();
        columns[0].format = ValueFormat::Integer {
            group_separator: None,
        };
        columns[1].format = ValueFormat::date_time("yyyy/MM/dd 'unterminated", '/');
        assert!(reader.apply_columns(columns.clone()).is_err());
        assert!(reader.columns()[0].format.is_text());

        columns[1].format = ValueFormat::String;
        reader.apply_columns(columns).expect("apply");
        assert!(!reader.columns()[0].format.is_text());
    }

    #[test]
    fn accessors_need_a_current_record() {
        let (reader, _) = open("a\n1\n", ReaderOptions::default());
        assert!(matches!(reader.raw(0), Err(ReaderError::NoCurrentRecord)));
    }

    #[test]
    fn cancellation_stops_reading() {
        let (mut reader, mut warnings) = open("a\n1\n2\n", ReaderOptions::default());
        let token = CancellationToken::new();
        reader.set_cancellation(token.clone());
        token.cancel();
        assert!(matches!(
            reader.read_next_record(&mut warnings),
            Err(ReaderError::Cancelled)
        ));
    }
}
