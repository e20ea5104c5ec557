//! Column definitions and header reconciliation.
//!
//! [`reconcile_columns`] turns the raw header row (or the bare field count of
//! a header-less file) plus any caller supplied definitions into the final
//! column list. Every adjustment it makes is returned as a [`ColumnNote`] so
//! the reader can report it as a warning.

use serde::{Deserialize, Serialize};

use crate::value_format::ValueFormat;

/// Longest column name kept before truncation.
pub const MAX_COLUMN_NAME_LEN: usize = 128;
const NAME_PREVIEW_LEN: usize = 20;
pub const DEFAULT_TIME_PART_FORMAT: &str = "HH:mm:ss";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Column {
    #[serde(skip_serializing)]
    pub ordinal: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
    /// When false the raw text is handed out even for typed formats.
    pub convert: bool,
    pub format: ValueFormat,
    /// Name of a column holding the time of day for this date column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_part: Option<String>,
    pub time_part_format: String,
    /// Name of a column holding a time zone for this date column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone_part: Option<String>,
    #[serde(skip)]
    pub(crate) time_part_ordinal: Option<usize>,
    #[serde(skip)]
    pub(crate) time_zone_part_ordinal: Option<usize>,
}

impl Default for Column {
    fn default() -> Self {
        Self {
            ordinal: 0,
            name: String::new(),
            destination_name: None,
            ignore: false,
            convert: true,
            format: ValueFormat::String,
            time_part: None,
            time_part_format: DEFAULT_TIME_PART_FORMAT.to_string(),
            time_zone_part: None,
            time_part_ordinal: None,
            time_zone_part_ordinal: None,
        }
    }
}

impl Column {
    pub fn new(ordinal: usize, name: impl Into<String>) -> Self {
        Self {
            ordinal,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }

    pub fn destination(&self) -> &str {
        self.destination_name.as_deref().unwrap_or(&self.name)
    }

    /// Ordinal of the wired time column, if the reference resolved.
    pub fn time_part_ordinal(&self) -> Option<usize> {
        self.time_part_ordinal
    }

    pub fn time_zone_part_ordinal(&self) -> Option<usize> {
        self.time_zone_part_ordinal
    }
}

/// One adjustment made while reconciling; `column` is `None` for file-level
/// notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNote {
    pub column: Option<usize>,
    pub message: String,
}

pub fn default_column_name(ordinal: usize) -> String {
    format!("Column{}", ordinal + 1)
}

/// Normalizes one header cell against the names already taken.
pub fn adjust_column_name(
    raw: &str,
    ordinal: usize,
    taken: &[String],
    notes: &mut Vec<ColumnNote>,
) -> String {
    let mut note = |message: String| {
        notes.push(ColumnNote {
            column: Some(ordinal),
            message,
        })
    };

    let trimmed = raw.trim();
    let mut name = if trimmed.is_empty() {
        let fallback = default_column_name(ordinal);
        note(format!("Column name missing, using '{fallback}'"));
        fallback
    } else {
        if trimmed.len() != raw.len() {
            note(format!("Column name '{raw}' had surrounding whitespace removed"));
        }
        trimmed.to_string()
    };

    if name.chars().count() > MAX_COLUMN_NAME_LEN {
        let preview: String = name.chars().take(NAME_PREVIEW_LEN).collect();
        name = name.chars().take(MAX_COLUMN_NAME_LEN).collect();
        note(format!(
            "Column name '{preview}…' truncated to {MAX_COLUMN_NAME_LEN} characters"
        ));
    }

    if is_taken(&name, taken) {
        let mut counter = 2usize;
        let unique = loop {
            let candidate = format!("{name}{counter}");
            if !is_taken(&candidate, taken) {
                break candidate;
            }
            counter += 1;
        };
        note(format!(
            "Column name '{name}' exists more than once, renamed to '{unique}'"
        ));
        name = unique;
    }
    name
}

fn is_taken(name: &str, taken: &[String]) -> bool {
    taken.iter().any(|existing| existing.eq_ignore_ascii_case(name))
}

/// Builds the column list for a file with `field_count` fields.
///
/// With a header, supplied definitions match by name (case-insensitive);
/// without one, the definition at list position `i` pins column `i`.
/// Definitions that match nothing are dropped.
pub fn reconcile_columns(
    header: Option<&[String]>,
    field_count: usize,
    supplied: &[Column],
) -> (Vec<Column>, Vec<ColumnNote>) {
    let mut notes = Vec::new();
    let mut names: Vec<String> = Vec::with_capacity(field_count);
    let mut columns = Vec::with_capacity(field_count);

    for ordinal in 0..field_count {
        let (raw_name, definition) = match header {
            Some(header) => {
                let raw = header.get(ordinal).map(String::as_str).unwrap_or_default();
                let key = raw.trim();
                let definition = supplied.iter().find(|column| {
                    !key.is_empty() && column.name.trim().eq_ignore_ascii_case(key)
                });
                (raw.to_string(), definition)
            }
            None => {
                let definition = supplied.get(ordinal);
                let raw = definition
                    .map(|column| column.name.clone())
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| default_column_name(ordinal));
                (raw, definition)
            }
        };

        let name = adjust_column_name(&raw_name, ordinal, &names, &mut notes);
        let column = match definition {
            Some(definition) => Column {
                ordinal,
                name: name.clone(),
                time_part_ordinal: None,
                time_zone_part_ordinal: None,
                ..definition.clone()
            },
            None => Column::new(ordinal, name.clone()),
        };
        names.push(name);
        columns.push(column);
    }

    if header.is_some() {
        for definition in supplied {
            if !names.iter().any(|name| name.eq_ignore_ascii_case(definition.name.trim())) {
                notes.push(ColumnNote {
                    column: None,
                    message: format!(
                        "Column definition '{}' does not match any column and is ignored",
                        definition.name
                    ),
                });
            }
        }
    }

    wire_time_parts(&mut columns);
    (columns, notes)
}

/// Resolves `time_part` and `time_zone_part` names to ordinals. Dangling
/// references stay unresolved.
pub fn wire_time_parts(columns: &mut [Column]) {
    let lookup = |columns: &[Column], own: usize, target: Option<&str>| -> Option<usize> {
        let target = target?.trim();
        columns
            .iter()
            .position(|other| other.ordinal != own && other.name.eq_ignore_ascii_case(target))
    };
    for idx in 0..columns.len() {
        if columns[idx].ignore {
            columns[idx].time_part_ordinal = None;
            columns[idx].time_zone_part_ordinal = None;
            continue;
        }
        let own = columns[idx].ordinal;
        let time = lookup(&*columns, own, columns[idx].time_part.as_deref());
        let zone = lookup(&*columns, own, columns[idx].time_zone_part.as_deref());
        if columns[idx].time_part.is_some() && time.is_none() {
            log::debug!(
                "Time part of column '{}' does not match any column",
                columns[idx].name
            );
        }
        columns[idx].time_part_ordinal = time;
        columns[idx].time_zone_part_ordinal = zone;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn header_less_files_get_default_names() {
        let (columns, notes) = reconcile_columns(None, 3, &[]);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Column1", "Column2", "Column3"]);
        assert!(notes.is_empty());
    }

    #[test]
    fn supplied_definitions_pin_positions_without_header() {
        let supplied = vec![Column::new(0, "Id").with_format(ValueFormat::Integer {
            group_separator: None,
        })];
        let (columns, _) = reconcile_columns(None, 2, &supplied);
        assert_eq!(columns[0].name, "Id");
        assert_eq!(columns[0].format.data_type(), crate::value_format::DataType::Integer);
        assert_eq!(columns[1].name, "Column2");
    }

    #[test]
    fn duplicate_names_get_numbered() {
        let (columns, notes) = reconcile_columns(Some(&header(&["Name", "name", "NAME"])), 3, &[]);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "name2", "NAME3"]);
        assert_eq!(notes.len(), 2);
        assert!(notes[0].message.contains("renamed to 'name2'"));
    }

    #[test]
    fn empty_and_long_names_are_adjusted() {
        let long = "x".repeat(200);
        let (columns, notes) = reconcile_columns(Some(&header(&["", &long, " a "])), 3, &[]);
        assert_eq!(columns[0].name, "Column1");
        assert_eq!(columns[1].name.chars().count(), MAX_COLUMN_NAME_LEN);
        assert_eq!(columns[2].name, "a");
        assert_eq!(notes.len(), 3);
        assert!(notes[1].message.contains(&"x".repeat(20)));
    }

    #[test]
    fn supplied_definitions_match_by_name() {
        let supplied = vec![
            Column::new(0, "AMOUNT").with_format(ValueFormat::Numeric {
                decimal_separator: '.',
                group_separator: None,
            }),
            Column::new(0, "missing"),
        ];
        let (columns, notes) = reconcile_columns(Some(&header(&["id", "amount"])), 2, &supplied);
        assert_eq!(columns[1].name, "amount");
        assert_eq!(columns[1].ordinal, 1);
        assert!(matches!(columns[1].format, ValueFormat::Numeric { .. }));
        assert!(columns[0].format.is_text());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].column, None);
    }

    #[test]
    fn time_parts_resolve_by_name() {
        let mut date = Column::new(0, "StartDate");
        date.time_part = Some("starttime".into());
        date.time_zone_part = Some("nowhere".into());
        let supplied = vec![date];
        let (columns, _) =
            reconcile_columns(Some(&header(&["StartDate", "StartTime"])), 2, &supplied);
        assert_eq!(columns[0].time_part_ordinal(), Some(1));
        assert_eq!(columns[0].time_zone_part_ordinal(), None);
    }
}
