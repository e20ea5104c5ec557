//! Plain text tables for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Cells longer than this are cut and end in `…`.
pub const MAX_CELL_WIDTH: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Right,
}

pub fn render_table(headers: &[String], rows: &[Vec<String>], alignments: &[Alignment]) -> String {
    let column_count = headers.len();
    let headers: Vec<Cow<'_, str>> = headers.iter().map(|h| fit_cell(h)).collect();
    let rows: Vec<Vec<Cow<'_, str>>> = rows
        .iter()
        .map(|row| row.iter().take(column_count).map(|c| fit_cell(c)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h).max(3)).collect();
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&headers, &widths, &[]));
    let rule: Vec<Cow<'_, str>> = widths.iter().map(|w| Cow::Owned("-".repeat(*w))).collect();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, &[]));
    for row in &rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, alignments));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>], alignments: &[Alignment]) {
    print!("{}", render_table(headers, rows, alignments));
}

fn format_row(values: &[Cow<'_, str>], widths: &[usize], alignments: &[Alignment]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let value = values.get(idx).map(|v| v.as_ref()).unwrap_or_default();
        let padding = " ".repeat(width.saturating_sub(display_width(value)));
        match alignments.get(idx).copied().unwrap_or_default() {
            Alignment::Left => {
                line.push_str(value);
                line.push_str(&padding);
            }
            Alignment::Right => {
                line.push_str(&padding);
                line.push_str(value);
            }
        }
    }
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

/// Flattens control characters and shortens long values.
fn fit_cell(value: &str) -> Cow<'_, str> {
    let needs_flattening = value.chars().any(char::is_control);
    let too_long = display_width(value) > MAX_CELL_WIDTH;
    if !needs_flattening && !too_long {
        return Cow::Borrowed(value);
    }
    let mut fitted: String = value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .take(if too_long { MAX_CELL_WIDTH - 1 } else { usize::MAX })
        .collect();
    if too_long {
        fitted.push('…');
    }
    Cow::Owned(fitted)
}
