//! Recovery for rows that carry more fields than the header.
//!
//! Rows of the expected width train a per-column model of value shapes. An
//! over-wide row is repaired by merging adjacent fields back together (an
//! unquoted delimiter inside a value is the usual culprit) at the position
//! whose resulting layout fits the model best.

use std::collections::HashMap;

use crate::tokenizer::Padding;

/// Rows needed before the model is trusted.
const MIN_TRAINING_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CellShape {
    Empty,
    Number,
    DateLike,
    Word,
    Text,
}

fn shape_of(value: &str) -> CellShape {
    let value = value.trim();
    if value.is_empty() {
        return CellShape::Empty;
    }
    let mut digits = 0usize;
    let mut letters = 0usize;
    let mut date_marks = 0usize;
    let mut number_marks = 0usize;
    let mut other = 0usize;
    for ch in value.chars() {
        match ch {
            '0'..='9' => digits += 1,
            '/' | ':' => date_marks += 1,
            '.' | ',' | '-' | '+' | '%' => number_marks += 1,
            ch if ch.is_alphabetic() || ch == ' ' => letters += 1,
            _ => other += 1,
        }
    }
    if letters == 0 && other == 0 && digits > 0 {
        if date_marks > 0 {
            CellShape::DateLike
        } else {
            CellShape::Number
        }
    } else if digits == 0 && other == 0 && date_marks == 0 {
        CellShape::Word
    } else {
        CellShape::Text
    }
}

#[derive(Debug, Clone)]
pub struct ReAlignColumns {
    field_count: usize,
    trained_rows: usize,
    shapes: Vec<HashMap<CellShape, usize>>,
}

impl ReAlignColumns {
    pub fn new(field_count: usize) -> Self {
        Self {
            field_count,
            trained_rows: 0,
            shapes: vec![HashMap::new(); field_count],
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained_rows >= MIN_TRAINING_ROWS
    }

    /// Learns from a row of exactly the expected width.
    pub fn add_row(&mut self, row: &[String]) {
        if row.len() != self.field_count {
            return;
        }
        for (column, value) in row.iter().enumerate() {
            *self.shapes[column].entry(shape_of(value)).or_insert(0) += 1;
        }
        self.trained_rows += 1;
    }

    /// Merges adjacent fields until `row` has the expected width.
    ///
    /// `padding` holds the whitespace trimmed from each field; it is put
    /// back where fields are joined so a merged value reads as in the file.
    /// Returns `None` while the model has not seen enough rows. Between
    /// equally good merge positions the leftmost wins.
    pub fn realign(
        &self,
        row: &[String],
        padding: &[Padding],
        delimiter: char,
    ) -> Option<Vec<String>> {
        if !self.is_trained() || row.len() <= self.field_count || self.field_count == 0 {
            return None;
        }
        let mut current: Vec<Piece> = row
            .iter()
            .enumerate()
            .map(|(idx, value)| Piece {
                value: value.clone(),
                padding: padding.get(idx).cloned().unwrap_or_default(),
            })
            .collect();
        while current.len() > self.field_count {
            let extra = current.len() - self.field_count;
            let mut best: Option<(usize, f64)> = None;
            for position in 0..current.len() - 1 {
                let merged = merge_at(&current, position, delimiter);
                let score = self.score(&merged, position, extra - 1);
                match best {
                    Some((_, best_score)) if score <= best_score => {}
                    _ => best = Some((position, score)),
                }
            }
            let (position, _) = best?;
            current = merge_at(&current, position, delimiter);
        }
        Some(current.into_iter().map(|piece| piece.value).collect())
    }

    /// Scores a candidate layout with `remaining` surplus fields still to be
    /// merged. Fields left of the merge map to their own column, fields
    /// right of it are aligned from the end.
    fn score(&self, candidate: &[Piece], position: usize, remaining: usize) -> f64 {
        let mut total = 0.0;
        for (index, value) in candidate.iter().enumerate() {
            let column = if index <= position {
                index
            } else if index >= remaining {
                index - remaining
            } else {
                continue;
            };
            if column >= self.field_count {
                continue;
            }
            total += self.probability(column, shape_of(&value.value));
        }
        total
    }

    fn probability(&self, column: usize, shape: CellShape) -> f64 {
        let counts = &self.shapes[column];
        let seen: usize = counts.values().sum();
        if seen == 0 {
            return 0.0;
        }
        counts.get(&shape).copied().unwrap_or(0) as f64 / seen as f64
    }
}

#[derive(Debug, Clone)]
struct Piece {
    value: String,
    padding: Padding,
}

fn merge_at(row: &[Piece], position: usize, delimiter: char) -> Vec<Piece> {
    let (left, right) = (&row[position], &row[position + 1]);
    let mut merged = Vec::with_capacity(row.len() - 1);
    merged.extend_from_slice(&row[..position]);
    merged.push(Piece {
        value: format!(
            "{}{}{delimiter}{}{}",
            left.value, left.padding.trailing, right.padding.leading, right.value
        ),
        padding: Padding {
            leading: left.padding.leading.clone(),
            trailing: right.padding.trailing.clone(),
        },
    });
    merged.extend_from_slice(&row[position + 2..]);
    merged
}
