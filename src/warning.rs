//! Warning records and the sinks that receive them.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WarningKind {
    QualifierInValue,
    DelimiterInValue,
    NonBreakingSpace,
    UnknownCharacter,
    LineFeedInValue,
    EmptyTailingColumns,
    /// Row width differs from the header.
    ColumnCount,
    ColumnName,
    /// A cell did not match its column format.
    Conversion,
}

impl WarningKind {
    /// Kinds subject to the `num_warning` ceiling.
    pub fn is_rate_limited(self) -> bool {
        matches!(
            self,
            WarningKind::QualifierInValue
                | WarningKind::DelimiterInValue
                | WarningKind::NonBreakingSpace
                | WarningKind::UnknownCharacter
                | WarningKind::LineFeedInValue
                | WarningKind::EmptyTailingColumns
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub record_number: usize,
    /// `None` for file-level issues.
    pub column: Option<usize>,
    pub column_name: Option<String>,
    pub message: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl Warning {
    /// Column ordinal with `-1` standing for "not column specific".
    pub fn column_ordinal(&self) -> i64 {
        self.column.map_or(-1, |idx| idx as i64)
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "line {}", self.start_line)?;
        } else {
            write!(f, "lines {}-{}", self.start_line, self.end_line)?;
        }
        if let Some(name) = &self.column_name {
            write!(f, " column '{name}'")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Receives warnings as the reader produces them.
///
/// Implementations must not block; they are called in the middle of a read.
pub trait WarningSink {
    fn on_warning(&mut self, warning: &Warning);
}

impl<F> WarningSink for F
where
    F: FnMut(&Warning),
{
    fn on_warning(&mut self, warning: &Warning) {
        self(warning)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreWarnings;

impl WarningSink for IgnoreWarnings {
    fn on_warning(&mut self, _warning: &Warning) {}
}

/// Collects warnings for later inspection.
#[derive(Debug, Default, Clone)]
pub struct WarningList {
    warnings: Vec<Warning>,
}

impl WarningList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.warnings.iter()
    }

    pub fn of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    pub fn for_column(&self, column: usize) -> impl Iterator<Item = &Warning> {
        self.warnings
            .iter()
            .filter(move |w| w.column == Some(column))
    }

    /// Messages grouped by column ordinal, file-level messages under `-1`.
    pub fn by_column(&self) -> HashMap<i64, Vec<&str>> {
        let mut grouped: HashMap<i64, Vec<&str>> = HashMap::new();
        for warning in &self.warnings {
            grouped
                .entry(warning.column_ordinal())
                .or_default()
                .push(warning.message.as_str());
        }
        grouped
    }
}

impl WarningSink for WarningList {
    fn on_warning(&mut self, warning: &Warning) {
        self.warnings.push(warning.clone());
    }
}

/// Forwards warnings to `log::warn!` and counts them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWarnings {
    count: usize,
}

impl LogWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl WarningSink for LogWarnings {
    fn on_warning(&mut self, warning: &Warning) {
        self.count += 1;
        log::warn!("record {}, {warning}", warning.record_number);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Allowance {
    Emit,
    /// Emit, then suppress this kind from now on.
    EmitLast,
    Suppress,
}

/// Per-kind counters enforcing the `num_warning` ceiling.
#[derive(Debug, Default, Clone)]
pub(crate) struct WarningLimiter {
    ceiling: usize,
    counts: HashMap<WarningKind, usize>,
}

impl WarningLimiter {
    pub(crate) fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            counts: HashMap::new(),
        }
    }

    pub(crate) fn check(&mut self, kind: WarningKind) -> Allowance {
        if self.ceiling == 0 || !kind.is_rate_limited() {
            return Allowance::Emit;
        }
        let count = self.counts.entry(kind).or_insert(0);
        *count += 1;
        match (*count).cmp(&self.ceiling) {
            std::cmp::Ordering::Less => Allowance::Emit,
            std::cmp::Ordering::Equal => Allowance::EmitLast,
            std::cmp::Ordering::Greater => Allowance::Suppress,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.counts.clear();
    }
}
