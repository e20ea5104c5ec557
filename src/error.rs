//! Error types for reading delimited text.
//!
//! Only configuration problems and unrecoverable stream failures surface as
//! errors. Everything the reader can repair locally is reported through a
//! [`WarningSink`](crate::warning::WarningSink) instead.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Debug, Error)]
pub enum ReaderError {
    /// Delimiter, qualifier or escape character settings conflict.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The underlying stream could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The underlying stream failed while reading.
    #[error("failed to read input near line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// Row combining looked ahead further than the source could keep buffered.
    #[error(
        "line {line}: look-ahead for row combining exceeded the rewind buffer; continuing would drop data"
    )]
    CheckpointLost { line: usize },

    /// The source cannot be rewound to the first data row.
    #[error("the input stream cannot be reset")]
    NotResettable,

    #[error("no column at index {0}")]
    ColumnIndex(usize),

    #[error("no column named '{0}'")]
    ColumnName(String),

    /// A strict accessor was asked for a value that could not be converted.
    #[error("column '{column}': '{text}' is not a valid {expected}")]
    ValueFormat {
        column: String,
        text: String,
        expected: String,
    },

    /// A strict accessor was asked for a non-null value but the cell is null.
    #[error("column '{column}' is null in record {record}")]
    NullValue { column: String, record: usize },

    #[error("no current record; call read() first")]
    NoCurrentRecord,

    #[error("operation was cancelled")]
    Cancelled,

    #[error("invalid date pattern '{pattern}': {reason}")]
    DatePattern { pattern: String, reason: String },

    #[error("schema file {path}: {message}")]
    Schema { path: PathBuf, message: String },

    #[error("failed to serialize schema: {0}")]
    Serialization(String),
}

impl ReaderError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        ReaderError::Configuration(message.into())
    }

    /// True for errors that leave already delivered rows valid and only stop
    /// the read, as opposed to configuration mistakes.
    pub fn is_stream_failure(&self) -> bool {
        matches!(
            self,
            ReaderError::Open { .. } | ReaderError::Read { .. } | ReaderError::CheckpointLost { .. }
        )
    }
}
