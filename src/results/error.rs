//! Result parsing errors
//!
//! Every variant carries the 1-based line of the offending record.

use thiserror::Error;

/// Errors raised while parsing an annotated CSV response
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A header row was not preceded by a `#datatype` annotation
    #[error("line {line}: missing #datatype annotation")]
    MissingAnnotation { line: u64 },

    /// A record's field count differs from its block's column count
    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// A `#datatype` annotation names an unsupported type
    #[error("line {line}: unknown data type '{data_type}' for column {column}")]
    UnknownDataType {
        line: u64,
        column: usize,
        data_type: String,
    },

    /// A cell could not be converted to its declared type
    #[error("line {line}: invalid {data_type} value '{value}' in column '{column}'")]
    InvalidValue {
        line: u64,
        column: String,
        data_type: String,
        value: String,
    },

    /// Low-level CSV syntax error
    #[error("line {line}: {message}")]
    Csv { line: u64, message: String },
}

impl ParseError {
    /// Line number the error refers to
    pub fn line(&self) -> u64 {
        match self {
            Self::MissingAnnotation { line }
            | Self::ColumnCount { line, .. }
            | Self::UnknownDataType { line, .. }
            | Self::InvalidValue { line, .. }
            | Self::Csv { line, .. } => *line,
        }
    }
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        ParseError::Csv {
            line,
            message: err.to_string(),
        }
    }
}

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;
