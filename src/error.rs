use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug)]
/// Errors raised while flattening records into CSV rows or rebuilding them.
pub enum CsvError {
    /// A physical line could not be tokenized (unterminated quote, stray quote).
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    /// A row disagrees with the frozen header of the session.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// `finish` was called while a structure or collection was still open.
    #[error("incomplete record: {0}")]
    IncompleteRecord(String),

    /// A scalar converter rejected the raw text of a cell.
    #[error("cannot convert column '{column}': {message}")]
    TypeCoercion { column: String, message: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The value has a shape that cannot be laid out as a flat row.
    #[error("unsupported shape: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Message(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CsvError {
    /// Attaches a column name to a conversion error that does not carry one yet.
    pub(crate) fn at_column(self, name: &str) -> Self {
        match self {
            CsvError::TypeCoercion { column, message } if column.is_empty() => {
                CsvError::TypeCoercion {
                    column: name.to_string(),
                    message,
                }
            }
            other => other,
        }
    }

    /// Attaches a line number to a schema or conversion error raised while decoding.
    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            CsvError::SchemaMismatch(message) => {
                CsvError::SchemaMismatch(format!("line {}: {}", line, message))
            }
            CsvError::TypeCoercion { column, message } => CsvError::TypeCoercion {
                column,
                message: format!("line {}: {}", line, message),
            },
            other => other,
        }
    }
}

impl serde::ser::Error for CsvError {
    fn custom<T: Display>(msg: T) -> Self {
        CsvError::Message(msg.to_string())
    }
}

impl serde::de::Error for CsvError {
    fn custom<T: Display>(msg: T) -> Self {
        CsvError::TypeCoercion {
            column: String::new(),
            message: msg.to_string(),
        }
    }

    fn missing_field(field: &'static str) -> Self {
        CsvError::SchemaMismatch(format!("the header has no column for field `{field}`"))
    }

    fn unknown_field(field: &str, expected: &'static [&'static str]) -> Self {
        CsvError::SchemaMismatch(format!(
            "the header has column `{field}`, expected one of {expected:?}"
        ))
    }
}

pub type Result<T> = std::result::Result<T, CsvError>;
