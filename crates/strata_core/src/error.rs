//! Error types for strata core.

use std::io;
use std::path::PathBuf;
use strata_codec::{CodecError, DataType};
use strata_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while writing, reading or combining files.
#[derive(Debug, Error)]
pub enum CoreError {
    /// File resource error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON error outside of header or request validation.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed date, schema, rows or request.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// Input files or constraint columns disagree with the expected schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the mismatch, naming the column.
        message: String,
    },

    /// A constraint refers to a column the file does not have.
    #[error("constraint refers to unknown column {name:?}")]
    UnknownColumn {
        /// The unknown column name.
        name: String,
    },

    /// A transpose, offset, count or sum check failed.
    #[error("integrity check failed during {operation}: {message}")]
    Integrity {
        /// The operation that ran the check.
        operation: &'static str,
        /// Description of the failed check.
        message: String,
    },

    /// A file stayed empty after the open retry, or has no header line.
    #[error("empty or invalid file: {}", path.display())]
    EmptyOrInvalidFile {
        /// The file that was opened.
        path: PathBuf,
    },

    /// A comparator that the column's data type does not support.
    #[error("comparator {comparator:?} is not supported for {data_type} column {column:?}")]
    UnsupportedComparator {
        /// The constrained column.
        column: String,
        /// The rejected comparator.
        comparator: String,
        /// The column's data type.
        data_type: DataType,
    },

    /// Any other unsupported operation.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// Description of the operation.
        message: String,
    },

    /// A response payload carried an error status.
    #[error("reader failed: {message}")]
    ReaderFailed {
        /// The error recorded by the reader.
        message: String,
    },
}

/// Broad category of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed date, schema or request shape.
    Validation,
    /// Inputs disagree with the expected schema.
    SchemaMismatch,
    /// A codec could not prove its output reversible.
    CodecRoundTrip,
    /// A count, sum or offset check failed.
    Integrity,
    /// Missing file, lock failure, unwritable directory.
    Io,
    /// Unsupported comparator or data type.
    UnsupportedOperation,
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Creates an integrity error for `operation`.
    pub fn integrity(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Integrity {
            operation,
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(StorageError::InvalidPath { .. }) => ErrorKind::Validation,
            Self::Storage(_) | Self::Io(_) | Self::EmptyOrInvalidFile { .. } => ErrorKind::Io,
            Self::Codec(err) if err.is_round_trip() => ErrorKind::CodecRoundTrip,
            Self::Codec(CodecError::InvalidDataType { .. }) => ErrorKind::UnsupportedOperation,
            Self::Codec(CodecError::InvalidRunCount { .. }) => ErrorKind::Integrity,
            Self::Codec(CodecError::Io(_)) => ErrorKind::Io,
            Self::Codec(_) | Self::Json(_) | Self::Validation { .. } => ErrorKind::Validation,
            Self::SchemaMismatch { .. } | Self::UnknownColumn { .. } => ErrorKind::SchemaMismatch,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::UnsupportedComparator { .. } | Self::Unsupported { .. } => {
                ErrorKind::UnsupportedOperation
            }
            Self::ReaderFailed { .. } => ErrorKind::Io,
        }
    }
}
