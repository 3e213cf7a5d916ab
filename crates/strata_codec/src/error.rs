//! Error types for the codec crate.

use std::io;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding column data.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A value handed to the line codec was not a string.
    #[error("line codec accepts only strings, found {found} at index {index}")]
    InvalidValueType {
        /// Position of the offending value.
        index: usize,
        /// Kind of value that was found.
        found: &'static str,
    },

    /// A value contains the line terminator.
    #[error("value at index {index} contains an end-of-line character: {value:?}")]
    ContainsEol {
        /// Position of the offending value.
        index: usize,
        /// The rejected value.
        value: String,
    },

    /// An encoded line did not read back as the values that were written.
    #[error("line round trip failed at index {index}: wrote {original:?}, read back {read_back:?}")]
    CsvRoundTrip {
        /// First differing position.
        index: usize,
        /// Value before encoding.
        original: String,
        /// Value after decoding.
        read_back: String,
    },

    /// A column value contains the run-length separator byte.
    #[error("column {column:?} value {value:?} contains the run-length separator")]
    ContainsRleSeparator {
        /// Column being compressed.
        column: String,
        /// The rejected value.
        value: String,
    },

    /// Compressed output did not expand back to its input.
    #[error("run-length round trip failed for column {column:?}")]
    RleRoundTripMismatch {
        /// Column being compressed.
        column: String,
    },

    /// An operation that needs at least one value got none.
    #[error("{operation} requires at least one value")]
    EmptyInput {
        /// The operation that was called.
        operation: &'static str,
    },

    /// A compression threshold outside 1..=100.
    #[error("compression threshold must be between 1 and 100 percent, got {threshold}")]
    InvalidThreshold {
        /// The rejected threshold.
        threshold: u8,
    },

    /// An unrecognized data type name.
    #[error("invalid data type: {name:?}")]
    InvalidDataType {
        /// The rejected name.
        name: String,
    },

    /// A run-length entry whose count is not a positive integer.
    #[error("invalid run count in {value:?}")]
    InvalidRunCount {
        /// The malformed entry.
        value: String,
    },

    /// I/O error while writing or verifying a line.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding of a structured value failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Returns true for failures of a reversibility self-check.
    #[must_use]
    pub fn is_round_trip(&self) -> bool {
        matches!(
            self,
            Self::CsvRoundTrip { .. } | Self::RleRoundTripMismatch { .. }
        )
    }
}
