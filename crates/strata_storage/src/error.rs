//! Error types for file resource operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while opening, locking or placing files.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A file that was expected to exist is missing.
    #[error("file not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// An output path is already occupied.
    #[error("file already exists: {}", path.display())]
    AlreadyExists {
        /// The occupied path.
        path: PathBuf,
    },

    /// A directory cannot be written to.
    #[error("directory is not writable: {}", path.display())]
    NotWritable {
        /// The directory that rejected a probe file.
        path: PathBuf,
    },

    /// The path was unlinked between opening it and acquiring its lock.
    #[error("file was removed while awaiting its lock: {}", path.display())]
    RemovedWhileLocking {
        /// The path that disappeared.
        path: PathBuf,
    },

    /// A lock could not be acquired or released.
    #[error("failed to {action} lock on {}: {source}", path.display())]
    Lock {
        /// What was attempted ("acquire shared", "acquire exclusive", "release").
        action: &'static str,
        /// The locked path.
        path: PathBuf,
        /// The underlying OS error.
        source: io::Error,
    },

    /// A path argument is unusable.
    #[error("invalid path: {message}")]
    InvalidPath {
        /// Description of the problem.
        message: String,
    },
}

impl StorageError {
    /// Creates an invalid path error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath {
            message: message.into(),
        }
    }
}
