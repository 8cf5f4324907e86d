//! Error types for the record tape core.

use std::io;
use thiserror::Error;

/// The result type used throughout recordtape.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for tape, buffer, carousel and key operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred on backing storage.
    #[error("IO error: {0}")]
    Io(#[source] io::Error),

    /// Blocking I/O was interrupted.
    #[error("Interrupted: {0}")]
    Interrupted(#[source] io::Error),

    /// A key or component was configured with names the metadata does not know.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backing memory for a buffer could not be allocated.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A position handle does not point inside the store.
    #[error("Position {position} (length {length}) is out of range, store size is {size}")]
    OutOfRange {
        /// The requested position.
        position: u64,
        /// The requested length.
        length: usize,
        /// The number of bytes held by the store.
        size: u64,
    },

    /// A data chunk index does not exist on the tape.
    #[error("Data chunk {index} does not exist, tape has {count} chunks")]
    ChunkIndex {
        /// The requested chunk index.
        index: usize,
        /// The number of chunks on the tape.
        count: usize,
    },

    /// An operation was invoked in a phase that does not permit it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A chunk checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum stored in the chunk marker.
        expected: u32,
        /// The checksum computed while replaying.
        actual: u32,
    },

    /// A serialized record exceeds the configured limit.
    #[error("Record of {size} bytes exceeds the limit of {limit} bytes")]
    RecordTooLarge {
        /// Serialized size of the record.
        size: usize,
        /// Configured maximum record size.
        limit: usize,
    },

    /// An unrecoverable failure; the owning pass must abort.
    #[error("Fatal failure during {operation}: {source}")]
    Fatal {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Wraps an error as a fatal failure of `operation`.
    pub fn fatal(operation: &'static str, source: Error) -> Self {
        match source {
            fatal @ Error::Fatal { .. } => fatal,
            other => Error::Fatal { operation, source: Box::new(other) },
        }
    }

    /// Returns true if the error leaves its owner in an unrecoverable state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal { .. })
    }

    /// Returns true for I/O and interruption failures.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Interrupted(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::Interrupted {
            Error::Interrupted(err)
        } else {
            Error::Io(err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}
