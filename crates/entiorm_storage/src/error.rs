//! Error types for journal operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the journal.
    #[error("read beyond end of journal: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current journal size.
        size: u64,
    },

    /// Attempted to grow the journal through truncation.
    #[error("cannot truncate to {requested} bytes, journal holds {size}")]
    InvalidTruncate {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// A record is too large to be framed.
    #[error("record of {len} bytes exceeds the frame limit")]
    RecordTooLarge {
        /// Payload length.
        len: usize,
    },

    /// Another process holds the journal.
    #[error("journal is locked by another process: {path}")]
    Locked {
        /// Journal path.
        path: String,
    },
}
