//! Error types for the index crate.

use std::io;
use std::path::PathBuf;

use lens_types::ContentIdentifier;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No entry is stored under the identifier.
    #[error("no metadata stored for {0}")]
    NotFound(ContentIdentifier),

    /// Another handle holds the storage directory's lock.
    #[error("storage at {} is locked by another handle", .0.display())]
    StorageLocked(PathBuf),

    /// I/O error reading or writing the index log.
    #[error("storage error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The record's source identifier differs from the key it was put under.
    #[error("record for {record} cannot be stored under {key}")]
    KeyMismatch {
        key: ContentIdentifier,
        record: ContentIdentifier,
    },

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// A failed append could not be rolled back; the log refuses further writes.
    #[error("index log at {} is unusable after a failed write", .0.display())]
    Poisoned(PathBuf),
}

impl IndexError {
    /// Storage-level failures, as opposed to a missing key or a locked store.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serialization(_) | Self::Closed | Self::Poisoned(_))
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
