use std::fmt;
use std::path::PathBuf;

use lens_extract::{ExtractError, ExtractionCause};
use lens_index::IndexError;
use lens_migrate::MigrationError;
use lens_resolver::{BlockStoreError, ResolveError};
use lens_types::{ContentIdentifier, TypeError};

/// Coarse classification of a [`LensError`], stable across crates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedIdentifier,
    NotFound,
    Transport,
    Decode,
    DepthExceeded,
    ContentTooLarge,
    Extraction,
    ModelUnavailable,
    Storage,
    StorageLocked,
    MigrationAborted,
    Cancelled,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier => "malformed_identifier",
            Self::NotFound => "not_found",
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::DepthExceeded => "depth_exceeded",
            Self::ContentTooLarge => "content_too_large",
            Self::Extraction => "extraction",
            Self::ModelUnavailable => "model_unavailable",
            Self::Storage => "storage",
            Self::StorageLocked => "storage_locked",
            Self::MigrationAborted => "migration_aborted",
            Self::Cancelled => "cancelled",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LensError {
    #[error(transparent)]
    Identifier(#[from] TypeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    BlockStore(#[from] BlockStoreError),

    /// Cancelled after resolution, before the record was stored.
    #[error("extraction of {0} cancelled")]
    Cancelled(ContentIdentifier),

    #[error("invalid configuration {}: {detail}", .path.display())]
    Config { path: PathBuf, detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl LensError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Identifier(TypeError::MalformedIdentifier { .. }) => ErrorKind::MalformedIdentifier,
            Self::Identifier(TypeError::Serialization(_)) => ErrorKind::Storage,
            Self::Resolve(e) => match e {
                ResolveError::NotFound(_) => ErrorKind::NotFound,
                ResolveError::Transport { .. } => ErrorKind::Transport,
                ResolveError::Decode { .. } => ErrorKind::Decode,
                ResolveError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
                ResolveError::ContentTooLarge { .. } => ErrorKind::ContentTooLarge,
                ResolveError::Cancelled(_) => ErrorKind::Cancelled,
            },
            Self::Extract(e) => match e.cause {
                ExtractionCause::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
                ExtractionCause::InvalidContent(_) => ErrorKind::Extraction,
            },
            Self::Index(e) => match e {
                IndexError::NotFound(_) => ErrorKind::NotFound,
                IndexError::StorageLocked(_) => ErrorKind::StorageLocked,
                _ => ErrorKind::Storage,
            },
            Self::Migration(e) => match e {
                MigrationError::Aborted { .. } => ErrorKind::MigrationAborted,
                MigrationError::Cancelled { .. } => ErrorKind::Cancelled,
                MigrationError::Source(_) => ErrorKind::Storage,
                MigrationError::AlreadyStarted(_) => ErrorKind::Internal,
            },
            Self::BlockStore(_) => ErrorKind::Storage,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Config { .. } => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Identifier the failure is attributed to, when there is one.
    pub fn identifier(&self) -> Option<&ContentIdentifier> {
        match self {
            Self::Resolve(e) => Some(e.identifier()),
            Self::Extract(e) => Some(&e.id),
            Self::Index(IndexError::NotFound(id)) => Some(id),
            Self::Index(IndexError::KeyMismatch { key, .. }) => Some(key),
            Self::Migration(e) => e.identifier(),
            Self::Cancelled(id) => Some(id),
            _ => None,
        }
    }

    /// Transport and model failures may succeed on a later attempt; the core
    /// never retries them itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::ModelUnavailable)
    }
}

pub type LensResult<T> = Result<T, LensError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lens_types::{Codec, HashFunction};

    fn id() -> ContentIdentifier {
        ContentIdentifier::from_content(Codec::Raw, HashFunction::Sha2_256, b"x").unwrap()
    }

    #[test]
    fn kinds_and_identifiers() {
        let parse = LensError::from(ContentIdentifier::parse("not-a-cid").unwrap_err());
        assert_eq!(parse.kind(), ErrorKind::MalformedIdentifier);
        assert!(parse.identifier().is_none());
        assert!(!parse.is_retryable());

        let transport = LensError::from(ResolveError::Transport {
            id: id(),
            detail: "reset".into(),
        });
        assert_eq!(transport.kind(), ErrorKind::Transport);
        assert_eq!(transport.identifier(), Some(&id()));
        assert!(transport.is_retryable());

        let model = LensError::from(ExtractError::model_unavailable(&id(), "timeout"));
        assert_eq!(model.kind(), ErrorKind::ModelUnavailable);
        assert!(model.is_retryable());

        let missing = LensError::from(IndexError::NotFound(id()));
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(missing.identifier(), Some(&id()));

        let locked = LensError::from(IndexError::StorageLocked(PathBuf::from("/tmp/x")));
        assert_eq!(locked.kind(), ErrorKind::StorageLocked);
        assert!(!locked.is_retryable());

        assert_eq!(LensError::Cancelled(id()).kind().as_str(), "cancelled");
    }
}
