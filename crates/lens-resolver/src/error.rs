use lens_types::ContentIdentifier;

/// Errors from a content store collaborator.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    /// The store has no block for the requested digest.
    #[error("block not found")]
    NotFound,

    /// The store could not be reached or failed mid-transfer.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from object resolution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("object not found: {0}")]
    NotFound(ContentIdentifier),

    #[error("transport error resolving {id}: {detail}")]
    Transport {
        id: ContentIdentifier,
        detail: String,
    },

    /// The block could not be decoded with its codec, or failed verification.
    #[error("cannot decode {id}: {reason}")]
    Decode {
        id: ContentIdentifier,
        reason: String,
    },

    /// The graph needs more hops than allowed to enumerate.
    #[error("graph under {id} exceeds max depth {max_depth}")]
    DepthExceeded {
        id: ContentIdentifier,
        max_depth: usize,
    },

    /// Assembled file content exceeded the byte ceiling.
    #[error("content under {id} exceeds {limit} bytes")]
    ContentTooLarge { id: ContentIdentifier, limit: u64 },

    #[error("resolution of {0} cancelled")]
    Cancelled(ContentIdentifier),
}

impl ResolveError {
    /// The identifier the failure is attributed to.
    pub fn identifier(&self) -> &ContentIdentifier {
        match self {
            Self::NotFound(id) | Self::Cancelled(id) => id,
            Self::Transport { id, .. }
            | Self::Decode { id, .. }
            | Self::DepthExceeded { id, .. }
            | Self::ContentTooLarge { id, .. } => id,
        }
    }

    pub(crate) fn decode(id: &ContentIdentifier, reason: impl Into<String>) -> Self {
        Self::Decode {
            id: *id,
            reason: reason.into(),
        }
    }
}

/// Result alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors raised while decoding codec payloads, before an identifier is attached.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated input at offset {0}")]
    Truncated(usize),

    #[error("varint overflow at offset {0}")]
    VarintOverflow(usize),

    #[error("unsupported wire type {wire_type} for field {field}")]
    WireType { field: u64, wire_type: u8 },

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("invalid link: {0}")]
    InvalidLink(String),
}

/// Errors writing to a local block directory.
#[derive(Debug, thiserror::Error)]
pub enum BlockStoreError {
    #[error("block store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Identifier(#[from] lens_types::TypeError),
}
