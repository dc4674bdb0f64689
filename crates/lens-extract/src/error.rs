use lens_types::ContentIdentifier;

/// Why an extractor could not produce a record.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ExtractionCause {
    /// The image classifier failed, timed out, or is not reachable.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The content does not fit the extractor it was routed to.
    #[error("invalid content: {0}")]
    InvalidContent(String),
}

/// An extraction failure attributed to one object.
#[derive(Debug, Clone, thiserror::Error)]
#[error("extraction failed for {id}: {cause}")]
pub struct ExtractError {
    pub id: ContentIdentifier,
    pub cause: ExtractionCause,
}

impl ExtractError {
    pub fn model_unavailable(id: &ContentIdentifier, detail: impl Into<String>) -> Self {
        Self {
            id: *id,
            cause: ExtractionCause::ModelUnavailable(detail.into()),
        }
    }

    pub fn invalid_content(id: &ContentIdentifier, reason: impl Into<String>) -> Self {
        Self {
            id: *id,
            cause: ExtractionCause::InvalidContent(reason.into()),
        }
    }

    pub fn is_model_unavailable(&self) -> bool {
        matches!(self.cause, ExtractionCause::ModelUnavailable(_))
    }
}

/// Result alias for extraction.
pub type ExtractResult<T> = Result<T, ExtractError>;
