//! Content classification and metadata extraction for Lens.
//!
//! [`classify`] labels a resolved object; [`ExtractorSet::extract`] routes it
//! to the extractor for that label and returns a
//! [`MetadataRecord`](lens_types::MetadataRecord).
//!
//! # Key Types
//!
//! - [`Extractor`]: the dispatch variants
//! - [`ExtractorSet`]: configured extractors
//! - [`ImageClassifier`]: external image model capability
//! - [`ExtractError`]: failure with an [`ExtractionCause`]

pub mod binary;
pub mod classify;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod graph;
pub mod image;
pub mod model;

pub use binary::BinaryExtractor;
pub use classify::{classify, classify_bytes, sniff, Format};
pub use dispatch::{ExtractConfig, Extractor, ExtractorSet, DEFAULT_IMAGE_CONCURRENCY, DEFAULT_MODEL_TIMEOUT};
pub use document::{DocumentExtractor, DEFAULT_EXCERPT_BYTES};
pub use error::{ExtractError, ExtractResult, ExtractionCause};
pub use graph::GraphExtractor;
pub use crate::image::ImageExtractor;
pub use model::{ClassifierError, ImageClassifier, PlaceholderClassifier, Prediction, UnavailableClassifier};
