//! Extractor dispatch.
//!
//! One [`Extractor`] variant per content-type label, chosen by a fixed table.
//! The label is computed once by the caller; a failing extractor propagates
//! its error and never falls back to another one.

use std::sync::Arc;
use std::time::Duration;

use lens_resolver::ResolvedObject;
use lens_types::{ContentTypeLabel, MetadataRecord};
use tracing::debug;

use crate::binary::BinaryExtractor;
use crate::document::{DocumentExtractor, DEFAULT_EXCERPT_BYTES};
use crate::error::ExtractResult;
use crate::graph::GraphExtractor;
use crate::image::ImageExtractor;
use crate::model::ImageClassifier;

/// Default bound on concurrent image classifier calls.
pub const DEFAULT_IMAGE_CONCURRENCY: usize = 2;

/// Default deadline for a single classifier call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

/// The extractor variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Extractor {
    Graph,
    Image,
    Document,
    Binary,
}

impl Extractor {
    /// The fixed label-to-extractor table.
    pub const fn for_label(label: ContentTypeLabel) -> Self {
        match label {
            ContentTypeLabel::GraphNode => Self::Graph,
            ContentTypeLabel::Image => Self::Image,
            ContentTypeLabel::Document => Self::Document,
            ContentTypeLabel::RawBinary | ContentTypeLabel::Unknown => Self::Binary,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Image => "image",
            Self::Document => "document",
            Self::Binary => "binary",
        }
    }
}

/// Tunables for the extractor set.
#[derive(Clone, Debug)]
pub struct ExtractConfig {
    pub image_concurrency: usize,
    pub model_timeout: Duration,
    pub excerpt_bytes: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            image_concurrency: DEFAULT_IMAGE_CONCURRENCY,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            excerpt_bytes: DEFAULT_EXCERPT_BYTES,
        }
    }
}

/// Configured instances of every extractor.
#[derive(Clone, Debug)]
pub struct ExtractorSet {
    graph: GraphExtractor,
    image: ImageExtractor,
    document: DocumentExtractor,
    binary: BinaryExtractor,
}

impl ExtractorSet {
    pub fn new(classifier: Arc<dyn ImageClassifier>, config: &ExtractConfig) -> Self {
        Self {
            graph: GraphExtractor,
            image: ImageExtractor::new(classifier, config.image_concurrency, config.model_timeout),
            document: DocumentExtractor::new(config.excerpt_bytes),
            binary: BinaryExtractor,
        }
    }

    pub fn image(&self) -> &ImageExtractor {
        &self.image
    }

    /// Produce a record for `object`, already labelled `label`.
    ///
    /// The record's content type is `label` itself, so `Unknown` objects
    /// keep their label while going through the binary extractor.
    pub async fn extract(
        &self,
        label: ContentTypeLabel,
        object: &ResolvedObject,
    ) -> ExtractResult<MetadataRecord> {
        let extractor = Extractor::for_label(label);
        debug!(cid = %object.identifier(), label = ?label, extractor = extractor.name(), "dispatching");
        match extractor {
            Extractor::Graph => Ok(self.graph.extract(label, object)),
            Extractor::Image => self.image.extract(label, object).await,
            Extractor::Document => self.document.extract(label, object).await,
            Extractor::Binary => Ok(self.binary.extract(label, object)),
        }
    }
}
