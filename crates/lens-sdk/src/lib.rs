//! High-level SDK for Lens.
//!
//! [`Lens`] wires the object resolver, content classifier, extractor dispatch
//! and metadata index into one pipeline. This is the main entry point for
//! applications embedding Lens.

pub mod config;
pub mod error;
pub mod lens;

pub use config::LensConfig;
pub use error::{ErrorKind, LensError, LensResult};
pub use lens::{BatchOutcome, Extracted, Lens};

// Re-export key types
pub use lens_extract::{ImageClassifier, PlaceholderClassifier, Prediction, UnavailableClassifier};
pub use lens_index::{InMemoryMetadataStore, MetadataIndex, MetadataStore, StorageKey};
pub use lens_migrate::{MigrationEngine, MigrationOptions, MigrationState};
pub use lens_resolver::{ContentStore, FsContentStore, InMemoryContentStore};
pub use lens_types::{
    Codec, ContentIdentifier, ContentTypeLabel, FieldValue, HashFunction, IndexEntry, MetadataRecord,
    MigrationReport, MigrationResult, MigrationStatus,
};
pub use tokio_util::sync::CancellationToken;
