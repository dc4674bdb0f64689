//! Foundation types for Lens.
//!
//! Every other Lens crate depends on `lens-types`.
//!
//! # Key Types
//!
//! - [`ContentIdentifier`]: canonical, self-describing content identifier (CID)
//! - [`Codec`] / [`HashFunction`]: the recognized codec and multihash sets
//! - [`ContentTypeLabel`]: classification result
//! - [`MetadataRecord`] / [`FieldValue`]: extracted metadata
//! - [`IndexEntry`]: a persisted identifier/record pair
//! - [`MigrationReport`]: per-entry outcomes of a migration run

pub mod entry;
pub mod error;
pub mod identifier;
pub mod label;
pub mod migration;
pub mod record;

pub use entry::IndexEntry;
pub use error::TypeError;
pub use identifier::{Codec, ContentIdentifier, HashFunction, MAX_DIGEST_LEN};
pub use label::ContentTypeLabel;
pub use migration::{MigrationReport, MigrationResult, MigrationStatus};
pub use record::{FieldValue, MetadataRecord};
