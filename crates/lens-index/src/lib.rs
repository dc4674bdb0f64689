//! Embedded metadata index for Lens.
//!
//! Maps a [`ContentIdentifier`](lens_types::ContentIdentifier) to the
//! [`MetadataRecord`](lens_types::MetadataRecord) extracted from it.
//!
//! # Key Types
//!
//! - [`MetadataIndex`]: the index capability shared by all stores
//! - [`MetadataStore`]: disk-backed store holding an exclusive directory lock
//! - [`InMemoryMetadataStore`]: volatile store for tests and dry runs
//! - [`IndexLog`]: CRC-framed append-only mutation log

pub mod error;
pub mod log;
pub mod memory;
mod ordered;
pub mod store;
pub mod traits;

pub use error::{IndexError, IndexResult};
pub use log::{IndexLog, LogRecord, Replay, SyncMode};
pub use memory::InMemoryMetadataStore;
pub use store::{CompactStats, MetadataStore, LOCK_FILE, LOG_FILE};
pub use traits::{EntryIter, MetadataIndex, StorageKey};
