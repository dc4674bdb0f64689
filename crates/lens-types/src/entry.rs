use serde::{Deserialize, Serialize};

use crate::identifier::ContentIdentifier;
use crate::record::MetadataRecord;

/// A persisted key/value pairing inside a metadata index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: ContentIdentifier,
    pub record: MetadataRecord,
}

impl IndexEntry {
    /// Entry keyed by the record's own source identifier.
    pub fn new(record: MetadataRecord) -> Self {
        Self {
            key: *record.source(),
            record,
        }
    }

    /// Canonical textual key as stored on disk.
    pub fn storage_key(&self) -> String {
        self.key.to_canonical()
    }
}
