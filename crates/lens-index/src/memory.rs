use std::sync::RwLock;

use lens_types::{ContentIdentifier, MetadataRecord};

use crate::error::{IndexError, IndexResult};
use crate::ordered::OrderedEntries;
use crate::traits::{check_key, EntryIter, MetadataIndex, StorageKey};

/// In-memory metadata index.
///
/// Intended for tests, dry runs and embedding. Entries live behind a
/// `RwLock`; records are cloned on read and write.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    entries: RwLock<OrderedEntries>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }
}

impl MetadataIndex for InMemoryMetadataStore {
    fn put(&self, key: &ContentIdentifier, record: MetadataRecord) -> IndexResult<StorageKey> {
        check_key(key, &record)?;
        self.entries.write().expect("lock poisoned").upsert(*key, record);
        Ok(StorageKey::new(key))
    }

    fn get(&self, key: &ContentIdentifier) -> IndexResult<MetadataRecord> {
        let entries = self.entries.read().expect("lock poisoned");
        entries.get(key).cloned().ok_or(IndexError::NotFound(*key))
    }

    fn delete(&self, key: &ContentIdentifier) -> IndexResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        if entries.remove(key) {
            Ok(())
        } else {
            Err(IndexError::NotFound(*key))
        }
    }

    fn keys(&self) -> Vec<ContentIdentifier> {
        self.entries.read().expect("lock poisoned").keys()
    }

    fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    fn contains(&self, key: &ContentIdentifier) -> bool {
        self.entries.read().expect("lock poisoned").contains(key)
    }

    fn iterate(&self) -> EntryIter<'_> {
        EntryIter::new(self)
    }
}

impl std::fmt::Debug for InMemoryMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMetadataStore")
            .field("entry_count", &self.len())
            .finish()
    }
}
